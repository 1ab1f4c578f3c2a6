//! Maintenance mode gate.
//!
//! The gate is configured once, at startup, from two keys:
//!
//! - `app.maintenanceMode.enabled` (default `false`)
//! - `app.maintenanceMode`, a [`MaintenanceConfig`] section
//!
//! While maintenance is off, the gate forwards every request. While it is on:
//!
//! 1. a path listed in `except` is forwarded unchanged;
//! 2. if `redirect` is set and differs from the path, the client gets a
//!    `302 Found` to it with an empty body;
//! 3. otherwise `Retry-After` and `Refresh` are added when configured, and
//!    the client gets `status` (default `503`) with `template` as the body.
//!
//! Cases 2 and 3 end with [`Outcome::Terminate`]. What termination means for
//! the process is decided by the kernel, not here.
//!
//! # Example
//!
//! ```
//! use portcullis_core::ConfigProvider;
//! use portcullis_middleware::MaintenanceGate;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! let config: Arc<dyn ConfigProvider> = Arc::new(json!({
//!     "app": {
//!         "maintenanceMode": {
//!             "enabled": true,
//!             "except": ["/health"],
//!             "retry": 120
//!         }
//!     }
//! }));
//!
//! let gate = MaintenanceGate::from_config(config.as_ref()).unwrap();
//! assert!(gate.is_active());
//! assert!(gate.is_excepted("/health"));
//! ```

use http::header::{HeaderValue, LOCATION, REFRESH, RETRY_AFTER};
use http::StatusCode;
use portcullis_core::config::keys;
use portcullis_core::{
    BoxFuture, ConfigProvider, Next, Outcome, ParameterBag, ResponseError, ResponseWriter,
    RouteAction, Termination,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// Body sent when no template is configured.
pub const DEFAULT_TEMPLATE: &str =
    "Service temporarily unavailable for scheduled maintenance. Please try again later.";

/// Status sent when none is configured.
pub const DEFAULT_STATUS: u16 = 503;

/// Errors raised while building the gate.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GateError {
    /// The configured status is not an HTTP status code.
    #[error("invalid maintenance status {status}")]
    InvalidStatus {
        /// The configured value.
        status: u16,
    },

    /// The redirect target cannot be sent as a `Location` header.
    #[error("invalid maintenance redirect `{target}`")]
    InvalidRedirect {
        /// The configured value.
        target: String,
    },
}

/// The `app.maintenanceMode` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MaintenanceConfig {
    /// Status sent with the maintenance body.
    pub status: u16,
    /// Maintenance body.
    pub template: String,
    /// Paths that bypass the gate; exact match against the request path.
    pub except: Vec<String>,
    /// Where to send clients instead of serving the maintenance body.
    pub redirect: Option<String>,
    /// `Retry-After` value in seconds.
    pub retry: Option<u64>,
    /// `Refresh` value in seconds.
    pub refresh: Option<u64>,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            status: DEFAULT_STATUS,
            template: DEFAULT_TEMPLATE.to_string(),
            except: Vec::new(),
            redirect: None,
            retry: None,
            refresh: None,
        }
    }
}

/// Whether the gate lets requests through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateMode {
    /// Every request passes.
    Normal,
    /// Requests are answered by the gate unless excepted.
    Maintenance,
}

/// Answers requests while the application is in maintenance.
#[derive(Debug, Clone)]
pub struct MaintenanceGate {
    mode: GateMode,
    config: MaintenanceConfig,
    status: StatusCode,
}

impl MaintenanceGate {
    /// A gate that lets every request pass.
    #[must_use]
    pub fn normal() -> Self {
        Self {
            mode: GateMode::Normal,
            config: MaintenanceConfig::default(),
            status: StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Creates an active gate from an explicit section.
    ///
    /// # Errors
    ///
    /// Returns [`GateError`] if the status or redirect target is unusable.
    pub fn maintenance(config: MaintenanceConfig) -> Result<Self, GateError> {
        let status = StatusCode::from_u16(config.status)
            .ok()
            .filter(|_| (100..=599).contains(&config.status))
            .ok_or(GateError::InvalidStatus {
                status: config.status,
            })?;

        if let Some(target) = &config.redirect {
            HeaderValue::from_str(target).map_err(|_| GateError::InvalidRedirect {
                target: target.clone(),
            })?;
        }

        Ok(Self {
            mode: GateMode::Maintenance,
            config,
            status,
        })
    }

    /// Reads the gate state from configuration.
    ///
    /// A section that is present but malformed is replaced by the default
    /// section, with a warning. The section is only read when maintenance is
    /// enabled.
    ///
    /// # Errors
    ///
    /// Returns [`GateError`] if the parsed section is unusable.
    pub fn from_config(provider: &dyn ConfigProvider) -> Result<Self, GateError> {
        if !provider.get_or(keys::MAINTENANCE_ENABLED, false) {
            debug!("maintenance mode disabled");
            return Ok(Self::normal());
        }

        let config = match provider.get_as::<MaintenanceConfig>(keys::MAINTENANCE) {
            Ok(Some(config)) => config,
            Ok(None) => MaintenanceConfig::default(),
            Err(e) => {
                warn!(
                    key = keys::MAINTENANCE,
                    error = %e,
                    "malformed maintenance configuration, using defaults"
                );
                MaintenanceConfig::default()
            }
        };

        let gate = Self::maintenance(config)?;
        warn!(
            status = gate.status.as_u16(),
            except = ?gate.config.except,
            redirect = gate.config.redirect.as_deref(),
            "maintenance mode enabled"
        );
        Ok(gate)
    }

    /// Returns the gate mode.
    #[must_use]
    pub const fn mode(&self) -> GateMode {
        self.mode
    }

    /// Returns `true` in maintenance mode.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.mode == GateMode::Maintenance
    }

    /// Returns the active section.
    #[must_use]
    pub fn config(&self) -> &MaintenanceConfig {
        &self.config
    }

    /// Returns `true` if `path` bypasses the gate.
    #[must_use]
    pub fn is_excepted(&self, path: &str) -> bool {
        self.config.except.iter().any(|pattern| pattern == path)
    }

    fn redirect_for(&self, path: &str) -> Option<&str> {
        self.config
            .redirect
            .as_deref()
            .filter(|target| *target != path)
    }

    fn respond(&self, res: &mut ResponseWriter, path: &str) -> Result<(), ResponseError> {
        if let Some(target) = self.redirect_for(path) {
            res.append_header(LOCATION.as_str(), target)?;
            res.write_head(StatusCode::FOUND)?;
            return res.send_empty();
        }

        if let Some(retry) = self.config.retry {
            res.append_header(RETRY_AFTER.as_str(), &retry.to_string())?;
        }
        if let Some(refresh) = self.config.refresh {
            res.append_header(REFRESH.as_str(), &refresh.to_string())?;
        }
        res.write_head(self.status)?;
        res.send(self.config.template.clone())
    }
}

impl Default for MaintenanceGate {
    fn default() -> Self {
        Self::normal()
    }
}

impl RouteAction for MaintenanceGate {
    fn name(&self) -> &'static str {
        "maintenance"
    }

    fn call<'a>(&'a self, bag: &'a mut ParameterBag, next: Next<'a>) -> BoxFuture<'a, Outcome> {
        Box::pin(async move {
            if !self.is_active() {
                return next.run(bag).await;
            }

            let path = bag.path().to_string();
            if self.is_excepted(&path) {
                debug!(path = %path, "path excepted from maintenance");
                return next.run(bag).await;
            }

            let termination = if self.redirect_for(&path).is_some() {
                Termination::Redirect
            } else {
                Termination::Maintenance
            };

            if let Err(e) = self.respond(bag.response_mut(), &path) {
                warn!(error = %e, "could not write maintenance response");
            }
            warn!(path = %path, termination = %termination, "request stopped by maintenance mode");
            Outcome::Terminate(termination)
        })
    }
}
