//! Read-only configuration access.
//!
//! Components never reach for global configuration. They receive a
//! [`ConfigProvider`] and read the keys listed in [`keys`]. Keys are dotted
//! paths into a JSON-shaped tree, e.g. `app.maintenanceMode.enabled`.
//!
//! `serde_json::Value` implements the trait directly, which is handy for
//! tests and for small embedded configurations:
//!
//! ```
//! use portcullis_core::ConfigProvider;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! let config: Arc<dyn ConfigProvider> = Arc::new(json!({
//!     "app": { "maintenanceMode": { "enabled": true } }
//! }));
//!
//! assert!(config.get_or("app.maintenanceMode.enabled", false));
//! assert!(!config.get_or("app.debug", false));
//! ```

use serde::de::DeserializeOwned;
use serde_json::Value;

/// Recognized configuration keys and their defaults.
pub mod keys {
    /// Whether maintenance mode is active. Defaults to `false`.
    pub const MAINTENANCE_ENABLED: &str = "app.maintenanceMode.enabled";

    /// The maintenance section (status, template, except, redirect, retry,
    /// refresh). Absent by default.
    pub const MAINTENANCE: &str = "app.maintenanceMode";

    /// Kernel settings (termination policy).
    pub const KERNEL: &str = "kernel";

    /// Logging settings (level, format).
    pub const LOGGING: &str = "logging";
}

/// A source of configuration values.
///
/// Implementations must be cheap to query; providers are shared across all
/// in-flight requests behind an `Arc`.
pub trait ConfigProvider: Send + Sync + std::fmt::Debug {
    /// Returns the value stored at the dotted `key`, if any.
    fn get(&self, key: &str) -> Option<Value>;
}

impl dyn ConfigProvider + '_ {
    /// Deserializes the value at `key`.
    ///
    /// Returns `Ok(None)` when the key is absent and `Err` when it is present
    /// but does not have the expected shape.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, serde_json::Error> {
        self.get(key).map(serde_json::from_value).transpose()
    }

    /// Deserializes the value at `key`, falling back to `default` when it is
    /// absent or malformed.
    pub fn get_or<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        match self.get_as(key) {
            Ok(Some(value)) => value,
            Ok(None) => default,
            Err(e) => {
                tracing::warn!(key, error = %e, "ignoring malformed configuration value");
                default
            }
        }
    }
}

impl ConfigProvider for Value {
    fn get(&self, key: &str) -> Option<Value> {
        lookup(self, key).cloned()
    }
}

/// Resolves a dotted path inside a JSON tree.
///
/// An empty key resolves to the root. `null` leaves count as absent.
#[must_use]
pub fn lookup<'a>(root: &'a Value, key: &str) -> Option<&'a Value> {
    if key.is_empty() {
        return Some(root);
    }
    let found = key
        .split('.')
        .try_fold(root, |node, segment| node.as_object()?.get(segment))?;
    (!found.is_null()).then_some(found)
}
