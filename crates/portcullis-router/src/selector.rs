//! Header-driven handler versioning.
//!
//! A [`VersionSelector`] maps version labels to route actions. For each
//! request it reads a version requirement from a header (falling back to a
//! default), picks the highest labeled version satisfying it and invokes that
//! action with the same bag and continuation. When nothing matches, the
//! request is forwarded to `next` untouched.
//!
//! ```text
//! x-version: ^1.0.0 ─► requirement ─► { 2.0.0, 1.4.0, 1.0.0 } ─► 1.4.0 handler
//!     (absent)      ─► default    ─┘        highest first
//! ```
//!
//! # Example
//!
//! ```
//! use portcullis_core::{sync_action, Outcome};
//! use portcullis_router::VersionSelector;
//! use serde_json::json;
//!
//! let selector = VersionSelector::builder()
//!     .version("v1", sync_action("list_v1", |_| Outcome::Value(json!([]))))
//!     .version("v2", sync_action("list_v2", |_| Outcome::Value(json!({ "items": [] }))))
//!     .default_version("^1")
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(selector.versions().count(), 2);
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use http::header::HeaderName;
use portcullis_core::{BoxFuture, BoxedAction, Next, Outcome, ParameterBag, Request, RouteAction};
use tracing::debug;

use crate::error::RouteError;
use crate::version::{Version, VersionReq};

/// Header read when none is configured.
pub const DEFAULT_VERSION_HEADER: &str = "x-version";

/// Default requirement when none is configured: the highest version.
pub const DEFAULT_VERSION: &str = "*";

/// A route action registered under a version label.
pub struct VersionedAction {
    label: String,
    version: Version,
    action: BoxedAction,
}

impl VersionedAction {
    /// Returns the label as registered.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Returns the version the label coerced to.
    #[must_use]
    pub fn version(&self) -> Version {
        self.version
    }

    /// Returns the action.
    #[must_use]
    pub fn action(&self) -> &BoxedAction {
        &self.action
    }
}

impl std::fmt::Debug for VersionedAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VersionedAction")
            .field("label", &self.label)
            .field("version", &self.version)
            .field("action", &self.action.name())
            .finish()
    }
}

/// Selects a route action by the version requested in a header.
///
/// Immutable once built and safe to share across requests.
pub struct VersionSelector {
    /// Sorted highest version first.
    entries: Vec<VersionedAction>,
    default_version: VersionReq,
    header: HeaderName,
}

impl VersionSelector {
    /// Creates a selector from `(label, action)` pairs.
    ///
    /// # Errors
    ///
    /// - [`RouteError::EmptyVersionMap`] if `map` is empty
    /// - [`RouteError::InvalidVersionLabel`] if a label contains no version
    /// - [`RouteError::DuplicateVersion`] if two labels coerce to one version
    /// - [`RouteError::InvalidDefaultVersion`] if `default_version` does not parse
    /// - [`RouteError::InvalidHeaderName`] if `header_name` is not a header name
    pub fn new<I, L>(map: I, default_version: &str, header_name: &str) -> Result<Self, RouteError>
    where
        I: IntoIterator<Item = (L, BoxedAction)>,
        L: Into<String>,
    {
        let mut by_version: BTreeMap<Version, VersionedAction> = BTreeMap::new();
        for (label, action) in map {
            let label = label.into();
            let version = Version::coerce(&label).ok_or_else(|| RouteError::invalid_label(&label))?;
            if let Some(existing) = by_version.get(&version) {
                return Err(RouteError::DuplicateVersion {
                    version,
                    first: existing.label.clone(),
                    second: label,
                });
            }
            by_version.insert(
                version,
                VersionedAction {
                    label,
                    version,
                    action,
                },
            );
        }

        if by_version.is_empty() {
            return Err(RouteError::EmptyVersionMap);
        }

        let default_version = VersionReq::parse(default_version).map_err(|source| {
            RouteError::InvalidDefaultVersion {
                value: default_version.to_string(),
                source,
            }
        })?;

        let header = HeaderName::from_bytes(header_name.as_bytes()).map_err(|_| {
            RouteError::InvalidHeaderName {
                name: header_name.to_string(),
            }
        })?;

        Ok(Self {
            entries: by_version.into_values().rev().collect(),
            default_version,
            header,
        })
    }

    /// Starts building a selector with the default header and version.
    #[must_use]
    pub fn builder() -> VersionSelectorBuilder {
        VersionSelectorBuilder::default()
    }

    /// Returns the header the requirement is read from.
    #[must_use]
    pub fn header_name(&self) -> &HeaderName {
        &self.header
    }

    /// Returns the requirement used when the header is absent or invalid.
    #[must_use]
    pub fn default_version(&self) -> &VersionReq {
        &self.default_version
    }

    /// Returns the registered versions, highest first.
    pub fn versions(&self) -> impl Iterator<Item = Version> + '_ {
        self.entries.iter().map(|entry| entry.version)
    }

    /// Returns the requirement a request asks for.
    ///
    /// Only the first header value counts. A value that is not a requirement
    /// is coerced to `major.minor.patch` and read as a caret requirement, so
    /// `2.0.0-beta` asks for `^2.0.0`. A missing, blank or non-UTF-8 value,
    /// or one with no digits, yields the default requirement.
    #[must_use]
    pub fn requested_version(&self, request: &Request) -> VersionReq {
        let Some(raw) = request
            .headers()
            .get(&self.header)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
        else {
            return self.default_version.clone();
        };

        match VersionReq::parse(raw) {
            Ok(requirement) => requirement,
            Err(e) => {
                if let Some(version) = Version::coerce(raw) {
                    debug!(header = %self.header, value = raw, %version, "coerced version header");
                    return VersionReq::caret(version);
                }
                debug!(header = %self.header, value = raw, error = %e, "unusable version header, using default");
                self.default_version.clone()
            }
        }
    }

    /// Returns the highest registered version satisfying `requirement`.
    #[must_use]
    pub fn resolve(&self, requirement: &VersionReq) -> Option<&VersionedAction> {
        self.entries
            .iter()
            .find(|entry| requirement.matches(&entry.version))
    }

    /// Returns the action a request would be dispatched to, without calling it.
    #[must_use]
    pub fn select(&self, request: &Request) -> Option<&VersionedAction> {
        self.resolve(&self.requested_version(request))
    }
}

impl std::fmt::Debug for VersionSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VersionSelector")
            .field("entries", &self.entries)
            .field("default_version", &self.default_version.as_str())
            .field("header", &self.header)
            .finish()
    }
}

impl RouteAction for VersionSelector {
    fn name(&self) -> &'static str {
        "version_selector"
    }

    fn call<'a>(&'a self, bag: &'a mut ParameterBag, next: Next<'a>) -> BoxFuture<'a, Outcome> {
        Box::pin(async move {
            match self.select(bag.request()) {
                Some(entry) => {
                    debug!(
                        version = %entry.version,
                        label = %entry.label,
                        action = entry.action.name(),
                        "version selected"
                    );
                    entry.action.call(bag, next).await
                }
                None => {
                    debug!("no compatible version, forwarding");
                    next.run(bag).await
                }
            }
        })
    }
}

/// Builder for [`VersionSelector`].
#[derive(Default)]
#[must_use]
pub struct VersionSelectorBuilder {
    versions: Vec<(String, BoxedAction)>,
    default_version: Option<String>,
    header: Option<String>,
}

impl VersionSelectorBuilder {
    /// Registers `action` under `label`.
    pub fn version(mut self, label: impl Into<String>, action: impl RouteAction) -> Self {
        self.versions.push((label.into(), Arc::new(action)));
        self
    }

    /// Registers an already shared action under `label`.
    pub fn shared_version(mut self, label: impl Into<String>, action: BoxedAction) -> Self {
        self.versions.push((label.into(), action));
        self
    }

    /// Sets the requirement used when the header is absent (default `*`).
    pub fn default_version(mut self, requirement: impl Into<String>) -> Self {
        self.default_version = Some(requirement.into());
        self
    }

    /// Sets the header read for the requirement (default `x-version`).
    pub fn header(mut self, name: impl Into<String>) -> Self {
        self.header = Some(name.into());
        self
    }

    /// Builds the selector.
    ///
    /// # Errors
    ///
    /// See [`VersionSelector::new`].
    pub fn build(self) -> Result<VersionSelector, RouteError> {
        VersionSelector::new(
            self.versions,
            self.default_version.as_deref().unwrap_or(DEFAULT_VERSION),
            self.header.as_deref().unwrap_or(DEFAULT_VERSION_HEADER),
        )
    }
}
