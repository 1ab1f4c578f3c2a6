//! Registration errors for routing components.

use thiserror::Error;

use crate::version::{Version, VersionError};

/// Errors raised while building a router component.
///
/// All of these are configuration mistakes and are reported at startup,
/// never per request.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RouteError {
    /// A version selector was given no handlers.
    #[error("version map is empty")]
    EmptyVersionMap,

    /// A version label contains no version number.
    #[error("version label `{label}` does not contain a version number")]
    InvalidVersionLabel {
        /// The offending label.
        label: String,
    },

    /// Two labels coerce to the same version.
    #[error("version labels `{first}` and `{second}` both resolve to {version}")]
    DuplicateVersion {
        /// The shared version.
        version: Version,
        /// The label registered first.
        first: String,
        /// The label registered second.
        second: String,
    },

    /// The default version is not a valid requirement.
    #[error("default version `{value}` is invalid: {source}")]
    InvalidDefaultVersion {
        /// The configured default.
        value: String,
        /// Why it failed to parse.
        #[source]
        source: VersionError,
    },

    /// The version header name is not a valid HTTP header name.
    #[error("invalid version header name `{name}`")]
    InvalidHeaderName {
        /// The configured header name.
        name: String,
    },
}

impl RouteError {
    /// Creates an invalid label error.
    pub fn invalid_label(label: impl Into<String>) -> Self {
        Self::InvalidVersionLabel {
            label: label.into(),
        }
    }
}
