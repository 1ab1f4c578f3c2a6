//! Kernel construction errors.

use http::Method;
use portcullis_config::ConfigError;
use portcullis_middleware::GateError;
use portcullis_router::RouteError;
use thiserror::Error;

/// Errors raised while building a [`Kernel`](crate::Kernel).
///
/// All of these are startup failures. Once built, a kernel never fails a
/// request with an error; per-request problems become response state.
#[derive(Debug, Error)]
pub enum KernelError {
    /// The maintenance gate could not be built from configuration.
    #[error("invalid maintenance configuration: {0}")]
    Gate(#[from] GateError),

    /// A version selector or other route component was misconfigured.
    #[error("invalid route: {0}")]
    Route(#[from] RouteError),

    /// A configuration section the kernel reads is malformed.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The same method and path were registered twice.
    #[error("route {method} {path} is already registered")]
    DuplicateRoute {
        /// HTTP method of the route.
        method: Method,
        /// Path of the route.
        path: String,
    },

    /// A route path does not start with `/`.
    #[error("route path `{path}` must start with '/'")]
    InvalidRoutePath {
        /// The rejected path.
        path: String,
    },
}

impl KernelError {
    /// Creates a duplicate route error.
    pub fn duplicate_route(method: Method, path: impl Into<String>) -> Self {
        Self::DuplicateRoute {
            method,
            path: path.into(),
        }
    }

    /// Creates an invalid route path error.
    pub fn invalid_route_path(path: impl Into<String>) -> Self {
        Self::InvalidRoutePath { path: path.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_route_display() {
        let err = KernelError::duplicate_route(Method::GET, "/users");
        assert_eq!(err.to_string(), "route GET /users is already registered");
    }

    #[test]
    fn test_invalid_route_path_display() {
        let err = KernelError::invalid_route_path("users");
        assert_eq!(err.to_string(), "route path `users` must start with '/'");
    }

    #[test]
    fn test_config_error_is_transparent() {
        let err = KernelError::from(ConfigError::invalid_value("kernel", "unknown field"));
        assert_eq!(err.to_string(), "invalid configuration value for kernel: unknown field");
    }

    #[test]
    fn test_gate_error_wraps() {
        let err = KernelError::from(GateError::InvalidStatus { status: 42 });
        assert!(err.to_string().starts_with("invalid maintenance configuration"));
    }
}
