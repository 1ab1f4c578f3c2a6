//! Logging setup for Portcullis.
//!
//! Portcullis components log through [`tracing`]; this crate installs the
//! subscriber that renders those events, configured from the `logging`
//! section of the configuration tree.
//!
//! # Example
//!
//! ```rust,ignore
//! use portcullis_config::ConfigLoader;
//! use portcullis_telemetry::{init_logging, LogConfig};
//!
//! let config = ConfigLoader::new().with_env_prefix("PORTCULLIS").load()?;
//! init_logging(&LogConfig::from_settings(&config.logging_settings()?))?;
//! ```

#![doc(html_root_url = "https://docs.rs/portcullis-telemetry/0.1.0")]

pub mod error;
pub mod logging;

pub use error::TelemetryError;
pub use logging::{create_env_filter, init_logging, LogConfig};

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;
