//! Layered configuration for Portcullis applications.
//!
//! This crate loads the configuration tree every Portcullis component reads
//! through [`ConfigProvider`](portcullis_core::ConfigProvider):
//! - TOML and JSON configuration files
//! - `.env` files via `dotenvy`
//! - Environment variable overrides
//! - Layered configuration (defaults → files → env), deep-merged
//!
//! # Example
//!
//! ```no_run
//! use portcullis_config::ConfigLoader;
//!
//! # fn main() -> Result<(), portcullis_config::ConfigError> {
//! let config = ConfigLoader::new()
//!     .with_optional_file("portcullis.toml")?
//!     .with_env_prefix("PORTCULLIS")
//!     .load()?;
//!
//! println!("termination policy: {:?}", config.kernel_settings()?.termination);
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration File Format
//!
//! ```toml
//! [app.maintenanceMode]
//! enabled = true
//! status = 503
//! template = "<h1>Back soon</h1>"
//! except = ["/health"]
//! retry = 120
//!
//! [kernel]
//! termination = "end_request"   # or "exit_process"
//!
//! [logging]
//! level = "info"
//! format = "json"               # or "pretty"
//! ```
//!
//! # Environment Variable Overrides
//!
//! Any key can be overridden with `PREFIX__SECTION__KEY`. Segments match
//! existing keys ignoring case and underscores:
//!
//! - `PORTCULLIS__APP__MAINTENANCE_MODE__ENABLED=true`
//! - `PORTCULLIS__LOGGING__LEVEL=debug`

mod error;
mod loader;
mod repository;
mod settings;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use repository::ConfigRepository;
pub use settings::{KernelSettings, LogFormat, LoggingSettings, TerminationPolicy};
