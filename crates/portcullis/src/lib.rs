//! # Portcullis
//!
//! **A request-decision layer for HTTP applications.**
//!
//! Portcullis decides what happens to a request before and around the code
//! that handles it:
//!
//! - **Version negotiation** – pick a handler by the semver range in a header
//! - **Conditional branching** – pick between two handlers by a predicate
//! - **Validation** – answer `401`/`400` before the handler runs
//! - **Maintenance mode** – serve a maintenance page or redirect, with
//!   excepted paths
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//!
//! use portcullis::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConfigLoader::new()
//!         .with_optional_file("portcullis.toml")?
//!         .with_env_prefix("PORTCULLIS")
//!         .load()?;
//!     init_logging(&LogConfig::from_settings(&config.logging_settings()?))?;
//!
//!     let orders = VersionSelector::builder()
//!         .version("1.0.0", list_orders_v1)
//!         .version("2.0.0", list_orders_v2)
//!         .build()?;
//!
//!     let kernel = Kernel::builder(Arc::new(config))
//!         .route(Method::GET, "/orders", Route::new(orders).stage(auth))
//!         .build()?;
//!
//!     let handled = kernel.handle(request).await;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! Request → MaintenanceGate → global stages → route stages → RouteAction
//!                                                               │
//!                              VersionSelector / ConditionGate ─┤
//!                                                               ▼
//! Handled ← finalize (JSON value, rejection envelope, 404) ← Outcome
//! ```

#![doc(html_root_url = "https://docs.rs/portcullis/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod error;
mod kernel;
mod route;
mod shutdown;

pub use error::KernelError;
pub use kernel::{Handled, Kernel, KernelBuilder};
pub use route::Route;
pub use shutdown::ShutdownSignal;

// Re-export core types
pub use portcullis_core as core;

// Re-export router types
pub use portcullis_router as router;

// Re-export middleware types
pub use portcullis_middleware as middleware;

// Re-export configuration types
pub use portcullis_config as config;

// Re-export telemetry types
pub use portcullis_telemetry as telemetry;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use portcullis::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{Handled, Kernel, KernelError, Route, ShutdownSignal};

    pub use http::Method;

    pub use portcullis_core::{
        action_fn, sync_action, ConfigProvider, Next, Outcome, ParameterBag, Rejection,
        RouteAction, Termination,
    };

    pub use portcullis_router::{Condition, ConditionGate, RouteError, VersionSelector};

    pub use portcullis_middleware::{
        compose_validation_action, validator_fn, MaintenanceGate, Pipeline, RequestValidator,
        ValidationMiddleware, ValidationOutcome,
    };

    pub use portcullis_config::{ConfigLoader, ConfigRepository, TerminationPolicy};

    pub use portcullis_telemetry::{init_logging, LogConfig};
}
