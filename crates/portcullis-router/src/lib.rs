//! Request-time dispatch decisions for Portcullis.
//!
//! This crate chooses *which* route action handles a request:
//!
//! - [`VersionSelector`]: picks a handler by the semantic version requested in
//!   a header, falling back to a default requirement
//! - [`ConditionGate`]: picks one of two handlers from a fixed flag or a
//!   per-request predicate
//!
//! Both are themselves [`RouteAction`](portcullis_core::RouteAction)s and can
//! be nested inside each other or used as the final action of a route.
//!
//! # Example
//!
//! ```rust
//! use portcullis_core::{sync_action, Outcome};
//! use portcullis_router::{ConditionGate, VersionSelector};
//! use serde_json::json;
//!
//! let orders = VersionSelector::builder()
//!     .version("1.0.0", sync_action("orders_v1", |_| Outcome::Value(json!([]))))
//!     .version("2.0.0", sync_action("orders_v2", |_| Outcome::Value(json!({ "orders": [] }))))
//!     .build()
//!     .unwrap();
//!
//! let gated = ConditionGate::new(
//!     true,
//!     orders,
//!     sync_action("disabled", |_| Outcome::Unhandled),
//! );
//! ```

mod condition;
mod error;
mod selector;
pub mod version;

pub use condition::{Condition, ConditionGate, Predicate};
pub use error::RouteError;
pub use selector::{
    VersionSelector, VersionSelectorBuilder, VersionedAction, DEFAULT_VERSION,
    DEFAULT_VERSION_HEADER,
};
pub use version::{Version, VersionError, VersionReq};
