//! # Portcullis Middleware
//!
//! The ordered stage pipeline and the built-in gates that run in front of
//! route actions.
//!
//! ```text
//! Request → MaintenanceGate → global stages → route stages → RouteAction
//!                │                  │               │
//!                └── Terminate      └── Rejected ───┘   (any stage may stop)
//! ```
//!
//! | Component | Purpose |
//! |-----------|---------|
//! | [`Pipeline`] | Runs stages in registration order, each deciding continue or stop |
//! | [`ValidationMiddleware`] | `401` on failed authorization, `400` on failed validation |
//! | [`MaintenanceGate`] | Serves the maintenance response or redirect while enabled |
//!
//! Every component is a [`RouteAction`](portcullis_core::RouteAction), so
//! pipelines nest and gates can be placed anywhere in a chain.

pub mod maintenance;
pub mod pipeline;
pub mod validation;

pub use maintenance::{
    GateError, GateMode, MaintenanceConfig, MaintenanceGate, DEFAULT_STATUS, DEFAULT_TEMPLATE,
};
pub use pipeline::{Pipeline, PipelineBuilder};
pub use validation::{
    compose_validation_action, validator_fn, FnValidator, RequestValidator, ValidationMiddleware,
    ValidationOutcome,
};
