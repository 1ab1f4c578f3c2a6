//! # Portcullis Core
//!
//! Core types shared by every Portcullis crate.
//!
//! This crate provides the vocabulary of request dispatch:
//!
//! - [`ParameterBag`] - Per-request state threaded through the pipeline
//! - [`ResponseWriter`] - The response under construction, with a sent guard
//! - [`RouteAction`] / [`Next`] - A unit of request handling and its continuation
//! - [`Outcome`] - What an action produced (value, rejection, termination, ...)
//! - [`ConfigProvider`] - Narrow read-only view of application configuration
//! - [`RequestId`] - UUID v7 request identifier used for log correlation
//!
//! ## Dispatch model
//!
//! ```text
//! Request ─► ParameterBag ─► stage 1 ─► stage 2 ─► ... ─► route action
//!                               │           │
//!                               └─ may answer and drop `next`
//! ```
//!
//! A stage forwards by consuming its [`Next`]. Dropping it ends the chain for
//! this request; the response written so far is what the client receives.

#![doc(html_root_url = "https://docs.rs/portcullis-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod action;
mod bag;
pub mod config;
mod context;
mod error;
mod response;
pub mod types;

pub use action::{
    action_fn, sync_action, BoxFuture, BoxedAction, FnAction, Next, Outcome, Rejection,
    RouteAction, SyncAction, Termination,
};
pub use bag::ParameterBag;
pub use config::ConfigProvider;
pub use context::RequestId;
pub use error::ResponseError;
pub use response::ResponseWriter;
pub use types::{Request, Response};
