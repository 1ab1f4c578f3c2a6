//! Route actions, continuations and outcomes.
//!
//! A [`RouteAction`] is the unit of request handling: a maintenance gate, a
//! validator, a version selector and a controller are all route actions.
//! Each receives the [`ParameterBag`] and a [`Next`] continuation that resumes
//! the rest of the chain.
//!
//! # Forwarding vs. terminating
//!
//! ```text
//! call(bag, next) ──► next.run(bag).await   forwards to the next stage
//!                 └─► return Outcome::...   drops `next`; chain ends here
//! ```
//!
//! `Next` is consumed by [`Next::run`], so a stage can forward at most once.
//!
//! # Example
//!
//! ```
//! use portcullis_core::{action_fn, Outcome, RouteAction};
//!
//! let audit = action_fn("audit", |bag, next| {
//!     Box::pin(async move {
//!         tracing::debug!(path = bag.path(), "audited");
//!         next.run(bag).await
//!     })
//! });
//! assert_eq!(audit.name(), "audit");
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::bag::ParameterBag;

/// A boxed future returned by route actions.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A shared, type-erased route action.
pub type BoxedAction = Arc<dyn RouteAction>;

/// A unit of request handling.
///
/// # Invariants
///
/// - An action MUST NOT call `next` after sending the response body
/// - Side effects go through `bag.response_mut()` only
/// - Implementations are shared across concurrent requests and hold no
///   per-request state
pub trait RouteAction: Send + Sync + 'static {
    /// Returns a short name used in logs and pipeline introspection.
    fn name(&self) -> &'static str {
        "action"
    }

    /// Handles the request.
    ///
    /// Call `next.run(bag)` to forward; return without calling it to end the
    /// chain.
    fn call<'a>(&'a self, bag: &'a mut ParameterBag, next: Next<'a>) -> BoxFuture<'a, Outcome>;
}

impl<T: RouteAction + ?Sized> RouteAction for Arc<T> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn call<'a>(&'a self, bag: &'a mut ParameterBag, next: Next<'a>) -> BoxFuture<'a, Outcome> {
        (**self).call(bag, next)
    }
}

/// The continuation handed to every action.
///
/// Running it invokes the remaining actions in registration order. Dropping
/// it ends the chain.
pub struct Next<'a> {
    inner: NextInner<'a>,
}

enum NextInner<'a> {
    /// More actions to run.
    Chain {
        action: &'a dyn RouteAction,
        next: Box<Next<'a>>,
    },
    /// End of the chain; nobody handled the request.
    End,
}

impl<'a> Next<'a> {
    /// Creates a continuation that runs `action`, then `next`.
    #[must_use]
    pub fn new(action: &'a dyn RouteAction, next: Next<'a>) -> Self {
        Self {
            inner: NextInner::Chain {
                action,
                next: Box::new(next),
            },
        }
    }

    /// Creates the terminal continuation.
    ///
    /// Running it yields [`Outcome::Unhandled`].
    #[must_use]
    pub const fn end() -> Self {
        Self {
            inner: NextInner::End,
        }
    }

    /// Returns `true` if this continuation is the end of the chain.
    #[must_use]
    pub const fn is_end(&self) -> bool {
        matches!(self.inner, NextInner::End)
    }

    /// Runs the rest of the chain.
    ///
    /// This consumes `self` to ensure it can only be called once.
    pub async fn run(self, bag: &mut ParameterBag) -> Outcome {
        match self.inner {
            NextInner::Chain { action, next } => action.call(bag, *next).await,
            NextInner::End => Outcome::Unhandled,
        }
    }
}

impl std::fmt::Debug for Next<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.inner {
            NextInner::Chain { action, .. } => {
                f.debug_tuple("Next").field(&action.name()).finish()
            }
            NextInner::End => f.write_str("Next(end)"),
        }
    }
}

/// What a route action produced.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// An opaque result; the kernel serializes it as JSON.
    Value(Value),
    /// The action wrote everything it needed to the response.
    Empty,
    /// A structured rejection, e.g. `{"success":false,"message":"UNAUTHORIZED"}`.
    Rejected(Rejection),
    /// The end of the chain was reached without a handler.
    Unhandled,
    /// Hard stop requested. The kernel's termination policy decides whether
    /// only the request or the whole process ends.
    Terminate(Termination),
}

impl Outcome {
    /// Wraps any serializable value.
    ///
    /// Serialization failures become `Value::Null`, logged at warn level.
    pub fn value<T: Serialize>(value: &T) -> Self {
        match serde_json::to_value(value) {
            Ok(v) => Self::Value(v),
            Err(e) => {
                tracing::warn!(error = %e, "failed to serialize action result");
                Self::Value(Value::Null)
            }
        }
    }

    /// Returns the termination signal, if any.
    #[must_use]
    pub const fn termination(&self) -> Option<Termination> {
        match self {
            Self::Terminate(t) => Some(*t),
            _ => None,
        }
    }

    /// Returns `true` for [`Outcome::Rejected`].
    #[must_use]
    pub const fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }

    /// Returns the variant name used in log fields.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Value(_) => "value",
            Self::Empty => "empty",
            Self::Rejected(_) => "rejected",
            Self::Unhandled => "unhandled",
            Self::Terminate(_) => "terminate",
        }
    }
}

/// Structured failure returned by validation stages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    /// Always `false` for rejections.
    pub success: bool,
    /// Machine-readable reason, e.g. `UNAUTHORIZED`.
    pub message: String,
}

impl Rejection {
    /// Message used when authorization fails.
    pub const UNAUTHORIZED: &'static str = "UNAUTHORIZED";

    /// Message used when validation fails.
    pub const BAD_REQUEST: &'static str = "BAD_REQUEST";

    /// Creates a rejection with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }

    /// The authorization failure rejection.
    #[must_use]
    pub fn unauthorized() -> Self {
        Self::new(Self::UNAUTHORIZED)
    }

    /// The validation failure rejection.
    #[must_use]
    pub fn bad_request() -> Self {
        Self::new(Self::BAD_REQUEST)
    }
}

/// Why a stage asked for a hard stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Termination {
    /// Maintenance mode redirected the client elsewhere.
    Redirect,
    /// Maintenance mode served the maintenance response.
    Maintenance,
}

impl Termination {
    /// Returns the name used in log fields.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Redirect => "redirect",
            Self::Maintenance => "maintenance",
        }
    }
}

impl std::fmt::Display for Termination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A route action created from a closure that may forward.
///
/// Build one with [`action_fn`].
pub struct FnAction<F> {
    name: &'static str,
    func: F,
}

/// Creates a named action from a closure receiving the bag and the
/// continuation.
pub fn action_fn<F>(name: &'static str, func: F) -> FnAction<F>
where
    F: for<'a> Fn(&'a mut ParameterBag, Next<'a>) -> BoxFuture<'a, Outcome>
        + Send
        + Sync
        + 'static,
{
    FnAction { name, func }
}

impl<F> RouteAction for FnAction<F>
where
    F: for<'a> Fn(&'a mut ParameterBag, Next<'a>) -> BoxFuture<'a, Outcome>
        + Send
        + Sync
        + 'static,
{
    fn name(&self) -> &'static str {
        self.name
    }

    fn call<'a>(&'a self, bag: &'a mut ParameterBag, next: Next<'a>) -> BoxFuture<'a, Outcome> {
        (self.func)(bag, next)
    }
}

/// A terminal route action created from a synchronous closure.
///
/// The closure never sees the continuation, so the chain always ends here.
/// Build one with [`sync_action`].
pub struct SyncAction<F> {
    name: &'static str,
    func: F,
}

/// Creates a named terminal action from a synchronous closure.
///
/// ```
/// use portcullis_core::{sync_action, Outcome};
/// use serde_json::json;
///
/// let hello = sync_action("hello", |_bag| Outcome::Value(json!({ "hello": "world" })));
/// ```
pub fn sync_action<F>(name: &'static str, func: F) -> SyncAction<F>
where
    F: Fn(&mut ParameterBag) -> Outcome + Send + Sync + 'static,
{
    SyncAction { name, func }
}

impl<F> RouteAction for SyncAction<F>
where
    F: Fn(&mut ParameterBag) -> Outcome + Send + Sync + 'static,
{
    fn name(&self) -> &'static str {
        self.name
    }

    fn call<'a>(&'a self, bag: &'a mut ParameterBag, _next: Next<'a>) -> BoxFuture<'a, Outcome> {
        let outcome = (self.func)(bag);
        Box::pin(async move { outcome })
    }
}
