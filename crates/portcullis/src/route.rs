//! Route registrations.

use std::sync::Arc;

use portcullis_core::{BoxedAction, Next, RouteAction};
use portcullis_middleware::Pipeline;

/// A route action with its own ordered middleware.
///
/// The action may be any [`RouteAction`], including a
/// [`VersionSelector`](portcullis_router::VersionSelector) or a
/// [`ConditionGate`](portcullis_router::ConditionGate).
///
/// ```
/// use portcullis::Route;
/// use portcullis_core::{sync_action, Outcome};
/// use portcullis_middleware::{validator_fn, ValidationMiddleware, ValidationOutcome};
///
/// let route = Route::new(sync_action("orders.index", |_| Outcome::Empty))
///     .stage(ValidationMiddleware::new(validator_fn(
///         "always",
///         |_| true,
///         |_| ValidationOutcome::valid(),
///     )));
///
/// assert_eq!(route.action_name(), "orders.index");
/// assert_eq!(route.stage_names(), vec!["validation"]);
/// ```
#[derive(Clone)]
pub struct Route {
    action: BoxedAction,
    stages: Pipeline,
}

impl Route {
    /// Creates a route that runs `action` with no route middleware.
    pub fn new(action: impl RouteAction) -> Self {
        Self::from_shared(Arc::new(action))
    }

    /// Creates a route from an already shared action.
    #[must_use]
    pub fn from_shared(action: BoxedAction) -> Self {
        Self {
            action,
            stages: Pipeline::default(),
        }
    }

    /// Appends a route middleware. Stages run in the order added.
    #[must_use]
    pub fn stage(self, stage: impl RouteAction) -> Self {
        self.shared_stage(Arc::new(stage))
    }

    /// Appends an already shared route middleware.
    #[must_use]
    pub fn shared_stage(mut self, stage: BoxedAction) -> Self {
        self.stages.push(stage);
        self
    }

    /// Returns the action name.
    #[must_use]
    pub fn action_name(&self) -> &'static str {
        self.action.name()
    }

    /// Returns the route middleware names in order.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.stage_names()
    }

    /// Builds the continuation running the route middleware, then the action.
    pub(crate) fn chain(&self) -> Next<'_> {
        self.stages.chain(Next::new(self.action.as_ref(), Next::end()))
    }
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route")
            .field("action", &self.action.name())
            .field("stages", &self.stage_names())
            .finish()
    }
}
