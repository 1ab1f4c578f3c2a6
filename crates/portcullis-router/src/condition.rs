//! Two-way branching between route actions.

use std::sync::Arc;

use portcullis_core::{BoxFuture, BoxedAction, Next, Outcome, ParameterBag, RouteAction};
use tracing::debug;

/// A predicate over the request state.
pub type Predicate = Arc<dyn Fn(&ParameterBag) -> bool + Send + Sync>;

/// What a [`ConditionGate`] branches on.
#[derive(Clone)]
pub enum Condition {
    /// Decided once, when the gate is built.
    Fixed(bool),
    /// Evaluated on every request.
    Predicate(Predicate),
}

impl Condition {
    /// Creates a predicate condition.
    pub fn predicate<F>(f: F) -> Self
    where
        F: Fn(&ParameterBag) -> bool + Send + Sync + 'static,
    {
        Self::Predicate(Arc::new(f))
    }
}

impl From<bool> for Condition {
    fn from(value: bool) -> Self {
        Self::Fixed(value)
    }
}

impl std::fmt::Debug for Condition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fixed(value) => f.debug_tuple("Fixed").field(value).finish(),
            Self::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

enum Branch {
    Fixed(BoxedAction),
    Dynamic {
        predicate: Predicate,
        on_true: BoxedAction,
        on_false: BoxedAction,
    },
}

/// Chooses between two route actions.
///
/// A fixed condition picks its branch at construction and the other action
/// is dropped. A predicate is evaluated exactly once per selection.
///
/// # Example
///
/// ```
/// use portcullis_core::{sync_action, Outcome};
/// use portcullis_router::{Condition, ConditionGate};
///
/// let gate = ConditionGate::new(
///     Condition::predicate(|bag| bag.request().headers().contains_key("x-beta")),
///     sync_action("beta", |_| Outcome::Empty),
///     sync_action("stable", |_| Outcome::Empty),
/// );
/// ```
pub struct ConditionGate {
    branch: Branch,
}

impl ConditionGate {
    /// Creates a gate running `on_true` when `condition` holds and `on_false`
    /// otherwise.
    pub fn new(
        condition: impl Into<Condition>,
        on_true: impl RouteAction,
        on_false: impl RouteAction,
    ) -> Self {
        Self::from_shared(condition, Arc::new(on_true), Arc::new(on_false))
    }

    /// Creates a gate from already shared actions.
    pub fn from_shared(
        condition: impl Into<Condition>,
        on_true: BoxedAction,
        on_false: BoxedAction,
    ) -> Self {
        let branch = match condition.into() {
            Condition::Fixed(true) => Branch::Fixed(on_true),
            Condition::Fixed(false) => Branch::Fixed(on_false),
            Condition::Predicate(predicate) => Branch::Dynamic {
                predicate,
                on_true,
                on_false,
            },
        };
        Self { branch }
    }

    /// Returns the action `bag` would be dispatched to, without calling it.
    #[must_use]
    pub fn select(&self, bag: &ParameterBag) -> &BoxedAction {
        match &self.branch {
            Branch::Fixed(action) => action,
            Branch::Dynamic {
                predicate,
                on_true,
                on_false,
            } => {
                if predicate(bag) {
                    on_true
                } else {
                    on_false
                }
            }
        }
    }

    /// Returns `true` if the branch was fixed at construction.
    #[must_use]
    pub const fn is_fixed(&self) -> bool {
        matches!(self.branch, Branch::Fixed(_))
    }
}

impl std::fmt::Debug for ConditionGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.branch {
            Branch::Fixed(action) => f
                .debug_struct("ConditionGate")
                .field("fixed", &action.name())
                .finish(),
            Branch::Dynamic {
                on_true, on_false, ..
            } => f
                .debug_struct("ConditionGate")
                .field("on_true", &on_true.name())
                .field("on_false", &on_false.name())
                .finish_non_exhaustive(),
        }
    }
}

impl RouteAction for ConditionGate {
    fn name(&self) -> &'static str {
        "condition_gate"
    }

    fn call<'a>(&'a self, bag: &'a mut ParameterBag, next: Next<'a>) -> BoxFuture<'a, Outcome> {
        Box::pin(async move {
            let action = self.select(bag);
            debug!(branch = action.name(), "condition resolved");
            action.call(bag, next).await
        })
    }
}
