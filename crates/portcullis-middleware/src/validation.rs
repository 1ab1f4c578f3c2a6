//! Authorization and validation gate.
//!
//! A [`RequestValidator`] supplies two checks. [`ValidationMiddleware`] runs
//! them in order and either rejects the request or forwards it:
//!
//! | Check fails | Status | Outcome |
//! |-------------|--------|---------|
//! | `authorize` | `401 Unauthorized` | `Rejected { success: false, message: "UNAUTHORIZED" }` |
//! | `validate`  | `400 Bad Request`  | `Rejected { success: false, message: "BAD_REQUEST" }` |
//! | neither     | unchanged          | whatever `next` returns |
//!
//! The middleware only sets the status. Serializing the rejection body is
//! left to the kernel.

use std::sync::Arc;

use http::StatusCode;
use portcullis_core::{
    BoxFuture, BoxedAction, Next, Outcome, ParameterBag, Rejection, RouteAction,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Result of a [`RequestValidator::validate`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    /// Whether the request is valid.
    pub success: bool,
    /// Human-readable problems; empty on success.
    #[serde(default)]
    pub errors: Vec<String>,
}

impl ValidationOutcome {
    /// A successful validation.
    #[must_use]
    pub fn valid() -> Self {
        Self {
            success: true,
            errors: Vec::new(),
        }
    }

    /// A failed validation with the given problems.
    pub fn invalid<I, S>(errors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            success: false,
            errors: errors.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns `true` on success.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.success
    }
}

/// Checks a request before it reaches its handler.
///
/// Both checks may suspend.
pub trait RequestValidator: Send + Sync + 'static {
    /// Returns a short name used in logs.
    fn name(&self) -> &'static str {
        "validator"
    }

    /// Returns `true` if the caller may perform the request.
    fn authorize<'a>(&'a self, bag: &'a ParameterBag) -> BoxFuture<'a, bool>;

    /// Checks the request contents.
    fn validate<'a>(&'a self, bag: &'a ParameterBag) -> BoxFuture<'a, ValidationOutcome>;
}

impl<T: RequestValidator + ?Sized> RequestValidator for Arc<T> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn authorize<'a>(&'a self, bag: &'a ParameterBag) -> BoxFuture<'a, bool> {
        (**self).authorize(bag)
    }

    fn validate<'a>(&'a self, bag: &'a ParameterBag) -> BoxFuture<'a, ValidationOutcome> {
        (**self).validate(bag)
    }
}

/// A validator built from two synchronous closures.
///
/// Build one with [`validator_fn`].
pub struct FnValidator<A, V> {
    name: &'static str,
    authorize: A,
    validate: V,
}

/// Creates a named validator from synchronous `authorize` and `validate`
/// closures.
///
/// ```
/// use portcullis_middleware::{validator_fn, ValidationOutcome};
///
/// let api_key = validator_fn(
///     "api_key",
///     |bag| bag.request().headers().contains_key("x-api-key"),
///     |_| ValidationOutcome::valid(),
/// );
/// ```
pub fn validator_fn<A, V>(name: &'static str, authorize: A, validate: V) -> FnValidator<A, V>
where
    A: Fn(&ParameterBag) -> bool + Send + Sync + 'static,
    V: Fn(&ParameterBag) -> ValidationOutcome + Send + Sync + 'static,
{
    FnValidator {
        name,
        authorize,
        validate,
    }
}

impl<A, V> RequestValidator for FnValidator<A, V>
where
    A: Fn(&ParameterBag) -> bool + Send + Sync + 'static,
    V: Fn(&ParameterBag) -> ValidationOutcome + Send + Sync + 'static,
{
    fn name(&self) -> &'static str {
        self.name
    }

    fn authorize<'a>(&'a self, bag: &'a ParameterBag) -> BoxFuture<'a, bool> {
        let allowed = (self.authorize)(bag);
        Box::pin(async move { allowed })
    }

    fn validate<'a>(&'a self, bag: &'a ParameterBag) -> BoxFuture<'a, ValidationOutcome> {
        let outcome = (self.validate)(bag);
        Box::pin(async move { outcome })
    }
}

/// Runs a [`RequestValidator`] in front of the rest of the chain.
///
/// # Example
///
/// ```
/// use portcullis_middleware::{validator_fn, ValidationMiddleware, ValidationOutcome};
///
/// let middleware = ValidationMiddleware::new(validator_fn(
///     "always",
///     |_| true,
///     |_| ValidationOutcome::valid(),
/// ));
/// let action = middleware.get_action();
/// assert_eq!(action.name(), "validation");
/// ```
#[derive(Clone)]
pub struct ValidationMiddleware {
    validator: Arc<dyn RequestValidator>,
}

impl ValidationMiddleware {
    /// Wraps `validator`.
    pub fn new(validator: impl RequestValidator) -> Self {
        Self {
            validator: Arc::new(validator),
        }
    }

    /// Wraps an already shared validator.
    #[must_use]
    pub fn from_shared(validator: Arc<dyn RequestValidator>) -> Self {
        Self { validator }
    }

    /// Returns the middleware as a shareable route action.
    #[must_use]
    pub fn get_action(&self) -> BoxedAction {
        Arc::new(self.clone())
    }

    /// Re-runs only the authorization check against `bag`.
    pub async fn is_valid(&self, bag: &ParameterBag) -> bool {
        self.validator.authorize(bag).await
    }

    async fn check(&self, bag: &ParameterBag) -> Result<(), (StatusCode, Rejection)> {
        if !self.validator.authorize(bag).await {
            return Err((StatusCode::UNAUTHORIZED, Rejection::unauthorized()));
        }

        let outcome = self.validator.validate(bag).await;
        if !outcome.is_valid() {
            debug!(
                validator = self.validator.name(),
                errors = ?outcome.errors,
                "request failed validation"
            );
            return Err((StatusCode::BAD_REQUEST, Rejection::bad_request()));
        }

        Ok(())
    }
}

impl std::fmt::Debug for ValidationMiddleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidationMiddleware")
            .field("validator", &self.validator.name())
            .finish()
    }
}

impl RouteAction for ValidationMiddleware {
    fn name(&self) -> &'static str {
        "validation"
    }

    fn call<'a>(&'a self, bag: &'a mut ParameterBag, next: Next<'a>) -> BoxFuture<'a, Outcome> {
        Box::pin(async move {
            match self.check(bag).await {
                Ok(()) => next.run(bag).await,
                Err((status, rejection)) => {
                    debug!(
                        validator = self.validator.name(),
                        status = status.as_u16(),
                        message = %rejection.message,
                        "request rejected"
                    );
                    if let Err(e) = bag.response_mut().set_status(status) {
                        warn!(error = %e, "could not set rejection status");
                    }
                    Outcome::Rejected(rejection)
                }
            }
        })
    }
}

/// Builds the validation route action for `validator`.
pub fn compose_validation_action(validator: impl RequestValidator) -> BoxedAction {
    ValidationMiddleware::new(validator).get_action()
}
