//! The request kernel.
//!
//! A [`Kernel`] owns the maintenance gate, the global stages and the route
//! table. [`Kernel::handle`] runs one request through them and turns the
//! resulting [`Outcome`] into a finished response.
//!
//! ```text
//! Request ─► MaintenanceGate ─► global stages ─► route stages ─► action
//!                                                                   │
//! Handled ◄── finalize(outcome) ◄───────────────────────────────────┘
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use http::header::CONTENT_TYPE;
use http::{Method, StatusCode};
use portcullis_config::{ConfigError, KernelSettings, TerminationPolicy};
use portcullis_core::config::keys;
use portcullis_core::{
    BoxedAction, ConfigProvider, Next, Outcome, ParameterBag, Request, RequestId, Response,
    ResponseError, ResponseWriter, RouteAction,
};
use portcullis_middleware::{MaintenanceGate, Pipeline};
use portcullis_telemetry::{log_request_complete, log_request_start, log_request_terminated};
use serde_json::Value;
use tracing::{info_span, warn, Instrument};

use crate::error::KernelError;
use crate::route::Route;
use crate::shutdown::ShutdownSignal;

const APPLICATION_JSON: &str = "application/json";

/// The result of handling one request.
#[derive(Debug)]
pub struct Handled {
    request_id: RequestId,
    response: Response,
    outcome: Outcome,
    terminate_process: bool,
}

impl Handled {
    /// Returns the request ID assigned to the request.
    #[must_use]
    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// Returns the finished response.
    #[must_use]
    pub fn response(&self) -> &Response {
        &self.response
    }

    /// Returns the response status.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.response.status()
    }

    /// Returns what the chain produced.
    #[must_use]
    pub fn outcome(&self) -> &Outcome {
        &self.outcome
    }

    /// Returns `true` if the application should shut down once this response
    /// has been flushed.
    #[must_use]
    pub fn terminate_process(&self) -> bool {
        self.terminate_process
    }

    /// Consumes the result, returning the response.
    #[must_use]
    pub fn into_response(self) -> Response {
        self.response
    }
}

/// Runs requests through the maintenance gate, global stages and routes.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
///
/// use http::Method;
/// use portcullis::{Kernel, Route};
/// use portcullis_core::{sync_action, ConfigProvider, Outcome};
/// use serde_json::json;
///
/// # tokio_test::block_on(async {
/// let config: Arc<dyn ConfigProvider> = Arc::new(json!({}));
/// let kernel = Kernel::builder(config)
///     .route(Method::GET, "/ping", Route::new(sync_action("ping", |_| {
///         Outcome::Value(json!("pong"))
///     })))
///     .build()
///     .unwrap();
///
/// let request = http::Request::get("/ping").body(Default::default()).unwrap();
/// let handled = kernel.handle(request).await;
/// assert_eq!(handled.status(), http::StatusCode::OK);
/// # });
/// ```
pub struct Kernel {
    config: Arc<dyn ConfigProvider>,
    gate: MaintenanceGate,
    global: Pipeline,
    routes: HashMap<RouteKey, Route>,
    termination: TerminationPolicy,
    shutdown: ShutdownSignal,
}

type RouteKey = (Method, String);

impl Kernel {
    /// Creates a kernel builder reading configuration from `config`.
    #[must_use]
    pub fn builder(config: Arc<dyn ConfigProvider>) -> KernelBuilder {
        KernelBuilder::new(config)
    }

    /// Returns the maintenance gate.
    #[must_use]
    pub fn gate(&self) -> &MaintenanceGate {
        &self.gate
    }

    /// Returns the active termination policy.
    #[must_use]
    pub fn termination_policy(&self) -> TerminationPolicy {
        self.termination
    }

    /// Returns the signal triggered under [`TerminationPolicy::ExitProcess`].
    #[must_use]
    pub fn shutdown_signal(&self) -> &ShutdownSignal {
        &self.shutdown
    }

    /// Returns `true` if a route is registered for `method` and `path`.
    #[must_use]
    pub fn has_route(&self, method: &Method, path: &str) -> bool {
        self.routes.contains_key(&(method.clone(), path.to_string()))
    }

    /// Returns the number of registered routes.
    #[must_use]
    pub fn route_count(&self) -> usize {
        self.routes.len()
    }

    /// Returns the global stage names in order, gate first.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&'static str> {
        std::iter::once(self.gate.name())
            .chain(self.global.stage_names())
            .collect()
    }

    /// Handles one request.
    ///
    /// Never fails: every per-request problem is reflected in the response.
    pub async fn handle(&self, request: Request) -> Handled {
        let mut bag = ParameterBag::new(request, Arc::clone(&self.config));
        let request_id = bag.request_id();
        let method = bag.request().method().clone();
        let path = bag.path().to_string();

        let span = info_span!(
            "request",
            request_id = %request_id,
            method = %method,
            path = %path,
        );

        async move {
            log_request_start!(request_id, method, path);

            let outcome = self.dispatch(&mut bag, &method, &path).await;
            let terminate_process = self.apply_termination(&bag, &outcome);

            if let Err(e) = finalize(bag.response_mut(), &outcome) {
                warn!(error = %e, outcome = outcome.kind(), "could not finalize response");
            }

            let elapsed_ms = bag.elapsed().as_secs_f64() * 1000.0;
            let (_, writer) = bag.into_parts();
            let response = writer.into_response();
            log_request_complete!(
                request_id,
                response.status().as_u16(),
                outcome.kind(),
                elapsed_ms
            );

            Handled {
                request_id,
                response,
                outcome,
                terminate_process,
            }
        }
        .instrument(span)
        .await
    }

    async fn dispatch(&self, bag: &mut ParameterBag, method: &Method, path: &str) -> Outcome {
        let tail = self
            .routes
            .get(&(method.clone(), path.to_string()))
            .map_or_else(Next::end, Route::chain);
        let chain = Next::new(&self.gate, self.global.chain(tail));
        chain.run(bag).await
    }

    fn apply_termination(&self, bag: &ParameterBag, outcome: &Outcome) -> bool {
        let Some(termination) = outcome.termination() else {
            return false;
        };

        log_request_terminated!(bag.request_id(), bag.response().status().as_u16(), termination);
        match self.termination {
            TerminationPolicy::EndRequest => false,
            TerminationPolicy::ExitProcess => {
                warn!(reason = %termination, "requesting application shutdown");
                self.shutdown.trigger();
                true
            }
        }
    }
}

impl std::fmt::Debug for Kernel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Kernel")
            .field("gate", &self.gate.mode())
            .field("global", &self.global)
            .field("routes", &self.routes.len())
            .field("termination", &self.termination)
            .finish_non_exhaustive()
    }
}

/// Writes the outcome into a response that no stage has sent yet.
fn finalize(res: &mut ResponseWriter, outcome: &Outcome) -> Result<(), ResponseError> {
    if res.is_sent() {
        return Ok(());
    }

    match outcome {
        Outcome::Value(value) => send_json(res, value),
        Outcome::Rejected(rejection) => match serde_json::to_value(rejection) {
            Ok(value) => send_json(res, &value),
            Err(e) => send_error(res, &e),
        },
        Outcome::Unhandled => {
            if !res.is_head_written() {
                res.write_head(StatusCode::NOT_FOUND)?;
            }
            res.send_empty()
        }
        Outcome::Empty | Outcome::Terminate(_) => res.send_empty(),
    }
}

fn send_json(res: &mut ResponseWriter, value: &Value) -> Result<(), ResponseError> {
    let body = match serde_json::to_vec(value) {
        Ok(body) => body,
        Err(e) => return send_error(res, &e),
    };
    if !res.is_head_written() && !res.headers().contains_key(CONTENT_TYPE) {
        res.append_header(CONTENT_TYPE.as_str(), APPLICATION_JSON)?;
    }
    res.send(body)
}

fn send_error(res: &mut ResponseWriter, error: &serde_json::Error) -> Result<(), ResponseError> {
    warn!(error = %error, "failed to serialize outcome");
    if !res.is_head_written() {
        res.write_head(StatusCode::INTERNAL_SERVER_ERROR)?;
    }
    res.send_empty()
}

/// Builder for a [`Kernel`].
pub struct KernelBuilder {
    config: Arc<dyn ConfigProvider>,
    global: Pipeline,
    routes: Vec<(Method, String, Route)>,
    termination: Option<TerminationPolicy>,
    shutdown: Option<ShutdownSignal>,
}

impl KernelBuilder {
    fn new(config: Arc<dyn ConfigProvider>) -> Self {
        Self {
            config,
            global: Pipeline::default(),
            routes: Vec::new(),
            termination: None,
            shutdown: None,
        }
    }

    /// Appends a global stage. Global stages run after the maintenance gate
    /// and before route middleware, in the order added.
    #[must_use]
    pub fn stage(self, stage: impl RouteAction) -> Self {
        self.shared_stage(Arc::new(stage))
    }

    /// Appends an already shared global stage.
    #[must_use]
    pub fn shared_stage(mut self, stage: BoxedAction) -> Self {
        self.global.push(stage);
        self
    }

    /// Registers `route` for an exact `method` and `path`.
    #[must_use]
    pub fn route(mut self, method: Method, path: impl Into<String>, route: Route) -> Self {
        self.routes.push((method, path.into(), route));
        self
    }

    /// Overrides the `kernel.termination` setting.
    #[must_use]
    pub fn termination_policy(mut self, policy: TerminationPolicy) -> Self {
        self.termination = Some(policy);
        self
    }

    /// Uses `signal` instead of a fresh [`ShutdownSignal`].
    #[must_use]
    pub fn shutdown_signal(mut self, signal: ShutdownSignal) -> Self {
        self.shutdown = Some(signal);
        self
    }

    /// Builds the kernel.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError`] if the maintenance or kernel configuration is
    /// unusable, or a route is registered twice or with a relative path.
    pub fn build(self) -> Result<Kernel, KernelError> {
        let gate = MaintenanceGate::from_config(self.config.as_ref())?;

        let termination = match self.termination {
            Some(policy) => policy,
            None => read_kernel_settings(self.config.as_ref())?.termination,
        };

        let mut routes = HashMap::with_capacity(self.routes.len());
        for (method, path, route) in self.routes {
            if !path.starts_with('/') {
                return Err(KernelError::invalid_route_path(path));
            }
            let key = (method, path);
            if routes.contains_key(&key) {
                let (method, path) = key;
                return Err(KernelError::duplicate_route(method, path));
            }
            routes.insert(key, route);
        }

        tracing::debug!(
            routes = routes.len(),
            global_stages = self.global.stage_count(),
            termination = ?termination,
            "kernel built"
        );

        Ok(Kernel {
            config: self.config,
            gate,
            global: self.global,
            routes,
            termination,
            shutdown: self.shutdown.unwrap_or_default(),
        })
    }
}

fn read_kernel_settings(config: &dyn ConfigProvider) -> Result<KernelSettings, ConfigError> {
    config
        .get_as::<KernelSettings>(keys::KERNEL)
        .map(Option::unwrap_or_default)
        .map_err(|e| ConfigError::invalid_value(keys::KERNEL, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http_body_util::{BodyExt, Full};
    use portcullis_core::{action_fn, sync_action, Rejection};
    use serde_json::json;

    fn request(method: Method, uri: &str) -> Request {
        http::Request::builder()
            .method(method)
            .uri(uri)
            .body(Full::new(Bytes::new()))
            .unwrap()
    }

    async fn body_of(handled: Handled) -> Bytes {
        handled
            .into_response()
            .into_body()
            .collect()
            .await
            .unwrap()
            .to_bytes()
    }

    fn kernel(config: Value) -> KernelBuilder {
        Kernel::builder(Arc::new(config))
    }

    #[tokio::test]
    async fn test_value_is_serialized_as_json() {
        let kernel = kernel(json!({}))
            .route(
                Method::GET,
                "/users",
                Route::new(sync_action("users", |_| Outcome::Value(json!([{ "id": 1 }])))),
            )
            .build()
            .unwrap();

        let handled = kernel.handle(request(Method::GET, "/users")).await;
        assert_eq!(handled.status(), StatusCode::OK);
        assert_eq!(
            handled.response().headers().get(CONTENT_TYPE).unwrap(),
            APPLICATION_JSON
        );
        assert!(!handled.terminate_process());
        assert_eq!(body_of(handled).await, Bytes::from_static(br#"[{"id":1}]"#));
    }

    #[tokio::test]
    async fn test_unknown_route_is_not_found() {
        let kernel = kernel(json!({})).build().unwrap();
        let handled = kernel.handle(request(Method::GET, "/missing")).await;
        assert_eq!(handled.status(), StatusCode::NOT_FOUND);
        assert_eq!(handled.outcome(), &Outcome::Unhandled);
    }

    #[tokio::test]
    async fn test_method_is_part_of_route_key() {
        let kernel = kernel(json!({}))
            .route(Method::POST, "/users", Route::new(sync_action("create", |_| Outcome::Empty)))
            .build()
            .unwrap();

        assert!(kernel.has_route(&Method::POST, "/users"));
        let handled = kernel.handle(request(Method::GET, "/users")).await;
        assert_eq!(handled.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_rejection_keeps_stage_status() {
        let reject = action_fn("reject", |bag, _next| {
            Box::pin(async move {
                bag.response_mut().set_status(StatusCode::FORBIDDEN).unwrap();
                Outcome::Rejected(Rejection::new("FORBIDDEN"))
            })
        });
        let kernel = kernel(json!({}))
            .stage(reject)
            .route(Method::GET, "/", Route::new(sync_action("home", |_| Outcome::Empty)))
            .build()
            .unwrap();

        let handled = kernel.handle(request(Method::GET, "/")).await;
        assert_eq!(handled.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            body_of(handled).await,
            Bytes::from_static(br#"{"success":false,"message":"FORBIDDEN"}"#)
        );
    }

    #[tokio::test]
    async fn test_sent_response_is_left_alone() {
        let action = sync_action("raw", |bag| {
            bag.response_mut().send("raw body").unwrap();
            Outcome::Value(json!("ignored"))
        });
        let kernel = kernel(json!({}))
            .route(Method::GET, "/raw", Route::new(action))
            .build()
            .unwrap();

        let handled = kernel.handle(request(Method::GET, "/raw")).await;
        assert!(handled.response().headers().get(CONTENT_TYPE).is_none());
        assert_eq!(body_of(handled).await, Bytes::from_static(b"raw body"));
    }

    #[test]
    fn test_duplicate_route_is_rejected() {
        let err = kernel(json!({}))
            .route(Method::GET, "/a", Route::new(sync_action("a", |_| Outcome::Empty)))
            .route(Method::GET, "/a", Route::new(sync_action("b", |_| Outcome::Empty)))
            .build()
            .unwrap_err();
        assert!(matches!(err, KernelError::DuplicateRoute { .. }));
    }

    #[test]
    fn test_relative_route_path_is_rejected() {
        let err = kernel(json!({}))
            .route(Method::GET, "a", Route::new(sync_action("a", |_| Outcome::Empty)))
            .build()
            .unwrap_err();
        assert!(matches!(err, KernelError::InvalidRoutePath { .. }));
    }

    #[test]
    fn test_termination_policy_from_config() {
        let kernel = kernel(json!({ "kernel": { "termination": "exit_process" } }))
            .build()
            .unwrap();
        assert_eq!(kernel.termination_policy(), TerminationPolicy::ExitProcess);

        let kernel = kernel_default();
        assert_eq!(kernel.termination_policy(), TerminationPolicy::EndRequest);
    }

    fn kernel_default() -> Kernel {
        kernel(json!({})).build().unwrap()
    }

    #[test]
    fn test_malformed_kernel_section_fails() {
        let err = kernel(json!({ "kernel": { "termination": "sometimes" } }))
            .build()
            .unwrap_err();
        assert!(matches!(err, KernelError::Config(_)));
    }

    #[test]
    fn test_invalid_maintenance_status_fails() {
        let err = kernel(json!({ "app": { "maintenanceMode": { "enabled": true, "status": 1000 } } }))
            .build()
            .unwrap_err();
        assert!(matches!(err, KernelError::Gate(_)));
    }

    #[test]
    fn test_stage_names_start_with_gate() {
        let kernel = kernel(json!({}))
            .stage(sync_action("audit", |_| Outcome::Empty))
            .build()
            .unwrap();
        assert_eq!(kernel.stage_names(), vec!["maintenance", "audit"]);
    }
}
