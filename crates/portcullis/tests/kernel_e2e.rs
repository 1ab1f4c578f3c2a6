//! End-to-end kernel tests.
//!
//! Each test builds a kernel from a JSON configuration tree and drives real
//! `http::Request`s through it:
//!
//! 1. Conditional branching (fixed and predicate)
//! 2. Version negotiation through the `x-version` header
//! 3. Validation gate responses
//! 4. Maintenance mode, exceptions and redirects
//! 5. Termination policy

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use http::header::{CONTENT_TYPE, LOCATION, RETRY_AFTER};
use http::{Method, StatusCode};
use http_body_util::{BodyExt, Full};
use portcullis::config::TerminationPolicy;
use portcullis::core::{sync_action, ConfigProvider, Outcome, RouteAction, Termination};
use portcullis::middleware::{validator_fn, ValidationMiddleware, ValidationOutcome};
use portcullis::router::{Condition, ConditionGate, VersionSelector};
use portcullis::{Handled, Kernel, KernelError, Route, ShutdownSignal};
use proptest::prelude::*;
use serde_json::{json, Value};

// ============================================================================
// Helpers
// ============================================================================

fn get(uri: &str) -> http::Request<Full<Bytes>> {
    http::Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Full::new(Bytes::new()))
        .unwrap()
}

fn get_with(uri: &str, name: &str, value: &str) -> http::Request<Full<Bytes>> {
    http::Request::builder()
        .method(Method::GET)
        .uri(uri)
        .header(name, value)
        .body(Full::new(Bytes::new()))
        .unwrap()
}

async fn body_json(handled: Handled) -> Value {
    let bytes = handled
        .into_response()
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_bytes(handled: Handled) -> Bytes {
    handled
        .into_response()
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
}

fn named(name: &'static str) -> impl RouteAction {
    sync_action(name, move |_| Outcome::Value(json!({ "handler": name })))
}

fn counting(name: &'static str, calls: &Arc<AtomicUsize>) -> impl RouteAction {
    let calls = Arc::clone(calls);
    sync_action(name, move |_| {
        calls.fetch_add(1, Ordering::SeqCst);
        Outcome::Value(json!({ "handler": name }))
    })
}

fn config(value: Value) -> Arc<dyn ConfigProvider> {
    Arc::new(value)
}

fn maintenance(section: Value) -> Arc<dyn ConfigProvider> {
    let mut section = section;
    section["enabled"] = json!(true);
    config(json!({ "app": { "maintenanceMode": section } }))
}

fn orders_selector() -> Result<VersionSelector, KernelError> {
    Ok(VersionSelector::builder()
        .version("1.0.0", named("orders.v1"))
        .version("2.0.0", named("orders.v2"))
        .build()?)
}

fn versioned_kernel() -> Kernel {
    Kernel::builder(config(json!({})))
        .route(Method::GET, "/orders", Route::new(orders_selector().unwrap()))
        .build()
        .unwrap()
}

// ============================================================================
// Conditional branching
// ============================================================================

#[tokio::test]
async fn test_fixed_condition_routes_to_matching_branch() {
    for (flag, expected) in [(true, "yes"), (false, "no")] {
        let kernel = Kernel::builder(config(json!({})))
            .route(
                Method::GET,
                "/flag",
                Route::new(ConditionGate::new(flag, named("yes"), named("no"))),
            )
            .build()
            .unwrap();

        let handled = kernel.handle(get("/flag")).await;
        assert_eq!(body_json(handled).await, json!({ "handler": expected }));
    }
}

#[tokio::test]
async fn test_predicate_is_evaluated_once_per_request() {
    let evaluations = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&evaluations);
    let condition = Condition::predicate(move |bag| {
        seen.fetch_add(1, Ordering::SeqCst);
        bag.request().headers().contains_key("x-beta")
    });

    let kernel = Kernel::builder(config(json!({})))
        .route(
            Method::GET,
            "/search",
            Route::new(ConditionGate::new(condition, named("beta"), named("stable"))),
        )
        .build()
        .unwrap();

    let handled = kernel.handle(get_with("/search", "x-beta", "1")).await;
    assert_eq!(body_json(handled).await, json!({ "handler": "beta" }));
    assert_eq!(evaluations.load(Ordering::SeqCst), 1);

    let handled = kernel.handle(get("/search")).await;
    assert_eq!(body_json(handled).await, json!({ "handler": "stable" }));
    assert_eq!(evaluations.load(Ordering::SeqCst), 2);
}

// ============================================================================
// Version negotiation
// ============================================================================

#[tokio::test]
async fn test_version_header_selects_handler() {
    let kernel = versioned_kernel();

    let handled = kernel.handle(get_with("/orders", "x-version", "^1.0.0")).await;
    assert_eq!(body_json(handled).await, json!({ "handler": "orders.v1" }));

    let handled = kernel.handle(get_with("/orders", "x-version", "^2.0.0")).await;
    assert_eq!(body_json(handled).await, json!({ "handler": "orders.v2" }));
}

#[tokio::test]
async fn test_unsatisfiable_version_is_not_found() {
    let kernel = versioned_kernel();
    let handled = kernel.handle(get_with("/orders", "x-version", "^3.0.0")).await;
    assert_eq!(handled.status(), StatusCode::NOT_FOUND);
    assert_eq!(handled.outcome(), &Outcome::Unhandled);
}

#[tokio::test]
async fn test_missing_version_header_uses_highest() {
    let kernel = versioned_kernel();
    let handled = kernel.handle(get("/orders")).await;
    assert_eq!(body_json(handled).await, json!({ "handler": "orders.v2" }));
}

#[tokio::test]
async fn test_custom_default_version() {
    let selector = VersionSelector::builder()
        .version("v1", named("v1"))
        .version("v2", named("v2"))
        .default_version("~1")
        .header("accept-version")
        .build()
        .unwrap();
    let kernel = Kernel::builder(config(json!({})))
        .route(Method::GET, "/items", Route::new(selector))
        .build()
        .unwrap();

    let handled = kernel.handle(get("/items")).await;
    assert_eq!(body_json(handled).await, json!({ "handler": "v1" }));

    let handled = kernel.handle(get_with("/items", "accept-version", "2")).await;
    assert_eq!(body_json(handled).await, json!({ "handler": "v2" }));
}

proptest! {
    #[test]
    fn test_selection_is_idempotent(major in 0u64..4, minor in 0u64..3) {
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let kernel = versioned_kernel();
        let header = format!("^{major}.{minor}.0");

        let first = runtime.block_on(kernel.handle(get_with("/orders", "x-version", &header)));
        let second = runtime.block_on(kernel.handle(get_with("/orders", "x-version", &header)));

        prop_assert_eq!(first.status(), second.status());
        prop_assert_eq!(first.outcome(), second.outcome());
    }
}

// ============================================================================
// Validation
// ============================================================================

fn token_validation() -> ValidationMiddleware {
    ValidationMiddleware::new(validator_fn(
        "token",
        |bag| bag.request().headers().contains_key("authorization"),
        |bag| match bag.request().headers().get("authorization") {
            Some(value) if value == "Bearer good" => ValidationOutcome::valid(),
            _ => ValidationOutcome::invalid(["token rejected"]),
        },
    ))
}

fn validated_kernel(calls: &Arc<AtomicUsize>) -> Kernel {
    Kernel::builder(config(json!({})))
        .route(
            Method::GET,
            "/account",
            Route::new(counting("account", calls)).stage(token_validation()),
        )
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_unauthorized_request_gets_401_envelope() {
    let calls = Arc::new(AtomicUsize::new(0));
    let kernel = validated_kernel(&calls);

    let handled = kernel.handle(get("/account")).await;
    assert_eq!(handled.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        handled.response().headers().get(CONTENT_TYPE).unwrap(),
        "application/json"
    );
    assert_eq!(
        body_json(handled).await,
        json!({ "success": false, "message": "UNAUTHORIZED" })
    );
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_invalid_request_gets_400_envelope() {
    let calls = Arc::new(AtomicUsize::new(0));
    let kernel = validated_kernel(&calls);

    let handled = kernel
        .handle(get_with("/account", "authorization", "Bearer bad"))
        .await;
    assert_eq!(handled.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(handled).await,
        json!({ "success": false, "message": "BAD_REQUEST" })
    );
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_valid_request_reaches_handler_exactly_once() {
    let calls = Arc::new(AtomicUsize::new(0));
    let kernel = validated_kernel(&calls);

    let handled = kernel
        .handle(get_with("/account", "authorization", "Bearer good"))
        .await;
    assert_eq!(handled.status(), StatusCode::OK);
    assert_eq!(body_json(handled).await, json!({ "handler": "account" }));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

// ============================================================================
// Maintenance mode
// ============================================================================

fn maintenance_kernel(provider: Arc<dyn ConfigProvider>, calls: &Arc<AtomicUsize>) -> Kernel {
    Kernel::builder(provider)
        .route(Method::GET, "/health", Route::new(counting("health", calls)))
        .route(Method::GET, "/orders", Route::new(counting("orders", calls)))
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_excepted_path_bypasses_maintenance() {
    let calls = Arc::new(AtomicUsize::new(0));
    let provider = maintenance(json!({ "except": ["/health"] }));
    let kernel = maintenance_kernel(provider, &calls);

    let handled = kernel.handle(get("/health")).await;
    assert_eq!(handled.status(), StatusCode::OK);
    assert!(!handled.terminate_process());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_maintenance_serves_status_and_template() {
    let calls = Arc::new(AtomicUsize::new(0));
    let provider = maintenance(json!({
        "status": 503,
        "template": "<h1>Back soon</h1>",
        "retry": 60,
        "except": ["/health"]
    }));
    let kernel = maintenance_kernel(provider, &calls);

    let handled = kernel.handle(get("/orders")).await;
    assert_eq!(handled.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(handled.response().headers().get(RETRY_AFTER).unwrap(), "60");
    assert_eq!(
        handled.outcome(),
        &Outcome::Terminate(Termination::Maintenance)
    );
    assert_eq!(body_bytes(handled).await, Bytes::from_static(b"<h1>Back soon</h1>"));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_maintenance_applies_to_unknown_routes() {
    let calls = Arc::new(AtomicUsize::new(0));
    let kernel = maintenance_kernel(maintenance(json!({})), &calls);

    let handled = kernel.handle(get("/nowhere")).await;
    assert_eq!(handled.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_maintenance_redirect() {
    let calls = Arc::new(AtomicUsize::new(0));
    let provider = maintenance(json!({ "redirect": "/maintenance" }));
    let kernel = maintenance_kernel(provider, &calls);

    let handled = kernel.handle(get("/orders")).await;
    assert_eq!(handled.status(), StatusCode::FOUND);
    assert_eq!(
        handled.response().headers().get(LOCATION).unwrap(),
        "/maintenance"
    );
    assert_eq!(handled.outcome(), &Outcome::Terminate(Termination::Redirect));
    assert!(body_bytes(handled).await.is_empty());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_maintenance_runs_before_global_stages() {
    let stage_calls = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&stage_calls);
    let audit = portcullis::core::action_fn("audit", move |bag, next| {
        seen.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move { next.run(bag).await })
    });

    let kernel = Kernel::builder(maintenance(json!({})))
        .stage(audit)
        .route(Method::GET, "/orders", Route::new(named("orders")))
        .build()
        .unwrap();

    let handled = kernel.handle(get("/orders")).await;
    assert_eq!(handled.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(stage_calls.load(Ordering::SeqCst), 0);
}

// ============================================================================
// Termination policy
// ============================================================================

#[tokio::test]
async fn test_end_request_policy_keeps_running() {
    let calls = Arc::new(AtomicUsize::new(0));
    let kernel = maintenance_kernel(maintenance(json!({})), &calls);

    let handled = kernel.handle(get("/orders")).await;
    assert_eq!(kernel.termination_policy(), TerminationPolicy::EndRequest);
    assert!(!handled.terminate_process());
    assert!(!kernel.shutdown_signal().is_shutdown());
}

#[tokio::test]
async fn test_exit_process_policy_triggers_shutdown() {
    let provider = config(json!({
        "app": { "maintenanceMode": { "enabled": true } },
        "kernel": { "termination": "exit_process" }
    }));
    let signal = ShutdownSignal::new();
    let kernel = Kernel::builder(provider)
        .route(Method::GET, "/orders", Route::new(named("orders")))
        .shutdown_signal(signal.clone())
        .build()
        .unwrap();

    let handled = kernel.handle(get("/orders")).await;
    assert!(handled.terminate_process());
    assert_eq!(handled.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert!(signal.is_shutdown());
    signal.wait().await;
}

#[tokio::test]
async fn test_exit_process_ignores_normal_requests() {
    let kernel = Kernel::builder(config(json!({})))
        .termination_policy(TerminationPolicy::ExitProcess)
        .route(Method::GET, "/orders", Route::new(named("orders")))
        .build()
        .unwrap();

    let handled = kernel.handle(get("/orders")).await;
    assert!(!handled.terminate_process());
    assert!(!kernel.shutdown_signal().is_shutdown());
}
