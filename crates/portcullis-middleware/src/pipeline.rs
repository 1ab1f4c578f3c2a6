//! Ordered stage pipeline.
//!
//! A [`Pipeline`] is an immutable list of route actions run in registration
//! order. Each stage receives a [`Next`] that resumes the remaining stages
//! and finally the terminal action. A stage that returns without running
//! `next` ends the request there.
//!
//! ```text
//! stage 1 ─► stage 2 ─► ... ─► stage n ─► terminal
//!    │          │                  │
//!    └──────────┴──── may return early, skipping everything after
//! ```

use std::sync::Arc;

use portcullis_core::{BoxFuture, BoxedAction, Next, Outcome, ParameterBag, RouteAction};

/// An immutable, ordered list of stages.
///
/// # Example
///
/// ```
/// use portcullis_core::{action_fn, sync_action, ConfigProvider, Outcome, ParameterBag};
/// use portcullis_middleware::Pipeline;
/// use bytes::Bytes;
/// use http_body_util::Full;
/// use serde_json::json;
/// use std::sync::Arc;
///
/// # tokio_test::block_on(async {
/// let pipeline = Pipeline::builder()
///     .stage(action_fn("log", |bag, next| Box::pin(async move { next.run(bag).await })))
///     .build();
///
/// let request = http::Request::builder().body(Full::new(Bytes::new())).unwrap();
/// let app: Arc<dyn ConfigProvider> = Arc::new(json!({}));
/// let mut bag = ParameterBag::new(request, app);
///
/// let handler = sync_action("hello", |_| Outcome::Value(json!("hi")));
/// assert_eq!(pipeline.process(&mut bag, &handler).await, Outcome::Value(json!("hi")));
/// # });
/// ```
#[derive(Clone, Default)]
pub struct Pipeline {
    stages: Vec<BoxedAction>,
}

impl Pipeline {
    /// Creates a new pipeline builder.
    #[must_use]
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    /// Runs every stage, then `terminal`.
    pub async fn process(&self, bag: &mut ParameterBag, terminal: &dyn RouteAction) -> Outcome {
        self.chain(Next::new(terminal, Next::end())).run(bag).await
    }

    /// Runs every stage with no terminal action.
    ///
    /// If every stage forwards, the result is [`Outcome::Unhandled`].
    pub async fn run(&self, bag: &mut ParameterBag) -> Outcome {
        self.chain(Next::end()).run(bag).await
    }

    /// Prepends the stages to `tail`, building the chain from back to front.
    #[must_use]
    pub fn chain<'a>(&'a self, tail: Next<'a>) -> Next<'a> {
        self.stages
            .iter()
            .rev()
            .fold(tail, |next, stage| Next::new(stage.as_ref(), next))
    }

    /// Appends a stage after the existing ones.
    pub fn push(&mut self, stage: BoxedAction) {
        self.stages.push(stage);
    }

    /// Returns the names of all stages in order.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|stage| stage.name()).collect()
    }

    /// Returns the number of stages.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Returns `true` if the pipeline has no stages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("stages", &self.stage_names())
            .finish()
    }
}

/// A pipeline nested inside another chain runs its stages, then `next`.
impl RouteAction for Pipeline {
    fn name(&self) -> &'static str {
        "pipeline"
    }

    fn call<'a>(&'a self, bag: &'a mut ParameterBag, next: Next<'a>) -> BoxFuture<'a, Outcome> {
        Box::pin(async move { self.chain(next).run(bag).await })
    }
}

/// Builder for constructing a [`Pipeline`].
#[derive(Default)]
pub struct PipelineBuilder {
    stages: Vec<BoxedAction>,
}

impl PipelineBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self { stages: Vec::new() }
    }

    /// Appends a stage.
    #[must_use]
    pub fn stage<A: RouteAction>(mut self, action: A) -> Self {
        self.stages.push(Arc::new(action));
        self
    }

    /// Appends an already shared stage.
    #[must_use]
    pub fn shared_stage(mut self, action: BoxedAction) -> Self {
        self.stages.push(action);
        self
    }

    /// Builds the pipeline.
    #[must_use]
    pub fn build(self) -> Pipeline {
        Pipeline {
            stages: self.stages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http_body_util::Full;
    use portcullis_core::{sync_action, ConfigProvider};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// A stage that records its invocation order.
    struct OrderTracking {
        name: &'static str,
        counter: Arc<AtomicUsize>,
        order: Arc<Mutex<Vec<&'static str>>>,
    }

    impl RouteAction for OrderTracking {
        fn name(&self) -> &'static str {
            self.name
        }

        fn call<'a>(
            &'a self,
            bag: &'a mut ParameterBag,
            next: Next<'a>,
        ) -> BoxFuture<'a, Outcome> {
            Box::pin(async move {
                self.counter.fetch_add(1, Ordering::SeqCst);
                self.order.lock().unwrap().push(self.name);
                next.run(bag).await
            })
        }
    }

    fn bag() -> ParameterBag {
        let request = http::Request::builder()
            .uri("/test")
            .body(Full::new(Bytes::new()))
            .unwrap();
        let app: Arc<dyn ConfigProvider> = Arc::new(json!({}));
        ParameterBag::new(request, app)
    }

    fn tracking(
        name: &'static str,
        counter: &Arc<AtomicUsize>,
        order: &Arc<Mutex<Vec<&'static str>>>,
    ) -> OrderTracking {
        OrderTracking {
            name,
            counter: counter.clone(),
            order: order.clone(),
        }
    }

    #[tokio::test]
    async fn test_pipeline_executes_in_order() {
        let counter = Arc::new(AtomicUsize::new(0));
        let order = Arc::new(Mutex::new(Vec::new()));

        let pipeline = Pipeline::builder()
            .stage(tracking("first", &counter, &order))
            .stage(tracking("second", &counter, &order))
            .stage(tracking("third", &counter, &order))
            .build();

        let handler = sync_action("handler", |_| Outcome::Value(json!("OK")));
        let outcome = pipeline.process(&mut bag(), &handler).await;

        assert_eq!(outcome, Outcome::Value(json!("OK")));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
        assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_short_circuit_skips_later_stages() {
        let counter = Arc::new(AtomicUsize::new(0));
        let order = Arc::new(Mutex::new(Vec::new()));

        let pipeline = Pipeline::builder()
            .stage(tracking("first", &counter, &order))
            .stage(sync_action("stop", |_| Outcome::Empty))
            .stage(tracking("never", &counter, &order))
            .build();

        let handler = sync_action("handler", |_| Outcome::Value(json!("unreachable")));
        let outcome = pipeline.process(&mut bag(), &handler).await;

        assert_eq!(outcome, Outcome::Empty);
        assert_eq!(*order.lock().unwrap(), vec!["first"]);
    }

    #[tokio::test]
    async fn test_empty_pipeline_runs_terminal() {
        let pipeline = Pipeline::builder().build();
        assert!(pipeline.is_empty());

        let handler = sync_action("handler", |_| Outcome::Value(json!("handler")));
        assert_eq!(
            pipeline.process(&mut bag(), &handler).await,
            Outcome::Value(json!("handler"))
        );
    }

    #[tokio::test]
    async fn test_run_without_terminal_is_unhandled() {
        let counter = Arc::new(AtomicUsize::new(0));
        let order = Arc::new(Mutex::new(Vec::new()));
        let pipeline = Pipeline::builder()
            .stage(tracking("only", &counter, &order))
            .build();

        assert_eq!(pipeline.run(&mut bag()).await, Outcome::Unhandled);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_nested_pipeline_forwards_to_outer_chain() {
        let counter = Arc::new(AtomicUsize::new(0));
        let order = Arc::new(Mutex::new(Vec::new()));

        let inner = Pipeline::builder()
            .stage(tracking("inner", &counter, &order))
            .build();
        let outer = Pipeline::builder()
            .stage(tracking("outer", &counter, &order))
            .stage(inner)
            .stage(tracking("after", &counter, &order))
            .build();

        let handler = sync_action("handler", |_| Outcome::Empty);
        outer.process(&mut bag(), &handler).await;
        assert_eq!(*order.lock().unwrap(), vec!["outer", "inner", "after"]);
    }

    #[test]
    fn test_stage_names_and_count() {
        let pipeline = Pipeline::builder()
            .stage(sync_action("a", |_| Outcome::Empty))
            .stage(sync_action("b", |_| Outcome::Empty))
            .build();
        assert_eq!(pipeline.stage_names(), vec!["a", "b"]);
        assert_eq!(pipeline.stage_count(), 2);
    }

    #[test]
    fn test_push_appends_after_existing_stages() {
        let mut pipeline = Pipeline::builder()
            .stage(sync_action("a", |_| Outcome::Empty))
            .build();
        pipeline.push(Arc::new(sync_action("b", |_| Outcome::Empty)));
        assert_eq!(pipeline.stage_names(), vec!["a", "b"]);
    }
}
