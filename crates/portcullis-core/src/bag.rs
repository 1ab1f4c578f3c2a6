//! The per-request parameter bag.
//!
//! The [`ParameterBag`] carries the request, the response under construction
//! and the application configuration through every stage of the pipeline.
//! Request and response each live in exactly one field; the `req`/`res`
//! spellings are accessor aliases, so they can never drift apart.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use crate::config::ConfigProvider;
use crate::context::RequestId;
use crate::response::ResponseWriter;
use crate::types::Request;

/// Per-request state threaded through the pipeline.
///
/// Created by the kernel for each inbound request, exclusively owned by the
/// pipeline while the request is dispatched, and consumed when the response
/// is produced.
///
/// # Example
///
/// ```
/// use portcullis_core::{ConfigProvider, ParameterBag};
/// use bytes::Bytes;
/// use http_body_util::Full;
/// use serde_json::json;
/// use std::sync::Arc;
///
/// let request = http::Request::builder()
///     .uri("/users/42")
///     .body(Full::new(Bytes::new()))
///     .unwrap();
/// let app: Arc<dyn ConfigProvider> = Arc::new(json!({}));
///
/// let bag = ParameterBag::new(request, app);
/// assert_eq!(bag.path(), "/users/42");
/// assert_eq!(bag.req().uri(), bag.request().uri());
/// ```
pub struct ParameterBag {
    request: Request,
    response: ResponseWriter,
    app: Arc<dyn ConfigProvider>,
    request_id: RequestId,
    started_at: Instant,
    extensions: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl ParameterBag {
    /// Creates a bag for `request` with a fresh request ID and an empty
    /// `200 OK` response.
    #[must_use]
    pub fn new(request: Request, app: Arc<dyn ConfigProvider>) -> Self {
        Self::with_request_id(request, app, RequestId::new())
    }

    /// Creates a bag with a specific request ID.
    #[must_use]
    pub fn with_request_id(
        request: Request,
        app: Arc<dyn ConfigProvider>,
        request_id: RequestId,
    ) -> Self {
        Self {
            request,
            response: ResponseWriter::new(),
            app,
            request_id,
            started_at: Instant::now(),
            extensions: HashMap::new(),
        }
    }

    /// Returns the request.
    #[must_use]
    pub fn request(&self) -> &Request {
        &self.request
    }

    /// Alias of [`request`](Self::request).
    #[must_use]
    pub fn req(&self) -> &Request {
        &self.request
    }

    /// Returns the request mutably.
    pub fn request_mut(&mut self) -> &mut Request {
        &mut self.request
    }

    /// Returns the response under construction.
    #[must_use]
    pub fn response(&self) -> &ResponseWriter {
        &self.response
    }

    /// Alias of [`response`](Self::response).
    #[must_use]
    pub fn res(&self) -> &ResponseWriter {
        &self.response
    }

    /// Returns the response under construction mutably.
    pub fn response_mut(&mut self) -> &mut ResponseWriter {
        &mut self.response
    }

    /// Alias of [`response_mut`](Self::response_mut).
    pub fn res_mut(&mut self) -> &mut ResponseWriter {
        &mut self.response
    }

    /// Returns the application configuration.
    #[must_use]
    pub fn app(&self) -> &Arc<dyn ConfigProvider> {
        &self.app
    }

    /// Returns the request ID.
    #[must_use]
    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// Returns the unmodified request path (no query string).
    #[must_use]
    pub fn path(&self) -> &str {
        self.request.uri().path()
    }

    /// Returns the time elapsed since the bag was created.
    #[must_use]
    pub fn elapsed(&self) -> std::time::Duration {
        self.started_at.elapsed()
    }

    /// Stores a typed extension value, replacing any previous value of the
    /// same type.
    pub fn set_extension<T: Send + Sync + 'static>(&mut self, value: T) {
        self.extensions.insert(TypeId::of::<T>(), Box::new(value));
    }

    /// Retrieves a typed extension value.
    #[must_use]
    pub fn get_extension<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.extensions
            .get(&TypeId::of::<T>())
            .and_then(|v| v.downcast_ref())
    }

    /// Removes and returns a typed extension value.
    pub fn remove_extension<T: Send + Sync + 'static>(&mut self) -> Option<T> {
        self.extensions
            .remove(&TypeId::of::<T>())
            .and_then(|v| v.downcast().ok())
            .map(|b| *b)
    }

    /// Checks if an extension of the given type exists.
    #[must_use]
    pub fn has_extension<T: Send + Sync + 'static>(&self) -> bool {
        self.extensions.contains_key(&TypeId::of::<T>())
    }

    /// Splits the bag into its request and response.
    #[must_use]
    pub fn into_parts(self) -> (Request, ResponseWriter) {
        (self.request, self.response)
    }
}

impl std::fmt::Debug for ParameterBag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParameterBag")
            .field("request_id", &self.request_id)
            .field("method", self.request.method())
            .field("path", &self.path())
            .field("response", &self.response)
            .field("extensions", &self.extensions.len())
            .finish_non_exhaustive()
    }
}
