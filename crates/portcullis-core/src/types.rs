//! HTTP request and response types used throughout the pipeline.

use bytes::Bytes;
use http_body_util::Full;

/// The HTTP request type handled by the pipeline.
///
/// This is a standard `http::Request` with a fully buffered body. Reading the
/// body off the wire is the transport's job.
pub type Request = http::Request<Full<Bytes>>;

/// The HTTP response type handed back to the transport.
pub type Response = http::Response<Full<Bytes>>;
