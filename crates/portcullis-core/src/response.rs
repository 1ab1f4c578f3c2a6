//! The response under construction.
//!
//! Stages never build an `http::Response` directly. They mutate the
//! [`ResponseWriter`] held by the [`ParameterBag`](crate::ParameterBag), and
//! the kernel converts it into the final response once dispatch ends.
//!
//! The writer tracks two commit points:
//!
//! | Call | Effect | Afterwards |
//! |------|--------|------------|
//! | [`write_head`](ResponseWriter::write_head) | commits status + headers | header/status changes fail |
//! | [`send`](ResponseWriter::send) | commits the body | every mutation fails |

use bytes::Bytes;
use http::header::{HeaderMap, HeaderName, HeaderValue};
use http::StatusCode;
use http_body_util::Full;

use crate::error::ResponseError;
use crate::types::Response;

/// Mutable response state for one request.
///
/// # Example
///
/// ```
/// use portcullis_core::ResponseWriter;
/// use http::StatusCode;
///
/// let mut res = ResponseWriter::new();
/// res.append_header("retry-after", "60").unwrap();
/// res.set_status(StatusCode::SERVICE_UNAVAILABLE).unwrap();
/// res.send("down for maintenance").unwrap();
///
/// assert!(res.is_sent());
/// assert!(res.set_status(StatusCode::OK).is_err());
/// ```
#[derive(Debug, Clone)]
pub struct ResponseWriter {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
    head_written: bool,
    sent: bool,
}

impl ResponseWriter {
    /// Creates an empty `200 OK` response.
    #[must_use]
    pub fn new() -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            head_written: false,
            sent: false,
        }
    }

    /// Returns the current status code.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Returns the headers appended so far.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns the body sent so far (empty until [`send`](Self::send)).
    #[must_use]
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Returns `true` once the body has been sent.
    #[must_use]
    pub fn is_sent(&self) -> bool {
        self.sent
    }

    /// Returns `true` once the status line and headers are committed.
    #[must_use]
    pub fn is_head_written(&self) -> bool {
        self.head_written
    }

    /// Sets the status code without committing the head.
    pub fn set_status(&mut self, status: StatusCode) -> Result<(), ResponseError> {
        self.ensure_head_open()?;
        self.status = status;
        Ok(())
    }

    /// Sets the status code and commits the head.
    ///
    /// Headers appended before this call are kept; later header or status
    /// changes fail with [`ResponseError::HeadWritten`].
    pub fn write_head(&mut self, status: StatusCode) -> Result<(), ResponseError> {
        self.ensure_head_open()?;
        self.status = status;
        self.head_written = true;
        Ok(())
    }

    /// Appends a header value, keeping any existing values for the name.
    pub fn append_header(&mut self, name: &str, value: &str) -> Result<(), ResponseError> {
        self.ensure_head_open()?;
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| ResponseError::invalid_header(name, e.to_string()))?;
        let header_value = HeaderValue::from_str(value)
            .map_err(|e| ResponseError::invalid_header(name, e.to_string()))?;
        self.headers.append(header_name, header_value);
        Ok(())
    }

    /// Sends the body. The response is final afterwards.
    pub fn send(&mut self, body: impl Into<Bytes>) -> Result<(), ResponseError> {
        if self.sent {
            return Err(ResponseError::AlreadySent);
        }
        self.body = body.into();
        self.head_written = true;
        self.sent = true;
        Ok(())
    }

    /// Sends an empty body.
    pub fn send_empty(&mut self) -> Result<(), ResponseError> {
        self.send(Bytes::new())
    }

    /// Converts the writer into the response handed to the transport.
    #[must_use]
    pub fn into_response(self) -> Response {
        let mut response = http::Response::new(Full::new(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }

    fn ensure_head_open(&self) -> Result<(), ResponseError> {
        if self.sent {
            Err(ResponseError::AlreadySent)
        } else if self.head_written {
            Err(ResponseError::HeadWritten)
        } else {
            Ok(())
        }
    }
}

impl Default for ResponseWriter {
    fn default() -> Self {
        Self::new()
    }
}
