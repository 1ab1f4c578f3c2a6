//! Response mutation errors.

use thiserror::Error;

/// Errors raised when a stage mutates a response it no longer owns.
///
/// Once the body has been sent the response is final. Later stages that try
/// to touch it get [`ResponseError::AlreadySent`] instead of silently
/// clobbering what the client will receive.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResponseError {
    /// The body has already been sent.
    #[error("response already sent")]
    AlreadySent,

    /// The status line and headers were committed by `write_head`.
    #[error("response head already written")]
    HeadWritten,

    /// A header name or value is not valid HTTP.
    #[error("invalid header {name}: {reason}")]
    InvalidHeader {
        /// The offending header name.
        name: String,
        /// Why it was rejected.
        reason: String,
    },
}

impl ResponseError {
    /// Creates an invalid header error.
    pub fn invalid_header(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidHeader {
            name: name.into(),
            reason: reason.into(),
        }
    }
}
