//! Error types returned by the connection engine.

use reqwest::{StatusCode, header::HeaderValue};

/// Convenience alias for results produced by this crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors surfaced by [`crate::Client`] and [`crate::Connection`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The underlying transport failed to execute a request, or the response
    /// body could not be read to completion.
    #[error("transport error: {0}")]
    Http(#[from] reqwest::Error),

    /// The configured [`crate::validator::ResponseValidator`] rejected the response.
    /// Never retried: a misconfigured or non-SSE endpoint is a caller error.
    #[error("response rejected by validator: {0}")]
    Validation(String),

    /// The stream ended mid dispatch-block (no trailing blank line). Retriable.
    #[error("unexpected end of stream")]
    UnexpectedEof,

    /// Retries were exhausted after nothing but clean, unretried-further EOFs:
    /// there is no underlying transport or validation error to report instead.
    #[error("stream ended and retries were exhausted")]
    StreamEnded,

    /// A request body was present but could not be cloned for replay on retry
    /// (`reqwest::Request::try_clone` returned `None`, e.g. a streaming body).
    #[error("request body cannot be replayed for a retry attempt")]
    NoGetBody,

    /// `Last-Event-Id` could not be encoded as a header value.
    #[error("invalid Last-Event-Id header value: {0}")]
    InvalidHeaderValue(#[from] reqwest::header::InvalidHeaderValue),

    /// The caller's [`tokio_util::sync::CancellationToken`] fired.
    #[error("connection canceled")]
    Canceled,

    /// `Connection::connect` was called more than once.
    #[error("connection has already been used")]
    AlreadyConnected,
}

impl Error {
    /// Builds a [`Error::Validation`] for an unexpected status code.
    pub(crate) fn bad_status(status: StatusCode) -> Self {
        Self::Validation(format!("expecting a 2xx status, found: {status}"))
    }

    /// Builds a [`Error::Validation`] for a missing/mismatched content type.
    pub(crate) fn bad_content_type(found: Option<&HeaderValue>) -> Self {
        match found {
            None => Self::Validation(
                "expecting \"text/event-stream\" content type, found none".to_string(),
            ),
            Some(value) => match value.to_str() {
                Ok(content_type) => Self::Validation(format!(
                    "expecting \"text/event-stream\", found: \"{content_type}\""
                )),
                Err(_) => {
                    Self::Validation("expecting \"text/event-stream\", found invalid value".into())
                }
            },
        }
    }
}
