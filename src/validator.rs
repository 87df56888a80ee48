//! Response validation: decides whether a connected response is actually an
//! SSE stream before the read loop is allowed to start consuming it.

use reqwest::Response;
use reqwest::header::CONTENT_TYPE;

use crate::error::Error;

/// Validates an HTTP response before it is treated as an SSE stream.
///
/// A validator rejection is never retried: it's either caller misconfiguration
/// (wrong URL, wrong method) or a server that isn't actually an SSE endpoint,
/// and retrying won't change that.
pub trait ResponseValidator: Send + Sync {
    /// Returns `Ok(())` if `response` may be streamed, `Err` otherwise.
    fn validate(&self, response: &Response) -> Result<(), Error>;
}

/// Passes if the status is in `[200, 300)` and `Content-Type`'s MIME type is
/// `text/event-stream` (parameters such as `charset` are allowed).
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultValidator;

impl ResponseValidator for DefaultValidator {
    fn validate(&self, response: &Response) -> Result<(), Error> {
        if !response.status().is_success() {
            return Err(Error::bad_status(response.status()));
        }
        let content_type = response.headers().get(CONTENT_TYPE);
        let mime_matches = content_type
            .and_then(|value| value.to_str().ok())
            .map(|value| {
                value.split(';').next().map(str::trim).map(str::to_ascii_lowercase)
                    == Some("text/event-stream".to_string())
            })
            .unwrap_or(false);
        if !mime_matches {
            return Err(Error::bad_content_type(content_type));
        }
        Ok(())
    }
}

/// Accepts every response unconditionally.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopValidator;

impl ResponseValidator for NoopValidator {
    fn validate(&self, _response: &Response) -> Result<(), Error> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(status: u16, content_type: Option<&str>) -> Response {
        let mut builder = http::Response::builder().status(status);
        if let Some(content_type) = content_type {
            builder = builder.header(CONTENT_TYPE, content_type);
        }
        Response::from(builder.body(Vec::new()).unwrap())
    }

    #[test]
    fn default_validator_accepts_event_stream_with_charset() {
        let resp = response(200, Some("text/event-stream; charset=utf-8"));
        assert!(DefaultValidator.validate(&resp).is_ok());
    }

    #[test]
    fn default_validator_rejects_non_success_status() {
        let resp = response(404, Some("text/event-stream"));
        assert!(matches!(DefaultValidator.validate(&resp), Err(Error::Validation(_))));
    }

    #[test]
    fn default_validator_rejects_missing_content_type() {
        let resp = response(200, None);
        assert!(DefaultValidator.validate(&resp).is_err());
    }

    #[test]
    fn default_validator_rejects_wrong_content_type() {
        let resp = response(200, Some("application/json"));
        assert!(DefaultValidator.validate(&resp).is_err());
    }

    #[test]
    fn noop_validator_accepts_anything() {
        let resp = response(500, None);
        assert!(NoopValidator.validate(&resp).is_ok());
    }
}
