//! Reconnection state machine: prepares each attempt's request (including
//! `Last-Event-Id` injection and body replay), executes it, validates the
//! response, drives the read loop, and decides retry / give-up / cancel.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Duration;

use backoff::ExponentialBackoff;
use backoff::backoff::Backoff;
use reqwest::Request;
use reqwest::header::{HeaderName, HeaderValue};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::connection::ConnectConfig;
use crate::error::Error;
use crate::event::EventBuilder;
use crate::read_loop::{self, Outcome};
use crate::registry::Registry;

static LAST_EVENT_ID: HeaderName = HeaderName::from_static("last-event-id");

/// Holds the original request and hands out per-attempt clones.
///
/// Mirrors the role of a `GetBody` callback: `reqwest::Request::try_clone`
/// returns `None` exactly when the body can't be safely replayed (e.g. a
/// streaming body), at which point the template is consumed for a one-shot
/// use and any further attempt fails with [`Error::NoGetBody`].
struct RequestTemplate {
    request: Option<Request>,
}

impl RequestTemplate {
    fn new(request: Request) -> Self {
        Self { request: Some(request) }
    }

    fn next(&mut self) -> Result<Request, Error> {
        match &self.request {
            Some(template) => match template.try_clone() {
                Some(cloned) => Ok(cloned),
                None => Ok(self.request.take().expect("checked Some above")),
            },
            None => Err(Error::NoGetBody),
        }
    }
}

/// Outcome of a single connect-and-stream attempt.
enum AttemptResult {
    /// Non-retriable: surfaced to the caller immediately.
    Terminal(Error),
    /// Retriable: subject to the retry policy / backoff.
    Retriable(Error),
}

/// Drives the full Prepared → Connecting → … → Terminal state machine for
/// one logical [`crate::Connection`].
pub(crate) async fn run(
    http: &reqwest::Client,
    request: Request,
    registry: &Arc<Registry>,
    cancellation: &CancellationToken,
    config: &ConnectConfig,
) -> Result<(), Error> {
    let mut template = RequestTemplate::new(request);
    let mut builder = EventBuilder::new(config.default_reconnection_time);
    let mut backoff = ExponentialBackoff {
        initial_interval: config.default_reconnection_time,
        current_interval: config.default_reconnection_time,
        randomization_factor: config.randomization_factor,
        multiplier: config.backoff_multiplier,
        max_interval: config.max_reconnection_time,
        max_elapsed_time: None,
        ..ExponentialBackoff::default()
    };

    let mut attempt: u64 = 0;
    let mut retries_used: i64 = 0;

    loop {
        let is_first = attempt == 0;
        let mut prepared = template.next()?;
        attempt += 1;

        if !is_first {
            let last_event_id = builder.last_event_id();
            if last_event_id.is_empty() {
                prepared.headers_mut().remove(&LAST_EVENT_ID);
            } else {
                prepared.headers_mut().insert(LAST_EVENT_ID.clone(), HeaderValue::from_str(last_event_id)?);
            }
        }

        let span = tracing::debug_span!("sse_attempt", attempt);
        let outcome = async {
            tracing::debug!("executing SSE connection attempt");
            execute_attempt(
                http,
                prepared,
                registry,
                &mut builder,
                &mut backoff,
                cancellation,
                config.validator.as_ref(),
            )
            .await
        }
        .instrument(span)
        .await;

        let error = match outcome {
            AttemptResult::Terminal(error) => return Err(error),
            AttemptResult::Retriable(error) => error,
        };

        retries_used += 1;
        let retry_budget_left = config.max_retries < 0 || retries_used <= config.max_retries;
        if !retry_budget_left {
            return Err(error);
        }

        let delay = backoff.next_backoff().unwrap_or(config.max_reconnection_time);
        notify_on_retry(config, &error, delay);
        tracing::warn!(?delay, retries_used, "reconnecting after backoff");

        tokio::select! {
            biased;
            () = cancellation.cancelled() => return Err(Error::Canceled),
            () = tokio::time::sleep(delay) => {}
        }
    }
}

fn notify_on_retry(config: &ConnectConfig, error: &Error, delay: Duration) {
    if let Some(on_retry) = &config.on_retry {
        if catch_unwind(AssertUnwindSafe(|| on_retry(error, delay))).is_err() {
            tracing::error!("on_retry observer panicked; ignoring");
        }
    }
}

async fn execute_attempt(
    http: &reqwest::Client,
    request: Request,
    registry: &Arc<Registry>,
    builder: &mut EventBuilder,
    backoff: &mut ExponentialBackoff,
    cancellation: &CancellationToken,
    validator: &dyn crate::validator::ResponseValidator,
) -> AttemptResult {
    let response = tokio::select! {
        biased;
        () = cancellation.cancelled() => return AttemptResult::Terminal(Error::Canceled),
        result = http.execute(request) => result,
    };

    let response = match response {
        Ok(response) => response,
        Err(error) => {
            tracing::warn!(%error, "SSE connection attempt failed");
            return AttemptResult::Retriable(Error::Http(error));
        }
    };

    if let Err(error) = validator.validate(&response) {
        tracing::warn!(%error, "SSE response failed validation");
        return AttemptResult::Terminal(error);
    }

    let outcome = read_loop::run(response, registry, builder, cancellation).await;

    // Connection established and streamed: reset the backoff baseline to the
    // latest reconnection time *after* the stream ran, not before, so a
    // `retry:` field observed mid-stream is picked up by the very next wait
    // rather than one reconnect late.
    let reconnection_time = builder.reconnection_time();
    backoff.initial_interval = reconnection_time;
    backoff.current_interval = reconnection_time;
    backoff.reset();

    match outcome {
        Outcome::CleanEof => AttemptResult::Retriable(Error::StreamEnded),
        Outcome::UnexpectedEof => AttemptResult::Retriable(Error::UnexpectedEof),
        Outcome::Transport(error) => AttemptResult::Retriable(Error::Http(error)),
        Outcome::Canceled => AttemptResult::Terminal(Error::Canceled),
    }
}
