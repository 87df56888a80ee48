//! Drives a response body through the parser and event builder, dispatching
//! finalized events to the registry, until the stream ends or is canceled.

use std::sync::Arc;

use reqwest::Response;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::event::EventBuilder;
use crate::parser::{FieldParser, Line};
use crate::registry::Registry;

/// How a read loop run terminated.
#[derive(Debug)]
pub enum Outcome {
    /// The stream ended right after a dispatch boundary: retriable, reported
    /// as [`crate::Error::StreamEnded`] if retries are exhausted.
    CleanEof,
    /// The stream ended mid dispatch-block: retriable, reported as
    /// [`crate::Error::UnexpectedEof`] if retries are exhausted.
    UnexpectedEof,
    /// The underlying transport produced a read error.
    Transport(reqwest::Error),
    /// The caller's cancellation token fired.
    Canceled,
}

/// Consumes `response`'s body through parser → builder → registry.
///
/// `builder` is threaded in (rather than owned here) so `last_event_id` and
/// `reconnection_time` persist across reconnections within one connection.
pub async fn run(
    response: Response,
    registry: &Arc<Registry>,
    builder: &mut EventBuilder,
    cancellation: &CancellationToken,
) -> Outcome {
    let mut parser = FieldParser::new();
    let mut stream = response.bytes_stream();

    loop {
        let chunk = tokio::select! {
            biased;
            () = cancellation.cancelled() => return Outcome::Canceled,
            chunk = stream.next() => chunk,
        };

        let Some(chunk) = chunk else {
            return if parser.has_partial_line() {
                tracing::warn!("SSE stream ended mid-block");
                Outcome::UnexpectedEof
            } else {
                // The stream closed without a trailing blank line, but every
                // line we did see was properly terminated: flush whatever
                // block was in progress rather than silently dropping it.
                if let Some(event) = builder.dispatch() {
                    tracing::trace!(event_type = %event.event_type, "dispatching event on clean close");
                    registry.dispatch(&event);
                }
                tracing::debug!("SSE stream ended cleanly");
                Outcome::CleanEof
            };
        };

        let bytes = match chunk {
            Ok(bytes) => bytes,
            Err(error) => {
                tracing::warn!(%error, "SSE transport read error");
                return Outcome::Transport(error);
            }
        };

        let mut dispatch_queue = Vec::new();
        parser.feed(&bytes, |line| match line {
            Line::Field(field) => builder.handle_field(field),
            Line::Dispatch => {
                if let Some(event) = builder.dispatch() {
                    dispatch_queue.push(event);
                }
            }
        });
        for event in &dispatch_queue {
            tracing::trace!(event_type = %event.event_type, "dispatching event");
            registry.dispatch(event);
        }
    }
}
