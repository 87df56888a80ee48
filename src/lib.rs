//! # `sse-connect`
//!
//! `sse-connect` is a client library for the HTML5 [Server-Sent Events
//! (SSE)](https://developer.mozilla.org/en-US/docs/Web/API/Server-sent_events/Using_server-sent_events)
//! wire protocol, built on top of [reqwest]. It opens a long-lived response
//! stream, incrementally parses the SSE field grammar chunk by chunk,
//! dispatches finalized events to subscriber callbacks, and transparently
//! reconnects across transport failures with a bounded, randomized
//! exponential backoff that replays `Last-Event-Id` to preserve stream
//! continuity.
//!
//! Rather than handing back a `Stream` of events, a [`Connection`] is a
//! callback-dispatch registry: subscribers register against a specific event
//! type, the unnamed "messages" bucket (`event_type == ""`), or every event
//! via a wildcard, and may be added or removed from any task at any time,
//! including from inside their own callback.
//!
//! ## Example
//!
//! ```rust,no_run
//! use sse_connect::Client;
//!
//! #[tokio::main]
//! async fn main() {
//!     let client = Client::default();
//!     let request = reqwest::Client::new()
//!         .get("https://sse.test-free.online/api/story")
//!         .build()
//!         .unwrap();
//!     let connection = client.new_connection(request);
//!
//!     connection.subscribe_messages(|event| println!("{}", event.data));
//!
//!     if let Err(error) = connection.connect().await {
//!         eprintln!("connection ended: {error}");
//!     }
//! }
//! ```

mod connection;
mod event;
mod parser;
mod read_loop;
mod registry;
mod retry;

pub mod error;
pub mod validator;

pub use connection::{Client, Connection, OnRetry};
pub use error::{Error, Result};
pub use event::Event;
pub use registry::{Callback, Subscription};
pub use validator::{DefaultValidator, NoopValidator, ResponseValidator};

pub use tokio_util::sync::CancellationToken;
