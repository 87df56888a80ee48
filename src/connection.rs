//! The public-facing types: [`Client`] carries transport + retry policy,
//! [`Connection`] binds a request template to a subscription registry and
//! drives the reconnection state machine exactly once.

use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use reqwest::Request;
use tokio_util::sync::CancellationToken;

use crate::error::Error;
use crate::event::Event;
use crate::registry::{Registry, Subscription};
use crate::retry;
use crate::validator::{DefaultValidator, ResponseValidator};

/// Observer invoked before each backoff wait, with the error that triggered
/// the retry and the delay about to be slept. Panics from this callback are
/// swallowed.
pub type OnRetry = Arc<dyn Fn(&Error, Duration) + Send + Sync>;

/// Binds a `reqwest::Client` to the retry/backoff policy shared by every
/// connection it creates.
#[derive(Clone)]
pub struct Client {
    http: reqwest::Client,
    /// Invoked before each backoff wait.
    pub on_retry: Option<OnRetry>,
    /// Decides whether a connected response may be treated as an SSE stream.
    pub validator: Arc<dyn ResponseValidator>,
    /// Bounds reconnection attempts. Negative means unbounded, `0` means
    /// never retry, `N > 0` means up to `N` retries after the initial
    /// attempt.
    pub max_retries: i64,
    /// Seed reconnection delay, overridden by the server's `retry:` field.
    pub default_reconnection_time: Duration,
    /// Growth factor applied to the backoff delay on consecutive failures.
    pub backoff_multiplier: f64,
    /// Upper bound on the backoff delay.
    pub max_reconnection_time: Duration,
    /// Jitter applied around the current backoff delay, as a fraction in `[0, 1]`.
    pub randomization_factor: f64,
}

impl Default for Client {
    fn default() -> Self {
        Self {
            http: reqwest::Client::new(),
            on_retry: None,
            validator: Arc::new(DefaultValidator),
            max_retries: -1,
            default_reconnection_time: Duration::from_secs(3),
            backoff_multiplier: 2.0,
            max_reconnection_time: Duration::from_secs(30),
            randomization_factor: 0.5,
        }
    }
}

impl Client {
    /// Creates a client wrapping the given `reqwest::Client`, with default policy.
    pub fn new(http: reqwest::Client) -> Self {
        Self { http, ..Self::default() }
    }

    /// Binds `request` to a fresh [`Connection`] inheriting this client's
    /// settings by value. `request` is not executed until
    /// [`Connection::connect`] is called.
    pub fn new_connection(&self, request: Request) -> Connection {
        Connection {
            http: self.http.clone(),
            request: Mutex::new(Some(request)),
            registry: Registry::new(),
            cancellation: CancellationToken::new(),
            used: AtomicBool::new(false),
            config: ConnectConfig {
                validator: self.validator.clone(),
                on_retry: self.on_retry.clone(),
                max_retries: self.max_retries,
                default_reconnection_time: self.default_reconnection_time,
                backoff_multiplier: self.backoff_multiplier,
                max_reconnection_time: self.max_reconnection_time,
                randomization_factor: self.randomization_factor,
            },
        }
    }
}

/// Per-connection copy of the retry/backoff policy, cheap to clone out of
/// [`Client`] and carried alongside a [`Connection`].
pub(crate) struct ConnectConfig {
    pub validator: Arc<dyn ResponseValidator>,
    pub on_retry: Option<OnRetry>,
    pub max_retries: i64,
    pub default_reconnection_time: Duration,
    pub backoff_multiplier: f64,
    pub max_reconnection_time: Duration,
    pub randomization_factor: f64,
}

/// One logical SSE connection: a request template bound to a subscription
/// registry. `Connect()` drives it exactly once; subscribers may be added or
/// removed at any time, from any task, before or after `connect()` is called.
pub struct Connection {
    http: reqwest::Client,
    request: Mutex<Option<Request>>,
    registry: Arc<Registry>,
    cancellation: CancellationToken,
    used: AtomicBool,
    config: ConnectConfig,
}

impl Connection {
    /// Subscribes to events of a specific, non-empty type.
    pub fn subscribe_event<F>(&self, event_type: impl Into<String>, callback: F) -> Subscription
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.registry.subscribe(event_type.into(), Arc::new(callback))
    }

    /// Subscribes to unnamed ("message") events, i.e. `event_type == ""`.
    pub fn subscribe_messages<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.registry.subscribe(String::new(), Arc::new(callback))
    }

    /// Subscribes to every event regardless of type.
    pub fn subscribe_to_all<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.registry.subscribe_all(Arc::new(callback))
    }

    /// Returns a clone of the cancellation token that, once fired, terminates
    /// the connection's current state: an in-flight transport round-trip, a
    /// read from the response body, or a backoff wait all observe it within
    /// one tick and unwind as [`Error::Canceled`].
    pub fn cancel_handle(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    /// Executes the connection's request, running the reconnection state
    /// machine until a non-retriable outcome is reached. Callable at most
    /// once; a second call returns [`Error::AlreadyConnected`].
    pub async fn connect(&self) -> Result<(), Error> {
        if self.used.swap(true, Ordering::SeqCst) {
            return Err(Error::AlreadyConnected);
        }
        let request = self
            .request
            .lock()
            .unwrap()
            .take()
            .expect("request is only taken once, guarded by `used`");

        retry::run(&self.http, request, &self.registry, &self.cancellation, &self.config).await
    }
}
