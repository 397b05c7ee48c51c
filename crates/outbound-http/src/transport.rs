//! Pooled HTTP/1.1 transport with connection-level timeouts.
//!
//! The transport knows nothing about retries or status codes. It dials with a
//! connect timeout and TCP keep-alive, bounds the TLS handshake, and bounds
//! the wait for response headers. Failures come back as [`TransportError`].
//!
//! Timeout budgets:
//! - dial: enforced by the TCP connector.
//! - TLS handshake: the whole connect (dial + handshake) must finish within
//!   `dial_timeout + tls_handshake_timeout`; when that outer bound fires the
//!   dial had already succeeded, so the handshake is to blame.
//! - response headers: `response_header_timeout` counted from the moment a
//!   connection is ready. A request served from the pool gets exactly that
//!   budget from the start. A request that has to dial reports progress from
//!   the connector, so its header timer starts when the connect completes.
//!   Connect failures always surface first with their own phase.
//!
//! A connect started for a request that then loses the race to a pooled
//! connection keeps reporting to that request, so its header timer may start
//! late by up to the connect budget.

use bytes::Bytes;
use futures::future::BoxFuture;
use http::{Request, Response, Uri};
use http_body_util::Full;
use hyper::body::Incoming;
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::{TokioExecutor, TokioTimer};
use outbound_core::{Failure, FailureKind, TimeoutPhase};
use std::error::Error as StdError;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::Instant;
use tower::Service;

type BoxError = Box<dyn StdError + Send + Sync>;

/// Transport settings. Immutable once the transport is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    /// TCP connect timeout.
    pub dial_timeout: Duration,
    /// TCP keep-alive interval.
    pub keep_alive: Duration,
    /// Budget for the TLS handshake, on top of the dial.
    pub tls_handshake_timeout: Duration,
    /// Budget for the response status line and headers.
    pub response_header_timeout: Duration,
    /// How long an idle pooled connection is kept.
    pub pool_idle_timeout: Duration,
    /// Idle connections kept per host.
    pub pool_max_idle_per_host: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            dial_timeout: Duration::from_secs(30),
            keep_alive: Duration::from_secs(30),
            tls_handshake_timeout: Duration::from_secs(10),
            response_header_timeout: Duration::from_secs(10),
            pool_idle_timeout: Duration::from_secs(90),
            pool_max_idle_per_host: 32,
        }
    }
}

impl TransportConfig {
    /// Everything allowed for establishing a connection.
    pub fn connect_budget(&self) -> Duration {
        self.dial_timeout.saturating_add(self.tls_handshake_timeout)
    }
}

/// A transport-level failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The connection could not be established.
    #[error("connect error: {0}")]
    Connect(String),

    /// A transport timeout fired.
    #[error("{phase} timeout after {after:?}")]
    Timeout {
        /// The phase that timed out.
        phase: TimeoutPhase,
        /// The budget that ran out.
        after: Duration,
    },

    /// Any other transport I/O error.
    #[error("transport error: {0}")]
    Io(String),
}

impl TransportError {
    /// Reduces the error to a [`Failure`].
    pub fn into_failure(self) -> Failure {
        match self {
            TransportError::Connect(message) => Failure::new(FailureKind::Connect, message),
            TransportError::Timeout { phase, after } => Failure::new(
                FailureKind::Timeout(phase),
                format!("no progress within {after:?}"),
            ),
            TransportError::Io(message) => Failure::new(FailureKind::Io, message),
        }
    }

    fn from_client(err: hyper_util::client::legacy::Error, config: &TransportConfig) -> Self {
        let mut source: Option<&(dyn StdError + 'static)> = Some(&err);
        while let Some(current) = source {
            if current.downcast_ref::<HandshakeTimedOut>().is_some() {
                return TransportError::Timeout {
                    phase: TimeoutPhase::TlsHandshake,
                    after: config.tls_handshake_timeout,
                };
            }
            if let Some(io) = current.downcast_ref::<std::io::Error>() {
                if io.kind() == std::io::ErrorKind::TimedOut {
                    return TransportError::Timeout {
                        phase: TimeoutPhase::Connect,
                        after: config.dial_timeout,
                    };
                }
            }
            source = current.source();
        }

        let message = error_chain(&err);
        if err.is_connect() {
            TransportError::Connect(message)
        } else {
            TransportError::Io(message)
        }
    }
}

/// The transport could not be built.
#[derive(Debug, Error)]
pub enum TransportBuildError {
    /// The TLS client configuration was rejected.
    #[error("tls setup failed: {0}")]
    Tls(#[from] rustls::Error),
}

/// Joins an error and its sources with `": "`.
fn error_chain(err: &(dyn StdError + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(current) = source {
        let text = current.to_string();
        if !message.ends_with(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = current.source();
    }
    message
}

/// The connect future outlived the dial + handshake budget.
#[derive(Debug, Error)]
#[error("tls handshake timed out")]
pub(crate) struct HandshakeTimedOut;

/// Connection progress of one request, as seen by the connector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnectState {
    /// No connect started; the request waits on the pool.
    Pending,
    /// A connect for this request started at the given instant.
    Connecting(Instant),
    /// The connect finished at the given instant.
    Connected(Instant),
}

tokio::task_local! {
    static CONNECT_PROGRESS: Arc<watch::Sender<ConnectState>>;
}

/// When the response header timer fires for a request sent at `started`.
fn header_deadline(state: ConnectState, started: Instant, config: &TransportConfig) -> Instant {
    let header = config.response_header_timeout;
    match state {
        ConnectState::Pending => started + header,
        ConnectState::Connecting(at) => at + config.connect_budget().saturating_add(header),
        ConnectState::Connected(at) => at + header,
    }
}

/// Bounds a whole connect (dial + handshake).
#[derive(Debug, Clone)]
pub(crate) struct BoundedConnector<C> {
    inner: C,
    budget: Duration,
}

impl<C> Service<Uri> for BoundedConnector<C>
where
    C: Service<Uri> + Send + 'static,
    C::Future: Send + 'static,
    C::Response: Send + 'static,
    C::Error: Into<BoxError>,
{
    type Response = C::Response;
    type Error = BoxError;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(Into::into)
    }

    fn call(&mut self, dst: Uri) -> Self::Future {
        let progress = CONNECT_PROGRESS.try_with(Arc::clone).ok();
        if let Some(progress) = &progress {
            progress.send_replace(ConnectState::Connecting(Instant::now()));
        }
        let connecting = self.inner.call(dst);
        let budget = self.budget;
        Box::pin(async move {
            match tokio::time::timeout(budget, connecting).await {
                Ok(Ok(conn)) => {
                    if let Some(progress) = progress {
                        progress.send_replace(ConnectState::Connected(Instant::now()));
                    }
                    Ok(conn)
                }
                Ok(Err(err)) => Err(err.into()),
                Err(_) => Err(Box::new(HandshakeTimedOut) as BoxError),
            }
        })
    }
}

type Connector = BoundedConnector<HttpsConnector<HttpConnector>>;

/// A pooled HTTP(S) transport.
///
/// Cloning is cheap and clones share the connection pool.
#[derive(Clone)]
pub struct Transport {
    client: Client<Connector, Full<Bytes>>,
    config: TransportConfig,
}

impl Transport {
    /// Builds a transport. Plain `http` and `https` (webpki roots) are both
    /// supported.
    pub fn new(config: TransportConfig) -> Result<Self, TransportBuildError> {
        let mut http = HttpConnector::new();
        http.enforce_http(false);
        http.set_connect_timeout(Some(config.dial_timeout));
        http.set_keepalive(Some(config.keep_alive));
        http.set_nodelay(true);

        let https = HttpsConnectorBuilder::new()
            .with_provider_and_webpki_roots(rustls::crypto::ring::default_provider())?
            .https_or_http()
            .enable_http1()
            .wrap_connector(http);

        let connector = BoundedConnector {
            inner: https,
            budget: config.connect_budget(),
        };

        let client = Client::builder(TokioExecutor::new())
            .pool_timer(TokioTimer::new())
            .pool_idle_timeout(config.pool_idle_timeout)
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .build(connector);

        Ok(Self { client, config })
    }

    /// The transport's settings.
    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Sends `request` and resolves once response headers arrive. The body is
    /// left for the caller to read.
    pub async fn send(
        &self,
        request: Request<Full<Bytes>>,
    ) -> Result<Response<Incoming>, TransportError> {
        let started = Instant::now();
        let (progress, mut connect) = watch::channel(ConnectState::Pending);
        let mut response =
            std::pin::pin!(CONNECT_PROGRESS.scope(Arc::new(progress), self.client.request(request)));

        loop {
            let deadline = header_deadline(*connect.borrow_and_update(), started, &self.config);
            tokio::select! {
                biased;
                result = &mut response => {
                    return result.map_err(|err| TransportError::from_client(err, &self.config));
                }
                Ok(()) = connect.changed() => continue,
                () = tokio::time::sleep_until(deadline) => {
                    return Err(TransportError::Timeout {
                        phase: TimeoutPhase::ResponseHeaders,
                        after: self.config.response_header_timeout,
                    });
                }
            }
        }
    }
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("config", &self.config)
            .finish()
    }
}
