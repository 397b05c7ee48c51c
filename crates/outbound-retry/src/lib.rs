//! Bounded retries with linear jittered backoff.
//!
//! Attempts are numbered from 1; the first is never delayed. Before every
//! attempt the caller's [`CallContext`] is checked, and the backoff sleep
//! races it, so a caller who gives up is never kept waiting and a cancelled
//! call is never retried.
//!
//! Only [`CallError::Transient`] failures are retried. Permanent failures,
//! cancellations and open breakers are returned after the attempt that
//! produced them. When every attempt fails transiently the call ends with
//! [`CallError::Exhausted`], carrying the attempt count and the last failure.
//!
//! ```rust
//! use outbound_core::{CallContext, CallError, FailureKind};
//! use outbound_retry::RetryConfig;
//! use std::time::Duration;
//!
//! # async fn example() {
//! let retry = RetryConfig::builder()
//!     .name("inventory")
//!     .max_attempts(3)
//!     .base_delay(Duration::from_millis(10))
//!     .max_delay(Duration::from_millis(50))
//!     .build()
//!     .unwrap();
//!
//! let ctx = CallContext::with_timeout(Duration::from_secs(1));
//! let result = retry
//!     .execute(&ctx, |attempt| async move {
//!         if attempt < 3 {
//!             Err(CallError::transient(FailureKind::Status(503), "busy"))
//!         } else {
//!             Ok("ready")
//!         }
//!     })
//!     .await;
//! assert_eq!(result, Ok("ready"));
//! # }
//! ```
//!
//! As a Tower layer, [`Retry`] retries any service whose error is
//! [`CallError`] and whose request carries a context:
//!
//! ```rust
//! use outbound_core::{CallContext, CallError};
//! use outbound_retry::RetryConfig;
//! use tower::{ServiceBuilder, service_fn};
//!
//! let layer = RetryConfig::builder().build().unwrap();
//! let service = ServiceBuilder::new()
//!     .layer(layer)
//!     .service(service_fn(|_ctx: CallContext| async { Ok::<_, CallError>(()) }));
//! # drop(service);
//! ```

mod backoff;
mod config;
mod events;
mod layer;

pub use backoff::{Jitter, LinearJitterBackoff, NoJitter, SeededJitter, UniformJitter};
pub use config::{ConfigError, RetryConfig, RetryConfigBuilder};
pub use events::RetryEvent;
pub use layer::RetryLayer;

use futures::future::BoxFuture;
#[cfg(feature = "metrics")]
use metrics::{counter, describe_counter};
use outbound_core::{CallContext, CallError, CancelReason, HasCallContext};
use std::future::Future;
use std::sync::Arc;
#[cfg(feature = "metrics")]
use std::sync::Once;
use std::task::{Context, Poll};
use std::time::Instant;
use tower::{Service, ServiceExt};

#[cfg(feature = "metrics")]
static METRICS_INIT: Once = Once::new();

#[cfg(feature = "metrics")]
pub(crate) fn describe_metrics() {
    METRICS_INIT.call_once(|| {
        describe_counter!("retry_attempts_total", "Attempts made by the retry layer");
        describe_counter!(
            "retry_exhausted_total",
            "Calls that failed on every permitted attempt"
        );
    });
}

/// Runs the attempt loop for `config`.
pub(crate) async fn run<F, Fut, T>(
    config: &RetryConfig,
    ctx: &CallContext,
    mut attempt_fn: F,
) -> Result<T, CallError>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<T, CallError>>,
{
    let mut attempt = 1;

    loop {
        // Checked before the attempt so a dead caller costs no dependency call.
        if let Err(reason) = ctx.check() {
            return Err(cancelled(config, attempt, reason));
        }
        let outcome = match ctx.run(attempt_fn(attempt)).await {
            Ok(outcome) => outcome,
            Err(reason) => return Err(cancelled(config, attempt, reason)),
        };

        #[cfg(feature = "metrics")]
        counter!("retry_attempts_total", "retry" => config.name.clone()).increment(1);

        let error = match outcome {
            Ok(value) => {
                config.event_listeners.emit(&RetryEvent::Success {
                    name: config.name.clone(),
                    timestamp: Instant::now(),
                    attempts: attempt,
                });
                return Ok(value);
            }
            Err(error) => error,
        };

        if let CallError::Cancelled(reason) = error {
            return Err(cancelled(config, attempt, reason));
        }

        if !error.is_retryable() {
            config.event_listeners.emit(&RetryEvent::NotRetried {
                name: config.name.clone(),
                timestamp: Instant::now(),
                attempt,
            });
            return Err(error);
        }

        if attempt >= config.max_attempts {
            #[cfg(feature = "tracing")]
            tracing::error!(
                retry = %config.name,
                attempts = attempt,
                error = %error,
                "retries exhausted"
            );
            #[cfg(feature = "metrics")]
            counter!("retry_exhausted_total", "retry" => config.name.clone()).increment(1);

            config.event_listeners.emit(&RetryEvent::Exhausted {
                name: config.name.clone(),
                timestamp: Instant::now(),
                attempts: attempt,
            });
            return Err(CallError::Exhausted {
                attempts: attempt,
                last: Box::new(error),
            });
        }

        let delay = config.backoff.delay(attempt);

        #[cfg(feature = "tracing")]
        tracing::debug!(
            retry = %config.name,
            attempt,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            error = %error,
            "retrying after transient failure"
        );

        config.event_listeners.emit(&RetryEvent::Retry {
            name: config.name.clone(),
            timestamp: Instant::now(),
            attempt,
            delay,
        });

        if let Err(reason) = ctx.run(tokio::time::sleep(delay)).await {
            return Err(cancelled(config, attempt, reason));
        }
        attempt += 1;
    }
}

fn cancelled(config: &RetryConfig, attempt: usize, reason: CancelReason) -> CallError {
    #[cfg(feature = "tracing")]
    tracing::debug!(retry = %config.name, attempt, reason = %reason, "call cancelled by caller");

    config.event_listeners.emit(&RetryEvent::Cancelled {
        name: config.name.clone(),
        timestamp: Instant::now(),
        attempt,
        reason,
    });
    CallError::Cancelled(reason)
}

/// A Tower [`Service`] that retries transient failures.
pub struct Retry<S> {
    inner: S,
    config: Arc<RetryConfig>,
}

impl<S> Retry<S> {
    /// Creates a new `Retry` service wrapping the given service.
    pub fn new(inner: S, config: Arc<RetryConfig>) -> Self {
        Self { inner, config }
    }

    /// The retry configuration.
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// The wrapped service.
    pub fn get_ref(&self) -> &S {
        &self.inner
    }
}

impl<S> Clone for Retry<S>
where
    S: Clone,
{
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            config: Arc::clone(&self.config),
        }
    }
}

impl<S, Req> Service<Req> for Retry<S>
where
    S: Service<Req, Error = CallError> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Response: Send + 'static,
    Req: HasCallContext + Clone + Send + 'static,
{
    type Response = S::Response;
    type Error = CallError;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Req) -> Self::Future {
        let clone = self.inner.clone();
        let service = std::mem::replace(&mut self.inner, clone);
        let config = Arc::clone(&self.config);

        Box::pin(async move {
            let ctx = req.call_context().clone();
            run(&config, &ctx, move |_attempt| {
                let svc = service.clone();
                let req = req.clone();
                async move { svc.oneshot(req).await }
            })
            .await
        })
    }
}
