use crate::{Retry, RetryConfig};
use outbound_core::{CallContext, CallError};
use std::future::Future;
use std::sync::Arc;
use tower::Layer;

/// A Tower [`Layer`] that applies retry logic to a service.
///
/// Cloning is cheap; clones share one configuration. The layer can also run
/// an arbitrary operation directly with [`RetryLayer::execute`].
///
/// ```
/// use outbound_retry::RetryLayer;
/// use std::time::Duration;
///
/// let layer = RetryLayer::builder()
///     .max_attempts(5)
///     .base_delay(Duration::from_millis(100))
///     .max_delay(Duration::from_secs(2))
///     .build()
///     .unwrap();
/// assert_eq!(layer.config().max_attempts(), 5);
/// ```
#[derive(Clone, Debug)]
pub struct RetryLayer {
    config: Arc<RetryConfig>,
}

impl RetryLayer {
    /// Creates a new `RetryLayer` with the given configuration.
    pub fn new(config: RetryConfig) -> Self {
        #[cfg(feature = "metrics")]
        crate::describe_metrics();

        Self {
            config: Arc::new(config),
        }
    }

    /// Creates a new builder for configuring a retry layer.
    pub fn builder() -> crate::RetryConfigBuilder {
        crate::RetryConfigBuilder::new()
    }

    /// The shared configuration.
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Runs `op` with retries. `op` receives the 1-indexed attempt number.
    pub async fn execute<F, Fut, T>(&self, ctx: &CallContext, op: F) -> Result<T, CallError>
    where
        F: FnMut(usize) -> Fut,
        Fut: Future<Output = Result<T, CallError>>,
    {
        crate::run(&self.config, ctx, op).await
    }
}

impl<S> Layer<S> for RetryLayer {
    type Service = Retry<S>;

    fn layer(&self, service: S) -> Self::Service {
        Retry::new(service, Arc::clone(&self.config))
    }
}
