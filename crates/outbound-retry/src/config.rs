use crate::backoff::{Jitter, LinearJitterBackoff, NoJitter, SeededJitter, UniformJitter};
use crate::events::RetryEvent;
use crate::RetryLayer;
use outbound_core::{CancelReason, EventListener, EventListeners, FnListener};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Invalid retry settings.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// At least the first attempt must be allowed.
    #[error("max_attempts must be at least 1")]
    ZeroMaxAttempts,

    /// The base delay must not exceed the cap.
    #[error("base_delay ({base:?}) must not exceed max_delay ({max:?})")]
    BaseDelayExceedsMax {
        /// Configured base delay.
        base: Duration,
        /// Configured cap.
        max: Duration,
    },
}

/// Configuration for the retry middleware.
pub struct RetryConfig {
    pub(crate) name: String,
    pub(crate) max_attempts: usize,
    pub(crate) backoff: LinearJitterBackoff,
    pub(crate) event_listeners: EventListeners<RetryEvent>,
}

impl RetryConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> RetryConfigBuilder {
        RetryConfigBuilder::new()
    }

    /// Name used in events, logs and metrics.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Maximum number of attempts, including the first.
    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    /// The delay schedule.
    pub fn backoff(&self) -> &LinearJitterBackoff {
        &self.backoff
    }
}

impl std::fmt::Debug for RetryConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryConfig")
            .field("name", &self.name)
            .field("max_attempts", &self.max_attempts)
            .field("backoff", &self.backoff)
            .finish()
    }
}

/// Builder for [`RetryConfig`].
pub struct RetryConfigBuilder {
    name: String,
    max_attempts: usize,
    base_delay: Duration,
    max_delay: Duration,
    jitter: Arc<dyn Jitter>,
    event_listeners: EventListeners<RetryEvent>,
}

impl Default for RetryConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RetryConfigBuilder {
    /// Creates a new builder with defaults.
    ///
    /// Defaults:
    /// - max_attempts: 3
    /// - base_delay: 100ms
    /// - max_delay: 10s
    /// - jitter: uniform up to 100ms
    /// - name: `"<unnamed>"`
    pub fn new() -> Self {
        Self {
            name: "<unnamed>".to_string(),
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            jitter: Arc::new(UniformJitter::new(Duration::from_millis(100))),
            event_listeners: EventListeners::new(),
        }
    }

    /// Sets the name for this retry instance (used in events).
    pub fn name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the maximum number of attempts.
    ///
    /// This includes the initial attempt, so max_attempts=3 means
    /// 1 initial attempt + 2 retries.
    pub fn max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Sets the delay unit; retry `k` waits at least `k * base_delay`.
    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Caps every delay, jitter included.
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Uniform jitter in `[0, max]` from the thread RNG.
    pub fn max_jitter(mut self, max: Duration) -> Self {
        self.jitter = Arc::new(UniformJitter::new(max));
        self
    }

    /// Uniform jitter in `[0, max]` from a generator seeded with `seed`.
    pub fn seeded_jitter(mut self, max: Duration, seed: u64) -> Self {
        self.jitter = Arc::new(SeededJitter::new(max, seed));
        self
    }

    /// Disables jitter.
    pub fn no_jitter(mut self) -> Self {
        self.jitter = Arc::new(NoJitter);
        self
    }

    /// Uses a custom jitter source.
    pub fn jitter<J>(mut self, jitter: J) -> Self
    where
        J: Jitter + 'static,
    {
        self.jitter = Arc::new(jitter);
        self
    }

    /// Registers a callback invoked before each backoff sleep with the attempt
    /// that just failed (1-indexed) and the delay.
    ///
    /// ```rust
    /// use outbound_retry::RetryConfig;
    ///
    /// let layer = RetryConfig::builder()
    ///     .name("inventory")
    ///     .on_retry(|attempt, delay| eprintln!("attempt {attempt} failed, waiting {delay:?}"))
    ///     .build()
    ///     .unwrap();
    /// # drop(layer);
    /// ```
    pub fn on_retry<F>(mut self, f: F) -> Self
    where
        F: Fn(usize, Duration) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event: &RetryEvent| {
            if let RetryEvent::Retry { attempt, delay, .. } = event {
                f(*attempt, *delay);
            }
        }));
        self
    }

    /// Registers a callback invoked on success with the number of attempts made.
    pub fn on_success<F>(mut self, f: F) -> Self
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event: &RetryEvent| {
            if let RetryEvent::Success { attempts, .. } = event {
                f(*attempts);
            }
        }));
        self
    }

    /// Registers a callback invoked when all attempts failed transiently.
    pub fn on_exhausted<F>(mut self, f: F) -> Self
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event: &RetryEvent| {
            if let RetryEvent::Exhausted { attempts, .. } = event {
                f(*attempts);
            }
        }));
        self
    }

    /// Registers a callback invoked when an error is returned without retrying.
    pub fn on_not_retried<F>(mut self, f: F) -> Self
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event: &RetryEvent| {
            if let RetryEvent::NotRetried { attempt, .. } = event {
                f(*attempt);
            }
        }));
        self
    }

    /// Registers a callback invoked when the caller's context ends the loop.
    pub fn on_cancelled<F>(mut self, f: F) -> Self
    where
        F: Fn(usize, CancelReason) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event: &RetryEvent| {
            if let RetryEvent::Cancelled { attempt, reason, .. } = event {
                f(*attempt, *reason);
            }
        }));
        self
    }

    /// Registers a listener for every event.
    pub fn add_listener<L>(mut self, listener: L) -> Self
    where
        L: EventListener<RetryEvent> + 'static,
    {
        self.event_listeners.add(listener);
        self
    }

    /// Validates the settings and returns the configuration.
    pub fn into_config(self) -> Result<RetryConfig, ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::ZeroMaxAttempts);
        }
        if self.base_delay > self.max_delay {
            return Err(ConfigError::BaseDelayExceedsMax {
                base: self.base_delay,
                max: self.max_delay,
            });
        }

        Ok(RetryConfig {
            name: self.name,
            max_attempts: self.max_attempts,
            backoff: LinearJitterBackoff::new(self.base_delay, self.max_delay, self.jitter),
            event_listeners: self.event_listeners,
        })
    }

    /// Validates the settings and builds the retry layer.
    pub fn build(self) -> Result<RetryLayer, ConfigError> {
        self.into_config().map(RetryLayer::new)
    }
}
