use crate::circuit::{BreakerCounts, CircuitState};
use crate::error::ConfigError;
use crate::events::CircuitBreakerEvent;
use crate::CircuitBreaker;
use outbound_core::{EventListener, EventListeners, FnListener};
use std::time::Duration;

/// Settings for one circuit breaker.
#[derive(Clone)]
pub struct CircuitBreakerConfig {
    pub(crate) name: String,
    pub(crate) max_requests: u32,
    pub(crate) interval: Duration,
    pub(crate) timeout: Duration,
    pub(crate) requests_volume_threshold: u32,
    pub(crate) failure_threshold: f64,
    pub(crate) event_listeners: EventListeners<CircuitBreakerEvent>,
}

impl CircuitBreakerConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> CircuitBreakerConfigBuilder {
        CircuitBreakerConfigBuilder::new()
    }

    /// The breaker's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Probe calls admitted while half-open, and the consecutive successes
    /// needed to close again.
    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    /// How often counts are cleared while closed. Zero never clears.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// How long the breaker stays open before probing.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Minimum counted requests before the failure ratio is considered.
    pub fn requests_volume_threshold(&self) -> u32 {
        self.requests_volume_threshold
    }

    /// Failure ratio at or above which the breaker trips.
    pub fn failure_threshold(&self) -> f64 {
        self.failure_threshold
    }

    /// The trip rule: enough volume and a high enough failure ratio.
    pub fn ready_to_trip(&self, counts: &BreakerCounts) -> bool {
        counts.requests > 0
            && counts.requests >= self.requests_volume_threshold
            && counts.failure_ratio() >= self.failure_threshold
    }
}

impl std::fmt::Debug for CircuitBreakerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreakerConfig")
            .field("name", &self.name)
            .field("max_requests", &self.max_requests)
            .field("interval", &self.interval)
            .field("timeout", &self.timeout)
            .field("requests_volume_threshold", &self.requests_volume_threshold)
            .field("failure_threshold", &self.failure_threshold)
            .field("event_listeners", &self.event_listeners)
            .finish()
    }
}

/// Builder for configuring and constructing a circuit breaker.
pub struct CircuitBreakerConfigBuilder {
    name: String,
    max_requests: u32,
    interval: Duration,
    timeout: Duration,
    requests_volume_threshold: u32,
    failure_threshold: f64,
    event_listeners: EventListeners<CircuitBreakerEvent>,
}

impl CircuitBreakerConfigBuilder {
    /// Creates a new builder with default values.
    pub fn new() -> Self {
        Self {
            name: String::from("<unnamed>"),
            max_requests: 1,
            interval: Duration::from_secs(60),
            timeout: Duration::from_secs(60),
            requests_volume_threshold: 10,
            failure_threshold: 0.5,
            event_listeners: EventListeners::new(),
        }
    }

    /// Names the breaker, usually after the dependency it guards.
    ///
    /// Default: `<unnamed>`
    pub fn name<N: Into<String>>(mut self, n: N) -> Self {
        self.name = n.into();
        self
    }

    /// Sets how many probe calls are admitted while half-open. The same
    /// number of consecutive probe successes closes the breaker.
    ///
    /// Default: 1
    pub fn max_requests(mut self, n: u32) -> Self {
        self.max_requests = n;
        self
    }

    /// Sets the period after which counts are cleared while closed.
    /// `Duration::ZERO` keeps counting until the next state change.
    ///
    /// Default: 60 seconds
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Sets how long the breaker stays open before admitting probes.
    ///
    /// Default: 60 seconds
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the minimum number of counted requests before the breaker may trip.
    ///
    /// Default: 10
    pub fn requests_volume_threshold(mut self, n: u32) -> Self {
        self.requests_volume_threshold = n;
        self
    }

    /// Sets the failure ratio, in `[0, 1]`, at which the breaker trips.
    ///
    /// Default: 0.5
    pub fn failure_threshold(mut self, ratio: f64) -> Self {
        self.failure_threshold = ratio;
        self
    }

    /// Registers a callback invoked on every state transition with the
    /// previous and the new state.
    ///
    /// ```rust
    /// use outbound_circuitbreaker::{CircuitBreaker, CircuitState};
    ///
    /// let breaker = CircuitBreaker::builder()
    ///     .name("inventory")
    ///     .on_state_transition(|from, to| {
    ///         if to == CircuitState::Open {
    ///             eprintln!("inventory degraded ({from} -> {to})");
    ///         }
    ///     })
    ///     .build()
    ///     .unwrap();
    /// # drop(breaker);
    /// ```
    pub fn on_state_transition<F>(mut self, f: F) -> Self
    where
        F: Fn(CircuitState, CircuitState) + Send + Sync + 'static,
    {
        self.event_listeners
            .add(FnListener::new(move |event: &CircuitBreakerEvent| {
                if let CircuitBreakerEvent::StateTransition {
                    from_state,
                    to_state,
                    ..
                } = event
                {
                    f(*from_state, *to_state);
                }
            }));
        self
    }

    /// Registers a callback invoked when a call is let through.
    pub fn on_call_permitted<F>(mut self, f: F) -> Self
    where
        F: Fn(CircuitState) + Send + Sync + 'static,
    {
        self.event_listeners
            .add(FnListener::new(move |event: &CircuitBreakerEvent| {
                if let CircuitBreakerEvent::CallPermitted { state, .. } = event {
                    f(*state);
                }
            }));
        self
    }

    /// Registers a callback invoked when a call is refused.
    pub fn on_call_rejected<F>(mut self, f: F) -> Self
    where
        F: Fn(CircuitState) + Send + Sync + 'static,
    {
        self.event_listeners
            .add(FnListener::new(move |event: &CircuitBreakerEvent| {
                if let CircuitBreakerEvent::CallRejected { state, .. } = event {
                    f(*state);
                }
            }));
        self
    }

    /// Registers a callback invoked when a success is counted.
    pub fn on_success<F>(mut self, f: F) -> Self
    where
        F: Fn(CircuitState) + Send + Sync + 'static,
    {
        self.event_listeners
            .add(FnListener::new(move |event: &CircuitBreakerEvent| {
                if let CircuitBreakerEvent::SuccessRecorded { state, .. } = event {
                    f(*state);
                }
            }));
        self
    }

    /// Registers a callback invoked when a failure is counted.
    pub fn on_failure<F>(mut self, f: F) -> Self
    where
        F: Fn(CircuitState) + Send + Sync + 'static,
    {
        self.event_listeners
            .add(FnListener::new(move |event: &CircuitBreakerEvent| {
                if let CircuitBreakerEvent::FailureRecorded { state, .. } = event {
                    f(*state);
                }
            }));
        self
    }

    /// Registers a listener for every event.
    pub fn add_listener<L>(mut self, listener: L) -> Self
    where
        L: EventListener<CircuitBreakerEvent> + 'static,
    {
        self.event_listeners.add(listener);
        self
    }

    /// Validates the settings and returns the configuration.
    pub fn into_config(self) -> Result<CircuitBreakerConfig, ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::EmptyName);
        }
        if self.max_requests == 0 {
            return Err(ConfigError::ZeroMaxRequests);
        }
        if !(0.0..=1.0).contains(&self.failure_threshold) {
            return Err(ConfigError::FailureThresholdOutOfRange(
                self.failure_threshold,
            ));
        }

        Ok(CircuitBreakerConfig {
            name: self.name,
            max_requests: self.max_requests,
            interval: self.interval,
            timeout: self.timeout,
            requests_volume_threshold: self.requests_volume_threshold,
            failure_threshold: self.failure_threshold,
            event_listeners: self.event_listeners,
        })
    }

    /// Validates the settings and creates the breaker.
    pub fn build(self) -> Result<CircuitBreaker, ConfigError> {
        self.into_config().map(CircuitBreaker::new)
    }
}

impl Default for CircuitBreakerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
