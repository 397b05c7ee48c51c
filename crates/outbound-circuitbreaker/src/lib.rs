//! Per-dependency circuit breaker.
//!
//! A circuit breaker stops calling a dependency that keeps failing, and after
//! a cool-down lets a few probe calls through to find out whether it has
//! recovered.
//!
//! ## States
//! - **Closed**: calls pass through; outcomes are counted. Counts are cleared
//!   every `interval`. The breaker trips to Open when, on a failure, at least
//!   `requests_volume_threshold` requests have been counted and the failure
//!   ratio is at or above `failure_threshold`.
//! - **Open**: calls are rejected with [`CircuitBreakerError::OpenCircuit`]
//!   without invoking the operation. Once `timeout` has passed, the next look
//!   at the breaker moves it to Half-Open.
//! - **Half-Open**: up to `max_requests` probes are admitted. Any counted
//!   failure re-opens the breaker; `max_requests` consecutive successes close
//!   it.
//!
//! Every state change starts a new *generation* with zeroed counts. Outcomes
//! of calls admitted under an earlier generation are discarded.
//!
//! ## Usage
//!
//! One [`CircuitBreaker`] exists per dependency and is shared by every call
//! site; clones share state.
//!
//! ```rust
//! use outbound_circuitbreaker::{CircuitBreaker, CircuitState};
//! use outbound_core::{CallError, FailureKind};
//! use std::time::Duration;
//!
//! # async fn example() {
//! let breaker = CircuitBreaker::builder()
//!     .name("inventory")
//!     .requests_volume_threshold(5)
//!     .failure_threshold(0.6)
//!     .timeout(Duration::from_secs(30))
//!     .build()
//!     .unwrap();
//!
//! let result = breaker
//!     .execute(|| async { Err::<(), _>(CallError::transient(FailureKind::Status(503), "")) })
//!     .await;
//! assert!(result.is_err());
//! assert_eq!(breaker.state(), CircuitState::Closed);
//! # }
//! ```
//!
//! ## As a Tower layer
//!
//! ```rust
//! use outbound_circuitbreaker::CircuitBreaker;
//! use tower::{ServiceBuilder, service_fn};
//!
//! # async fn example() {
//! let breaker = CircuitBreaker::builder().name("echo").build().unwrap();
//!
//! let service = ServiceBuilder::new()
//!     .layer(breaker.layer())
//!     .service(service_fn(|req: String| async move { Ok::<_, std::io::Error>(req) }));
//! # drop(service);
//! # }
//! ```
//!
//! ## Cancellation
//!
//! Results the classifier marks [`Verdict::Ignored`] are not counted and give
//! their admission slot back. [`outbound_core::CallError::Cancelled`] is
//! ignored by default. A call whose future is dropped before completing is
//! treated the same way.

use crate::circuit::{Circuit, Ticket};
#[cfg(feature = "metrics")]
use metrics::{counter, describe_counter, describe_gauge, gauge};
use std::future::Future;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
#[cfg(feature = "metrics")]
use std::sync::Once;
use std::time::Duration;
use tokio::time::Instant;

pub use circuit::{BreakerCounts, CircuitState};
pub use classifier::{Classify, DefaultClassifier, FailureClassifier, FnClassifier, Verdict};
pub use config::{CircuitBreakerConfig, CircuitBreakerConfigBuilder};
pub use error::{CircuitBreakerError, ConfigError};
pub use events::CircuitBreakerEvent;
pub use layer::{CircuitBreakerLayer, CircuitBreakerService};

mod circuit;
pub mod classifier;
mod config;
mod error;
mod events;
mod layer;

#[cfg(feature = "metrics")]
static METRICS_INIT: Once = Once::new();

#[cfg(feature = "metrics")]
fn describe_metrics() {
    METRICS_INIT.call_once(|| {
        describe_counter!(
            "circuitbreaker_calls_total",
            "Calls seen by the circuit breaker, by outcome"
        );
        describe_counter!(
            "circuitbreaker_transitions_total",
            "Circuit breaker state transitions"
        );
        describe_gauge!(
            "circuitbreaker_state",
            "Current circuit breaker state (0 closed, 1 open, 2 half-open)"
        );
    });
}

struct Shared {
    config: CircuitBreakerConfig,
    circuit: Mutex<Circuit>,
    state: AtomicU8,
}

/// A shared circuit breaker for one dependency.
///
/// Cloning is cheap; clones observe and drive the same state.
#[derive(Clone)]
pub struct CircuitBreaker {
    shared: Arc<Shared>,
}

/// Point-in-time view of a breaker, for readiness endpoints and logs.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct CircuitSnapshot {
    /// Breaker name.
    pub name: String,
    /// Current state.
    pub state: CircuitState,
    /// Counts for the current generation.
    pub counts: BreakerCounts,
    /// Time spent in the current state.
    pub time_in_state: Duration,
}

impl CircuitBreaker {
    /// Creates a breaker from a validated configuration.
    pub fn new(config: CircuitBreakerConfig) -> Self {
        #[cfg(feature = "metrics")]
        describe_metrics();

        #[cfg(feature = "metrics")]
        gauge!("circuitbreaker_state", "circuitbreaker" => config.name.clone())
            .set(f64::from(CircuitState::Closed as u8));

        let circuit = Circuit::new(&config, Instant::now());
        Self {
            shared: Arc::new(Shared {
                config,
                circuit: Mutex::new(circuit),
                state: AtomicU8::new(CircuitState::Closed as u8),
            }),
        }
    }

    /// Returns a configuration builder whose `build` yields a breaker.
    pub fn builder() -> CircuitBreakerConfigBuilder {
        CircuitBreakerConfigBuilder::new()
    }

    /// The breaker's name.
    pub fn name(&self) -> &str {
        &self.shared.config.name
    }

    /// The breaker's configuration.
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.shared.config
    }

    /// A Tower layer that wraps services with this breaker.
    pub fn layer(&self) -> CircuitBreakerLayer {
        CircuitBreakerLayer::new(self.clone())
    }

    /// Runs `op` under the breaker, counting errors by their [`Classify`]
    /// verdict.
    pub async fn execute<F, Fut, T, E>(&self, op: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify,
    {
        self.execute_with(&DefaultClassifier, op).await
    }

    /// Runs `op` under the breaker, counting its result with `classifier`.
    ///
    /// When the breaker refuses the call, `op` is never invoked.
    pub async fn execute_with<C, F, Fut, T, E>(
        &self,
        classifier: &C,
        op: F,
    ) -> Result<T, CircuitBreakerError<E>>
    where
        C: FailureClassifier<T, E> + ?Sized,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let guard = self.try_acquire()?;
        let result = op().await;
        guard.finish(classifier.classify(&result));
        result.map_err(CircuitBreakerError::Inner)
    }

    /// Asks for admission. The returned guard must be finished with a verdict;
    /// dropping it unfinished records [`Verdict::Ignored`].
    pub(crate) fn try_acquire<E>(&self) -> Result<CallGuard, CircuitBreakerError<E>> {
        let ticket = self.with_circuit(|circuit, config, now, events| {
            circuit.try_acquire(config, now, events)
        });
        match ticket {
            Some(ticket) => Ok(CallGuard {
                breaker: self.clone(),
                ticket: Some(ticket),
            }),
            None => Err(CircuitBreakerError::OpenCircuit {
                name: self.shared.config.name.clone(),
            }),
        }
    }

    fn record(&self, ticket: Ticket, verdict: Verdict) {
        self.with_circuit(|circuit, config, now, events| {
            circuit.record(ticket, verdict, config, now, events)
        });
    }

    /// The current state, applying a due Open to Half-Open move first.
    pub fn state(&self) -> CircuitState {
        self.with_circuit(|circuit, config, now, events| {
            circuit.current_state(config, now, events)
        })
    }

    /// The last state the breaker stored, without taking its lock.
    ///
    /// May still read `Open` after the cool-down until the next call or
    /// [`CircuitBreaker::state`] looks at the breaker.
    pub fn state_sync(&self) -> CircuitState {
        CircuitState::from_u8(self.shared.state.load(Ordering::Acquire))
    }

    /// Returns whether the circuit is currently open.
    pub fn is_open(&self) -> bool {
        self.state() == CircuitState::Open
    }

    /// Counts for the current generation.
    pub fn counts(&self) -> BreakerCounts {
        self.with_circuit(|circuit, config, now, events| {
            circuit.current_state(config, now, events);
            circuit.counts()
        })
    }

    /// When the breaker last opened, if it ever has.
    pub fn opened_at(&self) -> Option<Instant> {
        self.with_circuit(|circuit, _, _, _| circuit.opened_at())
    }

    /// A consistent view of state and counts.
    pub fn snapshot(&self) -> CircuitSnapshot {
        self.with_circuit(|circuit, config, now, events| {
            let state = circuit.current_state(config, now, events);
            CircuitSnapshot {
                name: config.name.clone(),
                state,
                counts: circuit.counts(),
                time_in_state: now.saturating_duration_since(circuit.last_state_change()),
            }
        })
    }

    /// Forces the circuit into the open state.
    pub fn force_open(&self) {
        self.with_circuit(|circuit, config, now, events| {
            circuit.transition_to(CircuitState::Open, config, now, events)
        });
    }

    /// Forces the circuit into the closed state.
    pub fn force_closed(&self) {
        self.with_circuit(|circuit, config, now, events| {
            circuit.transition_to(CircuitState::Closed, config, now, events)
        });
    }

    /// Resets the circuit to the closed state and clears counts.
    pub fn reset(&self) {
        self.with_circuit(|circuit, config, now, events| circuit.reset(config, now, events));
    }

    /// Returns an HTTP status code based on circuit state.
    ///
    /// - Closed: 200 (OK)
    /// - HalfOpen: 200 (OK) - accepting limited traffic
    /// - Open: 503 (Service Unavailable)
    pub fn http_status(&self) -> u16 {
        match self.state() {
            CircuitState::Closed | CircuitState::HalfOpen => 200,
            CircuitState::Open => 503,
        }
    }

    /// Returns "healthy" when closed, "degraded" when half-open, "unhealthy"
    /// when open.
    pub fn health_status(&self) -> &'static str {
        match self.state() {
            CircuitState::Closed => "healthy",
            CircuitState::HalfOpen => "degraded",
            CircuitState::Open => "unhealthy",
        }
    }

    /// Runs `f` under the lock, then publishes the events it produced.
    fn with_circuit<R>(
        &self,
        f: impl FnOnce(&mut Circuit, &CircuitBreakerConfig, Instant, &mut Vec<CircuitBreakerEvent>) -> R,
    ) -> R {
        let mut events = Vec::new();
        let result = {
            let mut circuit = self
                .shared
                .circuit
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let result = f(&mut circuit, &self.shared.config, Instant::now(), &mut events);
            self.shared
                .state
                .store(circuit.state() as u8, Ordering::Release);
            result
        };
        if !events.is_empty() {
            self.publish(&events);
        }
        result
    }

    fn publish(&self, events: &[CircuitBreakerEvent]) {
        #[cfg(any(feature = "tracing", feature = "metrics"))]
        for event in events {
            self.observe(event);
        }
        self.shared.config.event_listeners.emit_all(events);
    }

    #[cfg(any(feature = "tracing", feature = "metrics"))]
    fn observe(&self, event: &CircuitBreakerEvent) {
        #[cfg(feature = "metrics")]
        let breaker = self.shared.config.name.clone();

        match event {
            CircuitBreakerEvent::StateTransition {
                name,
                at,
                from_state,
                to_state,
                ..
            } => {
                #[cfg(feature = "tracing")]
                tracing::info!(
                    breaker = %name,
                    from = %from_state,
                    to = %to_state,
                    at_unix_ms = at
                        .duration_since(std::time::UNIX_EPOCH)
                        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
                        .unwrap_or_default(),
                    "circuit breaker state changed"
                );
                #[cfg(feature = "metrics")]
                {
                    counter!(
                        "circuitbreaker_transitions_total",
                        "circuitbreaker" => breaker.clone(),
                        "from" => from_state.as_str(),
                        "to" => to_state.as_str()
                    )
                    .increment(1);
                    gauge!("circuitbreaker_state", "circuitbreaker" => breaker)
                        .set(f64::from(*to_state as u8));
                }
            }
            CircuitBreakerEvent::CallRejected { name, state, .. } => {
                #[cfg(feature = "tracing")]
                tracing::error!(breaker = %name, state = %state, "circuit breaker rejected call");
                #[cfg(feature = "metrics")]
                counter!(
                    "circuitbreaker_calls_total",
                    "circuitbreaker" => breaker,
                    "outcome" => "rejected"
                )
                .increment(1);
            }
            CircuitBreakerEvent::SuccessRecorded { .. } => {
                #[cfg(feature = "metrics")]
                counter!(
                    "circuitbreaker_calls_total",
                    "circuitbreaker" => breaker,
                    "outcome" => "success"
                )
                .increment(1);
            }
            CircuitBreakerEvent::FailureRecorded { name, state, .. } => {
                #[cfg(feature = "tracing")]
                tracing::debug!(breaker = %name, state = %state, "circuit breaker counted failure");
                #[cfg(feature = "metrics")]
                counter!(
                    "circuitbreaker_calls_total",
                    "circuitbreaker" => breaker,
                    "outcome" => "failure"
                )
                .increment(1);
            }
            CircuitBreakerEvent::OutcomeIgnored {
                name, state, stale, ..
            } => {
                #[cfg(feature = "tracing")]
                tracing::trace!(breaker = %name, state = %state, stale, "circuit breaker ignored outcome");
                #[cfg(feature = "metrics")]
                counter!(
                    "circuitbreaker_calls_total",
                    "circuitbreaker" => breaker,
                    "outcome" => "ignored"
                )
                .increment(1);
            }
            CircuitBreakerEvent::CallPermitted { name, state, .. } => {
                #[cfg(feature = "tracing")]
                tracing::trace!(breaker = %name, state = %state, "circuit breaker permitted call");
            }
        }
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.shared.config.name)
            .field("state", &self.state_sync())
            .finish()
    }
}

/// An admitted call that has not reported its outcome yet.
pub(crate) struct CallGuard {
    breaker: CircuitBreaker,
    ticket: Option<Ticket>,
}

impl CallGuard {
    pub(crate) fn finish(mut self, verdict: Verdict) {
        if let Some(ticket) = self.ticket.take() {
            self.breaker.record(ticket, verdict);
        }
    }
}

impl Drop for CallGuard {
    fn drop(&mut self) {
        if let Some(ticket) = self.ticket.take() {
            self.breaker.record(ticket, Verdict::Ignored);
        }
    }
}
