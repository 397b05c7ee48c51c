use crate::circuit::CircuitState;
use outbound_core::ResilienceEvent;
use std::time::{Instant, SystemTime};

/// Events emitted by a circuit breaker.
///
/// Delivered after the breaker's lock is released, in the order they happened.
#[derive(Debug, Clone)]
pub enum CircuitBreakerEvent {
    /// The breaker moved between states.
    StateTransition {
        name: String,
        timestamp: Instant,
        /// Wall-clock time of the transition, for logs and dashboards.
        at: SystemTime,
        from_state: CircuitState,
        to_state: CircuitState,
    },
    /// A call was let through.
    CallPermitted {
        name: String,
        timestamp: Instant,
        state: CircuitState,
    },
    /// A call was refused without invoking the operation.
    CallRejected {
        name: String,
        timestamp: Instant,
        state: CircuitState,
    },
    /// A success was counted.
    SuccessRecorded {
        name: String,
        timestamp: Instant,
        state: CircuitState,
    },
    /// A failure was counted.
    FailureRecorded {
        name: String,
        timestamp: Instant,
        state: CircuitState,
    },
    /// An outcome was not counted: either classified as ignored, or `stale`
    /// because the breaker changed generation while the call was in flight.
    OutcomeIgnored {
        name: String,
        timestamp: Instant,
        state: CircuitState,
        stale: bool,
    },
}

impl ResilienceEvent for CircuitBreakerEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CircuitBreakerEvent::StateTransition { .. } => "state_transition",
            CircuitBreakerEvent::CallPermitted { .. } => "call_permitted",
            CircuitBreakerEvent::CallRejected { .. } => "call_rejected",
            CircuitBreakerEvent::SuccessRecorded { .. } => "success_recorded",
            CircuitBreakerEvent::FailureRecorded { .. } => "failure_recorded",
            CircuitBreakerEvent::OutcomeIgnored { .. } => "outcome_ignored",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            CircuitBreakerEvent::StateTransition { timestamp, .. }
            | CircuitBreakerEvent::CallPermitted { timestamp, .. }
            | CircuitBreakerEvent::CallRejected { timestamp, .. }
            | CircuitBreakerEvent::SuccessRecorded { timestamp, .. }
            | CircuitBreakerEvent::FailureRecorded { timestamp, .. }
            | CircuitBreakerEvent::OutcomeIgnored { timestamp, .. } => *timestamp,
        }
    }

    fn dependency(&self) -> &str {
        match self {
            CircuitBreakerEvent::StateTransition { name, .. }
            | CircuitBreakerEvent::CallPermitted { name, .. }
            | CircuitBreakerEvent::CallRejected { name, .. }
            | CircuitBreakerEvent::SuccessRecorded { name, .. }
            | CircuitBreakerEvent::FailureRecorded { name, .. }
            | CircuitBreakerEvent::OutcomeIgnored { name, .. } => name,
        }
    }
}
