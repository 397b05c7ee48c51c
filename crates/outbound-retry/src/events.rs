use outbound_core::{CancelReason, ResilienceEvent};
use std::time::{Duration, Instant};

/// Events emitted by the retry middleware.
#[derive(Debug, Clone)]
pub enum RetryEvent {
    /// Attempt `attempt` failed transiently; the next starts after `delay`.
    Retry {
        name: String,
        timestamp: Instant,
        attempt: usize,
        delay: Duration,
    },
    /// The call succeeded on attempt `attempts`.
    Success {
        name: String,
        timestamp: Instant,
        attempts: usize,
    },
    /// Every permitted attempt failed transiently.
    Exhausted {
        name: String,
        timestamp: Instant,
        attempts: usize,
    },
    /// Attempt `attempt` failed with an error that is not retried.
    NotRetried {
        name: String,
        timestamp: Instant,
        attempt: usize,
    },
    /// The caller gave up before or during attempt `attempt`.
    Cancelled {
        name: String,
        timestamp: Instant,
        attempt: usize,
        reason: CancelReason,
    },
}

impl ResilienceEvent for RetryEvent {
    fn event_type(&self) -> &'static str {
        match self {
            RetryEvent::Retry { .. } => "retry",
            RetryEvent::Success { .. } => "success",
            RetryEvent::Exhausted { .. } => "exhausted",
            RetryEvent::NotRetried { .. } => "not_retried",
            RetryEvent::Cancelled { .. } => "cancelled",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            RetryEvent::Retry { timestamp, .. }
            | RetryEvent::Success { timestamp, .. }
            | RetryEvent::Exhausted { timestamp, .. }
            | RetryEvent::NotRetried { timestamp, .. }
            | RetryEvent::Cancelled { timestamp, .. } => *timestamp,
        }
    }

    fn dependency(&self) -> &str {
        match self {
            RetryEvent::Retry { name, .. }
            | RetryEvent::Success { name, .. }
            | RetryEvent::Exhausted { name, .. }
            | RetryEvent::NotRetried { name, .. }
            | RetryEvent::Cancelled { name, .. } => name,
        }
    }
}
