//! Retry behavior across its public API.
//!
//! Test organization:
//! - attempts.rs: attempt counts, permanent failures, exhaustion
//! - backoff.rs: spacing between attempts
//! - cancellation.rs: caller deadlines and cancellation
//! - service.rs: the Tower layer and events

mod backoff;
mod service;

use outbound_core::{CallContext, CallError, FailureKind, HasCallContext};
use outbound_retry::{RetryConfig, RetryLayer};
use std::time::Duration;

pub(crate) fn unavailable() -> CallError {
    CallError::transient(FailureKind::Status(503), "Service Unavailable")
}

pub(crate) fn layer(max_attempts: usize) -> RetryLayer {
    RetryConfig::builder()
        .name("retry-tests")
        .max_attempts(max_attempts)
        .base_delay(Duration::from_millis(100))
        .max_delay(Duration::from_secs(1))
        .no_jitter()
        .build()
        .unwrap()
}

/// A request that carries its caller's context.
#[derive(Debug, Clone)]
pub(crate) struct Lookup {
    pub(crate) key: &'static str,
    pub(crate) ctx: CallContext,
}

impl HasCallContext for Lookup {
    fn call_context(&self) -> &CallContext {
        &self.ctx
    }
}
