//! Shared building blocks for the outbound resilience stack.
//!
//! Every layer of the stack (transport, plain client, retry, circuit breaker)
//! speaks the same vocabulary defined here:
//! - [`CallContext`]: the caller's deadline and cancellation signal
//! - [`CallError`]: the classified outcome of a failed call
//! - [`events`]: the listener plumbing used for observability

pub mod context;
pub mod error;
pub mod events;

pub use context::{CallContext, CancelReason, HasCallContext};
pub use error::{CallError, Failure, FailureKind, TimeoutPhase};
pub use events::{EventListener, EventListeners, FnListener, ResilienceEvent};
