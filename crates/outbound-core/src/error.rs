//! Classified call outcomes.
//!
//! Every layer of the stack reports failure through [`CallError`]. The
//! variant decides what the layers above do with it:
//!
//! | Variant       | Retried | Counted by the breaker |
//! |---------------|---------|------------------------|
//! | `Transient`   | yes     | yes                    |
//! | `Permanent`   | no      | yes                    |
//! | `Exhausted`   | no      | yes (once per call)    |
//! | `Cancelled`   | no      | no                     |
//! | `CircuitOpen` | no      | no                     |
//!
//! ```rust
//! use outbound_core::{CallError, FailureKind};
//!
//! let err = CallError::transient(FailureKind::Status(503), "service unavailable");
//! assert!(err.is_retryable());
//! assert_eq!(err.status(), Some(503));
//!
//! let err = CallError::permanent(FailureKind::InvalidRequest, "bad uri");
//! assert!(!err.is_retryable());
//! ```

use crate::context::CancelReason;
use std::fmt;
use thiserror::Error;

/// Which timeout fired inside the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutPhase {
    /// Dialing the TCP connection.
    Connect,
    /// Completing the TLS handshake.
    TlsHandshake,
    /// Waiting for the response status line and headers.
    ResponseHeaders,
}

impl fmt::Display for TimeoutPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeoutPhase::Connect => write!(f, "connect"),
            TimeoutPhase::TlsHandshake => write!(f, "tls handshake"),
            TimeoutPhase::ResponseHeaders => write!(f, "response headers"),
        }
    }
}

/// What went wrong on a single attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The connection could not be established.
    Connect,
    /// A transport timeout fired.
    Timeout(TimeoutPhase),
    /// Any other transport-level I/O error.
    Io,
    /// The dependency replied with an error status.
    Status(u16),
    /// The response body could not be read.
    Body,
    /// The request could not be built or serialized.
    InvalidRequest,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Connect => write!(f, "connect error"),
            FailureKind::Timeout(phase) => write!(f, "{} timeout", phase),
            FailureKind::Io => write!(f, "i/o error"),
            FailureKind::Status(code) => write!(f, "status {}", code),
            FailureKind::Body => write!(f, "body error"),
            FailureKind::InvalidRequest => write!(f, "invalid request"),
        }
    }
}

/// The cause of a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    kind: FailureKind,
    message: String,
}

impl Failure {
    /// Creates a failure of the given kind.
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// The failure kind.
    pub fn kind(&self) -> FailureKind {
        self.kind
    }

    /// Human-readable detail, usually the underlying error's message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The HTTP status, for [`FailureKind::Status`] failures.
    pub fn status(&self) -> Option<u16> {
        match self.kind {
            FailureKind::Status(code) => Some(code),
            _ => None,
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "{}", self.kind)
        } else {
            write!(f, "{}: {}", self.kind, self.message)
        }
    }
}

/// A failed outbound call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallError {
    /// A failure that retrying unchanged may resolve.
    #[error("transient failure: {0}")]
    Transient(Failure),

    /// A failure that retrying cannot fix.
    #[error("permanent failure: {0}")]
    Permanent(Failure),

    /// The caller gave up. Not attributed to the dependency.
    #[error("call cancelled: {0}")]
    Cancelled(CancelReason),

    /// Every permitted attempt failed transiently.
    #[error("dependency call failed after {attempts} attempts: {last}")]
    Exhausted {
        /// Number of attempts made.
        attempts: usize,
        /// The last transient failure observed.
        last: Box<CallError>,
    },

    /// The circuit breaker refused the call without contacting the dependency.
    #[error("circuit breaker '{name}' is open")]
    CircuitOpen {
        /// Name of the breaker that refused the call.
        name: String,
    },
}

impl CallError {
    /// Shorthand for a [`CallError::Transient`] failure.
    pub fn transient(kind: FailureKind, message: impl Into<String>) -> Self {
        CallError::Transient(Failure::new(kind, message))
    }

    /// Shorthand for a [`CallError::Permanent`] failure.
    pub fn permanent(kind: FailureKind, message: impl Into<String>) -> Self {
        CallError::Permanent(Failure::new(kind, message))
    }

    /// Returns `true` if another attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CallError::Transient(_))
    }

    /// Returns `true` for transient failures, including exhausted retries.
    pub fn is_transient(&self) -> bool {
        matches!(self, CallError::Transient(_) | CallError::Exhausted { .. })
    }

    /// Returns `true` for permanent failures.
    pub fn is_permanent(&self) -> bool {
        matches!(self, CallError::Permanent(_))
    }

    /// Returns `true` if the caller cancelled or ran out of time.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, CallError::Cancelled(_))
    }

    /// Returns `true` if a circuit breaker refused the call.
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, CallError::CircuitOpen { .. })
    }

    /// The underlying failure, looking through [`CallError::Exhausted`].
    pub fn failure(&self) -> Option<&Failure> {
        match self {
            CallError::Transient(failure) | CallError::Permanent(failure) => Some(failure),
            CallError::Exhausted { last, .. } => last.failure(),
            CallError::Cancelled(_) | CallError::CircuitOpen { .. } => None,
        }
    }

    /// The HTTP status that caused the failure, if any.
    pub fn status(&self) -> Option<u16> {
        self.failure().and_then(Failure::status)
    }

    /// Number of attempts made before this error surfaced, when known.
    pub fn attempts(&self) -> Option<usize> {
        match self {
            CallError::Exhausted { attempts, .. } => Some(*attempts),
            _ => None,
        }
    }
}

impl From<CancelReason> for CallError {
    fn from(reason: CancelReason) -> Self {
        CallError::Cancelled(reason)
    }
}
