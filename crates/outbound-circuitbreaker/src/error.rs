use outbound_core::CallError;
use thiserror::Error;

/// Errors returned by a circuit breaker.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CircuitBreakerError<E> {
    /// The breaker refused the call; the operation was not invoked.
    #[error("circuit breaker '{name}' is open")]
    OpenCircuit {
        /// Name of the breaker.
        name: String,
    },

    /// The operation ran and failed.
    #[error(transparent)]
    Inner(E),
}

impl<E> CircuitBreakerError<E> {
    /// Returns true if the error indicates the circuit is open.
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, CircuitBreakerError::OpenCircuit { .. })
    }

    /// Returns the inner error if present.
    pub fn into_inner(self) -> Option<E> {
        match self {
            CircuitBreakerError::Inner(e) => Some(e),
            CircuitBreakerError::OpenCircuit { .. } => None,
        }
    }
}

impl From<CircuitBreakerError<CallError>> for CallError {
    fn from(err: CircuitBreakerError<CallError>) -> Self {
        match err {
            CircuitBreakerError::OpenCircuit { name } => CallError::CircuitOpen { name },
            CircuitBreakerError::Inner(inner) => inner,
        }
    }
}

/// Invalid circuit breaker settings.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// `max_requests` must admit at least one probe.
    #[error("max_requests must be at least 1")]
    ZeroMaxRequests,

    /// The failure threshold is a ratio.
    #[error("failure_threshold must be within [0, 1], got {0}")]
    FailureThresholdOutOfRange(f64),

    /// The breaker needs a name for logs and metrics.
    #[error("circuit breaker name must not be empty")]
    EmptyName,
}
