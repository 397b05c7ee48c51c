//! The guarded downstream dependency.
//!
//! A [`Dependency`] owns the one circuit breaker for its downstream service
//! and a retrying client. A call goes through the breaker first, so an open
//! circuit fails fast without touching the network; otherwise the retry loop
//! runs to completion and its final outcome is counted once by the breaker.

use crate::config::{Settings, SettingsError};
use outbound_circuitbreaker::{CircuitBreaker, CircuitBreakerError};
use outbound_core::{CallContext, CallError, CancelReason};
use outbound_http::{OutboundRequest, OutboundResponse, PlainClient, Transport};
use outbound_retry::{Retry, RetryLayer};
use thiserror::Error;
use tower::{Layer, ServiceExt};

/// Why a guarded call did not succeed.
#[derive(Debug, Error)]
pub enum DependencyError {
    /// The breaker is open; the dependency was not contacted.
    #[error("dependency '{name}' is unavailable")]
    Unavailable { name: String },

    /// Every attempt failed transiently.
    #[error("dependency call failed after {attempts} attempts: {source}")]
    Failed {
        attempts: usize,
        #[source]
        source: CallError,
    },

    /// The dependency refused the request; retrying would not help.
    #[error("dependency rejected the request: {0}")]
    Rejected(#[source] CallError),

    /// The caller gave up before the dependency answered.
    #[error("dependency call cancelled: {0}")]
    Cancelled(CancelReason),
}

impl DependencyError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, DependencyError::Unavailable { .. })
    }
}

impl From<CircuitBreakerError<CallError>> for DependencyError {
    fn from(err: CircuitBreakerError<CallError>) -> Self {
        match err {
            CircuitBreakerError::OpenCircuit { name } => DependencyError::Unavailable { name },
            CircuitBreakerError::Inner(inner) => inner.into(),
        }
    }
}

impl From<CallError> for DependencyError {
    fn from(err: CallError) -> Self {
        match err {
            CallError::Exhausted { attempts, last } => DependencyError::Failed {
                attempts,
                source: *last,
            },
            err @ CallError::Transient(_) => DependencyError::Failed {
                attempts: 1,
                source: err,
            },
            err @ CallError::Permanent(_) => DependencyError::Rejected(err),
            CallError::Cancelled(reason) => DependencyError::Cancelled(reason),
            CallError::CircuitOpen { name } => DependencyError::Unavailable { name },
        }
    }
}

/// One downstream service behind a shared breaker and a retrying client.
#[derive(Clone)]
pub struct Dependency {
    breaker: CircuitBreaker,
    client: Retry<PlainClient>,
    url: String,
}

impl Dependency {
    pub fn new(
        breaker: CircuitBreaker,
        retry: &RetryLayer,
        client: PlainClient,
        url: impl Into<String>,
    ) -> Self {
        Self {
            breaker,
            client: retry.layer(client),
            url: url.into(),
        }
    }

    /// Builds the breaker, retry policy and transport from settings.
    pub fn from_settings(settings: &Settings) -> Result<Self, SettingsError> {
        let breaker = settings.circuit_breaker.to_breaker()?;
        let retry = settings.retry.to_layer(breaker.name())?;
        let transport = Transport::new(settings.transport.to_transport_config())?;
        Ok(Self::new(
            breaker,
            &retry,
            PlainClient::new(transport),
            settings.downstream.health_url(),
        ))
    }

    pub fn name(&self) -> &str {
        self.breaker.name()
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Runs the guarded call under `ctx`.
    pub async fn check(&self, ctx: &CallContext) -> Result<OutboundResponse, DependencyError> {
        let request = OutboundRequest::get(self.url.as_str(), ctx.clone());
        let client = self.client.clone();

        let result = self
            .breaker
            .execute(move || client.oneshot(request))
            .await
            .map_err(DependencyError::from);

        if let Err(err) = &result {
            tracing::warn!(dependency = %self.name(), error = %err, "guarded call failed");
        }
        result
    }
}

impl std::fmt::Debug for Dependency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dependency")
            .field("name", &self.name())
            .field("url", &self.url)
            .field("state", &self.breaker.state_sync())
            .finish()
    }
}
