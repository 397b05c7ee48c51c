//! Single-shot HTTP client.
//!
//! [`PlainClient`] sends a request once over a [`Transport`] and classifies
//! the result:
//!
//! - transport errors are transient;
//! - a reply below 400 is a success;
//! - a reply at or above 400 is classified by the [`StatusPolicy`];
//! - a request that cannot be built is permanent.
//!
//! The body is always read to the end before returning, whatever the status,
//! so the connection goes back to the pool. Every wait races the caller's
//! context; a caller who gives up gets [`CallError::Cancelled`].

use crate::request::{OutboundRequest, OutboundResponse};
use crate::transport::Transport;
use futures::future::BoxFuture;
use http::StatusCode;
use http_body_util::BodyExt;
use outbound_core::{CallError, Failure, FailureKind, HasCallContext};
use std::task::{Context, Poll};
use tower::Service;

/// How error statuses are classified.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StatusPolicy {
    /// 5xx, 408 and 429 are transient; every other 4xx is permanent.
    #[default]
    Standard,
    /// Every status at or above 400 is transient.
    AllTransient,
}

impl StatusPolicy {
    /// Classifies an error status (`>= 400`).
    pub fn classify(&self, status: StatusCode, message: String) -> CallError {
        let failure = Failure::new(FailureKind::Status(status.as_u16()), message);
        let transient = match self {
            StatusPolicy::AllTransient => true,
            StatusPolicy::Standard => {
                status.is_server_error()
                    || status == StatusCode::REQUEST_TIMEOUT
                    || status == StatusCode::TOO_MANY_REQUESTS
            }
        };
        if transient {
            CallError::Transient(failure)
        } else {
            CallError::Permanent(failure)
        }
    }
}

/// Sends one request, no retries.
#[derive(Debug, Clone)]
pub struct PlainClient {
    transport: Transport,
    policy: StatusPolicy,
}

impl PlainClient {
    /// A client over `transport` with the standard status policy.
    pub fn new(transport: Transport) -> Self {
        Self {
            transport,
            policy: StatusPolicy::default(),
        }
    }

    /// Replaces the status policy.
    pub fn with_status_policy(mut self, policy: StatusPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// The underlying transport.
    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    /// Sends `request` once.
    pub async fn send(&self, request: OutboundRequest) -> Result<OutboundResponse, CallError> {
        let ctx = request.call_context().clone();
        ctx.check()?;

        let wire = request.to_http().map_err(|err| {
            CallError::permanent(FailureKind::InvalidRequest, err.to_string())
        })?;

        let response = match ctx.run(self.transport.send(wire)).await? {
            Ok(response) => response,
            Err(err) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(
                    method = %request.method(),
                    uri = %request.uri(),
                    error = %err,
                    "outbound request failed"
                );
                return Err(CallError::Transient(err.into_failure()));
            }
        };

        let (parts, body) = response.into_parts();
        let body = match ctx.run(body.collect()).await? {
            Ok(collected) => collected.to_bytes(),
            Err(err) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(
                    method = %request.method(),
                    uri = %request.uri(),
                    error = %err,
                    "reading outbound response body failed"
                );
                return Err(CallError::transient(FailureKind::Body, err.to_string()));
            }
        };

        if parts.status.as_u16() >= 400 {
            #[cfg(feature = "tracing")]
            tracing::warn!(
                method = %request.method(),
                uri = %request.uri(),
                status = parts.status.as_u16(),
                "outbound request returned error status"
            );
            let reason = parts
                .status
                .canonical_reason()
                .unwrap_or_default()
                .to_string();
            return Err(self.policy.classify(parts.status, reason));
        }

        Ok(OutboundResponse {
            status: parts.status,
            headers: parts.headers,
            body,
        })
    }
}

impl Service<OutboundRequest> for PlainClient {
    type Response = OutboundResponse;
    type Error = CallError;
    type Future = BoxFuture<'static, Result<OutboundResponse, CallError>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: OutboundRequest) -> Self::Future {
        let client = self.clone();
        Box::pin(async move { client.send(request).await })
    }
}
