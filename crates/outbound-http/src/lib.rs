//! HTTP plumbing for outbound calls: a pooled [`Transport`] with connection
//! timeouts, and a [`PlainClient`] that sends one request and classifies the
//! outcome as a [`outbound_core::CallError`].
//!
//! Retries and circuit breaking live in `outbound-retry` and
//! `outbound-circuitbreaker`; both wrap [`PlainClient`] as a Tower service.
//!
//! ```rust,no_run
//! use outbound_core::CallContext;
//! use outbound_http::{OutboundRequest, PlainClient, Transport, TransportConfig};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = PlainClient::new(Transport::new(TransportConfig::default())?);
//! let ctx = CallContext::with_timeout(Duration::from_secs(3));
//! let response = client
//!     .send(OutboundRequest::get("http://localhost:8081/health", ctx))
//!     .await?;
//! assert!(response.status.is_success());
//! # Ok(())
//! # }
//! ```

pub mod client;
mod request;
pub mod transport;

pub use client::{PlainClient, StatusPolicy};
pub use request::{OutboundRequest, OutboundResponse};
pub use transport::{Transport, TransportBuildError, TransportConfig, TransportError};
