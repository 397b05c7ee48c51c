use super::spawn_downstream;
use outbound_circuitbreaker::{CircuitBreaker, CircuitState};
use outbound_core::{CallContext, CallError, CancelReason};
use outbound_http::{
    OutboundRequest, OutboundResponse, PlainClient, Transport, TransportConfig,
};
use outbound_retry::{Retry, RetryConfig};
use std::time::Duration;
use tower::{Layer, ServiceExt};

/// A breaker in front of a retrying client.
#[derive(Clone)]
struct Stack {
    breaker: CircuitBreaker,
    client: Retry<PlainClient>,
}

impl Stack {
    fn new(volume: u32) -> Self {
        let breaker = CircuitBreaker::builder()
            .name("downstream")
            .requests_volume_threshold(volume)
            .failure_threshold(0.5)
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap();
        let retry = RetryConfig::builder()
            .name("downstream")
            .max_attempts(3)
            .base_delay(Duration::from_millis(1))
            .max_delay(Duration::from_millis(5))
            .no_jitter()
            .build()
            .unwrap();
        let client = retry.layer(PlainClient::new(Transport::new(TransportConfig::default()).unwrap()));
        Self { breaker, client }
    }

    async fn call(&self, request: OutboundRequest) -> Result<OutboundResponse, CallError> {
        let client = self.client.clone();
        self.breaker
            .execute(move || client.oneshot(request))
            .await
            .map_err(CallError::from)
    }
}

fn ctx() -> CallContext {
    CallContext::with_timeout(Duration::from_secs(5))
}

#[tokio::test]
async fn exhausted_retries_count_as_one_breaker_failure() {
    let downstream = spawn_downstream().await;
    let stack = Stack::new(10);

    let err = stack
        .call(OutboundRequest::get(downstream.url(503), ctx()))
        .await
        .unwrap_err();

    assert_eq!(err.attempts(), Some(3));
    assert_eq!(err.status(), Some(503));
    assert_eq!(downstream.hits(), 3);

    let counts = stack.breaker.counts();
    assert_eq!(counts.requests, 1);
    assert_eq!(counts.total_failures, 1);
}

#[tokio::test]
async fn open_breaker_skips_the_transport() {
    let downstream = spawn_downstream().await;
    let stack = Stack::new(2);

    for _ in 0..2 {
        let _ = stack
            .call(OutboundRequest::get(downstream.url(500), ctx()))
            .await;
    }
    assert_eq!(stack.breaker.state(), CircuitState::Open);
    assert_eq!(downstream.hits(), 6);

    let err = stack
        .call(OutboundRequest::get(downstream.url(200), ctx()))
        .await
        .unwrap_err();
    assert!(err.is_circuit_open());
    assert_eq!(downstream.hits(), 6);
}

#[tokio::test]
async fn permanent_failure_is_one_attempt_and_one_breaker_failure() {
    let downstream = spawn_downstream().await;
    let stack = Stack::new(10);

    let err = stack
        .call(OutboundRequest::get(downstream.url(404), ctx()))
        .await
        .unwrap_err();

    assert!(err.is_permanent());
    assert_eq!(downstream.hits(), 1);
    assert_eq!(stack.breaker.counts().total_failures, 1);
}

#[tokio::test]
async fn caller_deadline_is_not_a_dependency_failure() {
    let downstream = spawn_downstream().await;
    let stack = Stack::new(1);

    // Path code 0 makes the downstream hang.
    let err = stack
        .call(OutboundRequest::get(
            downstream.url(0),
            CallContext::with_timeout(Duration::from_millis(100)),
        ))
        .await
        .unwrap_err();

    assert_eq!(err, CallError::Cancelled(CancelReason::DeadlineExceeded));
    assert_eq!(stack.breaker.state(), CircuitState::Closed);
    assert_eq!(stack.breaker.counts().requests, 0);
}

#[tokio::test]
async fn success_counts_once() {
    let downstream = spawn_downstream().await;
    let stack = Stack::new(10);

    let response = stack
        .call(OutboundRequest::get(downstream.url(200), ctx()))
        .await
        .unwrap();

    assert_eq!(response.status.as_u16(), 200);
    let counts = stack.breaker.counts();
    assert_eq!(counts.requests, 1);
    assert_eq!(counts.total_successes, 1);
}
