use super::{fail, succeed, unavailable};
use outbound_circuitbreaker::{CircuitBreaker, CircuitState};
use outbound_core::CallError;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

fn probing_breaker(max_requests: u32) -> CircuitBreaker {
    CircuitBreaker::builder()
        .name("probing")
        .max_requests(max_requests)
        .requests_volume_threshold(1)
        .failure_threshold(0.5)
        .timeout(Duration::from_secs(30))
        .build()
        .unwrap()
}

async fn trip(breaker: &CircuitBreaker) {
    fail(breaker).await;
    assert_eq!(breaker.state(), CircuitState::Open);
}

#[tokio::test(start_paused = true)]
async fn timeout_moves_open_to_half_open_lazily() {
    let breaker = probing_breaker(1);
    trip(&breaker).await;

    tokio::time::advance(Duration::from_secs(29)).await;
    assert_eq!(breaker.state(), CircuitState::Open);

    tokio::time::advance(Duration::from_secs(1)).await;
    // Nothing has looked at the breaker since the cool-down ended.
    assert_eq!(breaker.state_sync(), CircuitState::Open);
    assert_eq!(breaker.state(), CircuitState::HalfOpen);
    assert_eq!(breaker.state_sync(), CircuitState::HalfOpen);
    assert_eq!(breaker.counts().requests, 0);
}

/// With three probes in flight, a fourth is turned away without being run.
#[tokio::test(start_paused = true)]
async fn fourth_concurrent_probe_is_rejected() {
    let breaker = probing_breaker(3);
    trip(&breaker).await;
    tokio::time::advance(Duration::from_secs(30)).await;

    let started = Arc::new(AtomicUsize::new(0));
    let mut releases = Vec::new();
    let mut probes = Vec::new();
    for _ in 0..3 {
        let (tx, rx) = oneshot::channel::<()>();
        releases.push(tx);
        let breaker = breaker.clone();
        let started = Arc::clone(&started);
        probes.push(tokio::spawn(async move {
            breaker
                .execute(|| async move {
                    started.fetch_add(1, Ordering::SeqCst);
                    let _ = rx.await;
                    Ok::<_, CallError>(())
                })
                .await
        }));
    }
    while started.load(Ordering::SeqCst) < 3 {
        tokio::task::yield_now().await;
    }
    assert_eq!(breaker.state(), CircuitState::HalfOpen);

    let invoked = Arc::new(AtomicUsize::new(0));
    let flag = Arc::clone(&invoked);
    let fourth = breaker
        .execute(|| async move {
            flag.fetch_add(1, Ordering::SeqCst);
            Ok::<_, CallError>(())
        })
        .await;
    assert!(fourth.unwrap_err().is_circuit_open());
    assert_eq!(invoked.load(Ordering::SeqCst), 0);

    for tx in releases {
        tx.send(()).unwrap();
    }
    for probe in probes {
        probe.await.unwrap().unwrap();
    }

    assert_eq!(breaker.state(), CircuitState::Closed);
    assert_eq!(breaker.counts().requests, 0);
}

#[tokio::test(start_paused = true)]
async fn failing_probe_reopens_and_restarts_the_timer() {
    let breaker = probing_breaker(3);
    trip(&breaker).await;
    let first_opened = breaker.opened_at().unwrap();

    tokio::time::advance(Duration::from_secs(30)).await;
    succeed(&breaker).await;
    assert_eq!(breaker.state(), CircuitState::HalfOpen);

    let result = breaker
        .execute(|| async { Err::<(), _>(unavailable()) })
        .await;
    assert!(!result.unwrap_err().is_circuit_open());
    assert_eq!(breaker.state(), CircuitState::Open);

    let reopened = breaker.opened_at().unwrap();
    assert_eq!(reopened - first_opened, Duration::from_secs(30));
    assert_eq!(breaker.counts().requests, 0);

    // The full timeout applies again from the re-open.
    tokio::time::advance(Duration::from_secs(29)).await;
    assert_eq!(breaker.state(), CircuitState::Open);
    tokio::time::advance(Duration::from_secs(1)).await;
    assert_eq!(breaker.state(), CircuitState::HalfOpen);
}

#[tokio::test(start_paused = true)]
async fn consecutive_successful_probes_close_with_zero_counts() {
    let breaker = probing_breaker(3);
    trip(&breaker).await;
    tokio::time::advance(Duration::from_secs(30)).await;

    succeed(&breaker).await;
    succeed(&breaker).await;
    assert_eq!(breaker.state(), CircuitState::HalfOpen);
    assert_eq!(breaker.counts().consecutive_successes, 2);

    succeed(&breaker).await;
    assert_eq!(breaker.state(), CircuitState::Closed);

    let counts = breaker.counts();
    assert_eq!(counts.requests, 0);
    assert_eq!(counts.total_failures, 0);
    assert_eq!(counts.consecutive_successes, 0);
}
