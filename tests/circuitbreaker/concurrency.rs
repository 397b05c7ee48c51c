use super::unavailable;
use outbound_circuitbreaker::{CircuitBreaker, CircuitState};
use outbound_core::CallError;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Every outcome from parallel callers is counted exactly once.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_outcomes_are_not_lost() {
    let breaker = CircuitBreaker::builder()
        .name("parallel")
        .requests_volume_threshold(10_000)
        .failure_threshold(1.0)
        .build()
        .unwrap();

    let mut handles = Vec::new();
    for i in 0..200 {
        let breaker = breaker.clone();
        handles.push(tokio::spawn(async move {
            let _ = breaker
                .execute(|| async move {
                    tokio::task::yield_now().await;
                    if i % 2 == 0 {
                        Ok(())
                    } else {
                        Err(unavailable())
                    }
                })
                .await;
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let counts = breaker.counts();
    assert_eq!(counts.requests, 200);
    assert_eq!(counts.total_successes, 100);
    assert_eq!(counts.total_failures, 100);
    assert_eq!(breaker.state(), CircuitState::Closed);
}

/// Under a burst of failures the breaker opens once and then rejects the
/// rest without calling the operation.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn trips_exactly_once_under_load() {
    let transitions = Arc::new(AtomicUsize::new(0));
    let invoked = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&transitions);
    let breaker = CircuitBreaker::builder()
        .name("burst")
        .requests_volume_threshold(10)
        .failure_threshold(0.5)
        .timeout(Duration::from_secs(60))
        .on_state_transition(move |_, to| {
            if to == CircuitState::Open {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        })
        .build()
        .unwrap();

    let mut handles = Vec::new();
    for _ in 0..100 {
        let breaker = breaker.clone();
        let invoked = Arc::clone(&invoked);
        handles.push(tokio::spawn(async move {
            breaker
                .execute(|| async move {
                    invoked.fetch_add(1, Ordering::SeqCst);
                    Err::<(), CallError>(unavailable())
                })
                .await
        }));
    }

    let mut rejected = 0;
    for handle in handles {
        if let Err(err) = handle.await.unwrap() {
            if err.is_circuit_open() {
                rejected += 1;
            }
        }
    }

    assert_eq!(breaker.state(), CircuitState::Open);
    assert_eq!(transitions.load(Ordering::SeqCst), 1);
    assert_eq!(rejected + invoked.load(Ordering::SeqCst), 100);
    assert!(invoked.load(Ordering::SeqCst) >= 10);
}
