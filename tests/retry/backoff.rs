use super::unavailable;
use outbound_core::{CallContext, CallError};
use outbound_retry::{RetryConfig, RetryLayer};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

/// Runs an always-failing operation and records when each attempt started.
async fn attempt_times(retry: &RetryLayer) -> Vec<Instant> {
    let times = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&times);
    let _ = retry
        .execute(&CallContext::background(), move |_| {
            log.lock().unwrap().push(Instant::now());
            async { Err::<(), CallError>(unavailable()) }
        })
        .await;
    let times = times.lock().unwrap().clone();
    times
}

fn gaps(times: &[Instant]) -> Vec<Duration> {
    times.windows(2).map(|w| w[1] - w[0]).collect()
}

#[tokio::test(start_paused = true)]
async fn gaps_grow_linearly_without_jitter() {
    let retry = RetryConfig::builder()
        .max_attempts(4)
        .base_delay(Duration::from_millis(100))
        .max_delay(Duration::from_secs(10))
        .no_jitter()
        .build()
        .unwrap();

    let times = attempt_times(&retry).await;
    assert_eq!(times.len(), 4);
    assert_eq!(
        gaps(&times),
        vec![
            Duration::from_millis(100),
            Duration::from_millis(200),
            Duration::from_millis(300),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn gaps_are_capped_by_max_delay() {
    let retry = RetryConfig::builder()
        .max_attempts(6)
        .base_delay(Duration::from_millis(100))
        .max_delay(Duration::from_millis(250))
        .no_jitter()
        .build()
        .unwrap();

    let times = attempt_times(&retry).await;
    assert_eq!(
        gaps(&times),
        vec![
            Duration::from_millis(100),
            Duration::from_millis(200),
            Duration::from_millis(250),
            Duration::from_millis(250),
            Duration::from_millis(250),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn jittered_gaps_stay_within_bounds() {
    let retry = RetryConfig::builder()
        .max_attempts(8)
        .base_delay(Duration::from_millis(100))
        .max_delay(Duration::from_millis(500))
        .seeded_jitter(Duration::from_millis(100), 17)
        .build()
        .unwrap();
    let backoff = retry.config().backoff().clone();

    let times = attempt_times(&retry).await;
    for (i, gap) in gaps(&times).into_iter().enumerate() {
        let attempt = i + 1;
        assert!(gap >= backoff.lower_bound(attempt), "attempt {attempt}: {gap:?}");
        assert!(gap <= backoff.upper_bound(attempt), "attempt {attempt}: {gap:?}");
        assert!(gap <= Duration::from_millis(500));
    }
}

#[tokio::test(start_paused = true)]
async fn same_seed_gives_the_same_schedule() {
    let build = || {
        RetryConfig::builder()
            .max_attempts(5)
            .base_delay(Duration::from_millis(20))
            .max_delay(Duration::from_secs(1))
            .seeded_jitter(Duration::from_millis(50), 99)
            .build()
            .unwrap()
    };

    let first = gaps(&attempt_times(&build()).await);
    let second = gaps(&attempt_times(&build()).await);
    assert_eq!(first, second);
}

#[tokio::test(start_paused = true)]
async fn on_retry_sees_the_delay_actually_slept() {
    let delays = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&delays);
    let retry = RetryConfig::builder()
        .max_attempts(3)
        .base_delay(Duration::from_millis(40))
        .max_delay(Duration::from_secs(1))
        .seeded_jitter(Duration::from_millis(30), 5)
        .on_retry(move |_, delay| log.lock().unwrap().push(delay))
        .build()
        .unwrap();

    let times = attempt_times(&retry).await;
    let delays = delays.lock().unwrap().clone();
    let gaps = gaps(&times);
    assert_eq!(delays.len(), gaps.len());
    // The timer rounds each sleep up to the next millisecond.
    for (delay, gap) in delays.iter().zip(&gaps) {
        assert!(*gap >= *delay, "slept {gap:?}, scheduled {delay:?}");
        assert!(*gap - *delay <= Duration::from_millis(1), "slept {gap:?}, scheduled {delay:?}");
    }
}
