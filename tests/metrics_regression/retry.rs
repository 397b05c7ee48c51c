use super::helpers::*;
use outbound_core::{CallContext, CallError, FailureKind};
use outbound_retry::RetryConfig;
use serial_test::serial;
use std::time::Duration;

fn layer(name: &str, max_attempts: usize) -> outbound_retry::RetryLayer {
    RetryConfig::builder()
        .name(name)
        .max_attempts(max_attempts)
        .base_delay(Duration::from_millis(1))
        .max_delay(Duration::from_millis(5))
        .no_jitter()
        .build()
        .unwrap()
}

#[tokio::test]
#[serial]
async fn retry_attempts_are_counted() {
    init_recorder();

    let _ = layer("metrics_retry", 3)
        .execute(&CallContext::background(), |attempt| async move {
            if attempt < 2 {
                Err(CallError::transient(FailureKind::Status(503), ""))
            } else {
                Ok(())
            }
        })
        .await;

    assert_counter_exists("retry_attempts_total");
    assert_series("retry_attempts_total", &[("retry", "metrics_retry")]);
}

#[tokio::test]
#[serial]
async fn retry_exhaustion_is_counted() {
    init_recorder();

    let _ = layer("metrics_exhausted", 2)
        .execute(&CallContext::background(), |_| async {
            Err::<(), _>(CallError::transient(FailureKind::Connect, "refused"))
        })
        .await;

    assert_counter_exists("retry_exhausted_total");
    assert_series("retry_exhausted_total", &[("retry", "metrics_exhausted")]);
}
