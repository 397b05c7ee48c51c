//! Property tests for the retry loop.
//!
//! Invariants tested:
//! - Never exceeds max_attempts
//! - Stops at the first success
//! - Stops at the first permanent failure
//! - Exhaustion reports exactly max_attempts

use super::paused_runtime;
use outbound_core::{CallContext, CallError, FailureKind};
use outbound_retry::RetryConfig;
use proptest::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
enum Outcome {
    Ok,
    Transient,
    Permanent,
}

fn outcome() -> impl Strategy<Value = Outcome> {
    prop_oneof![
        Just(Outcome::Ok),
        Just(Outcome::Transient),
        Just(Outcome::Permanent),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    #[test]
    fn attempts_follow_the_outcomes(
        max_attempts in 1usize..=8,
        outcomes in prop::collection::vec(outcome(), 8),
    ) {
        let rt = paused_runtime();
        rt.block_on(async {
            let calls = Arc::new(AtomicUsize::new(0));
            let counter = Arc::clone(&calls);
            let script = outcomes.clone();
            let retry = RetryConfig::builder()
                .max_attempts(max_attempts)
                .base_delay(Duration::from_millis(10))
                .max_delay(Duration::from_millis(100))
                .max_jitter(Duration::from_millis(10))
                .build()
                .unwrap();

            let result = retry
                .execute(&CallContext::background(), move |attempt| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    let outcome = script[attempt - 1];
                    async move {
                        match outcome {
                            Outcome::Ok => Ok(attempt),
                            Outcome::Transient => {
                                Err(CallError::transient(FailureKind::Status(503), ""))
                            }
                            Outcome::Permanent => {
                                Err(CallError::permanent(FailureKind::Status(400), ""))
                            }
                        }
                    }
                })
                .await;

            // The attempt that ends the loop: the first non-transient
            // outcome, or the last permitted attempt.
            let expected = outcomes
                .iter()
                .take(max_attempts)
                .position(|o| !matches!(o, Outcome::Transient))
                .map_or(max_attempts, |i| i + 1);
            prop_assert_eq!(calls.load(Ordering::SeqCst), expected);
            prop_assert!(calls.load(Ordering::SeqCst) <= max_attempts);

            match outcomes[expected - 1] {
                Outcome::Ok => prop_assert_eq!(result, Ok(expected)),
                Outcome::Permanent => prop_assert!(result.unwrap_err().is_permanent()),
                Outcome::Transient => {
                    prop_assert_eq!(result.unwrap_err().attempts(), Some(max_attempts))
                }
            }
            Ok(())
        })?;
    }
}
