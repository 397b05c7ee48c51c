use super::{layer, unavailable, Lookup};
use outbound_core::{CallContext, CallError, CancelReason, FnListener};
use outbound_retry::{RetryConfig, RetryEvent};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower::{service_fn, Layer, ServiceBuilder, ServiceExt};

#[tokio::test(start_paused = true)]
async fn each_attempt_receives_the_same_request() {
    let keys = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&keys);
    let service = layer(3).layer(service_fn(move |req: Lookup| {
        let log = Arc::clone(&log);
        async move {
            let seen = {
                let mut keys = log.lock().unwrap();
                keys.push(req.key);
                keys.len()
            };
            if seen < 3 {
                Err(unavailable())
            } else {
                Ok(format!("value for {}", req.key))
            }
        }
    }));

    let response = service
        .oneshot(Lookup {
            key: "sku-42",
            ctx: CallContext::background(),
        })
        .await
        .unwrap();

    assert_eq!(response, "value for sku-42");
    assert_eq!(*keys.lock().unwrap(), vec!["sku-42"; 3]);
}

#[tokio::test(start_paused = true)]
async fn request_deadline_bounds_the_whole_call() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let service = ServiceBuilder::new()
        .layer(layer(10))
        .service(service_fn(move |_req: Lookup| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(unavailable()) }
        }));

    // 100ms, then 200ms of backoff fit; the third sleep (300ms) does not.
    let err = service
        .oneshot(Lookup {
            key: "sku-1",
            ctx: CallContext::with_timeout(Duration::from_millis(450)),
        })
        .await
        .unwrap_err();

    assert_eq!(err, CallError::Cancelled(CancelReason::DeadlineExceeded));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn events_describe_the_call() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&events);
    let retry = RetryConfig::builder()
        .name("catalog")
        .max_attempts(3)
        .base_delay(Duration::from_millis(5))
        .no_jitter()
        .add_listener(FnListener::new(move |event: &RetryEvent| {
            let entry = match event {
                RetryEvent::Retry { name, attempt, .. } => format!("{name}:retry:{attempt}"),
                RetryEvent::Success { name, attempts, .. } => {
                    format!("{name}:success:{attempts}")
                }
                RetryEvent::Exhausted { name, attempts, .. } => {
                    format!("{name}:exhausted:{attempts}")
                }
                RetryEvent::NotRetried { name, attempt, .. } => {
                    format!("{name}:not-retried:{attempt}")
                }
                RetryEvent::Cancelled { name, attempt, .. } => {
                    format!("{name}:cancelled:{attempt}")
                }
            };
            log.lock().unwrap().push(entry);
        }))
        .build()
        .unwrap();

    let _ = retry
        .execute(&CallContext::background(), |attempt| async move {
            if attempt < 2 {
                Err(unavailable())
            } else {
                Ok(())
            }
        })
        .await;
    let _ = retry
        .execute(&CallContext::background(), |_| async {
            Err::<(), _>(unavailable())
        })
        .await;

    assert_eq!(
        *events.lock().unwrap(),
        vec![
            "catalog:retry:1",
            "catalog:success:2",
            "catalog:retry:1",
            "catalog:retry:2",
            "catalog:exhausted:3",
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn callbacks_fire_for_terminal_outcomes() {
    let exhausted = Arc::new(AtomicUsize::new(0));
    let not_retried = Arc::new(AtomicUsize::new(0));
    let succeeded = Arc::new(AtomicUsize::new(0));
    let (e, n, s) = (
        Arc::clone(&exhausted),
        Arc::clone(&not_retried),
        Arc::clone(&succeeded),
    );
    let retry = RetryConfig::builder()
        .max_attempts(2)
        .base_delay(Duration::from_millis(1))
        .no_jitter()
        .on_exhausted(move |attempts| {
            e.fetch_add(attempts, Ordering::SeqCst);
        })
        .on_not_retried(move |attempt| {
            n.fetch_add(attempt, Ordering::SeqCst);
        })
        .on_success(move |attempts| {
            s.fetch_add(attempts, Ordering::SeqCst);
        })
        .build()
        .unwrap();
    let ctx = CallContext::background();

    let _ = retry.execute(&ctx, |_| async { Err::<(), _>(unavailable()) }).await;
    let _ = retry
        .execute(&ctx, |_| async {
            Err::<(), _>(CallError::permanent(
                outbound_core::FailureKind::Status(400),
                "Bad Request",
            ))
        })
        .await;
    let _ = retry.execute(&ctx, |_| async { Ok::<_, CallError>(()) }).await;

    assert_eq!(exhausted.load(Ordering::SeqCst), 2);
    assert_eq!(not_retried.load(Ordering::SeqCst), 1);
    assert_eq!(succeeded.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn retried_call_can_run_on_a_spawned_task() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let service = layer(2).layer(service_fn(move |req: Lookup| {
        let attempt = counter.fetch_add(1, Ordering::SeqCst);
        async move {
            if attempt == 0 {
                Err(unavailable())
            } else {
                Ok(req.key.to_string())
            }
        }
    }));

    let handle = tokio::spawn(service.oneshot(Lookup {
        key: "sku-7",
        ctx: CallContext::background(),
    }));

    assert_eq!(handle.await.unwrap().unwrap(), "sku-7");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}
