use super::{client, spawn_server};
use outbound_core::{CallContext, FailureKind};
use outbound_http::{OutboundRequest, StatusPolicy};
use std::time::Duration;

fn ctx() -> CallContext {
    CallContext::with_timeout(Duration::from_secs(5))
}

#[tokio::test]
async fn success_returns_status_and_body() {
    let (base, _) = spawn_server().await;

    let response = client()
        .send(OutboundRequest::get(format!("{base}/ok"), ctx()))
        .await
        .unwrap();

    assert_eq!(response.status.as_u16(), 200);
    assert_eq!(&response.body[..], b"pong");
}

#[tokio::test]
async fn server_errors_are_transient() {
    let (base, _) = spawn_server().await;

    for code in [500, 502, 503, 429, 408] {
        let err = client()
            .send(OutboundRequest::get(format!("{base}/status/{code}"), ctx()))
            .await
            .unwrap_err();
        assert!(err.is_transient(), "{code}: {err:?}");
        assert_eq!(err.status(), Some(code));
    }
}

#[tokio::test]
async fn client_errors_follow_the_status_policy() {
    let (base, _) = spawn_server().await;
    let url = format!("{base}/status/404");

    let err = client()
        .send(OutboundRequest::get(url.clone(), ctx()))
        .await
        .unwrap_err();
    assert!(err.is_permanent());
    assert_eq!(err.status(), Some(404));

    let lenient = client().with_status_policy(StatusPolicy::AllTransient);
    let err = lenient
        .send(OutboundRequest::get(url, ctx()))
        .await
        .unwrap_err();
    assert!(err.is_transient());
    assert_eq!(err.status(), Some(404));
}

#[tokio::test]
async fn refused_connection_is_a_transient_connect_failure() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = client()
        .send(OutboundRequest::get(format!("http://{addr}/ok"), ctx()))
        .await
        .unwrap_err();

    assert!(err.is_transient(), "{err:?}");
    assert_eq!(err.failure().map(|f| f.kind()), Some(FailureKind::Connect));
}

#[tokio::test]
async fn malformed_uri_is_permanent() {
    let err = client()
        .send(OutboundRequest::get("http://bad host/ok", ctx()))
        .await
        .unwrap_err();

    assert!(err.is_permanent());
    assert_eq!(
        err.failure().map(|f| f.kind()),
        Some(FailureKind::InvalidRequest)
    );
}

#[tokio::test]
async fn post_to_a_get_route_is_permanent() {
    let (base, _) = spawn_server().await;

    // The test server only routes GET, so a POST is answered with 405.
    let err = client()
        .send(OutboundRequest::post(format!("{base}/ok"), "{}", ctx()))
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(405));
    assert!(err.is_permanent());
}
