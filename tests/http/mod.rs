//! Test organization:
//! - classification.rs: how replies and transport errors map to call errors
//! - pooling.rs: body draining and connection reuse
//! - timeouts.rs: transport timeouts and caller deadlines

mod classification;

use axum::extract::{ConnectInfo, Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use outbound_http::{PlainClient, Transport, TransportConfig};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Remote ports of every request the server has seen, in arrival order.
pub(crate) type Peers = Arc<Mutex<Vec<u16>>>;

async fn ok(State(peers): State<Peers>, ConnectInfo(addr): ConnectInfo<SocketAddr>) -> &'static str {
    peers.lock().unwrap().push(addr.port());
    "pong"
}

async fn status(
    State(peers): State<Peers>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path(code): Path<u16>,
) -> (StatusCode, String) {
    peers.lock().unwrap().push(addr.port());
    let status = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    // A body large enough that it must be read to free the connection.
    (status, "x".repeat(64 * 1024))
}

async fn slow() -> &'static str {
    tokio::time::sleep(Duration::from_secs(2)).await;
    "late"
}

/// Starts a server on an ephemeral port and returns its base URL.
pub(crate) async fn spawn_server() -> (String, Peers) {
    let peers = Peers::default();
    let app = Router::new()
        .route("/ok", get(ok))
        .route("/status/{code}", get(status))
        .route("/slow", get(slow))
        .with_state(Arc::clone(&peers));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });
    (format!("http://{addr}"), peers)
}

pub(crate) fn client() -> PlainClient {
    PlainClient::new(Transport::new(TransportConfig::default()).unwrap())
}
