//! Test organization:
//! - stack.rs: breaker over retry over the plain client

mod stack;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// A dependency whose health endpoint answers with a configurable status and
/// counts hits.
pub(crate) struct Downstream {
    pub(crate) base: String,
    pub(crate) hits: Arc<AtomicUsize>,
}

impl Downstream {
    pub(crate) fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    pub(crate) fn url(&self, code: u16) -> String {
        format!("{}/health/{code}", self.base)
    }
}

async fn health(State(hits): State<Arc<AtomicUsize>>, Path(code): Path<u16>) -> StatusCode {
    hits.fetch_add(1, Ordering::SeqCst);
    if code == 0 {
        tokio::time::sleep(Duration::from_secs(5)).await;
        return StatusCode::OK;
    }
    StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

pub(crate) async fn spawn_downstream() -> Downstream {
    let hits = Arc::new(AtomicUsize::new(0));
    let app = Router::new()
        .route("/health/{code}", get(health))
        .with_state(Arc::clone(&hits));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    Downstream {
        base: format!("http://{addr}"),
        hits,
    }
}
