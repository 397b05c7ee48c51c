//! Router assembly and serving.

use crate::config::{Settings, SettingsError};
use crate::dependency::Dependency;
use crate::handlers::{health, product};
use crate::repository::ProductRepository;
use axum::routing::{get, post};
use axum::{middleware, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use outbound_core::CallContext;
use std::future::{Future, IntoFuture};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub repository: Arc<dyn ProductRepository>,
    pub dependency: Arc<Dependency>,
    pub request_timeout: Duration,
    /// `None` when no recorder is installed, e.g. in tests.
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(
        repository: Arc<dyn ProductRepository>,
        dependency: Dependency,
        request_timeout: Duration,
    ) -> Self {
        Self {
            repository,
            dependency: Arc::new(dependency),
            request_timeout,
            metrics: None,
        }
    }

    pub fn from_settings(
        settings: &Settings,
        repository: Arc<dyn ProductRepository>,
    ) -> Result<Self, SettingsError> {
        Ok(Self::new(
            repository,
            Dependency::from_settings(settings)?,
            settings.server.request_timeout(),
        ))
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// A context carrying this request's deadline.
    pub fn request_context(&self) -> CallContext {
        CallContext::with_timeout(self.request_timeout)
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health::root))
        .route("/healthcheck", get(health::healthcheck))
        .route("/health/ready", get(health::ready))
        .route("/metrics", get(health::metrics))
        .route("/api/v1/product", post(product::create_product))
        .route(
            "/api/v1/product/{id}",
            get(product::get_product).put(product::update_product),
        )
        .route_layer(middleware::from_fn(crate::metrics::track_metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serves `router` until `signal` resolves, then gives in-flight requests up
/// to `shutdown_timeout` to finish.
pub async fn serve<F>(
    listener: TcpListener,
    router: Router,
    signal: F,
    shutdown_timeout: Duration,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send,
{
    let shutdown = CancellationToken::new();
    let server = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown.clone().cancelled_owned())
        .into_future();
    let mut server = std::pin::pin!(server);

    tokio::select! {
        result = &mut server => return result,
        () = signal => {}
    }

    tracing::info!(timeout = ?shutdown_timeout, "shutting down");
    shutdown.cancel();
    match tokio::time::timeout(shutdown_timeout, server).await {
        Ok(result) => {
            tracing::info!("server stopped");
            result
        }
        Err(_) => {
            tracing::warn!("shutdown timed out, dropping in-flight requests");
            Ok(())
        }
    }
}

/// Resolves on SIGINT or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
    tracing::info!("shutdown signal received");
}
