use clap::Parser;
use product_service::app::{self, AppState};
use product_service::{metrics, telemetry, InMemoryProductRepository, Settings};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;

#[derive(Debug, Parser)]
#[command(name = "product-service", version, about = "Product API with a guarded downstream dependency")]
struct Cli {
    /// Settings file (YAML). Defaults to config/config.yaml when present.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Overrides server.port.
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut settings = Settings::load(cli.config.as_deref())?;
    if let Some(port) = cli.port {
        settings.server.port = port;
    }

    telemetry::init(settings.logging.json)?;

    let handle = metrics::install_recorder()?;
    tokio::spawn(metrics::run_upkeep(handle.clone()));

    let state = AppState::from_settings(&settings, Arc::new(InMemoryProductRepository::new()))?
        .with_metrics(handle);
    tracing::info!(
        dependency = %state.dependency.name(),
        url = %state.dependency.url(),
        "guarding downstream dependency"
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], settings.server.port));
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(address = %addr, "server started");

    app::serve(
        listener,
        app::router(state),
        app::shutdown_signal(),
        settings.server.shutdown_timeout(),
    )
    .await?;

    Ok(())
}
