mod audit;
mod backend;
mod config;
mod conflicts;
mod db;
mod deploy;
mod error;
mod gate;
mod handlers;
mod lifecycle;
mod models;
mod operator;
mod registry;
mod render;
mod router;
mod transport;
mod utils;
mod vendors;
mod ws;

#[cfg(test)]
mod testutil;

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use audit::AuditTrail;
use backend::{Backend, FileBackend};
use config::{Config, DataSource};
use db::Store;
use deploy::DeploymentOrchestrator;
use lifecycle::LifecycleController;
use registry::Registry;
use render::TeraRenderer;
use transport::SshTransport;
use ws::Hub;

/// Application state shared across handlers
pub struct AppState {
    pub config: Config,
    pub audit: Arc<AuditTrail>,
    pub lifecycle: LifecycleController,
    pub hub: Arc<Hub>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "circuit_provisioner=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let cfg = Config::load()?;
    tracing::info!("Starting Circuit Provisioner");
    tracing::info!("Data source: {:?}", cfg.data_source);
    tracing::info!("Templates: {}", cfg.templates_dir);
    tracing::info!("Listen: {}", cfg.listen_addr);

    // Initialize persistence
    let backend: Arc<dyn Backend> = match cfg.data_source {
        DataSource::Database => {
            let store = Store::with_pool_size(&cfg.db_path, cfg.db_max_connections).await?;
            tracing::info!(
                "Database initialized at {} (pool_size={})",
                cfg.db_path,
                cfg.db_max_connections
            );
            if !cfg.inventory_file.is_empty() {
                let count = store.import_devices(&cfg.inventory_file).await?;
                tracing::info!("Imported {} devices from {}", count, cfg.inventory_file);
            }
            Arc::new(store)
        }
        DataSource::File => {
            tracing::info!("Using flat files under {}", cfg.data_dir);
            Arc::new(FileBackend::new(&cfg))
        }
    };

    let registry = Registry::load(backend.clone()).await?;
    tracing::info!("Inventory loaded ({} devices)", registry.devices().len());

    let hub = Arc::new(Hub::new());
    let audit = Arc::new(AuditTrail::new(backend));
    let transport = Arc::new(SshTransport::new(&cfg));
    let renderer = Arc::new(TeraRenderer::from_dir(&cfg.templates_dir)?);

    let orchestrator = DeploymentOrchestrator::new(
        registry.clone(),
        audit.clone(),
        transport,
        Some(hub.clone()),
    );
    let lifecycle = LifecycleController::new(
        registry,
        renderer,
        orchestrator,
        cfg.generated_dir.clone(),
        Some(hub.clone()),
    );

    // Create app state
    let state = Arc::new(AppState {
        config: cfg.clone(),
        audit,
        lifecycle,
        hub,
    });

    // Build router
    let app = router::build(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&cfg.listen_addr).await?;
    tracing::info!("Circuit Provisioner listening on {}", cfg.listen_addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Circuit Provisioner shutting down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
