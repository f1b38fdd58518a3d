/// Server setup and initialization
///
/// Wires together all components: record store, remote adapters, the sync
/// controller with its ticker, and HTTP routes.

use crate::{
    api::{create_instance_routes, create_release_routes, AppState},
    config::Config,
    engine::{CamundaClient, ProcessEngine},
    notify::{HttpNotifier, LogNotifier, Notifier},
    permissions::{PermissionClient, PermissionService},
    store::Store,
    sync::{SyncController, SyncScheduler},
};
use anyhow::Result;
use axum::{routing::get, Router};
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Create the main Axum application with all routes
///
/// Opens the record store, connects the remote adapters and starts the
/// reconciliation ticker in the background. The ticker is handed back so the
/// caller can stop it on shutdown.
pub async fn create_app(config: Config) -> Result<(Router, Arc<SyncScheduler>)> {
    if let Some(dir) = sqlite_data_dir(&config.database.url) {
        tracing::info!("📁 Ensuring data directory exists: {}", dir.display());
        std::fs::create_dir_all(dir)
            .map_err(|e| anyhow::anyhow!("Failed to create data directory: {}", e))?;
    }

    tracing::info!("🗄️ Opening record store");
    let store = Store::connect(&config.database.url)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to open record store: {}", e))?;

    let http = reqwest::Client::builder()
        .timeout(config.remote.timeout)
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to build HTTP client: {}", e))?;

    tracing::info!("🔌 Connecting remote adapters");
    let engine: Arc<dyn ProcessEngine> =
        Arc::new(CamundaClient::new(http.clone(), config.remote.engine_url.clone()));
    let permissions: Arc<dyn PermissionService> =
        Arc::new(PermissionClient::new(http.clone(), config.remote.permissions_url.clone()));
    let notifier: Arc<dyn Notifier> = match &config.remote.notification_url {
        Some(url) => Arc::new(HttpNotifier::new(http.clone(), url.clone())),
        None => {
            tracing::info!("📨 No notification service configured, notifications are only logged");
            Arc::new(LogNotifier)
        }
    };

    tracing::info!("⚙️ Initializing sync controller");
    let controller = Arc::new(SyncController::new(
        store,
        engine,
        Arc::clone(&permissions),
        notifier,
        http,
        config.sync.clone(),
    ));

    tracing::info!("⏰ Initializing reconciliation ticker");
    let scheduler = Arc::new(
        SyncScheduler::new(Arc::clone(&controller), config.sync.cleanup_cycle)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to initialize ticker: {}", e))?,
    );

    // Start the ticker in background
    let scheduler_clone = Arc::clone(&scheduler);
    tokio::spawn(async move {
        if let Err(e) = scheduler_clone.start().await {
            tracing::error!("❌ Failed to start reconciliation ticker: {}", e);
        }
    });

    let state = AppState {
        controller,
        permissions,
    };

    tracing::info!("📡 Creating HTTP router with all endpoints");
    let app = Router::new()
        .route("/healthz", get(health_check))
        .merge(create_release_routes())
        .merge(create_instance_routes())
        .with_state(state);

    tracing::info!("✅ Application initialized successfully");
    Ok((app, scheduler))
}

/// Start the HTTP server with the given configuration
pub async fn start_server(config: Config) -> Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(true)
        .with_level(true)
        .init();

    tracing::info!("Starting relsync server...");

    let (app, ticker) = create_app(config.clone()).await?;

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&bind_addr).await?;

    tracing::info!("Server listening on http://{}", bind_addr);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // no tick may start against a store that is going away
    if let Err(e) = ticker.stop().await {
        tracing::error!("❌ Failed to stop reconciliation ticker: {}", e);
    }

    tracing::info!("👋 Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("❌ Failed to listen for shutdown signal: {}", e);
        // without a signal handler, serve until the process is killed
        std::future::pending::<()>().await;
    }
    tracing::info!("🛑 Shutdown signal received");
}

async fn health_check() -> &'static str {
    "ok"
}

/// Directory holding the database file of a `sqlite:` URL, if any
fn sqlite_data_dir(url: &str) -> Option<&Path> {
    let path = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() || path.starts_with(":memory:") {
        return None;
    }
    Path::new(path).parent().filter(|dir| !dir.as_os_str().is_empty())
}
