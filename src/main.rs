use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use object_gateway::{
    api,
    config::Config,
    discovery::{self, DiscoveryService},
    gateway::Gateway,
    object_store::S3Connector,
    registry::Registry,
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());

    let log_format = std::env::var("LOG_FORMAT").unwrap_or_default();
    match log_format.to_lowercase().as_str() {
        "gcp" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_stackdriver::layer())
                .init();
        }
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_target(true)
                        .with_span_list(false),
                )
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }

    info!(version = env!("CARGO_PKG_VERSION"), "object-gateway starting");

    // Load configuration
    let config = Config::load()?;
    info!(
        source = ?config.discovery.source,
        bucket = %config.storage.bucket,
        "Loaded configuration"
    );

    // Backend clients are live S3 clients; the registry starts empty
    let connector = S3Connector::new(config.storage.s3_options()).await;
    let registry = Arc::new(Registry::new(Arc::new(connector)));

    // Initial discovery must reach its source; there is nothing to serve otherwise
    let discovery_service = Arc::new(DiscoveryService::new(
        Arc::clone(&registry),
        discovery::from_config(&config.discovery),
        config.discovery.poll_interval(),
    ));
    let initial = discovery_service.bootstrap().await?;
    info!(
        backends = initial.snapshot.len(),
        failed = initial.failures.len(),
        "Initial discovery complete"
    );

    let discovery_handle = Arc::clone(&discovery_service).start();

    // Create shared state
    let state = Arc::new(AppState {
        config: config.clone(),
        gateway: Gateway::new(registry),
    });

    // Build and start the HTTP server
    let app = api::create_router(Arc::clone(&state));
    let listener = tokio::net::TcpListener::bind(&config.node.bind_address).await?;
    info!("Listening on: {}", config.node.bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutting down background tasks");
    discovery_handle.abort();

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, draining connections");
}
