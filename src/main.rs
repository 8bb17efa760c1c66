use cortexflow_sync::{
    config::Config,
    db::{MemoryStore, PgStore},
    routes::create_app,
    AppState,
};
use std::panic;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() {

    // Set panic hook for better error messages
    panic::set_hook(Box::new(|info| {
        eprintln!("PANIC: {info}");
    }));

    // Load configuration
    let config = Config::load().unwrap_or_else(|e| {
        eprintln!("Failed to load configuration: {}", e);
        eprintln!("Using default configuration");
        Config::default()
    });

    // Initialize tracing
    let default_filter = format!("cortexflow_sync={},tower_http=debug,axum::rejection=trace,info", config.log_level);
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .init();

    info!("Starting server...");

    // Connect the document store; fall back to memory without a database
    let state = match &config.db_url {
        Some(db_url) => match PgStore::connect(db_url).await {
            Ok(store) => {
                info!("Database initialized successfully");
                AppState::with_store(config.clone(), Arc::new(store))
            }
            Err(e) => {
                error!("Failed to initialize database: {}", e);
                std::process::exit(1);
            }
        },
        None => {
            warn!("No database URL configured - using the in-memory document store");
            AppState::with_store(config.clone(), Arc::new(MemoryStore::new()))
        }
    };
    let state = Arc::new(state);

    let app = create_app(state.clone());

    let listener = match tokio::net::TcpListener::bind(config.server_address()).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", config.server_address(), e);
            std::process::exit(1);
        }
    };

    info!("Server running on http://{}", config.server_address());
    info!("WebSocket available at ws://{}/ws", config.server_address());
    info!("Swagger UI available at http://{}/swagger", config.server_address());

    let registry = state.registry.clone();
    let shutdown = async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
            return;
        }
        info!("Shutdown requested");
        registry.close_all();
    };

    if let Err(e) = axum::serve(listener, app).with_graceful_shutdown(shutdown).await {
        error!("Server error: {}", e);
    }
}
