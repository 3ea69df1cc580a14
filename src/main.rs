use colabri_sheet::config::Config;
use colabri_sheet::db::{DbSheet, MemoryStore, SheetStore};
use colabri_sheet::state::AppState;
use colabri_sheet::ws::spawn_lock_sweeper;
use colabri_sheet::build_app;
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
    let config_result = Config::load();
    let log_level = config_result
        .as_ref()
        .map(|config| config.log_level.clone())
        .unwrap_or_else(|_| "info".to_string());

    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            // Default to the configured level, but allow debug for our app
            format!("colabri_sheet=debug,tower_http=debug,axum::rejection=trace,{}", log_level).into()
        }))
        .init();

    info!("Starting server...");
    if config_result.is_ok() {
        info!("✅ Configuration loaded successfully");
    }

    let config = config_result.unwrap_or_else(|e| {
        error!("❌ Failed to load configuration: {}", e);
        warn!("Using default configuration");
        Config::default()
    });
    if config.is_development() {
        info!("Running in development mode");
    }
    if config.auth_jwt_secret.is_none() {
        warn!("No AUTH_JWT_SECRET configured - every authenticated route will answer 500");
    }

    // Initialize storage: PostgreSQL when a URL is provided, otherwise in memory
    let store: Arc<dyn SheetStore> = match &config.db_url {
        Some(db_url) => match DbSheet::new(db_url).await {
            Ok(db) => {
                info!("Database initialized successfully");
                Arc::new(db)
            }
            Err(e) => {
                error!("Failed to initialize database: {}", e);
                warn!("Falling back to the in-memory store - sheet edits will not be persisted");
                Arc::new(MemoryStore::new())
            }
        },
        None => {
            warn!("No database URL configured - sheet edits will not be persisted");
            Arc::new(MemoryStore::new())
        }
    };

    let address = config.server_address();
    let state = Arc::new(AppState::new(config, store));

    // Reclaim abandoned drag-item locks for the lifetime of the process
    spawn_lock_sweeper(state.hub.locks.clone(), state.settings.lock_sweep_interval);

    let app_routes = build_app(state);

    // Start the HTTP/API server
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .unwrap_or_else(|_| panic!("Failed to bind to {}", address));

    info!("🚀 Server running on http://{}", address);
    info!("📡 Sheet WebSocket available at ws://{}/ws/sheets/{{sheet_id}}", address);
    info!("📚 Swagger UI available at http://{}/swagger", address);

    axum::serve(listener, app_routes)
        .await
        .expect("Server failed to start");
}
