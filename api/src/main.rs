// ./api/src/main.rs
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, level_filters::LevelFilter, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use application::{PersonRepository, PersonService};
use infrastructure::{InMemoryPersonRepository, SqlitePersonRepository};

mod config;
mod routes;

use config::ServerConfig;
use routes::{AppState, build_router};

// Application entry point
#[tokio::main]
async fn main() {
    // A missing .env file is fine; the process environment still applies.
    let dotenv_result = dotenvy::dotenv();

    // --- Logger Initialization ---
    let filter: EnvFilter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();
    info!("Logger initialized successfully.");
    if let Ok(path) = dotenv_result {
        info!("Loaded environment from {}", path.display());
    }

    let config = ServerConfig::from_env();

    // --- Dependency Injection ---
    // 1. Pick the store: SQLite when DATABASE_URL is set, memory otherwise
    let person_repository: Arc<dyn PersonRepository> = match &config.database_url {
        Some(url) => match SqlitePersonRepository::connect(url) {
            Ok(repository) => Arc::new(repository),
            Err(e) => {
                error!("Failed to initialize database: {}", e);
                std::process::exit(1);
            }
        },
        None => {
            warn!("DATABASE_URL not set. People are kept in memory and lost on restart.");
            Arc::new(InMemoryPersonRepository::new())
        }
    };

    // 2. Create application services, injecting dependencies
    let person_service = Arc::new(PersonService::new(person_repository));
    info!("Application services initialized.");

    let app = build_router(AppState { person_service });
    info!("API routes configured.");

    // --- Server Startup ---
    let addr = config.socket_addr();
    info!("Server starting on {}", addr);
    let listener = match TcpListener::bind(addr).await {
        Ok(listener) => {
            info!("Server listening on {}", addr);
            listener
        }
        Err(e) => {
            error!("Failed to bind to address {}: {}", addr, e);
            std::process::exit(1);
        }
    };
    if let Err(e) = axum::serve(listener, app.into_make_service()).await {
        error!("Server error: {}", e);
        std::process::exit(1);
    }
}
