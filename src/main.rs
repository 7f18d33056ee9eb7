use std::net::SocketAddr;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use carechain::config::AppConfig;
use carechain::database::Database;
use carechain::routes::{self, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "carechain=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting carechain");

    let config = AppConfig::load()?;
    info!("Configuration loaded");

    let database = Database::new(&config.database_url).await?;
    info!("Database connected");

    database.run_migrations().await?;
    info!("Database migrations completed");

    let addr: SocketAddr = format!("{}:{}", config.server_host, config.server_port).parse()?;

    let state = AppState::new(config, database);
    let app = routes::app(state);

    info!("Server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
