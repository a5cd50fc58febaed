use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use feed_reader::config::Config;
use feed_reader::db::Database;
use feed_reader::loader::{DisplaySurface, FeedLoader};
use feed_reader::pwa::{register_service_worker, InstallClients};
use feed_reader::routes::{self, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "feed_reader=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::load_or_default("reader.toml")?;
    info!(
        "Using {} (max {} items per feed, {:?} detection)",
        config.api_endpoint, config.max_items, config.feed_detection
    );

    // Initialize database
    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "sqlite:feed_reader.db?mode=rwc".to_string());
    let db = Database::new(&database_url).await?;
    db.initialize().await?;
    info!("Database initialized");

    let loader = Arc::new(FeedLoader::from_config(&config, DisplaySurface::new())?);
    let install = InstallClients::new(Duration::from_secs(config.install_choice_timeout_secs));
    let state = Arc::new(AppState::with_install_clients(loader, Arc::new(db), install));

    register_service_worker(Path::new(&config.service_worker));

    // Reload whatever was saved last time
    routes::restore_saved(&state).await?;

    let app = routes::router(state, &config.service_worker);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!("Server starting on http://{}", config.bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
