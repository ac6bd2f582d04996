use std::sync::Arc;

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use intel_stream::config::Config;
use intel_stream::notify::StreamBoard;
use intel_stream::routes::{self, AppState};
use intel_stream::scheduler::start_background_refresh;
use intel_stream::selector::WindowSelector;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "intel_stream=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config_path =
        std::env::var("INTEL_STREAM_CONFIG").unwrap_or_else(|_| "sources.toml".to_string());
    let config = Config::load(&config_path)?;
    info!(
        "Loaded {} news and {} breach feeds from {}",
        config.news.len(),
        config.breach.len(),
        config_path
    );

    // Wire the pipeline to the board the HTTP surface reads
    let board = Arc::new(StreamBoard::new());
    let selector = Arc::new(WindowSelector::from_config(&config, board.clone())?);

    // Start background refresh task
    let bg_selector = selector.clone();
    let refresh_period = config.refresh_period();
    tokio::spawn(async move {
        start_background_refresh(bg_selector, refresh_period).await;
    });

    let state = Arc::new(AppState { board, selector });
    let app = routes::router(state);

    // Start server
    let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("Server starting on http://{}", bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
