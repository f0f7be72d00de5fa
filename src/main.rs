// Main entry point - Dependency injection and server setup
use std::{net::SocketAddr, sync::Arc};

use tracing_subscriber::EnvFilter;
use trend_engine::application::clock::SystemClock;
use trend_engine::application::historical_store::HistoricalStore;
use trend_engine::application::live_stream::LiveStreamService;
use trend_engine::application::trend_service::TrendService;
use trend_engine::infrastructure::config::load_config;
use trend_engine::infrastructure::influx_store::InfluxHistoricalStore;
use trend_engine::infrastructure::memory_store::InMemoryStore;
use trend_engine::presentation::app_state::AppState;
use trend_engine::presentation::router;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Load configuration
    let config = load_config()?;

    // Create store (infrastructure layer)
    let store: Arc<dyn HistoricalStore> = match &config.influx {
        Some(influx) => {
            tracing::info!("Using InfluxDB store at {}", influx.host);
            Arc::new(InfluxHistoricalStore::new(influx))
        }
        None => {
            tracing::warn!("No [influx] section configured, serving from an in-memory store");
            Arc::new(InMemoryStore::new())
        }
    };

    // Create services (application layer)
    let trend_service = TrendService::new(store, Arc::new(SystemClock), config.engine.clone());
    for profile in config.series {
        trend_service.register(profile).await;
    }
    let live_stream = LiveStreamService::new(trend_service.clone());

    let state = Arc::new(AppState {
        trend_service,
        live_stream,
    });

    // Build router (presentation layer)
    let app = router(state);

    // Start server
    let addr: SocketAddr = config.server.bind.parse()?;
    tracing::info!("Starting trend-engine on {}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, app).await?;

    Ok(())
}
