/// GrooveSync headless client - runs the sync engine and logs what it sees
use groovesync_core::transport::HttpTransport;
use groovesync_core::{Config, SyncEngine};
use std::env;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info"))
        )
        .init();

    // Parse configuration
    let args: Vec<String> = env::args().collect();
    let config = Config::from_args(&args)
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;

    let transport = HttpTransport::new(&config)
        .map_err(|e| anyhow::anyhow!("Transport error: {}", e))?;
    let seed = config.page_seed();

    info!("🎵 Starting GrooveSync");
    info!("   API: {}", config.base_url);
    info!("   Hold: {:?}, retry: {:?}", config.long_poll_timeout, config.retry_delay);

    let engine = SyncEngine::start(config, Arc::new(transport), seed).await;
    let mut events = engine.subscribe();
    let logger = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(json) => info!("event {}", json),
                    Err(e) => warn!("Unprintable event: {}", e),
                },
                Err(RecvError::Lagged(n)) => warn!("Event log lagged {} events", n),
                Err(RecvError::Closed) => break,
            }
        }
    });

    // Blocks until Ctrl+C / SIGTERM
    engine.run_until_shutdown().await;
    logger.abort();

    Ok(())
}
