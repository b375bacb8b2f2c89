use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use rsvp::compactor;
use rsvp::config::Config;
use rsvp::directory::InMemoryDirectory;
use rsvp::engine::Engine;
use rsvp::notify::NotifyHub;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env();
    rsvp::observability::init(config.metrics_port)?;

    // Ensure data directory exists
    std::fs::create_dir_all(&config.data_dir)?;

    let directory = match &config.directory_file {
        Some(path) => InMemoryDirectory::from_json(&std::fs::read_to_string(path)?)?,
        None => InMemoryDirectory::new(),
    };

    let engine = Arc::new(Engine::new(
        config.engine(),
        Arc::new(directory),
        Arc::new(NotifyHub::new()),
    )?);

    info!("rsvp started");
    info!("  wal: {}", config.wal_path().display());
    info!("  events loaded: {}", engine.event_count());
    info!("  compact_threshold: {}", config.compact_threshold);
    info!("  source_timeout: {:?}", config.source_timeout);
    info!(
        "  metrics: {}",
        config
            .metrics_port
            .map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics"))
    );

    for summary in engine.event_summaries().await {
        println!("{}", serde_json::to_string(&summary)?);
    }

    let compactor_engine = engine.clone();
    let threshold = config.compact_threshold;
    let compactor_task = tokio::spawn(async move {
        compactor::run_compactor(compactor_engine, threshold).await;
    });

    // Graceful shutdown on SIGTERM/ctrl-c
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            _ = ctrl_c => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await?;
    }

    info!("shutdown signal received");
    compactor_task.abort();
    if let Err(e) = engine.compact_wal().await {
        tracing::warn!("final compaction failed: {e}");
    }

    info!("rsvp stopped");
    Ok(())
}
