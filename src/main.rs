//! Ingestion worker entrypoint.
//! Loads config, connects to Postgres and runs the ingest scheduler until
//! Ctrl-C.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use feed_radar::config::{AppConfig, LogFormat};
use feed_radar::fetch::FetchGuard;
use feed_radar::ingest::scheduler::spawn_scheduler;
use feed_radar::ingest::Ingestor;
use feed_radar::scoring::ScoringConfig;
use feed_radar::store::{PgStore, Store};
use feed_radar::{Cancellation, SourceService};

fn init_tracing(format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("feed_radar=info,warn"));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
        LogFormat::Compact => registry.with(fmt::layer().compact()).init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();

    let cfg = AppConfig::from_env()?;
    init_tracing(cfg.log_format);
    feed_radar::metrics::install(cfg.metrics_addr)?;

    let store: Arc<dyn Store> = Arc::new(
        PgStore::connect(&cfg.database_url)
            .await
            .context("connecting to postgres")?,
    );
    let fetcher = Arc::new(FetchGuard::new(cfg.fetch_settings()));

    if cfg.seed_default_sources {
        let created = SourceService::new(store.clone(), fetcher.clone())
            .seed_default_sources()
            .await?;
        tracing::info!(created, "default sources seeded");
    }

    let scoring = ScoringConfig::load_or_default(&cfg.scoring_config_path)
        .with_context(|| format!("loading {}", cfg.scoring_config_path.display()))?;

    let ingestor = Arc::new(
        Ingestor::new(store, fetcher, Arc::new(scoring)).with_settings(cfg.ingest_settings()),
    );

    let (stop, shutdown) = Cancellation::new();
    let worker = spawn_scheduler(ingestor, cfg.scheduler(), shutdown);
    tracing::info!(
        interval_secs = cfg.worker_interval.as_secs(),
        "ingest worker started"
    );

    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    tracing::info!("shutdown requested");
    stop.cancel();
    worker.await.context("scheduler task panicked")?;
    Ok(())
}
