// src/ingest/scheduler.rs
use metrics::counter;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::cancel::Cancellation;
use crate::ingest::Ingestor;

#[derive(Clone, Copy, Debug)]
pub struct SchedulerCfg {
    pub interval: Duration,
    /// Wall-clock budget of a single run.
    pub run_timeout: Duration,
}

/// Run immediately, then on every tick, until `shutdown` fires. Runs never
/// overlap: a slow run delays the next tick instead of stacking.
pub fn spawn_scheduler(ingestor: Arc<Ingestor>, cfg: SchedulerCfg, shutdown: Cancellation) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(cfg.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let deadline = Cancellation::with_deadline(cfg.run_timeout);
            let run = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                r = ingestor.run_once(&deadline) => r,
            };

            match run {
                Ok(report) => tracing::info!(
                    target: "ingest",
                    sources = report.sources.len(),
                    failed = report.failed_sources(),
                    inserted = report.items_inserted(),
                    scored = report.items_scored,
                    "scheduled ingest tick"
                ),
                Err(e) => {
                    counter!("ingest_run_errors_total").increment(1);
                    tracing::error!(target: "ingest", error = ?e, "scheduled ingest run failed");
                }
            }
        }
        tracing::info!(target: "ingest", "scheduler stopped");
    })
}
