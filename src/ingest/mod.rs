// src/ingest/mod.rs
pub mod connectors;
pub mod normalize;
pub mod scheduler;
pub mod sources;

use anyhow::{anyhow, Context, Result};
use chrono::{Duration as ChronoDuration, Utc};
use metrics::{counter, describe_counter, describe_gauge, gauge};
use once_cell::sync::OnceCell;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::cancel::Cancellation;
use crate::error::{FetchError, SourceError};
use crate::fetch::HttpFetch;
use crate::models::{IntermediateItem, NewFetchRun, NewItem, NewSignal, RunStatus, Source};
use crate::scoring::{compute_score, ScoringConfig};
use crate::store::Store;
use crate::summarize::{summarize, TopicTable};

use self::normalize::{content_fingerprint, domain_of, normalize_domain, normalize_url};

/// FetchRun error messages are cut to this many chars.
pub const MAX_RUN_ERROR_CHARS: usize = 500;
pub const DEFAULT_SCORE_LOOKBACK_DAYS: i64 = 7;
pub const DEFAULT_SCORE_BATCH_LIMIT: i64 = 1000;

/// One-time metrics registration (so series show up on /metrics).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("ingest_runs_total", "Ingestion runs started.");
        describe_counter!(
            "ingest_run_errors_total",
            "Scheduled runs that failed before processing sources."
        );
        describe_counter!(
            "ingest_items_fetched_total",
            "Items returned by connectors, before dedup."
        );
        describe_counter!("ingest_items_inserted_total", "New items stored.");
        describe_counter!("ingest_signals_total", "Engagement signals appended.");
        describe_counter!(
            "ingest_source_errors_total",
            "Sources whose fetch or parse failed."
        );
        describe_counter!("ingest_items_scored_total", "Scores written.");
        describe_gauge!(
            "ingest_pipeline_last_run_ts",
            "Unix ts when ingest pipeline last ran."
        );
    });
}

/// Cut `s` to at most `max` chars.
pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

#[derive(Debug, Clone, Copy)]
pub struct IngestSettings {
    /// Only items published within this window are (re)scored.
    pub score_lookback: ChronoDuration,
    pub score_batch_limit: i64,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            score_lookback: ChronoDuration::days(DEFAULT_SCORE_LOOKBACK_DAYS),
            score_batch_limit: DEFAULT_SCORE_BATCH_LIMIT,
        }
    }
}

/// What happened to one source during a run. Mirrors the stored FetchRun.
#[derive(Debug, Clone, Serialize)]
pub struct SourceOutcome {
    pub source_id: Uuid,
    pub name: String,
    pub status: RunStatus,
    pub error: Option<String>,
    pub items_fetched: usize,
    pub items_inserted: usize,
    pub signals: usize,
}

impl SourceOutcome {
    fn failed(source: &Source, err: &str) -> Self {
        Self {
            source_id: source.id,
            name: source.name.clone(),
            status: RunStatus::Failed,
            error: Some(truncate_chars(err, MAX_RUN_ERROR_CHARS)),
            items_fetched: 0,
            items_inserted: 0,
            signals: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub sources: Vec<SourceOutcome>,
    pub items_scored: usize,
    pub cancelled: bool,
}

impl RunReport {
    pub fn failed_sources(&self) -> usize {
        self.sources
            .iter()
            .filter(|s| s.status == RunStatus::Failed)
            .count()
    }

    pub fn items_inserted(&self) -> usize {
        self.sources.iter().map(|s| s.items_inserted).sum()
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct ItemOutcome {
    inserted: bool,
    signal: bool,
}

/// Drives one ingestion pass: every enabled source, then re-scoring.
pub struct Ingestor {
    store: Arc<dyn Store>,
    fetcher: Arc<dyn HttpFetch>,
    scoring: Arc<ScoringConfig>,
    topics: TopicTable,
    settings: IngestSettings,
}

impl Ingestor {
    pub fn new(store: Arc<dyn Store>, fetcher: Arc<dyn HttpFetch>, scoring: Arc<ScoringConfig>) -> Self {
        ensure_metrics_described();
        Self {
            store,
            fetcher,
            scoring,
            topics: TopicTable::default(),
            settings: IngestSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: IngestSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_topics(mut self, topics: TopicTable) -> Self {
        self.topics = topics;
        self
    }

    /// Run once. Only failing to list sources is fatal; everything else is
    /// recorded per source or logged.
    pub async fn run_once(&self, cancel: &Cancellation) -> Result<RunReport> {
        counter!("ingest_runs_total").increment(1);

        let sources = self
            .store
            .list_enabled_sources()
            .await
            .context("listing enabled sources")?;
        info!(sources = sources.len(), "ingest run started");

        let mut outcomes = Vec::with_capacity(sources.len());
        for source in &sources {
            let outcome = if cancel.is_cancelled() {
                SourceOutcome::failed(source, "run cancelled before this source was fetched")
            } else {
                self.process_source(source, cancel).await
            };
            self.record_run(&outcome).await;
            outcomes.push(outcome);
        }

        let cancelled = cancel.is_cancelled();
        let items_scored = if cancelled {
            warn!("run cancelled, re-scoring deferred to the next run");
            0
        } else {
            match self.rescore().await {
                Ok(n) => n,
                Err(e) => {
                    error!(error = ?e, "re-scoring failed");
                    0
                }
            }
        };

        gauge!("ingest_pipeline_last_run_ts").set(Utc::now().timestamp() as f64);

        let report = RunReport {
            sources: outcomes,
            items_scored,
            cancelled,
        };
        info!(
            sources = report.sources.len(),
            failed = report.failed_sources(),
            inserted = report.items_inserted(),
            scored = report.items_scored,
            cancelled,
            "ingest run finished"
        );
        Ok(report)
    }

    async fn record_run(&self, outcome: &SourceOutcome) {
        let run = NewFetchRun {
            source_id: outcome.source_id,
            status: outcome.status,
            error: outcome.error.clone(),
            items_fetched: outcome.items_fetched as i64,
            items_inserted: outcome.items_inserted as i64,
        };
        if let Err(e) = self.store.insert_fetch_run(&run).await {
            error!(source = %outcome.name, error = ?e, "could not record fetch run");
        }
    }

    async fn process_source(&self, source: &Source, cancel: &Cancellation) -> SourceOutcome {
        let kind_label = source
            .kind()
            .map(|k| k.as_str())
            .unwrap_or("unsupported");

        let items = match connectors::fetch_items(source.into(), self.fetcher.as_ref(), cancel).await {
            Ok(items) => items,
            Err(e) => {
                counter!("ingest_source_errors_total", "kind" => kind_label).increment(1);
                log_source_error(source, &e);
                return SourceOutcome::failed(source, &e.to_string());
            }
        };

        counter!("ingest_items_fetched_total", "kind" => kind_label).increment(items.len() as u64);

        let mut outcome = SourceOutcome {
            source_id: source.id,
            name: source.name.clone(),
            status: RunStatus::Success,
            error: None,
            items_fetched: items.len(),
            items_inserted: 0,
            signals: 0,
        };

        for item in items {
            let title = item.title.clone();
            match self.ingest_item(source, item).await {
                Ok(o) => {
                    outcome.items_inserted += usize::from(o.inserted);
                    outcome.signals += usize::from(o.signal);
                }
                Err(e) => warn!(source = %source.name, title = %title, error = ?e, "item skipped"),
            }
        }

        counter!("ingest_items_inserted_total").increment(outcome.items_inserted as u64);
        counter!("ingest_signals_total").increment(outcome.signals as u64);
        info!(
            source = %source.name,
            fetched = outcome.items_fetched,
            inserted = outcome.items_inserted,
            signals = outcome.signals,
            "source processed"
        );
        outcome
    }

    async fn ingest_item(&self, source: &Source, it: IntermediateItem) -> Result<ItemOutcome> {
        let url = normalize_url(&it.url).with_context(|| format!("unusable url {:?}", it.url))?;
        let fingerprint = content_fingerprint(&it.title, &url);
        let mut outcome = ItemOutcome::default();

        let item = match self.store.get_item_by_fingerprint(&fingerprint).await? {
            Some(existing) => existing,
            None => {
                let domain = if it.domain.is_empty() {
                    domain_of(&url)
                } else {
                    normalize_domain(&it.domain)
                };
                let new = NewItem {
                    source_id: source.id,
                    title: it.title.clone(),
                    url,
                    published_at: it.published_at,
                    fingerprint: fingerprint.clone(),
                    domain,
                    category: source.category.clone(),
                    excerpt: it.excerpt.clone(),
                };
                match self.store.create_item(&new).await? {
                    Some(created) => {
                        outcome.inserted = true;
                        let summary = summarize(&created, &self.topics, Utc::now());
                        if let Err(e) = self.store.upsert_summary(&summary).await {
                            warn!(item = %created.id, error = ?e, "summary not stored");
                        }
                        created
                    }
                    // lost an insert race; the winner's row is the item
                    None => self
                        .store
                        .get_item_by_fingerprint(&fingerprint)
                        .await?
                        .ok_or_else(|| anyhow!("item {fingerprint} vanished after conflict"))?,
                }
            }
        };

        if it.has_engagement() {
            let signal = NewSignal {
                item_id: item.id,
                points: it.points,
                comments: it.comments,
                rank: it.rank,
            };
            match self.store.insert_signal(&signal).await {
                Ok(_) => outcome.signal = true,
                Err(e) => warn!(item = %item.id, error = ?e, "signal not stored"),
            }
        }

        debug!(item = %item.id, inserted = outcome.inserted, "item ingested");
        Ok(outcome)
    }

    /// Score recent items whose score is missing or stale.
    pub async fn rescore(&self) -> Result<usize> {
        let now = Utc::now();
        let since = now - self.settings.score_lookback;
        let items = self
            .store
            .items_needing_score(since, self.settings.score_batch_limit)
            .await
            .context("selecting items needing score")?;

        let mut scored = 0usize;
        for item in &items {
            let signal = match self.store.latest_signal(item.id).await {
                Ok(s) => s,
                Err(e) => {
                    warn!(item = %item.id, error = ?e, "latest signal unavailable");
                    None
                }
            };
            let summary = match self.store.get_summary(item.id).await {
                Ok(s) => s,
                Err(e) => {
                    warn!(item = %item.id, error = ?e, "summary unavailable");
                    None
                }
            };
            let score = compute_score(item, signal.as_ref(), summary.as_ref(), &self.scoring, now);
            match self.store.upsert_score(&score).await {
                Ok(()) => scored += 1,
                Err(e) => warn!(item = %item.id, error = ?e, "score not stored"),
            }
        }

        counter!("ingest_items_scored_total").increment(scored as u64);
        debug!(candidates = items.len(), scored, "re-scoring done");
        Ok(scored)
    }
}

fn log_source_error(source: &Source, err: &SourceError) {
    match err {
        SourceError::Fetch(FetchError::Cancelled) => {
            warn!(source = %source.name, "source fetch cancelled")
        }
        e if e.is_config() => error!(
            source = %source.name,
            kind = %source.kind,
            error = %e,
            "source misconfigured"
        ),
        e => warn!(source = %source.name, url = %source.url, error = %e, "source fetch failed"),
    }
}
