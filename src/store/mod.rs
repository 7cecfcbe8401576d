//! Storage collaborator.
//!
//! The [`Store`] trait covers every read and write the pipeline performs.
//! [`memory::MemoryStore`] backs tests and local runs;
//! [`postgres::PgStore`] talks to the relational store over a `sqlx` pool.
//!
//! | Table | Operations |
//! |-------|------------|
//! | sources | list, list enabled, get, create, set enabled, record test |
//! | items | create (unique fingerprint), get, by fingerprint, needing score, published since |
//! | signals | insert, latest, since |
//! | scores | upsert, get |
//! | summaries | upsert, get |
//! | fetch_runs | insert, list for source |

pub mod memory;
pub mod postgres;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{
    FetchRun, Item, NewFetchRun, NewItem, NewSignal, NewSource, Score, Signal, Source, SourceStatus,
    Summary,
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[async_trait]
pub trait Store: Send + Sync {
    async fn list_sources(&self) -> Result<Vec<Source>>;

    async fn list_enabled_sources(&self) -> Result<Vec<Source>>;

    async fn get_source(&self, id: Uuid) -> Result<Option<Source>>;

    async fn create_source(&self, new: &NewSource) -> Result<Source>;

    /// Returns `false` when no source has this id.
    async fn set_source_enabled(&self, id: Uuid, enabled: bool, status: SourceStatus) -> Result<bool>;

    /// Record the outcome of a connection test. `status` is written too.
    async fn record_source_test(
        &self,
        id: Uuid,
        test_status: &str,
        message: &str,
        status: SourceStatus,
    ) -> Result<bool>;

    /// Insert an item. `Ok(None)` means an item with the same fingerprint
    /// already exists (including a lost concurrent insert).
    async fn create_item(&self, new: &NewItem) -> Result<Option<Item>>;

    async fn get_item(&self, id: Uuid) -> Result<Option<Item>>;

    async fn get_item_by_fingerprint(&self, fingerprint: &str) -> Result<Option<Item>>;

    /// Items published at or after `since` whose score is missing or older
    /// than the item itself. Newest first.
    async fn items_needing_score(&self, since: DateTime<Utc>, limit: i64) -> Result<Vec<Item>>;

    async fn items_published_since(&self, since: DateTime<Utc>, limit: i64) -> Result<Vec<Item>>;

    async fn insert_signal(&self, new: &NewSignal) -> Result<Signal>;

    async fn latest_signal(&self, item_id: Uuid) -> Result<Option<Signal>>;

    async fn signals_since(&self, item_id: Uuid, since: DateTime<Utc>) -> Result<Vec<Signal>>;

    async fn upsert_score(&self, score: &Score) -> Result<()>;

    async fn get_score(&self, item_id: Uuid) -> Result<Option<Score>>;

    async fn upsert_summary(&self, summary: &Summary) -> Result<()>;

    async fn get_summary(&self, item_id: Uuid) -> Result<Option<Summary>>;

    async fn insert_fetch_run(&self, run: &NewFetchRun) -> Result<FetchRun>;

    /// Most recent first.
    async fn fetch_runs_for_source(&self, source_id: Uuid, limit: i64) -> Result<Vec<FetchRun>>;
}
