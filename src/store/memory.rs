//! In-memory [`Store`] for tests and local runs.
//!
//! All tables live behind one `std::sync::RwLock`, so every operation is
//! atomic with respect to the others, including the fingerprint check in
//! [`Store::create_item`].

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::Store;
use crate::models::{
    FetchRun, Item, NewFetchRun, NewItem, NewSignal, NewSource, Score, Signal, Source, SourceStatus,
    Summary,
};

#[derive(Default)]
struct Tables {
    sources: Vec<Source>,
    items: HashMap<Uuid, Item>,
    by_fingerprint: HashMap<String, Uuid>,
    signals: Vec<Signal>,
    scores: HashMap<Uuid, Score>,
    summaries: HashMap<Uuid, Summary>,
    fetch_runs: Vec<FetchRun>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>> {
        self.tables.read().map_err(|_| anyhow!("memory store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>> {
        self.tables.write().map_err(|_| anyhow!("memory store lock poisoned"))
    }

    // --- inspection helpers for tests ---

    pub fn item_count(&self) -> usize {
        self.read().map(|t| t.items.len()).unwrap_or(0)
    }

    pub fn signal_count(&self) -> usize {
        self.read().map(|t| t.signals.len()).unwrap_or(0)
    }

    pub fn summary_count(&self) -> usize {
        self.read().map(|t| t.summaries.len()).unwrap_or(0)
    }

    pub fn score_count(&self) -> usize {
        self.read().map(|t| t.scores.len()).unwrap_or(0)
    }

    /// Every fetch run, in insertion order.
    pub fn fetch_runs(&self) -> Vec<FetchRun> {
        self.read().map(|t| t.fetch_runs.clone()).unwrap_or_default()
    }

    pub fn items(&self) -> Vec<Item> {
        let mut items: Vec<Item> = self
            .read()
            .map(|t| t.items.values().cloned().collect())
            .unwrap_or_default();
        items.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.title.cmp(&b.title)));
        items
    }
}

fn newest_first(mut items: Vec<Item>, limit: i64) -> Vec<Item> {
    items.sort_by(|a, b| b.published_at.cmp(&a.published_at));
    items.truncate(limit.max(0) as usize);
    items
}

#[async_trait]
impl Store for MemoryStore {
    async fn list_sources(&self) -> Result<Vec<Source>> {
        Ok(self.read()?.sources.clone())
    }

    async fn list_enabled_sources(&self) -> Result<Vec<Source>> {
        Ok(self
            .read()?
            .sources
            .iter()
            .filter(|s| s.enabled)
            .cloned()
            .collect())
    }

    async fn get_source(&self, id: Uuid) -> Result<Option<Source>> {
        Ok(self.read()?.sources.iter().find(|s| s.id == id).cloned())
    }

    async fn create_source(&self, new: &NewSource) -> Result<Source> {
        let now = Utc::now();
        let source = Source {
            id: Uuid::new_v4(),
            name: new.name.clone(),
            kind: new.kind.clone(),
            category: new.category.clone(),
            url: new.url.clone(),
            mapping: new.mapping.clone(),
            enabled: new.enabled,
            status: new.status,
            last_test_status: None,
            last_test_message: None,
            created_at: now,
            updated_at: now,
        };
        self.write()?.sources.push(source.clone());
        Ok(source)
    }

    async fn set_source_enabled(&self, id: Uuid, enabled: bool, status: SourceStatus) -> Result<bool> {
        let mut t = self.write()?;
        match t.sources.iter_mut().find(|s| s.id == id) {
            Some(s) => {
                s.enabled = enabled;
                s.status = status;
                s.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn record_source_test(
        &self,
        id: Uuid,
        test_status: &str,
        message: &str,
        status: SourceStatus,
    ) -> Result<bool> {
        let mut t = self.write()?;
        match t.sources.iter_mut().find(|s| s.id == id) {
            Some(s) => {
                s.last_test_status = Some(test_status.to_string());
                s.last_test_message = Some(message.to_string());
                s.status = status;
                s.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn create_item(&self, new: &NewItem) -> Result<Option<Item>> {
        let mut t = self.write()?;
        if t.by_fingerprint.contains_key(&new.fingerprint) {
            return Ok(None);
        }
        let item = Item {
            id: Uuid::new_v4(),
            source_id: new.source_id,
            title: new.title.clone(),
            url: new.url.clone(),
            published_at: new.published_at,
            fingerprint: new.fingerprint.clone(),
            domain: new.domain.clone(),
            category: new.category.clone(),
            excerpt: new.excerpt.clone(),
            created_at: Utc::now(),
        };
        t.by_fingerprint.insert(item.fingerprint.clone(), item.id);
        t.items.insert(item.id, item.clone());
        Ok(Some(item))
    }

    async fn get_item(&self, id: Uuid) -> Result<Option<Item>> {
        Ok(self.read()?.items.get(&id).cloned())
    }

    async fn get_item_by_fingerprint(&self, fingerprint: &str) -> Result<Option<Item>> {
        let t = self.read()?;
        Ok(t.by_fingerprint
            .get(fingerprint)
            .and_then(|id| t.items.get(id))
            .cloned())
    }

    async fn items_needing_score(&self, since: DateTime<Utc>, limit: i64) -> Result<Vec<Item>> {
        let t = self.read()?;
        let stale: Vec<Item> = t
            .items
            .values()
            .filter(|i| i.published_at >= since)
            .filter(|i| match t.scores.get(&i.id) {
                None => true,
                Some(s) => s.computed_at < i.created_at,
            })
            .cloned()
            .collect();
        Ok(newest_first(stale, limit))
    }

    async fn items_published_since(&self, since: DateTime<Utc>, limit: i64) -> Result<Vec<Item>> {
        let t = self.read()?;
        let recent: Vec<Item> = t
            .items
            .values()
            .filter(|i| i.published_at >= since)
            .cloned()
            .collect();
        Ok(newest_first(recent, limit))
    }

    async fn insert_signal(&self, new: &NewSignal) -> Result<Signal> {
        let signal = Signal {
            id: Uuid::new_v4(),
            item_id: new.item_id,
            points: new.points,
            comments: new.comments,
            rank: new.rank,
            fetched_at: Utc::now(),
        };
        self.write()?.signals.push(signal.clone());
        Ok(signal)
    }

    async fn latest_signal(&self, item_id: Uuid) -> Result<Option<Signal>> {
        // insertion order breaks fetched_at ties
        Ok(self
            .read()?
            .signals
            .iter()
            .filter(|s| s.item_id == item_id)
            .max_by_key(|s| s.fetched_at)
            .cloned())
    }

    async fn signals_since(&self, item_id: Uuid, since: DateTime<Utc>) -> Result<Vec<Signal>> {
        Ok(self
            .read()?
            .signals
            .iter()
            .filter(|s| s.item_id == item_id && s.fetched_at >= since)
            .cloned()
            .collect())
    }

    async fn upsert_score(&self, score: &Score) -> Result<()> {
        self.write()?.scores.insert(score.item_id, score.clone());
        Ok(())
    }

    async fn get_score(&self, item_id: Uuid) -> Result<Option<Score>> {
        Ok(self.read()?.scores.get(&item_id).cloned())
    }

    async fn upsert_summary(&self, summary: &Summary) -> Result<()> {
        self.write()?.summaries.insert(summary.item_id, summary.clone());
        Ok(())
    }

    async fn get_summary(&self, item_id: Uuid) -> Result<Option<Summary>> {
        Ok(self.read()?.summaries.get(&item_id).cloned())
    }

    async fn insert_fetch_run(&self, run: &NewFetchRun) -> Result<FetchRun> {
        let run = FetchRun {
            id: Uuid::new_v4(),
            source_id: run.source_id,
            status: run.status,
            error: run.error.clone(),
            items_fetched: run.items_fetched,
            items_inserted: run.items_inserted,
            fetched_at: Utc::now(),
        };
        self.write()?.fetch_runs.push(run.clone());
        Ok(run)
    }

    async fn fetch_runs_for_source(&self, source_id: Uuid, limit: i64) -> Result<Vec<FetchRun>> {
        Ok(self
            .read()?
            .fetch_runs
            .iter()
            .rev()
            .filter(|r| r.source_id == source_id)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }
}
