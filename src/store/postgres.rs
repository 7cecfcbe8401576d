//! Postgres [`Store`] over a `sqlx` pool. The schema is expected to exist
//! already; see `sql/schema.sql`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use tracing::info;
use uuid::Uuid;

use super::Store;
use crate::models::{
    FetchRun, Item, NewFetchRun, NewItem, NewSignal, NewSource, RunStatus, Score, Signal, Source,
    SourceStatus, Summary,
};

const SOURCE_COLUMNS: &str = "id, name, kind, category, url, mapping, enabled, status, \
     last_test_status, last_test_message, created_at, updated_at";
const ITEM_COLUMNS: &str =
    "id, source_id, title, url, published_at, fingerprint, domain, category, excerpt, created_at";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .context("connecting to postgres")?;
        info!("postgres pool ready");
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn source_from_row(row: &PgRow) -> Result<Source> {
    let status: String = row.try_get("status")?;
    Ok(Source {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        kind: row.try_get("kind")?,
        category: row.try_get("category")?,
        url: row.try_get("url")?,
        mapping: row.try_get("mapping")?,
        enabled: row.try_get("enabled")?,
        status: SourceStatus::parse(&status),
        last_test_status: row.try_get("last_test_status")?,
        last_test_message: row.try_get("last_test_message")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn item_from_row(row: &PgRow) -> Result<Item> {
    Ok(Item {
        id: row.try_get("id")?,
        source_id: row.try_get("source_id")?,
        title: row.try_get("title")?,
        url: row.try_get("url")?,
        published_at: row.try_get("published_at")?,
        fingerprint: row.try_get("fingerprint")?,
        domain: row.try_get("domain")?,
        category: row.try_get("category")?,
        excerpt: row.try_get("excerpt")?,
        created_at: row.try_get("created_at")?,
    })
}

fn signal_from_row(row: &PgRow) -> Result<Signal> {
    Ok(Signal {
        id: row.try_get("id")?,
        item_id: row.try_get("item_id")?,
        points: row.try_get("points")?,
        comments: row.try_get("comments")?,
        rank: row.try_get("rank")?,
        fetched_at: row.try_get("fetched_at")?,
    })
}

fn score_from_row(row: &PgRow) -> Result<Score> {
    Ok(Score {
        item_id: row.try_get("item_id")?,
        hot: row.try_get("hot")?,
        relevance: row.try_get("relevance")?,
        credibility: row.try_get("credibility")?,
        novelty: row.try_get("novelty")?,
        final_score: row.try_get("final")?,
        computed_at: row.try_get("computed_at")?,
    })
}

fn summary_from_row(row: &PgRow) -> Result<Summary> {
    Ok(Summary {
        item_id: row.try_get("item_id")?,
        tldr: row.try_get("tldr")?,
        why_it_matters: row.try_get("why_it_matters")?,
        tags: row.try_get("tags")?,
        method: row.try_get("method")?,
        created_at: row.try_get("created_at")?,
    })
}

fn fetch_run_from_row(row: &PgRow) -> Result<FetchRun> {
    let status: String = row.try_get("status")?;
    Ok(FetchRun {
        id: row.try_get("id")?,
        source_id: row.try_get("source_id")?,
        status: if status == RunStatus::Success.as_str() {
            RunStatus::Success
        } else {
            RunStatus::Failed
        },
        error: row.try_get("error")?,
        items_fetched: row.try_get("items_fetched")?,
        items_inserted: row.try_get("items_inserted")?,
        fetched_at: row.try_get("fetched_at")?,
    })
}

#[async_trait]
impl Store for PgStore {
    async fn list_sources(&self) -> Result<Vec<Source>> {
        let rows = sqlx::query(&format!(
            "SELECT {SOURCE_COLUMNS} FROM sources ORDER BY created_at"
        ))
        .fetch_all(&self.pool)
        .await
        .context("listing sources")?;
        rows.iter().map(source_from_row).collect()
    }

    async fn list_enabled_sources(&self) -> Result<Vec<Source>> {
        let rows = sqlx::query(&format!(
            "SELECT {SOURCE_COLUMNS} FROM sources WHERE enabled = true ORDER BY created_at"
        ))
        .fetch_all(&self.pool)
        .await
        .context("listing enabled sources")?;
        rows.iter().map(source_from_row).collect()
    }

    async fn get_source(&self, id: Uuid) -> Result<Option<Source>> {
        let row = sqlx::query(&format!("SELECT {SOURCE_COLUMNS} FROM sources WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("loading source")?;
        row.as_ref().map(source_from_row).transpose()
    }

    async fn create_source(&self, new: &NewSource) -> Result<Source> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO sources (id, name, kind, category, url, mapping, enabled, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, now(), now())
            RETURNING {SOURCE_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(&new.name)
        .bind(&new.kind)
        .bind(&new.category)
        .bind(&new.url)
        .bind(&new.mapping)
        .bind(new.enabled)
        .bind(new.status.as_str())
        .fetch_one(&self.pool)
        .await
        .context("inserting source")?;
        source_from_row(&row)
    }

    async fn set_source_enabled(&self, id: Uuid, enabled: bool, status: SourceStatus) -> Result<bool> {
        let res = sqlx::query(
            "UPDATE sources SET enabled = $1, status = $2, updated_at = now() WHERE id = $3",
        )
        .bind(enabled)
        .bind(status.as_str())
        .bind(id)
        .execute(&self.pool)
        .await
        .context("updating source enabled flag")?;
        Ok(res.rows_affected() > 0)
    }

    async fn record_source_test(
        &self,
        id: Uuid,
        test_status: &str,
        message: &str,
        status: SourceStatus,
    ) -> Result<bool> {
        let res = sqlx::query(
            r#"
            UPDATE sources
            SET last_test_status = $1, last_test_message = $2, status = $3, updated_at = now()
            WHERE id = $4
            "#,
        )
        .bind(test_status)
        .bind(message)
        .bind(status.as_str())
        .bind(id)
        .execute(&self.pool)
        .await
        .context("recording source test")?;
        Ok(res.rows_affected() > 0)
    }

    async fn create_item(&self, new: &NewItem) -> Result<Option<Item>> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO items (id, source_id, title, url, published_at, fingerprint, domain, category, excerpt, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, now())
            ON CONFLICT (fingerprint) DO NOTHING
            RETURNING {ITEM_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(new.source_id)
        .bind(&new.title)
        .bind(&new.url)
        .bind(new.published_at)
        .bind(&new.fingerprint)
        .bind(&new.domain)
        .bind(&new.category)
        .bind(&new.excerpt)
        .fetch_optional(&self.pool)
        .await
        .context("inserting item")?;
        row.as_ref().map(item_from_row).transpose()
    }

    async fn get_item(&self, id: Uuid) -> Result<Option<Item>> {
        let row = sqlx::query(&format!("SELECT {ITEM_COLUMNS} FROM items WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("loading item")?;
        row.as_ref().map(item_from_row).transpose()
    }

    async fn get_item_by_fingerprint(&self, fingerprint: &str) -> Result<Option<Item>> {
        let row = sqlx::query(&format!(
            "SELECT {ITEM_COLUMNS} FROM items WHERE fingerprint = $1"
        ))
        .bind(fingerprint)
        .fetch_optional(&self.pool)
        .await
        .context("loading item by fingerprint")?;
        row.as_ref().map(item_from_row).transpose()
    }

    async fn items_needing_score(&self, since: DateTime<Utc>, limit: i64) -> Result<Vec<Item>> {
        let rows = sqlx::query(
            r#"
            SELECT i.id, i.source_id, i.title, i.url, i.published_at, i.fingerprint,
                   i.domain, i.category, i.excerpt, i.created_at
            FROM items i
            LEFT JOIN scores s ON s.item_id = i.id
            WHERE i.published_at >= $1
              AND (s.item_id IS NULL OR s.computed_at < i.created_at)
            ORDER BY i.published_at DESC
            LIMIT $2
            "#,
        )
        .bind(since)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("selecting items needing score")?;
        rows.iter().map(item_from_row).collect()
    }

    async fn items_published_since(&self, since: DateTime<Utc>, limit: i64) -> Result<Vec<Item>> {
        let rows = sqlx::query(&format!(
            "SELECT {ITEM_COLUMNS} FROM items WHERE published_at >= $1 ORDER BY published_at DESC LIMIT $2"
        ))
        .bind(since)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("selecting recent items")?;
        rows.iter().map(item_from_row).collect()
    }

    async fn insert_signal(&self, new: &NewSignal) -> Result<Signal> {
        let row = sqlx::query(
            r#"
            INSERT INTO signals (id, item_id, points, comments, rank, fetched_at)
            VALUES ($1, $2, $3, $4, $5, now())
            RETURNING id, item_id, points, comments, rank, fetched_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(new.item_id)
        .bind(new.points)
        .bind(new.comments)
        .bind(new.rank)
        .fetch_one(&self.pool)
        .await
        .context("inserting signal")?;
        signal_from_row(&row)
    }

    async fn latest_signal(&self, item_id: Uuid) -> Result<Option<Signal>> {
        let row = sqlx::query(
            r#"
            SELECT id, item_id, points, comments, rank, fetched_at
            FROM signals WHERE item_id = $1
            ORDER BY fetched_at DESC
            LIMIT 1
            "#,
        )
        .bind(item_id)
        .fetch_optional(&self.pool)
        .await
        .context("loading latest signal")?;
        row.as_ref().map(signal_from_row).transpose()
    }

    async fn signals_since(&self, item_id: Uuid, since: DateTime<Utc>) -> Result<Vec<Signal>> {
        let rows = sqlx::query(
            r#"
            SELECT id, item_id, points, comments, rank, fetched_at
            FROM signals WHERE item_id = $1 AND fetched_at >= $2
            ORDER BY fetched_at
            "#,
        )
        .bind(item_id)
        .bind(since)
        .fetch_all(&self.pool)
        .await
        .context("loading signals")?;
        rows.iter().map(signal_from_row).collect()
    }

    async fn upsert_score(&self, score: &Score) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO scores (item_id, hot, relevance, credibility, novelty, final, computed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (item_id) DO UPDATE SET
                hot = EXCLUDED.hot,
                relevance = EXCLUDED.relevance,
                credibility = EXCLUDED.credibility,
                novelty = EXCLUDED.novelty,
                final = EXCLUDED.final,
                computed_at = EXCLUDED.computed_at
            "#,
        )
        .bind(score.item_id)
        .bind(score.hot)
        .bind(score.relevance)
        .bind(score.credibility)
        .bind(score.novelty)
        .bind(score.final_score)
        .bind(score.computed_at)
        .execute(&self.pool)
        .await
        .context("upserting score")?;
        Ok(())
    }

    async fn get_score(&self, item_id: Uuid) -> Result<Option<Score>> {
        let row = sqlx::query(
            "SELECT item_id, hot, relevance, credibility, novelty, final, computed_at FROM scores WHERE item_id = $1",
        )
        .bind(item_id)
        .fetch_optional(&self.pool)
        .await
        .context("loading score")?;
        row.as_ref().map(score_from_row).transpose()
    }

    async fn upsert_summary(&self, summary: &Summary) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO summaries (item_id, tldr, why_it_matters, tags, method, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (item_id) DO UPDATE SET
                tldr = EXCLUDED.tldr,
                why_it_matters = EXCLUDED.why_it_matters,
                tags = EXCLUDED.tags,
                method = EXCLUDED.method
            "#,
        )
        .bind(summary.item_id)
        .bind(&summary.tldr)
        .bind(&summary.why_it_matters)
        .bind(&summary.tags)
        .bind(&summary.method)
        .bind(summary.created_at)
        .execute(&self.pool)
        .await
        .context("upserting summary")?;
        Ok(())
    }

    async fn get_summary(&self, item_id: Uuid) -> Result<Option<Summary>> {
        let row = sqlx::query(
            "SELECT item_id, tldr, why_it_matters, tags, method, created_at FROM summaries WHERE item_id = $1",
        )
        .bind(item_id)
        .fetch_optional(&self.pool)
        .await
        .context("loading summary")?;
        row.as_ref().map(summary_from_row).transpose()
    }

    async fn insert_fetch_run(&self, run: &NewFetchRun) -> Result<FetchRun> {
        let row = sqlx::query(
            r#"
            INSERT INTO fetch_runs (id, source_id, status, error, items_fetched, items_inserted, fetched_at)
            VALUES ($1, $2, $3, $4, $5, $6, now())
            RETURNING id, source_id, status, error, items_fetched, items_inserted, fetched_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(run.source_id)
        .bind(run.status.as_str())
        .bind(&run.error)
        .bind(run.items_fetched)
        .bind(run.items_inserted)
        .fetch_one(&self.pool)
        .await
        .context("inserting fetch run")?;
        fetch_run_from_row(&row)
    }

    async fn fetch_runs_for_source(&self, source_id: Uuid, limit: i64) -> Result<Vec<FetchRun>> {
        let rows = sqlx::query(
            r#"
            SELECT id, source_id, status, error, items_fetched, items_inserted, fetched_at
            FROM fetch_runs WHERE source_id = $1
            ORDER BY fetched_at DESC
            LIMIT $2
            "#,
        )
        .bind(source_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("listing fetch runs")?;
        rows.iter().map(fetch_run_from_row).collect()
    }
}
