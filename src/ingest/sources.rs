//! Source administration: CRUD pass-through, enable/disable, connection
//! tests and the default source seed.

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use crate::cancel::Cancellation;
use crate::error::ErrorCode;
use crate::fetch::HttpFetch;
use crate::ingest::connectors::{self, SourceRef};
use crate::models::{NewSource, Source, SourceKind, SourceStatus};
use crate::store::Store;

pub const MIN_TEST_ITEMS: usize = 3;
pub const MAX_PREVIEW_ITEMS: usize = 5;
pub const DEFAULT_TEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemPreview {
    pub title: String,
    pub url: String,
    /// RFC-3339.
    pub published_at: String,
    pub source_type: String,
    pub category: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    Ok,
    Failed,
}

impl TestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TestStatus::Ok => "ok",
            TestStatus::Failed => "failed",
        }
    }
}

/// Result of one connection test. Never persisted by `test_connection`.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionTest {
    pub status: TestStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorCode>,
    pub message: String,
    pub items_found: usize,
    pub preview_items: Vec<ItemPreview>,
}

impl ConnectionTest {
    fn failed(code: ErrorCode, message: impl Into<String>, items_found: usize) -> Self {
        Self {
            status: TestStatus::Failed,
            error_code: Some(code),
            message: message.into(),
            items_found,
            preview_items: Vec::new(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == TestStatus::Ok
    }
}

/// The built-in source set: Hacker News, arXiv AI/ML and two AI blogs.
pub fn default_sources() -> Vec<NewSource> {
    [
        ("Hacker News", SourceKind::AggregatorApi, "https://news.ycombinator.com"),
        ("arXiv AI/ML", SourceKind::AcademicApi, "https://export.arxiv.org/api/query"),
        ("OpenAI Blog", SourceKind::SyndicationFeed, "https://openai.com/blog/rss.xml"),
        (
            "Google AI Blog",
            SourceKind::SyndicationFeed,
            "https://ai.googleblog.com/feeds/posts/default",
        ),
    ]
    .into_iter()
    .map(|(name, kind, url)| NewSource {
        name: name.to_string(),
        kind: kind.as_str().to_string(),
        category: "news".to_string(),
        url: url.to_string(),
        mapping: None,
        enabled: true,
        status: SourceStatus::Active,
    })
    .collect()
}

pub struct SourceService {
    store: Arc<dyn Store>,
    fetcher: Arc<dyn HttpFetch>,
    test_timeout: Duration,
}

impl SourceService {
    pub fn new(store: Arc<dyn Store>, fetcher: Arc<dyn HttpFetch>) -> Self {
        Self {
            store,
            fetcher,
            test_timeout: DEFAULT_TEST_TIMEOUT,
        }
    }

    pub fn with_test_timeout(mut self, timeout: Duration) -> Self {
        self.test_timeout = timeout;
        self
    }

    pub async fn create_source(&self, new: &NewSource) -> Result<Source> {
        let source = self.store.create_source(new).await?;
        info!(id = %source.id, name = %source.name, kind = %source.kind, "source created");
        Ok(source)
    }

    pub async fn list_sources(&self) -> Result<Vec<Source>> {
        self.store.list_sources().await
    }

    pub async fn get_source(&self, id: Uuid) -> Result<Option<Source>> {
        self.store.get_source(id).await
    }

    /// Enabling marks the source `active`, disabling marks it `pending`.
    /// Returns `false` for an unknown id.
    pub async fn set_enabled(&self, id: Uuid, enabled: bool) -> Result<bool> {
        let status = if enabled {
            SourceStatus::Active
        } else {
            SourceStatus::Pending
        };
        self.store.set_source_enabled(id, enabled, status).await
    }

    /// One fetch+parse against a candidate source, nothing stored.
    pub async fn test_connection(
        &self,
        kind: &str,
        category: &str,
        url: &str,
        mapping: Option<&Value>,
    ) -> ConnectionTest {
        let source = SourceRef {
            kind,
            url,
            category,
            mapping,
        };
        let cancel = Cancellation::with_deadline(self.test_timeout);

        let items = match connectors::fetch_items(source, self.fetcher.as_ref(), &cancel).await {
            Ok(items) => items,
            Err(e) => {
                warn!(kind, url, error = %e, "connection test failed");
                return ConnectionTest::failed(e.code(), e.to_string(), 0);
            }
        };

        if items.len() < MIN_TEST_ITEMS {
            return ConnectionTest::failed(
                ErrorCode::InsufficientItems,
                format!(
                    "found only {} items, need at least {MIN_TEST_ITEMS}",
                    items.len()
                ),
                items.len(),
            );
        }

        let preview_items = items
            .iter()
            .take(MAX_PREVIEW_ITEMS)
            .map(|it| ItemPreview {
                title: it.title.clone(),
                url: it.url.clone(),
                published_at: it.published_at.to_rfc3339(),
                source_type: kind.to_string(),
                category: category.to_string(),
            })
            .collect();

        ConnectionTest {
            status: TestStatus::Ok,
            error_code: None,
            message: format!("found {} items", items.len()),
            items_found: items.len(),
            preview_items,
        }
    }

    /// Test a stored source and record the outcome on it. A failed test
    /// marks the source `failed`; a passing one restores `active`/`pending`
    /// from the enabled flag. `Ok(None)` for an unknown id.
    pub async fn test_source(&self, id: Uuid) -> Result<Option<ConnectionTest>> {
        let Some(source) = self.store.get_source(id).await? else {
            return Ok(None);
        };

        let result = self
            .test_connection(
                &source.kind,
                &source.category,
                &source.url,
                source.mapping.as_ref(),
            )
            .await;

        let status = match (result.is_ok(), source.enabled) {
            (false, _) => SourceStatus::Failed,
            (true, true) => SourceStatus::Active,
            (true, false) => SourceStatus::Pending,
        };
        let message = match result.error_code {
            Some(code) => format!("{code}: {}", result.message),
            None => result.message.clone(),
        };
        self.store
            .record_source_test(id, result.status.as_str(), &message, status)
            .await
            .context("recording connection test")?;

        info!(id = %id, name = %source.name, status = result.status.as_str(), "source tested");
        Ok(Some(result))
    }

    /// Create every default source whose URL is not stored yet. Returns how
    /// many were created.
    pub async fn seed_default_sources(&self) -> Result<usize> {
        let existing: Vec<String> = self
            .store
            .list_sources()
            .await?
            .into_iter()
            .map(|s| s.url)
            .collect();

        let mut created = 0usize;
        for new in default_sources() {
            if existing.iter().any(|u| u == &new.url) {
                info!(name = %new.name, "default source already present");
                continue;
            }
            self.create_source(&new).await?;
            created += 1;
        }
        Ok(created)
    }
}
