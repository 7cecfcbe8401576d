//! Core data model shared by the connectors, the orchestrator, the scoring
//! engine and the storage collaborator.
//!
//! Everything here derives `Serialize` so the serving layer can hand rows out
//! unchanged.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::SourceError;

/// Supported source formats. Stored on [`Source`] as a raw string so that an
/// unknown value survives until dispatch, where it becomes a config error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceKind {
    /// Fixed aggregator API (Hacker News).
    #[serde(rename = "hacker_news")]
    AggregatorApi,
    /// RSS 2.0 or Atom.
    #[serde(rename = "rss_atom")]
    SyndicationFeed,
    /// arXiv export API.
    #[serde(rename = "arxiv")]
    AcademicApi,
    /// Any JSON endpoint described by a [`FieldMapping`].
    #[serde(rename = "json_api")]
    GenericJsonApi,
}

impl SourceKind {
    pub const ALL: [SourceKind; 4] = [
        SourceKind::AggregatorApi,
        SourceKind::SyndicationFeed,
        SourceKind::AcademicApi,
        SourceKind::GenericJsonApi,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::AggregatorApi => "hacker_news",
            SourceKind::SyndicationFeed => "rss_atom",
            SourceKind::AcademicApi => "arxiv",
            SourceKind::GenericJsonApi => "json_api",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = SourceError;

    /// Accepts the stored names plus the descriptive aliases used in admin
    /// tooling (`aggregator-api`, `syndication-feed`, ...).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hacker_news" | "aggregator_api" | "aggregator-api" => Ok(SourceKind::AggregatorApi),
            "rss_atom" | "rss" | "atom" | "syndication_feed" | "syndication-feed" => {
                Ok(SourceKind::SyndicationFeed)
            }
            "arxiv" | "academic_api" | "academic-api" => Ok(SourceKind::AcademicApi),
            "json_api" | "generic_json_api" | "generic-json-api" => Ok(SourceKind::GenericJsonApi),
            _ => Err(SourceError::UnsupportedKind(s.to_string())),
        }
    }
}

/// Lifecycle status of a [`Source`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceStatus {
    Pending,
    Active,
    Failed,
}

impl SourceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceStatus::Pending => "pending",
            SourceStatus::Active => "active",
            SourceStatus::Failed => "failed",
        }
    }

    /// Unknown strings read back from storage degrade to `Pending`.
    pub fn parse(s: &str) -> Self {
        match s {
            "active" => SourceStatus::Active,
            "failed" => SourceStatus::Failed,
            _ => SourceStatus::Pending,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub id: Uuid,
    pub name: String,
    /// Raw kind string; see [`Source::kind`].
    pub kind: String,
    pub category: String,
    pub url: String,
    /// Format-mapping document (field paths for `json_api`, query for `arxiv`).
    pub mapping: Option<serde_json::Value>,
    pub enabled: bool,
    pub status: SourceStatus,
    pub last_test_status: Option<String>,
    pub last_test_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Source {
    pub fn kind(&self) -> Result<SourceKind, SourceError> {
        self.kind.parse()
    }
}

/// Input for creating a [`Source`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSource {
    pub name: String,
    pub kind: String,
    pub category: String,
    pub url: String,
    #[serde(default)]
    pub mapping: Option<serde_json::Value>,
    pub enabled: bool,
    pub status: SourceStatus,
}

/// Dotted-path field mapping for a generic JSON API source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMapping {
    #[serde(default = "default_items_path")]
    pub items_path: String,
    #[serde(default = "default_title_path")]
    pub title_path: String,
    #[serde(default = "default_url_path")]
    pub url_path: String,
    #[serde(default = "default_published_at_path")]
    pub published_at_path: String,
    #[serde(default)]
    pub summary_path: Option<String>,
}

fn default_items_path() -> String {
    "items".to_string()
}
fn default_title_path() -> String {
    "title".to_string()
}
fn default_url_path() -> String {
    "url".to_string()
}
fn default_published_at_path() -> String {
    "published_at".to_string()
}

impl Default for FieldMapping {
    fn default() -> Self {
        Self {
            items_path: default_items_path(),
            title_path: default_title_path(),
            url_path: default_url_path(),
            published_at_path: default_published_at_path(),
            summary_path: None,
        }
    }
}

impl FieldMapping {
    /// Parse the mapping document stored on a source. A missing document
    /// means "all defaults".
    pub fn from_document(doc: Option<&serde_json::Value>) -> Result<Self, SourceError> {
        match doc {
            None | Some(serde_json::Value::Null) => Ok(Self::default()),
            Some(v) => serde_json::from_value(v.clone())
                .map_err(|e| SourceError::Mapping(format!("invalid mapping document: {e}"))),
        }
    }
}

/// Uniform connector output, before normalization and dedup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntermediateItem {
    pub title: String,
    pub url: String,
    pub published_at: DateTime<Utc>,
    pub excerpt: Option<String>,
    pub domain: String,
    pub category: String,
    pub points: Option<i64>,
    pub comments: Option<i64>,
    pub rank: Option<i64>,
    pub tags: Vec<String>,
}

impl IntermediateItem {
    pub fn has_engagement(&self) -> bool {
        self.points.is_some() || self.comments.is_some() || self.rank.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: Uuid,
    pub source_id: Uuid,
    pub title: String,
    pub url: String,
    pub published_at: DateTime<Utc>,
    pub fingerprint: String,
    pub domain: String,
    pub category: String,
    pub excerpt: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewItem {
    pub source_id: Uuid,
    pub title: String,
    pub url: String,
    pub published_at: DateTime<Utc>,
    pub fingerprint: String,
    pub domain: String,
    pub category: String,
    pub excerpt: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub id: Uuid,
    pub item_id: Uuid,
    pub points: Option<i64>,
    pub comments: Option<i64>,
    pub rank: Option<i64>,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSignal {
    pub item_id: Uuid,
    pub points: Option<i64>,
    pub comments: Option<i64>,
    pub rank: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Score {
    pub item_id: Uuid,
    pub hot: f64,
    pub relevance: f64,
    pub credibility: f64,
    pub novelty: f64,
    pub final_score: f64,
    pub computed_at: DateTime<Utc>,
}

pub const SUMMARY_METHOD_EXTRACTIVE: &str = "extractive";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub item_id: Uuid,
    pub tldr: String,
    pub why_it_matters: String,
    pub tags: Vec<String>,
    pub method: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Success,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Success => "success",
            RunStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchRun {
    pub id: Uuid,
    pub source_id: Uuid,
    pub status: RunStatus,
    pub error: Option<String>,
    pub items_fetched: i64,
    pub items_inserted: i64,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewFetchRun {
    pub source_id: Uuid,
    pub status: RunStatus,
    pub error: Option<String>,
    pub items_fetched: i64,
    pub items_inserted: i64,
}
