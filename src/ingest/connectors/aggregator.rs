//! Hacker News connector: ranked id list, then one request per story.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::debug;

use crate::cancel::Cancellation;
use crate::error::{FetchError, SourceError};
use crate::fetch::HttpFetch;
use crate::ingest::normalize::{domain_of, normalize_text};
use crate::models::IntermediateItem;

pub const API_BASE: &str = "https://hacker-news.firebaseio.com/v0";
pub const DISCUSSION_BASE: &str = "https://news.ycombinator.com/item?id=";
pub const MAX_STORIES: usize = 100;

pub fn top_stories_url() -> String {
    format!("{API_BASE}/topstories.json")
}

pub fn item_url(id: i64) -> String {
    format!("{API_BASE}/item/{id}.json")
}

#[derive(Debug, Deserialize)]
struct HnItem {
    id: i64,
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    score: Option<i64>,
    #[serde(default)]
    descendants: Option<i64>,
    #[serde(default)]
    time: Option<i64>,
    #[serde(default)]
    text: Option<String>,
}

pub async fn fetch(
    category: &str,
    fetcher: &dyn HttpFetch,
    cancel: &Cancellation,
) -> Result<Vec<IntermediateItem>, SourceError> {
    let body = fetcher.get(&top_stories_url(), cancel).await?;
    let ids = parse_top_ids(&body)?;
    let now = Utc::now();

    let mut out = Vec::new();
    for (pos, id) in ids.into_iter().take(MAX_STORIES).enumerate() {
        let body = match fetcher.get(&item_url(id), cancel).await {
            Ok(b) => b,
            Err(FetchError::Cancelled) => return Err(FetchError::Cancelled.into()),
            Err(e) => {
                debug!(id, error = %e, "skipping story");
                continue;
            }
        };
        if let Some(item) = parse_story(&body, pos as i64 + 1, category, now) {
            out.push(item);
        }
    }
    Ok(out)
}

pub fn parse_top_ids(body: &[u8]) -> Result<Vec<i64>, SourceError> {
    serde_json::from_slice(body).map_err(|e| SourceError::format("hacker news id list", e))
}

/// One story. `None` for unparseable bodies, non-stories and missing
/// titles. `rank` is the 1-based position in the ranked list.
pub fn parse_story(body: &[u8], rank: i64, category: &str, now: DateTime<Utc>) -> Option<IntermediateItem> {
    let it: HnItem = serde_json::from_slice(body).ok()?;
    if it.kind.as_deref() != Some("story") {
        return None;
    }
    let title = normalize_text(it.title.as_deref().unwrap_or_default());
    if title.is_empty() {
        return None;
    }

    let url = it
        .url
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty())
        .unwrap_or_else(|| format!("{DISCUSSION_BASE}{}", it.id));

    Some(IntermediateItem {
        domain: domain_of(&url),
        title,
        url,
        published_at: it
            .time
            .and_then(|t| DateTime::from_timestamp(t, 0))
            .unwrap_or(now),
        excerpt: it.text.map(|t| normalize_text(&t)).filter(|t| !t.is_empty()),
        category: category.to_string(),
        points: Some(it.score.unwrap_or(0)),
        comments: Some(it.descendants.unwrap_or(0)),
        rank: Some(rank),
        tags: Vec::new(),
    })
}
