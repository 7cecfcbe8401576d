//! arXiv export API connector (Atom response).

use chrono::{DateTime, Utc};
use quick_xml::de::from_str;
use serde::Deserialize;
use serde_json::Value;
use url::Url;

use super::dates;
use crate::cancel::Cancellation;
use crate::error::SourceError;
use crate::fetch::HttpFetch;
use crate::ingest::normalize::normalize_text;
use crate::models::IntermediateItem;

pub const API_BASE: &str = "https://export.arxiv.org/api/query";
pub const DEFAULT_QUERY: &str = "cat:cs.AI OR cat:cs.LG OR cat:cs.CV OR cat:cs.CL";
pub const MAX_RESULTS: usize = 100;
const DOMAIN: &str = "arxiv.org";

#[derive(Debug, Deserialize)]
struct Feed {
    #[serde(rename = "entry", default)]
    entries: Vec<Entry>,
}

#[derive(Debug, Deserialize)]
struct Entry {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    published: Option<String>,
    #[serde(default)]
    updated: Option<String>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(rename = "category", default)]
    categories: Vec<Category>,
}

#[derive(Debug, Deserialize)]
struct Category {
    #[serde(rename = "@term")]
    term: String,
}

/// Search query: the mapping document's `query` key, else the AI/ML default.
pub fn query_from_mapping(mapping: Option<&Value>) -> String {
    mapping
        .and_then(|m| m.get("query"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .unwrap_or(DEFAULT_QUERY)
        .to_string()
}

/// Newest submissions first.
pub fn query_url(query: &str) -> String {
    let max = MAX_RESULTS.to_string();
    match Url::parse_with_params(
        API_BASE,
        &[
            ("search_query", query),
            ("start", "0"),
            ("max_results", max.as_str()),
            ("sortBy", "submittedDate"),
            ("sortOrder", "descending"),
        ],
    ) {
        Ok(u) => u.to_string(),
        Err(_) => API_BASE.to_string(),
    }
}

pub async fn fetch(
    category: &str,
    mapping: Option<&Value>,
    fetcher: &dyn HttpFetch,
    cancel: &Cancellation,
) -> Result<Vec<IntermediateItem>, SourceError> {
    let url = query_url(&query_from_mapping(mapping));
    let body = fetcher.get(&url, cancel).await?;
    parse_atom(&String::from_utf8_lossy(&body), category, Utc::now())
}

pub fn parse_atom(body: &str, category: &str, now: DateTime<Utc>) -> Result<Vec<IntermediateItem>, SourceError> {
    let feed: Feed = from_str(body).map_err(|e| SourceError::format("arxiv atom", e))?;

    let items = feed
        .entries
        .into_iter()
        .filter_map(|e| {
            let title = normalize_text(e.title.as_deref().unwrap_or_default());
            let url = e.id.as_deref().map(str::trim).unwrap_or_default().to_string();
            if title.is_empty() || url.is_empty() {
                return None;
            }
            let published_at = e
                .published
                .as_deref()
                .or(e.updated.as_deref())
                .and_then(dates::parse_rfc3339)
                .unwrap_or(now);
            Some(IntermediateItem {
                title,
                url,
                published_at,
                excerpt: e.summary.map(|s| normalize_text(&s)).filter(|s| !s.is_empty()),
                domain: DOMAIN.to_string(),
                category: category.to_string(),
                points: None,
                comments: None,
                rank: None,
                tags: e.categories.into_iter().map(|c| c.term).collect(),
            })
        })
        .collect();

    Ok(items)
}
