//! Generic JSON API connector driven by a dotted-path [`FieldMapping`].

use chrono::{DateTime, Utc};
use serde_json::Value;

use super::dates;
use crate::cancel::Cancellation;
use crate::error::SourceError;
use crate::fetch::HttpFetch;
use crate::ingest::normalize::{domain_of, normalize_text};
use crate::models::{FieldMapping, IntermediateItem};

pub async fn fetch(
    url: &str,
    category: &str,
    mapping: Option<&Value>,
    fetcher: &dyn HttpFetch,
    cancel: &Cancellation,
) -> Result<Vec<IntermediateItem>, SourceError> {
    // A broken mapping should not cost a network round-trip.
    let mapping = FieldMapping::from_document(mapping)?;
    let body = fetcher.get(url, cancel).await?;
    parse_json_api(&body, &mapping, category, Utc::now())
}

/// Walk a dotted path (`data.results.0.title`). Numeric segments index
/// arrays. Anything missing or of the wrong shape is `None`.
pub fn lookup<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let path = path.trim();
    if path.is_empty() {
        return Some(root);
    }
    path.split('.').try_fold(root, |node, seg| match node {
        Value::Object(map) => map.get(seg),
        Value::Array(arr) => seg.parse::<usize>().ok().and_then(|i| arr.get(i)),
        _ => None,
    })
}

/// Scalar leaf as text; objects, arrays and null are absent.
fn scalar_text(v: &Value) -> Option<String> {
    let text = match v {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    Some(text).filter(|s| !s.is_empty())
}

fn published_at(v: Option<&Value>) -> Option<DateTime<Utc>> {
    match v? {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64))
            .and_then(dates::from_epoch),
        Value::String(s) => dates::parse_flexible(s),
        _ => None,
    }
}

pub fn parse_json_api(
    body: &[u8],
    mapping: &FieldMapping,
    category: &str,
    now: DateTime<Utc>,
) -> Result<Vec<IntermediateItem>, SourceError> {
    let doc: Value = serde_json::from_slice(body).map_err(|e| SourceError::format("json", e))?;

    let records = match lookup(&doc, &mapping.items_path) {
        Some(Value::Array(records)) => records,
        Some(_) => {
            return Err(SourceError::Mapping(format!(
                "items_path `{}` is not an array",
                mapping.items_path
            )))
        }
        None => {
            return Err(SourceError::Mapping(format!(
                "items_path `{}` not found",
                mapping.items_path
            )))
        }
    };

    let items = records
        .iter()
        .filter_map(|rec| {
            let title = lookup(rec, &mapping.title_path)
                .and_then(scalar_text)
                .map(|t| normalize_text(&t))
                .filter(|t| !t.is_empty())?;
            let url = lookup(rec, &mapping.url_path).and_then(scalar_text)?;
            let excerpt = mapping
                .summary_path
                .as_deref()
                .and_then(|p| lookup(rec, p))
                .and_then(scalar_text)
                .map(|s| normalize_text(&s))
                .filter(|s| !s.is_empty());

            Some(IntermediateItem {
                domain: domain_of(&url),
                published_at: published_at(lookup(rec, &mapping.published_at_path)).unwrap_or(now),
                title,
                url,
                excerpt,
                category: category.to_string(),
                points: None,
                comments: None,
                rank: None,
                tags: Vec::new(),
            })
        })
        .collect();

    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn lookup_walks_objects_and_array_indices() {
        let v = json!({"a": {"b": [{"c": 1}, {"c": 2}]}});
        assert_eq!(lookup(&v, "a.b.1.c"), Some(&json!(2)));
        assert_eq!(lookup(&v, "a.b.x"), None);
        assert_eq!(lookup(&v, "a.b.1.c.d"), None);
        assert_eq!(lookup(&v, "missing"), None);
    }

    #[test]
    fn numeric_fields_become_text() {
        let body = br#"{"items":[{"title":2024,"url":"https://x.test/n","published_at":1709632800}]}"#;
        let items = parse_json_api(body, &FieldMapping::default(), "news", Utc::now()).unwrap();
        assert_eq!(items[0].title, "2024");
        assert_eq!(items[0].published_at.timestamp(), 1_709_632_800);
    }

    #[test]
    fn records_missing_title_or_url_are_skipped() {
        let body = br#"{"items":[{"title":"ok","url":"https://x.test/1"},{"title":"no url"},{"url":"https://x.test/2"},{"title":"  ","url":"https://x.test/3"}]}"#;
        let items = parse_json_api(body, &FieldMapping::default(), "news", Utc::now()).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].url, "https://x.test/1");
    }

    #[test]
    fn non_array_items_path_is_mapping_error() {
        let body = br#"{"items":{"title":"x"}}"#;
        let err = parse_json_api(body, &FieldMapping::default(), "news", Utc::now()).unwrap_err();
        assert!(matches!(err, SourceError::Mapping(_)));
    }

    #[test]
    fn non_json_is_format_error() {
        let err = parse_json_api(b"<rss/>", &FieldMapping::default(), "news", Utc::now()).unwrap_err();
        assert!(matches!(err, SourceError::Format { .. }));
    }
}
