//! Per-format connectors. Dispatch is a closed match over [`SourceKind`];
//! each connector also exposes a pure parser over the response body.

pub mod academic;
pub mod aggregator;
pub mod dates;
pub mod json_api;
pub mod syndication;

use serde_json::Value;

use crate::cancel::Cancellation;
use crate::error::SourceError;
use crate::fetch::HttpFetch;
use crate::models::{IntermediateItem, Source, SourceKind};

/// What a connector needs to know about a source. Borrowed from a stored
/// [`Source`] or built ad hoc for a connection test.
#[derive(Debug, Clone, Copy)]
pub struct SourceRef<'a> {
    pub kind: &'a str,
    pub url: &'a str,
    pub category: &'a str,
    pub mapping: Option<&'a Value>,
}

impl<'a> From<&'a Source> for SourceRef<'a> {
    fn from(s: &'a Source) -> Self {
        Self {
            kind: &s.kind,
            url: &s.url,
            category: &s.category,
            mapping: s.mapping.as_ref(),
        }
    }
}

/// Fetch and parse one source. An unknown kind fails before any I/O.
pub async fn fetch_items(
    source: SourceRef<'_>,
    fetcher: &dyn HttpFetch,
    cancel: &Cancellation,
) -> Result<Vec<IntermediateItem>, SourceError> {
    let kind: SourceKind = source.kind.parse()?;
    match kind {
        SourceKind::AggregatorApi => aggregator::fetch(source.category, fetcher, cancel).await,
        SourceKind::SyndicationFeed => {
            syndication::fetch(source.url, source.category, fetcher, cancel).await
        }
        SourceKind::AcademicApi => {
            academic::fetch(source.category, source.mapping, fetcher, cancel).await
        }
        SourceKind::GenericJsonApi => {
            json_api::fetch(source.url, source.category, source.mapping, fetcher, cancel).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::StaticFetcher;

    #[tokio::test]
    async fn unsupported_kind_makes_no_request() {
        let fetcher = StaticFetcher::new();
        let src = SourceRef {
            kind: "carrier_pigeon",
            url: "https://coop.test/",
            category: "news",
            mapping: None,
        };
        let err = fetch_items(src, &fetcher, &Cancellation::never()).await.unwrap_err();
        assert!(matches!(err, SourceError::UnsupportedKind(_)));
        assert!(err.is_config());
        assert!(fetcher.requested().is_empty());
    }
}
