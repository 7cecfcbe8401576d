// tests/connection_test.rs
use std::sync::Arc;

use feed_radar::error::{ErrorCode, FetchError};
use feed_radar::fetch::{FetchGuard, FetchSettings, StaticFetcher};
use feed_radar::ingest::sources::{SourceService, TestStatus, MAX_PREVIEW_ITEMS};
use feed_radar::models::{NewSource, SourceStatus};
use feed_radar::store::{MemoryStore, Store};
use serde_json::json;

const RSS_XML: &str = include_str!("fixtures/rss.xml");
const FEED_URL: &str = "https://lab.test/feed.xml";

fn service_with(fetcher: StaticFetcher) -> (Arc<MemoryStore>, SourceService) {
    let store = Arc::new(MemoryStore::new());
    let svc = SourceService::new(store.clone(), Arc::new(fetcher));
    (store, svc)
}

fn feed_with(n: usize) -> String {
    let items: String = (0..n)
        .map(|i| format!("<item><title>Post {i}</title><link>https://lab.test/{i}</link></item>"))
        .collect();
    format!("<rss><channel>{items}</channel></rss>")
}

#[tokio::test]
async fn healthy_feed_passes_with_preview() {
    let (store, svc) = service_with(StaticFetcher::new().with_body(FEED_URL, RSS_XML));
    let res = svc.test_connection("rss_atom", "news", FEED_URL, None).await;

    assert_eq!(res.status, TestStatus::Ok);
    assert!(res.error_code.is_none());
    assert_eq!(res.items_found, 3);
    assert_eq!(res.preview_items.len(), 3);
    let first = &res.preview_items[0];
    assert_eq!(first.source_type, "rss_atom");
    assert_eq!(first.category, "news");
    assert_eq!(first.published_at, "2024-03-05T10:00:00+00:00");

    // nothing is persisted by a dry-run test
    assert_eq!(store.item_count(), 0);
    assert!(store.fetch_runs().is_empty());
}

#[tokio::test]
async fn preview_is_capped() {
    let (_, svc) = service_with(StaticFetcher::new().with_body(FEED_URL, feed_with(8)));
    let res = svc.test_connection("rss", "news", FEED_URL, None).await;
    assert!(res.is_ok());
    assert_eq!(res.items_found, 8);
    assert_eq!(res.preview_items.len(), MAX_PREVIEW_ITEMS);
}

#[tokio::test]
async fn too_few_items_is_reported() {
    let (_, svc) = service_with(StaticFetcher::new().with_body(FEED_URL, feed_with(2)));
    let res = svc.test_connection("rss_atom", "news", FEED_URL, None).await;
    assert_eq!(res.status, TestStatus::Failed);
    assert_eq!(res.error_code, Some(ErrorCode::InsufficientItems));
    assert_eq!(res.items_found, 2);
    assert!(res.preview_items.is_empty());
}

#[tokio::test]
async fn failures_map_to_codes() {
    let fetcher = StaticFetcher::new()
        .with_error("https://slow.test/feed", FetchError::Timeout)
        .with_body("https://html.test/", "<html><body>not a feed</body></html>");
    let (_, svc) = service_with(fetcher);

    let slow = svc
        .test_connection("rss_atom", "news", "https://slow.test/feed", None)
        .await;
    assert_eq!(slow.error_code, Some(ErrorCode::Timeout));

    let html = svc
        .test_connection("rss_atom", "news", "https://html.test/", None)
        .await;
    assert_eq!(html.error_code, Some(ErrorCode::InvalidFormat));

    let bad_mapping = json!({"title_path": ["nope"]});
    let mapped = svc
        .test_connection("json_api", "news", "https://api.test/", Some(&bad_mapping))
        .await;
    assert_eq!(mapped.error_code, Some(ErrorCode::MappingError));

    let unknown = svc
        .test_connection("carrier_pigeon", "news", "https://coop.test/", None)
        .await;
    assert_eq!(unknown.error_code, Some(ErrorCode::InvalidFormat));
}

#[tokio::test]
async fn guarded_fetcher_blocks_internal_targets() {
    let store = Arc::new(MemoryStore::new());
    let svc = SourceService::new(store, Arc::new(FetchGuard::new(FetchSettings::default())));
    for url in [
        "http://example.com/feed",
        "https://localhost/feed",
        "https://10.1.2.3/feed",
    ] {
        let res = svc.test_connection("rss_atom", "news", url, None).await;
        assert_eq!(res.error_code, Some(ErrorCode::SsrfBlocked), "{url}");
    }
}

#[tokio::test]
async fn stored_source_records_its_test_outcome() {
    let (store, svc) = service_with(StaticFetcher::new().with_body(FEED_URL, RSS_XML));
    let new = |url: &str| NewSource {
        name: "lab".into(),
        kind: "rss_atom".into(),
        category: "news".into(),
        url: url.into(),
        mapping: None,
        enabled: true,
        status: SourceStatus::Pending,
    };
    let good = svc.create_source(&new(FEED_URL)).await.unwrap();
    let bad = svc.create_source(&new("https://missing.test/feed")).await.unwrap();

    let ok = svc.test_source(good.id).await.unwrap().unwrap();
    assert!(ok.is_ok());
    let stored = store.get_source(good.id).await.unwrap().unwrap();
    assert_eq!(stored.last_test_status.as_deref(), Some("ok"));
    assert_eq!(stored.status, SourceStatus::Active);

    let failed = svc.test_source(bad.id).await.unwrap().unwrap();
    assert_eq!(failed.error_code, Some(ErrorCode::TestError));
    let stored = store.get_source(bad.id).await.unwrap().unwrap();
    assert_eq!(stored.last_test_status.as_deref(), Some("failed"));
    assert_eq!(stored.status, SourceStatus::Failed);
    assert!(stored
        .last_test_message
        .as_deref()
        .unwrap()
        .starts_with("TEST_ERROR"));

    assert!(svc.test_source(uuid::Uuid::new_v4()).await.unwrap().is_none());
}
