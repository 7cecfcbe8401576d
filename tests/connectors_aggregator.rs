// tests/connectors_aggregator.rs
use feed_radar::cancel::Cancellation;
use feed_radar::error::{ErrorCode, FetchError};
use feed_radar::fetch::StaticFetcher;
use feed_radar::ingest::connectors::aggregator::{item_url, top_stories_url};
use feed_radar::ingest::connectors::{fetch_items, SourceRef};

fn hn_source() -> SourceRef<'static> {
    SourceRef {
        kind: "hacker_news",
        // ignored: the aggregator always talks to its own API
        url: "https://news.ycombinator.com",
        category: "news",
        mapping: None,
    }
}

#[tokio::test]
async fn ranked_stories_carry_engagement() {
    let fetcher = StaticFetcher::new()
        .with_body(top_stories_url(), "[11, 12, 13, 14]")
        .with_body(
            item_url(11),
            r#"{"id":11,"type":"story","title":"Open weights model tops benchmark","url":"https://www.example.com/model","score":420,"descendants":128,"time":1709632800}"#,
        )
        .with_body(item_url(12), r#"{"id":12,"type":"job","title":"We're hiring"}"#)
        .with_error(item_url(13), FetchError::Timeout)
        .with_body(
            item_url(14),
            r#"{"id":14,"type":"story","title":"Ask HN: GPU prices?","time":1709632900}"#,
        );

    let items = fetch_items(hn_source(), &fetcher, &Cancellation::never())
        .await
        .unwrap();

    assert_eq!(items.len(), 2, "jobs and failing stories are skipped");

    assert_eq!(items[0].domain, "example.com");
    assert_eq!(items[0].points, Some(420));
    assert_eq!(items[0].comments, Some(128));
    assert_eq!(items[0].rank, Some(1));

    // rank is the position in the id list, not among kept stories
    assert_eq!(items[1].rank, Some(4));
    assert_eq!(items[1].url, "https://news.ycombinator.com/item?id=14");
    assert_eq!(items[1].points, Some(0));
    assert_eq!(items[1].comments, Some(0));

    assert!(!fetcher
        .requested()
        .iter()
        .any(|u| u == "https://news.ycombinator.com"));
}

#[tokio::test]
async fn unreadable_id_list_fails_the_source() {
    let fetcher = StaticFetcher::new().with_body(top_stories_url(), "{\"oops\":true}");
    let err = fetch_items(hn_source(), &fetcher, &Cancellation::never())
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidFormat);
}

#[tokio::test]
async fn cancelled_token_stops_before_fetching() {
    let fetcher = StaticFetcher::new().with_body(top_stories_url(), "[1]");
    let (handle, token) = Cancellation::new();
    handle.cancel();
    let err = fetch_items(hn_source(), &fetcher, &token).await.unwrap_err();
    assert_eq!(err.to_string(), "request cancelled");
    assert!(fetcher.requested().is_empty());
}
