//! Crawl behavior against a mock Gamma API.

use std::time::Duration;

use market_warehouse_core::{EntityKind, ExtractionConfig};
use market_warehouse_gamma::{CrawlStop, FetchError, GammaClient, RetryPolicy};
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fast_retry(attempts: u32) -> RetryPolicy {
    RetryPolicy::new(attempts, Duration::from_millis(5), 1.5)
}

async fn mount_page(server: &MockServer, endpoint: &str, offset: &str, body: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path(endpoint))
        .and(query_param("offset", offset))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

async fn three_record_api() -> MockServer {
    let server = MockServer::start().await;
    mount_page(&server, "/markets", "0", json!([{"id": "1"}, {"id": "2"}])).await;
    mount_page(&server, "/markets", "2", json!([{"id": "3"}])).await;
    mount_page(&server, "/markets", "3", json!([])).await;
    server
}

async fn request_count(server: &MockServer) -> usize {
    server.received_requests().await.map_or(0, |r| r.len())
}

#[tokio::test]
async fn test_crawl_until_empty_page() {
    let server = three_record_api().await;
    let client = GammaClient::new()
        .unwrap()
        .with_base_url(server.uri())
        .with_stop_on_short_page(false);

    let crawl = client.fetch_all("markets", 2, 0).await;

    assert!(crawl.is_complete());
    assert!(matches!(crawl.stop, CrawlStop::EmptyPage));
    assert_eq!(crawl.records.len(), 3);
    assert_eq!(crawl.pages_requested, 3);
    assert_eq!(request_count(&server).await, 3);
    let ids: Vec<_> = crawl
        .records
        .iter()
        .filter_map(|r| r.natural_key("id"))
        .collect();
    assert_eq!(ids, vec!["1", "2", "3"]);
}

#[tokio::test]
async fn test_short_page_ends_crawl() {
    let server = three_record_api().await;
    let client = GammaClient::new().unwrap().with_base_url(server.uri());

    let crawl = client.fetch_all("markets", 2, 0).await;

    assert!(matches!(crawl.stop, CrawlStop::ShortPage));
    assert_eq!(crawl.records.len(), 3);
    assert_eq!(request_count(&server).await, 2);
}

#[tokio::test]
async fn test_limit_sent_as_query_param() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/tags"))
        .and(query_param("limit", "50"))
        .and(query_param("offset", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 9}])))
        .expect(1)
        .mount(&server)
        .await;

    let mut extraction = ExtractionConfig::default();
    extraction.page_limits.insert(EntityKind::Tags, 50);
    let client = GammaClient::new().unwrap().with_base_url(server.uri());

    let crawl = client.fetch_entity(EntityKind::Tags, &extraction).await;
    assert_eq!(crawl.records.len(), 1);
}

#[tokio::test]
async fn test_page_request_carries_call_params() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/events"))
        .and(query_param("offset", "20"))
        .and(query_param("closed", "false"))
        .and(query_param("order", "id"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": "e9"}])))
        .expect(1)
        .mount(&server)
        .await;

    let client = GammaClient::new()
        .unwrap()
        .with_base_url(server.uri())
        .with_query_param("closed", "false");
    let page = client
        .fetch_page("events", 10, 20, &[("order", "id")])
        .await
        .unwrap();

    assert_eq!(page.len(), 1);
    assert_eq!(page[0].natural_key("id").as_deref(), Some("e9"));
}

#[tokio::test]
async fn test_max_records_truncates() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        "/events",
        "0",
        json!([{"id": "a"}, {"id": "b"}, {"id": "c"}]),
    )
    .await;

    let client = GammaClient::new().unwrap().with_base_url(server.uri());
    let crawl = client.fetch_all("events", 3, 2).await;

    assert!(matches!(crawl.stop, CrawlStop::MaxRecords));
    assert_eq!(crawl.records.len(), 2);
    assert_eq!(request_count(&server).await, 1);
}

#[tokio::test]
async fn test_http_error_fails_without_retry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/series"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let client = GammaClient::new()
        .unwrap()
        .with_base_url(server.uri())
        .with_retry_policy(fast_retry(5));
    let crawl = client.fetch_all("series", 10, 0).await;

    assert!(!crawl.is_complete());
    assert_eq!(crawl.error().and_then(FetchError::status), Some(500));
    assert_eq!(request_count(&server).await, 1);
}

#[tokio::test]
async fn test_failure_keeps_earlier_pages() {
    let server = MockServer::start().await;
    mount_page(&server, "/markets", "0", json!([{"id": "1"}, {"id": "2"}])).await;
    Mock::given(method("GET"))
        .and(path("/markets"))
        .and(query_param("offset", "2"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let client = GammaClient::new().unwrap().with_base_url(server.uri());
    let crawl = client.fetch_all("markets", 2, 0).await;

    assert_eq!(crawl.records.len(), 2);
    assert_eq!(crawl.pages_requested, 2);
    assert_eq!(crawl.error().and_then(FetchError::status), Some(404));
    assert!(crawl.into_result().is_err());
}

#[tokio::test]
async fn test_malformed_body_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
        .mount(&server)
        .await;

    let client = GammaClient::new()
        .unwrap()
        .with_base_url(server.uri())
        .with_retry_policy(fast_retry(4));
    let err = client.fetch_page::<&str, &str>("tags", 10, 0, &[]).await.unwrap_err();

    assert!(matches!(err, FetchError::Decode(_)));
    assert_eq!(request_count(&server).await, 1);
}

#[tokio::test]
async fn test_connection_refused_exhausts_retries() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let client = GammaClient::new()
        .unwrap()
        .with_base_url(format!("http://127.0.0.1:{port}"))
        .with_retry_policy(fast_retry(3));

    let crawl = client.fetch_all("markets", 10, 0).await;

    assert!(crawl.records.is_empty());
    match crawl.stop {
        CrawlStop::Failed(FetchError::RetriesExhausted { attempts, last }) => {
            assert_eq!(attempts, 3);
            assert!(last.is_transient());
        }
        other => panic!("unexpected stop: {other:?}"),
    }
}
