//! HTTP client tests against a mock index and proxy

mod helpers;

use helpers::*;
use pantry_scanner::client::{http_client, IndexClient, ModuleProxy, PackageIndex, ProxyClient};
use pantry_scanner::error::{ExtractError, FeedError, ResolveError};
use std::time::Duration;
use wiremock::matchers::{header_exists, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client() -> reqwest::Client {
    http_client(Duration::from_secs(5)).expect("http client")
}

#[tokio::test]
async fn test_index_sends_cursor_and_limit() {
    init_tracing();
    let server = MockServer::start().await;

    let body = format!(
        "{}\n\n{{\"Path\": 42}}\n{}\n",
        r#"{"Path":"example.com/a","Version":"v1.0.0","Timestamp":"2024-05-01T10:00:00Z"}"#,
        r#"{"Path":"example.com/b","Version":"v0.1.0","Timestamp":"2024-05-01T10:00:00.25Z"}"#,
    );
    Mock::given(method("GET"))
        .and(path("/index"))
        .and(query_param("since", "2024-05-01T09:00:00.123456Z"))
        .and(query_param("limit", "3"))
        .and(header_exists("user-agent"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .expect(1)
        .mount(&server)
        .await;

    let index = IndexClient::new(client(), format!("{}/index", server.uri()));
    let batch = index
        .fetch_batch(ts("2024-05-01T09:00:00.123456Z"), 3)
        .await
        .unwrap();

    assert_eq!(batch.line_count, 3);
    assert_eq!(batch.malformed, 1);
    assert_eq!(batch.entries.len(), 2);
    assert_eq!(batch.entries[1].path, "example.com/b");
    assert_eq!(batch.max_timestamp(), Some(ts("2024-05-01T10:00:00.25Z")));
    assert!(!batch.is_exhausted(3));
}

#[tokio::test]
async fn test_index_error_status_is_a_feed_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/index"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let index = IndexClient::new(client(), format!("{}/index", server.uri()));
    let result = index.fetch_batch(ts("2024-01-01T00:00:00Z"), 10).await;

    assert!(matches!(result, Err(FeedError::Status { status: 500, .. })));
}

#[tokio::test]
async fn test_latest_escapes_module_path() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/github.com/!azure/azure-sdk-for-go/@latest"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "Version": "v68.0.0+incompatible",
            "Time": "2022-12-01T18:10:23Z",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let proxy = ProxyClient::new(client(), server.uri(), 1024);
    let info = proxy.latest("github.com/Azure/azure-sdk-for-go").await.unwrap();

    assert_eq!(info.version, "v68.0.0+incompatible");
    assert_eq!(info.time, ts("2022-12-01T18:10:23Z"));
}

#[tokio::test]
async fn test_latest_not_found_is_a_resolve_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/example.com/nope/@latest"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let proxy = ProxyClient::new(client(), server.uri(), 1024);
    let result = proxy.latest("example.com/nope").await;

    assert!(matches!(result, Err(ResolveError::Status { status: 404, .. })));
}

#[tokio::test]
async fn test_archive_download() {
    let server = MockServer::start().await;
    let zip = module_zip("example.com/foo", "v1.0.0", &[("README.md", b"hi")]);
    mount_archive(&server, "example.com/foo", "v1.0.0", zip.clone()).await;

    let proxy = ProxyClient::new(client(), format!("{}/", server.uri()), 1 << 20);
    let data = proxy.fetch_archive("example.com/foo", "v1.0.0").await.unwrap();

    assert_eq!(data, zip);
}

#[tokio::test]
async fn test_archive_over_limit_is_rejected() {
    let server = MockServer::start().await;
    mount_archive(&server, "example.com/big", "v1.0.0", vec![0u8; 4096]).await;

    let proxy = ProxyClient::new(client(), server.uri(), 1024);
    let result = proxy.fetch_archive("example.com/big", "v1.0.0").await;

    assert!(matches!(
        result,
        Err(ExtractError::TooLarge { limit: 1024, .. })
    ));
}

#[tokio::test]
async fn test_archive_error_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/example.com/foo/@v/v9.9.9.zip"))
        .respond_with(ResponseTemplate::new(410))
        .mount(&server)
        .await;

    let proxy = ProxyClient::new(client(), server.uri(), 1024);
    let result = proxy.fetch_archive("example.com/foo", "v9.9.9").await;

    assert!(matches!(result, Err(ExtractError::Status { status: 410, .. })));
}
