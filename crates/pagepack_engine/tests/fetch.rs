use std::time::Duration;

use pagepack_engine::{FailureKind, FetchSettings, ReqwestFetcher, ResourceFetcher};
use pagepack_logging::initialize_for_tests;
use pretty_assertions::assert_eq;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn settings() -> FetchSettings {
    FetchSettings {
        connect_timeout: Duration::from_secs(2),
        request_timeout: Duration::from_secs(2),
        ..FetchSettings::default()
    }
}

#[tokio::test]
async fn retrieves_body_and_content_type() {
    initialize_for_tests();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/styles/site.css"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(b"body { color: red; }".as_slice(), "text/css; charset=utf-8"),
        )
        .mount(&server)
        .await;

    let fetcher = ReqwestFetcher::new(settings()).unwrap();
    let url = Url::parse(&format!("{}/styles/site.css", server.uri())).unwrap();
    let retrieved = fetcher.retrieve(&url).await.unwrap();

    assert_eq!(retrieved.bytes, b"body { color: red; }");
    assert_eq!(
        retrieved.content_type.as_deref(),
        Some("text/css; charset=utf-8")
    );
}

#[tokio::test]
async fn http_error_status_is_reported() {
    initialize_for_tests();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing.png"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let fetcher = ReqwestFetcher::new(settings()).unwrap();
    let url = Url::parse(&format!("{}/missing.png", server.uri())).unwrap();
    let err = fetcher.retrieve(&url).await.unwrap_err();

    assert_eq!(err.kind, FailureKind::HttpStatus(404));
}

#[tokio::test]
async fn oversized_response_is_rejected() {
    initialize_for_tests();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/huge.bin"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 4096]))
        .mount(&server)
        .await;

    let fetcher = ReqwestFetcher::new(FetchSettings {
        max_bytes: 1024,
        ..settings()
    })
    .unwrap();
    let url = Url::parse(&format!("{}/huge.bin", server.uri())).unwrap();
    let err = fetcher.retrieve(&url).await.unwrap_err();

    assert!(matches!(err.kind, FailureKind::TooLarge { .. }));
}

#[tokio::test]
async fn slow_response_times_out() {
    initialize_for_tests();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(10)))
        .mount(&server)
        .await;

    let fetcher = ReqwestFetcher::new(FetchSettings {
        request_timeout: Duration::from_millis(200),
        ..settings()
    })
    .unwrap();
    let url = Url::parse(&format!("{}/slow", server.uri())).unwrap();
    let err = fetcher.retrieve(&url).await.unwrap_err();

    assert_eq!(err.kind, FailureKind::Timeout);
}
