//! Tests for the signed HTTP delivery primitive against a mock destination.

mod common;

use std::time::Duration;

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use vellum_outbox::services::dispatch_service::{
    post_signed, EVENT_TYPE_HEADER, SIGNATURE_HEADER,
};

const TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn test_delivery_success_on_2xx() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .expect(1)
        .mount(&server)
        .await;

    let body = br#"{"id":"evt-1","type":"content.published"}"#.to_vec();
    let attempt = post_signed(
        &common::delivery_client(),
        &format!("{}/hook", server.uri()),
        "s3cr3t",
        "content.published",
        body,
        TIMEOUT,
    )
    .await;

    assert!(attempt.success);
    assert_eq!(attempt.status_code, Some(200));
    assert!(attempt.error.is_none());
}

#[tokio::test]
async fn test_delivery_failure_on_5xx() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let attempt = post_signed(
        &common::delivery_client(),
        &server.uri(),
        "s3cr3t",
        "content.published",
        b"{}".to_vec(),
        TIMEOUT,
    )
    .await;

    assert!(!attempt.success);
    assert_eq!(attempt.status_code, Some(500));
    assert_eq!(attempt.error.as_deref(), Some("HTTP 500"));
    assert_eq!(attempt.response_snippet.as_deref(), Some("boom"));
}

#[tokio::test]
async fn test_delivery_failure_on_4xx() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(410))
        .mount(&server)
        .await;

    let attempt = post_signed(
        &common::delivery_client(),
        &server.uri(),
        "s3cr3t",
        "content.published",
        b"{}".to_vec(),
        TIMEOUT,
    )
    .await;

    assert!(!attempt.success);
    assert_eq!(attempt.status_code, Some(410));
}

#[tokio::test]
async fn test_delivery_timeout_aborts_call() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(10)))
        .mount(&server)
        .await;

    let attempt = post_signed(
        &common::delivery_client(),
        &server.uri(),
        "s3cr3t",
        "content.published",
        b"{}".to_vec(),
        Duration::from_millis(100),
    )
    .await;

    assert!(!attempt.success);
    assert!(attempt.status_code.is_none());
    assert!(attempt.error.unwrap().contains("timeout"));
    assert!(attempt.duration < Duration::from_secs(5));
}

#[tokio::test]
async fn test_delivery_connection_refused() {
    // Nothing listens on this port.
    let attempt = post_signed(
        &common::delivery_client(),
        "http://127.0.0.1:1/hook",
        "s3cr3t",
        "content.published",
        b"{}".to_vec(),
        TIMEOUT,
    )
    .await;

    assert!(!attempt.success);
    assert!(attempt.status_code.is_none());
    assert!(attempt.error.is_some());
}

#[tokio::test]
async fn test_signature_covers_exact_body_bytes() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let body = br#"{"id":"evt-1","payload":{"title":"hello"}}"#.to_vec();
    let attempt = post_signed(
        &common::delivery_client(),
        &server.uri(),
        "s3cr3t",
        "content.published",
        body.clone(),
        TIMEOUT,
    )
    .await;
    assert!(attempt.success);

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];

    assert_eq!(request.body, body);
    let signature = request
        .headers
        .get(SIGNATURE_HEADER)
        .expect("signature header present")
        .to_str()
        .unwrap();
    assert_eq!(signature, common::expected_signature("s3cr3t", &body));
    assert_eq!(
        request.headers.get(EVENT_TYPE_HEADER).unwrap(),
        "content.published"
    );
    assert_eq!(request.headers.get("content-type").unwrap(), "application/json");
}

#[tokio::test]
async fn test_empty_secret_sends_empty_signature() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let attempt = post_signed(
        &common::delivery_client(),
        &server.uri(),
        "",
        "content.published",
        b"{}".to_vec(),
        TIMEOUT,
    )
    .await;
    assert!(attempt.success);

    let requests = server.received_requests().await.unwrap();
    let signature = requests[0]
        .headers
        .get(SIGNATURE_HEADER)
        .expect("header present even with empty secret");
    assert_eq!(signature, "");
}
