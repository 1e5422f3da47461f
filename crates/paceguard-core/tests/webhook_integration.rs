//! Webhook sink against a mock HTTP endpoint.

use std::time::Duration;

use paceguard_core::{Alert, AlertLevel, NotificationSink, WebhookError, WebhookSink};

#[tokio::test]
async fn test_deliver_posts_alert_json() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/alerts")
        .match_header("content-type", "application/json")
        .match_body(mockito::Matcher::PartialJsonString(
            r#"{"level":"warning","title":"Task quota reached"}"#.to_string(),
        ))
        .with_status(204)
        .create_async()
        .await;

    let sink = WebhookSink::new(&format!("{}/alerts", server.url())).unwrap();
    let alert = Alert::new(AlertLevel::Warning, "Task quota reached", "500 of 500 tasks completed");

    sink.deliver(&alert).await.unwrap();

    mock.assert_async().await;
}

#[tokio::test]
async fn test_deliver_reports_http_status() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/alerts")
        .with_status(500)
        .with_body("boom")
        .create_async()
        .await;

    let sink = WebhookSink::new(&format!("{}/alerts", server.url())).unwrap();
    let err = sink
        .deliver(&Alert::new(AlertLevel::Info, "Break started", "Pausing for 5 min"))
        .await
        .unwrap_err();

    match err {
        WebhookError::Status { status, body } => {
            assert_eq!(status, 500);
            assert_eq!(body, "boom");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_notify_delivers_in_background() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/alerts")
        .with_status(200)
        .expect(1)
        .create_async()
        .await;

    let sink = WebhookSink::new(&format!("{}/alerts", server.url())).unwrap();
    sink.notify(Alert::new(AlertLevel::Info, "Session reset", "New session"));

    for _ in 0..50 {
        if mock.matched_async().await {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    mock.assert_async().await;
}

#[tokio::test]
async fn test_notify_swallows_failures() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/alerts")
        .with_status(503)
        .create_async()
        .await;

    let sink = WebhookSink::new(&format!("{}/alerts", server.url())).unwrap();
    sink.notify(Alert::new(AlertLevel::Warning, "Outside work hours", "Hour 3"));

    for _ in 0..50 {
        if mock.matched_async().await {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    mock.assert_async().await;
}
