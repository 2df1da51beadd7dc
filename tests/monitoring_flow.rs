//! End-to-end flow: router -> capture layer -> pipeline -> summarizer and channels

use api_monitor::ai::MockSummarizer;
use api_monitor::alerts::RecordingNotifier;
use api_monitor::config::MonitorConfig;
use api_monitor::record::{
    ErrorDescriptor, Metadata, RecordPatch, RequestSnapshot, ResponseSnapshot, REDACTED,
};
use api_monitor::{ErrorPipeline, MonitorLayer, TransformHook};
use axum::body::Body;
use axum::extract::Path;
use axum::http::{Request, StatusCode};
use axum::routing::get;
use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

const WAIT: Duration = Duration::from_secs(2);

async fn fail(Path(id): Path<String>) -> (StatusCode, String) {
    (StatusCode::INTERNAL_SERVER_ERROR, format!("item {} failed", id))
}

fn router(config: &MonitorConfig, pipeline: Arc<ErrorPipeline>) -> Router {
    Router::new()
        .route("/items/:id", get(fail))
        .route("/ok", get(|| async { "ok" }))
        .route_layer(MonitorLayer::new(&config.error_monitoring, pipeline))
}

async fn hit(app: &Router, request: Request<Body>) -> StatusCode {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    status
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn third_exchange_sees_first_two_as_history() {
    let config = MonitorConfig::from_toml_str(
        r#"
[error_monitoring]
status_codes = [500]

[ai_summarization]
enabled = true
api_key = "test"
max_history_length = 2
"#,
    )
    .unwrap();

    let summarizer = Arc::new(MockSummarizer::success());
    let notifier = RecordingNotifier::new("recorder");
    let pipeline = Arc::new(
        ErrorPipeline::builder(&config)
            .summarizer(summarizer.clone())
            .notifier(Arc::new(notifier.clone()))
            .build()
            .unwrap(),
    );
    let app = router(&config, Arc::clone(&pipeline));

    for (i, id) in ["1", "2", "3"].iter().enumerate() {
        let status = hit(&app, get_request(&format!("/items/{}", id))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(notifier.wait_for_calls(i + 1, WAIT).await);
    }

    let calls = summarizer.calls();
    assert_eq!(calls.len(), 3);
    let third = &calls[2];
    assert_eq!(third.record.request.url, "/items/3");
    let history: Vec<&str> = third
        .history
        .iter()
        .map(|r| r.request.url.as_str())
        .collect();
    assert_eq!(history, vec!["/items/1", "/items/2"]);

    for record in notifier.received() {
        assert_eq!(
            record.ai_summary.as_ref().map(|s| s.summary.as_str()),
            Some("Mock analysis")
        );
    }

    let retained: Vec<String> = pipeline
        .history_snapshot()
        .into_iter()
        .map(|r| r.request.url)
        .collect();
    assert_eq!(retained, vec!["/items/2", "/items/3"]);
}

#[tokio::test]
async fn failing_channel_does_not_starve_others() {
    let config = MonitorConfig::from_toml_str("[error_monitoring]\nstatus_codes = [500]\n").unwrap();
    let broken = RecordingNotifier::failing("slack", "webhook returned 404");
    let healthy = RecordingNotifier::new("webhook");
    let pipeline = Arc::new(
        ErrorPipeline::builder(&config)
            .notifier(Arc::new(broken.clone()))
            .notifier(Arc::new(healthy.clone()))
            .build()
            .unwrap(),
    );
    let app = router(&config, pipeline);

    hit(&app, get_request("/items/9")).await;

    assert!(healthy.wait_for_calls(1, WAIT).await);
    assert!(broken.wait_for_calls(1, WAIT).await);
    assert_eq!(
        healthy.received()[0].request.params.get("id").map(String::as_str),
        Some("9")
    );
}

#[tokio::test]
async fn disabled_ai_never_summarizes() {
    let config = MonitorConfig::from_toml_str(
        r#"
[error_monitoring]
status_codes = [500]

[ai_summarization]
enabled = false
"#,
    )
    .unwrap();
    let summarizer = Arc::new(MockSummarizer::success());
    let notifier = RecordingNotifier::new("recorder");
    let pipeline = Arc::new(
        ErrorPipeline::builder(&config)
            .summarizer(summarizer.clone())
            .notifier(Arc::new(notifier.clone()))
            .build()
            .unwrap(),
    );
    let app = router(&config, pipeline);

    hit(&app, get_request("/items/1")).await;

    assert!(notifier.wait_for_calls(1, WAIT).await);
    assert_eq!(summarizer.call_count(), 0);
    let json = serde_json::to_value(&notifier.received()[0]).unwrap();
    assert!(json.get("aiSummary").is_none());
}

#[tokio::test]
async fn redaction_and_transform_reach_channels() {
    let config = MonitorConfig::from_toml_str(
        r#"
[error_monitoring]
status_codes = [500]
include_headers = true
include_response_body = true
"#,
    )
    .unwrap();
    let hook: TransformHook = Arc::new(
        |_: &ErrorDescriptor, request: &RequestSnapshot, _: Option<&ResponseSnapshot>| {
            let mut metadata = Metadata::new();
            metadata.insert("customField", "x");
            Some(
                RecordPatch::new()
                    .with_metadata(metadata)
                    .with_extra("route", request.url.clone()),
            )
        },
    );
    let notifier = RecordingNotifier::new("recorder");
    let pipeline = Arc::new(
        ErrorPipeline::builder(&config)
            .transform(hook)
            .notifier(Arc::new(notifier.clone()))
            .build()
            .unwrap(),
    );
    let app = router(&config, pipeline);

    let request = Request::builder()
        .uri("/items/5")
        .header("cookie", "session=abc")
        .header("api-key", "k-1")
        .header("accept", "text/plain")
        .body(Body::empty())
        .unwrap();
    hit(&app, request).await;

    assert!(notifier.wait_for_calls(1, WAIT).await);
    let record = &notifier.received()[0];
    let headers = record.request.headers.as_ref().unwrap();
    assert_eq!(headers["cookie"], REDACTED);
    assert_eq!(headers["api-key"], REDACTED);
    assert_eq!(headers["accept"], "text/plain");
    assert_eq!(record.metadata.get_str("customField"), Some("x"));
    assert_eq!(record.extra["route"], "/items/5");
    assert_eq!(
        record.response.as_ref().unwrap().body,
        Some(serde_json::json!("item 5 failed"))
    );
}

#[tokio::test]
async fn successful_and_excluded_requests_are_ignored() {
    let config = MonitorConfig::from_toml_str(
        "[error_monitoring]\nstatus_codes = [500]\nexclude_paths = [\"items/7\"]\n",
    )
    .unwrap();
    let notifier = RecordingNotifier::new("recorder");
    let pipeline = Arc::new(
        ErrorPipeline::builder(&config)
            .notifier(Arc::new(notifier.clone()))
            .build()
            .unwrap(),
    );
    let app = router(&config, Arc::clone(&pipeline));

    assert_eq!(hit(&app, get_request("/ok")).await, StatusCode::OK);
    assert_eq!(
        hit(&app, get_request("/items/7?retry=1")).await,
        StatusCode::INTERNAL_SERVER_ERROR
    );

    assert!(!notifier.wait_for_calls(1, Duration::from_millis(150)).await);
    assert!(pipeline.history_snapshot().is_empty());
}
