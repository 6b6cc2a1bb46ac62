use super::*;
use crate::extractors::{FetcherRegistry, MockMediaFetcher, SourceKind};
use crate::forward::MockForwarder;
use crate::pipeline::PipelineSettings;
use crate::retry::gate::BackoffGate;
use crate::transcode::MockTranscoder;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use serde_json::{json, Value};
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt; // for oneshot()

struct Harness {
    router: Router,
    dir: TempDir,
}

/// Router over a pipeline whose fetcher is expected to run `fetch_calls` times
fn harness(gate: Arc<BackoffGate>, fetch_calls: usize) -> Harness {
    let dir = tempfile::tempdir().unwrap();

    let mut youtube = MockMediaFetcher::new();
    youtube.expect_source().return_const(SourceKind::YouTube);
    youtube.expect_ready().returning(|| Ok(()));
    youtube.expect_fetch().times(fetch_calls).returning(|_, dest| {
        std::fs::write(dest, b"video").unwrap();
        Ok(())
    });

    let mut transcoder = MockTranscoder::new();
    transcoder
        .expect_to_mp3()
        .times(fetch_calls)
        .returning(|_, output, _| {
            std::fs::write(output, b"ID3 mp3").unwrap();
            Ok(())
        });

    let mut forwarder = MockForwarder::new();
    forwarder
        .expect_forward()
        .times(fetch_calls)
        .returning(|_| Ok(json!({"transcript": "hello"})));

    let mut fetchers = FetcherRegistry::new();
    fetchers.register(Arc::new(youtube));

    let settings = PipelineSettings {
        work_dir: dir.path().to_path_buf(),
        min_free_bytes: 0,
        ..PipelineSettings::default()
    };
    let pipeline = Pipeline::new(
        settings,
        gate,
        fetchers,
        Arc::new(transcoder),
        Arc::new(forwarder),
    );

    Harness {
        router: create_router(Arc::new(pipeline)),
        dir,
    }
}

fn post_json(body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/process-video")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn read_json(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn test_health_check() {
    let harness = harness(Arc::new(BackoffGate::default()), 0);

    let request = Request::builder().uri("/").body(Body::empty()).unwrap();
    let response = harness.router.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["status"], "OK");
    assert!(body["message"].is_string());
}

#[tokio::test]
async fn test_process_video_success() {
    let harness = harness(Arc::new(BackoffGate::default()), 1);

    let response = harness
        .router
        .oneshot(post_json(r#"{"url": "https://youtube.com/watch?v=abc"}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["renderResponse"], json!({"transcript": "hello"}));
    assert_eq!(std::fs::read_dir(harness.dir.path()).unwrap().count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_process_video_during_backoff() {
    let gate = Arc::new(BackoffGate::new(Duration::from_secs(1200)));
    gate.record_signal();
    let harness = harness(gate, 0);

    let response = harness
        .router
        .oneshot(post_json(r#"{"url": "https://youtube.com/watch?v=abc"}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response.headers()[header::RETRY_AFTER], "1200");
    let body = read_json(response).await;
    assert!(body["error"].as_str().unwrap().contains("backoff active"));
}

#[tokio::test]
async fn test_process_video_bad_urls() {
    for body in [
        r#"{"url": "not-a-url"}"#,
        r#"{"url": 42}"#,
        r#"{"link": "https://youtube.com/watch?v=abc"}"#,
        r#"{"url": ""}"#,
        r#"not json"#,
    ] {
        let harness = harness(Arc::new(BackoffGate::default()), 0);
        let response = harness.router.oneshot(post_json(body)).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{body}");
        let json = read_json(response).await;
        assert!(json["error"].is_string(), "{body}");
    }
}

#[tokio::test]
async fn test_process_video_disabled_source() {
    let harness = harness(Arc::new(BackoffGate::default()), 0);

    let response = harness
        .router
        .oneshot(post_json(r#"{"url": "https://www.instagram.com/reel/C1a2b3c4d5e/"}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_cors_headers_present() {
    let harness = harness(Arc::new(BackoffGate::default()), 0);

    let request = Request::builder()
        .uri("/")
        .header(header::ORIGIN, "https://scenefinder.example")
        .body(Body::empty())
        .unwrap();
    let response = harness.router.oneshot(request).await.unwrap();

    assert!(response
        .headers()
        .contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN));
}

#[tokio::test]
async fn test_serve_binds_and_answers() {
    let harness = harness(Arc::new(BackoffGate::default()), 0);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        axum::serve(listener, harness.router).await.unwrap();
    });

    let body: Value = reqwest::get(format!("http://{}/", addr))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "OK");

    server.abort();
}
