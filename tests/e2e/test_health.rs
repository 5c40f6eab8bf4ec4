use crate::e2e::helpers;

use helpers::TestContext;
use reqwest::StatusCode;
use test_context::test_context;

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_return_ok_for_health_check(ctx: &TestContext) {
    let response = ctx.client.get("/health").await.unwrap();

    response.assert_status(StatusCode::OK);

    // Health endpoint returns plain text
    let body = String::from_utf8(response.body_bytes.clone()).unwrap();
    assert_eq!(body, "OK");
}

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_report_ffmpeg_in_ready_status(ctx: &TestContext) {
    let response = ctx.client.get("/health/ready").await.unwrap();

    let body = response.body.as_ref().unwrap();
    let status = body.get("status").and_then(|v| v.as_str());

    if helpers::tool_available("ffmpeg") {
        response.assert_status(StatusCode::OK);
        assert_eq!(status, Some("ready"));
    } else {
        response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(status, Some("not_ready"));
    }
    assert!(body.get("ffmpeg").and_then(|v| v.as_str()).is_some());
}

#[tokio::test]
async fn it_should_not_be_ready_without_ffmpeg() {
    let ctx = TestContext::spawn("ffmpeg-that-does-not-exist").await;

    let response = ctx.client.get("/health/ready").await.unwrap();

    response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
    let ffmpeg = response.body.as_ref().unwrap()["ffmpeg"].as_str().unwrap().to_string();
    assert!(ffmpeg.contains("ffmpeg-that-does-not-exist"), "{}", ffmpeg);

    // liveness is unaffected
    ctx.client.get("/health").await.unwrap().assert_status(StatusCode::OK);
}

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_include_request_id_in_responses(ctx: &TestContext) {
    let response = ctx.client.get("/health").await.unwrap();
    response.assert_header_exists("x-request-id");

    let response = ctx.client.get("/api/tts/options").await.unwrap();
    response.assert_header_exists("x-request-id");
}

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_echo_caller_request_id(ctx: &TestContext) {
    let response = ctx
        .client
        .get_with_header("/health", "x-request-id", "trace-42")
        .await
        .unwrap();

    assert_eq!(response.header("x-request-id").map(String::as_str), Some("trace-42"));
}

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_handle_concurrent_health_checks(ctx: &TestContext) {
    let mut futures = Vec::new();
    for _ in 0..10 {
        let client = ctx.client.clone();
        futures.push(async move { client.get("/health").await });
    }

    let results = futures::future::join_all(futures).await;

    for result in results {
        let response = result.unwrap();
        response.assert_status(StatusCode::OK);
    }
}
