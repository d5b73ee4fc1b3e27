use std::time::Duration;

use composer_core::{GenerationRequest, InsertionMode, ProviderKind, Submission};
use composer_engine::{
    GenerationProvider, HttpProbe, HttpProvider, HttpQuotaGate, LivenessProbe, ProbeError,
    ProviderError, ProviderSettings, QuotaError, QuotaGate,
};
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn provider(server: &MockServer) -> HttpProvider {
    let settings = ProviderSettings {
        api_token: Some("secret".into()),
        ..ProviderSettings::new(server.uri())
    };
    HttpProvider::new(ProviderKind::ImageProviderB, settings).unwrap()
}

#[tokio::test]
async fn submit_returns_remote_task() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/tasks"))
        .and(header("authorization", "Bearer secret"))
        .and(body_json(json!({"kind": "image", "prompt": "a fox", "style": null})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"request_id": "R-9"})))
        .mount(&server)
        .await;

    let request = GenerationRequest::new(ProviderKind::ImageProviderB, "a fox", InsertionMode::AtCaret);
    let submission = provider(&server).submit(&request).await.unwrap();
    assert_eq!(submission, Submission::RemoteTask("R-9".into()));
}

#[tokio::test]
async fn check_status_returns_raw_document() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/tasks/R-9"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"status": "IN_PROGRESS"})),
        )
        .mount(&server)
        .await;

    let body = provider(&server).check_status("R-9").await.unwrap();
    assert_eq!(body, json!({"status": "IN_PROGRESS"}));
}

#[tokio::test]
async fn rate_limit_is_transient_and_client_errors_are_failures() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/tasks/busy"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/tasks/gone"))
        .respond_with(ResponseTemplate::new(404).set_body_string("no such task"))
        .mount(&server)
        .await;

    let provider = provider(&server);
    let busy = provider.check_status("busy").await.unwrap_err();
    assert!(busy.is_transient(), "{busy:?}");
    let gone = provider.check_status("gone").await.unwrap_err();
    assert!(matches!(gone, ProviderError::Failure(ref message) if message.contains("no such task")));
}

#[tokio::test]
async fn garbage_body_is_a_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/tasks/x"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
        .mount(&server)
        .await;

    let err = provider(&server).check_status("x").await.unwrap_err();
    assert!(matches!(err, ProviderError::Decode(_)));
}

#[tokio::test]
async fn slow_provider_times_out_as_transient() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/tasks/slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(Duration::from_millis(250))
                .set_body_json(json!({})),
        )
        .mount(&server)
        .await;

    let settings = ProviderSettings {
        request_timeout_ms: 50,
        ..ProviderSettings::new(server.uri())
    };
    let provider = HttpProvider::new(ProviderKind::AudioProviderA, settings).unwrap();
    let err = provider.check_status("slow").await.unwrap_err();
    assert!(err.is_transient(), "{err:?}");
}

#[tokio::test]
async fn probe_accepts_head_success() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/a.png"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let probe = HttpProbe::new(Duration::from_secs(2)).unwrap();
    probe.probe(&format!("{}/a.png", server.uri())).await.unwrap();
}

#[tokio::test]
async fn probe_falls_back_to_ranged_get() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/v.mp4"))
        .respond_with(ResponseTemplate::new(405))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v.mp4"))
        .and(header("range", "bytes=0-0"))
        .respond_with(ResponseTemplate::new(206).set_body_string("x"))
        .expect(1)
        .mount(&server)
        .await;

    let probe = HttpProbe::new(Duration::from_secs(2)).unwrap();
    probe.probe(&format!("{}/v.mp4", server.uri())).await.unwrap();
}

#[tokio::test]
async fn probe_reports_missing_asset() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/late.png"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let probe = HttpProbe::new(Duration::from_secs(2)).unwrap();
    let err = probe
        .probe(&format!("{}/late.png", server.uri()))
        .await
        .unwrap_err();
    assert_eq!(err, ProbeError::HttpStatus(404));
}

#[tokio::test]
async fn http_quota_gate_reads_decision() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/consume"))
        .and(body_json(json!({"featureKey": "generate-video"})))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"success": false, "error": "Not enough credits"})),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/consume"))
        .and(body_json(json!({"featureKey": "generate-image"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
        .mount(&server)
        .await;

    let gate = HttpQuotaGate::new(format!("{}/consume", server.uri()), None).unwrap();
    let denied = gate.try_consume("generate-video").await.unwrap();
    assert!(!denied.success);
    assert_eq!(denied.error.as_deref(), Some("Not enough credits"));
    assert!(gate.try_consume("generate-image").await.unwrap().success);
}

#[tokio::test]
async fn http_quota_gate_surfaces_server_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/consume"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let gate = HttpQuotaGate::new(format!("{}/consume", server.uri()), None).unwrap();
    let err = gate.try_consume("generate-audio").await.unwrap_err();
    assert_eq!(err, QuotaError::HttpStatus(503));
}
