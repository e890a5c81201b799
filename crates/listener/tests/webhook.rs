//! End-to-end tests: each case binds the router on an ephemeral port, sends
//! real HTTP requests, and inspects what reached an in-memory sink.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use audit::{AuditSink, BasicAuthenticator, Credentials, LogEntry, Severity, SinkError, Timezone};
use base64::{engine::general_purpose::STANDARD, Engine};
use listener::{router, WebhookState, MALFORMED_BODY};
use reqwest::StatusCode;
use serde_json::{json, Value};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

const USER: &str = "echo";
const PASS: &str = "s3cr3t:with-colon";

#[derive(Default)]
struct RecordingSink {
    entries: Mutex<Vec<LogEntry>>,
    fail: bool,
}

impl RecordingSink {
    fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().unwrap().clone()
    }
}

#[async_trait]
impl AuditSink for RecordingSink {
    async fn write(&self, entry: LogEntry) -> Result<(), SinkError> {
        self.entries.lock().unwrap().push(entry);
        if self.fail {
            return Err(SinkError::Rejected {
                status: 503,
                body: "unavailable".into(),
            });
        }
        Ok(())
    }
}

struct TestServer {
    base: String,
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl TestServer {
    async fn start(sink: Arc<RecordingSink>, log_payloads: bool) -> Self {
        let state = WebhookState::new(
            BasicAuthenticator::new(Credentials::new(USER, PASS)),
            Timezone::UTC,
            sink,
        )
        .with_payload_logging(log_payloads);

        let tcp = tokio::net::TcpListener::bind((std::net::Ipv4Addr::LOCALHOST, 0))
            .await
            .expect("bind");
        let addr = tcp.local_addr().unwrap();
        let (shutdown, rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            let _ = listener::serve(tcp, router(state), async move {
                let _ = rx.await;
            })
            .await;
        });

        Self {
            base: format!("http://{addr}"),
            shutdown,
            handle,
        }
    }

    async fn post(
        &self,
        authorization: Option<String>,
        body: impl Into<reqwest::Body>,
    ) -> (StatusCode, String) {
        let mut request = reqwest::Client::new()
            .post(format!("{}/", self.base))
            .header("content-type", "application/json")
            .body(body);
        if let Some(value) = authorization {
            request = request.header("authorization", value);
        }
        read(request.send().await.unwrap()).await
    }

    async fn get(&self, path: &str) -> (StatusCode, String) {
        read(reqwest::get(format!("{}{path}", self.base)).await.unwrap()).await
    }

    async fn stop(self) {
        let _ = self.shutdown.send(());
        let _ = self.handle.await;
    }
}

async fn read(response: reqwest::Response) -> (StatusCode, String) {
    let status = response.status();
    (status, response.text().await.unwrap())
}

fn basic(user: &str, pass: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{user}:{pass}")))
}

fn envelope(payload: Value) -> String {
    json!({"eventName": "spinnaker_events", "payload": payload}).to_string()
}

fn pipeline_complete() -> String {
    envelope(json!({
        "details": {"source": "orca", "type": "orca:pipeline:complete", "created": 1_700_000_000_000_i64},
        "content": {"execution": {
            "name": "ship",
            "application": "shop",
            "trigger": {"type": "manual"},
            "stages": []
        }}
    }))
}

#[tokio::test]
async fn recognised_event_is_written_and_acknowledged() {
    let sink = Arc::new(RecordingSink::default());
    let server = TestServer::start(sink.clone(), false).await;

    let (status, body) = server.post(Some(basic(USER, PASS)), pipeline_complete()).await;
    server.stop().await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "Success: spinnaker_events");

    let entries = sink.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].severity, Severity::Info);
    assert_eq!(
        entries[0].payload.message,
        "Pipeline ship of application shop completed at Tue, 14 Nov 2023 22:13:20 UTC."
    );
    assert_eq!(entries[0].payload.application.as_ref().unwrap().as_str(), "shop");
    assert_eq!(entries[0].payload.pipeline.as_ref().unwrap().as_str(), "ship");
}

#[tokio::test]
async fn unrecognised_event_is_acknowledged_without_writing() {
    let sink = Arc::new(RecordingSink::default());
    let server = TestServer::start(sink.clone(), false).await;
    let body = envelope(json!({
        "details": {"source": "orca", "type": "orca:stage:complete", "created": 1}
    }));

    let (status, text) = server.post(Some(basic(USER, PASS)), body).await;
    server.stop().await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(text, "Success: spinnaker_events");
    assert!(sink.entries().is_empty());
}

#[tokio::test]
async fn bad_credentials_are_rejected_before_anything_is_written() {
    let sink = Arc::new(RecordingSink::default());
    let server = TestServer::start(sink.clone(), true).await;

    for authorization in [
        None,
        Some(basic(USER, "wrong")),
        Some("Bearer abc".to_string()),
        Some("Basic !!!".to_string()),
    ] {
        let (status, body) = server.post(authorization, pipeline_complete()).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let body: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(body, json!({"code": 401, "message": "Invalid credentials"}));
    }
    server.stop().await;

    assert!(sink.entries().is_empty());
}

#[tokio::test]
async fn malformed_envelopes_are_rejected_with_plain_text() {
    let sink = Arc::new(RecordingSink::default());
    let server = TestServer::start(sink.clone(), false).await;

    let bodies = [
        json!({"eventName": "other", "payload": {}}).to_string(),
        json!({"payload": {}}).to_string(),
        json!({"eventName": "spinnaker_events"}).to_string(),
        json!({"eventName": "spinnaker_events", "payload": null}).to_string(),
        "not json".to_string(),
    ];
    for body in bodies {
        let (status, text) = server.post(Some(basic(USER, PASS)), body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(text, MALFORMED_BODY);
    }
    server.stop().await;

    assert!(sink.entries().is_empty());
}

#[tokio::test]
async fn malformed_envelopes_are_not_payload_logged() {
    let sink = Arc::new(RecordingSink::default());
    let server = TestServer::start(sink.clone(), true).await;

    let bodies = [
        json!({"eventName": "other", "payload": {}}).to_string(),
        json!({"eventName": "spinnaker_events"}).to_string(),
        json!({"eventName": "spinnaker_events", "payload": null}).to_string(),
    ];
    for body in bodies {
        let (status, _) = server.post(Some(basic(USER, PASS)), body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
    server.stop().await;

    assert!(sink.entries().is_empty());
}

#[tokio::test]
async fn null_content_is_a_rendering_failure() {
    let sink = Arc::new(RecordingSink::default());
    let server = TestServer::start(sink.clone(), false).await;
    let body = envelope(json!({
        "details": {"source": "orca", "type": "orca:pipeline:complete", "created": 1},
        "content": null
    }));

    let (status, _) = server.post(Some(basic(USER, PASS)), body).await;
    server.stop().await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let entries = sink.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].severity, Severity::Error);
    assert_eq!(entries[0].payload.message, "missing field payload.content.execution");
}

#[tokio::test]
async fn null_stage_list_is_tolerated() {
    let sink = Arc::new(RecordingSink::default());
    let server = TestServer::start(sink.clone(), false).await;
    let body = envelope(json!({
        "details": {"source": "orca", "type": "orca:pipeline:complete", "created": 1_700_000_000_000_i64},
        "content": {"execution": {"name": "ship", "application": "shop", "stages": null}}
    }));

    let (status, _) = server.post(Some(basic(USER, PASS)), body).await;
    server.stop().await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(sink.entries().len(), 1);
}

#[tokio::test]
async fn wrongly_typed_payload_field_is_logged_at_error_and_returns_500() {
    let sink = Arc::new(RecordingSink::default());
    let server = TestServer::start(sink.clone(), true).await;
    let body = envelope(json!({
        "details": {"source": "orca", "type": "orca:pipeline:complete", "created": 1},
        "content": {"execution": {"name": "ship", "stages": "not a list"}}
    }));

    let (status, text) = server.post(Some(basic(USER, PASS)), body).await;
    server.stop().await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let text: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(text["code"], 500);

    let entries = sink.entries();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].severity, Severity::Debug);
    assert_eq!(entries[1].severity, Severity::Error);
    assert!(entries[1].payload.message.starts_with("payload has an unexpected shape"));
}

#[tokio::test]
async fn rendering_failure_is_logged_at_error_and_returns_500() {
    let sink = Arc::new(RecordingSink::default());
    let server = TestServer::start(sink.clone(), false).await;
    let body = envelope(json!({
        "details": {"source": "orca", "type": "orca:pipeline:complete", "created": 1},
        "content": {}
    }));

    let (status, text) = server.post(Some(basic(USER, PASS)), body).await;
    server.stop().await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let text: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(text["code"], 500);

    let entries = sink.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].severity, Severity::Error);
    assert!(entries[0].payload.message.contains("payload.content.execution"));
    assert_eq!(entries[0].payload.message, text["message"]);
}

#[tokio::test]
async fn sink_failure_returns_502() {
    let sink = Arc::new(RecordingSink::failing());
    let server = TestServer::start(sink.clone(), false).await;

    let (status, text) = server.post(Some(basic(USER, PASS)), pipeline_complete()).await;
    server.stop().await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    let text: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(text["code"], 502);
    // Only the failed write itself reaches the sink.
    assert_eq!(sink.entries().len(), 1);
}

#[tokio::test]
async fn payload_logging_writes_raw_body_at_debug_first() {
    let sink = Arc::new(RecordingSink::default());
    let server = TestServer::start(sink.clone(), true).await;
    let body = pipeline_complete();

    let (status, _) = server.post(Some(basic(USER, PASS)), body.clone()).await;
    server.stop().await;

    assert_eq!(status, StatusCode::OK);
    let entries = sink.entries();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].severity, Severity::Debug);
    assert_eq!(entries[0].payload.message, body);
    assert_eq!(entries[1].severity, Severity::Info);
}

#[tokio::test]
async fn health_check_does_not_touch_the_sink() {
    let sink = Arc::new(RecordingSink::default());
    let server = TestServer::start(sink.clone(), false).await;

    let (status, body) = server.get("/healthz").await;
    server.stop().await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(serde_json::from_str::<Value>(&body).unwrap(), json!({"status": "ok"}));
    assert!(sink.entries().is_empty());
}
