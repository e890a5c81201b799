//! The `POST /` webhook handler and the health probe.

use audit::{classify, AuditMessage, ClassifyError, Envelope, EventPayload, LogEntry, RequestId, Severity};
use axum::{
    body::Bytes,
    extract::State,
    http::{header::AUTHORIZATION, HeaderMap},
    Json,
};
use serde_json::{json, Value};
use tracing::field::Empty;

use crate::error::WebhookError;
use crate::state::WebhookState;

/// Authenticates, parses, classifies, and forwards one Echo event.
///
/// Processing stops at the first failing step: credentials (401), envelope
/// shape (400), payload decoding or message rendering (500), sink write (502).
/// An event that no rule recognises is acknowledged without writing anything.
#[tracing::instrument(
    skip_all,
    fields(
        request_id = %RequestId::new_random(),
        source = Empty,
        event_type = Empty,
    )
)]
pub async fn receive_event(
    State(state): State<WebhookState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<String, WebhookError> {
    let authorization = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    state.authenticator.verify(authorization)?;

    let (event_name, raw) = Envelope::from_slice(&body)?.into_payload()?;

    if state.log_request_payloads {
        let body = String::from_utf8_lossy(&body);
        if let Err(error) = state.sink.write(LogEntry::plain(Severity::Debug, body)).await {
            tracing::warn!(%error, "Failed to write request payload to audit log");
        }
    }

    match render(raw, &state) {
        Ok(Some(message)) => {
            tracing::info!(
                application = message.application.as_ref().map(|a| a.as_str()),
                pipeline = message.pipeline.as_ref().map(|p| p.as_str()),
                "Writing audit message"
            );
            state.sink.write(message.into()).await?;
        }
        Ok(None) => {
            tracing::debug!("Event not audited");
        }
        Err(error) => {
            tracing::error!(%error, "Failed to render audit message");
            let entry = LogEntry::plain(Severity::Error, error.to_string());
            if let Err(sink_error) = state.sink.write(entry).await {
                tracing::error!(error = %sink_error, "Failed to write classification error to audit log");
            }
            return Err(error.into());
        }
    }

    Ok(format!("Success: {event_name}"))
}

/// Decodes the payload, tags the current span with its source and type, and
/// classifies it.
fn render(raw: Value, state: &WebhookState) -> Result<Option<AuditMessage>, ClassifyError> {
    let payload = EventPayload::from_value(raw)?;

    let span = tracing::Span::current();
    if let Some(details) = &payload.details {
        if let Some(source) = &details.source {
            span.record("source", source.as_str());
        }
        if let Some(event_type) = &details.event_type {
            span.record("event_type", event_type.as_str());
        }
    }

    classify(&payload, state.timezone)
}

/// Liveness probe. Does not touch the sink.
pub async fn healthz() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
