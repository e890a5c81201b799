//! [`AuditSink`] over the Cloud Logging REST API (`entries:write`).

use std::sync::Arc;

use async_trait::async_trait;
use audit::{AuditSink, EntryPayload, LogEntry, LogName, ProjectId, Severity, SinkError, RESOURCE_TYPE};
use serde::Serialize;

use crate::token::TokenSource;

/// Production Cloud Logging endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://logging.googleapis.com";

/// Where entries are written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudLoggingSettings {
    pub project_id: ProjectId,
    pub log_name: LogName,
    /// Base URL, without a trailing slash.
    pub endpoint: String,
}

impl CloudLoggingSettings {
    pub fn new(project_id: ProjectId, log_name: LogName) -> Self {
        Self {
            project_id,
            log_name,
            endpoint: DEFAULT_ENDPOINT.to_string(),
        }
    }

    /// Fully qualified log resource name; the log id is URL-encoded.
    pub fn log_resource_name(&self) -> String {
        format!(
            "projects/{}/logs/{}",
            self.project_id,
            self.log_name.as_str().replace('/', "%2F")
        )
    }
}

// ---------------------------------------------------------------------------
// Wire format
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WriteEntriesRequest<'a> {
    log_name: &'a str,
    resource: MonitoredResource<'a>,
    entries: [WireEntry<'a>; 1],
}

#[derive(Debug, Serialize)]
struct MonitoredResource<'a> {
    #[serde(rename = "type")]
    resource_type: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireEntry<'a> {
    severity: Severity,
    json_payload: &'a EntryPayload,
}

// ---------------------------------------------------------------------------
// Sink
// ---------------------------------------------------------------------------

/// Writes each entry with one `entries:write` call.
pub struct CloudLoggingSink {
    client: reqwest::Client,
    settings: CloudLoggingSettings,
    log_resource_name: String,
    tokens: Arc<dyn TokenSource>,
}

impl CloudLoggingSink {
    pub fn new(
        client: reqwest::Client,
        settings: CloudLoggingSettings,
        tokens: Arc<dyn TokenSource>,
    ) -> Self {
        let log_resource_name = settings.log_resource_name();
        Self {
            client,
            settings,
            log_resource_name,
            tokens,
        }
    }

    pub fn settings(&self) -> &CloudLoggingSettings {
        &self.settings
    }
}

impl std::fmt::Debug for CloudLoggingSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudLoggingSink")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl AuditSink for CloudLoggingSink {
    async fn write(&self, entry: LogEntry) -> Result<(), SinkError> {
        let token = self.tokens.token().await?;
        let request = WriteEntriesRequest {
            log_name: &self.log_resource_name,
            resource: MonitoredResource {
                resource_type: RESOURCE_TYPE,
            },
            entries: [WireEntry {
                severity: entry.severity,
                json_payload: &entry.payload,
            }],
        };

        let response = self
            .client
            .post(format!("{}/v2/entries:write", self.settings.endpoint))
            .bearer_auth(&token.value)
            .json(&request)
            .send()
            .await
            .map_err(|e| SinkError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SinkError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        tracing::debug!(
            log_name = %self.log_resource_name,
            severity = %entry.severity,
            "Audit entry written to Cloud Logging"
        );
        Ok(())
    }
}
