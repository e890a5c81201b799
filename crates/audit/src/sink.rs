//! The audit sink port.
//!
//! The listener hands every rendered [`AuditMessage`] to an [`AuditSink`].
//! Infrastructure crates decide where entries go (the Cloud Logging API,
//! structured stdout, an in-memory recorder in tests); the sink also owns the
//! log name and monitored-resource type, so entries carry only what varies per
//! request.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::SinkError;
use crate::{ApplicationName, AuditMessage, PipelineName, Severity};

/// Monitored-resource type every audit entry is filed under.
pub const RESOURCE_TYPE: &str = "cloud_function";

/// The structured body of an audit entry (Cloud Logging `jsonPayload`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryPayload {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application: Option<ApplicationName>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipeline: Option<PipelineName>,
}

/// One entry to be written to the audit log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub severity: Severity,
    pub payload: EntryPayload,
}

impl LogEntry {
    /// An entry with no application/pipeline context.
    pub fn plain(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            payload: EntryPayload {
                message: message.into(),
                application: None,
                pipeline: None,
            },
        }
    }
}

impl From<AuditMessage> for LogEntry {
    fn from(message: AuditMessage) -> Self {
        Self {
            severity: message.severity,
            payload: EntryPayload {
                message: message.text,
                application: message.application,
                pipeline: message.pipeline,
            },
        }
    }
}

/// Destination for audit entries.
///
/// Implementations must be safe to share across concurrent requests.
/// A returned error means the entry was not accepted; callers do not retry.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Writes one entry.
    async fn write(&self, entry: LogEntry) -> Result<(), SinkError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_context_is_omitted_from_json() {
        let entry = LogEntry::plain(Severity::Error, "boom");
        let json = serde_json::to_value(&entry.payload).unwrap();
        assert_eq!(json, serde_json::json!({"message": "boom"}));
    }

    #[test]
    fn message_context_is_carried_over() {
        let entry: LogEntry = AuditMessage::new("done")
            .with_severity(Severity::Warning)
            .with_context(Some("shop"), Some("deploy"))
            .into();
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "severity": "WARNING",
                "payload": {"message": "done", "application": "shop", "pipeline": "deploy"}
            })
        );
    }
}
