//! Structured stdout sink.
//!
//! Prints one JSON object per line. Cloud Functions and Cloud Run ingest such
//! lines as structured log entries (picking up `severity` and `message`), so
//! this sink is also usable in production without API credentials.

use async_trait::async_trait;
use audit::{ApplicationName, AuditSink, LogEntry, LogName, PipelineName, Severity, SinkError};
use serde::Serialize;
use tokio::io::{AsyncWriteExt, Stdout};
use tokio::sync::Mutex;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StdoutLine<'a> {
    severity: Severity,
    message: &'a str,
    log_name: &'a LogName,
    #[serde(skip_serializing_if = "Option::is_none")]
    application: Option<&'a ApplicationName>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pipeline: Option<&'a PipelineName>,
}

/// Writes entries to stdout as JSON lines.
///
/// Lines from concurrent requests never interleave.
#[derive(Debug)]
pub struct StdoutSink {
    log_name: LogName,
    out: Mutex<Stdout>,
}

impl StdoutSink {
    pub fn new(log_name: LogName) -> Self {
        Self {
            log_name,
            out: Mutex::new(tokio::io::stdout()),
        }
    }

    fn render(&self, entry: &LogEntry) -> Result<String, SinkError> {
        let line = StdoutLine {
            severity: entry.severity,
            message: &entry.payload.message,
            log_name: &self.log_name,
            application: entry.payload.application.as_ref(),
            pipeline: entry.payload.pipeline.as_ref(),
        };
        serde_json::to_string(&line).map_err(|e| SinkError::Transport(e.to_string()))
    }
}

#[async_trait]
impl AuditSink for StdoutSink {
    async fn write(&self, entry: LogEntry) -> Result<(), SinkError> {
        let mut line = self.render(&entry)?;
        line.push('\n');
        let mut out = self.out.lock().await;
        out.write_all(line.as_bytes())
            .await
            .map_err(|e| SinkError::Transport(e.to_string()))?;
        out.flush().await.map_err(|e| SinkError::Transport(e.to_string()))
    }
}
