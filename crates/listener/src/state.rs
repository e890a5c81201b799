//! Shared request state.

use std::sync::Arc;

use audit::{AuditSink, BasicAuthenticator, Timezone};

/// Everything a webhook delivery needs. Cloned per request by axum.
#[derive(Clone)]
pub struct WebhookState {
    pub(crate) authenticator: Arc<BasicAuthenticator>,
    pub(crate) timezone: Timezone,
    pub(crate) sink: Arc<dyn AuditSink>,
    pub(crate) log_request_payloads: bool,
}

impl WebhookState {
    pub fn new(
        authenticator: BasicAuthenticator,
        timezone: Timezone,
        sink: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            authenticator: Arc::new(authenticator),
            timezone,
            sink,
            log_request_payloads: false,
        }
    }

    /// When enabled, every authenticated body is also written to the sink at
    /// `DEBUG` severity before classification.
    pub fn with_payload_logging(mut self, enabled: bool) -> Self {
        self.log_request_payloads = enabled;
        self
    }
}

impl std::fmt::Debug for WebhookState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookState")
            .field("timezone", &self.timezone.name())
            .field("log_request_payloads", &self.log_request_payloads)
            .finish_non_exhaustive()
    }
}
