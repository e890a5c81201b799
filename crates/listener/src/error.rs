//! Mapping of processing failures onto HTTP responses.

use audit::{AuthError, ClassifyError, EnvelopeError, SinkError};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Body returned for a malformed envelope.
pub const MALFORMED_BODY: &str = "Spinnaker audit log request body is malformed.";

/// Any reason a webhook delivery was not acknowledged with 200.
#[derive(Debug, Error)]
pub enum WebhookError {
    /// Wrong or missing Basic credentials. Nothing was classified or logged.
    #[error(transparent)]
    Unauthorized(#[from] AuthError),

    /// The body is not a Spinnaker audit envelope. Nothing was logged.
    #[error("Spinnaker audit log request body is malformed.")]
    Malformed(#[from] EnvelopeError),

    /// A rule matched but its message could not be rendered.
    #[error(transparent)]
    Classify(#[from] ClassifyError),

    /// The audit sink did not accept the entry.
    #[error(transparent)]
    Sink(#[from] SinkError),
}

impl WebhookError {
    pub fn status(&self) -> StatusCode {
        let code = match self {
            Self::Unauthorized(_) => AuthError::CODE,
            Self::Malformed(_) => 400,
            Self::Classify(_) => ClassifyError::CODE,
            Self::Sink(_) => SinkError::CODE,
        };
        StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

/// JSON body for error responses other than the malformed-body case.
#[derive(Debug, Serialize)]
struct ErrorBody {
    code: u16,
    message: String,
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            Self::Malformed(reason) => {
                tracing::warn!(%reason, "Rejecting malformed audit webhook body");
                (status, MALFORMED_BODY).into_response()
            }
            Self::Unauthorized(_) => {
                tracing::warn!("Rejecting audit webhook with invalid credentials");
                error_body(status, &self)
            }
            Self::Classify(_) | Self::Sink(_) => error_body(status, &self),
        }
    }
}

fn error_body(status: StatusCode, error: &WebhookError) -> Response {
    let body = ErrorBody {
        code: status.as_u16(),
        message: error.to_string(),
    };
    (status, Json(body)).into_response()
}
