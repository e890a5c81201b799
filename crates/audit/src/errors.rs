//! Error types for the audit domain.
//!
//! Each stage of request processing has its own error type so the listener
//! can map it onto the right HTTP status without inspecting messages:
//!
//! | Error | Produced by | Status |
//! |-------|-------------|--------|
//! | [`AuthError`] | [`crate::BasicAuthenticator::verify`] | 401 |
//! | [`EnvelopeError`] | [`crate::Envelope::from_slice`], [`crate::Envelope::into_payload`] | 400 |
//! | [`ClassifyError`] | [`crate::EventPayload::from_value`], [`crate::classify`] | 500 |
//! | [`SinkError`] | [`crate::AuditSink::write`] implementations | 502 |

use thiserror::Error;

// ---------------------------------------------------------------------------
// Authentication
// ---------------------------------------------------------------------------

/// The `Authorization` header did not carry the configured Basic credentials.
///
/// Deliberately carries no detail about *why* verification failed; the reason
/// is logged at debug level by the authenticator instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid credentials")]
pub struct AuthError;

impl AuthError {
    /// HTTP status code reported to the caller.
    pub const CODE: u16 = 401;
}

// ---------------------------------------------------------------------------
// Envelope validation
// ---------------------------------------------------------------------------

/// The request body is not a Spinnaker audit envelope.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    /// `eventName` is missing or is not the expected sentinel.
    #[error("unexpected event name {found:?}")]
    UnexpectedEventName {
        /// The event name that was received, if any.
        found: Option<String>,
    },

    /// The envelope has no `payload`.
    #[error("envelope has no payload")]
    MissingPayload,

    /// The body is not a JSON object with the envelope fields.
    #[error("envelope is not valid JSON of the expected shape: {0}")]
    Shape(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// The event could not be turned into a message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClassifyError {
    /// A field required by the matched template is absent.
    #[error("missing field {path}")]
    MissingField {
        /// Dotted JSON path of the absent field, e.g. `payload.content.execution.name`.
        path: &'static str,
    },

    /// An epoch value cannot be represented as a calendar date.
    #[error("timestamp {millis} at {path} is out of range")]
    InvalidTimestamp {
        /// Dotted JSON path of the offending field.
        path: &'static str,
        /// The raw millisecond value.
        millis: i64,
    },

    /// The payload passed envelope validation but a field has the wrong JSON type.
    #[error("payload has an unexpected shape: {reason}")]
    UnexpectedShape { reason: String },
}

impl ClassifyError {
    /// HTTP status code reported to the caller.
    pub const CODE: u16 = 500;
}

// ---------------------------------------------------------------------------
// Sink
// ---------------------------------------------------------------------------

/// Writing an entry to the audit sink failed.
#[derive(Debug, Error)]
pub enum SinkError {
    /// Obtaining credentials for the sink failed.
    #[error("sink credentials unavailable: {0}")]
    Credentials(String),

    /// The request could not be delivered (DNS, TLS, connection reset, I/O).
    #[error("sink transport failure: {0}")]
    Transport(String),

    /// The sink answered with a non-success status.
    #[error("sink rejected entry with status {status}: {body}")]
    Rejected {
        /// HTTP status returned by the sink.
        status: u16,
        /// Response body, for diagnostics.
        body: String,
    },
}

impl SinkError {
    /// HTTP status code reported to the webhook caller.
    pub const CODE: u16 = 502;
}

// ---------------------------------------------------------------------------
// Configuration values
// ---------------------------------------------------------------------------

/// A timezone name that is not in the IANA database.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown IANA timezone {name:?}")]
pub struct InvalidTimezone {
    /// The rejected name.
    pub name: String,
}
