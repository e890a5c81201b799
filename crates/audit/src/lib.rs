//! Core domain for the Spinnaker audit log webhook.
//!
//! This crate turns a Spinnaker echo webhook delivery into an audit entry:
//! it models the envelope, verifies the Basic credentials echo sends, and
//! classifies each event against an ordered table of message templates.
//! Infrastructure crates implement [`AuditSink`]; they never add
//! classification rules.
//!
//! ## Architectural Layer
//!
//! **Business logic + port definitions.** This crate has no I/O dependencies.
//! It defines *what* is logged; infrastructure crates define *where*.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`envelope`] | Inbound webhook model and well-known source/type names |
//! | [`classify`] | The ordered decision table and message renderers |
//! | [`auth`] | Basic-auth verification |
//! | [`sink`] | The [`AuditSink`] port and [`LogEntry`] |
//! | [`identifiers`] | Newtype names (`ApplicationName`, `LogName`, etc.) |
//! | [`types`] | Value types (`Severity`, `AuditMessage`, `Timezone`, etc.) |
//! | [`errors`] | Error types, one per processing stage |

pub mod auth;
pub mod classify;
pub mod envelope;
pub mod errors;
pub mod identifiers;
pub mod sink;
pub mod types;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use auth::{BasicAuthenticator, Credentials};
pub use classify::classify;
pub use envelope::{Envelope, EventPayload, EVENT_NAME};
pub use errors::{AuthError, ClassifyError, EnvelopeError, InvalidTimezone, SinkError};
pub use identifiers::{ApplicationName, BuildNumber, LogName, PipelineName, ProjectId, RequestId};
pub use sink::{AuditSink, EntryPayload, LogEntry, RESOURCE_TYPE};
pub use types::{AuditMessage, EpochMillis, Severity, Timezone, TIMESTAMP_FORMAT};
