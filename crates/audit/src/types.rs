//! Shared value types for the audit domain.
//!
//! Unlike the newtype identifiers in [`crate::identifiers`], these types carry
//! meaningful values with invariants (a timezone is always a known IANA zone,
//! an epoch value is always an integral millisecond count) and participate in
//! message rendering.

use std::str::FromStr;

use chrono::TimeZone;
use chrono_tz::Tz;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};

use crate::errors::InvalidTimezone;
use crate::{ApplicationName, PipelineName};

// ---------------------------------------------------------------------------
// Severity
// ---------------------------------------------------------------------------

/// Severity attached to an audit entry.
///
/// Mirrors the Cloud Logging `LogSeverity` names so entries can be forwarded
/// verbatim. [`Severity::Info`] is the default for every message that does
/// not state otherwise.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    /// No assigned severity.
    Default,
    /// Debug or trace information, e.g. the raw inbound payload.
    Debug,
    /// Routine information: starts, completions, successful builds.
    #[default]
    Info,
    /// Normal but significant events.
    Notice,
    /// Cancellations and stop judgments.
    Warning,
    /// Failures.
    Error,
    /// Critical events.
    Critical,
    /// A person must take action immediately.
    Alert,
    /// One or more systems are unusable.
    Emergency,
}

impl Severity {
    /// Returns the Cloud Logging name of this severity.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Default => "DEFAULT",
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Notice => "NOTICE",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
            Self::Critical => "CRITICAL",
            Self::Alert => "ALERT",
            Self::Emergency => "EMERGENCY",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Audit message
// ---------------------------------------------------------------------------

/// A rendered audit message, ready to be handed to an [`crate::AuditSink`].
///
/// `application` and `pipeline` are only present when the event names them
/// and the rule that produced the message attaches them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditMessage {
    /// Human-readable sentence describing the event.
    pub text: String,
    /// Spinnaker application the event belongs to.
    pub application: Option<ApplicationName>,
    /// Spinnaker pipeline the event belongs to.
    pub pipeline: Option<PipelineName>,
    /// Severity of the entry.
    pub severity: Severity,
}

impl AuditMessage {
    /// Creates a message with [`Severity::Info`] and no application/pipeline context.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            application: None,
            pipeline: None,
            severity: Severity::default(),
        }
    }

    /// Replaces the severity.
    #[must_use]
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    /// Attaches application and pipeline context. Empty names are dropped.
    #[must_use]
    pub fn with_context(mut self, application: Option<&str>, pipeline: Option<&str>) -> Self {
        self.application = application.and_then(ApplicationName::new);
        self.pipeline = pipeline.and_then(PipelineName::new);
        self
    }
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// Milliseconds since the Unix epoch, as carried by Spinnaker and Jenkins.
///
/// Deserializes from a JSON integer, a float, or a numeric string; echo sends
/// `created` as a number while igor forwards Jenkins' `timestamp` verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct EpochMillis(i64);

impl EpochMillis {
    /// Creates an [`EpochMillis`] from a raw millisecond count.
    pub const fn new(millis: i64) -> Self {
        Self(millis)
    }

    /// Returns the underlying millisecond count.
    pub fn as_i64(self) -> i64 {
        self.0
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawEpoch {
    Int(i64),
    Float(f64),
    Text(String),
}

impl<'de> Deserialize<'de> for EpochMillis {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match RawEpoch::deserialize(deserializer)? {
            RawEpoch::Int(v) => Ok(Self(v)),
            RawEpoch::Float(v) if v.is_finite() => Ok(Self(v as i64)),
            RawEpoch::Float(v) => Err(D::Error::custom(format!("non-finite epoch value {v}"))),
            RawEpoch::Text(s) => s
                .trim()
                .parse::<i64>()
                .map(Self)
                .map_err(|e| D::Error::custom(format!("invalid epoch value {s:?}: {e}"))),
        }
    }
}

impl std::fmt::Display for EpochMillis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------

/// `strftime` layout used for every timestamp in an audit message,
/// e.g. `Tue, 14 Nov 2023 14:13:20 PST`.
pub const TIMESTAMP_FORMAT: &str = "%a, %d %b %Y %H:%M:%S %Z";

/// The IANA timezone audit timestamps are rendered in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Timezone(Tz);

impl Timezone {
    /// Coordinated Universal Time.
    pub const UTC: Self = Self(Tz::UTC);

    /// Returns the IANA name of this zone (e.g. `"America/Los_Angeles"`).
    pub fn name(&self) -> &'static str {
        self.0.name()
    }

    /// Renders `at` in this zone using [`TIMESTAMP_FORMAT`].
    ///
    /// Returns `None` when the value lies outside the range chrono can represent.
    pub fn format(&self, at: EpochMillis) -> Option<String> {
        self.0
            .timestamp_millis_opt(at.as_i64())
            .single()
            .map(|dt| dt.format(TIMESTAMP_FORMAT).to_string())
    }
}

impl Default for Timezone {
    fn default() -> Self {
        Self::UTC
    }
}

impl FromStr for Timezone {
    type Err = InvalidTimezone;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        name.parse::<Tz>().map(Self).map_err(|_| InvalidTimezone {
            name: name.to_string(),
        })
    }
}

impl TryFrom<String> for Timezone {
    type Error = InvalidTimezone;

    fn try_from(name: String) -> Result<Self, Self::Error> {
        name.parse()
    }
}

impl From<Timezone> for String {
    fn from(tz: Timezone) -> Self {
        tz.name().to_string()
    }
}

impl std::fmt::Display for Timezone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
