//! The inbound Spinnaker echo webhook envelope.
//!
//! Only the fields the classifier reads are modelled; everything else in the
//! (large) echo payload is ignored during deserialization. Every field is
//! optional because the shape of `payload.content` depends on the event
//! source and type.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::errors::{ClassifyError, EnvelopeError};
use crate::{BuildNumber, EpochMillis};

/// The `eventName` every audit webhook delivery must carry.
pub const EVENT_NAME: &str = "spinnaker_events";

/// Event sources with special handling.
pub mod sources {
    /// igor, Spinnaker's CI and container-registry integration.
    pub const IGOR: &str = "igor";
}

/// Event types the classifier recognises.
pub mod event_types {
    pub const BUILD: &str = "build";
    pub const DOCKER: &str = "docker";
    pub const GIT: &str = "git";
    pub const STAGE_STARTING: &str = "orca:stage:starting";
    pub const PIPELINE_STARTING: &str = "orca:pipeline:starting";
    pub const PIPELINE_FAILED: &str = "orca:pipeline:failed";
    pub const PIPELINE_COMPLETE: &str = "orca:pipeline:complete";
    pub const TASK_FAILED: &str = "orca:task:failed";
    pub const TASK_COMPLETE: &str = "orca:task:complete";
}

/// Stage types and statuses with special handling.
pub mod stages {
    pub const RUNNING: &str = "RUNNING";
    pub const MANUAL_JUDGMENT: &str = "manualJudgment";
    pub const SAVE_PIPELINE: &str = "savePipeline";
}

/// Jenkins build result treated as success.
pub const BUILD_SUCCESS: &str = "SUCCESS";

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// Top-level webhook body.
///
/// `payload` is kept as raw JSON until the event name has been checked, so a
/// body with the wrong sentinel is rejected as malformed regardless of what
/// its payload looks like.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub event_name: Option<String>,
    pub payload: Option<Value>,
}

impl Envelope {
    /// Parses a raw request body.
    pub fn from_slice(body: &[u8]) -> Result<Self, EnvelopeError> {
        Ok(serde_json::from_slice(body)?)
    }

    /// Validates the sentinel and the presence of a payload.
    ///
    /// The payload is returned undecoded; see [`EventPayload::from_value`].
    pub fn into_payload(self) -> Result<(String, Value), EnvelopeError> {
        let event_name = match self.event_name {
            Some(name) if name == EVENT_NAME => name,
            found => return Err(EnvelopeError::UnexpectedEventName { found }),
        };
        match self.payload {
            Some(Value::Null) | None => Err(EnvelopeError::MissingPayload),
            Some(raw) => Ok((event_name, raw)),
        }
    }
}

/// Deserializes an explicit `null` as the type's default.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// ---------------------------------------------------------------------------
// Payload
// ---------------------------------------------------------------------------

/// `payload`: event metadata plus source-specific content.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPayload {
    pub details: Option<EventDetails>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub content: EventContent,
}

impl EventPayload {
    /// Decodes a validated payload.
    ///
    /// Nulls are tolerated anywhere. A field of the wrong JSON type fails
    /// with [`ClassifyError::UnexpectedShape`], which is handled like any
    /// other rendering failure.
    pub fn from_value(raw: Value) -> Result<Self, ClassifyError> {
        serde_json::from_value(raw).map_err(|e| ClassifyError::UnexpectedShape {
            reason: e.to_string(),
        })
    }
}

/// `payload.details`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDetails {
    pub source: Option<String>,
    #[serde(rename = "type")]
    pub event_type: Option<String>,
    pub created: Option<EpochMillis>,
}

/// `payload.content`: a union of every shape the classifier reads.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventContent {
    pub execution: Option<Execution>,
    pub context: Option<StageContext>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub standalone: bool,

    // igor: Jenkins
    pub project: Option<BuildProject>,

    // igor: Docker registry
    pub tag: Option<String>,
    pub repository: Option<String>,
    pub registry: Option<String>,

    // VCS webhooks
    pub slug: Option<String>,
    pub repo_project: Option<String>,
    pub hash: Option<String>,
    pub branch: Option<String>,
}

// ---------------------------------------------------------------------------
// Pipeline executions
// ---------------------------------------------------------------------------

/// `payload.content.execution`: a pipeline or orchestration run.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Execution {
    pub name: Option<String>,
    pub application: Option<String>,
    pub description: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub canceled: bool,
    pub canceled_by: Option<String>,
    pub cancellation_reason: Option<String>,
    pub authentication: Option<Authentication>,
    pub trigger: Option<Trigger>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub stages: Vec<Stage>,
}

impl Execution {
    /// The first stage currently in the `RUNNING` state.
    pub fn running_stage(&self) -> Option<&Stage> {
        self.stages
            .iter()
            .find(|stage| stage.status.as_deref() == Some(stages::RUNNING))
    }
}

/// `execution.authentication`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Authentication {
    pub user: Option<String>,
}

/// `execution.trigger`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trigger {
    #[serde(rename = "type")]
    pub trigger_type: Option<String>,
    pub user: Option<String>,
    pub run_as_user: Option<String>,
    pub parameters: Option<Value>,
}

/// One entry of `execution.stages`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stage {
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub stage_type: Option<String>,
    pub status: Option<String>,
    pub synthetic_stage_owner: Option<String>,
}

/// `payload.content.context`: the stage/task context map.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageContext {
    pub reason: Option<String>,
    pub judgment_input: Option<String>,
    pub last_modified_by: Option<String>,
    pub exception: Option<TaskException>,
}

/// `context.exception`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskException {
    pub details: Option<ExceptionDetails>,
}

/// `context.exception.details`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExceptionDetails {
    #[serde(default, deserialize_with = "null_as_default")]
    pub errors: Vec<Value>,
}

// ---------------------------------------------------------------------------
// igor builds
// ---------------------------------------------------------------------------

/// `payload.content.project`: a Jenkins job.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildProject {
    pub name: Option<String>,
    pub last_build: Option<LastBuild>,
}

/// `project.lastBuild`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LastBuild {
    pub number: Option<BuildNumber>,
    pub result: Option<String>,
    pub timestamp: Option<EpochMillis>,
}
