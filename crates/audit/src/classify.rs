//! Event classification: turning one echo event into zero or one audit message.
//!
//! Classification is an ordered table of [`Rule`]s. Conditions overlap (a
//! manual-judgment task failure is also a task failure; an igor `git` event is
//! also a `git` event), so the first rule whose predicate matches wins and the
//! order of [`RULES`] is significant.
//!
//! Predicates never fail: absent data simply does not match. Renderers fail
//! with [`ClassifyError::MissingField`] when the matched template needs a field
//! the event does not carry.

use serde_json::Value;

use crate::envelope::{
    event_types, sources, stages, EventContent, EventPayload, Execution, Stage, StageContext,
    BUILD_SUCCESS,
};
use crate::errors::ClassifyError;
use crate::{AuditMessage, EpochMillis, Severity, Timezone};

/// Classifies `payload` and renders its audit message, if any.
///
/// Returns `Ok(None)` when no rule applies; such events are acknowledged but
/// not logged.
pub fn classify(
    payload: &EventPayload,
    timezone: Timezone,
) -> Result<Option<AuditMessage>, ClassifyError> {
    let event = Event::new(payload, timezone)?;

    match RULES.iter().find(|rule| (rule.applies)(&event)) {
        Some(rule) => {
            tracing::debug!(
                rule = rule.name,
                source = event.source,
                event_type = event.event_type,
                "Audit rule matched"
            );
            (rule.render)(&event)
        }
        None => {
            tracing::debug!(
                source = event.source,
                event_type = event.event_type,
                "No audit rule matched"
            );
            Ok(None)
        }
    }
}

// ---------------------------------------------------------------------------
// Rule table
// ---------------------------------------------------------------------------

type Render = fn(&Event<'_>) -> Result<Option<AuditMessage>, ClassifyError>;

/// One row of the decision table.
struct Rule {
    name: &'static str,
    applies: fn(&Event<'_>) -> bool,
    render: Render,
}

/// The decision table, in evaluation order.
static RULES: &[Rule] = &[
    Rule {
        name: "jenkins_build_succeeded",
        applies: |e| e.from_igor() && e.is(event_types::BUILD) && e.build_succeeded(),
        render: jenkins_build_succeeded,
    },
    Rule {
        name: "jenkins_build_finished",
        applies: |e| e.from_igor() && e.is(event_types::BUILD),
        render: jenkins_build_finished,
    },
    Rule {
        name: "docker_tag_pushed",
        applies: |e| e.from_igor() && e.is(event_types::DOCKER),
        render: docker_tag_pushed,
    },
    // igor events of any other type are acknowledged without a message and
    // must not fall through to the source-agnostic rules below.
    Rule {
        name: "igor_ignored",
        applies: |e| e.from_igor(),
        render: |_| Ok(None),
    },
    Rule {
        name: "vcs_push",
        applies: |e| e.is(event_types::GIT),
        render: vcs_push,
    },
    Rule {
        name: "stage_starting",
        applies: |e| {
            e.is(event_types::STAGE_STARTING)
                && e.running_stage
                    .and_then(|stage| present(&stage.synthetic_stage_owner))
                    .is_none()
        },
        render: stage_starting,
    },
    Rule {
        name: "pipeline_starting",
        applies: |e| e.is(event_types::PIPELINE_STARTING),
        render: pipeline_starting,
    },
    Rule {
        name: "pipeline_canceled",
        applies: |e| {
            e.is(event_types::PIPELINE_FAILED) && e.execution.is_some_and(|x| x.canceled)
        },
        render: pipeline_canceled,
    },
    Rule {
        name: "pipeline_complete",
        applies: |e| e.is(event_types::PIPELINE_COMPLETE),
        render: pipeline_complete,
    },
    Rule {
        name: "judgment_stopped",
        applies: |e| e.is(event_types::TASK_FAILED) && e.awaits_judgment(),
        render: |e| judged(e, Verdict::Stop),
    },
    Rule {
        name: "judgment_continued",
        applies: |e| e.is(event_types::TASK_COMPLETE) && e.awaits_judgment(),
        render: |e| judged(e, Verdict::Continue),
    },
    Rule {
        name: "task_failed",
        applies: |e| e.is(event_types::TASK_FAILED),
        render: task_failed,
    },
];

// ---------------------------------------------------------------------------
// Event view
// ---------------------------------------------------------------------------

/// Borrowed view over a payload with the derived values every rule needs.
struct Event<'a> {
    source: &'a str,
    event_type: &'a str,
    created: Option<EpochMillis>,
    content: &'a EventContent,
    execution: Option<&'a Execution>,
    running_stage: Option<&'a Stage>,
    timezone: Timezone,
}

impl<'a> Event<'a> {
    fn new(payload: &'a EventPayload, timezone: Timezone) -> Result<Self, ClassifyError> {
        let details = require(payload.details.as_ref(), "payload.details")?;
        let execution = payload.content.execution.as_ref();
        Ok(Self {
            source: details.source.as_deref().unwrap_or_default(),
            event_type: details.event_type.as_deref().unwrap_or_default(),
            created: details.created,
            content: &payload.content,
            execution,
            running_stage: execution.and_then(Execution::running_stage),
            timezone,
        })
    }

    fn is(&self, event_type: &str) -> bool {
        self.event_type == event_type
    }

    fn from_igor(&self) -> bool {
        self.source == sources::IGOR
    }

    fn build_succeeded(&self) -> bool {
        self.content
            .project
            .as_ref()
            .and_then(|p| p.last_build.as_ref())
            .is_some_and(|b| b.result.as_deref() == Some(BUILD_SUCCESS))
    }

    /// True for a pipeline-attached manual-judgment stage with a task context.
    fn awaits_judgment(&self) -> bool {
        !self.content.standalone
            && self.content.context.is_some()
            && self.running_stage.and_then(|s| s.stage_type.as_deref())
                == Some(stages::MANUAL_JUDGMENT)
    }

    fn context(&self) -> Option<&'a StageContext> {
        self.content.context.as_ref()
    }

    fn execution(&self) -> Result<&'a Execution, ClassifyError> {
        require(self.execution, "payload.content.execution")
    }

    fn stage(&self) -> Result<&'a Stage, ClassifyError> {
        require(self.running_stage, "payload.content.execution.stages[status=RUNNING]")
    }

    /// The acting user: `trigger.runAsUser`, else `trigger.user`, else
    /// `authentication.user`, else `"n/a"`.
    fn user(&self) -> &'a str {
        let trigger = self.execution.and_then(|x| x.trigger.as_ref());
        trigger
            .and_then(|t| present(&t.run_as_user))
            .or_else(|| trigger.and_then(|t| present(&t.user)))
            .or_else(|| {
                self.execution
                    .and_then(|x| x.authentication.as_ref())
                    .and_then(|a| present(&a.user))
            })
            .unwrap_or("n/a")
    }

    /// `payload.details.created`, rendered in the configured zone.
    fn created_at(&self) -> Result<String, ClassifyError> {
        self.format_time(self.created, "payload.details.created")
    }

    fn format_time(
        &self,
        at: Option<EpochMillis>,
        path: &'static str,
    ) -> Result<String, ClassifyError> {
        let at = require(at.as_ref(), path)?;
        self.timezone
            .format(*at)
            .ok_or(ClassifyError::InvalidTimestamp {
                path,
                millis: at.as_i64(),
            })
    }
}

/// Execution fields shared by every pipeline-scoped message.
struct PipelineRef<'a> {
    name: &'a str,
    application: &'a str,
}

impl<'a> PipelineRef<'a> {
    fn of(execution: &'a Execution) -> Result<Self, ClassifyError> {
        Ok(Self {
            name: require(execution.name.as_deref(), "payload.content.execution.name")?,
            application: require(
                execution.application.as_deref(),
                "payload.content.execution.application",
            )?,
        })
    }

    fn attach(&self, message: AuditMessage) -> AuditMessage {
        message.with_context(Some(self.application), Some(self.name))
    }
}

// ---------------------------------------------------------------------------
// Renderers
// ---------------------------------------------------------------------------

fn jenkins_build_succeeded(e: &Event<'_>) -> Result<Option<AuditMessage>, ClassifyError> {
    let (project, number, at) = jenkins_build_fields(e)?;
    Ok(Some(AuditMessage::new(format!(
        "Jenkins project {project} successfully completed build #{number} at {at}."
    ))))
}

fn jenkins_build_finished(e: &Event<'_>) -> Result<Option<AuditMessage>, ClassifyError> {
    let (project, number, at) = jenkins_build_fields(e)?;
    let result = e
        .content
        .project
        .as_ref()
        .and_then(|p| p.last_build.as_ref())
        .and_then(|b| b.result.as_deref());
    let result = require(result, "payload.content.project.lastBuild.result")?;
    Ok(Some(
        AuditMessage::new(format!(
            "Jenkins project {project} completed build #{number} with status {result} at {at}."
        ))
        .with_severity(Severity::Error),
    ))
}

/// Project name, build number, and formatted build timestamp.
fn jenkins_build_fields<'a>(
    e: &Event<'a>,
) -> Result<(&'a str, crate::BuildNumber, String), ClassifyError> {
    let project = require(e.content.project.as_ref(), "payload.content.project")?;
    let build = require(
        project.last_build.as_ref(),
        "payload.content.project.lastBuild",
    )?;
    let name = require(project.name.as_deref(), "payload.content.project.name")?;
    let number = *require(
        build.number.as_ref(),
        "payload.content.project.lastBuild.number",
    )?;
    let at = e.format_time(build.timestamp, "payload.content.project.lastBuild.timestamp")?;
    Ok((name, number, at))
}

fn docker_tag_pushed(e: &Event<'_>) -> Result<Option<AuditMessage>, ClassifyError> {
    let c = e.content;
    let tag = require(c.tag.as_deref(), "payload.content.tag")?;
    let repository = require(c.repository.as_deref(), "payload.content.repository")?;
    let registry = require(c.registry.as_deref(), "payload.content.registry")?;
    let at = e.created_at()?;
    Ok(Some(AuditMessage::new(format!(
        "Docker tag {tag} was pushed to repository {repository} in registry {registry} at {at}."
    ))))
}

fn vcs_push(e: &Event<'_>) -> Result<Option<AuditMessage>, ClassifyError> {
    let c = e.content;
    let slug = require(c.slug.as_deref(), "payload.content.slug")?;
    let org = require(c.repo_project.as_deref(), "payload.content.repoProject")?;
    let hash = require(c.hash.as_deref(), "payload.content.hash")?;
    let branch = require(c.branch.as_deref(), "payload.content.branch")?;
    let at = e.created_at()?;
    Ok(Some(AuditMessage::new(format!(
        "Received webhook for project {slug} in org {org} from {source} at commit {hash} on branch {branch} at {at}.",
        source = e.source,
    ))))
}

fn stage_starting(e: &Event<'_>) -> Result<Option<AuditMessage>, ClassifyError> {
    let execution = e.execution()?;
    let user = e.user();
    let at = e.created_at()?;

    if !e.content.standalone {
        let stage = e.stage()?;
        let stage_name = require(
            stage.name.as_deref(),
            "payload.content.execution.stages[status=RUNNING].name",
        )?;
        let stage_type = require(
            stage.stage_type.as_deref(),
            "payload.content.execution.stages[status=RUNNING].type",
        )?;
        let pipeline = PipelineRef::of(execution)?;
        return Ok(Some(pipeline.attach(AuditMessage::new(format!(
            "User {user} executed operation {stage_name} (of type {stage_type}) via pipeline {} of application {} at {at}.",
            pipeline.name, pipeline.application,
        )))));
    }

    let description = require(
        execution.description.as_deref(),
        "payload.content.execution.description",
    )?;

    let running_type = e.running_stage.and_then(|s| s.stage_type.as_deref());
    if running_type == Some(stages::SAVE_PIPELINE) {
        return Ok(Some(AuditMessage::new(format!(
            "User {user} executed operation ({description}) at {at}."
        ))));
    }

    let first_type = require(
        execution.stages.first().and_then(|s| s.stage_type.as_deref()),
        "payload.content.execution.stages[0].type",
    )?;
    let reason = reason_segment(e.context().and_then(|c| present(&c.reason)));
    Ok(Some(AuditMessage::new(format!(
        "User {user} executed ad-hoc operation {first_type} ({description}){reason} at {at}."
    ))))
}

fn pipeline_starting(e: &Event<'_>) -> Result<Option<AuditMessage>, ClassifyError> {
    let execution = e.execution()?;
    let trigger = require(execution.trigger.as_ref(), "payload.content.execution.trigger")?;
    let trigger_type = require(
        trigger.trigger_type.as_deref(),
        "payload.content.execution.trigger.type",
    )?;
    let parameters = match trigger.parameters.as_ref() {
        Some(params) if is_truthy(params) => format!(" (with parameters {params})"),
        _ => String::new(),
    };
    let pipeline = PipelineRef::of(execution)?;
    let at = e.created_at()?;
    Ok(Some(pipeline.attach(AuditMessage::new(format!(
        "User {user} executed pipeline {} of application {} via {trigger_type} trigger{parameters} at {at}.",
        pipeline.name,
        pipeline.application,
        user = e.user(),
    )))))
}

fn pipeline_canceled(e: &Event<'_>) -> Result<Option<AuditMessage>, ClassifyError> {
    let execution = e.execution()?;
    let pipeline = PipelineRef::of(execution)?;
    let at = e.created_at()?;

    let message = match present(&execution.canceled_by) {
        Some(canceled_by) => {
            let reason = reason_segment(present(&execution.cancellation_reason));
            AuditMessage::new(format!(
                "User {canceled_by} canceled pipeline {} of application {}{reason} at {at}.",
                pipeline.name, pipeline.application,
            ))
            .with_severity(Severity::Warning)
        }
        None => AuditMessage::new(format!(
            "Pipeline {} of application {} failed at {at}.",
            pipeline.name, pipeline.application,
        ))
        .with_severity(Severity::Error),
    };
    Ok(Some(pipeline.attach(message)))
}

fn pipeline_complete(e: &Event<'_>) -> Result<Option<AuditMessage>, ClassifyError> {
    let pipeline = PipelineRef::of(e.execution()?)?;
    let at = e.created_at()?;
    Ok(Some(pipeline.attach(AuditMessage::new(format!(
        "Pipeline {} of application {} completed at {at}.",
        pipeline.name, pipeline.application,
    )))))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verdict {
    Stop,
    Continue,
}

fn judged(e: &Event<'_>, verdict: Verdict) -> Result<Option<AuditMessage>, ClassifyError> {
    let context = require(e.context(), "payload.content.context")?;
    let judge = require(
        context.last_modified_by.as_deref(),
        "payload.content.context.lastModifiedBy",
    )?;
    let stage_name = require(
        e.stage()?.name.as_deref(),
        "payload.content.execution.stages[status=RUNNING].name",
    )?;
    let pipeline = PipelineRef::of(e.execution()?)?;
    let input = match present(&context.judgment_input) {
        Some(input) => format!(" (judgment \"{input}\" was selected)"),
        None => String::new(),
    };
    let at = e.created_at()?;
    let outcome = match verdict {
        Verdict::Stop => "stop",
        Verdict::Continue => "continue",
    };

    let message = AuditMessage::new(format!(
        "User {judge} judged stage {stage_name} of pipeline {} of application {} to {outcome}{input} at {at}.",
        pipeline.name, pipeline.application,
    ));
    // Only the stop verdict is filed under the application and pipeline.
    Ok(Some(match verdict {
        Verdict::Stop => pipeline.attach(message).with_severity(Severity::Warning),
        Verdict::Continue => message,
    }))
}

fn task_failed(e: &Event<'_>) -> Result<Option<AuditMessage>, ClassifyError> {
    let errors = e
        .context()
        .and_then(|c| c.exception.as_ref())
        .and_then(|x| x.details.as_ref())
        .map(|d| d.errors.as_slice())
        .unwrap_or_default();
    let due_to = match errors.first() {
        Some(first) if is_truthy(first) => format!(" due to {}", compact_json(errors)),
        _ => String::new(),
    };
    let stage = e.stage()?;
    let stage_type = require(
        stage.stage_type.as_deref(),
        "payload.content.execution.stages[status=RUNNING].type",
    )?;
    let at = e.created_at()?;

    if e.content.standalone {
        return Ok(Some(
            AuditMessage::new(format!(
                "Ad-hoc operation {stage_type} failed{due_to} at {at}."
            ))
            .with_severity(Severity::Error),
        ));
    }

    let stage_name = require(
        stage.name.as_deref(),
        "payload.content.execution.stages[status=RUNNING].name",
    )?;
    let pipeline = PipelineRef::of(e.execution()?)?;
    Ok(Some(
        pipeline
            .attach(AuditMessage::new(format!(
                "Operation {stage_name} (of type {stage_type}) of pipeline {} of application {} failed{due_to} at {at}.",
                pipeline.name, pipeline.application,
            )))
            .with_severity(Severity::Error),
    ))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn require<'a, T: ?Sized>(value: Option<&'a T>, path: &'static str) -> Result<&'a T, ClassifyError> {
    value.ok_or(ClassifyError::MissingField { path })
}

/// A non-empty optional string.
fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

fn reason_segment(reason: Option<&str>) -> String {
    reason
        .map(|r| format!(" for reason \"{r}\""))
        .unwrap_or_default()
}

/// Whether a JSON value counts as "set" in an echo payload.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn compact_json(values: &[Value]) -> String {
    serde_json::to_string(values).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn rule_names_are_unique() {
        let mut names: Vec<_> = RULES.iter().map(|r| r.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), RULES.len());
    }

    #[test]
    fn truthiness_follows_echo_payload_conventions() {
        assert!(!is_truthy(&json!(null)));
        assert!(!is_truthy(&json!("")));
        assert!(!is_truthy(&json!(0)));
        assert!(!is_truthy(&json!(false)));
        assert!(is_truthy(&json!({})));
        assert!(is_truthy(&json!([])));
        assert!(is_truthy(&json!("x")));
    }

    #[test]
    fn payload_without_details_is_a_runtime_error() {
        let err = classify(&EventPayload::default(), Timezone::UTC).unwrap_err();
        assert_eq!(err, ClassifyError::MissingField { path: "payload.details" });
    }

    #[test]
    fn reason_segment_quotes_reason() {
        assert_eq!(reason_segment(Some("budget")), " for reason \"budget\"");
        assert_eq!(reason_segment(None), "");
    }
}
