//! Deployment configuration (`config.json`).

use std::path::{Path, PathBuf};

use audit::{Credentials, LogName, ProjectId, Timezone};
use serde::Deserialize;
use thiserror::Error;

/// Where audit entries are sent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SinkKind {
    /// The Cloud Logging `entries:write` API.
    #[default]
    CloudLogging,
    /// JSON lines on stdout.
    Stdout,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read configuration file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("configuration file {path} is not valid: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("configuration key {key} must not be empty")]
    Empty { key: &'static str },

    #[error("PROJECT_ID is required when SINK is cloud-logging")]
    MissingProjectId,
}

/// Raw file contents. Keys are upper snake case as in the deployed
/// `config.json`; unknown keys are ignored.
#[derive(Clone, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct AuditConfig {
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub credentials_path: Option<PathBuf>,
    pub username: String,
    pub password: String,
    pub audit_log_name: String,
    pub timezone: Timezone,
    #[serde(default)]
    pub sink: SinkKind,
    #[serde(default)]
    pub logging_endpoint: Option<String>,
    #[serde(default)]
    pub log_request_payloads: bool,
}

impl std::fmt::Debug for AuditConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditConfig")
            .field("project_id", &self.project_id)
            .field("credentials_path", &self.credentials_path)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("audit_log_name", &self.audit_log_name)
            .field("timezone", &self.timezone.name())
            .field("sink", &self.sink)
            .field("logging_endpoint", &self.logging_endpoint)
            .field("log_request_payloads", &self.log_request_payloads)
            .finish()
    }
}

/// Configuration after validation, with domain types in place of strings.
#[derive(Debug, Clone)]
pub struct ValidatedConfig {
    pub project_id: Option<ProjectId>,
    pub credentials_path: Option<PathBuf>,
    pub credentials: Credentials,
    pub log_name: LogName,
    pub timezone: Timezone,
    pub sink: SinkKind,
    pub logging_endpoint: Option<String>,
    pub log_request_payloads: bool,
}

impl AuditConfig {
    /// Reads and parses `path`. Does not validate.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn validate(self) -> Result<ValidatedConfig, ConfigError> {
        if self.username.is_empty() {
            return Err(ConfigError::Empty { key: "USERNAME" });
        }
        let log_name = LogName::new(self.audit_log_name).ok_or(ConfigError::Empty {
            key: "AUDIT_LOG_NAME",
        })?;

        let project_id = self.project_id.and_then(ProjectId::new);
        if self.sink == SinkKind::CloudLogging && project_id.is_none() {
            return Err(ConfigError::MissingProjectId);
        }

        Ok(ValidatedConfig {
            project_id,
            credentials_path: self.credentials_path,
            credentials: Credentials::new(self.username, self.password),
            log_name,
            timezone: self.timezone,
            sink: self.sink,
            logging_endpoint: self.logging_endpoint.filter(|e| !e.is_empty()),
            log_request_payloads: self.log_request_payloads,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn loads_deployed_config_shape() {
        let file = write_config(
            r#"{
                "PROJECT_ID": "my-project",
                "CREDENTIALS_PATH": "/secrets/key.json",
                "USERNAME": "echo",
                "PASSWORD": "pw",
                "AUDIT_LOG_NAME": "spinnaker_audit_log",
                "TIMEZONE": "America/Los_Angeles",
                "FUNCTION_REGION": "us-west1"
            }"#,
        );
        let config = AuditConfig::load(file.path()).unwrap().validate().unwrap();

        assert_eq!(config.project_id.unwrap().as_str(), "my-project");
        assert_eq!(config.credentials_path.unwrap(), PathBuf::from("/secrets/key.json"));
        assert_eq!(config.credentials, Credentials::new("echo", "pw"));
        assert_eq!(config.log_name.as_str(), "spinnaker_audit_log");
        assert_eq!(config.timezone.name(), "America/Los_Angeles");
        assert_eq!(config.sink, SinkKind::CloudLogging);
        assert!(!config.log_request_payloads);
    }

    #[test]
    fn stdout_sink_does_not_need_a_project() {
        let file = write_config(
            r#"{"USERNAME":"echo","PASSWORD":"pw","AUDIT_LOG_NAME":"audit","TIMEZONE":"UTC","SINK":"stdout","LOG_REQUEST_PAYLOADS":true}"#,
        );
        let config = AuditConfig::load(file.path()).unwrap().validate().unwrap();
        assert_eq!(config.sink, SinkKind::Stdout);
        assert!(config.project_id.is_none());
        assert!(config.log_request_payloads);
    }

    #[test]
    fn cloud_logging_sink_requires_a_project() {
        let file = write_config(
            r#"{"PROJECT_ID":"","USERNAME":"echo","PASSWORD":"pw","AUDIT_LOG_NAME":"audit","TIMEZONE":"UTC"}"#,
        );
        let err = AuditConfig::load(file.path()).unwrap().validate().unwrap_err();
        assert!(matches!(err, ConfigError::MissingProjectId));
    }

    #[test]
    fn empty_username_is_rejected() {
        let file = write_config(
            r#"{"USERNAME":"","PASSWORD":"pw","AUDIT_LOG_NAME":"audit","TIMEZONE":"UTC","SINK":"stdout"}"#,
        );
        let err = AuditConfig::load(file.path()).unwrap().validate().unwrap_err();
        assert!(matches!(err, ConfigError::Empty { key: "USERNAME" }));
    }

    #[test]
    fn unknown_timezone_fails_to_parse() {
        let file = write_config(
            r#"{"USERNAME":"echo","PASSWORD":"pw","AUDIT_LOG_NAME":"audit","TIMEZONE":"Mars/Olympus"}"#,
        );
        let err = AuditConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = AuditConfig::load(Path::new("/nonexistent/config.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn debug_hides_password() {
        let file = write_config(
            r#"{"USERNAME":"echo","PASSWORD":"hunter2","AUDIT_LOG_NAME":"audit","TIMEZONE":"UTC"}"#,
        );
        let config = AuditConfig::load(file.path()).unwrap();
        assert!(!format!("{config:?}").contains("hunter2"));
    }
}
