//! Resolving a run request into the exact process invocation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::clock::{format_timestamp, RunIdGenerator};
use super::error::ExecutionError;
use super::registry::RunId;
use super::settings::ExecutionSettings;
use crate::subprocess::{ProcessCommand, ProcessCommandBuilder};

/// Test name that selects the batch script instead of a single test.
pub const RUN_ALL: &str = "all";

/// Log level forced on the tool so it never waits for a terminal.
const FORCED_LOG_LEVEL: &str = "info";

/// Variables that make k6 draw progress bars even though its output is a pipe.
const TERMINAL_ENV: [(&str, &str); 3] = [
    ("TERM", "xterm-256color"),
    ("FORCE_COLOR", "1"),
    ("COLORTERM", "truecolor"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    Single,
    Batch,
}

/// What a caller asks for.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSpec {
    /// Test name, or [`RUN_ALL`] for a batch run.
    pub test: String,
    pub profile: String,
    pub environment: String,
    #[serde(default)]
    pub auth_token: Option<String>,
    #[serde(default)]
    pub run_id: Option<String>,
}

impl RunSpec {
    pub fn new(test: &str, profile: &str, environment: &str) -> Self {
        Self {
            test: test.to_string(),
            profile: profile.to_string(),
            environment: environment.to_string(),
            auth_token: None,
            run_id: None,
        }
    }

    pub fn all(profile: &str, environment: &str) -> Self {
        Self::new(RUN_ALL, profile, environment)
    }

    pub fn with_auth_token(mut self, token: &str) -> Self {
        self.auth_token = Some(token.to_string());
        self
    }

    pub fn with_run_id(mut self, run_id: &str) -> Self {
        self.run_id = Some(run_id.to_string());
        self
    }

    pub fn mode(&self) -> RunMode {
        if self.test == RUN_ALL {
            RunMode::Batch
        } else {
            RunMode::Single
        }
    }
}

/// A fully resolved run, ready to spawn.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub run_id: RunId,
    pub mode: RunMode,
    pub test_name: String,
    pub profile: String,
    pub environment: String,
    pub started_at: DateTime<Utc>,
    pub timestamp: String,
    /// Where the result file will land; `None` when the batch script decides.
    pub artifact_path: Option<PathBuf>,
    pub command: ProcessCommand,
}

impl Invocation {
    pub fn plan(
        spec: &RunSpec,
        settings: &ExecutionSettings,
        now: DateTime<Utc>,
        ids: &RunIdGenerator,
    ) -> Result<Self, ExecutionError> {
        validate_spec(spec)?;

        let mode = spec.mode();
        let test_name = spec.test.trim_end_matches(".js").to_string();
        let timestamp = format_timestamp(now, settings.timezone);
        let run_id = match spec.run_id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => RunId::from(id),
            _ => ids.next(&test_name, now),
        };
        let auth_token = spec
            .auth_token
            .as_deref()
            .filter(|token| !token.is_empty())
            .or(settings.default_auth_token.as_deref());

        let (command, artifact_path) = match mode {
            RunMode::Single => {
                let artifact = settings
                    .results_dir
                    .join(format!("{timestamp}_{test_name}.json"));
                let command =
                    single_command(settings, &test_name, spec, auth_token, &artifact, &timestamp);
                (command, Some(artifact))
            }
            RunMode::Batch => (batch_command(settings, spec, auth_token, &timestamp), None),
        };

        Ok(Self {
            run_id,
            mode,
            test_name,
            profile: spec.profile.clone(),
            environment: spec.environment.clone(),
            started_at: now,
            timestamp,
            artifact_path,
            command,
        })
    }

    pub fn artifact_display(&self) -> Option<String> {
        self.artifact_path.as_ref().map(|p| p.display().to_string())
    }
}

fn single_command(
    settings: &ExecutionSettings,
    test_name: &str,
    spec: &RunSpec,
    auth_token: Option<&str>,
    artifact: &std::path::Path,
    timestamp: &str,
) -> ProcessCommand {
    let script = settings.tests_dir.join(format!("{test_name}.js"));
    let mut builder = ProcessCommandBuilder::new(&settings.k6_binary)
        .arg("run")
        .arg(&script.display().to_string())
        .script_env("PROFILE", &spec.profile)
        .script_env("ENVIRONMENT", &spec.environment);
    if let Some(token) = auth_token {
        builder = builder.script_env("AUTH_TOKEN", token);
    }
    builder = builder
        .script_env("LOG_LEVEL", FORCED_LOG_LEVEL)
        .arg("--summary-export")
        .arg(&artifact.display().to_string());

    with_environment(builder, settings, spec, auth_token, timestamp).build()
}

fn batch_command(
    settings: &ExecutionSettings,
    spec: &RunSpec,
    auth_token: Option<&str>,
    timestamp: &str,
) -> ProcessCommand {
    let builder = ProcessCommandBuilder::new(&settings.batch_shell)
        .arg(&settings.batch_script.display().to_string())
        .arg(&spec.profile);

    with_environment(builder, settings, spec, auth_token, timestamp)
        .env("LOG_LEVEL", FORCED_LOG_LEVEL)
        .build()
}

fn with_environment(
    builder: ProcessCommandBuilder,
    settings: &ExecutionSettings,
    spec: &RunSpec,
    auth_token: Option<&str>,
    timestamp: &str,
) -> ProcessCommandBuilder {
    let mut builder = builder
        .envs(TERMINAL_ENV)
        .env("PROFILE", &spec.profile)
        .env("ENVIRONMENT", &spec.environment)
        .env("RESULTS_DIR", &settings.results_dir.display().to_string())
        .env("RUN_TIMESTAMP", timestamp);
    if let Some(token) = auth_token {
        builder = builder.env("AUTH_TOKEN", token);
    }
    if let Some(dir) = &settings.working_dir {
        builder = builder.current_dir(dir);
    }
    builder
}

fn validate_spec(spec: &RunSpec) -> Result<(), ExecutionError> {
    validate_name("test", spec.test.trim_end_matches(".js"))?;
    validate_name("profile", &spec.profile)?;
    validate_name("environment", &spec.environment)?;

    if let Some(run_id) = &spec.run_id {
        if run_id.chars().any(char::is_control) {
            return Err(ExecutionError::invalid(
                "run id must not contain control characters",
            ));
        }
    }
    Ok(())
}

/// Names end up in file paths, so only a conservative character set is
/// accepted.
pub fn validate_name(field: &str, value: &str) -> Result<(), ExecutionError> {
    if value.is_empty() {
        return Err(ExecutionError::invalid(format!("{field} must not be empty")));
    }
    if value == "." || value == ".." {
        return Err(ExecutionError::invalid(format!("{field} '{value}' is not allowed")));
    }
    let valid = value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
    if !valid {
        return Err(ExecutionError::invalid(format!(
            "{field} '{value}' may only contain letters, digits, '_', '-' and '.'"
        )));
    }
    Ok(())
}
