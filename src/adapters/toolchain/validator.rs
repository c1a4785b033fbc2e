//! Command-based candidate validator.
//!
//! Every candidate is written into a fresh temporary directory that holds
//! nothing but the candidate, compiled against the project classpath, and
//! optionally executed on its own. The temporary directory is removed when
//! the call returns, whatever the outcome.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::models::{
    CandidateTest, Config, ValidationResult, ValidationStatus,
};
use crate::domain::ports::CandidateValidator;
use crate::services::sandbox_policy::SandboxPolicy;
use crate::services::test_layout::TestLayout;

use super::command::{run_command, substitute, CommandOutcome};

/// Prefix added to diagnostics that contain unresolved symbols.
pub const UNRESOLVED_SYMBOLS_TAG: &str = "[unresolved symbols]";

/// Validates candidates with the configured compile and run commands.
#[derive(Debug, Clone)]
pub struct CommandValidator {
    compile_command: Vec<String>,
    run_command: Vec<String>,
    working_dir: PathBuf,
    classpath: String,
    source_root: PathBuf,
    test_root: PathBuf,
    timeout: Duration,
    unresolved_markers: Vec<String>,
    policy: SandboxPolicy,
}

impl CommandValidator {
    pub fn from_config(config: &Config) -> Self {
        let toolchain = &config.toolchain;
        Self {
            compile_command: toolchain.compile_command.clone(),
            run_command: toolchain.run_command.clone(),
            working_dir: toolchain.working_dir.clone(),
            classpath: toolchain.classpath.clone(),
            source_root: toolchain.working_dir.join(&config.layout.source_root),
            test_root: toolchain.working_dir.join(&config.layout.test_root),
            timeout: Duration::from_secs(toolchain.validation_timeout_secs),
            unresolved_markers: toolchain.unresolved_symbol_markers.clone(),
            policy: SandboxPolicy::from_config(&config.sandbox),
        }
    }

    #[must_use]
    pub fn with_policy(mut self, policy: SandboxPolicy) -> Self {
        self.policy = policy;
        self
    }

    fn has_unresolved_symbols(&self, diagnostics: &str) -> bool {
        self.unresolved_markers
            .iter()
            .any(|marker| !marker.is_empty() && diagnostics.contains(marker.as_str()))
    }

    async fn validate_in(&self, workdir: &Path, candidate: &CandidateTest) -> ValidationResult {
        let candidate_path = workdir.join(&candidate.target.relative_path);
        if let Err(e) = write_candidate(&candidate_path, &candidate.content).await {
            return ValidationResult::new(
                ValidationStatus::FailedToCompile,
                format!("could not write candidate into the isolated directory: {e}"),
            );
        }

        let qualified_class = TestLayout::qualified_class(&candidate.target);
        let workdir_str = workdir.to_string_lossy();
        let candidate_str = candidate_path.to_string_lossy();
        let source_root = self.source_root.to_string_lossy();
        let test_root = self.test_root.to_string_lossy();
        let vars = [
            ("candidate", candidate_str.as_ref()),
            ("workdir", workdir_str.as_ref()),
            ("class", qualified_class.as_str()),
            ("classpath", self.classpath.as_str()),
            ("source_root", source_root.as_ref()),
            ("test_root", test_root.as_ref()),
        ];

        let compile = substitute(&self.compile_command, &vars);
        match run_command(&compile, &self.working_dir, self.timeout).await {
            CommandOutcome::Finished { success: true, .. } => {}
            CommandOutcome::Finished { output, .. } => {
                let diagnostics = if self.has_unresolved_symbols(&output) {
                    format!("{UNRESOLVED_SYMBOLS_TAG}\n{output}")
                } else {
                    output
                };
                return ValidationResult::new(ValidationStatus::FailedToCompile, diagnostics);
            }
            CommandOutcome::TimedOut => {
                return ValidationResult::new(
                    ValidationStatus::FailedToCompile,
                    format!("compilation timed out after {}s", self.timeout.as_secs()),
                );
            }
            CommandOutcome::SpawnFailed(e) => {
                return ValidationResult::new(
                    ValidationStatus::FailedToCompile,
                    format!("failed to start compiler `{}`: {e}", compile.join(" ")),
                );
            }
        }

        if self.run_command.is_empty() {
            return ValidationResult::new(ValidationStatus::Compiled, String::new());
        }

        let run = substitute(&self.run_command, &vars);
        match run_command(&run, &self.working_dir, self.timeout).await {
            CommandOutcome::Finished { success, output, .. } => {
                if let Some(marker) = self.policy.scan_output(&output) {
                    return ValidationResult::new(
                        ValidationStatus::RejectedByPolicy,
                        format!("execution output shows a disallowed effect ({marker}):\n{output}"),
                    );
                }
                let status = if success {
                    ValidationStatus::RanPassed
                } else {
                    ValidationStatus::RanFailed
                };
                ValidationResult::new(status, output)
            }
            CommandOutcome::TimedOut => ValidationResult::new(
                ValidationStatus::RanFailed,
                format!("test execution timed out after {}s", self.timeout.as_secs()),
            ),
            CommandOutcome::SpawnFailed(e) => ValidationResult::new(
                ValidationStatus::RanFailed,
                format!("failed to start test runner `{}`: {e}", run.join(" ")),
            ),
        }
    }
}

#[async_trait]
impl CandidateValidator for CommandValidator {
    async fn validate(&self, candidate: &CandidateTest) -> ValidationResult {
        let violations = self.policy.scan_source(&candidate.content);
        if !violations.is_empty() {
            tracing::info!(
                unit = %candidate.unit_id,
                violations = violations.len(),
                "Candidate rejected by sandbox policy"
            );
            return ValidationResult::new(
                ValidationStatus::RejectedByPolicy,
                SandboxPolicy::describe(&violations),
            );
        }

        let workdir = match tempfile::Builder::new().prefix("covsynth-validate-").tempdir() {
            Ok(dir) => dir,
            Err(e) => {
                return ValidationResult::new(
                    ValidationStatus::FailedToCompile,
                    format!("could not create an isolated directory: {e}"),
                );
            }
        };

        let result = self.validate_in(workdir.path(), candidate).await;
        tracing::info!(
            unit = %candidate.unit_id,
            attempt = candidate.attempt,
            status = %result.status,
            "Candidate validated"
        );
        result
    }
}

async fn write_candidate(path: &Path, content: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, content).await
}
