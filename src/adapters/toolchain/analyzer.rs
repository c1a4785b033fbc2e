//! Command-based coverage analyzer.
//!
//! Runs the configured suite command over the whole test tree, then reads
//! the coverage report it leaves behind. Reports from earlier runs are
//! deleted first, so a suite that writes nothing measures as 0%. Accepted
//! tests are already on disk when this is called, so the snapshot is only
//! used for logging.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;

use crate::adapters::coverage_reports::parse_report;
use crate::domain::errors::MeasurementError;
use crate::domain::models::{
    AcceptedTest, Config, CoverageGranularity, CoverageReport, ReportFormat,
};
use crate::domain::ports::CoverageAnalyzer;

use super::command::{run_command, substitute, CommandOutcome};

/// Suite output is cut to this many trailing characters in diagnostics.
const MAX_DIAGNOSTIC_CHARS: usize = 4000;

/// Measures coverage by running the project's own test suite.
#[derive(Debug, Clone)]
pub struct CommandCoverageAnalyzer {
    suite_command: Vec<String>,
    working_dir: PathBuf,
    classpath: String,
    source_root: PathBuf,
    test_root: PathBuf,
    report_path: Option<PathBuf>,
    report_glob: String,
    format: ReportFormat,
    granularity: CoverageGranularity,
    timeout: Duration,
}

impl CommandCoverageAnalyzer {
    pub fn from_config(config: &Config) -> Self {
        let toolchain = &config.toolchain;
        Self {
            suite_command: toolchain.suite_command.clone(),
            working_dir: toolchain.working_dir.clone(),
            classpath: toolchain.classpath.clone(),
            source_root: toolchain.working_dir.join(&config.layout.source_root),
            test_root: toolchain.working_dir.join(&config.layout.test_root),
            report_path: toolchain.report_path.clone(),
            report_glob: toolchain.report_glob.clone(),
            format: toolchain.report_format,
            granularity: toolchain.granularity,
            timeout: Duration::from_secs(toolchain.measurement_timeout_secs),
        }
    }

    fn glob_matches(&self) -> Vec<PathBuf> {
        let pattern = self.working_dir.join(&self.report_glob);
        let Ok(entries) = glob::glob(&pattern.to_string_lossy()) else {
            tracing::warn!(pattern = %self.report_glob, "Invalid coverage report glob");
            return Vec::new();
        };
        entries
            .filter_map(Result::ok)
            .filter(|path| path.is_file())
            .collect()
    }

    /// Locate the report: the explicit path if configured, else the most
    /// recently modified glob match.
    fn locate_report(&self) -> Option<PathBuf> {
        if let Some(path) = &self.report_path {
            let path = self.working_dir.join(path);
            return path.is_file().then_some(path);
        }
        self.glob_matches()
            .into_iter()
            .max_by_key(|path| path.metadata().and_then(|m| m.modified()).ok())
    }

    async fn clear_stale_reports(&self) {
        let stale = match &self.report_path {
            Some(path) => vec![self.working_dir.join(path)],
            None => self.glob_matches(),
        };
        for path in stale {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => tracing::debug!(path = %path.display(), "Removed stale coverage report"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Failed to remove stale coverage report"
                ),
            }
        }
    }

    async fn read_report(&self) -> Result<CoverageReport, MeasurementError> {
        let Some(path) = self.locate_report() else {
            tracing::warn!(
                working_dir = %self.working_dir.display(),
                "No coverage report found; treating coverage as 0%"
            );
            return Ok(CoverageReport::empty(self.granularity));
        };

        let text = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Ok(CoverageReport::empty(self.granularity));
            }
            Err(e) => {
                return Err(MeasurementError::BuildBroken(format!(
                    "failed to read coverage report {}: {e}",
                    path.display()
                )));
            }
        };
        if text.trim().is_empty() {
            return Ok(CoverageReport::empty(self.granularity));
        }

        parse_report(self.format, &text, self.granularity).map_err(|e| {
            MeasurementError::BuildBroken(format!("{}: {e}", path.display()))
        })
    }
}

#[async_trait]
impl CoverageAnalyzer for CommandCoverageAnalyzer {
    fn granularity(&self) -> CoverageGranularity {
        self.granularity
    }

    async fn measure(&self, snapshot: &[AcceptedTest]) -> Result<CoverageReport, MeasurementError> {
        let source_root = self.source_root.to_string_lossy();
        let test_root = self.test_root.to_string_lossy();
        let working_dir = self.working_dir.to_string_lossy();
        let argv = substitute(
            &self.suite_command,
            &[
                ("workdir", working_dir.as_ref()),
                ("classpath", self.classpath.as_str()),
                ("source_root", source_root.as_ref()),
                ("test_root", test_root.as_ref()),
            ],
        );

        tracing::info!(accepted = snapshot.len(), "Measuring suite coverage");
        self.clear_stale_reports().await;
        match run_command(&argv, &self.working_dir, self.timeout).await {
            CommandOutcome::Finished { success: true, .. } => {}
            CommandOutcome::Finished { code, output, .. } => {
                return Err(MeasurementError::BuildBroken(format!(
                    "suite command exited with {}:\n{}",
                    code.map_or_else(|| "a signal".to_string(), |c| format!("status {c}")),
                    tail(&output)
                )));
            }
            CommandOutcome::TimedOut => {
                return Err(MeasurementError::BuildBroken(format!(
                    "suite command timed out after {}s",
                    self.timeout.as_secs()
                )));
            }
            CommandOutcome::SpawnFailed(e) => {
                return Err(MeasurementError::ToolchainUnavailable(format!(
                    "failed to start `{}`: {e}",
                    argv.join(" ")
                )));
            }
        }

        let report = self.read_report().await?;
        tracing::info!(
            granularity = %report.granularity,
            units = report.units.len(),
            aggregate = %format!("{:.2}", report.aggregate_percent()),
            "Coverage measured"
        );
        Ok(report)
    }
}

fn tail(output: &str) -> &str {
    let len = output.chars().count();
    if len <= MAX_DIAGNOSTIC_CHARS {
        return output;
    }
    let skip = len - MAX_DIAGNOSTIC_CHARS;
    output
        .char_indices()
        .nth(skip)
        .map_or(output, |(idx, _)| &output[idx..])
}
