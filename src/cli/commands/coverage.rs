//! `covsynth coverage`: show coverage of the accepted suite or of a report file.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;

use crate::adapters::coverage_reports::parse_report;
use crate::adapters::{CommandCoverageAnalyzer, FsWorkspace};
use crate::cli::output::{output, CommandOutput, TableFormatter};
use crate::domain::models::{Config, CoverageReport};
use crate::domain::ports::{ArtifactWorkspace, CoverageAnalyzer};
use crate::services::AcceptanceStore;

#[derive(Args, Debug)]
pub struct CoverageArgs {
    /// Parse an existing report instead of running the suite
    #[arg(long)]
    pub report: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
pub struct CoverageOutput {
    pub threshold: f64,
    pub aggregate_percent: f64,
    pub meets_threshold: bool,
    pub report: CoverageReport,
}

impl CoverageOutput {
    fn new(report: CoverageReport, threshold: f64) -> Self {
        let aggregate_percent = report.aggregate_percent();
        Self {
            threshold,
            aggregate_percent,
            meets_threshold: aggregate_percent >= threshold,
            report,
        }
    }
}

impl CommandOutput for CoverageOutput {
    fn to_human(&self) -> String {
        let summary = format!(
            "{} coverage {:.2}% ({}/{}), threshold {:.2}%",
            self.report.granularity,
            self.aggregate_percent,
            self.report.aggregate.covered,
            self.report.aggregate.total,
            self.threshold,
        );
        if self.report.units.is_empty() {
            return format!("{summary}\nNo coverage data reported.");
        }
        format!(
            "{summary}\n{}",
            TableFormatter::new().format_coverage(&self.report, self.threshold)
        )
    }
}

pub async fn execute(args: CoverageArgs, config: Config, json: bool) -> Result<i32> {
    let granularity = config.toolchain.granularity;
    let report = if let Some(path) = args.report {
        let text = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read report {}", path.display()))?;
        parse_report(config.toolchain.report_format, &text, granularity)
            .with_context(|| format!("Failed to parse report {}", path.display()))?
    } else {
        let working_dir = &config.toolchain.working_dir;
        let tests: Arc<dyn ArtifactWorkspace> =
            Arc::new(FsWorkspace::new(working_dir.join(&config.layout.test_root)));
        let state: Arc<dyn ArtifactWorkspace> =
            Arc::new(FsWorkspace::new(working_dir.join(&config.layout.state_dir)));
        let store = AcceptanceStore::open(tests, state)
            .await
            .context("Failed to open the acceptance store")?;
        tracing::info!(accepted = store.current_set().len(), "Measuring the accepted suite");
        CommandCoverageAnalyzer::from_config(&config)
            .measure(store.current_set())
            .await
            .context("Coverage measurement failed")?
    };

    output(&CoverageOutput::new(report, config.threshold), json);
    Ok(0)
}
