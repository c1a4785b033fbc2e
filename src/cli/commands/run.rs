//! `covsynth run`: detect units, then iterate until the threshold is met.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::adapters::generators::GeneratorRegistry;
use crate::adapters::{CommandCoverageAnalyzer, CommandValidator, FsWorkspace, GitChangeDetector};
use crate::cli::output::{output, CommandOutput, RunProgress, TableFormatter};
use crate::domain::models::{Config, DetectionMode, GenerationBackend, RunReport};
use crate::domain::ports::{ArtifactWorkspace, ChangeDetector};
use crate::infrastructure::config::ConfigLoader;
use crate::services::{
    AcceptanceStore, ControllerPorts, ControllerSettings, IterationController, RetryPolicy,
    RunBudget, RunContext, TestLayout,
};

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Target every file under the source root instead of the changed ones
    #[arg(long)]
    pub all: bool,

    /// Base commit of the change range (overrides BASE_SHA)
    #[arg(long)]
    pub base: Option<String>,

    /// Head commit of the change range (overrides HEAD_SHA)
    #[arg(long)]
    pub head: Option<String>,

    /// Coverage threshold in percent
    #[arg(short, long)]
    pub threshold: Option<f64>,

    /// Units iterated in parallel
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Generation attempts allowed across the whole run
    #[arg(long)]
    pub max_iterations: Option<u32>,

    /// Use the scripted backend instead of calling a model
    #[arg(long)]
    pub dry_run: bool,

    /// Disable the live progress display
    #[arg(long)]
    pub no_progress: bool,
}

impl RunArgs {
    /// Apply command-line overrides on top of the loaded configuration.
    pub fn apply(&self, config: &mut Config) {
        if self.all {
            config.detection.mode = DetectionMode::All;
        }
        if let Some(base) = &self.base {
            config.detection.base_sha = Some(base.clone());
        }
        if let Some(head) = &self.head {
            config.detection.head_sha = Some(head.clone());
        }
        if let Some(threshold) = self.threshold {
            config.threshold = threshold;
        }
        if let Some(concurrency) = self.concurrency {
            config.iteration.concurrency = concurrency;
        }
        if let Some(max_iterations) = self.max_iterations {
            config.iteration.max_total_iterations = max_iterations;
        }
        if self.dry_run {
            config.generation.backend = GenerationBackend::Mock;
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RunOutput {
    #[serde(flatten)]
    pub report: RunReport,
}

impl CommandOutput for RunOutput {
    fn to_human(&self) -> String {
        let report = &self.report;
        let formatter = TableFormatter::new();
        let mut sections = vec![format!(
            "{} {} coverage {:.2}% (baseline {:.2}%, threshold {:.2}%)",
            formatter.format_outcome(report.outcome),
            report.granularity,
            report.aggregate_percent,
            report.baseline_percent,
            report.threshold,
        )];
        sections.push(format!(
            "{} commit(s) in {} iteration(s); stopped: {:?}",
            report.commits, report.total_iterations, report.stop_reason
        ));
        if !report.units.is_empty() {
            sections.push(formatter.format_run(report));
        }
        if let Some(diagnostics) = formatter.format_diagnostics(report) {
            sections.push(diagnostics);
        }
        sections.join("\n\n")
    }
}

pub async fn execute(args: RunArgs, mut config: Config, json: bool) -> Result<i32> {
    args.apply(&mut config);
    ConfigLoader::validate(&config).context("Invalid configuration after overrides")?;

    let detector = GitChangeDetector::from_config(&config);
    let units = detector.detect().await.context("Change detection failed")?;
    if units.is_empty() {
        tracing::info!("No source units in scope; nothing to do");
        if json {
            println!("{}", serde_json::json!({ "units": 0, "outcome": "passed" }));
        } else {
            println!("No source units in scope; nothing to do.");
        }
        return Ok(0);
    }

    let generator = GeneratorRegistry::from_config(&config)
        .create()
        .context("Failed to create the generation backend")?;

    let working_dir = &config.toolchain.working_dir;
    let tests_workspace: Arc<dyn ArtifactWorkspace> =
        Arc::new(FsWorkspace::new(working_dir.join(&config.layout.test_root)));
    let state_workspace: Arc<dyn ArtifactWorkspace> =
        Arc::new(FsWorkspace::new(working_dir.join(&config.layout.state_dir)));
    let store = AcceptanceStore::open(Arc::clone(&tests_workspace), state_workspace)
        .await
        .context("Failed to open the acceptance store")?;

    let ports = ControllerPorts {
        generator,
        validator: Arc::new(CommandValidator::from_config(&config)),
        analyzer: Arc::new(CommandCoverageAnalyzer::from_config(&config)),
        workspace: tests_workspace,
    };

    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let controller = Arc::new(
        IterationController::new(
            ports,
            store,
            ControllerSettings::from_config(&config),
            RetryPolicy::from_config(&config.iteration, &config.retry),
        )
        .with_layout(TestLayout::from_config(&config.layout))
        .with_events(events_tx),
    );

    let show_progress = !(json || args.no_progress);
    let progress_task = tokio::spawn(async move {
        let mut progress = if show_progress {
            RunProgress::new()
        } else {
            RunProgress::hidden()
        };
        while let Some(event) = events_rx.recv().await {
            progress.handle(&event);
        }
    });

    let ctx = Arc::new(RunContext::new(RunBudget::from_config(&config.iteration)));
    let signal_ctx = Arc::clone(&ctx);
    let signal_task = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received; finishing in-flight commits");
            signal_ctx.cancel();
        }
    });

    tracing::info!(
        units = units.len(),
        threshold = config.threshold,
        backend = ?config.generation.backend,
        "Starting synthesis run"
    );
    let result = Arc::clone(&controller).run(units, ctx).await;
    signal_task.abort();
    // The controller holds the only sender; dropping it ends the progress task.
    drop(controller);
    progress_task.await.ok();

    let report = result.context("Synthesis run failed")?;
    let code = report.outcome.exit_code();
    output(&RunOutput { report }, json);
    Ok(code)
}
