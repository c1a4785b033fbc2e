//! Iteration controller: the coverage-driven synthesis loop.
//!
//! Each source unit below the threshold gets its own worker that drives the
//! unit's [`IterationState`] through
//! `Pending → Generating → Validating → Measuring → {Committed, RolledBack}`
//! until it settles as `Done` or `Exhausted`. Workers run with bounded
//! parallelism; generation and validation happen concurrently, but every
//! stage → measure → commit/rollback sequence runs inside one serialized
//! commit critical section so the accepted set only ever changes one
//! candidate at a time.
//!
//! Run-wide limits (iterations, wall clock, fatal error streak,
//! cancellation) live in the shared [`RunContext`] and are checked between
//! cycles only.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, Mutex, RwLock, Semaphore};
use tokio::task::JoinSet;
use tracing::Instrument;
use uuid::Uuid;

use crate::domain::errors::{GenerationError, MeasurementError, RunError, StoreError};
use crate::domain::models::{
    AcceptedTest, CandidateTest, Config, CoverageGranularity, CoverageReport, IterationState,
    RunOutcome, RunReport, SourceUnit, StopReason, TestTarget, UnitId, UnitPhase, UnitReport,
    ValidationResult, ValidationStatus,
};
use crate::domain::ports::{
    ArtifactWorkspace, CandidateValidator, CoverageAnalyzer, GenerationRequest, TestGenerator,
};

use super::acceptance_store::AcceptanceStore;
use super::retry_policy::RetryPolicy;
use super::run_context::RunContext;
use super::test_layout::TestLayout;

/// Coverage differences below this are treated as equal.
const COVERAGE_EPSILON: f64 = 1e-9;

// ============================================================================
// Settings and events
// ============================================================================

/// Controller tuning, usually derived from [`Config`].
#[derive(Debug, Clone)]
pub struct ControllerSettings {
    /// Coverage percentage to reach, in (0, 100]
    pub threshold: f64,
    pub max_consecutive_failures: u32,
    /// Consecutive auth / invalid-response errors that abort the run
    pub fatal_error_threshold: u32,
    pub concurrency: usize,
    /// Artifacts shorter than this (trimmed) are invalid responses
    pub min_artifact_chars: usize,
    pub generation_timeout: Duration,
    pub validation_timeout: Duration,
    pub measurement_timeout: Duration,
}

impl ControllerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            threshold: config.threshold,
            max_consecutive_failures: config.iteration.max_consecutive_failures,
            fatal_error_threshold: config.iteration.fatal_error_threshold,
            concurrency: config.iteration.concurrency,
            min_artifact_chars: config.iteration.min_artifact_chars,
            generation_timeout: Duration::from_secs(config.generation.timeout_secs),
            validation_timeout: Duration::from_secs(config.toolchain.validation_timeout_secs),
            measurement_timeout: Duration::from_secs(config.toolchain.measurement_timeout_secs),
        }
    }
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Progress notifications for observers such as the CLI.
#[derive(Debug, Clone, PartialEq)]
pub enum ControllerEvent {
    BaselineMeasured {
        aggregate: f64,
        pending_units: usize,
        total_units: usize,
    },
    PhaseChanged {
        unit_id: UnitId,
        phase: UnitPhase,
        attempt: u32,
    },
    Committed {
        unit_id: UnitId,
        unit_coverage: f64,
        aggregate: f64,
    },
    RolledBack {
        unit_id: UnitId,
        reason: String,
    },
    /// A worker stopped driving its unit (terminal or run stopping)
    UnitFinished {
        unit_id: UnitId,
        phase: UnitPhase,
        coverage: f64,
    },
    RunFinished {
        aggregate: f64,
        outcome: RunOutcome,
    },
}

/// The adapters the controller drives.
#[derive(Clone)]
pub struct ControllerPorts {
    pub generator: Arc<dyn TestGenerator>,
    pub validator: Arc<dyn CandidateValidator>,
    pub analyzer: Arc<dyn CoverageAnalyzer>,
    /// Test tree the store writes into; consulted for free file names
    pub workspace: Arc<dyn ArtifactWorkspace>,
}

/// Result of the measuring phase.
#[derive(Debug, Clone, PartialEq)]
enum Decision {
    Committed { unit_coverage: f64 },
    RolledBack { reason: String },
    Fatal { reason: String },
}

/// State guarded by the commit critical section.
struct CommitPoint {
    store: AcceptanceStore,
    commits: u32,
}

// ============================================================================
// Controller
// ============================================================================

/// Drives every unit of a run to a terminal state.
pub struct IterationController {
    ports: ControllerPorts,
    settings: ControllerSettings,
    retry: RetryPolicy,
    layout: TestLayout,
    commit_point: Mutex<CommitPoint>,
    /// Report of the last commit (or the baseline); replaced, never mutated
    latest: RwLock<Arc<CoverageReport>>,
    events: Option<mpsc::UnboundedSender<ControllerEvent>>,
}

impl IterationController {
    pub fn new(
        ports: ControllerPorts,
        store: AcceptanceStore,
        settings: ControllerSettings,
        retry: RetryPolicy,
    ) -> Self {
        let granularity = ports.analyzer.granularity();
        Self {
            ports,
            settings,
            retry,
            layout: TestLayout::default(),
            commit_point: Mutex::new(CommitPoint { store, commits: 0 }),
            latest: RwLock::new(Arc::new(CoverageReport::empty(granularity))),
            events: None,
        }
    }

    #[must_use]
    pub fn with_layout(mut self, layout: TestLayout) -> Self {
        self.layout = layout;
        self
    }

    #[must_use]
    pub fn with_events(mut self, events: mpsc::UnboundedSender<ControllerEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn settings(&self) -> &ControllerSettings {
        &self.settings
    }

    pub fn granularity(&self) -> CoverageGranularity {
        self.ports.analyzer.granularity()
    }

    /// The committed accepted set.
    pub async fn accepted_set(&self) -> Vec<AcceptedTest> {
        self.commit_point.lock().await.store.current_set().to_vec()
    }

    /// Report of the last commit, or the baseline.
    pub async fn latest_report(&self) -> Arc<CoverageReport> {
        Arc::clone(&*self.latest.read().await)
    }

    /// Run the loop over `units` until every unit settles or the run stops.
    ///
    /// Fails only if the baseline measurement cannot be taken. Everything
    /// after that, including fatal errors, ends in a [`RunReport`] whose
    /// outcome says how the run ended.
    pub async fn run(
        self: Arc<Self>,
        units: Vec<SourceUnit>,
        ctx: Arc<RunContext>,
    ) -> Result<RunReport, RunError> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let threshold = self.settings.threshold;

        let baseline = self.measure_baseline().await?;
        tracing::info!(
            run_id = %run_id,
            units = units.len(),
            baseline = %format!("{:.2}", baseline.aggregate_percent()),
            threshold,
            granularity = %baseline.granularity,
            "Baseline coverage measured"
        );

        let semaphore = Arc::new(Semaphore::new(self.settings.concurrency.max(1)));
        let mut workers = JoinSet::new();
        let mut finished: Vec<(Arc<SourceUnit>, IterationState)> = Vec::new();
        let mut pending = Vec::new();

        let point = self.commit_point.lock().await;
        for unit in units {
            let unit = Arc::new(unit);
            let coverage = baseline.unit_percent(&unit.id);
            let mut state = point.store.resume_state(&unit, coverage);
            if coverage + COVERAGE_EPSILON >= threshold {
                state.settle_done();
                finished.push((unit, state));
            } else if !unit.has_source() {
                state.record_failure(Some("source unit is empty".to_string()));
                state.advance(UnitPhase::Exhausted)?;
                finished.push((unit, state));
            } else {
                pending.push((unit, state));
            }
        }
        drop(point);

        self.emit(ControllerEvent::BaselineMeasured {
            aggregate: baseline.aggregate_percent(),
            pending_units: pending.len(),
            total_units: pending.len() + finished.len(),
        });
        for (unit, state) in &finished {
            self.emit(ControllerEvent::UnitFinished {
                unit_id: unit.id.clone(),
                phase: state.phase,
                coverage: state.best_coverage,
            });
        }

        for (unit, state) in pending {
            let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                break;
            };
            let controller = Arc::clone(&self);
            let ctx = Arc::clone(&ctx);
            let span = tracing::info_span!("unit", unit = %unit.id);
            workers.spawn(
                async move {
                    let _permit = permit;
                    let state = controller.drive_unit(&unit, state, &ctx).await;
                    (unit, state)
                }
                .instrument(span),
            );
        }

        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(entry) => finished.push(entry),
                Err(err) => {
                    tracing::error!(error = %err, "Unit worker failed");
                    ctx.request_stop(StopReason::Fatal(format!("unit worker failed: {err}")));
                }
            }
        }

        if let Err(err) = self
            .commit_point
            .lock()
            .await
            .store
            .record_unit_states(finished.iter().map(|(_, state)| state))
            .await
        {
            tracing::warn!(error = %err, "Failed to record unit states");
        }

        let report = self.build_report(run_id, started_at, &baseline, finished, &ctx).await;
        self.emit(ControllerEvent::RunFinished {
            aggregate: report.aggregate_percent,
            outcome: report.outcome,
        });
        tracing::info!(
            run_id = %run_id,
            aggregate = %format!("{:.2}", report.aggregate_percent),
            commits = report.commits,
            iterations = report.total_iterations,
            outcome = ?report.outcome,
            stop_reason = ?report.stop_reason,
            "Run finished"
        );
        Ok(report)
    }

    async fn measure_baseline(&self) -> Result<Arc<CoverageReport>, RunError> {
        let mut point = self.commit_point.lock().await;
        let snapshot = point.store.current_set().to_vec();
        let report = match self.measure(&snapshot).await {
            Ok(report) => Arc::new(report),
            Err(MeasurementError::ToolchainUnavailable(diagnostics)) => {
                return Err(RunError::ToolchainUnavailable(diagnostics));
            }
            Err(MeasurementError::BuildBroken(diagnostics)) => {
                return Err(RunError::BaselineBroken(diagnostics));
            }
        };
        point.store.set_baseline(&report);
        *self.latest.write().await = Arc::clone(&report);
        Ok(report)
    }

    async fn build_report(
        &self,
        run_id: Uuid,
        started_at: chrono::DateTime<Utc>,
        baseline: &CoverageReport,
        mut finished: Vec<(Arc<SourceUnit>, IterationState)>,
        ctx: &RunContext,
    ) -> RunReport {
        let threshold = self.settings.threshold;
        let latest = self.latest_report().await;
        let point = self.commit_point.lock().await;
        let aggregate = latest.aggregate_percent();

        let stop_reason = ctx.stop_reason().unwrap_or(StopReason::AllUnitsSettled);
        let outcome = if matches!(stop_reason, StopReason::Fatal(_)) {
            RunOutcome::Aborted
        } else if aggregate + COVERAGE_EPSILON >= threshold {
            RunOutcome::Passed
        } else {
            RunOutcome::BelowThreshold
        };

        finished.sort_by(|a, b| a.0.id.cmp(&b.0.id));
        let units = finished
            .into_iter()
            .map(|(unit, state)| UnitReport {
                coverage_percent: latest.unit_percent(&unit.id),
                accepted_tests: point
                    .store
                    .accepted_for(&unit.id)
                    .into_iter()
                    .map(|test| test.target.relative_path.clone())
                    .collect(),
                unit_id: unit.id.clone(),
                qualified_name: unit.qualified_name.clone(),
                phase: state.phase,
                attempts: state.attempts,
                commits: state.commits,
                failures: state.total_failures,
                last_diagnostics: state.last_diagnostics,
            })
            .collect();

        RunReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            threshold,
            granularity: latest.granularity,
            baseline_percent: baseline.aggregate_percent(),
            aggregate_percent: aggregate,
            total_iterations: ctx.iterations_used(),
            commits: point.commits,
            outcome,
            stop_reason,
            units,
        }
    }

    // ========================================================================
    // Per-unit state machine
    // ========================================================================

    /// Drive one unit until it settles or the run stops.
    ///
    /// Infrastructure errors (test tree I/O, manifest writes) abort the run.
    async fn drive_unit(
        &self,
        unit: &Arc<SourceUnit>,
        mut state: IterationState,
        ctx: &RunContext,
    ) -> IterationState {
        if let Err(err) = self.cycle(unit, &mut state, ctx).await {
            tracing::error!(error = %err, "Unit aborted the run");
            ctx.request_stop(StopReason::Fatal(err.to_string()));
        }
        self.emit(ControllerEvent::UnitFinished {
            unit_id: unit.id.clone(),
            phase: state.phase,
            coverage: state.best_coverage,
        });
        state
    }

    async fn cycle(
        &self,
        unit: &Arc<SourceUnit>,
        state: &mut IterationState,
        ctx: &RunContext,
    ) -> Result<(), RunError> {
        let threshold = self.settings.threshold;

        while !state.phase.is_terminal() {
            if ctx.is_stopped() {
                break;
            }
            if state.consecutive_failures >= self.settings.max_consecutive_failures
                || !self.retry.has_attempts_left(state.attempts)
            {
                tracing::info!(
                    attempts = state.attempts,
                    consecutive_failures = state.consecutive_failures,
                    "Unit budget spent"
                );
                self.transition(state, UnitPhase::Exhausted)?;
                break;
            }
            let Ok(iteration) = ctx.try_begin_iteration() else {
                break;
            };

            state.attempts += 1;
            self.transition(state, UnitPhase::Generating)?;
            tracing::debug!(iteration, attempt = state.attempts, "Generating candidate");

            let target = self
                .layout
                .next_free_target(&unit.id, self.ports.workspace.as_ref())
                .await
                .map_err(StoreError::from)?;
            let candidate = match self.generate(unit, state, target).await {
                Ok(candidate) => {
                    ctx.record_generation_success();
                    candidate
                }
                Err(error) => {
                    self.on_generation_error(state, &error, ctx).await?;
                    continue;
                }
            };

            self.transition(state, UnitPhase::Validating)?;
            let validation = self.validate(&candidate).await;
            if !validation.is_passing() {
                tracing::info!(
                    attempt = state.attempts,
                    status = %validation.status,
                    "Candidate rejected by validation"
                );
                state.record_failure(Some(format!(
                    "{}: {}",
                    validation.status, validation.diagnostics
                )));
                self.transition(state, UnitPhase::Pending)?;
                continue;
            }

            self.transition(state, UnitPhase::Measuring)?;
            match self.measure_and_decide(unit, candidate).await? {
                Decision::Committed { unit_coverage } => {
                    self.transition(state, UnitPhase::Committed)?;
                    state.record_commit(unit_coverage);
                    let next = if unit_coverage + COVERAGE_EPSILON >= threshold {
                        UnitPhase::Done
                    } else {
                        UnitPhase::Pending
                    };
                    self.transition(state, next)?;
                }
                Decision::RolledBack { reason } => {
                    self.transition(state, UnitPhase::RolledBack)?;
                    state.record_failure(Some(reason));
                    let next = if state.consecutive_failures >= self.settings.max_consecutive_failures
                    {
                        UnitPhase::Exhausted
                    } else {
                        UnitPhase::Pending
                    };
                    self.transition(state, next)?;
                }
                Decision::Fatal { reason } => {
                    self.transition(state, UnitPhase::RolledBack)?;
                    state.record_failure(Some(reason.clone()));
                    self.transition(state, UnitPhase::Exhausted)?;
                    tracing::error!(reason = %reason, "Fatal measurement failure");
                    ctx.request_stop(StopReason::Fatal(reason));
                }
            }
        }
        Ok(())
    }

    fn transition(&self, state: &mut IterationState, next: UnitPhase) -> Result<(), RunError> {
        state.advance(next)?;
        tracing::trace!(phase = %next, attempt = state.attempts, "Phase changed");
        self.emit(ControllerEvent::PhaseChanged {
            unit_id: state.unit_id.clone(),
            phase: next,
            attempt: state.attempts,
        });
        Ok(())
    }

    async fn on_generation_error(
        &self,
        state: &mut IterationState,
        error: &GenerationError,
        ctx: &RunContext,
    ) -> Result<(), RunError> {
        state.record_failure(None);
        tracing::warn!(
            attempt = state.attempts,
            kind = %error.kind(),
            error = %error,
            "Generation failed"
        );

        if error.counts_toward_fatal() {
            let streak = ctx.record_fatal_candidate();
            if streak >= self.settings.fatal_error_threshold {
                self.transition(state, UnitPhase::Exhausted)?;
                let reason =
                    format!("{streak} consecutive generation failures, last: {error}");
                tracing::error!(reason = %reason, "Aborting run");
                ctx.request_stop(StopReason::Fatal(reason));
                return Ok(());
            }
        }

        let retry = self.retry.has_attempts_left(state.attempts)
            && (error.counts_toward_fatal() || self.retry.is_retryable(error));
        if !retry {
            return self.transition(state, UnitPhase::Exhausted);
        }
        self.transition(state, UnitPhase::Pending)?;
        ctx.sleep(self.retry.delay_for(state.consecutive_failures)).await;
        Ok(())
    }

    // ========================================================================
    // Port calls
    // ========================================================================

    async fn generate(
        &self,
        unit: &Arc<SourceUnit>,
        state: &IterationState,
        target: TestTarget,
    ) -> Result<CandidateTest, GenerationError> {
        let uncovered_targets = self.latest.read().await.uncovered_targets(&unit.id);
        let request = GenerationRequest {
            unit: Arc::clone(unit),
            attempt: state.attempts,
            target,
            prior_diagnostics: state.last_diagnostics.clone(),
            uncovered_targets,
        };

        let timeout = self.settings.generation_timeout;
        let candidate = tokio::time::timeout(timeout, self.ports.generator.generate(&request))
            .await
            .map_err(|_| {
                GenerationError::Timeout(format!("no response within {}s", timeout.as_secs()))
            })??;
        self.check_artifact(&candidate)?;
        Ok(candidate)
    }

    /// Reject artifacts that cannot possibly be a test.
    fn check_artifact(&self, candidate: &CandidateTest) -> Result<(), GenerationError> {
        let trimmed = candidate.content.trim();
        if trimmed.is_empty() {
            return Err(GenerationError::InvalidResponse("empty artifact".to_string()));
        }
        let chars = trimmed.chars().count();
        if chars < self.settings.min_artifact_chars {
            return Err(GenerationError::InvalidResponse(format!(
                "artifact too short ({chars} chars, minimum {})",
                self.settings.min_artifact_chars
            )));
        }
        if candidate.code_line_count() == 0 {
            return Err(GenerationError::InvalidResponse(
                "artifact contains only comments".to_string(),
            ));
        }
        Ok(())
    }

    async fn validate(&self, candidate: &CandidateTest) -> ValidationResult {
        let timeout = self.settings.validation_timeout;
        tokio::time::timeout(timeout, self.ports.validator.validate(candidate))
            .await
            .unwrap_or_else(|_| {
                ValidationResult::new(
                    ValidationStatus::RanFailed,
                    format!("validation timed out after {}s", timeout.as_secs()),
                )
            })
    }

    async fn measure(&self, snapshot: &[AcceptedTest]) -> Result<CoverageReport, MeasurementError> {
        let timeout = self.settings.measurement_timeout;
        tokio::time::timeout(timeout, self.ports.analyzer.measure(snapshot))
            .await
            .unwrap_or_else(|_| {
                Err(MeasurementError::BuildBroken(format!(
                    "coverage measurement timed out after {}s",
                    timeout.as_secs()
                )))
            })
    }

    /// Stage, measure and commit or roll back, all inside the commit
    /// critical section.
    async fn measure_and_decide(
        &self,
        unit: &SourceUnit,
        candidate: CandidateTest,
    ) -> Result<Decision, RunError> {
        let mut point = self.commit_point.lock().await;
        let prior = self.latest_report().await;
        let prior_aggregate = prior.aggregate_percent();
        let prior_unit = prior.unit_percent(&unit.id);

        let ticket = point.store.stage(candidate).await?;
        let snapshot = point.store.measurement_set();

        let report = match self.measure(&snapshot).await {
            Ok(report) => report,
            Err(MeasurementError::BuildBroken(diagnostics)) => {
                point.store.rollback().await?;
                let reason = format!("build broken with candidate staged: {diagnostics}");
                self.emit_rollback(&unit.id, &reason);
                return Ok(Decision::RolledBack { reason });
            }
            Err(MeasurementError::ToolchainUnavailable(diagnostics)) => {
                point.store.rollback().await?;
                let reason = format!("toolchain unavailable: {diagnostics}");
                self.emit_rollback(&unit.id, &reason);
                return Ok(Decision::Fatal { reason });
            }
        };

        let aggregate = report.aggregate_percent();
        let unit_coverage = report.unit_percent(&unit.id);
        let threshold = self.settings.threshold;
        let improved = unit_coverage > prior_unit + COVERAGE_EPSILON;
        let newly_met = prior_aggregate + COVERAGE_EPSILON < threshold
            && aggregate + COVERAGE_EPSILON >= threshold;

        if aggregate + COVERAGE_EPSILON < prior_aggregate || !(improved || newly_met) {
            point.store.rollback().await?;
            let reason = format!(
                "no coverage gain: aggregate {prior_aggregate:.2}% -> {aggregate:.2}%, unit {prior_unit:.2}% -> {unit_coverage:.2}%"
            );
            tracing::info!(reason = %reason, "Candidate rolled back");
            self.emit_rollback(&unit.id, &reason);
            return Ok(Decision::RolledBack { reason });
        }

        match point.store.commit(ticket, &report).await {
            Ok(receipt) => {
                point.commits += 1;
                *self.latest.write().await = Arc::new(report);
                tracing::info!(
                    path = %receipt.path.display(),
                    unit_coverage = %format!("{unit_coverage:.2}"),
                    aggregate = %format!("{aggregate:.2}"),
                    accepted = receipt.accepted_count,
                    "Candidate committed"
                );
                self.emit(ControllerEvent::Committed {
                    unit_id: unit.id.clone(),
                    unit_coverage,
                    aggregate,
                });
                Ok(Decision::Committed { unit_coverage })
            }
            Err(err @ StoreError::CoverageRegression { .. }) => {
                let reason = err.to_string();
                self.emit_rollback(&unit.id, &reason);
                Ok(Decision::RolledBack { reason })
            }
            Err(err) => {
                if let Err(rollback_err) = point.store.rollback().await {
                    tracing::warn!(error = %rollback_err, "Rollback after failed commit failed");
                }
                Err(err.into())
            }
        }
    }

    fn emit_rollback(&self, unit_id: &UnitId, reason: &str) {
        self.emit(ControllerEvent::RolledBack {
            unit_id: unit_id.clone(),
            reason: reason.to_string(),
        });
    }

    fn emit(&self, event: ControllerEvent) {
        if let Some(events) = &self.events {
            let _ = events.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::domain::models::{CoverageCounts, Provenance, UnitCoverage};
    use crate::domain::ports::InMemoryWorkspace;
    use crate::services::retry_policy::Backoff;
    use crate::services::run_context::RunBudget;

    const BODY: &str = "class CartTest {\n  @Test\n  void totalIsZeroForEmptyCart() {\n    assertEquals(0, new Cart().total());\n  }\n}\n";

    struct EchoGenerator {
        calls: AtomicU32,
        body: &'static str,
    }

    #[async_trait]
    impl TestGenerator for EchoGenerator {
        fn name(&self) -> &'static str {
            "echo"
        }

        async fn generate(&self, request: &GenerationRequest) -> Result<CandidateTest, GenerationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(CandidateTest::new(
                request.unit.id.clone(),
                request.attempt,
                request.target.clone(),
                self.body,
                Provenance {
                    backend: "echo".into(),
                    model: "none".into(),
                    prompt_revision: "v1".into(),
                },
            ))
        }
    }

    struct PassingValidator;

    #[async_trait]
    impl CandidateValidator for PassingValidator {
        async fn validate(&self, _candidate: &CandidateTest) -> ValidationResult {
            ValidationResult::passed("ok")
        }
    }

    /// Every accepted test adds `step` percent to its unit.
    struct SteppedAnalyzer {
        step: u64,
    }

    #[async_trait]
    impl CoverageAnalyzer for SteppedAnalyzer {
        fn granularity(&self) -> CoverageGranularity {
            CoverageGranularity::Line
        }

        async fn measure(&self, snapshot: &[AcceptedTest]) -> Result<CoverageReport, MeasurementError> {
            let mut units = BTreeMap::new();
            units.insert(
                "shop/Cart.java".to_string(),
                UnitCoverage {
                    counts: CoverageCounts::new((snapshot.len() as u64 * self.step).min(100), 100),
                    uncovered: vec!["L7".into()],
                },
            );
            Ok(CoverageReport::from_units(CoverageGranularity::Line, units))
        }
    }

    fn controller(body: &'static str, step: u64) -> Arc<IterationController> {
        let workspace = InMemoryWorkspace::new();
        let ports = ControllerPorts {
            generator: Arc::new(EchoGenerator {
                calls: AtomicU32::new(0),
                body,
            }),
            validator: Arc::new(PassingValidator),
            analyzer: Arc::new(SteppedAnalyzer { step }),
            workspace: Arc::new(workspace.clone()),
        };
        let settings = ControllerSettings {
            min_artifact_chars: 20,
            ..ControllerSettings::default()
        };
        Arc::new(IterationController::new(
            ports,
            AcceptanceStore::new(Arc::new(workspace)),
            settings,
            RetryPolicy::new(10, Backoff::None),
        ))
    }

    fn cart() -> SourceUnit {
        SourceUnit::new(
            UnitId::new("shop/Cart.java"),
            "src/main/java/shop/Cart.java",
            "shop.Cart",
            "package shop;\npublic class Cart { public int total() { return 0; } }\n",
            vec![],
        )
    }

    fn ctx() -> Arc<RunContext> {
        Arc::new(RunContext::new(RunBudget {
            max_iterations: 20,
            max_wall_time: Duration::from_secs(60),
        }))
    }

    #[tokio::test]
    async fn test_unit_reaches_threshold() {
        let controller = controller(BODY, 40);
        let report = Arc::clone(&controller).run(vec![cart()], ctx()).await.unwrap();
        assert_eq!(report.outcome, RunOutcome::Passed);
        assert_eq!(report.commits, 2);
        let unit = &report.units[0];
        assert_eq!(unit.phase, UnitPhase::Done);
        assert_eq!(unit.accepted_tests.len(), 2);
        assert_eq!(controller.accepted_set().await.len(), 2);
    }

    #[tokio::test]
    async fn test_comment_only_artifacts_are_invalid() {
        let controller = controller("// nothing to see here, really nothing at all", 40);
        let report = Arc::clone(&controller).run(vec![cart()], ctx()).await.unwrap();
        assert_eq!(report.outcome, RunOutcome::Aborted);
        assert_eq!(report.commits, 0);
        assert!(matches!(report.stop_reason, StopReason::Fatal(ref r) if r.contains("only comments")));
    }

    #[tokio::test]
    async fn test_no_gain_is_rolled_back() {
        let controller = controller(BODY, 0);
        let report = Arc::clone(&controller).run(vec![cart()], ctx()).await.unwrap();
        assert_eq!(report.outcome, RunOutcome::BelowThreshold);
        assert_eq!(report.commits, 0);
        let unit = &report.units[0];
        assert_eq!(unit.phase, UnitPhase::Exhausted);
        assert!(unit
            .last_diagnostics
            .as_deref()
            .is_some_and(|d| d.starts_with("no coverage gain")));
        assert!(controller.accepted_set().await.is_empty());
    }

    #[tokio::test]
    async fn test_empty_unit_is_exhausted_without_generation() {
        let controller = controller(BODY, 40);
        let empty = SourceUnit::new(UnitId::new("shop/Empty.java"), "Empty.java", "Empty", "", vec![]);
        let report = Arc::clone(&controller).run(vec![empty], ctx()).await.unwrap();
        assert_eq!(report.units[0].phase, UnitPhase::Exhausted);
        assert_eq!(report.total_iterations, 0);
    }
}
