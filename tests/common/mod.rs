//! Common test utilities for integration tests
//!
//! Provides fake ports and fixtures shared by the synthesis loop tests:
//! a canned generator, fixed-verdict validators, and a coverage analyzer
//! whose numbers are a pure function of the accepted set.

#![allow(dead_code)]

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};

use covsynth::adapters::generators::{ScriptedGenerator, ScriptedResponse};
use covsynth::domain::errors::{GenerationError, MeasurementError};
use covsynth::domain::models::{
    AcceptedTest, CandidateTest, CoverageCounts, CoverageGranularity, CoverageReport, SourceUnit,
    UnitCoverage, UnitId, ValidationResult, ValidationStatus,
};
use covsynth::domain::ports::{
    CandidateValidator, CoverageAnalyzer, GenerationRequest, InMemoryWorkspace, TestGenerator,
};
use covsynth::services::{
    AcceptanceStore, Backoff, ControllerEvent, ControllerPorts, ControllerSettings,
    IterationController, RetryPolicy, RunBudget, RunContext,
};

/// A plausible JUnit test body, long enough to pass the artifact checks.
pub const TEST_BODY: &str = "\
package shop;

import org.junit.jupiter.api.Test;
import static org.junit.jupiter.api.Assertions.assertEquals;

class GeneratedTest {
    @Test
    void totalIsZeroForEmptyCart() {
        assertEquals(0, new Cart().total());
    }
}
";

/// Setup test logging
///
/// Initializes tracing subscriber for test output.
/// Call this at the beginning of tests that need logging.
pub fn setup_test_logging() {
    use tracing_subscriber::fmt;

    let _ = fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// A small Java source unit under `shop/`.
pub fn unit(name: &str) -> SourceUnit {
    SourceUnit::new(
        UnitId::new(format!("shop/{name}.java")),
        format!("src/main/java/shop/{name}.java"),
        format!("shop.{name}"),
        format!("package shop;\n\npublic class {name} {{\n    public int total() {{ return 0; }}\n}}\n"),
        vec![],
    )
}

/// Generator that answers every request with [`TEST_BODY`].
pub fn echo_generator() -> Arc<ScriptedGenerator> {
    Arc::new(ScriptedGenerator::with_fallback(ScriptedResponse::Artifact(
        TEST_BODY.to_string(),
    )))
}

pub fn run_context(max_iterations: u32) -> Arc<RunContext> {
    Arc::new(RunContext::new(RunBudget {
        max_iterations,
        max_wall_time: Duration::from_secs(60),
    }))
}

pub fn settings(threshold: f64, concurrency: usize) -> ControllerSettings {
    ControllerSettings {
        threshold,
        concurrency,
        min_artifact_chars: 20,
        ..ControllerSettings::default()
    }
}

/// Controller over an in-memory test tree, with an event receiver.
pub fn controller(
    generator: Arc<dyn TestGenerator>,
    validator: Arc<dyn CandidateValidator>,
    analyzer: Arc<dyn CoverageAnalyzer>,
    settings: ControllerSettings,
) -> (
    Arc<IterationController>,
    InMemoryWorkspace,
    mpsc::UnboundedReceiver<ControllerEvent>,
) {
    let workspace = InMemoryWorkspace::new();
    let ports = ControllerPorts {
        generator,
        validator,
        analyzer,
        workspace: Arc::new(workspace.clone()),
    };
    let (tx, rx) = mpsc::unbounded_channel();
    let controller = IterationController::new(
        ports,
        AcceptanceStore::new(Arc::new(workspace.clone())),
        settings,
        RetryPolicy::new(10, Backoff::None),
    )
    .with_events(tx);
    (Arc::new(controller), workspace, rx)
}

/// Drain every event already sent.
pub fn drain(rx: &mut mpsc::UnboundedReceiver<ControllerEvent>) -> Vec<ControllerEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

// ============================================================================
// Validators
// ============================================================================

/// Validator returning the same verdict for every candidate.
pub struct FixedValidator {
    status: ValidationStatus,
    pub calls: AtomicU32,
}

impl FixedValidator {
    pub fn passing() -> Arc<Self> {
        Arc::new(Self {
            status: ValidationStatus::RanPassed,
            calls: AtomicU32::new(0),
        })
    }

    pub fn with_status(status: ValidationStatus) -> Arc<Self> {
        Arc::new(Self {
            status,
            calls: AtomicU32::new(0),
        })
    }
}

#[async_trait]
impl CandidateValidator for FixedValidator {
    async fn validate(&self, candidate: &CandidateTest) -> ValidationResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        ValidationResult::new(
            self.status,
            format!("{}: {}", candidate.target.class_name, self.status),
        )
    }
}

// ============================================================================
// Generators
// ============================================================================

/// Generator that sleeps before answering and tracks how many calls overlap.
pub struct SlowGenerator {
    delay: Duration,
    in_flight: AtomicU32,
    pub max_in_flight: AtomicU32,
}

impl SlowGenerator {
    pub fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            in_flight: AtomicU32::new(0),
            max_in_flight: AtomicU32::new(0),
        })
    }
}

#[async_trait]
impl TestGenerator for SlowGenerator {
    fn name(&self) -> &'static str {
        "slow"
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<CandidateTest, GenerationError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        Ok(CandidateTest::new(
            request.unit.id.clone(),
            request.attempt,
            request.target.clone(),
            TEST_BODY,
            covsynth::domain::models::Provenance {
                backend: "slow".into(),
                model: "none".into(),
                prompt_revision: "test".into(),
            },
        ))
    }
}

// ============================================================================
// Coverage analyzer
// ============================================================================

/// Analyzer where each accepted test adds `step` percent to its own unit.
///
/// Every known unit has 100 lines, so the aggregate is the mean of the unit
/// percentages. Measurements can be slowed down and scripted to fail, and
/// the analyzer records how many measurements ever overlapped.
pub struct SteppedAnalyzer {
    units: Vec<UnitId>,
    step: u64,
    delay: Duration,
    failures: Mutex<VecDeque<(u32, MeasurementError)>>,
    calls: AtomicU32,
    in_flight: AtomicU32,
    pub max_in_flight: AtomicU32,
    snapshots: Mutex<Vec<Vec<AcceptedTest>>>,
}

impl SteppedAnalyzer {
    pub fn new(units: &[SourceUnit], step: u64) -> Self {
        Self {
            units: units.iter().map(|unit| unit.id.clone()).collect(),
            step,
            delay: Duration::ZERO,
            failures: Mutex::new(VecDeque::new()),
            calls: AtomicU32::new(0),
            in_flight: AtomicU32::new(0),
            max_in_flight: AtomicU32::new(0),
            snapshots: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Fail the `call`-th measurement (1-based; the baseline is call 1).
    #[must_use]
    pub fn failing_on(mut self, call: u32, error: MeasurementError) -> Self {
        self.failures.get_mut().push_back((call, error));
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// The snapshot passed to every measurement, in call order.
    pub async fn snapshots(&self) -> Vec<Vec<AcceptedTest>> {
        self.snapshots.lock().await.clone()
    }

    fn report(&self, snapshot: &[AcceptedTest]) -> CoverageReport {
        let mut units = BTreeMap::new();
        for id in &self.units {
            let tests = snapshot.iter().filter(|t| &t.unit_id == id).count() as u64;
            let covered = (tests * self.step).min(100);
            units.insert(
                id.to_string(),
                UnitCoverage {
                    counts: CoverageCounts::new(covered, 100),
                    uncovered: (covered + 1..=100).map(|line| format!("L{line}")).collect(),
                },
            );
        }
        CoverageReport::from_units(CoverageGranularity::Line, units)
    }
}

#[async_trait]
impl CoverageAnalyzer for SteppedAnalyzer {
    fn granularity(&self) -> CoverageGranularity {
        CoverageGranularity::Line
    }

    async fn measure(&self, snapshot: &[AcceptedTest]) -> Result<CoverageReport, MeasurementError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.snapshots.lock().await.push(snapshot.to_vec());

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let mut failures = self.failures.lock().await;
        if failures.front().is_some_and(|(at, _)| *at == call) {
            if let Some((_, error)) = failures.pop_front() {
                return Err(error);
            }
        }
        drop(failures);
        Ok(self.report(snapshot))
    }
}
