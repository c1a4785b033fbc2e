//! Per-unit iteration state machine and run results.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::coverage::CoverageGranularity;
use super::source_unit::{SourceUnit, UnitId};
use crate::domain::errors::{DomainError, DomainResult};

/// Phase of a unit in the generate → validate → measure cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitPhase {
    /// Waiting for the next generation attempt
    #[default]
    Pending,
    /// Candidate requested from the generation backend
    Generating,
    /// Candidate running in isolation
    Validating,
    /// Candidate staged, whole suite being measured
    Measuring,
    /// Candidate promoted into the accepted set
    Committed,
    /// Staged candidate discarded
    RolledBack,
    /// Unit meets the threshold
    Done,
    /// Attempt or failure budget spent
    Exhausted,
}

impl UnitPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Generating => "generating",
            Self::Validating => "validating",
            Self::Measuring => "measuring",
            Self::Committed => "committed",
            Self::RolledBack => "rolled_back",
            Self::Done => "done",
            Self::Exhausted => "exhausted",
        }
    }

    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Exhausted)
    }

    /// Valid transitions from this phase.
    pub fn valid_transitions(&self) -> Vec<Self> {
        match self {
            Self::Pending => vec![Self::Generating, Self::Exhausted],
            Self::Generating => vec![Self::Validating, Self::Pending, Self::Exhausted],
            Self::Validating => vec![Self::Measuring, Self::Pending],
            Self::Measuring => vec![Self::Committed, Self::RolledBack],
            Self::Committed => vec![Self::Done, Self::Pending],
            Self::RolledBack => vec![Self::Pending, Self::Exhausted],
            Self::Done | Self::Exhausted => vec![],
        }
    }

    pub fn can_transition_to(&self, next: Self) -> bool {
        self.valid_transitions().contains(&next)
    }
}

impl std::fmt::Display for UnitPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Counters for one unit, owned by the controller task driving that unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IterationState {
    pub unit_id: UnitId,
    pub source_hash: String,
    pub phase: UnitPhase,
    /// Generation attempts made
    pub attempts: u32,
    /// Failures since the last commit
    pub consecutive_failures: u32,
    pub total_failures: u32,
    pub commits: u32,
    /// Best unit coverage seen in a committed report
    pub best_coverage: f64,
    /// Diagnostics of the last rejected candidate
    pub last_diagnostics: Option<String>,
    /// Every phase entered, in order, starting with the initial one
    pub transitions: Vec<UnitPhase>,
}

impl IterationState {
    pub fn new(unit: &SourceUnit, initial_coverage: f64) -> Self {
        Self {
            unit_id: unit.id.clone(),
            source_hash: unit.source_hash.clone(),
            phase: UnitPhase::Pending,
            attempts: 0,
            consecutive_failures: 0,
            total_failures: 0,
            commits: 0,
            best_coverage: initial_coverage,
            last_diagnostics: None,
            transitions: vec![UnitPhase::Pending],
        }
    }

    /// Move to `next`, enforcing the state machine.
    pub fn advance(&mut self, next: UnitPhase) -> DomainResult<()> {
        if !self.phase.can_transition_to(next) {
            return Err(DomainError::InvalidStateTransition {
                from: self.phase.to_string(),
                to: next.to_string(),
                reason: format!("unit {}", self.unit_id),
            });
        }
        self.phase = next;
        self.transitions.push(next);
        Ok(())
    }

    /// Mark a unit that already meets the threshold before any work.
    pub fn settle_done(&mut self) {
        self.phase = UnitPhase::Done;
        self.transitions.push(UnitPhase::Done);
    }

    pub fn record_failure(&mut self, diagnostics: Option<String>) {
        self.consecutive_failures += 1;
        self.total_failures += 1;
        if diagnostics.is_some() {
            self.last_diagnostics = diagnostics;
        }
    }

    pub fn record_commit(&mut self, unit_coverage: f64) {
        self.commits += 1;
        self.consecutive_failures = 0;
        if unit_coverage > self.best_coverage {
            self.best_coverage = unit_coverage;
        }
    }

    /// Reset counters when the unit's source changed underneath us.
    ///
    /// Returns true if a reset happened.
    pub fn observe_source(&mut self, unit: &SourceUnit) -> bool {
        if unit.source_hash == self.source_hash {
            return false;
        }
        *self = Self::new(unit, 0.0);
        true
    }

    /// Fresh state for a new run, seeded from the unit's previous run.
    ///
    /// Budgets are per run, so only the last rejection diagnostics carry
    /// over, and only while the source is unchanged.
    pub fn resume(mut previous: Self, unit: &SourceUnit, initial_coverage: f64) -> Self {
        previous.observe_source(unit);
        let mut state = Self::new(unit, initial_coverage);
        state.last_diagnostics = previous.last_diagnostics;
        state
    }
}

/// Why the run stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "reason", content = "detail")]
pub enum StopReason {
    /// Every unit reached `Done` or `Exhausted`
    AllUnitsSettled,
    IterationBudgetSpent,
    WallClockBudgetSpent,
    Cancelled,
    /// A fatal error aborted the run
    Fatal(String),
}

/// Overall verdict handed to the calling workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// Aggregate coverage meets the threshold
    Passed,
    /// Aggregate coverage below threshold at the end of the run
    BelowThreshold,
    /// Run aborted by a fatal error
    Aborted,
}

impl RunOutcome {
    /// Process exit code for CI gating.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Passed => 0,
            Self::BelowThreshold => 1,
            Self::Aborted => 2,
        }
    }
}

/// Final state of one unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitReport {
    pub unit_id: UnitId,
    pub qualified_name: String,
    pub phase: UnitPhase,
    pub attempts: u32,
    pub commits: u32,
    pub failures: u32,
    pub coverage_percent: f64,
    pub accepted_tests: Vec<PathBuf>,
    /// Diagnostics of the last rejected candidate, kept for operators
    pub last_diagnostics: Option<String>,
}

/// Result of a whole run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub threshold: f64,
    pub granularity: CoverageGranularity,
    pub baseline_percent: f64,
    pub aggregate_percent: f64,
    pub total_iterations: u32,
    pub commits: u32,
    pub outcome: RunOutcome,
    pub stop_reason: StopReason,
    pub units: Vec<UnitReport>,
}

impl RunReport {
    pub fn passed(&self) -> bool {
        self.outcome == RunOutcome::Passed
    }

    pub fn unit(&self, id: &UnitId) -> Option<&UnitReport> {
        self.units.iter().find(|unit| &unit.unit_id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(text: &str) -> SourceUnit {
        SourceUnit::new(UnitId::new("Cart.java"), "Cart.java", "shop.Cart", text, vec![])
    }

    #[test]
    fn happy_path_transitions() {
        let mut state = IterationState::new(&unit("class Cart {}"), 0.0);
        for next in [
            UnitPhase::Generating,
            UnitPhase::Validating,
            UnitPhase::Measuring,
            UnitPhase::Committed,
            UnitPhase::Done,
        ] {
            state.advance(next).expect("valid transition");
        }
        assert!(state.phase.is_terminal());
        assert_eq!(state.transitions.len(), 6);
    }

    #[test]
    fn invalid_transition_is_rejected() {
        let mut state = IterationState::new(&unit("class Cart {}"), 0.0);
        let err = state.advance(UnitPhase::Committed).unwrap_err();
        assert!(matches!(err, DomainError::InvalidStateTransition { .. }));
        assert_eq!(state.phase, UnitPhase::Pending);
    }

    #[test]
    fn terminal_phases_have_no_exits() {
        assert!(UnitPhase::Done.valid_transitions().is_empty());
        assert!(UnitPhase::Exhausted.valid_transitions().is_empty());
    }

    #[test]
    fn commit_resets_consecutive_failures() {
        let mut state = IterationState::new(&unit("class Cart {}"), 10.0);
        state.record_failure(Some("boom".into()));
        state.record_failure(None);
        assert_eq!(state.consecutive_failures, 2);
        assert_eq!(state.last_diagnostics.as_deref(), Some("boom"));

        state.record_commit(30.0);
        assert_eq!(state.consecutive_failures, 0);
        assert_eq!(state.total_failures, 2);
        assert!((state.best_coverage - 30.0).abs() < f64::EPSILON);

        state.record_commit(20.0);
        assert!((state.best_coverage - 30.0).abs() < f64::EPSILON);
    }

    #[test]
    fn changed_source_resets_state() {
        let mut state = IterationState::new(&unit("class Cart {}"), 0.0);
        state.record_failure(None);
        state.attempts = 3;

        assert!(!state.observe_source(&unit("class Cart {}")));
        assert_eq!(state.attempts, 3);

        assert!(state.observe_source(&unit("class Cart { int n; }")));
        assert_eq!(state.attempts, 0);
        assert_eq!(state.consecutive_failures, 0);
    }

    #[test]
    fn resume_carries_diagnostics_only_for_unchanged_source() {
        let mut previous = IterationState::new(&unit("class Cart {}"), 10.0);
        previous.attempts = 6;
        previous.record_failure(Some("cannot find symbol: Money".into()));
        previous.advance(UnitPhase::Generating).unwrap();

        let same = IterationState::resume(previous.clone(), &unit("class Cart {}"), 40.0);
        assert_eq!(same.phase, UnitPhase::Pending);
        assert_eq!(same.attempts, 0);
        assert_eq!(same.consecutive_failures, 0);
        assert!((same.best_coverage - 40.0).abs() < f64::EPSILON);
        assert_eq!(same.last_diagnostics.as_deref(), Some("cannot find symbol: Money"));

        let edited = IterationState::resume(previous, &unit("class Cart { Money m; }"), 40.0);
        assert_eq!(edited.last_diagnostics, None);
        assert_eq!(edited.source_hash, SourceUnit::hash_source("class Cart { Money m; }"));
    }

    #[test]
    fn exit_codes() {
        assert_eq!(RunOutcome::Passed.exit_code(), 0);
        assert_eq!(RunOutcome::BelowThreshold.exit_code(), 1);
        assert_eq!(RunOutcome::Aborted.exit_code(), 2);
    }
}
