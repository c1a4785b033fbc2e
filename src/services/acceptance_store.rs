//! Acceptance store: the transactional set of accepted tests.
//!
//! Every candidate that survives validation goes through
//! [`stage`](AcceptanceStore::stage) → measurement →
//! [`commit`](AcceptanceStore::commit) or
//! [`rollback`](AcceptanceStore::rollback). At most one change is staged at a
//! time, and the set retained by the last commit is kept for exactly one
//! rollback step.
//!
//! Artifacts are files in the test tree (through an [`ArtifactWorkspace`]);
//! the ordered set itself is persisted as a JSON manifest after every commit
//! and rollback so a later run starts from the same accepted suite.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::errors::StoreError;
use crate::domain::models::{
    AcceptedTest, CandidateTest, CoverageReport, IterationState, SourceUnit, UnitId,
};
use crate::domain::ports::ArtifactWorkspace;

/// File name of the manifest inside the state workspace.
pub const MANIFEST_FILE: &str = "accepted.json";

const MANIFEST_VERSION: u32 = 1;

/// Aggregate drops smaller than this are measurement noise, not regressions.
const COVERAGE_EPSILON: f64 = 1e-9;

/// Persisted form of the accepted set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcceptanceManifest {
    pub version: u32,
    /// Aggregate coverage of the last committed report
    pub committed_aggregate: Option<f64>,
    pub updated_at: DateTime<Utc>,
    pub tests: Vec<AcceptedTest>,
    /// Final iteration state of each unit from the most recent run
    #[serde(default)]
    pub units: BTreeMap<UnitId, IterationState>,
}

/// Handle returned by [`AcceptanceStore::stage`], required to commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageTicket {
    pub candidate_id: Uuid,
}

/// What a rollback actually did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollbackOutcome {
    /// A staged candidate was discarded
    DiscardedStaged,
    /// The last commit was reverted
    RevertedCommit,
    /// Nothing to roll back
    NoOp,
}

/// Summary of a successful commit.
#[derive(Debug, Clone, PartialEq)]
pub struct CommitReceipt {
    pub candidate_id: Uuid,
    pub unit_id: UnitId,
    pub path: PathBuf,
    pub previous_aggregate: Option<f64>,
    pub aggregate: f64,
    pub accepted_count: usize,
}

#[derive(Debug, Clone)]
struct StagedChange {
    candidate: CandidateTest,
}

/// Set retained by the last commit.
#[derive(Debug, Clone)]
struct RollbackTarget {
    tests: Vec<AcceptedTest>,
    committed_aggregate: Option<f64>,
    added_path: PathBuf,
}

/// Accepted test set with stage/commit/rollback semantics.
pub struct AcceptanceStore {
    tests_workspace: Arc<dyn ArtifactWorkspace>,
    state_workspace: Option<Arc<dyn ArtifactWorkspace>>,
    accepted: Vec<AcceptedTest>,
    committed_aggregate: Option<f64>,
    staged: Option<StagedChange>,
    previous: Option<RollbackTarget>,
    unit_states: BTreeMap<UnitId, IterationState>,
}

impl AcceptanceStore {
    /// Empty store without a manifest.
    pub fn new(tests_workspace: Arc<dyn ArtifactWorkspace>) -> Self {
        Self {
            tests_workspace,
            state_workspace: None,
            accepted: Vec::new(),
            committed_aggregate: None,
            staged: None,
            previous: None,
            unit_states: BTreeMap::new(),
        }
    }

    /// Store backed by a manifest in `state_workspace`, loading any
    /// previously accepted set.
    pub async fn open(
        tests_workspace: Arc<dyn ArtifactWorkspace>,
        state_workspace: Arc<dyn ArtifactWorkspace>,
    ) -> Result<Self, StoreError> {
        let mut store = Self::new(tests_workspace);
        if let Some(raw) = state_workspace.read(Path::new(MANIFEST_FILE)).await? {
            let manifest: AcceptanceManifest = serde_json::from_str(&raw)?;
            tracing::debug!(
                tests = manifest.tests.len(),
                version = manifest.version,
                "Loaded acceptance manifest"
            );
            for test in &manifest.tests {
                match store.tests_workspace.read(&test.target.relative_path).await? {
                    Some(on_disk) if !test.matches(&on_disk) => tracing::warn!(
                        path = %test.target.relative_path.display(),
                        "Accepted test was edited since acceptance"
                    ),
                    None => tracing::warn!(
                        path = %test.target.relative_path.display(),
                        "Accepted test is missing from the test tree"
                    ),
                    Some(_) => {}
                }
            }
            store.accepted = manifest.tests;
            store.committed_aggregate = manifest.committed_aggregate;
            store.unit_states = manifest.units;
        }
        store.state_workspace = Some(state_workspace);
        Ok(store)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// The committed set, in acceptance order.
    pub fn current_set(&self) -> &[AcceptedTest] {
        &self.accepted
    }

    /// The committed set plus the staged candidate, if any.
    ///
    /// This is what the coverage analyzer must run while a change is staged.
    pub fn measurement_set(&self) -> Vec<AcceptedTest> {
        let mut set = self.accepted.clone();
        if let Some(staged) = &self.staged {
            set.push(AcceptedTest::from(staged.candidate.clone()));
        }
        set
    }

    pub fn accepted_for(&self, unit: &UnitId) -> Vec<&AcceptedTest> {
        self.accepted.iter().filter(|test| &test.unit_id == unit).collect()
    }

    pub fn committed_aggregate(&self) -> Option<f64> {
        self.committed_aggregate
    }

    pub fn has_staged(&self) -> bool {
        self.staged.is_some()
    }

    pub fn has_rollback_target(&self) -> bool {
        self.previous.is_some()
    }

    /// Starting state for `unit`, seeded from its last recorded run.
    pub fn resume_state(&self, unit: &SourceUnit, initial_coverage: f64) -> IterationState {
        match self.unit_states.get(&unit.id) {
            Some(previous) => {
                let state = IterationState::resume(previous.clone(), unit, initial_coverage);
                if previous.source_hash != unit.source_hash {
                    tracing::debug!(unit = %unit.id, "Source changed since last run; history reset");
                }
                state
            }
            None => IterationState::new(unit, initial_coverage),
        }
    }

    /// Remember how each unit ended and rewrite the manifest.
    pub async fn record_unit_states<'a>(
        &mut self,
        states: impl IntoIterator<Item = &'a IterationState>,
    ) -> Result<(), StoreError> {
        for state in states {
            self.unit_states.insert(state.unit_id.clone(), state.clone());
        }
        self.persist(&self.accepted, self.committed_aggregate).await
    }

    /// Reset the regression floor to a freshly measured baseline.
    pub fn set_baseline(&mut self, report: &CoverageReport) {
        self.committed_aggregate = Some(report.aggregate_percent());
    }

    // ========================================================================
    // Transactions
    // ========================================================================

    /// Write `candidate` next to the accepted set without replacing it.
    pub async fn stage(&mut self, candidate: CandidateTest) -> Result<StageTicket, StoreError> {
        if let Some(staged) = &self.staged {
            return Err(StoreError::AlreadyStaged(staged.candidate.unit_id.to_string()));
        }
        let path = &candidate.target.relative_path;
        ensure_within_root(path)?;
        if self.tests_workspace.read(path).await?.is_some() {
            return Err(StoreError::ArtifactExists(path.clone()));
        }

        self.tests_workspace.write(path, &candidate.content).await?;
        tracing::debug!(
            unit = %candidate.unit_id,
            path = %path.display(),
            "Staged candidate"
        );

        let ticket = StageTicket {
            candidate_id: candidate.id,
        };
        self.staged = Some(StagedChange { candidate });
        Ok(ticket)
    }

    /// Promote the staged candidate, measured by `report`.
    ///
    /// A report whose aggregate is below the committed aggregate is rejected
    /// with [`StoreError::CoverageRegression`] and the staged change is
    /// discarded.
    pub async fn commit(
        &mut self,
        ticket: StageTicket,
        report: &CoverageReport,
    ) -> Result<CommitReceipt, StoreError> {
        let staged = self.staged.as_ref().ok_or(StoreError::NothingStaged)?;
        if staged.candidate.id != ticket.candidate_id {
            return Err(StoreError::TicketMismatch(ticket.candidate_id));
        }

        let attempted = report.aggregate_percent();
        if let Some(previous) = self.committed_aggregate {
            if attempted + COVERAGE_EPSILON < previous {
                self.rollback().await?;
                return Err(StoreError::CoverageRegression {
                    previous,
                    attempted,
                });
            }
        }

        let Some(staged) = self.staged.take() else {
            return Err(StoreError::NothingStaged);
        };
        let mut next = self.accepted.clone();
        next.push(AcceptedTest::from(staged.candidate.clone()));

        if let Err(err) = self.persist(&next, Some(attempted)).await {
            self.staged = Some(staged);
            return Err(err);
        }

        let receipt = CommitReceipt {
            candidate_id: staged.candidate.id,
            unit_id: staged.candidate.unit_id.clone(),
            path: staged.candidate.target.relative_path.clone(),
            previous_aggregate: self.committed_aggregate,
            aggregate: attempted,
            accepted_count: next.len(),
        };
        self.previous = Some(RollbackTarget {
            tests: std::mem::replace(&mut self.accepted, next),
            committed_aggregate: self.committed_aggregate.replace(attempted),
            added_path: staged.candidate.target.relative_path,
        });
        Ok(receipt)
    }

    /// Discard the staged change, or revert the last commit if nothing is
    /// staged. Either way no rollback target remains afterwards.
    pub async fn rollback(&mut self) -> Result<RollbackOutcome, StoreError> {
        if let Some(staged) = self.staged.take() {
            if let Err(err) = self
                .tests_workspace
                .remove(&staged.candidate.target.relative_path)
                .await
            {
                self.staged = Some(staged);
                return Err(err.into());
            }
            self.previous = None;
            self.persist(&self.accepted, self.committed_aggregate).await?;
            tracing::debug!(unit = %staged.candidate.unit_id, "Discarded staged candidate");
            return Ok(RollbackOutcome::DiscardedStaged);
        }

        let Some(previous) = self.previous.take() else {
            return Ok(RollbackOutcome::NoOp);
        };
        self.persist(&previous.tests, previous.committed_aggregate).await?;
        self.tests_workspace.remove(&previous.added_path).await?;
        tracing::info!(
            path = %previous.added_path.display(),
            "Reverted last commit"
        );
        self.accepted = previous.tests;
        self.committed_aggregate = previous.committed_aggregate;
        Ok(RollbackOutcome::RevertedCommit)
    }

    async fn persist(
        &self,
        tests: &[AcceptedTest],
        committed_aggregate: Option<f64>,
    ) -> Result<(), StoreError> {
        let Some(state) = &self.state_workspace else {
            return Ok(());
        };
        let manifest = AcceptanceManifest {
            version: MANIFEST_VERSION,
            committed_aggregate,
            updated_at: Utc::now(),
            tests: tests.to_vec(),
            units: self.unit_states.clone(),
        };
        let raw = serde_json::to_string_pretty(&manifest)?;
        state.write(Path::new(MANIFEST_FILE), &raw).await?;
        Ok(())
    }
}

impl std::fmt::Debug for AcceptanceStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AcceptanceStore")
            .field("accepted", &self.accepted.len())
            .field("committed_aggregate", &self.committed_aggregate)
            .field("staged", &self.staged.is_some())
            .field("rollback_target", &self.previous.is_some())
            .finish_non_exhaustive()
    }
}

fn ensure_within_root(path: &Path) -> Result<(), StoreError> {
    let escapes = path.as_os_str().is_empty()
        || path.components().any(|component| {
            !matches!(component, Component::Normal(_) | Component::CurDir)
        });
    if escapes {
        return Err(StoreError::PathEscapesRoot(path.to_path_buf()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::domain::models::{
        CoverageCounts, CoverageGranularity, Provenance, TestTarget, UnitCoverage,
    };
    use crate::domain::ports::InMemoryWorkspace;

    fn candidate(unit: &str, class: &str) -> CandidateTest {
        CandidateTest::new(
            UnitId::new(unit),
            1,
            TestTarget {
                relative_path: PathBuf::from(format!("shop/{class}.java")),
                class_name: class.to_string(),
            },
            format!("class {class} {{ @Test void works() {{}} }}"),
            Provenance {
                backend: "mock".into(),
                model: "scripted".into(),
                prompt_revision: "v1".into(),
            },
        )
    }

    fn report(covered: u64) -> CoverageReport {
        let mut units = BTreeMap::new();
        units.insert(
            "shop/Cart.java".to_string(),
            UnitCoverage {
                counts: CoverageCounts::new(covered, 100),
                uncovered: vec![],
            },
        );
        CoverageReport::from_units(CoverageGranularity::Line, units)
    }

    fn store() -> (AcceptanceStore, InMemoryWorkspace, InMemoryWorkspace) {
        let tests = InMemoryWorkspace::new();
        let state = InMemoryWorkspace::new();
        let mut store = AcceptanceStore::new(Arc::new(tests.clone()));
        store.state_workspace = Some(Arc::new(state.clone()));
        (store, tests, state)
    }

    #[tokio::test]
    async fn test_stage_then_commit() {
        let (mut store, tests, state) = store();
        let ticket = store.stage(candidate("shop/Cart.java", "CartTest")).await.unwrap();
        assert!(store.current_set().is_empty());
        assert_eq!(store.measurement_set().len(), 1);

        let receipt = store.commit(ticket, &report(20)).await.unwrap();
        assert_eq!(receipt.accepted_count, 1);
        assert_eq!(store.current_set().len(), 1);
        assert!(!store.has_staged());
        assert!(tests.files().await.contains_key(Path::new("shop/CartTest.java")));

        let raw = state.files().await[Path::new(MANIFEST_FILE)].clone();
        let manifest: AcceptanceManifest = serde_json::from_str(&raw).unwrap();
        assert_eq!(manifest.tests.len(), 1);
        assert_eq!(manifest.committed_aggregate, Some(20.0));
    }

    #[tokio::test]
    async fn test_only_one_staged_change() {
        let (mut store, _, _) = store();
        store.stage(candidate("shop/Cart.java", "CartTest")).await.unwrap();
        let err = store
            .stage(candidate("shop/Order.java", "OrderTest"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::AlreadyStaged(_)));
    }

    #[tokio::test]
    async fn test_rollback_discards_staged_and_is_idempotent() {
        let (mut store, tests, _) = store();
        let ticket = store.stage(candidate("shop/Cart.java", "CartTest")).await.unwrap();
        store.commit(ticket, &report(20)).await.unwrap();
        store.stage(candidate("shop/Cart.java", "CartTest2")).await.unwrap();

        assert_eq!(store.rollback().await.unwrap(), RollbackOutcome::DiscardedStaged);
        assert_eq!(store.rollback().await.unwrap(), RollbackOutcome::NoOp);
        assert_eq!(store.current_set().len(), 1);
        assert_eq!(tests.files().await.len(), 1);
    }

    #[tokio::test]
    async fn test_rollback_reverts_last_commit_once() {
        let (mut store, tests, _) = store();
        let ticket = store.stage(candidate("shop/Cart.java", "CartTest")).await.unwrap();
        store.commit(ticket, &report(20)).await.unwrap();
        let ticket = store.stage(candidate("shop/Cart.java", "CartTest2")).await.unwrap();
        store.commit(ticket, &report(40)).await.unwrap();

        assert_eq!(store.rollback().await.unwrap(), RollbackOutcome::RevertedCommit);
        assert_eq!(store.current_set().len(), 1);
        assert_eq!(store.committed_aggregate(), Some(20.0));
        assert!(!tests.files().await.contains_key(Path::new("shop/CartTest2.java")));

        assert_eq!(store.rollback().await.unwrap(), RollbackOutcome::NoOp);
        assert_eq!(store.current_set().len(), 1);
    }

    #[tokio::test]
    async fn test_regression_is_rejected() {
        let (mut store, tests, _) = store();
        let ticket = store.stage(candidate("shop/Cart.java", "CartTest")).await.unwrap();
        store.commit(ticket, &report(50)).await.unwrap();

        let ticket = store.stage(candidate("shop/Cart.java", "CartTest2")).await.unwrap();
        let err = store.commit(ticket, &report(40)).await.unwrap_err();
        assert!(matches!(err, StoreError::CoverageRegression { .. }));
        assert!(!store.has_staged());
        assert_eq!(store.current_set().len(), 1);
        assert_eq!(tests.files().await.len(), 1);
    }

    #[tokio::test]
    async fn test_ticket_must_match() {
        let (mut store, _, _) = store();
        store.stage(candidate("shop/Cart.java", "CartTest")).await.unwrap();
        let bogus = StageTicket {
            candidate_id: Uuid::new_v4(),
        };
        assert!(matches!(
            store.commit(bogus, &report(10)).await,
            Err(StoreError::TicketMismatch(_))
        ));
        assert!(matches!(
            AcceptanceStore::new(Arc::new(InMemoryWorkspace::new()))
                .commit(bogus, &report(10))
                .await,
            Err(StoreError::NothingStaged)
        ));
    }

    #[tokio::test]
    async fn test_existing_and_escaping_paths_are_refused() {
        let (mut store, tests, _) = store();
        tests
            .write(Path::new("shop/CartTest.java"), "hand written")
            .await
            .unwrap();
        assert!(matches!(
            store.stage(candidate("shop/Cart.java", "CartTest")).await,
            Err(StoreError::ArtifactExists(_))
        ));

        let mut escaping = candidate("shop/Cart.java", "Evil");
        escaping.target.relative_path = PathBuf::from("../Evil.java");
        assert!(matches!(
            store.stage(escaping).await,
            Err(StoreError::PathEscapesRoot(_))
        ));
        assert_eq!(
            tests.files().await[Path::new("shop/CartTest.java")],
            "hand written"
        );
    }

    #[tokio::test]
    async fn test_open_reloads_manifest() {
        let (mut store, tests, state) = store();
        let ticket = store.stage(candidate("shop/Cart.java", "CartTest")).await.unwrap();
        store.commit(ticket, &report(30)).await.unwrap();

        let reopened = AcceptanceStore::open(Arc::new(tests), Arc::new(state))
            .await
            .unwrap();
        assert_eq!(reopened.current_set().len(), 1);
        assert_eq!(reopened.committed_aggregate(), Some(30.0));
        assert_eq!(reopened.accepted_for(&UnitId::new("shop/Cart.java")).len(), 1);
    }

    #[tokio::test]
    async fn test_unit_states_survive_reopen() {
        let tests = InMemoryWorkspace::new();
        let state_ws = InMemoryWorkspace::new();
        let unit = SourceUnit::new(
            UnitId::new("shop/Cart.java"),
            "src/main/java/shop/Cart.java",
            "shop.Cart",
            "class Cart {}",
            vec![],
        );
        let mut store = AcceptanceStore::open(Arc::new(tests.clone()), Arc::new(state_ws.clone()))
            .await
            .unwrap();
        let mut finished = IterationState::new(&unit, 0.0);
        finished.record_failure(Some("cannot find symbol: Money".into()));
        store.record_unit_states([&finished]).await.unwrap();

        let reopened = AcceptanceStore::open(Arc::new(tests), Arc::new(state_ws)).await.unwrap();
        let resumed = reopened.resume_state(&unit, 25.0);
        assert_eq!(resumed.last_diagnostics.as_deref(), Some("cannot find symbol: Money"));
        assert_eq!(resumed.consecutive_failures, 0);

        let edited = SourceUnit::new(
            UnitId::new("shop/Cart.java"),
            "src/main/java/shop/Cart.java",
            "shop.Cart",
            "class Cart { Money total; }",
            vec![],
        );
        assert_eq!(reopened.resume_state(&edited, 25.0).last_diagnostics, None);
    }
}
