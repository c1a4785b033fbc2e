//! Coverage report snapshot.
//!
//! A [`CoverageReport`] is produced fresh by every measurement pass and never
//! mutated afterwards. The numbers are whatever unit the configured
//! [`CoverageGranularity`] selects; the controller only ever compares reports
//! of the same granularity.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::source_unit::UnitId;

/// Which counter of the coverage tool is chased.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoverageGranularity {
    #[default]
    Line,
    Branch,
}

impl CoverageGranularity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Line => "line",
            Self::Branch => "branch",
        }
    }
}

impl std::fmt::Display for CoverageGranularity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Covered / total counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CoverageCounts {
    pub covered: u64,
    pub total: u64,
}

impl CoverageCounts {
    pub const fn new(covered: u64, total: u64) -> Self {
        Self { covered, total }
    }

    /// Percentage in `[0, 100]`; an empty counter is 0%.
    #[allow(clippy::cast_precision_loss)]
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            (self.covered as f64 * 100.0 / self.total as f64).clamp(0.0, 100.0)
        }
    }

    pub fn add(&mut self, other: Self) {
        self.covered += other.covered;
        self.total += other.total;
    }
}

/// Coverage of a single file as reported by the tool.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UnitCoverage {
    pub counts: CoverageCounts,
    /// Identifiers of uncovered lines/branches, e.g. `L42` or `B42#1`
    pub uncovered: Vec<String>,
}

/// Immutable per-unit and aggregate coverage snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageReport {
    pub granularity: CoverageGranularity,
    pub aggregate: CoverageCounts,
    /// Keyed by the path the tool reported, forward slashes
    pub units: BTreeMap<String, UnitCoverage>,
    pub measured_at: DateTime<Utc>,
}

impl CoverageReport {
    pub fn new(
        granularity: CoverageGranularity,
        aggregate: CoverageCounts,
        units: BTreeMap<String, UnitCoverage>,
    ) -> Self {
        Self {
            granularity,
            aggregate,
            units,
            measured_at: Utc::now(),
        }
    }

    /// Report with the aggregate summed from its units.
    pub fn from_units(granularity: CoverageGranularity, units: BTreeMap<String, UnitCoverage>) -> Self {
        let mut aggregate = CoverageCounts::default();
        for unit in units.values() {
            aggregate.add(unit.counts);
        }
        Self::new(granularity, aggregate, units)
    }

    /// The 0% report used when no report exists yet.
    pub fn empty(granularity: CoverageGranularity) -> Self {
        Self::new(granularity, CoverageCounts::default(), BTreeMap::new())
    }

    pub fn aggregate_percent(&self) -> f64 {
        self.aggregate.percent()
    }

    /// Find the entry for a unit. Tools report paths relative to different
    /// roots, so an entry matches when it equals the unit id or ends with
    /// `/<unit id>`.
    pub fn unit(&self, id: &UnitId) -> Option<&UnitCoverage> {
        let key = id.as_str();
        if let Some(exact) = self.units.get(key) {
            return Some(exact);
        }
        let suffix = format!("/{key}");
        self.units
            .iter()
            .find(|(reported, _)| reported.ends_with(&suffix))
            .map(|(_, coverage)| coverage)
    }

    /// Coverage of one unit; units missing from the report are at 0%.
    pub fn unit_percent(&self, id: &UnitId) -> f64 {
        self.unit(id).map_or(0.0, |unit| unit.counts.percent())
    }

    pub fn uncovered_targets(&self, id: &UnitId) -> Vec<String> {
        self.unit(id).map(|unit| unit.uncovered.clone()).unwrap_or_default()
    }
}
