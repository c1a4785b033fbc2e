//! Table output formatting for CLI commands
//!
//! Renders run reports, detected units and coverage snapshots using
//! comfy-table. Colors are dropped for `NO_COLOR` and dumb terminals.

use std::env;

use comfy_table::{presets, Attribute, Cell, Color, ContentArrangement, Table};

use crate::domain::models::{CoverageReport, RunOutcome, RunReport, SourceUnit, UnitPhase};

use super::truncate;

/// Table formatter for CLI output
pub struct TableFormatter {
    /// Whether to use colors in output
    use_colors: bool,
    /// Maximum width for tables (None = auto)
    max_width: Option<u16>,
}

impl TableFormatter {
    pub fn new() -> Self {
        Self {
            use_colors: supports_color(),
            max_width: None,
        }
    }

    pub fn with_config(use_colors: bool, max_width: Option<u16>) -> Self {
        Self {
            use_colors,
            max_width,
        }
    }

    /// Per-unit results of a run.
    pub fn format_run(&self, report: &RunReport) -> String {
        let mut table = self.create_base_table();
        table.set_header(header(&[
            "Unit", "State", "Coverage", "Attempts", "Commits", "Accepted tests",
        ]));

        for unit in &report.units {
            let accepted = unit
                .accepted_tests
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join("\n");
            table.add_row(vec![
                Cell::new(unit.unit_id.as_str()),
                self.phase_cell(unit.phase),
                Cell::new(format!("{:.1}%", unit.coverage_percent)),
                Cell::new(unit.attempts),
                Cell::new(unit.commits),
                Cell::new(if accepted.is_empty() { "-".to_string() } else { accepted }),
            ]);
        }

        table.to_string()
    }

    /// Last rejection diagnostics of units that did not finish.
    pub fn format_diagnostics(&self, report: &RunReport) -> Option<String> {
        let rows: Vec<_> = report
            .units
            .iter()
            .filter(|unit| unit.phase != UnitPhase::Done)
            .filter_map(|unit| {
                unit.last_diagnostics
                    .as_deref()
                    .map(|d| (unit.unit_id.as_str(), first_lines(d, 4)))
            })
            .collect();
        if rows.is_empty() {
            return None;
        }

        let mut table = self.create_base_table();
        table.set_header(header(&["Unit", "Last rejection"]));
        for (unit, diagnostics) in rows {
            table.add_row(vec![Cell::new(unit), Cell::new(diagnostics)]);
        }
        Some(table.to_string())
    }

    pub fn format_outcome(&self, outcome: RunOutcome) -> String {
        let (label, color) = match outcome {
            RunOutcome::Passed => ("PASSED", Color::Green),
            RunOutcome::BelowThreshold => ("BELOW THRESHOLD", Color::Yellow),
            RunOutcome::Aborted => ("ABORTED", Color::Red),
        };
        if self.use_colors {
            let mut table = Table::new();
            table.load_preset(presets::NOTHING);
            table.add_row(vec![Cell::new(label).fg(color).add_attribute(Attribute::Bold)]);
            table.to_string().trim().to_string()
        } else {
            label.to_string()
        }
    }

    /// Units found by change detection.
    pub fn format_units(&self, units: &[SourceUnit]) -> String {
        let mut table = self.create_base_table();
        table.set_header(header(&["Unit", "Qualified name", "Dependencies", "Hash"]));
        for unit in units {
            let deps = if unit.dependencies.is_empty() {
                "-".to_string()
            } else {
                unit.dependencies.join(", ")
            };
            table.add_row(vec![
                Cell::new(unit.id.as_str()),
                Cell::new(&unit.qualified_name),
                Cell::new(truncate(&deps, 40)),
                Cell::new(unit.source_hash.get(..12).unwrap_or(&unit.source_hash)),
            ]);
        }
        table.to_string()
    }

    /// Per-unit coverage of a report.
    pub fn format_coverage(&self, report: &CoverageReport, threshold: f64) -> String {
        let mut table = self.create_base_table();
        table.set_header(header(&["File", "Covered", "Total", "Coverage", "Uncovered"]));
        for (path, unit) in &report.units {
            let percent = unit.counts.percent();
            let cell = Cell::new(format!("{percent:.1}%"));
            let cell = if self.use_colors {
                cell.fg(if percent >= threshold { Color::Green } else { Color::Red })
            } else {
                cell
            };
            table.add_row(vec![
                Cell::new(truncate(path, 60)),
                Cell::new(unit.counts.covered),
                Cell::new(unit.counts.total),
                cell,
                Cell::new(truncate(&unit.uncovered.join(" "), 40)),
            ]);
        }
        table.to_string()
    }

    fn phase_cell(&self, phase: UnitPhase) -> Cell {
        if self.use_colors {
            Cell::new(phase.as_str()).fg(phase_color(phase))
        } else {
            Cell::new(format!("{} {}", phase_icon(phase), phase.as_str()))
        }
    }

    /// Create a base table with common settings
    fn create_base_table(&self) -> Table {
        let mut table = Table::new();

        table
            .load_preset(presets::UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic);

        if let Some(width) = self.max_width {
            table.set_width(width);
        }

        table
    }
}

impl Default for TableFormatter {
    fn default() -> Self {
        Self::new()
    }
}

fn header(names: &[&str]) -> Vec<Cell> {
    names
        .iter()
        .map(|name| Cell::new(name).add_attribute(Attribute::Bold))
        .collect()
}

fn first_lines(text: &str, n: usize) -> String {
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .take(n)
        .map(|line| truncate(line, 100))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Check if color output is supported
fn supports_color() -> bool {
    if env::var("NO_COLOR").is_ok() {
        return false;
    }
    !matches!(env::var("TERM").as_deref(), Ok("dumb"))
}

fn phase_color(phase: UnitPhase) -> Color {
    match phase {
        UnitPhase::Done => Color::Green,
        UnitPhase::Exhausted => Color::Red,
        UnitPhase::Committed => Color::Cyan,
        UnitPhase::RolledBack => Color::Yellow,
        _ => Color::White,
    }
}

fn phase_icon(phase: UnitPhase) -> &'static str {
    match phase {
        UnitPhase::Done => "✓",
        UnitPhase::Exhausted => "✗",
        _ => "…",
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    use chrono::Utc;
    use uuid::Uuid;

    use super::*;
    use crate::domain::models::{
        CoverageCounts, CoverageGranularity, StopReason, UnitCoverage, UnitId, UnitReport,
    };

    fn report() -> RunReport {
        RunReport {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
            threshold: 80.0,
            granularity: CoverageGranularity::Line,
            baseline_percent: 20.0,
            aggregate_percent: 82.5,
            total_iterations: 5,
            commits: 3,
            outcome: RunOutcome::Passed,
            stop_reason: StopReason::AllUnitsSettled,
            units: vec![
                UnitReport {
                    unit_id: UnitId::new("com/shop/Cart.java"),
                    qualified_name: "com.shop.Cart".into(),
                    phase: UnitPhase::Done,
                    attempts: 3,
                    commits: 3,
                    failures: 0,
                    coverage_percent: 90.0,
                    accepted_tests: vec![PathBuf::from("com/shop/CartTest.java")],
                    last_diagnostics: None,
                },
                UnitReport {
                    unit_id: UnitId::new("com/shop/Order.java"),
                    qualified_name: "com.shop.Order".into(),
                    phase: UnitPhase::Exhausted,
                    attempts: 2,
                    commits: 0,
                    failures: 2,
                    coverage_percent: 40.0,
                    accepted_tests: vec![],
                    last_diagnostics: Some("OrderTest.java:12: error: cannot find symbol".into()),
                },
            ],
        }
    }

    #[test]
    fn test_format_run_without_colors() {
        let formatter = TableFormatter::with_config(false, Some(160));
        let out = formatter.format_run(&report());
        assert!(out.contains("com/shop/Cart.java"));
        assert!(out.contains("✓ done"));
        assert!(out.contains("✗ exhausted"));
        assert!(out.contains("90.0%"));
        assert!(out.contains("com/shop/CartTest.java"));
    }

    #[test]
    fn test_diagnostics_only_for_unfinished_units() {
        let formatter = TableFormatter::with_config(false, Some(160));
        let out = formatter.format_diagnostics(&report()).unwrap();
        assert!(out.contains("cannot find symbol"));
        assert!(!out.contains("Cart.java"));
        assert_eq!(formatter.format_outcome(RunOutcome::Aborted), "ABORTED");
    }

    #[test]
    fn test_format_coverage() {
        let mut units = BTreeMap::new();
        units.insert(
            "com/shop/Cart.java".to_string(),
            UnitCoverage {
                counts: CoverageCounts::new(3, 4),
                uncovered: vec!["L9".into()],
            },
        );
        let report = CoverageReport::from_units(CoverageGranularity::Line, units);
        let out = TableFormatter::with_config(false, Some(160)).format_coverage(&report, 80.0);
        assert!(out.contains("75.0%"));
        assert!(out.contains("L9"));
    }
}
