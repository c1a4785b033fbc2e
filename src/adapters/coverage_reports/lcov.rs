//! LCOV tracefile parser.
//!
//! A file may appear in several records (one per `TN:` section or merged
//! run). Its records are folded together: a line or branch counts as
//! covered when any record hit it. Summary records (`LF`/`LH`,
//! `BRF`/`BRH`) win over counts derived from `DA`/`BRDA` only when the
//! file has a single record.

use std::collections::BTreeMap;

use super::{branch_target, line_target, ReportError};
use crate::domain::models::{CoverageCounts, CoverageGranularity, CoverageReport, UnitCoverage};

/// `(line, block, branch)` as written in a `BRDA` record.
type BranchKey = (u64, String, String);

#[derive(Default)]
struct Summary {
    lines_found: Option<u64>,
    lines_hit: Option<u64>,
    branches_found: Option<u64>,
    branches_hit: Option<u64>,
}

/// Everything seen for one source file across its records.
#[derive(Default)]
struct FileCoverage {
    records: u32,
    /// Highest hit count per line
    line_hits: BTreeMap<u64, u64>,
    /// Highest taken count per branch, in first-seen order
    branch_order: Vec<BranchKey>,
    branch_hits: BTreeMap<BranchKey, u64>,
    summary: Summary,
}

impl FileCoverage {
    fn hit_line(&mut self, line: u64, hits: u64) {
        let entry = self.line_hits.entry(line).or_insert(0);
        *entry = (*entry).max(hits);
    }

    fn hit_branch(&mut self, key: BranchKey, taken: u64) {
        if !self.branch_hits.contains_key(&key) {
            self.branch_order.push(key.clone());
        }
        let entry = self.branch_hits.entry(key).or_insert(0);
        *entry = (*entry).max(taken);
    }

    fn finish(self, granularity: CoverageGranularity) -> UnitCoverage {
        let (derived, uncovered, found, hit) = match granularity {
            CoverageGranularity::Line => {
                let covered = self.line_hits.values().filter(|hits| **hits > 0).count() as u64;
                let uncovered = self
                    .line_hits
                    .iter()
                    .filter(|(_, hits)| **hits == 0)
                    .map(|(line, _)| line_target(*line))
                    .collect();
                (
                    CoverageCounts::new(covered, self.line_hits.len() as u64),
                    uncovered,
                    self.summary.lines_found,
                    self.summary.lines_hit,
                )
            }
            CoverageGranularity::Branch => {
                let mut covered = 0;
                let mut uncovered = Vec::new();
                let mut missed_per_line: BTreeMap<u64, u64> = BTreeMap::new();
                for key in &self.branch_order {
                    if self.branch_hits.get(key).copied().unwrap_or(0) > 0 {
                        covered += 1;
                    } else {
                        let missed = missed_per_line.entry(key.0).or_insert(0);
                        *missed += 1;
                        uncovered.push(branch_target(key.0, *missed));
                    }
                }
                (
                    CoverageCounts::new(covered, self.branch_order.len() as u64),
                    uncovered,
                    self.summary.branches_found,
                    self.summary.branches_hit,
                )
            }
        };
        let counts = match (self.records, found, hit) {
            (1, Some(total), Some(covered)) => CoverageCounts::new(covered.min(total), total),
            _ => derived,
        };
        UnitCoverage { counts, uncovered }
    }
}

fn malformed(line_no: usize, reason: &str) -> ReportError {
    ReportError::Malformed {
        format: "LCOV",
        reason: format!("line {line_no}: {reason}"),
    }
}

fn parse_u64(value: &str) -> Option<u64> {
    value.trim().parse().ok()
}

pub fn parse(text: &str, granularity: CoverageGranularity) -> Result<CoverageReport, ReportError> {
    let mut files: BTreeMap<String, FileCoverage> = BTreeMap::new();
    let mut current: Option<String> = None;

    for (idx, raw) in text.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        if line == "end_of_record" {
            if current.take().is_none() {
                return Err(malformed(line_no, "end_of_record without SF"));
            }
            continue;
        }
        let Some((tag, value)) = line.split_once(':') else {
            continue;
        };

        if tag == "SF" {
            let path = value.trim().replace('\\', "/");
            files.entry(path.clone()).or_default().records += 1;
            current = Some(path);
            continue;
        }
        let Some(file) = current.as_ref().and_then(|path| files.get_mut(path)) else {
            continue;
        };

        match tag {
            "DA" => {
                let mut parts = value.split(',');
                let (Some(nr), Some(hits)) = (
                    parts.next().and_then(parse_u64),
                    parts.next().and_then(parse_u64),
                ) else {
                    return Err(malformed(line_no, "bad DA record"));
                };
                file.hit_line(nr, hits);
            }
            "BRDA" => {
                let parts: Vec<&str> = value.split(',').collect();
                let (Some(nr), Some(block), Some(branch), Some(taken)) = (
                    parts.first().and_then(|v| parse_u64(v)),
                    parts.get(1),
                    parts.get(2),
                    parts.get(3),
                ) else {
                    return Err(malformed(line_no, "bad BRDA record"));
                };
                file.hit_branch(
                    (nr, block.trim().to_string(), branch.trim().to_string()),
                    parse_u64(taken).unwrap_or(0),
                );
            }
            "LF" => file.summary.lines_found = parse_u64(value),
            "LH" => file.summary.lines_hit = parse_u64(value),
            "BRF" => file.summary.branches_found = parse_u64(value),
            "BRH" => file.summary.branches_hit = parse_u64(value),
            _ => {}
        }
    }

    if current.is_some() {
        return Err(malformed(text.lines().count(), "missing end_of_record"));
    }

    let units = files
        .into_iter()
        .map(|(path, file)| (path, file.finish(granularity)))
        .collect();
    Ok(CoverageReport::from_units(granularity, units))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::UnitId;

    const TRACE: &str = "TN:\n\
SF:/work/src/shop/cart.ts\n\
FN:3,add\n\
DA:3,1\n\
DA:4,0\n\
DA:5,2\n\
BRDA:4,0,0,1\n\
BRDA:4,0,1,-\n\
BRDA:5,1,0,0\n\
LF:3\n\
LH:2\n\
end_of_record\n\
SF:src/shop/order.ts\n\
DA:1,0\n\
end_of_record\n";

    #[test]
    fn test_lines() {
        let report = parse(TRACE, CoverageGranularity::Line).unwrap();
        let cart = report.unit(&UnitId::new("src/shop/cart.ts")).unwrap();
        assert_eq!(cart.counts, CoverageCounts::new(2, 3));
        assert_eq!(cart.uncovered, vec!["L4"]);
        assert_eq!(report.aggregate, CoverageCounts::new(2, 4));
    }

    #[test]
    fn test_branches_derived_from_brda() {
        let report = parse(TRACE, CoverageGranularity::Branch).unwrap();
        let cart = report.unit(&UnitId::new("shop/cart.ts")).unwrap();
        assert_eq!(cart.counts, CoverageCounts::new(1, 3));
        assert_eq!(cart.uncovered, vec!["B4#1", "B5#1"]);
    }

    #[test]
    fn test_empty_and_malformed() {
        assert!(parse("", CoverageGranularity::Line).unwrap().units.is_empty());
        assert!(parse("SF:a.ts\nDA:x,1\nend_of_record\n", CoverageGranularity::Line).is_err());
        assert!(parse("SF:a.ts\nDA:1,1\n", CoverageGranularity::Line).is_err());
    }

    #[test]
    fn test_repeated_records_are_merged() {
        let trace = "TN:a\nSF:src/shop/cart.ts\nDA:1,1\nDA:2,0\nBRDA:2,0,0,0\nLF:2\nLH:1\nend_of_record\n\
TN:b\nSF:src/shop/cart.ts\nDA:1,0\nDA:2,0\nDA:3,0\nBRDA:2,0,0,4\nBRDA:2,0,1,0\nLF:3\nLH:0\nend_of_record\n";

        let lines = parse(trace, CoverageGranularity::Line).unwrap();
        let cart = lines.unit(&UnitId::new("shop/cart.ts")).unwrap();
        assert_eq!(cart.counts, CoverageCounts::new(1, 3));
        assert_eq!(cart.uncovered, vec!["L2", "L3"]);

        let branches = parse(trace, CoverageGranularity::Branch).unwrap();
        let cart = branches.unit(&UnitId::new("shop/cart.ts")).unwrap();
        assert_eq!(cart.counts, CoverageCounts::new(1, 2));
        assert_eq!(cart.uncovered, vec!["B2#1"]);
    }
}
