//! Coverage report parsers.
//!
//! Each parser turns one tool's report into a [`CoverageReport`] of the
//! requested granularity. Unit keys are the paths the tool reports, with
//! forward slashes; [`CoverageReport::unit`] matches them against unit ids.

pub mod jacoco;
pub mod lcov;

use thiserror::Error;

use crate::domain::models::{CoverageGranularity, CoverageReport, ReportFormat};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReportError {
    #[error("Not a {format} report: {reason}")]
    Malformed { format: &'static str, reason: String },
}

/// Parse `text` as a report of the given format.
pub fn parse_report(
    format: ReportFormat,
    text: &str,
    granularity: CoverageGranularity,
) -> Result<CoverageReport, ReportError> {
    match format {
        ReportFormat::Jacoco => jacoco::parse(text, granularity),
        ReportFormat::Lcov => lcov::parse(text, granularity),
    }
}

/// Identifier of an uncovered line.
pub(crate) fn line_target(line: u64) -> String {
    format!("L{line}")
}

/// Identifier of the `ordinal`-th uncovered branch on a line.
pub(crate) fn branch_target(line: u64, ordinal: u64) -> String {
    format!("B{line}#{ordinal}")
}
