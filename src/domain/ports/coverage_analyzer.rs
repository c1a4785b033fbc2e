//! Coverage analyzer port.

use async_trait::async_trait;

use crate::domain::errors::MeasurementError;
use crate::domain::models::{AcceptedTest, CoverageGranularity, CoverageReport};

/// Measures coverage of the full accepted suite.
#[async_trait]
pub trait CoverageAnalyzer: Send + Sync {
    /// The counter this analyzer reports; constant for the analyzer's lifetime.
    fn granularity(&self) -> CoverageGranularity;

    /// Run the whole suite described by `snapshot` and report coverage.
    ///
    /// A missing or empty report is a 0% report, not an error.
    async fn measure(&self, snapshot: &[AcceptedTest]) -> Result<CoverageReport, MeasurementError>;
}
