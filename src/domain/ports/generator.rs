//! Generator port - interface for test generation backends.

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::errors::GenerationError;
use crate::domain::models::{CandidateTest, SourceUnit, TestTarget};

/// Everything a backend needs to propose one test artifact.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub unit: Arc<SourceUnit>,
    /// Attempt number for this unit, starting at 1
    pub attempt: u32,
    /// Where the artifact will land and which class name it must declare
    pub target: TestTarget,
    /// Diagnostics of the last rejected candidate, if this is a retry
    pub prior_diagnostics: Option<String>,
    /// Uncovered line/branch identifiers from the last report
    pub uncovered_targets: Vec<String>,
}

/// Trait for generation backends.
///
/// Implementations return a candidate or an explicit [`GenerationError`];
/// their output is untrusted text that still has to pass validation.
#[async_trait]
pub trait TestGenerator: Send + Sync {
    /// Backend name recorded in provenance.
    fn name(&self) -> &'static str;

    /// Propose one test artifact for the request's unit.
    async fn generate(&self, request: &GenerationRequest) -> Result<CandidateTest, GenerationError>;
}
