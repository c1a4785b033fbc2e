//! Validator port - isolated compile-and-run of a single candidate.

use async_trait::async_trait;

use crate::domain::models::{CandidateTest, ValidationResult};

/// Runs one candidate in isolation from every other accepted test.
///
/// Validation failures are results, not errors: every problem (spawn failure,
/// timeout, policy violation) is reported as a failing [`ValidationResult`]
/// with verbatim diagnostics.
#[async_trait]
pub trait CandidateValidator: Send + Sync {
    async fn validate(&self, candidate: &CandidateTest) -> ValidationResult;
}
