//! Validation outcome of a single candidate.

use serde::{Deserialize, Serialize};

/// Status of a validated candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    /// Compiled; no run step configured
    Compiled,
    /// Compilation failed (including unresolved symbols)
    FailedToCompile,
    /// Compiled and every test passed
    RanPassed,
    /// Compiled but the run failed or timed out
    RanFailed,
    /// The sandbox policy rejected the artifact
    RejectedByPolicy,
}

impl ValidationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Compiled => "compiled",
            Self::FailedToCompile => "failed_to_compile",
            Self::RanPassed => "ran_passed",
            Self::RanFailed => "ran_failed",
            Self::RejectedByPolicy => "rejected_by_policy",
        }
    }
}

impl std::fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ephemeral result consumed by the controller right after validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub status: ValidationStatus,
    /// Verbatim compiler / runner / policy output
    pub diagnostics: String,
}

impl ValidationResult {
    pub fn new(status: ValidationStatus, diagnostics: impl Into<String>) -> Self {
        Self {
            status,
            diagnostics: diagnostics.into(),
        }
    }

    pub fn passed(diagnostics: impl Into<String>) -> Self {
        Self::new(ValidationStatus::RanPassed, diagnostics)
    }

    pub fn is_passing(&self) -> bool {
        matches!(
            self.status,
            ValidationStatus::RanPassed | ValidationStatus::Compiled
        )
    }
}
