//! Domain errors for the covsynth synthesis loop.
//!
//! The taxonomy follows how far a failure is allowed to travel:
//!
//! - [`GenerationError`] stays inside one unit's state machine unless it is an
//!   authentication / invalid-response streak long enough to be fatal.
//! - Validation failures are never errors at all; they are a
//!   [`ValidationResult`](crate::domain::models::ValidationResult) status.
//! - [`MeasurementError::BuildBroken`] rolls back the staged candidate;
//!   [`MeasurementError::ToolchainUnavailable`] aborts the run.
//! - [`RunError`] is what escapes the controller.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Coarse classification of a generation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationErrorKind {
    RateLimited,
    InvalidResponse,
    Timeout,
    AuthFailure,
}

impl GenerationErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RateLimited => "rate_limited",
            Self::InvalidResponse => "invalid_response",
            Self::Timeout => "timeout",
            Self::AuthFailure => "auth_failure",
        }
    }
}

impl std::fmt::Display for GenerationErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors returned by a generation backend.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GenerationError {
    /// Backend throttled the request (HTTP 429, overloaded 5xx)
    #[error("Generation backend rate limited: {0}")]
    RateLimited(String),

    /// Backend answered, but not with a usable test artifact
    #[error("Invalid generation response: {0}")]
    InvalidResponse(String),

    /// Backend did not answer within the configured timebox
    #[error("Generation timed out: {0}")]
    Timeout(String),

    /// Credentials missing or rejected (HTTP 401/403)
    #[error("Generation backend authentication failed: {0}")]
    AuthFailure(String),
}

impl GenerationError {
    pub fn kind(&self) -> GenerationErrorKind {
        match self {
            Self::RateLimited(_) => GenerationErrorKind::RateLimited,
            Self::InvalidResponse(_) => GenerationErrorKind::InvalidResponse,
            Self::Timeout(_) => GenerationErrorKind::Timeout,
            Self::AuthFailure(_) => GenerationErrorKind::AuthFailure,
        }
    }

    /// Returns true if this error is transient and should be retried with backoff
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::RateLimited(_) | Self::Timeout(_))
    }

    /// Returns true if a streak of this error points at a configuration problem
    /// rather than a per-unit problem.
    pub fn counts_toward_fatal(&self) -> bool {
        matches!(self, Self::AuthFailure(_) | Self::InvalidResponse(_))
    }
}

/// Errors produced while measuring coverage of the accepted suite.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MeasurementError {
    /// The suite no longer builds or passes with the staged set
    #[error("Build broken: {0}")]
    BuildBroken(String),

    /// The toolchain could not be run at all
    #[error("Toolchain unavailable: {0}")]
    ToolchainUnavailable(String),
}

/// Errors from the acceptance store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("A candidate for {0} is already staged")]
    AlreadyStaged(String),

    #[error("No staged candidate to commit")]
    NothingStaged,

    #[error("Stage ticket {0} does not match the staged candidate")]
    TicketMismatch(uuid::Uuid),

    #[error(
        "Commit rejected: aggregate coverage would drop from {previous:.2}% to {attempted:.2}%"
    )]
    CoverageRegression { previous: f64, attempted: f64 },

    #[error("Artifact path escapes the test root: {}", .0.display())]
    PathEscapesRoot(PathBuf),

    #[error("Refusing to overwrite existing artifact {}", .0.display())]
    ArtifactExists(PathBuf),

    #[error("Store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Manifest serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors from change detection.
#[derive(Debug, Error)]
pub enum DetectionError {
    #[error("Git diff failed: {0}")]
    Git(String),

    #[error("No commit range available: set BASE_SHA and HEAD_SHA or use --all")]
    MissingRange,

    #[error("Failed to read source unit {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Source root does not exist: {}", .0.display())]
    MissingSourceRoot(PathBuf),
}

/// Domain-level invariant violations.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Invalid state transition from {from} to {to}: {reason}")]
    InvalidStateTransition {
        from: String,
        to: String,
        reason: String,
    },

    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}

pub type DomainResult<T> = Result<T, DomainError>;

/// Errors that escape the controller before a run report can be produced.
///
/// Failures after the baseline is measured end the run with an
/// [`Aborted`](crate::domain::models::RunOutcome::Aborted) report instead.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("Toolchain unavailable: {0}")]
    ToolchainUnavailable(String),

    #[error("Accepted suite is broken before any candidate was staged: {0}")]
    BaselineBroken(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Detection(#[from] DetectionError),

    #[error(transparent)]
    Domain(#[from] DomainError),
}
