pub mod candidate;
pub mod config;
pub mod coverage;
pub mod iteration;
pub mod source_unit;
pub mod validation;

pub use candidate::{AcceptedTest, CandidateTest, Provenance, TestTarget};
pub use config::{
    Config, DetectionConfig, DetectionMode, GenerationBackend, GenerationConfig, IterationConfig,
    LayoutConfig, LoggingConfig, RateLimitConfig, ReportFormat, RetryConfig, SandboxConfig,
    ToolchainConfig,
};
pub use coverage::{CoverageCounts, CoverageGranularity, CoverageReport, UnitCoverage};
pub use iteration::{IterationState, RunOutcome, RunReport, StopReason, UnitPhase, UnitReport};
pub use source_unit::{SourceUnit, UnitId};
pub use validation::{ValidationResult, ValidationStatus};
