//! covsynth - Coverage-driven unit test synthesis
//!
//! covsynth asks a generation backend for unit tests, validates each
//! candidate in isolation, measures coverage of the whole accepted suite,
//! and keeps a candidate only if aggregate coverage does not drop. Each
//! source unit iterates until it meets the coverage threshold or exhausts its
//! budget.
//!
//! # Architecture
//!
//! This crate follows Clean Architecture / Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): Models, error taxonomy and port traits
//! - **Service Layer** (`services`): Iteration controller and acceptance store
//! - **Adapters** (`adapters`): Generation backends, toolchain, coverage reports, git
//! - **Infrastructure Layer** (`infrastructure`): Configuration and logging
//! - **CLI Layer** (`cli`): Command-line interface
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use covsynth::services::{IterationController, RunBudget, RunContext};
//!
//! let ctx = Arc::new(RunContext::new(RunBudget::from_config(&config.iteration)));
//! let report = Arc::new(controller).run(units, ctx).await?;
//! std::process::exit(report.outcome.exit_code());
//! ```

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::errors::{GenerationError, MeasurementError, RunError, StoreError};
pub use domain::models::{
    AcceptedTest, CandidateTest, Config, CoverageGranularity, CoverageReport, RunOutcome,
    RunReport, SourceUnit, UnitId, UnitPhase, ValidationResult, ValidationStatus,
};
pub use domain::ports::{
    ArtifactWorkspace, CandidateValidator, ChangeDetector, CoverageAnalyzer, TestGenerator,
};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{
    AcceptanceStore, ControllerPorts, ControllerSettings, IterationController, RunBudget,
    RunContext,
};
