//! Port trait definitions (Hexagonal Architecture)
//!
//! This module defines the async trait interfaces that adapters implement:
//! - TestGenerator: generation backend producing candidate tests
//! - CandidateValidator: isolated compile/run of one candidate
//! - CoverageAnalyzer: full-suite coverage measurement
//! - ChangeDetector: initial set of source units for a run
//! - ArtifactWorkspace: storage for accepted test files
//!
//! These traits keep the synthesis loop independent of any specific
//! backend, build tool, or coverage tool.

pub mod artifact_workspace;
pub mod change_detector;
pub mod coverage_analyzer;
pub mod generator;
pub mod memory_workspace;
pub mod validator;

pub use artifact_workspace::ArtifactWorkspace;
pub use change_detector::ChangeDetector;
pub use coverage_analyzer::CoverageAnalyzer;
pub use generator::{GenerationRequest, TestGenerator};
pub use memory_workspace::InMemoryWorkspace;
pub use validator::CandidateValidator;
