//! Domain layer for the covsynth synthesis loop
//!
//! This module contains the core models, error taxonomy, and the port traits
//! that external collaborators (generation backend, toolchain, coverage tool,
//! version control) are adapted to.

pub mod errors;
pub mod models;
pub mod ports;

// Re-export error types for convenient access
pub use errors::{
    DetectionError, DomainError, DomainResult, GenerationError, GenerationErrorKind,
    MeasurementError, RunError, StoreError,
};
