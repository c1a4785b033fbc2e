//! Adapters implementing the domain ports against real systems.

pub mod coverage_reports;
pub mod fs_workspace;
pub mod generators;
pub mod source_tree;
pub mod toolchain;

pub use fs_workspace::FsWorkspace;
pub use source_tree::GitChangeDetector;
pub use toolchain::{CommandCoverageAnalyzer, CommandValidator};
