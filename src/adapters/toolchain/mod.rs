//! Toolchain adapters: isolated candidate validation and suite coverage
//! measurement, both driven by configured argv commands.

pub mod analyzer;
pub mod command;
pub mod validator;

pub use analyzer::CommandCoverageAnalyzer;
pub use command::{run_command, substitute, CommandOutcome};
pub use validator::CommandValidator;
