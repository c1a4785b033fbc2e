//! CLI command implementations.

pub mod config;
pub mod coverage;
pub mod detect;
pub mod run;
