//! Infrastructure layer module
//!
//! Cross-cutting concerns that are not ports:
//! - Configuration management (figment)
//! - Logging infrastructure (tracing)

pub mod config;
pub mod logging;
