//! Generation backend implementations.

pub mod anthropic_api;
pub mod mock;
pub mod registry;

pub use anthropic_api::AnthropicGenerator;
pub use mock::{ScriptedGenerator, ScriptedResponse};
pub use registry::GeneratorRegistry;
