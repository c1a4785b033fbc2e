//! Generator registry and factory.

use std::sync::Arc;

use anyhow::Context;

use crate::domain::models::{Config, GenerationBackend, GenerationConfig, RateLimitConfig};
use crate::domain::ports::TestGenerator;
use crate::services::prompt_builder::PromptBuilder;

use super::anthropic_api::AnthropicGenerator;
use super::mock::ScriptedGenerator;

/// Builds the configured generation backend.
pub struct GeneratorRegistry {
    generation: GenerationConfig,
    rate_limit: RateLimitConfig,
}

impl GeneratorRegistry {
    pub fn new(generation: GenerationConfig, rate_limit: RateLimitConfig) -> Self {
        Self {
            generation,
            rate_limit,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.generation.clone(), config.rate_limit.clone())
    }

    /// Create a generator for `backend`.
    pub fn create_by_backend(
        &self,
        backend: GenerationBackend,
    ) -> anyhow::Result<Arc<dyn TestGenerator>> {
        match backend {
            GenerationBackend::Anthropic => {
                let prompts = PromptBuilder::from_config(&self.generation).with_context(|| {
                    format!(
                        "Failed to read prompt guide {}",
                        self.generation
                            .guide_path
                            .as_deref()
                            .map(|p| p.display().to_string())
                            .unwrap_or_default()
                    )
                })?;
                let generator =
                    AnthropicGenerator::new(self.generation.clone(), &self.rate_limit, prompts)
                        .context("Failed to configure the Anthropic backend")?;
                Ok(Arc::new(generator))
            }
            GenerationBackend::Mock => Ok(Arc::new(ScriptedGenerator::new())),
        }
    }

    /// Create the backend selected in configuration.
    pub fn create(&self) -> anyhow::Result<Arc<dyn TestGenerator>> {
        self.create_by_backend(self.generation.backend)
    }
}
