//! Anthropic Messages API generation backend.
//!
//! Sends one non-streaming request per candidate, throttled by a token
//! bucket, and maps transport and HTTP failures onto
//! [`GenerationError`] kinds the controller knows how to handle.

use std::num::NonZeroU32;
use std::time::Duration;

use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::{header, Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::domain::errors::GenerationError;
use crate::domain::models::{CandidateTest, GenerationConfig, Provenance, RateLimitConfig};
use crate::domain::ports::{GenerationRequest, TestGenerator};
use crate::services::context_extractor;
use crate::services::prompt_builder::{strip_code_fences, PromptBuilder};

/// Status code Anthropic uses for "overloaded".
const STATUS_OVERLOADED: u16 = 529;

/// Error bodies are cut to this many characters in diagnostics.
const MAX_ERROR_BODY_CHARS: usize = 500;

// ----------------------------------------------------------------------------
// Wire types
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

/// Request to the Messages API.
#[derive(Debug, Serialize)]
pub struct MessagesRequest {
    pub model: String,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    pub messages: Vec<Message>,
    pub temperature: f32,
}

/// Content block of a response; only text blocks carry the artifact.
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
pub struct MessagesResponse {
    pub content: Vec<ContentBlock>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub stop_reason: Option<String>,
}

// ----------------------------------------------------------------------------
// Generator
// ----------------------------------------------------------------------------

/// Generation backend talking to an Anthropic-compatible Messages API.
pub struct AnthropicGenerator {
    config: GenerationConfig,
    client: Client,
    api_key: String,
    prompts: PromptBuilder,
    limiter: Option<DefaultDirectRateLimiter>,
}

impl AnthropicGenerator {
    /// Build the generator. A missing API key is an [`GenerationError::AuthFailure`].
    pub fn new(
        config: GenerationConfig,
        rate_limit: &RateLimitConfig,
        prompts: PromptBuilder,
    ) -> Result<Self, GenerationError> {
        let api_key = config
            .api_key
            .clone()
            .or_else(|| std::env::var("ANTHROPIC_API_KEY").ok())
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                GenerationError::AuthFailure(
                    "no API key configured; set ANTHROPIC_API_KEY or generation.api_key".to_string(),
                )
            })?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .pool_max_idle_per_host(4)
            .build()
            .map_err(|e| {
                GenerationError::InvalidResponse(format!("failed to create HTTP client: {e}"))
            })?;

        Ok(Self {
            limiter: build_limiter(rate_limit),
            config,
            client,
            api_key,
            prompts,
        })
    }

    fn build_request(&self, request: &GenerationRequest) -> MessagesRequest {
        let context = context_extractor::extract(&request.unit.source_text);
        let system = self.prompts.system_prompt();
        MessagesRequest {
            model: self.config.model.clone(),
            max_tokens: self.config.max_tokens,
            system: (!system.is_empty()).then(|| system.to_string()),
            messages: vec![Message {
                role: MessageRole::User,
                content: self.prompts.user_prompt(request, &context),
            }],
            temperature: self.config.temperature,
        }
    }

    async fn send(&self, body: &MessagesRequest) -> Result<MessagesResponse, GenerationError> {
        let url = format!("{}/v1/messages", self.config.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", &self.config.api_version)
            .header(header::CONTENT_TYPE, "application/json")
            .json(body)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }

        response.json::<MessagesResponse>().await.map_err(|e| {
            if e.is_timeout() {
                GenerationError::Timeout(format!("reading response body: {e}"))
            } else {
                GenerationError::InvalidResponse(format!("malformed response body: {e}"))
            }
        })
    }
}

#[async_trait]
impl TestGenerator for AnthropicGenerator {
    fn name(&self) -> &'static str {
        "anthropic"
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<CandidateTest, GenerationError> {
        if !request.unit.has_source() {
            return Err(GenerationError::InvalidResponse(format!(
                "source unit {} has no text to test",
                request.unit.id
            )));
        }

        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }

        let body = self.build_request(request);
        tracing::debug!(
            unit = %request.unit.id,
            attempt = request.attempt,
            model = %body.model,
            prompt_chars = body.messages.iter().map(|m| m.content.len()).sum::<usize>(),
            "Requesting candidate"
        );

        let response = self.send(&body).await?;
        let text = response
            .content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                ContentBlock::Other => None,
            })
            .collect::<Vec<_>>()
            .join("\n");
        if text.trim().is_empty() {
            return Err(GenerationError::InvalidResponse(format!(
                "response contained no text (stop_reason: {})",
                response.stop_reason.as_deref().unwrap_or("unknown")
            )));
        }

        Ok(CandidateTest::new(
            request.unit.id.clone(),
            request.attempt,
            request.target.clone(),
            strip_code_fences(&text),
            Provenance {
                backend: self.name().to_string(),
                model: response.model.unwrap_or_else(|| self.config.model.clone()),
                prompt_revision: self.prompts.revision().to_string(),
            },
        ))
    }
}

/// Token bucket for the configured rate; `None` disables throttling.
fn build_limiter(config: &RateLimitConfig) -> Option<DefaultDirectRateLimiter> {
    if !(config.requests_per_second.is_finite() && config.requests_per_second > 0.0) {
        return None;
    }
    let period = Duration::from_secs_f64(1.0 / config.requests_per_second);
    let burst = NonZeroU32::new(config.burst_size.max(1))?;
    let quota = Quota::with_period(period)?.allow_burst(burst);
    Some(RateLimiter::direct(quota))
}

/// Map an HTTP error status onto a generation error kind.
pub fn classify_status(status: StatusCode, body: &str) -> GenerationError {
    let detail = format!("HTTP {}: {}", status.as_u16(), truncate(body));
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => GenerationError::AuthFailure(detail),
        StatusCode::TOO_MANY_REQUESTS => GenerationError::RateLimited(detail),
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => {
            GenerationError::Timeout(detail)
        }
        s if s.as_u16() == STATUS_OVERLOADED || s.is_server_error() => {
            GenerationError::RateLimited(detail)
        }
        _ => GenerationError::InvalidResponse(detail),
    }
}

fn map_transport_error(error: reqwest::Error) -> GenerationError {
    if error.is_timeout() {
        GenerationError::Timeout(error.to_string())
    } else if error.is_connect() || error.is_request() {
        GenerationError::Timeout(format!("connection failed: {error}"))
    } else {
        GenerationError::InvalidResponse(error.to_string())
    }
}

fn truncate(body: &str) -> String {
    match body.char_indices().nth(MAX_ERROR_BODY_CHARS) {
        Some((cut, _)) => format!("{}...", &body[..cut]),
        None => body.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_status() {
        assert!(matches!(
            classify_status(StatusCode::UNAUTHORIZED, ""),
            GenerationError::AuthFailure(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::FORBIDDEN, ""),
            GenerationError::AuthFailure(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, ""),
            GenerationError::RateLimited(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::from_u16(529).unwrap(), "overloaded"),
            GenerationError::RateLimited(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::BAD_GATEWAY, ""),
            GenerationError::RateLimited(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::BAD_REQUEST, "bad model"),
            GenerationError::InvalidResponse(_)
        ));
    }

    #[test]
    fn test_error_body_is_truncated() {
        let err = classify_status(StatusCode::BAD_REQUEST, &"x".repeat(2_000));
        assert!(err.to_string().len() < 600);
    }

    #[test]
    fn test_limiter_disabled_for_zero_rate() {
        let config = RateLimitConfig {
            requests_per_second: 0.0,
            burst_size: 1,
        };
        assert!(build_limiter(&config).is_none());
        assert!(build_limiter(&RateLimitConfig::default()).is_some());
    }

    #[test]
    fn test_missing_api_key_is_auth_failure() {
        temp_env::with_var_unset("ANTHROPIC_API_KEY", || {
            let result = AnthropicGenerator::new(
                GenerationConfig::default(),
                &RateLimitConfig::default(),
                PromptBuilder::new("Java", "JUnit 5", "v1"),
            );
            assert!(matches!(result, Err(GenerationError::AuthFailure(_))));
        });
    }

    #[test]
    fn test_response_blocks_deserialize() {
        let raw = r#"{"content":[{"type":"thinking","thinking":"hm"},{"type":"text","text":"class A {}"}],"model":"m","stop_reason":"end_turn"}"#;
        let response: MessagesResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(response.content.len(), 2);
        assert!(matches!(response.content[1], ContentBlock::Text { ref text } if text == "class A {}"));
    }
}
