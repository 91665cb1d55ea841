//! Cloud inference provider
//!
//! Talks to OpenAI-compatible chat completion APIs (OpenAI, OpenRouter) and
//! the Anthropic Messages API. The backend is auto-detected from the
//! environment.

use crate::reasoning::conversation::Conversation;
use crate::reasoning::inference::*;
use async_trait::async_trait;
use std::time::{Duration, Instant};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Supported hosted LLM backends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProvider {
    OpenRouter,
    OpenAI,
    Anthropic,
}

impl std::fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LlmProvider::OpenRouter => write!(f, "OpenRouter"),
            LlmProvider::OpenAI => write!(f, "OpenAI"),
            LlmProvider::Anthropic => write!(f, "Anthropic"),
        }
    }
}

/// Hosted text-generation provider.
pub struct CloudInferenceProvider {
    client: reqwest::Client,
    provider: LlmProvider,
    api_key: String,
    base_url: String,
    model: String,
}

impl CloudInferenceProvider {
    pub fn new(
        provider: LlmProvider,
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self, InferenceError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| InferenceError::provider(format!("HTTP client error: {}", e)))?;
        Ok(Self {
            client,
            provider,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
        })
    }

    /// Auto-detect the provider from environment variables.
    ///
    /// Checks in order:
    /// 1. `OPENROUTER_API_KEY` → OpenRouter (model from `OPENROUTER_MODEL`)
    /// 2. `OPENAI_API_KEY` → OpenAI (model from `CHAT_MODEL`)
    /// 3. `ANTHROPIC_API_KEY` → Anthropic (model from `ANTHROPIC_MODEL`)
    ///
    /// Returns `None` if no API key is found.
    pub fn from_env() -> Option<Self> {
        let detected = if let Ok(api_key) = std::env::var("OPENROUTER_API_KEY") {
            Some((
                LlmProvider::OpenRouter,
                api_key,
                std::env::var("OPENROUTER_BASE_URL")
                    .unwrap_or_else(|_| "https://openrouter.ai/api/v1".to_string()),
                std::env::var("OPENROUTER_MODEL")
                    .unwrap_or_else(|_| "anthropic/claude-sonnet-4".to_string()),
            ))
        } else if let Ok(api_key) = std::env::var("OPENAI_API_KEY") {
            Some((
                LlmProvider::OpenAI,
                api_key,
                std::env::var("OPENAI_BASE_URL")
                    .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
                std::env::var("CHAT_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            ))
        } else if let Ok(api_key) = std::env::var("ANTHROPIC_API_KEY") {
            Some((
                LlmProvider::Anthropic,
                api_key,
                std::env::var("ANTHROPIC_BASE_URL")
                    .unwrap_or_else(|_| "https://api.anthropic.com/v1".to_string()),
                std::env::var("ANTHROPIC_MODEL")
                    .unwrap_or_else(|_| "claude-sonnet-4-5-20250514".to_string()),
            ))
        } else {
            None
        };

        let Some((provider, api_key, base_url, model)) = detected else {
            tracing::info!("No LLM API key found in environment, using extractive replies");
            return None;
        };

        match Self::new(provider, api_key, base_url, model) {
            Ok(client) => {
                tracing::info!(
                    "LLM client initialized: provider={} model={}",
                    client.provider,
                    client.model
                );
                Some(client)
            }
            Err(e) => {
                tracing::warn!("Failed to initialise LLM client: {}", e);
                None
            }
        }
    }

    pub fn provider(&self) -> LlmProvider {
        self.provider
    }

    /// Build the request body for OpenAI-compatible APIs (OpenAI, OpenRouter).
    fn build_openai_body(
        &self,
        conversation: &Conversation,
        options: &InferenceOptions,
    ) -> serde_json::Value {
        let model = options.model.as_deref().unwrap_or(&self.model);
        serde_json::json!({
            "model": model,
            "messages": conversation.to_openai_messages(),
            "max_tokens": options.max_tokens,
            "temperature": options.temperature,
        })
    }

    /// Build the request body for the Anthropic Messages API.
    fn build_anthropic_body(
        &self,
        conversation: &Conversation,
        options: &InferenceOptions,
    ) -> serde_json::Value {
        let model = options.model.as_deref().unwrap_or(&self.model);
        let (system, messages) = conversation.to_anthropic_messages();

        let mut body = serde_json::json!({
            "model": model,
            "messages": messages,
            "max_tokens": options.max_tokens,
        });

        if options.temperature > 0.0 {
            body["temperature"] = serde_json::json!(options.temperature);
        }

        if let Some(sys) = system {
            body["system"] = serde_json::Value::String(sys);
        }

        body
    }
}

/// Parse an OpenAI-format response into InferenceResponse.
fn parse_openai_response(
    resp: &serde_json::Value,
    model: &str,
) -> Result<InferenceResponse, InferenceError> {
    let choice = resp
        .get("choices")
        .and_then(|c| c.get(0))
        .ok_or_else(|| InferenceError::parse("No choices in response"))?;

    let content = choice
        .get("message")
        .ok_or_else(|| InferenceError::parse("No message in choice"))?
        .get("content")
        .and_then(|c| c.as_str())
        .unwrap_or("")
        .to_string();

    let finish_reason = match choice.get("finish_reason").and_then(|f| f.as_str()) {
        Some("length") => FinishReason::MaxTokens,
        Some("content_filter") => FinishReason::ContentFilter,
        _ => FinishReason::Stop,
    };

    let usage = resp
        .get("usage")
        .map(|u| Usage {
            prompt_tokens: u.get("prompt_tokens").and_then(|v| v.as_u64()).unwrap_or(0) as u32,
            completion_tokens: u
                .get("completion_tokens")
                .and_then(|v| v.as_u64())
                .unwrap_or(0) as u32,
            total_tokens: u.get("total_tokens").and_then(|v| v.as_u64()).unwrap_or(0) as u32,
        })
        .unwrap_or_default();

    Ok(InferenceResponse {
        content,
        finish_reason,
        usage,
        model: resp
            .get("model")
            .and_then(|m| m.as_str())
            .unwrap_or(model)
            .to_string(),
    })
}

/// Parse an Anthropic-format response into InferenceResponse.
fn parse_anthropic_response(
    resp: &serde_json::Value,
    model: &str,
) -> Result<InferenceResponse, InferenceError> {
    let content_blocks = resp
        .get("content")
        .and_then(|c| c.as_array())
        .ok_or_else(|| InferenceError::parse("No content in response"))?;

    let mut text_content = String::new();
    for block in content_blocks {
        if block.get("type").and_then(|t| t.as_str()) != Some("text") {
            continue;
        }
        if let Some(text) = block.get("text").and_then(|t| t.as_str()) {
            if !text_content.is_empty() {
                text_content.push('\n');
            }
            text_content.push_str(text);
        }
    }

    let finish_reason = match resp.get("stop_reason").and_then(|s| s.as_str()) {
        Some("max_tokens") => FinishReason::MaxTokens,
        _ => FinishReason::Stop,
    };

    let usage = resp
        .get("usage")
        .map(|u| {
            let input = u.get("input_tokens").and_then(|v| v.as_u64()).unwrap_or(0) as u32;
            let output = u.get("output_tokens").and_then(|v| v.as_u64()).unwrap_or(0) as u32;
            Usage {
                prompt_tokens: input,
                completion_tokens: output,
                total_tokens: input + output,
            }
        })
        .unwrap_or_default();

    Ok(InferenceResponse {
        content: text_content,
        finish_reason,
        usage,
        model: resp
            .get("model")
            .and_then(|m| m.as_str())
            .unwrap_or(model)
            .to_string(),
    })
}

#[async_trait]
impl InferenceProvider for CloudInferenceProvider {
    async fn complete(
        &self,
        conversation: &Conversation,
        options: &InferenceOptions,
    ) -> Result<InferenceResponse, InferenceError> {
        let is_anthropic = self.provider == LlmProvider::Anthropic;
        let model = options.model.as_deref().unwrap_or(&self.model);

        let request = if is_anthropic {
            self.client
                .post(format!("{}/messages", self.base_url))
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", "2023-06-01")
                .header("content-type", "application/json")
                .json(&self.build_anthropic_body(conversation, options))
        } else {
            self.client
                .post(format!("{}/chat/completions", self.base_url))
                .header("authorization", format!("Bearer {}", self.api_key))
                .header("content-type", "application/json")
                .json(&self.build_openai_body(conversation, options))
        };

        tracing::debug!(
            "Cloud inference: provider={} model={} messages={}",
            self.provider,
            model,
            conversation.len()
        );

        let start = Instant::now();
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                InferenceError::Timeout {
                    elapsed: start.elapsed(),
                }
            } else {
                InferenceError::provider(format!("Request failed: {}", e))
            }
        })?;

        let status = response.status();
        if status.as_u16() == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(1);
            return Err(InferenceError::RateLimited {
                retry_after_ms: retry_after * 1000,
            });
        }

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(InferenceError::provider(format!(
                "API error ({}): {}",
                status, error_text
            )));
        }

        let resp_json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| InferenceError::parse(format!("Failed to parse response: {}", e)))?;

        let parsed = if is_anthropic {
            parse_anthropic_response(&resp_json, model)?
        } else {
            parse_openai_response(&resp_json, model)?
        };

        tracing::info!(
            "LLM usage: provider={} model={} prompt_tokens={} completion_tokens={} latency={:?}",
            self.provider,
            parsed.model,
            parsed.usage.prompt_tokens,
            parsed.usage.completion_tokens,
            start.elapsed(),
        );

        Ok(parsed)
    }

    fn provider_name(&self) -> &str {
        match self.provider {
            LlmProvider::OpenRouter => "openrouter",
            LlmProvider::OpenAI => "openai",
            LlmProvider::Anthropic => "anthropic",
        }
    }

    fn default_model(&self) -> &str {
        &self.model
    }
}
