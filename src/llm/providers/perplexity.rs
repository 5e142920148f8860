//! Perplexity provider implementation
//!
//! Perplexity speaks the OpenAI chat-completions dialect plus a few search
//! extensions (`search_domain_filter`, `web_search_options`) and returns the
//! URLs it consulted as `citations`.

use crate::llm::provider::{
    CompletionRequest, CompletionResponse, FinishReason, LlmError, LlmProvider, Message,
    MessageRole, ResponseFormat, SearchContextSize, TokenUsage,
};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, warn};

/// Perplexity provider configuration
#[derive(Debug, Clone)]
pub struct PerplexityConfig {
    pub api_key: String,
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for PerplexityConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.perplexity.ai".to_string(),
            timeout: Duration::from_secs(120),
        }
    }
}

/// Perplexity provider implementation
pub struct PerplexityProvider {
    config: PerplexityConfig,
    client: Client,
}

impl PerplexityProvider {
    /// Create a new Perplexity provider
    pub fn new(config: PerplexityConfig) -> Result<Self, LlmError> {
        if config.api_key.is_empty() {
            return Err(LlmError::NotConfigured(
                "Perplexity API key is required".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::NetworkError(e.to_string()))?;

        Ok(Self { config, client })
    }

    /// Estimate token count for messages (pure function)
    fn estimate_token_count(messages: &[PerplexityMessage]) -> usize {
        messages.iter().map(|m| m.content.len() / 4).sum()
    }

    /// Convert completion request to Perplexity format (pure function)
    fn convert_request(request: &CompletionRequest) -> PerplexityRequest {
        let messages = request.messages.iter().map(Self::convert_message).collect();

        let response_format = request.response_format.as_ref().and_then(|rf| match rf {
            ResponseFormat::Text => None,
            ResponseFormat::JsonSchema { json_schema } => Some(PerplexityResponseFormat {
                format_type: "json_schema".to_string(),
                json_schema: PerplexityJsonSchema {
                    schema: json_schema.schema.clone(),
                },
            }),
        });

        PerplexityRequest {
            model: request.model.clone(),
            messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            search_domain_filter: request.search_domain_filter.clone(),
            web_search_options: request
                .search_context_size
                .map(|search_context_size| WebSearchOptions {
                    search_context_size,
                }),
            response_format,
        }
    }

    /// Convert internal message to Perplexity format (pure function)
    fn convert_message(message: &Message) -> PerplexityMessage {
        PerplexityMessage {
            role: match message.role {
                MessageRole::System => "system".to_string(),
                MessageRole::User => "user".to_string(),
                MessageRole::Assistant => "assistant".to_string(),
            },
            content: message.content.clone(),
        }
    }

    /// Parse Perplexity completion response (pure function)
    fn parse_completion_response(
        response: PerplexityResponse,
        request_metadata: std::collections::HashMap<String, String>,
    ) -> Result<CompletionResponse, LlmError> {
        let choice = response.choices.into_iter().next().ok_or_else(|| {
            LlmError::InvalidResponse("No choices returned from Perplexity".to_string())
        })?;

        let usage = response
            .usage
            .map(|u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            })
            .unwrap_or_default();

        Ok(CompletionResponse {
            content: choice.message.content,
            model: response.model,
            usage,
            finish_reason: Self::convert_finish_reason(choice.finish_reason.as_deref()),
            citations: response.citations,
            metadata: request_metadata,
        })
    }

    /// Convert finish reason to internal format (pure function)
    fn convert_finish_reason(reason: Option<&str>) -> FinishReason {
        match reason {
            Some("stop") => FinishReason::Stop,
            Some("length") => FinishReason::Length,
            Some("content_filter") => FinishReason::ContentFilter,
            _ => FinishReason::Error,
        }
    }

    /// Check if error should trigger retry (pure)
    fn should_retry(error: &LlmError) -> bool {
        match error {
            LlmError::NetworkError(_) => true,
            LlmError::ApiError { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

#[async_trait]
impl LlmProvider for PerplexityProvider {
    fn name(&self) -> &str {
        "perplexity"
    }

    fn available_models(&self) -> Vec<String> {
        vec![
            "sonar".to_string(),
            "sonar-pro".to_string(),
            "sonar-reasoning".to_string(),
            "sonar-reasoning-pro".to_string(),
            "sonar-deep-research".to_string(),
        ]
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let perplexity_request = Self::convert_request(&request);

        let estimated_tokens = Self::estimate_token_count(&perplexity_request.messages);
        debug!(
            "Perplexity request: model={}, {} messages, ~{} tokens, {} search domains",
            perplexity_request.model,
            perplexity_request.messages.len(),
            estimated_tokens,
            perplexity_request.search_domain_filter.len()
        );

        self.complete_with_retry(perplexity_request, request.metadata)
            .await
    }

    async fn health_check(&self) -> Result<(), LlmError> {
        let response = self
            .client
            .get(&self.config.base_url)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .send()
            .await
            .map_err(|e| LlmError::NetworkError(e.to_string()))?;

        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(LlmError::AuthenticationFailed(
                "Perplexity API rejected the configured key".to_string(),
            ));
        }

        Ok(())
    }
}

impl PerplexityProvider {
    /// Retry orchestrator - handles only I/O and retry logic (impure)
    async fn complete_with_retry(
        &self,
        request: PerplexityRequest,
        metadata: std::collections::HashMap<String, String>,
    ) -> Result<CompletionResponse, LlmError> {
        let backoff_delays = [200u64, 400, 800];
        let mut last_error = None;

        for (attempt, &delay_ms) in std::iter::once(&0u64)
            .chain(backoff_delays.iter())
            .enumerate()
        {
            if attempt > 0 {
                debug!(
                    "Perplexity retry attempt {} after {}ms delay",
                    attempt, delay_ms
                );
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }

            match self.make_api_request(&request).await {
                Ok(raw) => {
                    if attempt > 0 {
                        debug!("Perplexity request succeeded after {} retries", attempt);
                    }
                    let response = Self::parse_completion_response(raw, metadata)?;
                    debug!(
                        "Perplexity response: {} tokens used, {} citations, finish_reason: {:?}",
                        response.usage.total_tokens,
                        response.citations.len(),
                        response.finish_reason
                    );
                    return Ok(response);
                }
                Err(e) => {
                    warn!("Perplexity request attempt {} failed: {}", attempt + 1, e);
                    if !Self::should_retry(&e) {
                        error!("Non-retryable Perplexity error, aborting: {}", e);
                        return Err(e);
                    }
                    last_error = Some(e);
                }
            }
        }

        error!("Perplexity request failed after all retries");
        Err(last_error
            .unwrap_or_else(|| LlmError::NetworkError("All retry attempts failed".to_string())))
    }

    /// Make single API request (impure I/O)
    async fn make_api_request(
        &self,
        request: &PerplexityRequest,
    ) -> Result<PerplexityResponse, LlmError> {
        let response = self
            .client
            .post(format!("{}/chat/completions", self.config.base_url))
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| {
                LlmError::NetworkError(format!(
                    "HTTP request failed: {} (is_connect: {}, is_timeout: {})",
                    e,
                    e.is_connect(),
                    e.is_timeout()
                ))
            })?;

        let status = response.status();

        if status.is_success() {
            return response
                .json()
                .await
                .map_err(|e| LlmError::InvalidResponse(e.to_string()));
        }

        let error_text = response.text().await.unwrap_or_default();

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(LlmError::AuthenticationFailed(format!("{status} - {error_text}")))
            }
            StatusCode::TOO_MANY_REQUESTS => {
                Err(LlmError::RateLimitExceeded(format!("{status} - {error_text}")))
            }
            _ => Err(LlmError::ApiError {
                status: status.as_u16(),
                message: format!("Perplexity API error: {error_text}"),
            }),
        }
    }
}

#[derive(Debug, Serialize)]
struct PerplexityRequest {
    model: String,
    messages: Vec<PerplexityMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    search_domain_filter: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    web_search_options: Option<WebSearchOptions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<PerplexityResponseFormat>,
}

#[derive(Debug, Serialize)]
struct PerplexityMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct WebSearchOptions {
    search_context_size: SearchContextSize,
}

#[derive(Debug, Serialize)]
struct PerplexityResponseFormat {
    #[serde(rename = "type")]
    format_type: String,
    json_schema: PerplexityJsonSchema,
}

#[derive(Debug, Serialize)]
struct PerplexityJsonSchema {
    schema: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct PerplexityResponse {
    model: String,
    choices: Vec<PerplexityChoice>,
    usage: Option<PerplexityUsage>,
    #[serde(default)]
    citations: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct PerplexityChoice {
    message: PerplexityResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PerplexityResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PerplexityUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}
