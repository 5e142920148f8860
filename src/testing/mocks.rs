//! Mock implementations for testing
//!
//! Provides a scripted LlmProvider and an in-memory TokenVerifier so the AI
//! service and the API can be exercised without Perplexity or Supabase.

use crate::auth::{AuthError, AuthUser, TokenVerifier};
use crate::llm::provider::{
    CompletionRequest, CompletionResponse, FinishReason, LlmError, LlmProvider, TokenUsage,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Mock LLM provider for testing
///
/// Answers are chosen by rule first: the first rule whose needle appears in
/// any message of the request wins. Otherwise the plain responses are served
/// round-robin.
#[derive(Debug, Default)]
pub struct MockLlmProvider {
    pub responses: Vec<String>,
    pub rules: Vec<(String, String)>,
    pub failing_needles: Vec<String>,
    pub current_response: Arc<Mutex<usize>>,
    pub requests: Arc<Mutex<Vec<CompletionRequest>>>,
    pub should_fail: bool,
}

impl MockLlmProvider {
    pub fn new(responses: Vec<String>) -> Self {
        Self {
            responses,
            ..Default::default()
        }
    }

    pub fn with_failure() -> Self {
        Self {
            should_fail: true,
            ..Default::default()
        }
    }

    pub fn single_response(response: impl Into<String>) -> Self {
        Self::new(vec![response.into()])
    }

    /// Answer `response` to any request mentioning `needle`
    pub fn with_rule(mut self, needle: impl Into<String>, response: impl Into<String>) -> Self {
        self.rules.push((needle.into(), response.into()));
        self
    }

    /// Fail any request mentioning `needle`
    pub fn failing_on(mut self, needle: impl Into<String>) -> Self {
        self.failing_needles.push(needle.into());
        self
    }

    /// Requests received so far
    pub async fn recorded_requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().await.clone()
    }

    fn mentions(request: &CompletionRequest, needle: &str) -> bool {
        request.messages.iter().any(|m| m.content.contains(needle))
    }
}

#[async_trait]
impl LlmProvider for MockLlmProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn available_models(&self) -> Vec<String> {
        vec!["mock-model".to_string()]
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.requests.lock().await.push(request.clone());

        if self.should_fail
            || self
                .failing_needles
                .iter()
                .any(|needle| Self::mentions(&request, needle))
        {
            return Err(LlmError::RequestFailed("Mock LLM failure".to_string()));
        }

        let ruled = self
            .rules
            .iter()
            .find(|(needle, _)| Self::mentions(&request, needle))
            .map(|(_, response)| response.clone());

        let content = match ruled {
            Some(content) => content,
            None if self.responses.is_empty() => "Mock response".to_string(),
            None => {
                let mut current = self.current_response.lock().await;
                let response_idx = *current % self.responses.len();
                *current += 1;
                self.responses[response_idx].clone()
            }
        };

        Ok(CompletionResponse {
            content: Some(content),
            model: request.model,
            usage: TokenUsage {
                prompt_tokens: 10,
                completion_tokens: 5,
                total_tokens: 15,
            },
            finish_reason: FinishReason::Stop,
            citations: Vec::new(),
            metadata: HashMap::new(),
        })
    }

    async fn health_check(&self) -> Result<(), LlmError> {
        if self.should_fail {
            Err(LlmError::RequestFailed(
                "Mock health check failure".to_string(),
            ))
        } else {
            Ok(())
        }
    }
}

/// Token verifier backed by a fixed token table
#[derive(Debug, Default, Clone)]
pub struct StaticTokenVerifier {
    users: HashMap<String, AuthUser>,
}

impl StaticTokenVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(
        mut self,
        token: impl Into<String>,
        id: impl Into<String>,
        email: impl Into<String>,
    ) -> Self {
        self.users.insert(
            token.into(),
            AuthUser {
                id: id.into(),
                email: email.into(),
            },
        );
        self
    }
}

#[async_trait]
impl TokenVerifier for StaticTokenVerifier {
    async fn verify(&self, token: &str) -> Result<AuthUser, AuthError> {
        self.users
            .get(token)
            .cloned()
            .ok_or(AuthError::InvalidToken)
    }
}
