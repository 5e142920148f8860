//! The AI service: every operation that turns a prompt into code, a review or
//! an estimate.
//!
//! Each operation builds one chat-completion request (system prompt from
//! [`crate::prompts`], grounding domains, model from configuration), sends it
//! through the [`LlmProvider`], and scrapes the answer with [`crate::markup`].

use crate::config::ModelSection;
use crate::llm::provider::{
    CompletionRequest, JsonSchemaDefinition, LlmError, LlmProvider, Message, ResponseFormat,
    SearchContextSize,
};
use crate::markup::{self, TagMap};
use crate::observability::metrics::metrics;
use crate::prompts;
use crate::wizard::{Recommendations, WizardConfig};
use once_cell::sync::Lazy;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn, Instrument};

const CUSTOM_MAX_TOKENS: u32 = 3000;
const CUSTOM_TEMPERATURE: f32 = 0.2;

/// Code produced by one of the builders
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeneratedAgent {
    pub name: String,
    pub cli: String,
    pub python: String,
    pub conclusion: String,
}

impl GeneratedAgent {
    fn from_answer(answer: &str) -> Result<Self, LlmError> {
        let tags = markup::extract_tags(answer);
        let python = markup::extract_python(answer).ok_or_else(|| {
            LlmError::InvalidResponse("answer contained no Python code".to_string())
        })?;

        Ok(Self {
            name: text(&tags, &["Name", "name"]),
            cli: text(&tags, &["CLI", "cli"]),
            python,
            conclusion: text(&tags, &["Conclusion", "conclusion"]),
        })
    }
}

/// What the user asked for in a chat turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestType {
    #[serde(rename = "Code_change")]
    CodeChange,
    #[serde(rename = "Cross_questioning")]
    CrossQuestioning,
}

impl RequestType {
    /// Anything that is not clearly a code change is treated as a question
    fn parse(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase().replace([' ', '-'], "_")) {
            Some(v) if v == "code_change" => RequestType::CodeChange,
            _ => RequestType::CrossQuestioning,
        }
    }
}

/// One chat message from the user about an agent
#[derive(Debug, Clone, Default)]
pub struct ChatTurn {
    pub message: String,
    pub current_code: String,
    pub context_urls: Vec<String>,
    /// Earlier messages, oldest first
    pub history: Vec<Message>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatReply {
    pub request_type: RequestType,
    pub name: Option<String>,
    pub cli: Option<String>,
    pub python: Option<String>,
    pub response: String,
}

impl ChatReply {
    fn from_answer(answer: &str) -> Self {
        let tags = markup::extract_tags(answer);
        let request_type = RequestType::parse(markup::field(&tags, "Request_type"));

        let response = markup::field_any(&tags, &["Response", "response"])
            .map(str::to_string)
            .unwrap_or_else(|| markup::strip_think(answer).trim().to_string());

        match request_type {
            RequestType::CodeChange => Self {
                request_type,
                name: markup::field(&tags, "Name").map(str::to_string),
                cli: markup::field(&tags, "CLI").map(str::to_string),
                python: markup::field(&tags, "python").and(markup::extract_python(answer)),
                response,
            },
            RequestType::CrossQuestioning => Self {
                request_type,
                name: None,
                cli: None,
                python: None,
                response,
            },
        }
    }

    /// Updated script, when the turn produced one
    pub fn updated_code(&self) -> Option<&str> {
        match self.request_type {
            RequestType::CodeChange => self.python.as_deref(),
            RequestType::CrossQuestioning => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TechReview {
    pub script_summary: String,
    pub technical_improvements: String,
    pub feature_suggestions: String,
    pub conclusion: String,
}

impl TechReview {
    fn from_answer(answer: &str) -> Result<Self, LlmError> {
        let tags = markup::extract_tags(answer);
        let review = Self {
            script_summary: text(&tags, &["ScriptSummary"]),
            technical_improvements: text(&tags, &["TechnicalImprovements"]),
            feature_suggestions: text(&tags, &["FeatureSuggestions"]),
            conclusion: text(&tags, &["Conclusion", "conclusion"]),
        };

        if review.script_summary.is_empty()
            && review.technical_improvements.is_empty()
            && review.conclusion.is_empty()
        {
            return Err(LlmError::InvalidResponse(
                "tech review answer had none of the expected fields".to_string(),
            ));
        }
        Ok(review)
    }
}

/// Shape the cost analysis prompt asks the model for
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "PascalCase")]
struct CostAnswer {
    /// Models, parameters and assumed usage
    analysis: String,
    /// Low / Moderate / High monthly cost breakdown with citations
    cost_estimation: String,
    /// Summary and one follow-up question
    conclusion: String,
}

static COST_SCHEMA: Lazy<serde_json::Value> = Lazy::new(|| {
    serde_json::to_value(schemars::schema_for!(CostAnswer)).unwrap_or_default()
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostAnalysis {
    pub analysis: String,
    pub cost_estimation: String,
    pub conclusion: String,
}

impl From<CostAnswer> for CostAnalysis {
    fn from(answer: CostAnswer) -> Self {
        Self {
            analysis: answer.analysis,
            cost_estimation: answer.cost_estimation,
            conclusion: answer.conclusion,
        }
    }
}

impl CostAnalysis {
    /// Schema-valid JSON first; otherwise the same fields as XML tags
    fn from_answer(answer: &str) -> Result<Self, LlmError> {
        if let Some(value) = markup::extract_json_object(answer) {
            match jsonschema::validator_for(&COST_SCHEMA) {
                Ok(validator) if validator.is_valid(&value) => {
                    if let Ok(parsed) = serde_json::from_value::<CostAnswer>(value) {
                        return Ok(parsed.into());
                    }
                }
                Ok(_) => debug!("Cost answer JSON did not match schema, trying tags"),
                Err(e) => warn!("Cost schema failed to compile: {}", e),
            }
        }

        let tags = markup::extract_tags(answer);
        let analysis = Self {
            analysis: text(&tags, &["Analysis"]),
            cost_estimation: text(&tags, &["CostEstimation"]),
            conclusion: text(&tags, &["Conclusion", "conclusion"]),
        };

        if analysis.analysis.is_empty() && analysis.cost_estimation.is_empty() {
            return Err(LlmError::InvalidResponse(
                "cost answer was neither schema JSON nor tagged".to_string(),
            ));
        }
        Ok(analysis)
    }
}

/// Review and estimate for one script; either side may be missing
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentAnalysis {
    pub tech_review: Option<TechReview>,
    pub cost_analysis: Option<CostAnalysis>,
}

impl AgentAnalysis {
    pub fn is_empty(&self) -> bool {
        self.tech_review.is_none() && self.cost_analysis.is_none()
    }
}

/// Trimmed field text, empty when absent or `NULL`
fn text(tags: &TagMap, names: &[&str]) -> String {
    markup::field_any(tags, names)
        .map(str::to_string)
        .unwrap_or_default()
}

/// Front door to the LLM for every AI operation
pub struct Studio {
    provider: Arc<dyn LlmProvider>,
    models: ModelSection,
    personality: bool,
}

impl Studio {
    pub fn new(provider: Arc<dyn LlmProvider>, models: ModelSection, personality: bool) -> Self {
        Self {
            provider,
            models,
            personality,
        }
    }

    pub fn provider(&self) -> Arc<dyn LlmProvider> {
        self.provider.clone()
    }

    /// Whether chat replies are restyled by the personality prompt
    pub fn personality_enabled(&self) -> bool {
        self.personality
    }

    /// Send a request and return the answer text, recording metrics
    async fn ask(
        &self,
        operation: &'static str,
        request: CompletionRequest,
    ) -> Result<String, LlmError> {
        let request = request.with_metadata("operation", operation);
        let span = crate::llm_span!(
            operation,
            model = %request.model,
            provider = self.provider.name()
        );

        async move {
            let start = Instant::now();
            let result = self.provider.complete(request).await;
            let elapsed = start.elapsed();

            let answer = result.and_then(|response| {
                if !response.citations.is_empty() {
                    debug!("{} consulted {} sources", operation, response.citations.len());
                }
                response
                    .content
                    .filter(|c| !c.trim().is_empty())
                    .ok_or_else(|| LlmError::InvalidResponse("empty answer".to_string()))
            });

            metrics().llm_call(operation, elapsed, answer.is_ok());
            match &answer {
                Ok(_) => info!("{} answered in {}ms", operation, elapsed.as_millis()),
                Err(e) => warn!("{} failed after {}ms: {}", operation, elapsed.as_millis(), e),
            }
            answer
        }
        .instrument(span)
        .await
    }

    /// Recommend a configuration for a use case
    pub async fn recommend(&self, prompt: &str) -> Result<Recommendations, LlmError> {
        let request = CompletionRequest::new(
            &self.models.recommendations,
            vec![Message::system(prompts::RECOMMENDATIONS), Message::user(prompt)],
        );

        let answer = self.ask("recommend", request).await?;
        let recommendations = Recommendations::from_tags(markup::extract_tags(&answer));
        if recommendations.options.is_empty() {
            return Err(LlmError::InvalidResponse(
                "recommendation answer had no tagged fields".to_string(),
            ));
        }
        Ok(recommendations)
    }

    /// Generate an agent for a completed wizard configuration
    pub async fn walkthrough(
        &self,
        prompt: &str,
        config: &WizardConfig,
    ) -> Result<GeneratedAgent, LlmError> {
        self.walkthrough_with_stack(prompt, &config.tech_stack(), config.search_context())
            .await
    }

    /// Generate an agent for an explicit stack description and search context
    pub async fn walkthrough_with_stack(
        &self,
        prompt: &str,
        tech_stack: &str,
        search_context: Vec<String>,
    ) -> Result<GeneratedAgent, LlmError> {
        let request = CompletionRequest::new(
            &self.models.generation,
            vec![
                Message::system(prompts::walkthrough(tech_stack)),
                Message::user(prompt),
            ],
        )
        .with_search(search_context, SearchContextSize::Medium);

        let answer = self.ask("walkthrough", request).await?;
        GeneratedAgent::from_answer(&answer)
    }

    /// Generate an agent grounded by the user's own sites
    pub async fn custom(&self, prompt: &str, urls: &[String]) -> Result<GeneratedAgent, LlmError> {
        let request = CompletionRequest::new(
            &self.models.generation,
            vec![Message::system(prompts::custom()), Message::user(prompt)],
        )
        .with_max_tokens(CUSTOM_MAX_TOKENS)
        .with_temperature(CUSTOM_TEMPERATURE)
        .with_search(urls.to_vec(), SearchContextSize::High);

        let answer = self.ask("custom", request).await?;
        GeneratedAgent::from_answer(&answer)
    }

    /// Answer a chat turn: either explain the agent or change its code
    pub async fn chat(&self, turn: ChatTurn) -> Result<ChatReply, LlmError> {
        let mut messages = Vec::with_capacity(turn.history.len() + 2);
        messages.push(Message::system(prompts::CHAT_INTENT));
        messages.extend(turn.history);
        messages.push(Message::user(format!(
            "{}\n\n{}",
            turn.message, turn.current_code
        )));

        let request = CompletionRequest::new(&self.models.chat, messages)
            .with_search(turn.context_urls, SearchContextSize::Medium);

        let answer = self.ask("chat", request).await?;
        Ok(ChatReply::from_answer(&answer))
    }

    /// Review a script for technical improvements
    pub async fn tech_review(
        &self,
        script: &str,
        context: &[String],
    ) -> Result<TechReview, LlmError> {
        let request = CompletionRequest::new(
            &self.models.review,
            vec![
                Message::system(prompts::TECH_REVIEW),
                Message::user(prompts::tech_review_request(script)),
            ],
        )
        .with_search(context.to_vec(), SearchContextSize::Medium);

        let answer = self.ask("tech_review", request).await?;
        TechReview::from_answer(&answer)
    }

    /// Forecast the running cost of a script
    pub async fn cost_analysis(&self, script: &str) -> Result<CostAnalysis, LlmError> {
        let request = CompletionRequest::new(
            &self.models.review,
            vec![
                Message::system(prompts::COST_ANALYSIS),
                Message::user(prompts::cost_analysis_request(script)),
            ],
        )
        .with_search(
            prompts::PRICING_DOMAINS.iter().map(|d| d.to_string()).collect(),
            SearchContextSize::Medium,
        )
        .with_response_format(ResponseFormat::JsonSchema {
            json_schema: JsonSchemaDefinition {
                schema: COST_SCHEMA.clone(),
            },
        });

        let answer = self.ask("cost_analysis", request).await?;
        CostAnalysis::from_answer(&answer)
    }

    /// Run the review and the estimate concurrently; a failing side is left empty
    pub async fn analyze(&self, script: &str, context: &[String]) -> AgentAnalysis {
        let (review, cost) = tokio::join!(
            self.tech_review(script, context),
            self.cost_analysis(script)
        );

        AgentAnalysis {
            tech_review: review
                .map_err(|e| warn!("Tech review unavailable: {}", e))
                .ok(),
            cost_analysis: cost
                .map_err(|e| warn!("Cost analysis unavailable: {}", e))
                .ok(),
        }
    }

    /// Restyle text with the instructor persona
    pub async fn personalize(&self, text: &str) -> Result<String, LlmError> {
        let request = CompletionRequest::new(
            &self.models.personality,
            vec![
                Message::system(prompts::PERSONALITY),
                Message::user(prompts::personality_request(text)),
            ],
        );

        let answer = self.ask("personality", request).await?;
        Ok(markup::strip_think(&answer).trim().to_string())
    }
}
