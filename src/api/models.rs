//! Request and response bodies of the HTTP API (camelCase JSON)

use crate::llm::provider::Message;
use crate::storage::{Agent, User};
use crate::studio::{AgentAnalysis, CostAnalysis, GeneratedAgent, RequestType, TechReview};
use crate::wizard::{Recommendations, WizardConfig};
use serde::{de, Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

pub const FLOW_CUSTOM: &str = "custom";
pub const FLOW_WIZARD: &str = "wizard";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CreateAgentRequest {
    pub name: Option<String>,
    pub prompt: Option<String>,
    /// `custom`, `wizard`, or absent for a manual agent
    pub flow: Option<String>,
    pub config: Option<WizardConfig>,
    pub context_urls: Vec<String>,
    pub python_script: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecommendationsRequest {
    pub prompt: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WalkthroughRequest {
    pub prompt: String,
    pub options: Option<WizardConfig>,
    pub tech_stack: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CustomRequest {
    pub prompt: String,
    pub search_filters: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChatRequest {
    /// The chat page sends its route parameter, so a numeric string is accepted
    #[serde(deserialize_with = "agent_id")]
    pub agent_id: Option<i64>,
    pub message: String,
    pub context_urls: Vec<String>,
    pub current_code: Option<String>,
    pub messages_history: Vec<Message>,
}

fn agent_id<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Number(i64),
        Text(String),
    }

    match Option::<RawId>::deserialize(deserializer)? {
        None => Ok(None),
        Some(RawId::Number(id)) => Ok(Some(id)),
        Some(RawId::Text(text)) if text.trim().is_empty() => Ok(None),
        Some(RawId::Text(text)) => text
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| de::Error::custom(format!("invalid agentId: {text:?}"))),
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TechReviewRequest {
    pub python_script: String,
    pub search_context: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CostAnalysisRequest {
    pub python_script: String,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub user: User,
}

#[derive(Debug, Serialize)]
pub struct AgentsResponse {
    pub agents: Vec<Agent>,
}

#[derive(Debug, Serialize)]
pub struct AgentResponse {
    pub agent: Agent,
}

#[derive(Debug, Serialize)]
pub struct CreatedAgentResponse {
    pub agent: Agent,
    pub analysis: Option<AgentAnalysis>,
}

#[derive(Debug, Serialize)]
pub struct AnalysisResponse {
    pub analysis: AgentAnalysis,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationsResponse {
    pub success: bool,
    pub recommendations: BTreeMap<String, String>,
    pub justifications: BTreeMap<String, String>,
    pub suggested_config: WizardConfig,
}

impl From<Recommendations> for RecommendationsResponse {
    fn from(recommendations: Recommendations) -> Self {
        let suggested_config = recommendations.suggested_config();
        Self {
            success: true,
            recommendations: recommendations.options,
            justifications: recommendations.justifications,
            suggested_config,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct GeneratedResponse {
    pub success: bool,
    #[serde(flatten)]
    pub agent: GeneratedAgent,
}

#[derive(Debug, Serialize)]
pub struct UpdatedCode {
    pub cli: Option<String>,
    pub python: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    pub success: bool,
    pub response: String,
    pub request_type: RequestType,
    pub updated_code: Option<UpdatedCode>,
    pub agent_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TechReviewResponse {
    pub success: bool,
    #[serde(flatten)]
    pub review: TechReview,
}

#[derive(Debug, Serialize)]
pub struct CostAnalysisResponse {
    pub success: bool,
    #[serde(flatten)]
    pub analysis: CostAnalysis,
}

/// Body of a failed AI call
#[derive(Debug, Serialize)]
pub struct AiFailure {
    pub success: bool,
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct AiHealthResponse {
    pub status: &'static str,
    pub message: &'static str,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_request_accepts_sparse_body() {
        let request: CreateAgentRequest =
            serde_json::from_value(serde_json::json!({"name": "Bot"})).unwrap();
        assert_eq!(request.name.as_deref(), Some("Bot"));
        assert!(request.flow.is_none());
        assert!(request.context_urls.is_empty());
    }

    #[test]
    fn test_chat_request_reads_history() {
        let request: ChatRequest = serde_json::from_value(serde_json::json!({
            "agentId": 4,
            "message": "add retries",
            "messagesHistory": [
                {"role": "user", "content": "hi"},
                {"role": "assistant", "content": "hello"}
            ]
        }))
        .unwrap();
        assert_eq!(request.agent_id, Some(4));
        assert_eq!(request.messages_history.len(), 2);
    }

    #[test]
    fn test_chat_agent_id_accepts_route_strings() {
        let parse = |id: serde_json::Value| {
            serde_json::from_value::<ChatRequest>(serde_json::json!({
                "agentId": id,
                "message": "hi"
            }))
        };

        assert_eq!(parse(serde_json::json!("12")).unwrap().agent_id, Some(12));
        assert_eq!(parse(serde_json::json!(12)).unwrap().agent_id, Some(12));
        assert_eq!(parse(serde_json::json!(null)).unwrap().agent_id, None);
        assert_eq!(parse(serde_json::json!("")).unwrap().agent_id, None);
        assert!(parse(serde_json::json!("twelve")).is_err());
    }

    #[test]
    fn test_generated_response_is_flat() {
        let value = serde_json::to_value(GeneratedResponse {
            success: true,
            agent: GeneratedAgent {
                name: "Bot".into(),
                cli: "pip install x".into(),
                python: "print(1)".into(),
                conclusion: "Done".into(),
            },
        })
        .unwrap();
        assert_eq!(value["success"], true);
        assert_eq!(value["python"], "print(1)");
    }

    #[test]
    fn test_chat_response_uses_wire_names() {
        let value = serde_json::to_value(ChatResponse {
            success: true,
            response: "ok".into(),
            request_type: RequestType::CodeChange,
            updated_code: None,
            agent_name: None,
        })
        .unwrap();
        assert_eq!(value["requestType"], "Code_change");
        assert!(value["updatedCode"].is_null());
    }
}
