//! Route handlers
//!
//! Handlers never reject: every outcome, including errors, is turned into a
//! response here so the status and body are decided in one place.

use super::models::*;
use super::AppState;
use crate::auth::AuthUser;
use crate::error::{sanitize_error_message, PhilError, PhilResult};
use crate::llm::provider::{LlmError, MessageRole};
use crate::observability::metrics::metrics;
use crate::storage::{Agent, AgentUpdate, NewAgent, PLACEHOLDER_SCRIPT};
use crate::studio::{ChatTurn, RequestType};
use crate::wizard::{sanitize_context_urls, WizardCatalog, WizardStep};
use serde::Serialize;
use std::convert::Infallible;
use tracing::{info, warn};
use warp::http::StatusCode;
use warp::reply::{Reply, Response};

pub const DEFAULT_AGENT_NAME: &str = "Custom Agent";

const CHAT_FALLBACK: &str =
    "I'm having trouble reaching the code assistant right now. Please try again in a moment.";

type HandlerResult = Result<Response, Infallible>;

fn json_reply<T: Serialize>(body: &T, status: StatusCode) -> Response {
    warp::reply::with_status(warp::reply::json(body), status).into_response()
}

/// Status and sanitized `{message}` body for an error
pub fn error_reply(error: &PhilError) -> Response {
    if error.status_code().is_server_error() {
        warn!("Request failed: {}", error);
    }
    json_reply(&error.to_body(), error.status_code())
}

fn respond<T: Serialize>(result: PhilResult<T>, status: StatusCode) -> Response {
    match result {
        Ok(body) => json_reply(&body, status),
        Err(error) => error_reply(&error),
    }
}

/// `{success: false, error}` with the given status
fn ai_failure(status: StatusCode, error: impl std::fmt::Display) -> Response {
    json_reply(
        &AiFailure {
            success: false,
            error: sanitize_error_message(&error.to_string()),
        },
        status,
    )
}

fn ai_respond<T: Serialize>(result: Result<T, LlmError>) -> Response {
    match result {
        Ok(body) => json_reply(&body, StatusCode::OK),
        Err(error) => ai_failure(StatusCode::INTERNAL_SERVER_ERROR, error),
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

async fn owned_agent(state: &AppState, id: i64, user: &AuthUser) -> PhilResult<Agent> {
    state
        .store
        .get_agent(id, &user.id)
        .await?
        .ok_or_else(|| PhilError::not_found("Agent not found"))
}

/// Documentation URLs an agent's code was built against
fn agent_context(agent: &Agent, max: usize) -> Vec<String> {
    agent
        .config
        .as_ref()
        .map(|config| config.grounding_urls(max))
        .unwrap_or_default()
}

// Users

pub async fn current_user(user: AuthUser, state: AppState) -> HandlerResult {
    let result = state
        .store
        .ensure_user(&user.id, &user.email)
        .await
        .map(|user| UserResponse { user })
        .map_err(PhilError::from);
    Ok(respond(result, StatusCode::OK))
}

// Agents

pub async fn list_agents(user: AuthUser, state: AppState) -> HandlerResult {
    let result = state
        .store
        .list_agents(&user.id)
        .await
        .map(|agents| AgentsResponse { agents })
        .map_err(PhilError::from);
    Ok(respond(result, StatusCode::OK))
}

pub async fn get_agent(id: i64, user: AuthUser, state: AppState) -> HandlerResult {
    let result = owned_agent(&state, id, &user)
        .await
        .map(|agent| AgentResponse { agent });
    Ok(respond(result, StatusCode::OK))
}

pub async fn create_agent(
    user: AuthUser,
    state: AppState,
    request: CreateAgentRequest,
) -> HandlerResult {
    Ok(respond(
        create_agent_inner(&user, &state, request).await,
        StatusCode::CREATED,
    ))
}

async fn create_agent_inner(
    user: &AuthUser,
    state: &AppState,
    request: CreateAgentRequest,
) -> PhilResult<CreatedAgentResponse> {
    state.store.ensure_user(&user.id, &user.email).await?;

    let requested_name = non_empty(request.name.as_deref()).map(str::to_string);
    let prompt = non_empty(request.prompt.as_deref()).map(str::to_string);
    let max_urls = state.max_context_urls;

    let mut config = request.config;
    let mut context = Vec::new();

    let generated = match (request.flow.as_deref(), prompt) {
        (Some(FLOW_CUSTOM), Some(prompt)) => {
            context = sanitize_context_urls(&request.context_urls, max_urls);
            Some(state.studio.custom(&prompt, &context).await)
        }
        (Some(FLOW_WIZARD), Some(prompt)) => {
            let mut wizard = config
                .clone()
                .ok_or_else(|| PhilError::invalid_input("Wizard flow requires a configuration"))?;
            let name = requested_name.as_deref().unwrap_or(DEFAULT_AGENT_NAME);
            if let Some(step) = WizardStep::first_incomplete(&wizard, name, &prompt) {
                return Err(PhilError::invalid_input(format!(
                    "Wizard step {} ({}) is incomplete",
                    step.number(),
                    step.label()
                )));
            }

            wizard.custom_urls = wizard
                .custom_urls
                .map(|urls| sanitize_context_urls(&urls, max_urls));
            context = wizard.grounding_urls(max_urls);
            let result = state
                .studio
                .walkthrough_with_stack(&prompt, &wizard.tech_stack(), context.clone())
                .await;
            config = Some(wizard);
            Some(result)
        }
        _ => None,
    };

    let (name, python_script) = match generated {
        Some(Ok(agent)) => (
            requested_name.or_else(|| non_empty(Some(&agent.name)).map(str::to_string)),
            agent.python,
        ),
        Some(Err(e)) => {
            warn!("Code generation failed, storing placeholder: {}", e);
            metrics().generation_fallback();
            (requested_name, PLACEHOLDER_SCRIPT.to_string())
        }
        None => (
            requested_name,
            non_empty(request.python_script.as_deref())
                .unwrap_or(PLACEHOLDER_SCRIPT)
                .to_string(),
        ),
    };

    let agent = state
        .store
        .create_agent(NewAgent {
            user_id: user.id.clone(),
            name: name.unwrap_or_else(|| DEFAULT_AGENT_NAME.to_string()),
            python_script,
            config,
        })
        .await?;
    metrics().agent_created();
    info!("Created agent {} for user {}", agent.id, user.id);

    let analysis = if agent.has_code() {
        Some(state.studio.analyze(&agent.python_script, &context).await).filter(|a| !a.is_empty())
    } else {
        None
    };

    Ok(CreatedAgentResponse { agent, analysis })
}

pub async fn update_agent(
    id: i64,
    user: AuthUser,
    state: AppState,
    update: AgentUpdate,
) -> HandlerResult {
    let result = async {
        if update.is_empty() {
            return Err(PhilError::invalid_input("No fields to update"));
        }
        if update.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
            return Err(PhilError::invalid_input("Agent name cannot be empty"));
        }
        state
            .store
            .update_agent(id, &user.id, update)
            .await?
            .map(|agent| AgentResponse { agent })
            .ok_or_else(|| PhilError::not_found("Agent not found"))
    }
    .await;
    Ok(respond(result, StatusCode::OK))
}

pub async fn delete_agent(id: i64, user: AuthUser, state: AppState) -> HandlerResult {
    let result = match state.store.delete_agent(id, &user.id).await {
        Ok(true) => {
            metrics().agent_deleted();
            info!("Deleted agent {} for user {}", id, user.id);
            Ok(MessageResponse {
                message: "Agent deleted successfully".to_string(),
            })
        }
        Ok(false) => Err(PhilError::not_found("Agent not found")),
        Err(e) => Err(e.into()),
    };
    Ok(respond(result, StatusCode::OK))
}

pub async fn agent_analysis(id: i64, user: AuthUser, state: AppState) -> HandlerResult {
    let result = async {
        let agent = owned_agent(&state, id, &user).await?;
        let analysis = if agent.has_code() {
            let context = agent_context(&agent, state.max_context_urls);
            state.studio.analyze(&agent.python_script, &context).await
        } else {
            Default::default()
        };
        Ok(AnalysisResponse { analysis })
    }
    .await;
    Ok(respond(result, StatusCode::OK))
}

// Wizard

pub async fn wizard_catalog(_user: AuthUser) -> HandlerResult {
    Ok(json_reply(&WizardCatalog::build(), StatusCode::OK))
}

// AI operations

fn require_text(value: &str, field: &str) -> Result<(), Response> {
    if value.trim().is_empty() {
        Err(ai_failure(
            StatusCode::BAD_REQUEST,
            format!("{field} is required"),
        ))
    } else {
        Ok(())
    }
}

pub async fn recommendations(
    _user: AuthUser,
    state: AppState,
    request: RecommendationsRequest,
) -> HandlerResult {
    if let Err(reply) = require_text(&request.prompt, "prompt") {
        return Ok(reply);
    }
    let result = state
        .studio
        .recommend(&request.prompt)
        .await
        .map(RecommendationsResponse::from);
    Ok(ai_respond(result))
}

pub async fn walkthrough(
    _user: AuthUser,
    state: AppState,
    request: WalkthroughRequest,
) -> HandlerResult {
    if let Err(reply) = require_text(&request.prompt, "prompt") {
        return Ok(reply);
    }

    let options = request.options.unwrap_or_default();
    let tech_stack = request
        .tech_stack
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| options.tech_stack());
    let context = options.grounding_urls(state.max_context_urls);

    let result = state
        .studio
        .walkthrough_with_stack(&request.prompt, &tech_stack, context)
        .await
        .map(|agent| GeneratedResponse {
            success: true,
            agent,
        });
    Ok(ai_respond(result))
}

pub async fn custom(_user: AuthUser, state: AppState, request: CustomRequest) -> HandlerResult {
    if let Err(reply) = require_text(&request.prompt, "prompt") {
        return Ok(reply);
    }
    let urls = sanitize_context_urls(&request.search_filters, state.max_context_urls);

    let result = state
        .studio
        .custom(&request.prompt, &urls)
        .await
        .map(|agent| GeneratedResponse {
            success: true,
            agent,
        });
    Ok(ai_respond(result))
}

pub async fn chat(user: AuthUser, state: AppState, request: ChatRequest) -> HandlerResult {
    if let Err(reply) = require_text(&request.message, "message") {
        return Ok(reply);
    }

    let agent = match request.agent_id {
        Some(id) => match owned_agent(&state, id, &user).await {
            Ok(agent) => Some(agent),
            Err(error) => return Ok(error_reply(&error)),
        },
        None => None,
    };

    let mut context_urls = sanitize_context_urls(&request.context_urls, state.max_context_urls);
    if context_urls.is_empty() {
        if let Some(agent) = &agent {
            context_urls = agent_context(agent, state.max_context_urls);
        }
    }

    let current_code = request
        .current_code
        .filter(|c| !c.trim().is_empty())
        .or_else(|| agent.as_ref().map(|a| a.python_script.clone()))
        .unwrap_or_default();

    let turn = ChatTurn {
        message: request.message,
        current_code,
        context_urls,
        history: request
            .messages_history
            .into_iter()
            .filter(|m| m.role != MessageRole::System)
            .collect(),
    };

    let reply = match state.studio.chat(turn).await {
        Ok(reply) => reply,
        Err(e) => {
            warn!("Chat failed, answering with fallback: {}", e);
            metrics().chat_fallback();
            return Ok(json_reply(
                &ChatResponse {
                    success: true,
                    response: CHAT_FALLBACK.to_string(),
                    request_type: RequestType::CrossQuestioning,
                    updated_code: None,
                    agent_name: agent.map(|a| a.name),
                },
                StatusCode::OK,
            ));
        }
    };

    let updated_code = reply.updated_code().map(str::to_string);
    metrics().chat_turn(updated_code.is_some());

    if let (Some(agent), Some(code)) = (&agent, &updated_code) {
        let update = AgentUpdate {
            python_script: Some(code.clone()),
            ..Default::default()
        };
        if let Err(e) = state.store.update_agent(agent.id, &user.id, update).await {
            warn!("Could not save updated code for agent {}: {}", agent.id, e);
        }
    }

    let mut response = reply.response.clone();
    if state.studio.personality_enabled() {
        match state.studio.personalize(&response).await {
            Ok(restyled) if !restyled.is_empty() => response = restyled,
            Ok(_) => {}
            Err(e) => warn!("Personality restyle skipped: {}", e),
        }
    }

    Ok(json_reply(
        &ChatResponse {
            success: true,
            response,
            request_type: reply.request_type,
            updated_code: updated_code.map(|python| UpdatedCode {
                cli: reply.cli.clone(),
                python,
            }),
            agent_name: reply.name.clone().or_else(|| agent.map(|a| a.name)),
        },
        StatusCode::OK,
    ))
}

pub async fn tech_review(
    _user: AuthUser,
    state: AppState,
    request: TechReviewRequest,
) -> HandlerResult {
    if let Err(reply) = require_text(&request.python_script, "pythonScript") {
        return Ok(reply);
    }
    let context = sanitize_context_urls(&request.search_context, state.max_context_urls);

    let result = state
        .studio
        .tech_review(&request.python_script, &context)
        .await
        .map(|review| TechReviewResponse {
            success: true,
            review,
        });
    Ok(ai_respond(result))
}

pub async fn cost_analysis(
    _user: AuthUser,
    state: AppState,
    request: CostAnalysisRequest,
) -> HandlerResult {
    if let Err(reply) = require_text(&request.python_script, "pythonScript") {
        return Ok(reply);
    }

    let result = state
        .studio
        .cost_analysis(&request.python_script)
        .await
        .map(|analysis| CostAnalysisResponse {
            success: true,
            analysis,
        });
    Ok(ai_respond(result))
}

pub async fn ai_health() -> HandlerResult {
    Ok(json_reply(
        &AiHealthResponse {
            status: "healthy",
            message: "AI service is running",
        },
        StatusCode::OK,
    ))
}
