//! HTTP API served to the PHIL frontend
//!
//! Path and method are matched before authentication so unknown routes
//! answer 404 rather than 401. Every failure leaves through [`recover`] as a
//! `{message}` body.

pub mod handlers;
pub mod models;

use crate::auth::{authenticate, AuthUser, TokenVerifier};
use crate::error::{ErrorBody, PhilError};
use crate::observability::metrics::metrics;
use crate::storage::AgentStore;
use crate::studio::Studio;
use serde::de::DeserializeOwned;
use std::convert::Infallible;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;
use warp::http::StatusCode;
use warp::reply::{Reply, Response};
use warp::{Filter, Rejection};

/// Largest JSON body accepted
pub const MAX_BODY_BYTES: u64 = 1024 * 1024;

/// Shared by every handler
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn AgentStore>,
    pub studio: Arc<Studio>,
    pub verifier: Arc<dyn TokenVerifier>,
    pub max_context_urls: usize,
}

impl AppState {
    pub fn new(
        store: Arc<dyn AgentStore>,
        studio: Arc<Studio>,
        verifier: Arc<dyn TokenVerifier>,
        max_context_urls: usize,
    ) -> Self {
        Self {
            store,
            studio,
            verifier,
            max_context_urls,
        }
    }
}

/// A [`PhilError`] carried through warp's rejection system
#[derive(Debug)]
pub struct ApiRejection(pub PhilError);

impl warp::reject::Reject for ApiRejection {}

fn with_state(state: AppState) -> impl Filter<Extract = (AppState,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}

/// Resolve the caller from the `Authorization` header
pub fn with_auth(
    verifier: Arc<dyn TokenVerifier>,
) -> impl Filter<Extract = (AuthUser,), Error = Rejection> + Clone {
    warp::header::optional::<String>("authorization").and_then(move |header: Option<String>| {
        let verifier = verifier.clone();
        async move {
            authenticate(verifier.as_ref(), header.as_deref())
                .await
                .map_err(|e| warp::reject::custom(ApiRejection(e.into())))
        }
    })
}

fn json_body<T: DeserializeOwned + Send>() -> impl Filter<Extract = (T,), Error = Rejection> + Clone
{
    warp::body::content_length_limit(MAX_BODY_BYTES).and(warp::body::json())
}

/// Every API route with CORS, request spans and metrics applied
pub fn routes(
    state: AppState,
    cors_origins: &[String],
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let auth = with_auth(state.verifier.clone());

    let current_user = warp::path!("api" / "users" / "me")
        .and(warp::get())
        .and(auth.clone())
        .and(with_state(state.clone()))
        .and_then(handlers::current_user);

    let list_agents = warp::path!("api" / "agents")
        .and(warp::get())
        .and(auth.clone())
        .and(with_state(state.clone()))
        .and_then(handlers::list_agents);

    let create_agent = warp::path!("api" / "agents")
        .and(warp::post())
        .and(auth.clone())
        .and(with_state(state.clone()))
        .and(json_body())
        .and_then(handlers::create_agent);

    let get_agent = warp::path!("api" / "agents" / i64)
        .and(warp::get())
        .and(auth.clone())
        .and(with_state(state.clone()))
        .and_then(handlers::get_agent);

    let update_agent = warp::path!("api" / "agents" / i64)
        .and(warp::put())
        .and(auth.clone())
        .and(with_state(state.clone()))
        .and(json_body())
        .and_then(handlers::update_agent);

    let delete_agent = warp::path!("api" / "agents" / i64)
        .and(warp::delete())
        .and(auth.clone())
        .and(with_state(state.clone()))
        .and_then(handlers::delete_agent);

    let agent_analysis = warp::path!("api" / "agents" / i64 / "analysis")
        .and(warp::get())
        .and(auth.clone())
        .and(with_state(state.clone()))
        .and_then(handlers::agent_analysis);

    let agents = list_agents
        .or(create_agent)
        .or(get_agent)
        .or(update_agent)
        .or(delete_agent)
        .or(agent_analysis);

    let wizard_catalog = warp::path!("api" / "wizard" / "catalog")
        .and(warp::get())
        .and(auth.clone())
        .and_then(handlers::wizard_catalog);

    let ai_health = warp::path!("api" / "ai" / "health")
        .and(warp::get())
        .and_then(handlers::ai_health);

    let recommendations = warp::path!("api" / "ai" / "recommendations")
        .and(warp::post())
        .and(auth.clone())
        .and(with_state(state.clone()))
        .and(json_body())
        .and_then(handlers::recommendations);

    let walkthrough = warp::path!("api" / "ai" / "walkthrough")
        .and(warp::post())
        .and(auth.clone())
        .and(with_state(state.clone()))
        .and(json_body())
        .and_then(handlers::walkthrough);

    let custom = warp::path!("api" / "ai" / "custom")
        .and(warp::post())
        .and(auth.clone())
        .and(with_state(state.clone()))
        .and(json_body())
        .and_then(handlers::custom);

    let chat = warp::path!("api" / "ai" / "chat")
        .and(warp::post())
        .and(auth.clone())
        .and(with_state(state.clone()))
        .and(json_body())
        .and_then(handlers::chat);

    let tech_review = warp::path!("api" / "ai" / "tech-review")
        .and(warp::post())
        .and(auth.clone())
        .and(with_state(state.clone()))
        .and(json_body())
        .and_then(handlers::tech_review);

    let cost_analysis = warp::path!("api" / "ai" / "cost-analysis")
        .and(warp::post())
        .and(auth)
        .and(with_state(state))
        .and(json_body())
        .and_then(handlers::cost_analysis);

    let ai = ai_health
        .or(recommendations)
        .or(walkthrough)
        .or(custom)
        .or(chat)
        .or(tech_review)
        .or(cost_analysis);

    let log = warp::log::custom(|info| {
        metrics().http_request(info.status().as_u16(), info.elapsed());
        debug!(
            method = %info.method(),
            path = info.path(),
            status = info.status().as_u16(),
            elapsed_ms = info.elapsed().as_millis() as u64,
            "Handled request"
        );
    });

    current_user
        .or(agents)
        .or(wizard_catalog)
        .or(ai)
        .recover(recover)
        .with(cors(cors_origins))
        .with(log)
        .with(warp::trace(|info| {
            crate::request_span!(
                request_id = %Uuid::new_v4(),
                method = %info.method(),
                path = info.path()
            )
        }))
}

fn cors(origins: &[String]) -> warp::cors::Builder {
    let builder = warp::cors()
        .allow_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS"])
        .allow_headers(vec!["authorization", "content-type"]);

    if origins.is_empty() {
        builder.allow_any_origin()
    } else {
        builder.allow_origins(origins.iter().map(String::as_str))
    }
}

fn status_reply(status: StatusCode, message: &str) -> Response {
    warp::reply::with_status(
        warp::reply::json(&ErrorBody {
            message: message.to_string(),
        }),
        status,
    )
    .into_response()
}

/// Turn any rejection into a `{message}` response
pub async fn recover(rejection: Rejection) -> Result<Response, Infallible> {
    if let Some(ApiRejection(error)) = rejection.find() {
        return Ok(handlers::error_reply(error));
    }

    let reply = if rejection.is_not_found() {
        status_reply(StatusCode::NOT_FOUND, "Route not found")
    } else if let Some(e) = rejection.find::<warp::filters::body::BodyDeserializeError>() {
        handlers::error_reply(&PhilError::invalid_input(e.to_string()))
    } else if rejection.find::<warp::reject::PayloadTooLarge>().is_some() {
        status_reply(StatusCode::PAYLOAD_TOO_LARGE, "Request body too large")
    } else if rejection
        .find::<warp::reject::UnsupportedMediaType>()
        .is_some()
    {
        status_reply(
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            "Request body must be JSON",
        )
    } else if rejection.find::<warp::reject::LengthRequired>().is_some() {
        status_reply(StatusCode::LENGTH_REQUIRED, "Content-Length required")
    } else if rejection.find::<warp::reject::MethodNotAllowed>().is_some() {
        status_reply(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed")
    } else {
        tracing::warn!("Unhandled rejection: {:?}", rejection);
        status_reply(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
    };

    Ok(reply)
}
