//! Health check HTTP server for container orchestration
//!
//! Serves liveness, readiness, component health and metrics on a separate
//! port from the API.

use crate::health::{HealthCheckManager, HealthCheckResult};
use crate::observability::metrics::metrics;
use serde::Serialize;
use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use warp::http::StatusCode;
use warp::Filter;

/// HTTP health check server
pub struct HealthServer {
    service: String,
    port: u16,
    checks: Arc<HealthCheckManager>,
}

impl HealthServer {
    /// Create new health server
    pub fn new(service: impl Into<String>, port: u16, checks: HealthCheckManager) -> Self {
        Self {
            service: service.into(),
            port,
            checks: Arc::new(checks),
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// All health endpoints as one filter
    pub fn routes(
        self: Arc<Self>,
    ) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
        let health_server = self.clone();
        let ready_server = self;

        // GET /health - comprehensive health status
        let health_route = warp::path("health")
            .and(warp::path::end())
            .and(warp::get())
            .and_then(move || {
                let server = health_server.clone();
                async move {
                    let status = server.get_health_status().await;
                    let status_code = if status.status == "healthy" {
                        StatusCode::OK
                    } else {
                        StatusCode::SERVICE_UNAVAILABLE
                    };
                    Ok::<_, Infallible>(warp::reply::with_status(
                        warp::reply::json(&status),
                        status_code,
                    ))
                }
            });

        // GET /metrics - complete metrics export
        let metrics_route = warp::path("metrics")
            .and(warp::path::end())
            .and(warp::get())
            .map(|| warp::reply::json(&metrics().get_metrics()));

        // GET /ready - readiness probe: every dependency reachable
        let ready_route = warp::path("ready")
            .and(warp::path::end())
            .and(warp::get())
            .and_then(move || {
                let server = ready_server.clone();
                async move {
                    let results = server.checks.run_health_checks().await;
                    let ready = HealthCheckManager::overall_health(&results);
                    let response = ReadinessResponse {
                        ready,
                        timestamp: current_timestamp(),
                    };
                    let status_code = if ready {
                        StatusCode::OK
                    } else {
                        StatusCode::SERVICE_UNAVAILABLE
                    };
                    Ok::<_, Infallible>(warp::reply::with_status(
                        warp::reply::json(&response),
                        status_code,
                    ))
                }
            });

        // GET /live - liveness probe
        let live_route = warp::path("live")
            .and(warp::path::end())
            .and(warp::get())
            .map(|| {
                warp::reply::json(&LivenessResponse {
                    alive: true,
                    timestamp: current_timestamp(),
                })
            });

        // GET / - endpoint index
        let root_route = warp::path::end().and(warp::get()).map(|| {
            let endpoints = HashMap::from([
                ("/health", "Overall health status with component checks"),
                ("/metrics", "HTTP, LLM, agent and chat statistics"),
                ("/ready", "Readiness probe"),
                ("/live", "Liveness probe"),
            ]);
            warp::reply::json(&ApiDocumentationResponse { endpoints })
        });

        health_route
            .or(metrics_route)
            .or(ready_route)
            .or(live_route)
            .or(root_route)
            .with(warp::cors().allow_any_origin())
    }

    /// Serve until `shutdown` resolves
    pub async fn start(
        self: Arc<Self>,
        shutdown: impl std::future::Future<Output = ()> + Send + 'static,
    ) {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        tracing::info!("Starting health server on {}", addr);

        let (_, server) = warp::serve(self.routes()).bind_with_graceful_shutdown(addr, shutdown);
        server.await;
    }

    async fn get_health_status(&self) -> HealthStatus {
        let now = current_timestamp();
        let results = self.checks.run_health_checks().await;
        let overall_healthy = HealthCheckManager::overall_health(&results);
        metrics().update_health_status(overall_healthy);

        let checks = results
            .into_iter()
            .map(|result| (result.component.clone(), ComponentCheck::from(result)))
            .collect();

        HealthStatus {
            status: if overall_healthy { "healthy" } else { "degraded" }.to_string(),
            timestamp: now,
            service: self.service.clone(),
            uptime_seconds: metrics().get_metrics().lifecycle.uptime_seconds,
            checks,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ComponentCheck {
    pub status: String,
    pub message: Option<String>,
    pub response_time_ms: Option<u64>,
}

impl From<HealthCheckResult> for ComponentCheck {
    fn from(result: HealthCheckResult) -> Self {
        Self {
            status: if result.healthy { "healthy" } else { "unhealthy" }.to_string(),
            message: result.message,
            response_time_ms: result.response_time_ms,
        }
    }
}

#[derive(Debug, Serialize)]
struct HealthStatus {
    status: String,
    timestamp: u64,
    service: String,
    uptime_seconds: u64,
    checks: HashMap<String, ComponentCheck>,
}

#[derive(Debug, Serialize)]
struct ReadinessResponse {
    ready: bool,
    timestamp: u64,
}

#[derive(Debug, Serialize)]
struct LivenessResponse {
    alive: bool,
    timestamp: u64,
}

#[derive(Debug, Serialize)]
struct ApiDocumentationResponse {
    endpoints: HashMap<&'static str, &'static str>,
}

fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
