//! Health check system for production monitoring
//!
//! Provides health check traits and implementations for the components PHIL
//! depends on: the agent store and the LLM provider.

use crate::llm::provider::LlmProvider;
use crate::storage::AgentStore;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Health check result
#[derive(Debug, Clone)]
pub struct HealthCheckResult {
    pub component: String,
    pub healthy: bool,
    pub message: Option<String>,
    pub response_time_ms: Option<u64>,
}

/// Trait for components that can be health checked
#[async_trait]
pub trait HealthCheck: Send + Sync {
    /// Perform health check on this component
    async fn health_check(&self) -> HealthCheckResult;

    /// Get the component name for reporting
    fn component_name(&self) -> &str;
}

/// Agent store health check implementation
pub struct StorageHealthCheck {
    store: Arc<dyn AgentStore>,
}

impl StorageHealthCheck {
    pub fn new(store: Arc<dyn AgentStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl HealthCheck for StorageHealthCheck {
    async fn health_check(&self) -> HealthCheckResult {
        let start = Instant::now();
        let result = self.store.health_check().await;
        let response_time_ms = start.elapsed().as_millis() as u64;

        let (healthy, message) = match result {
            Ok(()) => (true, format!("{} storage healthy", self.store.name())),
            Err(e) => {
                warn!(
                    "Storage health check failed: backend={}, error={}",
                    self.store.name(),
                    e
                );
                (false, format!("{} storage error: {}", self.store.name(), e))
            }
        };

        debug!(
            "Storage health check: healthy={}, response_time={}ms",
            healthy, response_time_ms
        );

        HealthCheckResult {
            component: self.component_name().to_string(),
            healthy,
            message: Some(message),
            response_time_ms: Some(response_time_ms),
        }
    }

    fn component_name(&self) -> &str {
        "storage"
    }
}

/// LLM provider health check implementation
pub struct LlmProviderHealthCheck {
    llm_provider: Arc<dyn LlmProvider>,
}

impl LlmProviderHealthCheck {
    pub fn new(llm_provider: Arc<dyn LlmProvider>) -> Self {
        Self { llm_provider }
    }
}

#[async_trait]
impl HealthCheck for LlmProviderHealthCheck {
    async fn health_check(&self) -> HealthCheckResult {
        let start = Instant::now();
        let component = self.component_name().to_string();

        match self.llm_provider.health_check().await {
            Ok(()) => {
                let response_time_ms = start.elapsed().as_millis() as u64;
                debug!(
                    "LLM provider health check: healthy=true, provider={}, response_time={}ms",
                    self.llm_provider.name(),
                    response_time_ms
                );

                HealthCheckResult {
                    component,
                    healthy: true,
                    message: Some(format!("{} provider healthy", self.llm_provider.name())),
                    response_time_ms: Some(response_time_ms),
                }
            }
            Err(e) => {
                let response_time_ms = start.elapsed().as_millis() as u64;
                warn!(
                    "LLM provider health check failed: provider={}, error={}, response_time={}ms",
                    self.llm_provider.name(),
                    e,
                    response_time_ms
                );

                HealthCheckResult {
                    component,
                    healthy: false,
                    message: Some(format!(
                        "{} provider error: {}",
                        self.llm_provider.name(),
                        e
                    )),
                    response_time_ms: Some(response_time_ms),
                }
            }
        }
    }

    fn component_name(&self) -> &str {
        "llm_provider"
    }
}

/// Aggregated health check manager
#[derive(Default)]
pub struct HealthCheckManager {
    health_checks: Vec<Box<dyn HealthCheck>>,
}

impl HealthCheckManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a health check to the manager
    pub fn add_health_check(&mut self, health_check: Box<dyn HealthCheck>) {
        self.health_checks.push(health_check);
    }

    /// Run all health checks and return aggregated results
    pub async fn run_health_checks(&self) -> Vec<HealthCheckResult> {
        let mut results = Vec::with_capacity(self.health_checks.len());

        for health_check in &self.health_checks {
            results.push(health_check.health_check().await);
        }

        results
    }

    /// All components must be healthy for overall health
    pub fn overall_health(results: &[HealthCheckResult]) -> bool {
        if results.is_empty() {
            warn!("No health checks configured - assuming healthy");
            return true;
        }

        let healthy_count = results.iter().filter(|r| r.healthy).count();
        debug!(
            "Overall health check: {}/{} components healthy",
            healthy_count,
            results.len()
        );

        healthy_count == results.len()
    }
}
