//! Thread-safe metrics collection system
//!
//! Provides atomic counters and mutex-protected collections for tracking
//! HTTP traffic, LLM calls, agent lifecycle and chat activity.

use once_cell::sync::Lazy;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Global metrics collector instance
pub static METRICS: Lazy<MetricsCollector> = Lazy::new(MetricsCollector::new);

/// Get reference to global metrics collector
pub fn metrics() -> &'static MetricsCollector {
    &METRICS
}

/// Bounded sample window for latency statistics
const MAX_SAMPLES: usize = 1000;

/// Thread-safe metrics collector using atomics and mutexes
pub struct MetricsCollector {
    // HTTP metrics
    http_requests: AtomicU64,
    http_client_errors: AtomicU64,
    http_server_errors: AtomicU64,
    response_times: Mutex<Vec<u64>>, // in milliseconds

    // LLM statistics per operation (recommend, walkthrough, chat, ...)
    llm_stats: Mutex<HashMap<String, LlmCallStats>>,

    // Agent and chat metrics
    agents_created: AtomicU64,
    agents_deleted: AtomicU64,
    generation_fallbacks: AtomicU64,
    chat_turns: AtomicU64,
    code_changes: AtomicU64,
    chat_fallbacks: AtomicU64,

    // Lifecycle metrics
    uptime_start: AtomicU64,
    health_status: AtomicBool,
    last_health_check: AtomicU64,
}

impl MetricsCollector {
    pub fn new() -> Self {
        let now = current_timestamp();

        Self {
            http_requests: AtomicU64::new(0),
            http_client_errors: AtomicU64::new(0),
            http_server_errors: AtomicU64::new(0),
            response_times: Mutex::new(Vec::new()),
            llm_stats: Mutex::new(HashMap::new()),
            agents_created: AtomicU64::new(0),
            agents_deleted: AtomicU64::new(0),
            generation_fallbacks: AtomicU64::new(0),
            chat_turns: AtomicU64::new(0),
            code_changes: AtomicU64::new(0),
            chat_fallbacks: AtomicU64::new(0),
            uptime_start: AtomicU64::new(now),
            health_status: AtomicBool::new(true),
            last_health_check: AtomicU64::new(now),
        }
    }

    // HTTP metrics
    pub fn http_request(&self, status: u16, duration: Duration) {
        self.http_requests.fetch_add(1, Ordering::Relaxed);
        match status {
            400..=499 => {
                self.http_client_errors.fetch_add(1, Ordering::Relaxed);
            }
            500..=599 => {
                self.http_server_errors.fetch_add(1, Ordering::Relaxed);
            }
            _ => {}
        }

        if let Ok(mut times) = self.response_times.lock() {
            push_bounded(&mut times, duration.as_millis() as u64);
        }
    }

    // LLM metrics
    pub fn llm_call(&self, operation: &str, duration: Duration, success: bool) {
        if let Ok(mut stats) = self.llm_stats.lock() {
            let entry = stats
                .entry(operation.to_string())
                .or_insert_with(|| LlmCallStats {
                    operation: operation.to_string(),
                    ..Default::default()
                });

            entry.calls += 1;
            entry.last_call = current_timestamp();
            push_bounded(&mut entry.call_times, duration.as_millis() as u64);
            if !success {
                entry.failures += 1;
            }
        }
    }

    // Agent metrics
    pub fn agent_created(&self) {
        self.agents_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn agent_deleted(&self) {
        self.agents_deleted.fetch_add(1, Ordering::Relaxed);
    }

    /// Generation failed and the placeholder script was stored instead
    pub fn generation_fallback(&self) {
        self.generation_fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    // Chat metrics
    pub fn chat_turn(&self, code_change: bool) {
        self.chat_turns.fetch_add(1, Ordering::Relaxed);
        if code_change {
            self.code_changes.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn chat_fallback(&self) {
        self.chat_fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    // Health status metrics
    pub fn update_health_status(&self, healthy: bool) {
        self.health_status.store(healthy, Ordering::Relaxed);
        self.last_health_check
            .store(current_timestamp(), Ordering::Relaxed);
    }

    // Reset all metrics (useful for testing)
    pub fn reset(&self) {
        let now = current_timestamp();
        for counter in [
            &self.http_requests,
            &self.http_client_errors,
            &self.http_server_errors,
            &self.agents_created,
            &self.agents_deleted,
            &self.generation_fallbacks,
            &self.chat_turns,
            &self.code_changes,
            &self.chat_fallbacks,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        self.uptime_start.store(now, Ordering::Relaxed);
        self.health_status.store(true, Ordering::Relaxed);
        self.last_health_check.store(now, Ordering::Relaxed);

        if let Ok(mut times) = self.response_times.lock() {
            times.clear();
        }
        if let Ok(mut stats) = self.llm_stats.lock() {
            stats.clear();
        }
    }

    /// Calculate response time statistics (pure function)
    fn response_time_statistics(&self) -> (f64, f64, f64, f64) {
        let Ok(times) = self.response_times.lock() else {
            return (0.0, 0.0, 0.0, 0.0);
        };
        if times.is_empty() {
            return (0.0, 0.0, 0.0, 0.0);
        }

        let mut sorted_times = times.clone();
        sorted_times.sort_unstable();

        let avg = sorted_times.iter().sum::<u64>() as f64 / sorted_times.len() as f64;
        (
            avg,
            percentile(&sorted_times, 50.0),
            percentile(&sorted_times, 95.0),
            percentile(&sorted_times, 99.0),
        )
    }

    /// Build LLM statistics summary (pure function)
    fn build_llm_metrics(&self) -> LlmMetrics {
        let Ok(stats) = self.llm_stats.lock() else {
            return LlmMetrics::default();
        };

        let mut metrics = LlmMetrics::default();
        for (name, stats) in stats.iter() {
            metrics.total_calls += stats.calls;
            metrics.total_failures += stats.failures;
            metrics
                .operations
                .insert(name.clone(), stats.snapshot());
        }
        metrics
    }

    /// Get complete metrics snapshot
    pub fn get_metrics(&self) -> MetricsSnapshot {
        let now = current_timestamp();
        let (avg_response_time_ms, p50, p95, p99) = self.response_time_statistics();

        MetricsSnapshot {
            http: HttpMetrics {
                requests: self.http_requests.load(Ordering::Relaxed),
                client_errors: self.http_client_errors.load(Ordering::Relaxed),
                server_errors: self.http_server_errors.load(Ordering::Relaxed),
                avg_response_time_ms,
                response_time_p50_ms: p50,
                response_time_p95_ms: p95,
                response_time_p99_ms: p99,
            },
            llm: self.build_llm_metrics(),
            agents: AgentMetrics {
                created: self.agents_created.load(Ordering::Relaxed),
                deleted: self.agents_deleted.load(Ordering::Relaxed),
                generation_fallbacks: self.generation_fallbacks.load(Ordering::Relaxed),
            },
            chat: ChatMetrics {
                turns: self.chat_turns.load(Ordering::Relaxed),
                code_changes: self.code_changes.load(Ordering::Relaxed),
                fallbacks: self.chat_fallbacks.load(Ordering::Relaxed),
            },
            lifecycle: LifecycleMetrics {
                uptime_seconds: now.saturating_sub(self.uptime_start.load(Ordering::Relaxed)),
                healthy: self.health_status.load(Ordering::Relaxed),
                last_health_check: self.last_health_check.load(Ordering::Relaxed),
            },
            timestamp: now,
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

// Internal LLM statistics (with timing data)
#[derive(Debug, Default)]
struct LlmCallStats {
    operation: String,
    calls: u64,
    failures: u64,
    call_times: Vec<u64>, // milliseconds
    last_call: u64,
}

impl LlmCallStats {
    fn snapshot(&self) -> LlmCallStatsSnapshot {
        let avg_call_time_ms = if self.call_times.is_empty() {
            0.0
        } else {
            self.call_times.iter().sum::<u64>() as f64 / self.call_times.len() as f64
        };

        let success_rate = if self.calls == 0 {
            0.0
        } else {
            (self.calls - self.failures) as f64 / self.calls as f64
        };

        LlmCallStatsSnapshot {
            operation: self.operation.clone(),
            calls: self.calls,
            failures: self.failures,
            avg_call_time_ms,
            last_call: self.last_call,
            success_rate,
        }
    }
}

// Public metrics structures
#[derive(Debug, Serialize)]
pub struct MetricsSnapshot {
    pub http: HttpMetrics,
    pub llm: LlmMetrics,
    pub agents: AgentMetrics,
    pub chat: ChatMetrics,
    pub lifecycle: LifecycleMetrics,
    pub timestamp: u64,
}

#[derive(Debug, Serialize)]
pub struct HttpMetrics {
    pub requests: u64,
    pub client_errors: u64,
    pub server_errors: u64,
    pub avg_response_time_ms: f64,
    pub response_time_p50_ms: f64,
    pub response_time_p95_ms: f64,
    pub response_time_p99_ms: f64,
}

#[derive(Debug, Default, Serialize)]
pub struct LlmMetrics {
    pub operations: HashMap<String, LlmCallStatsSnapshot>,
    pub total_calls: u64,
    pub total_failures: u64,
}

#[derive(Debug, Serialize)]
pub struct LlmCallStatsSnapshot {
    pub operation: String,
    pub calls: u64,
    pub failures: u64,
    pub avg_call_time_ms: f64,
    pub last_call: u64,
    pub success_rate: f64,
}

#[derive(Debug, Serialize)]
pub struct AgentMetrics {
    pub created: u64,
    pub deleted: u64,
    pub generation_fallbacks: u64,
}

#[derive(Debug, Serialize)]
pub struct ChatMetrics {
    pub turns: u64,
    pub code_changes: u64,
    pub fallbacks: u64,
}

#[derive(Debug, Serialize)]
pub struct LifecycleMetrics {
    pub uptime_seconds: u64,
    pub healthy: bool,
    pub last_health_check: u64,
}

// Helper functions
fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn push_bounded(samples: &mut Vec<u64>, value: u64) {
    samples.push(value);
    if samples.len() > MAX_SAMPLES {
        samples.remove(0);
    }
}

fn percentile(sorted_data: &[u64], percentile: f64) -> f64 {
    if sorted_data.is_empty() {
        return 0.0;
    }

    let len = sorted_data.len();
    let index = (percentile / 100.0) * (len - 1) as f64;

    if index.fract() == 0.0 {
        sorted_data[index as usize] as f64
    } else {
        let lower_index = index.floor() as usize;
        let upper_index = index.ceil() as usize;
        let lower_value = sorted_data[lower_index] as f64;
        let upper_value = sorted_data[upper_index] as f64;

        lower_value + (upper_value - lower_value) * index.fract()
    }
}
