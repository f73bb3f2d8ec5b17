//! Observability: metrics collection and structured logging

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;

/// Metrics collector for tracking system health
#[derive(Clone)]
pub struct MetricsCollector {
    inner: Arc<RwLock<MetricsInner>>,
}

struct MetricsInner {
    counters: HashMap<String, u64>,
    gauges: HashMap<String, f64>,
    histograms: HashMap<String, Vec<f64>>,
    start_time: Instant,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(MetricsInner {
                counters: HashMap::new(),
                gauges: HashMap::new(),
                histograms: HashMap::new(),
                start_time: Instant::now(),
            })),
        }
    }

    /// Increment a counter
    pub async fn increment(&self, name: &str, value: u64) {
        let mut inner = self.inner.write().await;
        let counter = inner.counters.entry(name.to_string()).or_insert(0);
        *counter += value;
    }

    /// Set a gauge value
    pub async fn gauge(&self, name: &str, value: f64) {
        let mut inner = self.inner.write().await;
        inner.gauges.insert(name.to_string(), value);
    }

    /// Record a histogram value
    pub async fn histogram(&self, name: &str, value: f64) {
        let mut inner = self.inner.write().await;
        inner
            .histograms
            .entry(name.to_string())
            .or_insert_with(Vec::new)
            .push(value);
    }

    /// Get all metrics as JSON-serializable format
    pub async fn snapshot(&self) -> MetricsSnapshot {
        let inner = self.inner.read().await;
        MetricsSnapshot {
            counters: inner.counters.clone(),
            gauges: inner.gauges.clone(),
            uptime_secs: inner.start_time.elapsed().as_secs(),
        }
    }

    /// Get specific counter
    pub async fn get_counter(&self, name: &str) -> u64 {
        let inner = self.inner.read().await;
        inner.counters.get(name).copied().unwrap_or(0)
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// Serializable metrics snapshot
#[derive(Debug, Clone, serde::Serialize)]
pub struct MetricsSnapshot {
    pub counters: HashMap<String, u64>,
    pub gauges: HashMap<String, f64>,
    pub uptime_secs: u64,
}

/// Structured logger for consistent log formatting
pub struct Logger;

impl Logger {
    /// Log a structured event
    pub fn event(level: tracing::Level, component: &str, event: &str, attributes: &[(&str, &str)]) {
        let attrs = attributes
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(", ");

        match level {
            tracing::Level::ERROR => tracing::error!(component, event, %attrs),
            tracing::Level::WARN => tracing::warn!(component, event, %attrs),
            tracing::Level::INFO => tracing::info!(component, event, %attrs),
            tracing::Level::DEBUG => tracing::debug!(component, event, %attrs),
            _ => tracing::trace!(component, event, %attrs),
        }
    }

    /// Log a claim lifecycle event
    pub fn claim_event(claim_id: &str, event_type: &str, details: &str) {
        tracing::info!(
            claim_id = %claim_id,
            event_type = %event_type,
            details = %details,
            "claim_event"
        );
    }

    /// Log a drain job lifecycle event
    pub fn drain_event(drain_job_id: &str, action: &str, status: &str) {
        tracing::info!(
            drain_job_id = %drain_job_id,
            action = %action,
            status = %status,
            "drain_event"
        );
    }
}

/// Predefined metric names
pub mod metrics {
    // Claims
    pub const CLAIM_CREATED: &str = "claim_created_total";
    pub const CLAIM_CONFLICT: &str = "claim_conflict_total";
    pub const CLAIM_CREDENTIALS_SIGNED: &str = "claim_credentials_signed_total";

    // Suggestions
    pub const SUGGESTION_REDEEMED: &str = "suggestion_redeemed_total";
    pub const SUGGESTION_ERRORS: &str = "suggestion_errors_total";

    // Drain pipeline
    pub const DRAIN_INGESTED: &str = "drain_ingested_total";
    pub const DRAIN_COMPLETED: &str = "drain_completed_total";
    pub const DRAIN_FAILED: &str = "drain_failed_total";
    pub const DRAIN_BATCH_SUBMITTED: &str = "drain_batch_submitted_total";
    pub const DRAIN_POLL_CHECKED: &str = "drain_poll_checked_total";
    pub const DRAIN_RETRIED: &str = "drain_retried_total";
    pub const MINT_COMPLETED: &str = "mint_completed_total";
    pub const MINT_FAILED: &str = "mint_failed_total";

    // API
    pub const API_REQUESTS: &str = "api_requests_total";
    pub const API_ERRORS: &str = "api_errors_total";
    pub const RATE_LIMITED: &str = "rate_limited_total";
}
