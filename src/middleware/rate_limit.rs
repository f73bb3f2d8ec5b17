//! Rate limiting middleware
//!
//! Per-process, not distributed — grounded in
//! `control-plane/src/middleware/rate_limit.rs`, generalized to key by
//! wallet id (path segment) instead of an authenticated user id, since this
//! service has no session-based auth.

use axum::{
    body::Body,
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::observability::metrics;
use crate::AppState;

#[derive(Debug, Clone)]
struct RateLimitBucket {
    requests: u32,
    window_start: Instant,
}

const CLEANUP_INTERVAL_SECS: u64 = 60;

#[derive(Clone)]
pub struct RateLimiter {
    buckets: Arc<RwLock<HashMap<String, RateLimitBucket>>>,
    window_secs: u64,
    max_requests: u32,
    last_cleanup: Arc<RwLock<Instant>>,
}

impl RateLimiter {
    pub fn new(window_secs: u64, max_requests: u32) -> Self {
        Self {
            buckets: Arc::new(RwLock::new(HashMap::new())),
            window_secs,
            max_requests,
            last_cleanup: Arc::new(RwLock::new(Instant::now())),
        }
    }

    pub async fn check(&self, key: &str) -> bool {
        let mut buckets = self.buckets.write().await;
        let now = Instant::now();
        let window = Duration::from_secs(self.window_secs);

        let should_cleanup = {
            let last = self.last_cleanup.read().await;
            now.duration_since(*last) >= Duration::from_secs(CLEANUP_INTERVAL_SECS)
        };
        if should_cleanup {
            let before = buckets.len();
            buckets.retain(|_, bucket| now.duration_since(bucket.window_start) < window);
            let evicted = before.saturating_sub(buckets.len());
            if evicted > 0 {
                tracing::debug!("rate limiter: evicted {} expired buckets", evicted);
            }
            *self.last_cleanup.write().await = now;
        }

        match buckets.get_mut(key) {
            Some(bucket) => {
                if now.duration_since(bucket.window_start) >= window {
                    bucket.requests = 1;
                    bucket.window_start = now;
                    true
                } else if bucket.requests < self.max_requests {
                    bucket.requests += 1;
                    true
                } else {
                    false
                }
            }
            None => {
                buckets.insert(
                    key.to_string(),
                    RateLimitBucket {
                        requests: 1,
                        window_start: now,
                    },
                );
                true
            }
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(60, 100)
    }
}

pub async fn rate_limit_middleware(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    state.metrics.increment(metrics::API_REQUESTS, 1).await;

    let key = request
        .uri()
        .path()
        .split('/')
        .nth(3)
        .unwrap_or("unknown")
        .to_string();

    if !state.rate_limiter.check(&key).await {
        state.metrics.increment(metrics::RATE_LIMITED, 1).await;
        return Err(StatusCode::TOO_MANY_REQUESTS);
    }

    let response = next.run(request).await;
    if response.status().is_client_error() || response.status().is_server_error() {
        state.metrics.increment(metrics::API_ERRORS, 1).await;
    }
    Ok(response)
}
