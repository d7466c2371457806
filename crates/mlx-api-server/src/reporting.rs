//! Read-only views over [`ServerState`] for monitoring endpoints.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::models::{HealthResponse, HealthStatus, StatsResponse};
use crate::state::ServerState;

#[derive(Clone)]
pub struct HealthReporter {
    state: Arc<ServerState>,
}

impl HealthReporter {
    pub fn new(state: Arc<ServerState>) -> Self {
        Self { state }
    }

    pub fn health(&self) -> HealthResponse {
        self.health_at(Utc::now())
    }

    pub fn health_at(&self, now: DateTime<Utc>) -> HealthResponse {
        let snap = self.state.snapshot();
        HealthResponse {
            status: if snap.model_loaded {
                HealthStatus::Healthy
            } else {
                HealthStatus::Unhealthy
            },
            uptime_seconds: snap.uptime_seconds(now),
            model_loaded: snap.model_loaded,
            model: snap.model_id,
        }
    }
}

#[derive(Clone)]
pub struct StatsReporter {
    state: Arc<ServerState>,
}

impl StatsReporter {
    pub fn new(state: Arc<ServerState>) -> Self {
        Self { state }
    }

    pub fn stats(&self) -> StatsResponse {
        self.stats_at(Utc::now())
    }

    /// All fields come from one snapshot.
    pub fn stats_at(&self, now: DateTime<Utc>) -> StatsResponse {
        let snap = self.state.snapshot();
        StatsResponse {
            uptime_seconds: snap.uptime_seconds(now),
            model: snap.model_id,
            model_load_time_seconds: snap.load_duration_seconds,
            total_requests: snap.request_count,
            total_tokens_generated: snap.total_tokens_generated,
        }
    }
}
