//! `/health` and `/stats` response types.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub model: String,
    pub model_loaded: bool,
    pub uptime_seconds: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsResponse {
    pub model: String,
    pub model_load_time_seconds: f64,
    pub uptime_seconds: f64,
    pub total_requests: u64,
    pub total_tokens_generated: u64,
}
