//! HTTP request/response types.

pub mod generate;
pub mod monitoring;

pub use generate::{GenerateBody, GenerateResponse, MessageBody};
pub use monitoring::{HealthResponse, HealthStatus, StatsResponse};

use serde::{Deserialize, Serialize};

/// Body of every non-2xx response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}
