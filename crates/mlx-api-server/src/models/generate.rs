//! `/generate` request/response types.

use serde::{Deserialize, Serialize};

use crate::generation::GenerationResult;

/// One inbound chat message. `role` stays a string until validation so an
/// unknown role becomes a validation error rather than a decode error.
#[derive(Debug, Clone, Deserialize)]
pub struct MessageBody {
    pub role: String,
    pub content: String,
}

/// Raw `/generate` body, before range checks and defaulting.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenerateBody {
    #[serde(default)]
    pub messages: Vec<MessageBody>,
    pub max_tokens: Option<i64>,
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
}

impl GenerateBody {
    /// Append a message; builder used by clients and tests.
    pub fn message(mut self, role: &str, content: &str) -> Self {
        self.messages.push(MessageBody {
            role: role.to_string(),
            content: content.to_string(),
        });
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: i64) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_top_p(mut self, top_p: f64) -> Self {
        self.top_p = Some(top_p);
        self
    }
}

/// Successful `/generate` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateResponse {
    pub response: String,
    pub tokens_generated: usize,
    pub generation_time_ms: u64,
    pub model: String,
}

impl From<GenerationResult> for GenerateResponse {
    fn from(result: GenerationResult) -> Self {
        Self {
            response: result.response_text,
            tokens_generated: result.tokens_generated,
            generation_time_ms: result.generation_time_ms,
            model: result.model_id,
        }
    }
}
