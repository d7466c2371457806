//! Server settings.
//!
//! Every option can be given as a flag or through its `MLX_*` environment
//! variable, and falls back to the documented default. Settings are resolved
//! once at startup and shared read-only afterwards.

use std::time::Duration;

use clap::{Parser, ValueEnum};

use crate::validation::{MAX_TOKENS_RANGE, TEMPERATURE_RANGE, TOP_P_RANGE};

pub const DEFAULT_MODEL: &str = "mlx-community/Llama-3.2-3B-Instruct-4bit";

/// What happens when a generate call arrives while another one is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ConcurrencyPolicy {
    /// Wait for the running generation to finish (bounded by the request timeout).
    #[default]
    Queue,
    /// Fail immediately with `Busy`.
    Reject,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid setting '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Resolved, immutable server configuration.
#[derive(Debug, Clone, Parser)]
#[command(name = "mlx-api", version, about = "Local LLM inference API for chat clients")]
pub struct Settings {
    /// Model identifier handed to the runtime loader.
    #[arg(long = "model", env = "MLX_MODEL", default_value = DEFAULT_MODEL)]
    pub model_id: String,

    /// Address to bind.
    #[arg(long, env = "MLX_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to bind.
    #[arg(long, env = "MLX_PORT", default_value_t = 8000)]
    pub port: u16,

    /// max_tokens used when a request omits it.
    #[arg(long = "max-tokens", env = "MLX_MAX_TOKENS", default_value_t = 512)]
    pub default_max_tokens: usize,

    /// temperature used when a request omits it.
    #[arg(long = "temperature", env = "MLX_TEMPERATURE", default_value_t = 0.7)]
    pub default_temperature: f32,

    /// top_p used when a request omits it.
    #[arg(long = "top-p", env = "MLX_TOP_P", default_value_t = 0.9)]
    pub default_top_p: f32,

    /// Rendered prompts longer than this many tokens are rejected.
    #[arg(long, env = "MLX_MAX_INPUT_TOKENS", default_value_t = 2048)]
    pub max_input_tokens: usize,

    /// Server-side ceiling on generated tokens.
    #[arg(long, env = "MLX_MAX_OUTPUT_TOKENS", default_value_t = 1024)]
    pub max_output_tokens: usize,

    /// Request timeout in seconds, covering queueing and generation.
    #[arg(
        long = "request-timeout",
        env = "MLX_REQUEST_TIMEOUT",
        default_value = "60",
        value_parser = parse_seconds
    )]
    pub request_timeout: Duration,

    /// Policy for overlapping generate calls.
    #[arg(
        long,
        env = "MLX_CONCURRENCY_POLICY",
        value_enum,
        default_value_t = ConcurrencyPolicy::Queue
    )]
    pub concurrency_policy: ConcurrencyPolicy,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            model_id: DEFAULT_MODEL.to_string(),
            host: "0.0.0.0".to_string(),
            port: 8000,
            default_max_tokens: 512,
            default_temperature: 0.7,
            default_top_p: 0.9,
            max_input_tokens: 2048,
            max_output_tokens: 1024,
            request_timeout: Duration::from_secs(60),
            concurrency_policy: ConcurrencyPolicy::Queue,
        }
    }
}

impl Settings {
    /// Check limits are positive and request defaults are themselves
    /// acceptable request values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.model_id.trim().is_empty() {
            return Err(invalid("model", "must not be empty"));
        }
        if self.max_input_tokens == 0 {
            return Err(invalid("max_input_tokens", "must be positive"));
        }
        if self.max_output_tokens == 0 {
            return Err(invalid("max_output_tokens", "must be positive"));
        }
        if self.request_timeout.is_zero() {
            return Err(invalid("request_timeout", "must be positive"));
        }
        if !MAX_TOKENS_RANGE.contains(&(self.default_max_tokens as i64)) {
            return Err(invalid(
                "max_tokens",
                format!(
                    "must be between {} and {}, got {}",
                    MAX_TOKENS_RANGE.start(),
                    MAX_TOKENS_RANGE.end(),
                    self.default_max_tokens
                ),
            ));
        }
        if !TEMPERATURE_RANGE.contains(&f64::from(self.default_temperature)) {
            return Err(invalid(
                "temperature",
                format!(
                    "must be between {} and {}, got {}",
                    TEMPERATURE_RANGE.start(),
                    TEMPERATURE_RANGE.end(),
                    self.default_temperature
                ),
            ));
        }
        if !TOP_P_RANGE.contains(&f64::from(self.default_top_p)) {
            return Err(invalid(
                "top_p",
                format!(
                    "must be between {} and {}, got {}",
                    TOP_P_RANGE.start(),
                    TOP_P_RANGE.end(),
                    self.default_top_p
                ),
            ));
        }
        Ok(())
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

fn parse_seconds(s: &str) -> Result<Duration, String> {
    s.trim()
        .parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|e| format!("expected whole seconds: {e}"))
}
