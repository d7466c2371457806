//! Shape and range checks for /generate bodies.
//!
//! Runs before any tokenizer or model call, so a rejected request costs nothing.

use std::ops::RangeInclusive;

use mlx_api_engine::{Message, Role};

use crate::config::Settings;
use crate::models::GenerateBody;

pub const MAX_TOKENS_RANGE: RangeInclusive<i64> = 1..=2048;
pub const TEMPERATURE_RANGE: RangeInclusive<f64> = 0.0..=2.0;
pub const TOP_P_RANGE: RangeInclusive<f64> = 0.0..=1.0;

/// Why a request body was refused before reaching the model.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("malformed request body: {0}")]
    MalformedBody(String),

    #[error("messages must contain at least one message")]
    EmptyMessages,

    #[error("messages[{index}].role: unknown role '{role}' (expected system, user or assistant)")]
    UnknownRole { index: usize, role: String },

    #[error("invalid parameter '{field}': {reason}")]
    OutOfRange { field: &'static str, reason: String },

    /// Message content the model's chat template cannot represent.
    #[error("unsupported message content: {0}")]
    UnsupportedContent(String),
}

/// A request that passed validation, with defaults filled in.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub messages: Vec<Message>,
    pub max_tokens: usize,
    pub temperature: f32,
    pub top_p: f32,
}

/// Validate a raw body, falling back to the configured defaults for omitted fields.
pub fn validate(body: GenerateBody, defaults: &Settings) -> Result<GenerationRequest, ValidationError> {
    if body.messages.is_empty() {
        return Err(ValidationError::EmptyMessages);
    }

    let mut messages = Vec::with_capacity(body.messages.len());
    for (index, msg) in body.messages.into_iter().enumerate() {
        let role: Role = msg
            .role
            .parse()
            .map_err(|_| ValidationError::UnknownRole {
                index,
                role: msg.role.clone(),
            })?;
        messages.push(Message::new(role, msg.content));
    }

    let max_tokens = body.max_tokens.unwrap_or(defaults.default_max_tokens as i64);
    check_range("max_tokens", max_tokens, &MAX_TOKENS_RANGE)?;

    let temperature = body
        .temperature
        .unwrap_or(f64::from(defaults.default_temperature));
    check_range("temperature", temperature, &TEMPERATURE_RANGE)?;

    let top_p = body.top_p.unwrap_or(f64::from(defaults.default_top_p));
    check_range("top_p", top_p, &TOP_P_RANGE)?;

    Ok(GenerationRequest {
        messages,
        // range-checked above: 1..=2048 fits usize, [0, 2] fits f32
        max_tokens: max_tokens as usize,
        temperature: temperature as f32,
        top_p: top_p as f32,
    })
}

fn check_range<T>(field: &'static str, value: T, range: &RangeInclusive<T>) -> Result<(), ValidationError>
where
    T: PartialOrd + std::fmt::Display,
{
    // NaN fails `contains`
    if range.contains(&value) {
        return Ok(());
    }
    Err(ValidationError::OutOfRange {
        field,
        reason: format!(
            "must be between {} and {}, got {}",
            range.start(),
            range.end(),
            value
        ),
    })
}
