//! Request error taxonomy and HTTP response mapping.

use std::any::Any;
use std::fmt::Display;
use std::time::Duration;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::models::ErrorBody;
use crate::validation::ValidationError;

/// Longest detail string returned to clients for internal failures.
const MAX_DETAIL_LEN: usize = 200;

/// Why a generate call did not produce a result.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RequestError {
    #[error("model not loaded")]
    ServiceUnavailable,

    #[error("invalid request: {0}")]
    InvalidRequest(#[from] ValidationError),

    #[error("input too long: {input_tokens} tokens (max: {max_input_tokens})")]
    InputTooLong {
        input_tokens: usize,
        max_input_tokens: usize,
    },

    #[error("a generation is already in progress")]
    Busy,

    #[error("generation exceeded the {}s request timeout", .timeout.as_secs_f64())]
    Timeout { timeout: Duration },

    #[error("internal generation error: {0}")]
    InternalGeneration(String),
}

impl RequestError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            RequestError::ServiceUnavailable | RequestError::Busy => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            RequestError::InvalidRequest(_) | RequestError::InputTooLong { .. } => {
                StatusCode::BAD_REQUEST
            }
            RequestError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            RequestError::InternalGeneration(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether the same request may succeed if retried unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RequestError::ServiceUnavailable
                | RequestError::Busy
                | RequestError::Timeout { .. }
                | RequestError::InternalGeneration(_)
        )
    }

    fn body(&self) -> ErrorBody {
        let (error, detail) = match self {
            RequestError::ServiceUnavailable => (
                "Service unavailable",
                "Model not loaded. Server is starting up.".to_string(),
            ),
            RequestError::InvalidRequest(err) => ("Invalid request", err.to_string()),
            RequestError::InputTooLong {
                input_tokens,
                max_input_tokens,
            } => (
                "Input too long",
                format!("Input too long: {input_tokens} tokens (max: {max_input_tokens})"),
            ),
            RequestError::Busy => (
                "Server busy",
                "A generation is already in progress, retry later.".to_string(),
            ),
            RequestError::Timeout { .. } => ("Generation timed out", self.to_string()),
            RequestError::InternalGeneration(msg) => ("Generation failed", msg.clone()),
        };
        ErrorBody {
            error: error.to_string(),
            detail: Some(detail),
        }
    }
}

impl IntoResponse for RequestError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(self.body())).into_response()
    }
}

/// One-line, length-capped description of an internal failure, safe to hand
/// to clients.
pub fn summarize(err: impl Display) -> String {
    let text = err.to_string();
    let line = text.lines().next().unwrap_or_default().trim();
    match line.char_indices().nth(MAX_DETAIL_LEN) {
        Some((cut, _)) => format!("{}...", &line[..cut]),
        None => line.to_string(),
    }
}

/// Best-effort message from a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Last-resort response for a panic that escaped a handler.
pub fn panic_response(payload: Box<dyn Any + Send + 'static>) -> Response {
    let message = panic_message(payload.as_ref());
    tracing::error!(panic = %message, "unhandled panic in request handler");
    let body = ErrorBody {
        error: "Internal server error".to_string(),
        detail: Some(summarize(&message)),
    };
    (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes() {
        assert_eq!(
            RequestError::ServiceUnavailable.status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(RequestError::Busy.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            RequestError::InvalidRequest(ValidationError::EmptyMessages).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            RequestError::InputTooLong {
                input_tokens: 10,
                max_input_tokens: 5
            }
            .status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            RequestError::Timeout {
                timeout: Duration::from_secs(60)
            }
            .status_code(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            RequestError::InternalGeneration("x".to_string()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn retryability() {
        assert!(RequestError::ServiceUnavailable.is_retryable());
        assert!(RequestError::Timeout {
            timeout: Duration::from_secs(1)
        }
        .is_retryable());
        assert!(!RequestError::InvalidRequest(ValidationError::EmptyMessages).is_retryable());
        assert!(!RequestError::InputTooLong {
            input_tokens: 2,
            max_input_tokens: 1
        }
        .is_retryable());
    }

    #[test]
    fn input_too_long_detail() {
        let body = RequestError::InputTooLong {
            input_tokens: 3000,
            max_input_tokens: 2048,
        }
        .body();
        assert_eq!(body.error, "Input too long");
        assert_eq!(
            body.detail.as_deref(),
            Some("Input too long: 3000 tokens (max: 2048)")
        );
    }

    #[test]
    fn summarize_keeps_first_line_only() {
        assert_eq!(summarize("boom\n   at frame 1\n   at frame 2"), "boom");
        let long = "x".repeat(500);
        let short = summarize(&long);
        assert_eq!(short.len(), MAX_DETAIL_LEN + 3);
        assert!(short.ends_with("..."));
    }

    #[test]
    fn panic_payloads() {
        let payload: Box<dyn Any + Send> = Box::new("static message");
        assert_eq!(panic_message(payload.as_ref()), "static message");
        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(payload.as_ref()), "owned");
        let payload: Box<dyn Any + Send> = Box::new(42u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic");
    }
}
