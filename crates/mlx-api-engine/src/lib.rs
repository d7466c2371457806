//! # mlx-api-engine
//!
//! The "narrow waist" of the mlx-api stack. Defines the capability traits the
//! serving layer consumes from a model runtime, plus the message and sampling
//! types that flow across that boundary. Backends can be swapped without
//! changing the server.
//!
//! ## Design Notes
//!
//! ### Blocking calls
//! `ModelRuntime::load` and `Model::generate` are synchronous and may run for
//! seconds. Callers on an async executor are expected to move them onto a
//! blocking pool.
//!
//! ### Single consumer
//! Native inference engines generally keep mutable state behind the model
//! handle. Implementations may assume `generate` is never called
//! concurrently on the same `LoadedModel`; the server enforces that.

use std::fmt;
use std::str::FromStr;

pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Top-level error type for all runtime operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuntimeError {
    #[error("Model loading failed: {0}")]
    ModelLoad(String),
    #[error("Chat template failed: {0}")]
    Template(String),
    /// The conversation itself is unacceptable to the runtime; resending it
    /// unchanged will fail the same way.
    #[error("Input rejected: {0}")]
    RejectedInput(String),
    #[error("Tokenization failed: {0}")]
    Tokenization(String),
    #[error("Generation failed: {0}")]
    Generation(String),
}

/// Speaker of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a role string is not one of the three chat roles.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown role '{0}' (expected system, user or assistant)")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "system" => Ok(Role::System),
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

/// A single role-tagged turn of a conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Per-call generation parameters, already validated and clamped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplingParams {
    /// Upper bound on generated tokens.
    pub max_tokens: usize,
    /// Softmax temperature. 0.0 means greedy.
    pub temperature: f32,
    /// Nucleus sampling mass.
    pub top_p: f32,
}

/// Tokenizer half of a loaded model: chat-template rendering and counting.
pub trait ChatTokenizer: Send + Sync {
    /// Render a conversation into the single prompt string the model
    /// consumes, ending with the assistant generation prompt.
    fn render(&self, messages: &[Message]) -> Result<String>;

    /// Number of tokens the model would see for `text`.
    fn count_tokens(&self, text: &str) -> Result<usize>;
}

/// Model half of a loaded model.
pub trait Model: Send + Sync {
    /// Autoregressively generate a completion for an already-rendered prompt.
    fn generate(
        &self,
        tokenizer: &dyn ChatTokenizer,
        prompt: &str,
        params: &SamplingParams,
    ) -> Result<String>;
}

/// The pair produced by a successful load. Dropping it releases the model.
pub struct LoadedModel {
    pub model: Box<dyn Model>,
    pub tokenizer: Box<dyn ChatTokenizer>,
}

impl LoadedModel {
    pub fn new(model: Box<dyn Model>, tokenizer: Box<dyn ChatTokenizer>) -> Self {
        Self { model, tokenizer }
    }

    /// Convenience wrapper for `Model::generate` with this pair's tokenizer.
    pub fn generate(&self, prompt: &str, params: &SamplingParams) -> Result<String> {
        self.model.generate(self.tokenizer.as_ref(), prompt, params)
    }
}

impl fmt::Debug for LoadedModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedModel").finish_non_exhaustive()
    }
}

/// Entry point of a backend: turns a model identifier into a loaded model.
pub trait ModelRuntime: Send + Sync {
    /// Load model weights and tokenizer for `model_id`.
    fn load(&self, model_id: &str) -> Result<LoadedModel>;
}
