//! # mlx-api-tokenizer
//!
//! Deterministic prompt rendering and token counting for mlx-api.
//!
//! This crate provides:
//! - Chat templates that turn role-tagged messages into a single prompt
//! - A reference whitespace tokenizer that treats template control markers as
//!   single tokens
//! - [`TemplateTokenizer`], which pairs the two behind the engine's
//!   [`ChatTokenizer`] trait

mod template;

pub use template::ChatTemplate;

use mlx_api_engine::{ChatTokenizer, Message, RuntimeError};

/// Error type for tokenization operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenizerError {
    #[error("empty conversation")]
    EmptyConversation,
    #[error("message {index} contains reserved marker {marker}")]
    ReservedMarker { index: usize, marker: &'static str },
}

pub type TokenizerResult<T> = std::result::Result<T, TokenizerError>;

impl From<TokenizerError> for RuntimeError {
    fn from(err: TokenizerError) -> Self {
        match err {
            TokenizerError::ReservedMarker { .. } => RuntimeError::RejectedInput(err.to_string()),
            TokenizerError::EmptyConversation => RuntimeError::Template(err.to_string()),
        }
    }
}

/// Reference whitespace tokenizer.
///
/// - Splits on whitespace
/// - Control markers such as `<|eot_id|>` count as one token each, even when
///   glued to neighbouring text
/// - Stateless and deterministic
#[derive(Debug, Clone)]
pub struct WhitespaceTokenizer {
    markers: &'static [&'static str],
}

impl WhitespaceTokenizer {
    pub fn new() -> Self {
        Self { markers: &[] }
    }

    /// Tokenizer that recognises the control markers of `template`.
    pub fn for_template(template: ChatTemplate) -> Self {
        Self {
            markers: template.markers(),
        }
    }

    /// Split `text` into token pieces, borrowing from the input.
    pub fn pieces<'a>(&self, text: &'a str) -> Vec<&'a str> {
        let mut out = Vec::new();
        let mut rest = text;
        while !rest.is_empty() {
            match self.next_marker(rest) {
                Some((at, marker)) => {
                    out.extend(rest[..at].split_whitespace());
                    out.push(&rest[at..at + marker.len()]);
                    rest = &rest[at + marker.len()..];
                }
                None => {
                    out.extend(rest.split_whitespace());
                    break;
                }
            }
        }
        out
    }

    /// Number of pieces in `text`.
    pub fn count(&self, text: &str) -> usize {
        self.pieces(text).len()
    }

    fn next_marker(&self, text: &str) -> Option<(usize, &'static str)> {
        self.markers
            .iter()
            .filter_map(|m| text.find(m).map(|at| (at, *m)))
            .min_by_key(|(at, _)| *at)
    }
}

impl Default for WhitespaceTokenizer {
    fn default() -> Self {
        Self::new()
    }
}

/// A chat template paired with a tokenizer that understands its markers.
#[derive(Debug, Clone)]
pub struct TemplateTokenizer {
    template: ChatTemplate,
    tokenizer: WhitespaceTokenizer,
}

impl TemplateTokenizer {
    pub fn new(template: ChatTemplate) -> Self {
        Self {
            template,
            tokenizer: WhitespaceTokenizer::for_template(template),
        }
    }

    pub fn template(&self) -> ChatTemplate {
        self.template
    }

    pub fn pieces<'a>(&self, text: &'a str) -> Vec<&'a str> {
        self.tokenizer.pieces(text)
    }
}

impl ChatTokenizer for TemplateTokenizer {
    fn render(&self, messages: &[Message]) -> mlx_api_engine::Result<String> {
        Ok(self.template.render(messages, true)?)
    }

    fn count_tokens(&self, text: &str) -> mlx_api_engine::Result<usize> {
        Ok(self.tokenizer.count(text))
    }
}
