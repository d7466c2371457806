//! Chat templates.

use mlx_api_engine::{Message, Role};

use crate::{TokenizerError, TokenizerResult};

const BEGIN_OF_TEXT: &str = "<|begin_of_text|>";
const START_HEADER: &str = "<|start_header_id|>";
const END_HEADER: &str = "<|end_header_id|>";
const END_OF_TURN: &str = "<|eot_id|>";

const LLAMA3_MARKERS: &[&str] = &[BEGIN_OF_TEXT, START_HEADER, END_HEADER, END_OF_TURN];

/// Prompt layout used to flatten a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChatTemplate {
    /// Llama 3 instruct headers and end-of-turn markers.
    #[default]
    Llama3,
    /// `role: content` lines, one per message.
    Plain,
}

impl ChatTemplate {
    /// Pick the template a model family was trained with.
    pub fn for_model(model_id: &str) -> Self {
        let id = model_id.to_ascii_lowercase();
        if id.contains("llama-3") || id.contains("llama3") {
            ChatTemplate::Llama3
        } else {
            ChatTemplate::Plain
        }
    }

    /// Control markers that must be counted as single tokens.
    pub fn markers(&self) -> &'static [&'static str] {
        match self {
            ChatTemplate::Llama3 => LLAMA3_MARKERS,
            ChatTemplate::Plain => &[],
        }
    }

    /// Render `messages`. With `add_generation_prompt` the output ends with an
    /// open assistant turn for the model to complete.
    pub fn render(
        &self,
        messages: &[Message],
        add_generation_prompt: bool,
    ) -> TokenizerResult<String> {
        if messages.is_empty() {
            return Err(TokenizerError::EmptyConversation);
        }
        self.check_markers(messages)?;

        let mut prompt = String::new();
        match self {
            ChatTemplate::Llama3 => {
                prompt.push_str(BEGIN_OF_TEXT);
                for msg in messages {
                    push_llama3_header(&mut prompt, msg.role);
                    prompt.push_str(msg.content.trim());
                    prompt.push_str(END_OF_TURN);
                }
                if add_generation_prompt {
                    push_llama3_header(&mut prompt, Role::Assistant);
                }
            }
            ChatTemplate::Plain => {
                let lines: Vec<String> = messages
                    .iter()
                    .map(|m| format!("{}: {}", m.role, m.content))
                    .collect();
                prompt.push_str(&lines.join("\n"));
                if add_generation_prompt {
                    prompt.push_str("\nassistant:");
                }
            }
        }
        Ok(prompt)
    }

    fn check_markers(&self, messages: &[Message]) -> TokenizerResult<()> {
        for (index, msg) in messages.iter().enumerate() {
            if let Some(marker) = self.markers().iter().copied().find(|m| msg.content.contains(m)) {
                return Err(TokenizerError::ReservedMarker { index, marker });
            }
        }
        Ok(())
    }
}

fn push_llama3_header(prompt: &mut String, role: Role) {
    prompt.push_str(START_HEADER);
    prompt.push_str(role.as_str());
    prompt.push_str(END_HEADER);
    prompt.push_str("\n\n");
}
