//! In-process mock runtime.
//!
//! Echoes the last user turn back (or a fixed reply), honours the clamped
//! `max_tokens`, and records how it was driven so tests can assert on call
//! counts, parameters and overlap.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use mlx_api_engine::{
    ChatTokenizer, LoadedModel, Model, ModelRuntime, Result, RuntimeError, SamplingParams,
};
use mlx_api_tokenizer::{ChatTemplate, TemplateTokenizer};
use parking_lot::Mutex;

/// Observations shared between a [`MockRuntime`] and the models it loads.
#[derive(Debug, Default)]
pub struct MockProbe {
    load_calls: AtomicUsize,
    generate_calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    last_params: Mutex<Option<SamplingParams>>,
    last_prompt: Mutex<Option<String>>,
}

impl MockProbe {
    pub fn load_calls(&self) -> usize {
        self.load_calls.load(Ordering::SeqCst)
    }

    /// Number of times `generate` was entered.
    pub fn generate_calls(&self) -> usize {
        self.generate_calls.load(Ordering::SeqCst)
    }

    /// Highest number of `generate` calls that overlapped in time.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    pub fn last_params(&self) -> Option<SamplingParams> {
        *self.last_params.lock()
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.last_prompt.lock().clone()
    }
}

#[derive(Debug, Clone, Default)]
struct Behavior {
    template: Option<ChatTemplate>,
    reply: Option<String>,
    load_delay: Duration,
    generate_delay: Duration,
    load_error: Option<String>,
    generate_error: Option<String>,
    panic_on_generate: bool,
}

/// Configurable mock backend.
#[derive(Debug, Clone, Default)]
pub struct MockRuntime {
    behavior: Behavior,
    probe: Arc<MockProbe>,
}

impl MockRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Always answer with `reply` (truncated to `max_tokens` pieces).
    pub fn with_reply(mut self, reply: impl Into<String>) -> Self {
        self.behavior.reply = Some(reply.into());
        self
    }

    /// Force a chat template instead of picking one from the model id.
    pub fn with_template(mut self, template: ChatTemplate) -> Self {
        self.behavior.template = Some(template);
        self
    }

    pub fn with_load_delay(mut self, delay: Duration) -> Self {
        self.behavior.load_delay = delay;
        self
    }

    /// Sleep inside every `generate` call, simulating decode time.
    pub fn with_generate_delay(mut self, delay: Duration) -> Self {
        self.behavior.generate_delay = delay;
        self
    }

    pub fn with_load_error(mut self, msg: impl Into<String>) -> Self {
        self.behavior.load_error = Some(msg.into());
        self
    }

    pub fn with_generate_error(mut self, msg: impl Into<String>) -> Self {
        self.behavior.generate_error = Some(msg.into());
        self
    }

    /// Panic inside `generate`, as a crashing native binding would.
    pub fn with_generate_panic(mut self) -> Self {
        self.behavior.panic_on_generate = true;
        self
    }

    /// Handle for inspecting calls after the runtime has been moved away.
    pub fn probe(&self) -> Arc<MockProbe> {
        Arc::clone(&self.probe)
    }
}

impl ModelRuntime for MockRuntime {
    fn load(&self, model_id: &str) -> Result<LoadedModel> {
        self.probe.load_calls.fetch_add(1, Ordering::SeqCst);
        if !self.behavior.load_delay.is_zero() {
            std::thread::sleep(self.behavior.load_delay);
        }
        if let Some(msg) = &self.behavior.load_error {
            return Err(RuntimeError::ModelLoad(msg.clone()));
        }
        if model_id.trim().is_empty() {
            return Err(RuntimeError::ModelLoad("empty model id".to_string()));
        }

        let template = self
            .behavior
            .template
            .unwrap_or_else(|| ChatTemplate::for_model(model_id));
        tracing::debug!(model_id, ?template, "mock model loaded");

        let tokenizer = TemplateTokenizer::new(template);
        let model = MockModel {
            tokenizer: tokenizer.clone(),
            behavior: self.behavior.clone(),
            probe: Arc::clone(&self.probe),
        };
        Ok(LoadedModel::new(Box::new(model), Box::new(tokenizer)))
    }
}

struct MockModel {
    tokenizer: TemplateTokenizer,
    behavior: Behavior,
    probe: Arc<MockProbe>,
}

/// Decrements the in-flight gauge even if generation panics.
struct InFlight<'a>(&'a MockProbe);

impl<'a> InFlight<'a> {
    fn enter(probe: &'a MockProbe) -> Self {
        let now = probe.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        probe.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        Self(probe)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Model for MockModel {
    fn generate(
        &self,
        _tokenizer: &dyn ChatTokenizer,
        prompt: &str,
        params: &SamplingParams,
    ) -> Result<String> {
        self.probe.generate_calls.fetch_add(1, Ordering::SeqCst);
        *self.probe.last_params.lock() = Some(*params);
        *self.probe.last_prompt.lock() = Some(prompt.to_string());
        let _in_flight = InFlight::enter(&self.probe);

        if !self.behavior.generate_delay.is_zero() {
            std::thread::sleep(self.behavior.generate_delay);
        }
        if self.behavior.panic_on_generate {
            panic!("mock runtime crashed during generation");
        }
        if let Some(msg) = &self.behavior.generate_error {
            return Err(RuntimeError::Generation(msg.clone()));
        }

        let source = match &self.behavior.reply {
            Some(reply) => reply.as_str(),
            None => last_user_turn(prompt, self.tokenizer.template()).unwrap_or_default(),
        };
        let pieces = self.tokenizer.pieces(source);
        Ok(pieces
            .into_iter()
            .take(params.max_tokens)
            .collect::<Vec<_>>()
            .join(" "))
    }
}

/// Content of the final user turn of a rendered prompt.
fn last_user_turn(prompt: &str, template: ChatTemplate) -> Option<&str> {
    match template {
        ChatTemplate::Llama3 => {
            let header = "<|start_header_id|>user<|end_header_id|>\n\n";
            let start = prompt.rfind(header)? + header.len();
            let end = prompt[start..].find("<|eot_id|>")? + start;
            Some(&prompt[start..end])
        }
        ChatTemplate::Plain => prompt
            .lines()
            .rev()
            .find_map(|line| line.strip_prefix("user: ")),
    }
}
