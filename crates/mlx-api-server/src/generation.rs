//! The generate path: readiness gate, validation, token budgets, serialized
//! generation, accounting.

use std::sync::Arc;
use std::time::{Duration, Instant};

use mlx_api_engine::{LoadedModel, RuntimeError, SamplingParams};
use uuid::Uuid;

use crate::config::Settings;
use crate::error::{panic_message, summarize, RequestError};
use crate::gate::GenerationGate;
use crate::models::GenerateBody;
use crate::state::ServerState;
use crate::validation::{self, ValidationError};

/// Outcome of a successful generate call.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationResult {
    pub response_text: String,
    /// Tokenizer-measured length of `response_text`.
    pub tokens_generated: usize,
    /// Wall-clock time of the model call alone.
    pub generation_time_ms: u64,
    /// Model identifier in effect when the request was served.
    pub model_id: String,
}

/// Server-side output ceiling always wins; a smaller client value is kept.
pub fn effective_max_tokens(requested: usize, max_output_tokens: usize) -> usize {
    requested.min(max_output_tokens)
}

/// Runs `/generate` requests against the loaded model.
pub struct RequestHandler {
    state: Arc<ServerState>,
    settings: Arc<Settings>,
    gate: GenerationGate,
}

struct Generated {
    text: String,
    elapsed: Duration,
}

impl RequestHandler {
    pub fn new(state: Arc<ServerState>, settings: Arc<Settings>) -> Self {
        let gate = GenerationGate::new(settings.concurrency_policy);
        Self {
            state,
            settings,
            gate,
        }
    }

    pub fn gate(&self) -> &GenerationGate {
        &self.gate
    }

    /// Fail with `ServiceUnavailable` unless a model is loaded.
    pub fn ensure_ready(&self) -> Result<(), RequestError> {
        if self.state.is_loaded() {
            Ok(())
        } else {
            Err(RequestError::ServiceUnavailable)
        }
    }

    /// Reject a body that could not be decoded, after the readiness gate.
    pub fn reject_malformed(&self, reason: String) -> RequestError {
        match self.ensure_ready() {
            Err(err) => err,
            Ok(()) => {
                tracing::warn!(%reason, "rejected malformed generate request");
                ValidationError::MalformedBody(reason).into()
            }
        }
    }

    pub async fn handle(&self, raw: GenerateBody) -> Result<GenerationResult, RequestError> {
        let request_id = Uuid::new_v4();

        let Some((loaded, model_id)) = self.state.loaded_model() else {
            tracing::warn!(%request_id, "generate request while model not loaded");
            return Err(RequestError::ServiceUnavailable);
        };

        let request = validation::validate(raw, &self.settings).map_err(|err| {
            tracing::warn!(%request_id, error = %err, "rejected invalid generate request");
            RequestError::from(err)
        })?;

        let prompt = loaded.tokenizer.render(&request.messages).map_err(|err| match err {
            RuntimeError::RejectedInput(reason) => {
                tracing::warn!(%request_id, %reason, "template rejected message content");
                RequestError::from(ValidationError::UnsupportedContent(reason))
            }
            err => {
                tracing::error!(%request_id, error = %err, "prompt rendering failed");
                RequestError::InternalGeneration(summarize(&err))
            }
        })?;

        let input_tokens = loaded.tokenizer.count_tokens(&prompt).map_err(|err| {
            tracing::error!(%request_id, error = %err, "prompt token counting failed");
            RequestError::InternalGeneration(summarize(&err))
        })?;

        if input_tokens > self.settings.max_input_tokens {
            tracing::warn!(
                %request_id,
                input_tokens,
                max_input_tokens = self.settings.max_input_tokens,
                requested_max_tokens = request.max_tokens,
                "input too long"
            );
            return Err(RequestError::InputTooLong {
                input_tokens,
                max_input_tokens: self.settings.max_input_tokens,
            });
        }

        let params = SamplingParams {
            max_tokens: effective_max_tokens(request.max_tokens, self.settings.max_output_tokens),
            temperature: request.temperature,
            top_p: request.top_p,
        };
        tracing::info!(
            %request_id,
            input_tokens,
            requested_max_tokens = request.max_tokens,
            max_tokens = params.max_tokens,
            "Generating response"
        );

        let generated = self
            .run_generation(Arc::clone(&loaded), prompt, params)
            .await
            .map_err(|err| {
                match &err {
                    RequestError::InternalGeneration(_) => tracing::error!(
                        %request_id,
                        input_tokens,
                        requested_max_tokens = request.max_tokens,
                        error = %err,
                        "generation failed"
                    ),
                    _ => tracing::warn!(
                        %request_id,
                        input_tokens,
                        requested_max_tokens = request.max_tokens,
                        error = %err,
                        "generation not completed"
                    ),
                }
                err
            })?;

        let tokens_generated = match loaded.tokenizer.count_tokens(&generated.text) {
            Ok(n) => n,
            Err(err) => {
                // the model did run; it still counts as a served request
                self.state.record_generation(0);
                tracing::error!(%request_id, error = %err, "output token counting failed");
                return Err(RequestError::InternalGeneration(summarize(&err)));
            }
        };
        self.state.record_generation(tokens_generated as u64);

        let generation_time_ms = u64::try_from(generated.elapsed.as_millis()).unwrap_or(u64::MAX);
        tracing::info!(
            %request_id,
            tokens_generated,
            generation_time_ms,
            "Generated {} tokens in {}ms",
            tokens_generated,
            generation_time_ms
        );

        Ok(GenerationResult {
            response_text: generated.text,
            tokens_generated,
            generation_time_ms,
            model_id,
        })
    }

    /// Acquire the generation slot and run the model on the blocking pool,
    /// all within the request timeout.
    async fn run_generation(
        &self,
        loaded: Arc<LoadedModel>,
        prompt: String,
        params: SamplingParams,
    ) -> Result<Generated, RequestError> {
        let timeout = self.settings.request_timeout;
        let work = async {
            let permit = self.gate.acquire().await?;
            let task = tokio::task::spawn_blocking(move || {
                // held until the native call returns, even if the request timed out
                let _permit = permit;
                let started = Instant::now();
                let text = loaded.generate(&prompt, &params);
                (text, started.elapsed())
            });
            match task.await {
                Ok((Ok(text), elapsed)) => Ok(Generated { text, elapsed }),
                Ok((Err(err), _)) => Err(RequestError::InternalGeneration(summarize(&err))),
                Err(join) if join.is_panic() => {
                    let payload = join.into_panic();
                    Err(RequestError::InternalGeneration(format!(
                        "runtime panicked: {}",
                        summarize(panic_message(payload.as_ref()))
                    )))
                }
                Err(join) => Err(RequestError::InternalGeneration(summarize(&join))),
            }
        };

        match tokio::time::timeout(timeout, work).await {
            Ok(result) => result,
            Err(_) => Err(RequestError::Timeout { timeout }),
        }
    }
}
