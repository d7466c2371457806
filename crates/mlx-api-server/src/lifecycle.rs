//! Model load at startup and release at shutdown.

use std::sync::Arc;
use std::time::Instant;

use mlx_api_engine::{ModelRuntime, RuntimeError};

use crate::config::Settings;
use crate::state::ServerState;

/// Startup failure; the server must not accept traffic after one.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("model loading failed for '{model_id}': {source}")]
    Runtime {
        model_id: String,
        #[source]
        source: RuntimeError,
    },

    #[error("model loading task for '{model_id}' aborted: {reason}")]
    Aborted { model_id: String, reason: String },
}

/// Owns the transition between unloaded and ready.
pub struct LifecycleManager {
    runtime: Arc<dyn ModelRuntime>,
    state: Arc<ServerState>,
}

impl LifecycleManager {
    pub fn new(runtime: Arc<dyn ModelRuntime>, state: Arc<ServerState>) -> Self {
        Self { runtime, state }
    }

    /// Load the configured model and publish it. Not retried on failure.
    pub async fn start(&self, settings: &Settings) -> Result<(), LoadError> {
        let model_id = settings.model_id.clone();
        tracing::info!("Loading model: {}", model_id);

        let runtime = Arc::clone(&self.runtime);
        let id = model_id.clone();
        let load = tokio::task::spawn_blocking(move || {
            let started = Instant::now();
            runtime.load(&id).map(|loaded| (loaded, started.elapsed()))
        })
        .await;

        let (loaded, load_duration) = match load {
            Ok(Ok(loaded)) => loaded,
            Ok(Err(source)) => {
                self.state.mark_failed();
                tracing::error!(%model_id, error = %source, "Failed to load model");
                return Err(LoadError::Runtime { model_id, source });
            }
            Err(join) => {
                self.state.mark_failed();
                tracing::error!(%model_id, error = %join, "Model loading task aborted");
                return Err(LoadError::Aborted {
                    model_id,
                    reason: join.to_string(),
                });
            }
        };

        self.state.publish_loaded(loaded, &model_id, load_duration);
        tracing::info!("Model loaded in {:.2}s", load_duration.as_secs_f64());
        Ok(())
    }

    /// Release the model. Safe to call repeatedly or before any load.
    pub fn stop(&self) {
        if self.state.clear() {
            tracing::info!("Model released");
        }
    }
}
