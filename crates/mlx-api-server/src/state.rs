//! Process-wide serving state and the axum application state.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use mlx_api_engine::LoadedModel;
use parking_lot::RwLock;

use crate::config::Settings;
use crate::generation::RequestHandler;
use crate::reporting::{HealthReporter, StatsReporter};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// Validates and runs generate calls.
    pub handler: Arc<RequestHandler>,
    pub health: HealthReporter,
    pub stats: StatsReporter,
}

impl AppState {
    pub fn new(state: Arc<ServerState>, settings: Arc<Settings>) -> Self {
        Self {
            handler: Arc::new(RequestHandler::new(Arc::clone(&state), settings)),
            health: HealthReporter::new(Arc::clone(&state)),
            stats: StatsReporter::new(state),
        }
    }
}

/// Where the server is in its load lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LifecyclePhase {
    /// Nothing loaded yet, or the model was released.
    #[default]
    Uninitialized,
    Ready,
    /// The startup load failed; the process is expected to exit.
    Failed,
}

/// Model-loaded flag, load metadata and running counters.
///
/// Everything sits behind one lock that is never held across a model call,
/// so readers never wait on an in-flight generation and always see a
/// coherent snapshot.
#[derive(Debug, Default)]
pub struct ServerState {
    inner: RwLock<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    phase: LifecyclePhase,
    model: Option<Arc<LoadedModel>>,
    model_id: String,
    load_duration: Duration,
    start_time: Option<DateTime<Utc>>,
    request_count: u64,
    total_tokens_generated: u64,
}

/// Point-in-time copy of [`ServerState`].
#[derive(Debug, Clone, PartialEq)]
pub struct StateSnapshot {
    pub phase: LifecyclePhase,
    pub model_loaded: bool,
    pub model_id: String,
    pub load_duration_seconds: f64,
    pub start_time: Option<DateTime<Utc>>,
    pub request_count: u64,
    pub total_tokens_generated: u64,
}

impl StateSnapshot {
    /// Seconds since the model finished loading, or 0 if it never did.
    pub fn uptime_seconds(&self, now: DateTime<Utc>) -> f64 {
        self.start_time
            .map(|start| (now - start).num_milliseconds().max(0) as f64 / 1000.0)
            .unwrap_or(0.0)
    }
}

impl ServerState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make a freshly loaded model visible to request handlers.
    pub fn publish_loaded(
        &self,
        model: LoadedModel,
        model_id: impl Into<String>,
        load_duration: Duration,
    ) {
        let mut inner = self.inner.write();
        inner.phase = LifecyclePhase::Ready;
        inner.model = Some(Arc::new(model));
        inner.model_id = model_id.into();
        inner.load_duration = load_duration;
        inner.start_time = Some(Utc::now());
    }

    /// Drop the model handle. Returns whether one was loaded.
    ///
    /// Generations already running keep their own `Arc` and finish first.
    pub fn clear(&self) -> bool {
        let model = {
            let mut inner = self.inner.write();
            inner.phase = LifecyclePhase::Uninitialized;
            inner.model.take()
        };
        // release outside the lock; native teardown can be slow
        model.is_some()
    }

    /// Record a failed startup load. Any previously loaded model is dropped.
    pub fn mark_failed(&self) {
        let model = {
            let mut inner = self.inner.write();
            inner.phase = LifecyclePhase::Failed;
            inner.model.take()
        };
        drop(model);
    }

    pub fn is_loaded(&self) -> bool {
        self.inner.read().model.is_some()
    }

    /// The loaded model and the identifier it was loaded under.
    pub fn loaded_model(&self) -> Option<(Arc<LoadedModel>, String)> {
        let inner = self.inner.read();
        inner
            .model
            .as_ref()
            .map(|model| (Arc::clone(model), inner.model_id.clone()))
    }

    /// Account one completed generation.
    pub fn record_generation(&self, tokens_generated: u64) {
        let mut inner = self.inner.write();
        inner.request_count = inner.request_count.saturating_add(1);
        inner.total_tokens_generated = inner.total_tokens_generated.saturating_add(tokens_generated);
    }

    pub fn snapshot(&self) -> StateSnapshot {
        let inner = self.inner.read();
        StateSnapshot {
            phase: inner.phase,
            model_loaded: inner.model.is_some(),
            model_id: inner.model_id.clone(),
            load_duration_seconds: inner.load_duration.as_secs_f64(),
            start_time: inner.start_time,
            request_count: inner.request_count,
            total_tokens_generated: inner.total_tokens_generated,
        }
    }
}
