//! # mlx-api-server
//!
//! HTTP front end for a single locally loaded chat model.
//!
//! The server loads one model at startup, then answers `POST /generate`,
//! `GET /health` and `GET /stats`. Generation is serialized through a
//! one-slot [`GenerationGate`] because the native runtime is single-consumer;
//! monitoring endpoints read [`ServerState`] and never wait on a generation.
//!
//! ## Request path
//!
//! readiness gate → validation → prompt rendering → input budget →
//! output clamp → generation (blocking pool, under the gate and the request
//! timeout) → accounting.

pub mod config;
pub mod error;
pub mod gate;
pub mod generation;
pub mod handlers;
pub mod lifecycle;
pub mod models;
pub mod reporting;
pub mod server;
pub mod state;
pub mod validation;

pub use config::{ConcurrencyPolicy, ConfigError, Settings};
pub use error::RequestError;
pub use gate::GenerationGate;
pub use generation::{GenerationResult, RequestHandler};
pub use lifecycle::{LifecycleManager, LoadError};
pub use reporting::{HealthReporter, StatsReporter};
pub use server::{create_router, run_server, shutdown_signal};
pub use state::{AppState, LifecyclePhase, ServerState, StateSnapshot};
pub use validation::{GenerationRequest, ValidationError};
