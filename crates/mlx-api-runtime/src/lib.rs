//! # mlx-api-runtime
//!
//! Model runtimes that plug into the mlx-api server through
//! [`mlx_api_engine::ModelRuntime`].
//!
//! Only the in-process [`MockRuntime`] lives here. It serves the demo binary
//! and doubles as the test backend for every suite in the workspace.

pub mod mock;

pub use mock::{MockProbe, MockRuntime};
