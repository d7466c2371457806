//! HTTP request handlers for API endpoints.

pub mod generate;
pub mod health;
pub mod stats;

pub use generate::handle_generate;
pub use health::handle_health;
pub use stats::handle_stats;
