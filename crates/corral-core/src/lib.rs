//! Corral core library.
//!
//! Shared building blocks for the cloud control plane: the API error
//! taxonomy with its HTTP status mapping, runtime configuration, SQLite
//! pool helpers, and tracing initialization.

pub mod config;
pub mod db;
pub mod error;
pub mod tracing_init;

pub use config::CloudConfig;
pub use error::{ApiError, ApiResult};
