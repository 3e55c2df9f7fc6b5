//! Mitra Core Library
//!
//! Foundational utilities shared by the Mitra crates:
//! - Error handling (`AppError`, `AppResult`)
//! - Logging infrastructure
//! - Validated, immutable settings

pub mod config;
pub mod error;
pub mod logging;

// Re-export commonly used types
pub use config::{Settings, SimilarityMetric};
pub use error::{AppError, AppResult};
