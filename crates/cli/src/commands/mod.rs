//! Command handlers for the Mitra CLI.

pub mod ask;
pub mod config;
pub mod ingest;
pub mod stats;

pub use ask::{AskCommand, ListenCommand};
pub use config::ConfigCommand;
pub use ingest::IngestCommand;
pub use stats::StatsCommand;
