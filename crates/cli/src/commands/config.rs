//! Config command handler.

use clap::Args;
use mitra_core::{AppError, AppResult, Settings};

/// Print the effective configuration
#[derive(Args, Debug)]
pub struct ConfigCommand {}

impl ConfigCommand {
    pub fn execute(&self, settings: &Settings) -> AppResult<()> {
        let yaml =
            serde_yaml::to_string(settings).map_err(|e| AppError::Serialization(e.to_string()))?;
        print!("{}", yaml);
        Ok(())
    }
}
