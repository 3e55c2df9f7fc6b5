//! Stats command handler.

use crate::to_json;
use clap::Args;
use mitra_core::{AppResult, Settings};
use mitra_knowledge::load_index;
use mitra_knowledge::VectorIndex;

/// Show knowledge base statistics
#[derive(Args, Debug)]
pub struct StatsCommand {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl StatsCommand {
    pub async fn execute(&self, settings: &Settings) -> AppResult<()> {
        tracing::info!("Executing stats command");

        let stats = load_index(settings)?.stats();

        if self.json {
            println!("{}", to_json(&stats)?);
        } else {
            println!("Knowledge base: {}", settings.index_path().display());
            println!("  Documents: {}", stats.documents);
            println!("  Chunks: {}", stats.chunks);
            println!("  Dimension: {}", stats.dimension);
            println!("  Metric: {}", stats.metric);
        }

        Ok(())
    }
}
