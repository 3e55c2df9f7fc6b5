//! Mitra CLI
//!
//! Command-line front end for the Aadhaar question-answering assistant.

mod commands;

use clap::{Parser, Subcommand};
use commands::{AskCommand, ConfigCommand, IngestCommand, ListenCommand, StatsCommand};
use mitra_core::{logging, AppError, AppResult, Settings};
use std::path::PathBuf;
use std::process::ExitCode;

/// Mitra - answers Aadhaar questions from a local knowledge base
#[derive(Parser, Debug)]
#[command(name = "mitra")]
#[command(about = "Answers Aadhaar questions from a local knowledge base", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to workspace directory (default: current directory)
    #[arg(short, long, global = true, env = "MITRA_WORKSPACE")]
    workspace: Option<PathBuf>,

    /// Path to config file (default: <workspace>/.mitra/config.yaml)
    #[arg(short, long, global = true, env = "MITRA_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, env = "RUST_LOG")]
    log_level: Option<String>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    no_color: bool,

    /// Allow loading the on-disk index snapshot
    #[arg(long, global = true)]
    allow_dangerous_deserialization: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Add documents to the knowledge base
    Ingest(IngestCommand),

    /// Ask a question in text
    Ask(AskCommand),

    /// Ask a question from an audio recording
    Listen(ListenCommand),

    /// Show knowledge base statistics
    Stats(StatsCommand),

    /// Print the effective configuration
    Config(ConfigCommand),
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::Ingest(_) => "ingest",
            Commands::Ask(_) => "ask",
            Commands::Listen(_) => "listen",
            Commands::Stats(_) => "stats",
            Commands::Config(_) => "config",
        }
    }

    fn json(&self) -> bool {
        match self {
            Commands::Ingest(cmd) => cmd.json,
            Commands::Ask(cmd) => cmd.json,
            Commands::Listen(cmd) => cmd.json,
            Commands::Stats(cmd) => cmd.json,
            Commands::Config(_) => false,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let json = cli.command.json();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if json {
                let output = serde_json::json!({
                    "error": e.reason_code(),
                    "message": e.to_string(),
                });
                println!("{}", output);
            } else {
                eprintln!("Error: {}", e);
            }

            if e.is_user_actionable() {
                ExitCode::from(2)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

async fn run(cli: Cli) -> AppResult<()> {
    let settings = Settings::load(cli.workspace, cli.config)?.with_overrides(
        cli.log_level,
        cli.verbose,
        cli.no_color,
        cli.allow_dangerous_deserialization,
    );

    logging::init_logging(&settings.logging, settings.no_color)?;

    // Bad settings are fatal before any query runs.
    settings.validate()?;

    tracing::info!("Mitra starting");
    tracing::debug!("Workspace: {:?}", settings.workspace);
    tracing::debug!(
        "Embedding: {}/{}, LLM: {}/{}",
        settings.embedding.provider,
        settings.embedding.model,
        settings.llm.provider,
        settings.llm.model_name
    );

    let _span = tracing::info_span!("command", name = cli.command.name()).entered();

    let result = match cli.command {
        Commands::Ingest(cmd) => cmd.execute(&settings).await,
        Commands::Ask(cmd) => cmd.execute(settings).await,
        Commands::Listen(cmd) => cmd.execute(settings).await,
        Commands::Stats(cmd) => cmd.execute(&settings).await,
        Commands::Config(cmd) => cmd.execute(&settings),
    };

    match &result {
        Ok(_) => tracing::info!("Command completed successfully"),
        Err(e) => tracing::error!("Command failed ({}): {}", e.reason_code(), e),
    }

    result
}

/// Serialize a value for `--json` output.
pub(crate) fn to_json<T: serde::Serialize>(value: &T) -> AppResult<String> {
    serde_json::to_string_pretty(value).map_err(|e| AppError::Serialization(e.to_string()))
}
