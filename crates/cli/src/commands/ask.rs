//! Ask and listen command handlers.

use crate::to_json;
use clap::Args;
use mitra_core::{AppError, AppResult, Settings};
use mitra_knowledge::{AnswerSource, Assistant, AudioInput, ChatResponse};
use std::path::PathBuf;

/// Ask a question in text
#[derive(Args, Debug)]
pub struct AskCommand {
    /// The question to ask
    #[arg(required = true, num_args = 1..)]
    pub query: Vec<String>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl AskCommand {
    pub async fn execute(&self, settings: Settings) -> AppResult<()> {
        tracing::info!("Executing ask command");

        let query = self.query.join(" ");
        if query.trim().is_empty() {
            return Err(AppError::Embedding("Query is empty".to_string()));
        }

        let assistant = Assistant::from_settings(settings)?;
        let response = assistant.answer_text(&query).await?;

        print_response(&response, self.json)
    }
}

/// Ask a question from an audio recording
#[derive(Args, Debug)]
pub struct ListenCommand {
    /// Audio file (wav, mp3, m4a, ogg, flac, webm)
    pub file: PathBuf,

    /// Spoken language (ISO-639-1, e.g. "en", "hi"); overrides audio.language
    #[arg(short, long)]
    pub language: Option<String>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl ListenCommand {
    pub async fn execute(&self, mut settings: Settings) -> AppResult<()> {
        tracing::info!("Executing listen command for {:?}", self.file);

        if let Some(language) = &self.language {
            settings.audio.language = Some(language.clone());
        }

        let audio = AudioInput::from_path(&self.file)?;
        let assistant = Assistant::from_settings(settings)?;
        let response = assistant.answer_audio(&audio).await?;

        if !self.json {
            println!("You asked: {}", response.query);
            println!();
        }
        print_response(&response, self.json)
    }
}

fn print_response(response: &ChatResponse, json: bool) -> AppResult<()> {
    if json {
        println!("{}", to_json(response)?);
        return Ok(());
    }

    println!("{}", response.answer);
    println!();

    match response.source {
        AnswerSource::KnowledgeBase => {
            println!("Sources:");
            for source in &response.sources {
                println!("- {}", source);
            }
        }
        AnswerSource::GenerativeFallback => {
            println!("(generated answer; not found in the knowledge base)");
        }
    }

    tracing::debug!(
        "Answer source: {}, reason: {}, confidence: {:?}",
        response.source.as_str(),
        response.reason,
        response.confidence
    );

    Ok(())
}
