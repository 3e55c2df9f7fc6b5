//! Configuration management for the Mitra assistant.
//!
//! Settings are merged once at process start from:
//! - Built-in defaults
//! - The YAML config file (`.mitra/config.yaml` or `MITRA_CONFIG`)
//! - Environment variables
//! - Command-line flags
//!
//! and then validated with [`Settings::validate`]. After that the structure is
//! treated as immutable for the lifetime of the process.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{AppError, AppResult};

const KNOWN_EMBEDDING_PROVIDERS: [&str; 2] = ["hashing", "ollama"];
const KNOWN_LLM_PROVIDERS: [&str; 2] = ["ollama", "openai"];

/// Similarity metric used by the vector index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityMetric {
    /// Cosine similarity, range [-1, 1].
    #[default]
    Cosine,
    /// Raw dot product.
    DotProduct,
    /// `1 / (1 + euclidean distance)`, range (0, 1].
    Euclidean,
}

impl SimilarityMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cosine => "cosine",
            Self::DotProduct => "dot_product",
            Self::Euclidean => "euclidean",
        }
    }
}

impl fmt::Display for SimilarityMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SimilarityMetric {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cosine" => Ok(Self::Cosine),
            "dot_product" | "dot" => Ok(Self::DotProduct),
            "euclidean" | "l2" => Ok(Self::Euclidean),
            other => Err(AppError::InvalidConfiguration(format!(
                "Unknown similarity metric: {}. Supported: cosine, dot_product, euclidean",
                other
            ))),
        }
    }
}

/// Retrieval and arbitration parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RagSettings {
    /// Minimum boosted score for a knowledge-base answer to be accepted
    pub confidence_threshold: f32,

    /// Chunk width in characters
    pub chunk_size: usize,

    /// Characters shared between consecutive chunks
    pub chunk_overlap: usize,

    /// Candidates requested from the index per query
    pub search_k: usize,

    /// Additive boost when the query appears verbatim in a chunk
    pub exact_match_bonus: f32,

    /// Rejected candidates forwarded to the fallback model as context
    pub fallback_context_k: usize,
}

impl Default for RagSettings {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.8,
            chunk_size: 1000,
            chunk_overlap: 200,
            search_k: 3,
            exact_match_bonus: 0.2,
            fallback_context_k: 3,
        }
    }
}

/// Vector index storage parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorStoreSettings {
    /// Snapshot path, relative paths resolve against the workspace
    pub path: PathBuf,

    pub similarity_metric: SimilarityMetric,

    /// Unit-normalize embeddings before indexing and search
    pub normalize_embeddings: bool,

    /// Allow restoring the index from an on-disk snapshot.
    /// Snapshots are only as trustworthy as whoever wrote them, so this
    /// stays off unless an operator turns it on.
    pub allow_dangerous_deserialization: bool,
}

impl Default for VectorStoreSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from(".mitra/index.sqlite"),
            similarity_metric: SimilarityMetric::Cosine,
            normalize_embeddings: true,
            allow_dangerous_deserialization: false,
        }
    }
}

/// Embedding model parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    /// Provider name: "hashing" (offline, deterministic) or "ollama"
    pub provider: String,

    pub model: String,

    pub dimensions: usize,

    /// Provider base URL (Ollama only)
    pub endpoint: Option<String>,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: "hashing".to_string(),
            model: "hashing-v1".to_string(),
            dimensions: 384,
            endpoint: None,
        }
    }
}

/// Generative fallback model parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    /// Provider name: "ollama" or "openai"
    pub provider: String,

    pub model_name: String,

    pub temperature: f32,

    pub max_tokens: u32,

    /// Provider base URL override
    pub endpoint: Option<String>,

    /// Environment variable holding the API key (OpenAI-compatible providers)
    pub api_key_env: String,

    /// Handlebars template overriding the built-in fallback prompt.
    /// Receives `query` and `context` (a list of passages).
    pub prompt_template: Option<String>,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            model_name: "llama3.2".to_string(),
            temperature: 0.7,
            max_tokens: 512,
            endpoint: None,
            api_key_env: "OPENAI_API_KEY".to_string(),
            prompt_template: None,
        }
    }
}

/// Spoken-input parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioSettings {
    /// Speech-to-text model identifier (e.g., "base", "small")
    pub model_size: String,

    /// Minimum transcription confidence. Independent of the RAG threshold.
    pub confidence_threshold: f32,

    /// Accepted format tags (file extensions, lowercase, no dot)
    pub supported_formats: Vec<String>,

    pub max_duration_seconds: f64,

    pub sample_rate: u32,

    /// OpenAI-compatible transcription endpoint base URL
    pub endpoint: Option<String>,

    /// Spoken language hint (ISO-639-1, e.g. "en", "hi"). Unset lets the
    /// model detect it.
    pub language: Option<String>,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            model_size: "base".to_string(),
            confidence_threshold: 0.7,
            supported_formats: ["wav", "mp3", "m4a", "ogg", "flac", "webm"]
                .iter()
                .map(|f| f.to_string())
                .collect(),
            max_duration_seconds: 60.0,
            sample_rate: 16_000,
            endpoint: None,
            language: None,
        }
    }
}

/// Upper bounds for every suspension point in the query pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutSettings {
    pub embedding_secs: u64,
    pub search_secs: u64,
    pub generation_secs: u64,
    pub transcription_secs: u64,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            embedding_secs: 30,
            search_secs: 10,
            generation_secs: 60,
            transcription_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: Option<String>,
    pub color: Option<bool>,

    /// Emit one JSON object per event instead of human-readable lines
    pub json: bool,
}

/// Optional keyword guard. An empty list disables it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DomainSettings {
    pub keywords: Vec<String>,
}

/// Full configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct SettingsFile {
    workspace: Option<PathBuf>,
    rag: RagSettings,
    vector_store: VectorStoreSettings,
    embedding: EmbeddingSettings,
    llm: LlmSettings,
    audio: AudioSettings,
    timeouts: TimeoutSettings,
    logging: LoggingSettings,
    domain: DomainSettings,
}

/// Main application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Workspace root (contains .mitra/)
    pub workspace: PathBuf,

    /// Config file the settings were read from, if any
    pub config_file: Option<PathBuf>,

    pub rag: RagSettings,
    pub vector_store: VectorStoreSettings,
    pub embedding: EmbeddingSettings,
    pub llm: LlmSettings,
    pub audio: AudioSettings,
    pub timeouts: TimeoutSettings,
    pub logging: LoggingSettings,
    pub domain: DomainSettings,

    /// Verbose mode (enables debug logging)
    #[serde(skip)]
    pub verbose: bool,

    /// Disable colored output
    #[serde(skip)]
    pub no_color: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            workspace: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            config_file: None,
            rag: RagSettings::default(),
            vector_store: VectorStoreSettings::default(),
            embedding: EmbeddingSettings::default(),
            llm: LlmSettings::default(),
            audio: AudioSettings::default(),
            timeouts: TimeoutSettings::default(),
            logging: LoggingSettings::default(),
            domain: DomainSettings::default(),
            verbose: false,
            no_color: false,
        }
    }
}

impl Settings {
    /// Load settings from defaults, the YAML file and environment variables.
    ///
    /// Environment variables:
    /// - `MITRA_WORKSPACE`: Override workspace path
    /// - `MITRA_CONFIG`: Path to config file
    /// - `MITRA_LLM_MODEL`: Fallback model name
    /// - `RUST_LOG`: Log level
    /// - `NO_COLOR`: Disable colored output
    ///
    /// The result is not validated yet; call [`Settings::validate`] after
    /// applying CLI overrides.
    pub fn load(workspace: Option<PathBuf>, config_file: Option<PathBuf>) -> AppResult<Self> {
        let mut settings = Self::default();

        if let Some(workspace) = workspace.or_else(|| std::env::var("MITRA_WORKSPACE").ok().map(PathBuf::from)) {
            settings.workspace = workspace;
        }

        settings.config_file =
            config_file.or_else(|| std::env::var("MITRA_CONFIG").ok().map(PathBuf::from));

        if !settings.workspace.exists() {
            return Err(AppError::InvalidConfiguration(format!(
                "Workspace directory does not exist: {:?}",
                settings.workspace
            )));
        }

        let config_path = settings
            .config_file
            .clone()
            .unwrap_or_else(|| settings.mitra_dir().join("config.yaml"));

        if config_path.exists() {
            settings = settings.merge_yaml(&config_path)?;
        } else if settings.config_file.is_some() {
            return Err(AppError::InvalidConfiguration(format!(
                "Config file not found: {:?}",
                config_path
            )));
        }

        if let Ok(model) = std::env::var("MITRA_LLM_MODEL") {
            settings.llm.model_name = model;
        }

        if let Ok(level) = std::env::var("RUST_LOG") {
            settings.logging.level = Some(level);
        }

        if std::env::var("NO_COLOR").is_ok() {
            settings.no_color = true;
        }

        Ok(settings)
    }

    /// Parse settings from a YAML document on top of the defaults.
    pub fn from_yaml_str(contents: &str) -> AppResult<Self> {
        Self::default().apply_file(serde_yaml::from_str(contents).map_err(|e| {
            AppError::InvalidConfiguration(format!("Failed to parse config: {}", e))
        })?)
    }

    /// Merge a YAML configuration file into these settings.
    fn merge_yaml(&self, path: &Path) -> AppResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AppError::InvalidConfiguration(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        let file: SettingsFile = serde_yaml::from_str(&contents).map_err(|e| {
            AppError::InvalidConfiguration(format!("Failed to parse config file {:?}: {}", path, e))
        })?;

        tracing::debug!("Loaded settings from {:?}", path);

        let mut merged = self.clone().apply_file(file)?;
        merged.config_file = Some(path.to_path_buf());
        Ok(merged)
    }

    fn apply_file(mut self, file: SettingsFile) -> AppResult<Self> {
        if let Some(workspace) = file.workspace {
            self.workspace = workspace;
        }
        self.rag = file.rag;
        self.vector_store = file.vector_store;
        self.embedding = file.embedding;
        self.llm = file.llm;
        self.audio = file.audio;
        self.timeouts = file.timeouts;
        self.domain = file.domain;

        if let Some(color) = file.logging.color {
            self.no_color = !color;
        }
        self.logging = file.logging;

        Ok(self)
    }

    /// Apply CLI overrides. CLI flags take precedence over environment
    /// variables and the config file.
    pub fn with_overrides(
        mut self,
        log_level: Option<String>,
        verbose: bool,
        no_color: bool,
        allow_dangerous_deserialization: bool,
    ) -> Self {
        if let Some(log_level) = log_level {
            self.logging.level = Some(log_level);
        }

        if verbose {
            self.verbose = true;
            if self.logging.level.is_none() {
                self.logging.level = Some("debug".to_string());
            }
        }

        if no_color {
            self.no_color = true;
        }

        // The flag can only opt in, never silently opt out of a file setting.
        if allow_dangerous_deserialization {
            self.vector_store.allow_dangerous_deserialization = true;
        }

        self
    }

    /// Validate every value the core consumes. Runs once, before any query.
    pub fn validate(&self) -> AppResult<()> {
        let rag = &self.rag;

        if rag.chunk_size == 0 {
            return Err(invalid("rag.chunk_size must be greater than 0"));
        }
        if rag.chunk_overlap >= rag.chunk_size {
            return Err(invalid(format!(
                "rag.chunk_overlap ({}) must be smaller than rag.chunk_size ({})",
                rag.chunk_overlap, rag.chunk_size
            )));
        }
        check_unit_range("rag.confidence_threshold", rag.confidence_threshold)?;
        if rag.search_k == 0 {
            return Err(invalid("rag.search_k must be greater than 0"));
        }
        if !rag.exact_match_bonus.is_finite() || rag.exact_match_bonus < 0.0 {
            return Err(invalid(format!(
                "rag.exact_match_bonus must be a non-negative number, got {}",
                rag.exact_match_bonus
            )));
        }

        if !KNOWN_EMBEDDING_PROVIDERS.contains(&self.embedding.provider.as_str()) {
            return Err(invalid(format!(
                "Unknown embedding provider: {}. Supported: {}",
                self.embedding.provider,
                KNOWN_EMBEDDING_PROVIDERS.join(", ")
            )));
        }
        if self.embedding.dimensions == 0 {
            return Err(invalid("embedding.dimensions must be greater than 0"));
        }

        if !KNOWN_LLM_PROVIDERS.contains(&self.llm.provider.as_str()) {
            return Err(invalid(format!(
                "Unknown LLM provider: {}. Supported: {}",
                self.llm.provider,
                KNOWN_LLM_PROVIDERS.join(", ")
            )));
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(invalid(format!(
                "llm.temperature must be within [0, 2], got {}",
                self.llm.temperature
            )));
        }
        if self.llm.max_tokens == 0 {
            return Err(invalid("llm.max_tokens must be greater than 0"));
        }

        let audio = &self.audio;
        check_unit_range("audio.confidence_threshold", audio.confidence_threshold)?;
        if audio.supported_formats.is_empty() {
            return Err(invalid("audio.supported_formats must not be empty"));
        }
        if !(audio.max_duration_seconds > 0.0) {
            return Err(invalid("audio.max_duration_seconds must be positive"));
        }
        if audio.sample_rate == 0 {
            return Err(invalid("audio.sample_rate must be greater than 0"));
        }
        if audio.language.as_deref().is_some_and(|l| l.trim().is_empty()) {
            return Err(invalid("audio.language must not be empty when set"));
        }

        let t = &self.timeouts;
        if t.embedding_secs == 0 || t.search_secs == 0 || t.generation_secs == 0 || t.transcription_secs == 0 {
            return Err(invalid("timeouts must all be greater than 0 seconds"));
        }

        Ok(())
    }

    /// Get the path to the .mitra directory.
    pub fn mitra_dir(&self) -> PathBuf {
        self.workspace.join(".mitra")
    }

    /// Ensure the .mitra directory exists.
    pub fn ensure_mitra_dir(&self) -> AppResult<()> {
        let dir = self.mitra_dir();
        if !dir.exists() {
            std::fs::create_dir_all(&dir)?;
        }
        Ok(())
    }

    /// Resolved path of the index snapshot.
    pub fn index_path(&self) -> PathBuf {
        if self.vector_store.path.is_absolute() {
            self.vector_store.path.clone()
        } else {
            self.workspace.join(&self.vector_store.path)
        }
    }

    /// Resolve the fallback model API key from the configured env variable.
    pub fn resolve_api_key(&self) -> Option<String> {
        std::env::var(&self.llm.api_key_env).ok()
    }
}

fn invalid(message: impl Into<String>) -> AppError {
    AppError::InvalidConfiguration(message.into())
}

fn check_unit_range(name: &str, value: f32) -> AppResult<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(invalid(format!("{} must be within [0, 1], got {}", name, value)))
    }
}
