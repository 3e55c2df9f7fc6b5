//! Error types for the Mitra assistant.
//!
//! A single error enum covers every failure the query pipeline can surface.
//! Each variant carries a stable machine-readable reason code (see
//! [`AppError::reason_code`]) that is independent of the human-facing
//! `Display` text, so callers can tell "no relevant knowledge" apart from
//! "the system failed".

use thiserror::Error;

/// Unified error type for the Mitra crates.
///
/// All fallible functions return `Result<T, AppError>`.
#[derive(Error, Debug)]
pub enum AppError {
    /// Bad configuration values. Fatal at startup.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The query (or a chunk) could not be embedded.
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// An embedding of the wrong dimension reached the index.
    #[error("Embedding dimension mismatch: index expects {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// The fallback language model failed.
    #[error("Generation error: {0}")]
    Generation(String),

    /// Audio arrived in a format the gate does not accept.
    #[error("Unsupported audio format '{format}' (supported: {supported})")]
    UnsupportedFormat { format: String, supported: String },

    /// Audio is longer than the configured maximum.
    #[error("Audio duration {duration_seconds:.1}s exceeds the maximum of {max_seconds:.1}s")]
    DurationExceeded {
        duration_seconds: f64,
        max_seconds: f64,
    },

    /// The transcript is not trustworthy enough to search with.
    #[error("Transcription confidence {confidence:.2} is below the threshold of {threshold:.2}")]
    LowTranscriptionConfidence { confidence: f32, threshold: f32 },

    /// The speech-to-text collaborator failed.
    #[error("Transcription error: {0}")]
    Transcription(String),

    /// The vector index is unreachable or corrupt.
    #[error("Vector index unavailable: {0}")]
    IndexUnavailable(String),

    /// The query is outside the assistant's domain.
    #[error("Query is outside the supported domain: {0}")]
    OutOfDomain(String),

    /// An externally bounded operation did not finish in time.
    #[error("Operation '{operation}' timed out after {seconds}s")]
    Timeout { operation: String, seconds: u64 },

    /// I/O and filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl AppError {
    /// Stable, machine-readable code for this error.
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::InvalidConfiguration(_) => "invalid_configuration",
            Self::Embedding(_) => "embedding_error",
            Self::DimensionMismatch { .. } => "dimension_mismatch",
            Self::Generation(_) => "generation_error",
            Self::UnsupportedFormat { .. } => "unsupported_format",
            Self::DurationExceeded { .. } => "duration_exceeded",
            Self::LowTranscriptionConfidence { .. } => "low_transcription_confidence",
            Self::Transcription(_) => "transcription_error",
            Self::IndexUnavailable(_) => "index_unavailable",
            Self::OutOfDomain(_) => "out_of_domain",
            Self::Timeout { .. } => "timeout",
            Self::Io(_) => "io_error",
            Self::Serialization(_) => "serialization_error",
        }
    }

    /// Whether the user can fix this by changing their input
    /// (re-recording audio, rephrasing the question).
    pub fn is_user_actionable(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedFormat { .. }
                | Self::DurationExceeded { .. }
                | Self::LowTranscriptionConfidence { .. }
                | Self::OutOfDomain(_)
        )
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_codes_are_distinct_from_messages() {
        let err = AppError::LowTranscriptionConfidence {
            confidence: 0.65,
            threshold: 0.7,
        };
        assert_eq!(err.reason_code(), "low_transcription_confidence");
        assert!(err.to_string().contains("0.65"));
        assert!(err.is_user_actionable());
    }

    #[test]
    fn test_index_unavailable_is_not_user_actionable() {
        let err = AppError::IndexUnavailable("lock poisoned".to_string());
        assert_eq!(err.reason_code(), "index_unavailable");
        assert!(!err.is_user_actionable());
    }

    #[test]
    fn test_serde_errors_convert() {
        let err: AppError = serde_json::from_str::<u32>("not json").unwrap_err().into();
        assert_eq!(err.reason_code(), "serialization_error");
    }
}
