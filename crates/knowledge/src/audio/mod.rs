//! Spoken input: transcription and the confidence gate.
//!
//! A transcript only reaches retrieval after passing three checks, in this
//! order: supported format, duration, transcription confidence.

pub mod whisper;

pub use whisper::WhisperClient;

use crate::rag::normalize_query;
use crate::types::AudioConfidenceResult;
use mitra_core::{AppError, AppResult};
use std::path::Path;

/// Raw audio handed to a [`Transcriber`].
#[derive(Debug, Clone)]
pub struct AudioInput {
    pub bytes: Vec<u8>,

    /// File name sent with the upload
    pub file_name: String,

    /// Lowercase format tag without a dot, e.g. "wav"
    pub format: String,
}

impl AudioInput {
    pub fn new(bytes: Vec<u8>, file_name: impl Into<String>) -> Self {
        let file_name = file_name.into();
        let format = format_of(Path::new(&file_name));
        Self {
            bytes,
            file_name,
            format,
        }
    }

    /// Read an audio file; the format comes from its extension.
    pub fn from_path(path: &Path) -> AppResult<Self> {
        let bytes = std::fs::read(path)?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "audio".to_string());
        Ok(Self::new(bytes, file_name))
    }
}

fn format_of(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default()
}

/// Speech-to-text capability.
#[async_trait::async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, audio: &AudioInput) -> AppResult<AudioConfidenceResult>;
}

/// Fail with `UnsupportedFormat` unless `format` is in `supported`.
///
/// Comparison ignores case and a leading dot.
pub fn check_format(format: &str, supported: &[String]) -> AppResult<()> {
    let wanted = format.trim().trim_start_matches('.').to_ascii_lowercase();
    let ok = !wanted.is_empty()
        && supported
            .iter()
            .any(|s| s.trim().trim_start_matches('.').eq_ignore_ascii_case(&wanted));

    if ok {
        Ok(())
    } else {
        Err(AppError::UnsupportedFormat {
            format: format.to_string(),
            supported: supported.join(", "),
        })
    }
}

/// Gate a transcription result before it is used as a query.
///
/// Returns the whitespace-normalized transcript. Both limits are inclusive:
/// a duration equal to the maximum and a confidence equal to the threshold
/// pass.
pub fn gate(
    result: &AudioConfidenceResult,
    supported_formats: &[String],
    max_duration_seconds: f64,
    confidence_threshold: f32,
) -> AppResult<String> {
    check_format(&result.format, supported_formats)?;

    if result.duration_seconds > max_duration_seconds {
        return Err(AppError::DurationExceeded {
            duration_seconds: result.duration_seconds,
            max_seconds: max_duration_seconds,
        });
    }

    if result.confidence < confidence_threshold {
        tracing::info!(
            "Rejecting transcript with confidence {:.3} (threshold {:.3})",
            result.confidence,
            confidence_threshold
        );
        return Err(AppError::LowTranscriptionConfidence {
            confidence: result.confidence,
            threshold: confidence_threshold,
        });
    }

    Ok(normalize_query(&result.transcript))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn formats() -> Vec<String> {
        ["wav", "mp3", "m4a", "ogg", "flac", "webm"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    fn result(format: &str, duration: f64, confidence: f32) -> AudioConfidenceResult {
        AudioConfidenceResult {
            transcript: "  how do I   update my address ".to_string(),
            confidence,
            duration_seconds: duration,
            format: format.to_string(),
        }
    }

    #[test]
    fn test_passing_result_returns_normalized_transcript() {
        let transcript = gate(&result("wav", 12.0, 0.9), &formats(), 60.0, 0.7).unwrap();
        assert_eq!(transcript, "how do I update my address");
    }

    #[test]
    fn test_boundaries_are_inclusive() {
        assert!(gate(&result("wav", 60.0, 0.7), &formats(), 60.0, 0.7).is_ok());
    }

    #[test]
    fn test_duration_one_second_over() {
        let err = gate(&result("wav", 61.0, 0.99), &formats(), 60.0, 0.7).unwrap_err();
        assert!(matches!(err, AppError::DurationExceeded { .. }));
    }

    #[test]
    fn test_low_confidence_rejected() {
        let err = gate(&result("mp3", 5.0, 0.65), &formats(), 60.0, 0.7).unwrap_err();
        assert!(matches!(
            err,
            AppError::LowTranscriptionConfidence { confidence, .. } if (confidence - 0.65).abs() < 1e-6
        ));
        assert!(err.is_user_actionable());
    }

    #[test]
    fn test_format_checked_first() {
        // Over-long, low-confidence audio in an unsupported format reports the format.
        let err = gate(&result("aiff", 600.0, 0.1), &formats(), 60.0, 0.7).unwrap_err();
        assert!(matches!(err, AppError::UnsupportedFormat { .. }));
    }

    #[test]
    fn test_format_case_and_dot_insensitive() {
        assert!(check_format(".WAV", &formats()).is_ok());
        assert!(check_format("Flac", &formats()).is_ok());
        assert!(check_format("", &formats()).is_err());
    }

    #[test]
    fn test_audio_input_format_from_name() {
        let input = AudioInput::new(vec![1, 2, 3], "question.M4A");
        assert_eq!(input.format, "m4a");
        assert_eq!(AudioInput::new(vec![], "noext").format, "");
    }
}
