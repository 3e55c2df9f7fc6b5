//! OpenAI-compatible speech-to-text client.
//!
//! Works with any server exposing `/v1/audio/transcriptions` with
//! `response_format=verbose_json` (OpenAI, faster-whisper-server,
//! whisper.cpp server). Confidence is the mean over segments of
//! `exp(avg_logprob)`, clamped to [0, 1].

use crate::audio::{AudioInput, Transcriber};
use crate::types::AudioConfidenceResult;
use mitra_core::{AppError, AppResult, Settings};
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tracing::{debug, instrument};

pub const DEFAULT_WHISPER_URL: &str = "http://localhost:8000";
const TRANSCRIPTION_ENDPOINT: &str = "/v1/audio/transcriptions";

#[derive(Debug, Deserialize)]
struct VerboseTranscription {
    text: String,
    #[serde(default)]
    duration: Option<f64>,
    #[serde(default)]
    segments: Vec<Segment>,
}

#[derive(Debug, Deserialize)]
struct Segment {
    avg_logprob: f64,
}

/// Whisper transcription client.
pub struct WhisperClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    language: Option<String>,
    api_key: Option<String>,
}

impl WhisperClient {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            language: None,
            api_key: None,
        }
    }

    /// Restrict decoding to one language (ISO-639-1, e.g. "en", "hi").
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Client for the configured endpoint. `audio.model_size` names the model
    /// and `audio.language`, when set, fixes the spoken language.
    pub fn from_settings(settings: &Settings) -> Self {
        let base_url = settings
            .audio
            .endpoint
            .clone()
            .unwrap_or_else(|| DEFAULT_WHISPER_URL.to_string());

        let mut client = Self::new(base_url, settings.audio.model_size.clone());
        if let Some(language) = &settings.audio.language {
            client = client.with_language(language.trim());
        }
        if let Some(key) = settings.resolve_api_key() {
            client = client.with_api_key(key);
        }
        client
    }
}

#[async_trait::async_trait]
impl Transcriber for WhisperClient {
    #[instrument(skip(self, audio), fields(file = %audio.file_name, bytes = audio.bytes.len(), model = %self.model))]
    async fn transcribe(&self, audio: &AudioInput) -> AppResult<AudioConfidenceResult> {
        let url = format!("{}{}", self.base_url, TRANSCRIPTION_ENDPOINT);

        let part = Part::bytes(audio.bytes.clone())
            .file_name(audio.file_name.clone())
            .mime_str(mime_type(&audio.format))
            .map_err(|e| AppError::Transcription(format!("Invalid audio part: {}", e)))?;

        let mut form = Form::new()
            .part("file", part)
            .text("model", self.model.clone())
            .text("response_format", "verbose_json");
        if let Some(language) = &self.language {
            form = form.text("language", language.clone());
        }

        debug!("Sending transcription request to {}", url);

        let mut request = self.client.post(&url).multipart(form);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            AppError::Transcription(format!("Failed to send request to {}: {}", url, e))
        })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::Transcription(format!(
                "Transcription API error ({}): {}",
                status, error_text
            )));
        }

        let body: VerboseTranscription = response.json().await.map_err(|e| {
            AppError::Transcription(format!("Failed to parse transcription response: {}", e))
        })?;

        Ok(to_result(body, &audio.format))
    }
}

fn to_result(body: VerboseTranscription, format: &str) -> AudioConfidenceResult {
    AudioConfidenceResult {
        confidence: segment_confidence(&body.segments),
        duration_seconds: body.duration.unwrap_or(0.0),
        transcript: body.text.trim().to_string(),
        format: format.to_string(),
    }
}

fn segment_confidence(segments: &[Segment]) -> f32 {
    if segments.is_empty() {
        return 0.0;
    }
    let sum: f64 = segments.iter().map(|s| s.avg_logprob.exp()).sum();
    ((sum / segments.len() as f64) as f32).clamp(0.0, 1.0)
}

fn mime_type(format: &str) -> &'static str {
    match format {
        "wav" => "audio/wav",
        "mp3" => "audio/mpeg",
        "m4a" => "audio/mp4",
        "ogg" => "audio/ogg",
        "flac" => "audio/flac",
        "webm" => "audio/webm",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbose_json_parsing() {
        let json = r#"{
            "task": "transcribe",
            "language": "english",
            "duration": 4.2,
            "text": " How do I update my address? ",
            "segments": [
                {"id": 0, "avg_logprob": -0.1, "text": "How do I"},
                {"id": 1, "avg_logprob": -0.3, "text": "update my address?"}
            ]
        }"#;
        let body: VerboseTranscription = serde_json::from_str(json).unwrap();
        let result = to_result(body, "wav");

        assert_eq!(result.transcript, "How do I update my address?");
        assert_eq!(result.duration_seconds, 4.2);
        let expected = (((-0.1f64).exp() + (-0.3f64).exp()) / 2.0) as f32;
        assert!((result.confidence - expected).abs() < 1e-6);
    }

    #[test]
    fn test_no_segments_is_zero_confidence() {
        let body: VerboseTranscription = serde_json::from_str(r#"{"text": ""}"#).unwrap();
        let result = to_result(body, "mp3");
        assert_eq!(result.confidence, 0.0);
        assert_eq!(result.duration_seconds, 0.0);
    }

    #[test]
    fn test_confidence_clamped() {
        let segments = vec![Segment { avg_logprob: 0.5 }];
        assert_eq!(segment_confidence(&segments), 1.0);
    }

    /// Serve one HTTP request on a local port, reply with `body`, and hand
    /// back the raw request text.
    async fn serve_once(body: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];

            loop {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);

                let text = String::from_utf8_lossy(&request).to_string();
                if let Some(header_end) = text.find("\r\n\r\n") {
                    let content_length = text[..header_end]
                        .lines()
                        .find_map(|l| {
                            let (name, value) = l.split_once(':')?;
                            name.eq_ignore_ascii_case("content-length")
                                .then(|| value.trim().parse::<usize>().ok())
                                .flatten()
                        });
                    let received = request.len() - (header_end + 4);
                    let complete = match content_length {
                        Some(len) => received >= len,
                        None => text.ends_with("--\r\n"),
                    };
                    if complete {
                        break;
                    }
                }
            }

            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();

            String::from_utf8_lossy(&request).to_string()
        });

        (base_url, handle)
    }

    #[tokio::test]
    async fn test_configured_language_is_sent_with_upload() {
        let (base_url, server) = serve_once(
            r#"{"text": "Aadhaar kaise banaye?", "duration": 2.0, "segments": [{"avg_logprob": -0.05}]}"#,
        )
        .await;

        let mut settings = Settings::default();
        settings.audio.endpoint = Some(base_url);
        settings.audio.language = Some("hi".to_string());
        settings.llm.api_key_env = "MITRA_TEST_UNSET_KEY".to_string();

        let client = WhisperClient::from_settings(&settings);
        let audio = AudioInput::new(vec![1u8; 32], "question.wav");
        let result = client.transcribe(&audio).await.unwrap();

        assert_eq!(result.transcript, "Aadhaar kaise banaye?");
        assert_eq!(result.format, "wav");

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /v1/audio/transcriptions"));
        assert!(request.contains("name=\"language\"\r\n\r\nhi\r\n"));
        assert!(request.contains("name=\"model\"\r\n\r\nbase\r\n"));
        assert!(request.contains("name=\"response_format\"\r\n\r\nverbose_json\r\n"));
    }

    #[tokio::test]
    async fn test_language_is_omitted_when_unset() {
        let (base_url, server) = serve_once(r#"{"text": "hello"}"#).await;

        let client = WhisperClient::new(base_url, "base");
        let audio = AudioInput::new(vec![1u8; 8], "question.mp3");
        client.transcribe(&audio).await.unwrap();

        let request = server.await.unwrap();
        assert!(!request.contains("name=\"language\""));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_transcription_error() {
        let client = WhisperClient::new("http://127.0.0.1:9/", "base");
        let audio = AudioInput::new(vec![0u8; 16], "q.wav");
        let result = client.transcribe(&audio).await;
        assert!(matches!(result, Err(AppError::Transcription(_))));
    }
}
