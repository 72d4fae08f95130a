//! Speech-to-text adapter: one WAV clip in, one transcript out, over an
//! OpenAI-compatible `audio/transcriptions` endpoint. Retry policy belongs
//! to the caller; this client makes exactly one attempt per clip.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::multipart;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use session_core::ports::{AudioClip, TranscriberPort};

const DEFAULT_BASE_URL: &str = "https://api.groq.com";
const DEFAULT_MODEL: &str = "whisper-large-v3";
const RESPONSE_FORMAT: &str = "json";
const LANGUAGE: &str = "en";

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

/// Whisper-style transcription client.
pub struct WhisperTranscriber {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl WhisperTranscriber {
    pub fn new(api_key: String) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .context("failed to build HTTP client for transcription")?;

        let base_url = std::env::var("TRANSCRIBE_API_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let model =
            std::env::var("TRANSCRIBE_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());

        Ok(Self {
            http,
            base_url,
            api_key,
            model,
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/openai/v1/audio/transcriptions",
            self.base_url.trim_end_matches('/')
        )
    }

    fn build_form(&self, clip: AudioClip) -> Result<multipart::Form> {
        let audio_part = multipart::Part::bytes(clip.wav_bytes)
            .file_name("answer.wav")
            .mime_str("audio/wav")
            .context("failed to build audio multipart part")?;

        Ok(multipart::Form::new()
            .text("model", self.model.clone())
            .text("response_format", RESPONSE_FORMAT)
            .text("language", LANGUAGE)
            .part("file", audio_part))
    }
}

#[async_trait]
impl TranscriberPort for WhisperTranscriber {
    async fn transcribe(&self, clip: AudioClip) -> Result<String> {
        let duration_ms = clip.duration_ms;
        let form = self.build_form(clip)?;

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .context("failed to send transcription request")?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "transcription endpoint returned status {}",
                response.status()
            ));
        }

        let parsed: TranscriptionResponse = response
            .json()
            .await
            .context("failed to parse transcription response")?;

        debug!(duration_ms, chars = parsed.text.len(), "clip transcribed");
        Ok(parsed.text)
    }
}
