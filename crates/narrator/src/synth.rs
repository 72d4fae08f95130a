use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;

/// Synthesized speech ready for playback.
#[derive(Debug, Clone)]
pub struct TtsAudio {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

/// Text-to-speech synthesis backend.
#[async_trait]
pub trait TtsBackend: Send + Sync {
    async fn synthesize(&self, text: &str) -> Result<TtsAudio>;
    fn voice(&self) -> &str;
}

/// OpenAI-compatible `audio/speech` endpoint client.
pub struct HttpTtsBackend {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    voice: String,
}

impl HttpTtsBackend {
    pub fn new(api_key: String) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(45))
            .build()
            .context("failed to build HTTP client for TTS")?;

        let base_url = std::env::var("TTS_API_BASE_URL")
            .unwrap_or_else(|_| "https://api.groq.com".to_string());
        let model = std::env::var("TTS_MODEL").unwrap_or_else(|_| "playai-tts".to_string());
        let voice = std::env::var("TTS_VOICE").unwrap_or_else(|_| "Fritz-PlayAI".to_string());

        Ok(Self {
            http,
            base_url,
            api_key,
            model,
            voice,
        })
    }

    pub fn with_voice(mut self, voice: String) -> Self {
        self.voice = voice;
        self
    }
}

#[async_trait]
impl TtsBackend for HttpTtsBackend {
    async fn synthesize(&self, text: &str) -> Result<TtsAudio> {
        if text.trim().is_empty() {
            return Err(anyhow!("TTS input text was empty"));
        }

        let body = json!({
            "model": self.model,
            "voice": self.voice,
            "input": text,
            "response_format": "wav"
        });

        let url = format!(
            "{}/openai/v1/audio/speech",
            self.base_url.trim_end_matches('/')
        );

        let response = self
            .http
            .post(url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .context("TTS request failed")?
            .error_for_status()
            .context("TTS endpoint returned an error status")?;

        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|raw| raw.to_str().ok())
            .map(|s| s.to_owned())
            .unwrap_or_default();

        let bytes = response
            .bytes()
            .await
            .context("failed to read TTS payload body")?;

        if bytes.is_empty() {
            return Err(anyhow!("TTS response was empty"));
        }

        // Some providers report errors as a 200 with a JSON body.
        if content_type.contains("application/json") || bytes.starts_with(b"{") {
            let payload: serde_json::Value =
                serde_json::from_slice(&bytes).context("failed to parse TTS error response")?;
            let message = payload["error"]["message"]
                .as_str()
                .unwrap_or("unknown TTS error");
            return Err(anyhow!("TTS error: {}", message));
        }

        Ok(TtsAudio {
            bytes: bytes.to_vec(),
            content_type,
        })
    }

    fn voice(&self) -> &str {
        &self.voice
    }
}
