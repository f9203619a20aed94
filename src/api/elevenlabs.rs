use super::ensure_success;
use crate::audio::AudioSynthesizer;
use crate::error::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing::info;

const ELEVEN_LABS_API: &str = "https://api.elevenlabs.io/v1";
const DEFAULT_VOICE_ID: &str = "JBFqnCBsd6RMkjVDRZzb";
const SPEECH_MODEL: &str = "eleven_multilingual_v2";
const SPEECH_FORMAT: &str = "mp3_44100_128";
const SOUND_PROMPT_INFLUENCE: f32 = 0.5;

#[derive(Debug, Clone)]
pub struct ElevenLabsClient {
    api_key: String,
    voice_id: String,
    client: Client,
}

impl ElevenLabsClient {
    pub fn new(api_key: String, client: Client) -> Self {
        Self {
            api_key,
            voice_id: DEFAULT_VOICE_ID.to_string(),
            client,
        }
    }

    pub fn with_voice(mut self, voice_id: impl Into<String>) -> Self {
        self.voice_id = voice_id.into();
        self
    }

    fn speech_url(&self) -> String {
        format!(
            "{}/text-to-speech/{}?output_format={}",
            ELEVEN_LABS_API, self.voice_id, SPEECH_FORMAT
        )
    }

    async fn post_audio(&self, url: String, body: serde_json::Value, dest: &Path, what: &str) -> Result<PathBuf> {
        let response = self
            .client
            .post(url)
            .header("xi-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;
        let response = ensure_success(response, what).await?;

        let audio_data = response.bytes().await?;
        tokio::fs::write(dest, audio_data).await?;
        info!("{} saved to: {}", what, dest.display());
        Ok(dest.to_path_buf())
    }
}

#[async_trait]
impl AudioSynthesizer for ElevenLabsClient {
    async fn synthesize_speech(&self, text: &str, dest: &Path) -> Result<PathBuf> {
        let url = self.speech_url();
        let body = json!({
            "text": text,
            "model_id": SPEECH_MODEL,
        });
        self.post_audio(url, body, dest, "Speech").await
    }

    async fn synthesize_sound_effect(
        &self,
        text: &str,
        duration_secs: u32,
        dest: &Path,
    ) -> Result<PathBuf> {
        let body = json!({
            "text": text,
            "duration_seconds": duration_secs,
            "prompt_influence": SOUND_PROMPT_INFLUENCE,
        });
        self.post_audio(format!("{}/sound-generation", ELEVEN_LABS_API), body, dest, "Sound effect")
            .await
    }
}
