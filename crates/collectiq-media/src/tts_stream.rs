//! Streaming TTS: sends audio chunks as they arrive from the provider.

use anyhow::Result;
use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::debug;

use collectiq_core::config::TtsConfig;
use collectiq_core::error::CollectIqError;
use collectiq_core::ports::SpeechSynthesizer;

const DEFAULT_VOICE: &str = "21m00Tcm4TlvDq8ikWAM";
const DEFAULT_MODEL: &str = "eleven_turbo_v2";
/// 8kHz mu-law, what the carrier media stream plays back.
const DEFAULT_OUTPUT_FORMAT: &str = "ulaw_8000";

/// ElevenLabs streaming synthesizer.
pub struct ElevenLabsSynthesizer {
    client: reqwest::Client,
    api_key: String,
    voice: String,
    model: String,
    output_format: String,
}

impl ElevenLabsSynthesizer {
    pub fn from_config(config: &TtsConfig) -> Result<Self> {
        let api_key = config
            .resolve_api_key()
            .ok_or_else(|| anyhow::anyhow!("No TTS API key configured"))?;

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            voice: config
                .default_voice
                .clone()
                .unwrap_or_else(|| DEFAULT_VOICE.to_string()),
            model: config
                .default_model
                .clone()
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            output_format: config
                .output_format
                .clone()
                .unwrap_or_else(|| DEFAULT_OUTPUT_FORMAT.to_string()),
        })
    }

    async fn stream(&self, text: &str, chunk_tx: mpsc::UnboundedSender<Vec<u8>>) -> Result<()> {
        let url = build_tts_url(&self.voice, &self.output_format);

        debug!(voice = %self.voice, model = %self.model, text_len = text.len(), "Starting TTS stream");

        let resp = self
            .client
            .post(&url)
            .header("xi-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&serde_json::json!({
                "text": text,
                "model_id": self.model,
            }))
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("TTS API error {status}: {body}");
        }

        let mut stream = resp.bytes_stream();
        let mut total = 0usize;

        while let Some(chunk_result) = stream.next().await {
            match chunk_result {
                Ok(bytes) => {
                    total += bytes.len();
                    if chunk_tx.send(bytes.to_vec()).is_err() {
                        debug!("TTS chunk receiver dropped, stopping stream");
                        break;
                    }
                }
                Err(e) => {
                    anyhow::bail!("TTS stream error: {e}");
                }
            }
        }

        debug!(bytes = total, "TTS stream finished");
        Ok(())
    }
}

#[async_trait]
impl SpeechSynthesizer for ElevenLabsSynthesizer {
    async fn synthesize(
        &self,
        text: &str,
        chunk_tx: mpsc::UnboundedSender<Vec<u8>>,
    ) -> collectiq_core::error::Result<()> {
        self.stream(text, chunk_tx)
            .await
            .map_err(|e| CollectIqError::Speech(e.to_string()))
    }
}

/// Build the ElevenLabs streaming TTS request URL for a given voice.
pub fn build_tts_url(voice: &str, output_format: &str) -> String {
    format!(
        "https://api.elevenlabs.io/v1/text-to-speech/{voice}/stream?output_format={output_format}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_construction() {
        let url = build_tts_url("Rachel", "ulaw_8000");
        assert!(url.contains("Rachel"));
        assert!(url.contains("stream"));
        assert!(url.ends_with("output_format=ulaw_8000"));
        assert!(url.starts_with("https://api.elevenlabs.io"));
    }

    #[test]
    fn test_from_config_requires_key() {
        let config = TtsConfig {
            provider: "elevenlabs".into(),
            api_key: None,
            api_key_env: Some("COLLECTIQ_TEST_TTS_KEY_UNSET".into()),
            default_voice: None,
            default_model: None,
            output_format: None,
            frame_bytes: None,
            frame_pause_ms: None,
        };
        assert!(ElevenLabsSynthesizer::from_config(&config).is_err());

        let config = TtsConfig {
            api_key: Some("sk-test".into()),
            ..config
        };
        let synth = ElevenLabsSynthesizer::from_config(&config).unwrap();
        assert_eq!(synth.output_format, "ulaw_8000");
        assert_eq!(synth.model, "eleven_turbo_v2");
    }
}
