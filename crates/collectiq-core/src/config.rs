//! Configuration loading and validation.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level CollectIQ voice configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway: Option<GatewayConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub carrier: Option<CarrierConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tts: Option<TtsConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcription: Option<TranscriptionConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub dialogue: Option<DialogueConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub turn: Option<TurnConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage: Option<StorageConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind: Option<String>,

    /// Public host name the carrier reaches us on (used in TwiML stream URLs).
    /// Falls back to the request's `Host` header.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_host: Option<String>,
}

fn default_port() -> u16 {
    4004
}

/// Telephony carrier (Twilio) credentials and call-control settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CarrierConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_sid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_sid_env: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_token_env: Option<String>,

    /// Number live calls are redirected to on transfer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transfer_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transfer_number_env: Option<String>,

    /// REST API base (default: "https://api.twilio.com").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
}

impl CarrierConfig {
    pub fn resolve_account_sid(&self) -> Option<String> {
        resolve_secret_field(&self.account_sid, &self.account_sid_env)
    }

    pub fn resolve_auth_token(&self) -> Option<String> {
        resolve_secret_field(&self.auth_token, &self.auth_token_env)
    }

    pub fn resolve_transfer_number(&self) -> Option<String> {
        resolve_secret_field(&self.transfer_number, &self.transfer_number_env)
    }

    pub fn api_base(&self) -> &str {
        self.api_base.as_deref().unwrap_or("https://api.twilio.com")
    }
}

/// Text-to-speech (TTS) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtsConfig {
    /// TTS provider (default: "elevenlabs").
    #[serde(default = "default_tts_provider")]
    pub provider: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,

    /// Default voice ID.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_voice: Option<String>,

    /// Default model ID (e.g. "eleven_turbo_v2").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,

    /// Output format (default: "ulaw_8000", what the carrier plays back).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_format: Option<String>,

    /// Bytes per outbound media frame (default: 160, 20ms of 8kHz mu-law).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_bytes: Option<usize>,

    /// Pause between outbound frames in milliseconds (default: 20).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_pause_ms: Option<u64>,
}

fn default_tts_provider() -> String {
    "elevenlabs".into()
}

impl TtsConfig {
    pub fn resolve_api_key(&self) -> Option<String> {
        resolve_secret_field(&self.api_key, &self.api_key_env)
    }
}

/// Live speech-to-text configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionConfig {
    /// Provider (default: "deepgram").
    #[serde(default = "default_transcription_provider")]
    pub provider: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,

    /// Inbound audio encoding (default: "mulaw").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_rate: Option<u32>,

    /// Provider-side silence before an utterance-end signal (default: 1000).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub utterance_end_ms: Option<u64>,
}

fn default_transcription_provider() -> String {
    "deepgram".into()
}

impl TranscriptionConfig {
    pub fn resolve_api_key(&self) -> Option<String> {
        resolve_secret_field(&self.api_key, &self.api_key_env)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DialogueConfig {
    /// Name the agent introduces itself with.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_name: Option<String>,

    /// Furthest a follow-up may be scheduled, in days (default: 30).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub follow_up_horizon_days: Option<u32>,
}

/// Turn-taking timers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TurnConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub silence_debounce_ms: Option<u64>,

    /// How long the greeting waits for the payer lookup (default: 1500).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub greeting_wait_ms: Option<u64>,

    /// Caller silence before a re-prompt (default: 12).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idle_reprompt_secs: Option<u64>,

    /// Consecutive re-prompts before the call is ended (default: 2).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_idle_reprompts: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding payers and call records (default: `~/.collectiq/data`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log format: "plain" (default) or "json".
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Log level override (trace/debug/info/warn/error).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,

    /// Per-crate log level overrides (e.g. "collectiq_gateway=debug").
    #[serde(default)]
    pub filters: Vec<String>,

    /// Output target: "stderr" (default) or "stdout".
    #[serde(default = "default_log_output")]
    pub output: String,
}

fn default_log_format() -> String {
    "plain".into()
}

fn default_log_output() -> String {
    "stderr".into()
}

/// Resolve a secret: check the direct value first, then the env-var reference.
pub fn resolve_secret_field(direct: &Option<String>, env_var: &Option<String>) -> Option<String> {
    if let Some(val) = direct {
        if !val.is_empty() {
            return Some(val.clone());
        }
    }
    if let Some(env) = env_var {
        if let Ok(val) = std::env::var(env) {
            if !val.is_empty() {
                return Some(val);
            }
        }
    }
    None
}

/// Substitute `${ENV_VAR}` patterns in a string with their environment variable values.
fn substitute_env_vars(input: &str) -> crate::error::Result<String> {
    let re = regex::Regex::new(r"\$\{([^}]+)\}")
        .map_err(|e| crate::error::CollectIqError::Config(e.to_string()))?;
    Ok(re
        .replace_all(input, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_default()
        })
        .into_owned())
}

impl Config {
    /// Load config from a JSON5 file, substituting `${ENV_VAR}` references.
    pub fn load(path: &Path) -> crate::error::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path).map_err(crate::error::CollectIqError::Io)?;

        // Substitute ${ENV_VAR} references before parsing
        let substituted = substitute_env_vars(&raw)?;

        let config: Config = json5::from_str(&substituted)
            .map_err(|e| crate::error::CollectIqError::Config(e.to_string()))?;

        Ok(config)
    }

    /// Default config file path.
    pub fn config_path() -> PathBuf {
        data_dir().join("config.json")
    }

    /// Resolve the storage directory.
    pub fn storage_dir(&self) -> PathBuf {
        self.storage
            .as_ref()
            .and_then(|s| s.dir.as_ref())
            .map(|d| {
                let expanded = shellexpand::tilde(d);
                PathBuf::from(expanded.as_ref())
            })
            .unwrap_or_else(|| data_dir().join("data"))
    }

    /// Gateway port.
    pub fn gateway_port(&self) -> u16 {
        self.gateway.as_ref().map(|g| g.port).unwrap_or(4004)
    }

    pub fn bind_addr(&self) -> String {
        self.gateway
            .as_ref()
            .and_then(|g| g.bind.clone())
            .unwrap_or_else(|| "0.0.0.0".to_string())
    }

    pub fn public_host(&self) -> Option<&str> {
        self.gateway.as_ref().and_then(|g| g.public_host.as_deref())
    }

    pub fn agent_name(&self) -> String {
        self.dialogue
            .as_ref()
            .and_then(|d| d.agent_name.clone())
            .unwrap_or_else(|| "CollectIQ".to_string())
    }

    pub fn follow_up_horizon_days(&self) -> u32 {
        self.dialogue
            .as_ref()
            .and_then(|d| d.follow_up_horizon_days)
            .unwrap_or(30)
    }

    pub fn silence_debounce(&self) -> Duration {
        Duration::from_millis(
            self.turn
                .as_ref()
                .and_then(|t| t.silence_debounce_ms)
                .unwrap_or(800),
        )
    }

    pub fn greeting_wait(&self) -> Duration {
        Duration::from_millis(
            self.turn
                .as_ref()
                .and_then(|t| t.greeting_wait_ms)
                .unwrap_or(1500),
        )
    }

    pub fn idle_reprompt(&self) -> Duration {
        Duration::from_secs(
            self.turn
                .as_ref()
                .and_then(|t| t.idle_reprompt_secs)
                .unwrap_or(12),
        )
    }

    pub fn max_idle_reprompts(&self) -> u32 {
        self.turn
            .as_ref()
            .and_then(|t| t.max_idle_reprompts)
            .unwrap_or(2)
    }

    pub fn tts_frame_bytes(&self) -> usize {
        self.tts.as_ref().and_then(|t| t.frame_bytes).unwrap_or(160)
    }

    pub fn tts_frame_pause(&self) -> Duration {
        Duration::from_millis(self.tts.as_ref().and_then(|t| t.frame_pause_ms).unwrap_or(20))
    }

    /// Get a config value by dotted path (e.g. "gateway.port", "turn.silence_debounce_ms").
    pub fn get_path(&self, path: &str) -> Option<serde_json::Value> {
        let json = serde_json::to_value(self).ok()?;
        let mut current = &json;
        for segment in path.split('.') {
            current = current.get(segment)?;
        }
        Some(current.clone())
    }

    /// Validate config, returning (warnings, errors).
    pub fn validate(&self) -> (Vec<String>, Vec<String>) {
        let mut warnings = Vec::new();
        let mut errors = Vec::new();

        match &self.carrier {
            Some(carrier) => {
                if carrier.resolve_account_sid().is_none() || carrier.resolve_auth_token().is_none() {
                    warnings.push("Carrier account sid or auth token not configured".to_string());
                }
                if carrier.resolve_transfer_number().is_none() {
                    warnings.push("Carrier transfer number not configured; transfers will fail".to_string());
                }
            }
            None => warnings.push("No carrier configured; transfers will fail".to_string()),
        }

        if self.tts.as_ref().and_then(|t| t.resolve_api_key()).is_none() {
            warnings.push("TTS has no API key configured; the agent will be silent".to_string());
        }

        if self
            .transcription
            .as_ref()
            .and_then(|t| t.resolve_api_key())
            .is_none()
        {
            warnings.push("Transcription has no API key configured".to_string());
        }

        if let Some(gw) = &self.gateway {
            if gw.port == 0 {
                errors.push("Gateway port cannot be 0".to_string());
            }
        }

        if self.tts_frame_bytes() == 0 {
            errors.push("tts.frame_bytes cannot be 0".to_string());
        }

        (warnings, errors)
    }
}

/// Base directory for CollectIQ data: `~/.collectiq/`
pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".collectiq")
}
