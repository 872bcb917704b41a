use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use collectiq_agent::DialogueEngine;
use collectiq_core::config::Config;
use collectiq_core::error::{CollectIqError, Result};
use collectiq_core::ports::{
    CallControl, OutreachStore, PayerDirectory, SpeechSynthesizer, Transcriber,
    TranscriptionHandle,
};
use collectiq_core::store::JsonFileStore;
use collectiq_media::stt::DeepgramTranscriber;
use collectiq_media::tts_stream::ElevenLabsSynthesizer;

use crate::carrier::TwilioCallControl;

/// Per-call timing knobs.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub silence_debounce: Duration,
    pub greeting_wait: Duration,
    pub idle_reprompt: Duration,
    pub max_idle_reprompts: u32,
    pub frame_bytes: usize,
    pub frame_pause: Duration,
    /// Fixed calendar date for date inference; today's local date when unset.
    pub today: Option<NaiveDate>,
}

impl SessionSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            silence_debounce: config.silence_debounce(),
            greeting_wait: config.greeting_wait(),
            idle_reprompt: config.idle_reprompt(),
            max_idle_reprompts: config.max_idle_reprompts(),
            frame_bytes: config.tts_frame_bytes(),
            frame_pause: config.tts_frame_pause(),
            today: None,
        }
    }

    pub fn today(&self) -> NaiveDate {
        self.today
            .unwrap_or_else(|| chrono::Local::now().date_naive())
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Collaborators shared by every call.
#[derive(Clone)]
pub struct CallServices {
    pub engine: Arc<DialogueEngine>,
    pub payers: Arc<dyn PayerDirectory>,
    pub store: Arc<dyn OutreachStore>,
    pub tts: Arc<dyn SpeechSynthesizer>,
    pub transcriber: Arc<dyn Transcriber>,
    pub call_control: Option<Arc<dyn CallControl>>,
    pub transfer_number: Option<String>,
    pub settings: SessionSettings,
}

impl CallServices {
    /// Wire up the production collaborators described by `config`.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let engine = DialogueEngine::new(config.agent_name(), config.follow_up_horizon_days())
            .context("building intent rules")?;

        let tts: Arc<dyn SpeechSynthesizer> = match config
            .tts
            .as_ref()
            .map(ElevenLabsSynthesizer::from_config)
        {
            Some(Ok(tts)) => Arc::new(tts),
            Some(Err(e)) => {
                warn!(error = %e, "TTS unavailable; responses will not be spoken");
                Arc::new(Unconfigured)
            }
            None => {
                warn!("No tts section configured; responses will not be spoken");
                Arc::new(Unconfigured)
            }
        };

        let transcriber: Arc<dyn Transcriber> = match config
            .transcription
            .as_ref()
            .map(DeepgramTranscriber::from_config)
        {
            Some(Ok(stt)) => Arc::new(stt),
            Some(Err(e)) => {
                warn!(error = %e, "Transcription unavailable; caller speech will not be heard");
                Arc::new(Unconfigured)
            }
            None => {
                warn!("No transcription section configured; caller speech will not be heard");
                Arc::new(Unconfigured)
            }
        };

        let carrier = config.carrier.clone().unwrap_or_default();
        let call_control: Option<Arc<dyn CallControl>> =
            match TwilioCallControl::from_config(&carrier) {
                Ok(control) => Some(Arc::new(control)),
                Err(e) => {
                    warn!(error = %e, "Call control unavailable; transfers will be logged only");
                    None
                }
            };
        let transfer_number = carrier.resolve_transfer_number();
        if transfer_number.is_none() {
            warn!("No transfer number configured");
        }

        let storage: PathBuf = config.storage_dir();
        info!(dir = %storage.display(), "Using file store");
        let store = Arc::new(JsonFileStore::new(storage));

        Ok(Self {
            engine: Arc::new(engine),
            payers: store.clone(),
            store,
            tts,
            transcriber,
            call_control,
            transfer_number,
            settings: SessionSettings::from_config(config),
        })
    }
}

/// Stand-in for a speech provider with no credentials. Calls still run:
/// synthesis fails per response and transcription streams end at once.
struct Unconfigured;

#[async_trait]
impl SpeechSynthesizer for Unconfigured {
    async fn synthesize(&self, _text: &str, _chunk_tx: mpsc::UnboundedSender<Vec<u8>>) -> Result<()> {
        Err(CollectIqError::Speech("TTS not configured".into()))
    }
}

impl Transcriber for Unconfigured {
    fn open(&self) -> TranscriptionHandle {
        let (audio_tx, _audio_rx) = mpsc::unbounded_channel();
        let (_events_tx, events_rx) = mpsc::unbounded_channel();
        TranscriptionHandle::new(audio_tx, events_rx, CancellationToken::new())
    }
}

/// Shared gateway state.
pub struct GatewayState {
    pub config: Config,
    pub services: CallServices,
    active_calls: AtomicUsize,
    total_calls: AtomicU64,
    #[cfg(feature = "metrics")]
    pub metrics_handle: Option<metrics_exporter_prometheus::PrometheusHandle>,
}

impl GatewayState {
    pub fn new(config: Config, services: CallServices) -> Self {
        Self {
            config,
            services,
            active_calls: AtomicUsize::new(0),
            total_calls: AtomicU64::new(0),
            #[cfg(feature = "metrics")]
            metrics_handle: None,
        }
    }

    pub fn active_calls(&self) -> usize {
        self.active_calls.load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> u64 {
        self.total_calls.load(Ordering::SeqCst)
    }

    /// Count a call as live until the returned guard drops.
    pub fn call_started(self: &Arc<Self>) -> ActiveCall {
        self.active_calls.fetch_add(1, Ordering::SeqCst);
        self.total_calls.fetch_add(1, Ordering::SeqCst);
        #[cfg(feature = "metrics")]
        crate::metrics::record_call_start();
        ActiveCall {
            state: Arc::clone(self),
        }
    }
}

pub struct ActiveCall {
    state: Arc<GatewayState>,
}

impl Drop for ActiveCall {
    fn drop(&mut self) {
        self.state.active_calls.fetch_sub(1, Ordering::SeqCst);
        #[cfg(feature = "metrics")]
        crate::metrics::record_call_end();
    }
}
