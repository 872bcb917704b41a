//! Live speech-to-text over the Deepgram streaming websocket.

use anyhow::Result;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use collectiq_core::config::TranscriptionConfig;
use collectiq_core::ports::{TranscriptEvent, Transcriber, TranscriptionHandle};

const LISTEN_URL: &str = "wss://api.deepgram.com/v1/listen";

/// Connection parameters for one live stream.
#[derive(Debug, Clone)]
pub struct DeepgramTranscriber {
    api_key: String,
    model: String,
    language: String,
    encoding: String,
    sample_rate: u32,
    utterance_end_ms: u64,
}

impl DeepgramTranscriber {
    pub fn from_config(config: &TranscriptionConfig) -> Result<Self> {
        let api_key = config
            .resolve_api_key()
            .ok_or_else(|| anyhow::anyhow!("No transcription API key configured"))?;

        Ok(Self {
            api_key,
            model: config.model.clone().unwrap_or_else(|| "nova-2-phonecall".into()),
            language: config.language.clone().unwrap_or_else(|| "en-US".into()),
            encoding: config.encoding.clone().unwrap_or_else(|| "mulaw".into()),
            sample_rate: config.sample_rate.unwrap_or(8000),
            utterance_end_ms: config.utterance_end_ms.unwrap_or(1000),
        })
    }

    /// Full listen URL with query parameters.
    pub fn listen_url(&self) -> String {
        format!(
            "{LISTEN_URL}?encoding={}&sample_rate={}&channels=1&model={}&language={}\
             &punctuate=true&interim_results=true&utterance_end_ms={}&vad_events=true",
            self.encoding, self.sample_rate, self.model, self.language, self.utterance_end_ms
        )
    }

    async fn run(
        self,
        mut audio_rx: mpsc::UnboundedReceiver<Vec<u8>>,
        events_tx: mpsc::UnboundedSender<TranscriptEvent>,
        cancel: CancellationToken,
    ) -> Result<()> {
        let mut request = self.listen_url().into_client_request()?;
        request.headers_mut().insert(
            "Authorization",
            HeaderValue::from_str(&format!("Token {}", self.api_key))?,
        );

        // Audio keeps queueing in `audio_rx` while the handshake is in flight.
        let connect = tokio_tungstenite::connect_async(request);
        let (ws, _resp) = tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Transcription stream cancelled before connect");
                return Ok(());
            }
            result = connect => result?,
        };
        info!(model = %self.model, buffered = audio_rx.len(), "Transcription stream connected");

        let (mut ws_tx, mut ws_rx) = ws.split();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    let _ = ws_tx.send(Message::Text(CLOSE_STREAM.into())).await;
                    let _ = ws_tx.close().await;
                    break;
                }
                frame = audio_rx.recv() => {
                    match frame {
                        Some(frame) => {
                            ws_tx.send(Message::Binary(frame.into())).await?;
                        }
                        None => {
                            let _ = ws_tx.send(Message::Text(CLOSE_STREAM.into())).await;
                            break;
                        }
                    }
                }
                msg = ws_rx.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            if let Some(event) = parse_event(text.as_str()) {
                                if events_tx.send(event).is_err() {
                                    break;
                                }
                            }
                        }
                        Some(Ok(Message::Close(frame))) => {
                            debug!(?frame, "Transcription stream closed by provider");
                            break;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            anyhow::bail!("transcription websocket error: {e}");
                        }
                        None => break,
                    }
                }
            }
        }

        Ok(())
    }
}

const CLOSE_STREAM: &str = r#"{"type":"CloseStream"}"#;

impl Transcriber for DeepgramTranscriber {
    fn open(&self) -> TranscriptionHandle {
        let (audio_tx, audio_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let stream = self.clone();
        let task_cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(e) = stream.run(audio_rx, events_tx, task_cancel.clone()).await {
                warn!(error = %e, "Transcription stream failed");
            }
            task_cancel.cancel();
        });

        TranscriptionHandle::new(audio_tx, events_rx, cancel)
    }
}

/// Map one provider message to a transcript event.
///
/// Empty transcripts and message types other than `Results` and
/// `UtteranceEnd` yield `None`.
pub fn parse_event(text: &str) -> Option<TranscriptEvent> {
    let msg: Value = match serde_json::from_str(text) {
        Ok(msg) => msg,
        Err(e) => {
            debug!(error = %e, "Ignoring unparseable transcription message");
            return None;
        }
    };

    match msg.get("type").and_then(Value::as_str)? {
        "Results" => {
            let transcript = msg
                .pointer("/channel/alternatives/0/transcript")
                .and_then(Value::as_str)?
                .trim();
            if transcript.is_empty() {
                return None;
            }
            let is_final = msg.get("is_final").and_then(Value::as_bool).unwrap_or(false);
            Some(if is_final {
                TranscriptEvent::Final(transcript.to_string())
            } else {
                TranscriptEvent::Interim(transcript.to_string())
            })
        }
        "UtteranceEnd" => Some(TranscriptEvent::UtteranceEnd),
        _ => None,
    }
}
