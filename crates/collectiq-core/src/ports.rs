//! Collaborator contracts the voice core depends on.
//!
//! Every external system (payer database, persistence, text-to-speech,
//! live transcription, carrier call control) sits behind one of these
//! traits so sessions can be driven against fakes.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::records::{FollowUpRecord, OutreachRecord, PayerStatus, TranscriptRecord};
use crate::types::PayerContext;

/// Payer lookup.
#[async_trait]
pub trait PayerDirectory: Send + Sync {
    async fn get_payer(&self, id: &str) -> Result<Option<PayerContext>>;
}

/// Persistence writes for call outcomes.
#[async_trait]
pub trait OutreachStore: Send + Sync {
    async fn log_outreach(&self, record: &OutreachRecord) -> Result<()>;

    async fn log_transcript(&self, record: &TranscriptRecord) -> Result<()>;

    /// Whether a transcript row already exists for `call_id`.
    async fn transcript_exists(&self, call_id: &str) -> Result<bool>;

    async fn update_payer_status(&self, payer_id: &str, status: PayerStatus) -> Result<()>;

    async fn schedule_follow_up(&self, record: &FollowUpRecord) -> Result<()>;
}

/// Text-to-speech.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesize `text`, sending raw audio chunks as they arrive.
    ///
    /// Chunk boundaries are arbitrary; callers re-frame for playback.
    async fn synthesize(&self, text: &str, chunk_tx: mpsc::UnboundedSender<Vec<u8>>) -> Result<()>;
}

/// Carrier call control.
#[async_trait]
pub trait CallControl: Send + Sync {
    /// Redirect a live call to `destination`.
    async fn transfer_call(&self, call_id: &str, destination: &str) -> Result<()>;
}

/// Events from a live transcription stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscriptEvent {
    /// Partial hypothesis, ignored by decision logic.
    Interim(String),
    /// A finalized fragment. Several may make up one utterance.
    Final(String),
    /// The provider detected the end of the caller's utterance.
    UtteranceEnd,
}

/// Opens session-scoped transcription streams.
pub trait Transcriber: Send + Sync {
    /// Start a stream. Returns immediately; audio sent before the provider
    /// handshake completes is buffered and forwarded once connected.
    fn open(&self) -> TranscriptionHandle;
}

/// Duplex handle to one transcription stream.
pub struct TranscriptionHandle {
    audio_tx: mpsc::UnboundedSender<Vec<u8>>,
    events: mpsc::UnboundedReceiver<TranscriptEvent>,
    cancel: CancellationToken,
}

impl TranscriptionHandle {
    pub fn new(
        audio_tx: mpsc::UnboundedSender<Vec<u8>>,
        events: mpsc::UnboundedReceiver<TranscriptEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            audio_tx,
            events,
            cancel,
        }
    }

    /// Forward one audio frame. Returns false once the stream is gone.
    pub fn send_audio(&self, frame: Vec<u8>) -> bool {
        !self.cancel.is_cancelled() && self.audio_tx.send(frame).is_ok()
    }

    /// Next transcript event, `None` once the stream has closed.
    pub async fn next_event(&mut self) -> Option<TranscriptEvent> {
        self.events.recv().await
    }

    /// Close the stream and release its background task.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled() || self.audio_tx.is_closed()
    }
}

impl Drop for TranscriptionHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_handle_close_stops_audio() {
        let (audio_tx, mut audio_rx) = mpsc::unbounded_channel();
        let (_event_tx, event_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let handle = TranscriptionHandle::new(audio_tx, event_rx, cancel.clone());

        assert!(handle.send_audio(vec![1, 2, 3]));
        assert_eq!(audio_rx.recv().await, Some(vec![1, 2, 3]));

        handle.close();
        assert!(handle.is_closed());
        assert!(cancel.is_cancelled());
        assert!(!handle.send_audio(vec![4]));
    }

    #[tokio::test]
    async fn test_drop_cancels() {
        let (audio_tx, _audio_rx) = mpsc::unbounded_channel();
        let (_event_tx, event_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        drop(TranscriptionHandle::new(audio_tx, event_rx, cancel.clone()));
        assert!(cancel.is_cancelled());
    }
}
