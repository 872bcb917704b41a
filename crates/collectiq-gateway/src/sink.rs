//! Outbound half of the carrier websocket.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use tokio::sync::mpsc;
use tracing::debug;

use collectiq_media::twilio::OutboundFrame;

/// What the connection writer forwards to the socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkMessage {
    Frame(String),
    Close,
}

/// Cloneable handle for writing frames to one call's carrier socket.
///
/// Every send checks liveness and the stream id first; once closed, sends are
/// dropped and reported as `false`.
#[derive(Debug, Clone)]
pub struct CarrierSink {
    tx: mpsc::UnboundedSender<SinkMessage>,
    open: Arc<AtomicBool>,
    stream_sid: Arc<OnceLock<String>>,
}

impl CarrierSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<SinkMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = Self {
            tx,
            open: Arc::new(AtomicBool::new(true)),
            stream_sid: Arc::new(OnceLock::new()),
        };
        (sink, rx)
    }

    /// Record the carrier stream id. Later calls are ignored.
    pub fn set_stream_sid(&self, stream_sid: &str) {
        let _ = self.stream_sid.set(stream_sid.to_string());
    }

    pub fn stream_sid(&self) -> Option<&str> {
        self.stream_sid.get().map(String::as_str)
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst) && !self.tx.is_closed()
    }

    pub fn send_media(&self, audio: &[u8]) -> bool {
        let Some(stream_sid) = self.ready() else {
            return false;
        };
        self.send(OutboundFrame::media(stream_sid, audio))
    }

    pub fn send_mark(&self, name: &str) -> bool {
        let Some(stream_sid) = self.ready() else {
            return false;
        };
        self.send(OutboundFrame::mark(stream_sid, name))
    }

    pub fn clear(&self) -> bool {
        let Some(stream_sid) = self.ready() else {
            return false;
        };
        self.send(OutboundFrame::clear(stream_sid))
    }

    /// Close the socket. Idempotent.
    pub fn close(&self) {
        if self.open.swap(false, Ordering::SeqCst) {
            let _ = self.tx.send(SinkMessage::Close);
        }
    }

    /// The writer side went away; stop accepting frames.
    pub fn mark_closed(&self) {
        self.open.store(false, Ordering::SeqCst);
    }

    fn ready(&self) -> Option<&str> {
        if !self.is_open() {
            debug!("Carrier socket not open, dropping outbound frame");
            return None;
        }
        let stream_sid = self.stream_sid();
        if stream_sid.is_none() {
            debug!("No stream id yet, dropping outbound frame");
        }
        stream_sid
    }

    fn send(&self, frame: OutboundFrame) -> bool {
        if self.tx.send(SinkMessage::Frame(frame.to_json())).is_err() {
            self.mark_closed();
            return false;
        }
        true
    }
}
