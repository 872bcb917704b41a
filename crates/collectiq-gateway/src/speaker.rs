//! Per-call speech playback: synthesize, re-frame, and pace audio onto the
//! carrier socket, one response at a time.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use collectiq_core::ports::SpeechSynthesizer;
use collectiq_media::framing::AudioFramer;

use crate::sink::CarrierSink;

struct SpeakJob {
    id: u64,
    text: String,
}

/// Reported once a response has finished playing, or failed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpeechDone {
    pub id: u64,
    /// Whether at least one audio frame reached the carrier.
    pub delivered: bool,
}

/// Playback frame size and pacing.
#[derive(Debug, Clone, Copy)]
pub struct Pacing {
    pub frame_bytes: usize,
    pub frame_pause: Duration,
}

/// Handle to the playback task. Dropping it stops playback.
pub struct Speaker {
    jobs: mpsc::UnboundedSender<SpeakJob>,
    cancel: CancellationToken,
}

impl Speaker {
    pub fn spawn(
        tts: Arc<dyn SpeechSynthesizer>,
        sink: CarrierSink,
        pacing: Pacing,
    ) -> (Self, mpsc::UnboundedReceiver<SpeechDone>) {
        let (jobs_tx, jobs_rx) = mpsc::unbounded_channel();
        let (done_tx, done_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        tokio::spawn(run_speaker(tts, sink, pacing, jobs_rx, done_tx, cancel.clone()));

        (
            Self {
                jobs: jobs_tx,
                cancel,
            },
            done_rx,
        )
    }

    /// Queue a response. Returns false once playback has stopped.
    pub fn say(&self, id: u64, text: String) -> bool {
        !self.cancel.is_cancelled() && self.jobs.send(SpeakJob { id, text }).is_ok()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

impl Drop for Speaker {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run_speaker(
    tts: Arc<dyn SpeechSynthesizer>,
    sink: CarrierSink,
    pacing: Pacing,
    mut jobs: mpsc::UnboundedReceiver<SpeakJob>,
    done_tx: mpsc::UnboundedSender<SpeechDone>,
    cancel: CancellationToken,
) {
    loop {
        let job = tokio::select! {
            _ = cancel.cancelled() => break,
            job = jobs.recv() => match job {
                Some(job) => job,
                None => break,
            },
        };

        let delivered = tokio::select! {
            _ = cancel.cancelled() => {
                // Drop whatever the carrier still has buffered.
                sink.clear();
                break;
            }
            delivered = play(tts.as_ref(), &sink, &job, pacing) => delivered,
        };

        if done_tx.send(SpeechDone { id: job.id, delivered }).is_err() {
            break;
        }
    }
    debug!("Speaker stopped");
}

/// Name of the mark that follows a response's audio on the carrier stream.
fn mark_name(id: u64) -> String {
    format!("response-{id}")
}

/// Stream one response to the carrier, followed by its playback mark.
/// Returns whether any audio was sent.
async fn play(tts: &dyn SpeechSynthesizer, sink: &CarrierSink, job: &SpeakJob, pacing: Pacing) -> bool {
    let text = job.text.as_str();
    if !sink.is_open() {
        debug!("Carrier socket closed, skipping synthesis");
        return false;
    }

    let (chunk_tx, mut chunk_rx) = mpsc::unbounded_channel::<Vec<u8>>();
    let mut framer = AudioFramer::new(pacing.frame_bytes);

    let relay = async {
        let mut frames = 0usize;
        while let Some(chunk) = chunk_rx.recv().await {
            for frame in framer.push(&chunk) {
                if !sink.send_media(&frame) {
                    return frames;
                }
                frames += 1;
                tokio::time::sleep(pacing.frame_pause).await;
            }
        }
        if let Some(tail) = framer.finish() {
            if sink.send_media(&tail) {
                frames += 1;
            }
        }
        frames
    };

    let (result, frames) = tokio::join!(tts.synthesize(text, chunk_tx), relay);
    if let Err(e) = result {
        warn!(error = %e, frames, "Speech synthesis failed");
        #[cfg(feature = "metrics")]
        crate::metrics::record_collaborator_error(e.kind());
    } else {
        debug!(frames, chars = text.len(), "Response played");
    }
    if frames > 0 {
        sink.send_mark(&mark_name(job.id));
    }
    frames > 0
}
