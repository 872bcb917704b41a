//! In-memory collaborators for driving call sessions without the network.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use collectiq_agent::DialogueEngine;
use collectiq_core::error::{CollectIqError, Result};
use collectiq_core::ports::{
    CallControl, OutreachStore, PayerDirectory, SpeechSynthesizer, TranscriptEvent, Transcriber,
    TranscriptionHandle,
};
use collectiq_core::records::{FollowUpRecord, OutreachRecord, PayerStatus, TranscriptRecord};
use collectiq_core::types::PayerContext;
use collectiq_gateway::CallOutcome;
use collectiq_gateway::session::CallSession;
use collectiq_gateway::sink::{CarrierSink, SinkMessage};
use collectiq_gateway::state::{CallServices, SessionSettings};
use collectiq_media::twilio::CarrierEvent;

pub const TRANSFER_NUMBER: &str = "+15550001111";

pub struct FakePayers(HashMap<String, PayerContext>);

impl FakePayers {
    pub fn standard() -> Self {
        let payer = PayerContext {
            id: "1003".into(),
            name: "Adani Ports".into(),
            amount_due: Some(85000.0),
            currency_code: Some("USD".into()),
            last_status: None,
        };
        Self(HashMap::from([(payer.id.clone(), payer)]))
    }
}

#[async_trait]
impl PayerDirectory for FakePayers {
    async fn get_payer(&self, id: &str) -> Result<Option<PayerContext>> {
        Ok(self.0.get(id).cloned())
    }
}

#[derive(Default)]
pub struct MemoryStore {
    pub outreach: Mutex<Vec<OutreachRecord>>,
    pub transcripts: Mutex<Vec<TranscriptRecord>>,
    pub follow_ups: Mutex<Vec<FollowUpRecord>>,
    pub statuses: Mutex<Vec<(String, PayerStatus)>>,
}

impl MemoryStore {
    pub fn transcript_count(&self) -> usize {
        self.transcripts.lock().unwrap().len()
    }

    pub fn outreach_count(&self) -> usize {
        self.outreach.lock().unwrap().len()
    }
}

#[async_trait]
impl OutreachStore for MemoryStore {
    async fn log_outreach(&self, record: &OutreachRecord) -> Result<()> {
        self.outreach.lock().unwrap().push(record.clone());
        Ok(())
    }

    async fn log_transcript(&self, record: &TranscriptRecord) -> Result<()> {
        self.transcripts.lock().unwrap().push(record.clone());
        Ok(())
    }

    async fn transcript_exists(&self, call_id: &str) -> Result<bool> {
        Ok(self
            .transcripts
            .lock()
            .unwrap()
            .iter()
            .any(|t| t.call_id == call_id))
    }

    async fn update_payer_status(&self, payer_id: &str, status: PayerStatus) -> Result<()> {
        self.statuses
            .lock()
            .unwrap()
            .push((payer_id.to_string(), status));
        Ok(())
    }

    async fn schedule_follow_up(&self, record: &FollowUpRecord) -> Result<()> {
        self.follow_ups.lock().unwrap().push(record.clone());
        Ok(())
    }
}

/// Emits two frames of silence per response after `delay`.
pub struct FakeTts {
    delay: Duration,
    pub spoken: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeTts {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            spoken: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn spoken(&self) -> Vec<String> {
        self.spoken.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpeechSynthesizer for FakeTts {
    async fn synthesize(&self, text: &str, chunk_tx: mpsc::UnboundedSender<Vec<u8>>) -> Result<()> {
        self.spoken.lock().unwrap().push(text.to_string());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        tokio::time::sleep(self.delay).await;
        let sent = chunk_tx.send(vec![0xff; 320]);

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        sent.map_err(|_| CollectIqError::Speech("playback gone".into()))
    }
}

struct FakeStream {
    events: mpsc::UnboundedSender<TranscriptEvent>,
    audio: mpsc::UnboundedReceiver<Vec<u8>>,
    cancel: CancellationToken,
}

/// Hands out in-memory streams that tests feed transcript events into.
#[derive(Default)]
pub struct FakeTranscriber {
    streams: Mutex<Vec<FakeStream>>,
}

impl FakeTranscriber {
    pub fn opened(&self) -> usize {
        self.streams.lock().unwrap().len()
    }

    /// Streams the session has not closed yet.
    pub fn live_streams(&self) -> usize {
        self.streams
            .lock()
            .unwrap()
            .iter()
            .filter(|s| !s.cancel.is_cancelled())
            .count()
    }

    /// Deliver a complete caller utterance on the newest stream.
    pub fn say(&self, text: &str) {
        self.send(TranscriptEvent::Final(text.to_string()));
        self.send(TranscriptEvent::UtteranceEnd);
    }

    pub fn send(&self, event: TranscriptEvent) {
        let streams = self.streams.lock().unwrap();
        let stream = streams.last().expect("no transcription stream open");
        stream.events.send(event).expect("session dropped the stream");
    }

    pub fn audio_received(&self) -> Vec<Vec<u8>> {
        let mut streams = self.streams.lock().unwrap();
        let mut frames = Vec::new();
        for stream in streams.iter_mut() {
            while let Ok(frame) = stream.audio.try_recv() {
                frames.push(frame);
            }
        }
        frames
    }
}

impl Transcriber for FakeTranscriber {
    fn open(&self) -> TranscriptionHandle {
        let (audio_tx, audio_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        self.streams.lock().unwrap().push(FakeStream {
            events: events_tx,
            audio: audio_rx,
            cancel: cancel.clone(),
        });
        TranscriptionHandle::new(audio_tx, events_rx, cancel)
    }
}

#[derive(Default)]
pub struct FakeCallControl {
    pub transfers: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl CallControl for FakeCallControl {
    async fn transfer_call(&self, call_id: &str, destination: &str) -> Result<()> {
        self.transfers
            .lock()
            .unwrap()
            .push((call_id.to_string(), destination.to_string()));
        Ok(())
    }
}

pub fn settings() -> SessionSettings {
    SessionSettings {
        silence_debounce: Duration::from_millis(50),
        greeting_wait: Duration::from_millis(200),
        idle_reprompt: Duration::from_secs(60),
        max_idle_reprompts: 2,
        frame_bytes: 160,
        frame_pause: Duration::from_millis(1),
        today: NaiveDate::from_ymd_opt(2024, 1, 1),
    }
}

pub struct Fakes {
    pub store: Arc<MemoryStore>,
    pub tts: Arc<FakeTts>,
    pub stt: Arc<FakeTranscriber>,
    pub control: Arc<FakeCallControl>,
}

impl Fakes {
    pub fn new(tts_delay: Duration) -> Self {
        Self {
            store: Arc::new(MemoryStore::default()),
            tts: Arc::new(FakeTts::new(tts_delay)),
            stt: Arc::new(FakeTranscriber::default()),
            control: Arc::new(FakeCallControl::default()),
        }
    }

    pub fn services(&self, settings: SessionSettings) -> CallServices {
        CallServices {
            engine: Arc::new(DialogueEngine::with_defaults().unwrap()),
            payers: Arc::new(FakePayers::standard()),
            store: self.store.clone(),
            tts: self.tts.clone(),
            transcriber: self.stt.clone(),
            call_control: Some(self.control.clone()),
            transfer_number: Some(TRANSFER_NUMBER.into()),
            settings,
        }
    }
}

/// A session running on its own task with test-side channel ends.
pub struct Harness {
    pub fakes: Fakes,
    pub events: mpsc::UnboundedSender<CarrierEvent>,
    pub out: mpsc::UnboundedReceiver<SinkMessage>,
    pub task: JoinHandle<CallOutcome>,
}

impl Harness {
    pub fn start(fakes: Fakes, settings: SessionSettings, payer_in_url: Option<&str>) -> Self {
        let services = fakes.services(settings);
        Self::start_with(fakes, services, payer_in_url)
    }

    /// Run against `services`, which may swap in collaborators other than `fakes`.
    pub fn start_with(fakes: Fakes, services: CallServices, payer_in_url: Option<&str>) -> Self {
        let (sink, out) = CarrierSink::channel();
        let (events, events_rx) = mpsc::unbounded_channel();
        let session = CallSession::new(services, sink, payer_in_url.map(str::to_string));
        let task = tokio::spawn(session.run(events_rx));
        Self {
            fakes,
            events,
            out,
            task,
        }
    }

    pub fn send(&self, json: &str) {
        let event = CarrierEvent::parse(json).unwrap();
        let _ = self.events.send(event);
    }

    pub fn start_stream(&self, call_sid: &str, payer_param: Option<&str>) {
        let params = payer_param
            .map(|p| format!(r#"{{"payerId":"{p}"}}"#))
            .unwrap_or_else(|| "{}".into());
        self.send(&format!(
            r#"{{"event":"start","streamSid":"MZ1","start":{{"streamSid":"MZ1","callSid":"{call_sid}","customParameters":{params}}}}}"#
        ));
    }

    /// Drop the inbound side as if the carrier socket closed.
    pub fn close_socket(&mut self) {
        self.events = mpsc::unbounded_channel().0;
    }

    pub fn stop(&self) {
        self.send(r#"{"event":"stop","streamSid":"MZ1","stop":{"callSid":"CA1"}}"#);
    }

    /// Wait until the session has asked for `n` responses and the last has played.
    pub async fn wait_spoken(&self, n: usize) {
        let tts = self.fakes.tts.clone();
        wait_until(move || tts.spoken().len() >= n).await;
    }

    pub async fn finish(self) -> (CallOutcome, Fakes, Vec<SinkMessage>) {
        let outcome = tokio::time::timeout(Duration::from_secs(5), self.task)
            .await
            .expect("session did not end")
            .unwrap();
        let mut out = self.out;
        let mut messages = Vec::new();
        while let Ok(msg) = out.try_recv() {
            messages.push(msg);
        }
        (outcome, self.fakes, messages)
    }
}

pub async fn wait_until(cond: impl Fn() -> bool) {
    for _ in 0..500 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met in time");
}
