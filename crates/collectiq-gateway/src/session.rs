//! One live call: carrier events in, dialogue decisions and audio out.
//!
//! The session owns all per-call state and runs a single select loop, so
//! utterances are decided strictly one at a time. Anything the caller says
//! while a response is still playing is queued and handled in order once
//! playback finishes.

use std::collections::VecDeque;
use std::future::pending;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, warn};

use collectiq_core::error::{CollectIqError, Result};
use collectiq_core::ports::{TranscriptEvent, TranscriptionHandle};
use collectiq_core::types::{
    Action, ConversationHistory, ConversationState, PayerContext, Role, Utterance,
};
use collectiq_media::turn::TurnDetector;
use collectiq_media::twilio::{CarrierEvent, MediaPayload, StartMeta};

use crate::executor::{ActionExecutor, CallOutcome, CallSummary};
use crate::sink::CarrierSink;
use crate::speaker::{Pacing, SpeechDone, Speaker};
use crate::state::CallServices;

type PayerLookup = oneshot::Receiver<Result<Option<PayerContext>>>;

/// Transcription streams opened per call before giving up on caller speech.
const MAX_TRANSCRIPTION_OPENS: u32 = 3;
/// Wait before reopening a dropped stream; doubles with each reopen.
const TRANSCRIPTION_RETRY_BASE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PayerState {
    Unknown,
    Loading,
    Loaded,
}

pub struct CallSession {
    services: CallServices,
    sink: CarrierSink,
    executor: ActionExecutor,
    speaker: Speaker,
    speech_done: mpsc::UnboundedReceiver<SpeechDone>,
    transcription: Option<TranscriptionHandle>,
    transcription_opens: u32,
    transcription_retry_at: Option<Instant>,
    turn: TurnDetector,

    call_sid: Option<String>,
    payer_id: Option<String>,
    payer: Option<PayerContext>,
    payer_state: PayerState,
    payer_rx: Option<PayerLookup>,

    state: ConversationState,
    history: ConversationHistory,
    queued: VecDeque<Utterance>,
    pending_action: Option<Action>,
    greeted: bool,
    speech_seq: u64,
    speaking: usize,

    greeting_deadline: Option<Instant>,
    idle_deadline: Option<Instant>,
    idle_reprompts: u32,

    started_at: DateTime<Utc>,
    started: Instant,
}

impl CallSession {
    /// `payer_id` comes from the media-stream URL when the carrier passed it
    /// there; otherwise it is read from the stream's start parameters.
    pub fn new(services: CallServices, sink: CarrierSink, payer_id: Option<String>) -> Self {
        let settings = &services.settings;
        let (speaker, speech_done) = Speaker::spawn(
            services.tts.clone(),
            sink.clone(),
            Pacing {
                frame_bytes: settings.frame_bytes,
                frame_pause: settings.frame_pause,
            },
        );
        let executor = ActionExecutor::new(
            services.store.clone(),
            services.call_control.clone(),
            services.transfer_number.clone(),
            sink.clone(),
        );
        let turn = TurnDetector::new(settings.silence_debounce);

        Self {
            services,
            sink,
            executor,
            speaker,
            speech_done,
            transcription: None,
            transcription_opens: 0,
            transcription_retry_at: None,
            turn,
            call_sid: None,
            payer_id: payer_id.filter(|id| !id.trim().is_empty()),
            payer: None,
            payer_state: PayerState::Unknown,
            payer_rx: None,
            state: ConversationState::default(),
            history: ConversationHistory::new(),
            queued: VecDeque::new(),
            pending_action: None,
            greeted: false,
            speech_seq: 0,
            speaking: 0,
            greeting_deadline: None,
            idle_deadline: None,
            idle_reprompts: 0,
            started_at: Utc::now(),
            started: Instant::now(),
        }
    }

    /// Drive the call until it ends. `events` yields parsed carrier frames and
    /// closes when the socket does.
    pub async fn run(mut self, mut events: mpsc::UnboundedReceiver<CarrierEvent>) -> CallOutcome {
        info!(payer_id = ?self.payer_id, "Call session started");
        self.start_payer_lookup();

        let outcome = loop {
            let debounce_at = self.turn.deadline();
            let greeting_at = self.greeting_deadline;
            let idle_at = self.idle_deadline;

            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => {
                        if let Some(outcome) = self.on_carrier_event(event).await {
                            break outcome;
                        }
                    }
                    None => break self.on_disconnect("socket closed").await,
                },
                event = next_transcript(&mut self.transcription) => {
                    if let Some(outcome) = self.on_transcript(event).await {
                        break outcome;
                    }
                }
                done = self.speech_done.recv(), if self.speaking > 0 => {
                    let outcome = match done {
                        Some(done) => self.on_speech_done(done).await,
                        None => self.on_speaker_gone().await,
                    };
                    if let Some(outcome) = outcome {
                        break outcome;
                    }
                }
                result = recv_payer(&mut self.payer_rx) => {
                    self.on_payer_loaded(result);
                }
                _ = sleep_until_opt(debounce_at) => {
                    if let Some(utterance) = self.turn.poll(Instant::now()) {
                        if let Some(outcome) = self.on_utterance(utterance).await {
                            break outcome;
                        }
                    }
                }
                _ = sleep_until_opt(greeting_at) => {
                    debug!("Greeting wait elapsed before payer lookup finished");
                    self.greeting_deadline = None;
                    self.greet();
                }
                _ = sleep_until_opt(idle_at) => {
                    if let Some(outcome) = self.on_idle().await {
                        break outcome;
                    }
                }
            }
        };

        self.teardown(outcome).await;
        outcome
    }

    async fn on_carrier_event(&mut self, event: CarrierEvent) -> Option<CallOutcome> {
        match event {
            CarrierEvent::Connected { protocol } => {
                debug!(?protocol, "Carrier connected");
            }
            CarrierEvent::Start { stream_sid, start } => self.on_start(stream_sid, start),
            CarrierEvent::Media { media, .. } => self.on_media(&media),
            CarrierEvent::Mark { mark, .. } => {
                debug!(name = %mark.name, "Playback mark reached");
            }
            CarrierEvent::Dtmf { dtmf } => {
                info!(digit = %dtmf.digit, "Caller pressed a key");
            }
            CarrierEvent::Stop { stop, .. } => {
                if self.call_sid.is_none() {
                    self.call_sid = stop.and_then(|s| s.call_sid);
                }
                return Some(self.on_disconnect("carrier stop").await);
            }
            CarrierEvent::Unknown => {
                debug!("Ignoring unrecognized carrier event");
            }
        }
        None
    }

    fn on_start(&mut self, stream_sid: Option<String>, start: StartMeta) {
        let Some(stream_sid) = stream_sid.or(start.stream_sid) else {
            warn!("Start event without a stream id");
            return;
        };
        self.sink.set_stream_sid(&stream_sid);
        self.call_sid = start.call_sid.or(self.call_sid.take());

        if self.payer_id.is_none() {
            self.payer_id = start
                .custom_parameters
                .get("payerId")
                .filter(|id| !id.trim().is_empty())
                .cloned();
            self.start_payer_lookup();
        }
        if self.payer_state == PayerState::Unknown {
            warn!("No payer id on this call; using generic phrasing");
            self.payer_state = PayerState::Loaded;
        }

        info!(
            stream_sid = %stream_sid,
            call_sid = ?self.call_sid,
            payer_id = ?self.payer_id,
            "Media stream started"
        );

        self.ensure_transcription();
        if self.payer_state == PayerState::Loaded {
            self.greet();
        } else {
            self.greeting_deadline = Some(Instant::now() + self.services.settings.greeting_wait);
        }
    }

    fn on_media(&mut self, media: &MediaPayload) {
        let audio = match media.decode() {
            Ok(audio) => audio,
            Err(e) => {
                debug!(error = %e, "Dropping undecodable media frame");
                return;
            }
        };
        self.ensure_transcription();
        if let Some(stream) = &self.transcription {
            if !stream.send_audio(audio) {
                debug!("Transcription stream not accepting audio");
            }
        }
    }

    fn ensure_transcription(&mut self) {
        if self.transcription.is_some() || self.transcription_opens >= MAX_TRANSCRIPTION_OPENS {
            return;
        }
        if let Some(retry_at) = self.transcription_retry_at {
            if Instant::now() < retry_at {
                return;
            }
        }
        self.transcription_opens += 1;
        self.transcription_retry_at = None;
        debug!(attempt = self.transcription_opens, "Opening transcription stream");
        self.transcription = Some(self.services.transcriber.open());
    }

    fn on_transcription_closed(&mut self) {
        self.transcription = None;
        if self.transcription_opens >= MAX_TRANSCRIPTION_OPENS {
            warn!(
                call_sid = ?self.call_sid,
                opens = self.transcription_opens,
                "Transcription unavailable; caller speech will not be heard"
            );
            return;
        }
        let backoff = TRANSCRIPTION_RETRY_BASE * 2u32.pow(self.transcription_opens.saturating_sub(1));
        warn!(retry_in_ms = backoff.as_millis() as u64, "Transcription stream closed; reopening");
        self.transcription_retry_at = Some(Instant::now() + backoff);
    }

    fn start_payer_lookup(&mut self) {
        let Some(id) = self.payer_id.clone() else {
            return;
        };
        if self.payer_state != PayerState::Unknown {
            return;
        }
        self.payer_state = PayerState::Loading;

        let (tx, rx) = oneshot::channel();
        let payers = self.services.payers.clone();
        tokio::spawn(async move {
            let _ = tx.send(payers.get_payer(&id).await);
        });
        self.payer_rx = Some(rx);
    }

    fn on_payer_loaded(&mut self, result: Result<Option<PayerContext>>) {
        self.payer_state = PayerState::Loaded;
        match result {
            Ok(Some(payer)) => {
                debug!(payer_id = %payer.id, "Payer loaded");
                self.payer = Some(payer);
            }
            Ok(None) => {
                warn!(payer_id = ?self.payer_id, "Payer not found; using generic phrasing");
            }
            Err(e) => {
                warn!(payer_id = ?self.payer_id, error = %e, "Payer lookup failed; using generic phrasing");
            }
        }
        if self.sink.stream_sid().is_some() {
            self.greet();
        }
    }

    fn greet(&mut self) {
        if self.greeted || self.sink.stream_sid().is_none() {
            return;
        }
        self.greeted = true;
        self.greeting_deadline = None;
        let greeting = self.services.engine.greeting(self.payer.as_ref());
        info!(personalized = self.payer.is_some(), "Greeting caller");
        self.speak(greeting);
    }

    async fn on_transcript(&mut self, event: Option<TranscriptEvent>) -> Option<CallOutcome> {
        match event {
            Some(TranscriptEvent::Interim(text)) => {
                debug!(%text, "Interim transcript");
                self.idle_deadline = None;
            }
            Some(TranscriptEvent::Final(text)) => {
                debug!(%text, "Final transcript fragment");
                self.idle_deadline = None;
                self.turn.push_final(&text, Instant::now());
            }
            Some(TranscriptEvent::UtteranceEnd) => {
                if let Some(utterance) = self.turn.utterance_end() {
                    return self.on_utterance(utterance).await;
                }
            }
            None => self.on_transcription_closed(),
        }
        None
    }

    async fn on_utterance(&mut self, utterance: Utterance) -> Option<CallOutcome> {
        if self.state.is_terminal() || self.pending_action.is_some() {
            debug!(text = %utterance.text, "Call is ending, dropping utterance");
            return None;
        }
        if self.speaking > 0 || !self.greeted {
            debug!(text = %utterance.text, queued = self.queued.len() + 1, "Agent busy, queueing utterance");
            self.queued.push_back(utterance);
            return None;
        }
        self.decide(utterance).await
    }

    async fn decide(&mut self, utterance: Utterance) -> Option<CallOutcome> {
        self.idle_deadline = None;
        self.idle_reprompts = 0;
        self.history.push(Role::Customer, utterance.text.as_str());

        let from = self.state;
        let decision = self.services.engine.decide(
            from,
            &utterance.text,
            self.payer.as_ref(),
            self.services.settings.today(),
        );
        info!(
            call_sid = ?self.call_sid,
            from = from.as_str(),
            to = decision.next_state.as_str(),
            intent = decision.intent.map(|i| i.as_str()).unwrap_or("unmatched"),
            action = decision.action.kind(),
            latency_ms = utterance.received_at.elapsed().as_millis() as u64,
            "Caller turn decided"
        );
        #[cfg(feature = "metrics")]
        crate::metrics::record_decision(
            decision.intent.map(|i| i.as_str()).unwrap_or("unmatched"),
            decision.action.kind(),
        );

        self.state = decision.next_state;
        self.speak(decision.response);

        match decision.action {
            Action::None => None,
            action @ Action::FollowUp { .. } => {
                let summary = self.summary();
                self.executor.execute(&action, &summary).await;
                None
            }
            action => {
                self.pending_action = Some(action);
                self.run_pending_if_silent().await
            }
        }
    }

    /// Terminal actions wait for their response to play. When nothing is
    /// playing (the speaker has stopped), carry them out now.
    async fn run_pending_if_silent(&mut self) -> Option<CallOutcome> {
        if self.speaking > 0 {
            return None;
        }
        let action = self.pending_action.take()?;
        let summary = self.summary();
        self.executor.execute(&action, &summary).await
    }

    async fn on_speech_done(&mut self, done: SpeechDone) -> Option<CallOutcome> {
        self.speaking = self.speaking.saturating_sub(1);
        debug!(id = done.id, delivered = done.delivered, "Response finished");
        if self.speaking > 0 {
            return None;
        }
        self.after_playback().await
    }

    async fn on_speaker_gone(&mut self) -> Option<CallOutcome> {
        warn!(call_sid = ?self.call_sid, unplayed = self.speaking, "Speaker stopped mid-response");
        self.speaking = 0;
        self.after_playback().await
    }

    /// Nothing is playing: run the deferred action, then the next queued
    /// utterance, else start waiting for the caller.
    async fn after_playback(&mut self) -> Option<CallOutcome> {
        if let Some(outcome) = self.run_pending_if_silent().await {
            return Some(outcome);
        }
        if let Some(next) = self.queued.pop_front() {
            return self.on_utterance(next).await;
        }
        self.arm_idle();
        None
    }

    fn arm_idle(&mut self) {
        if self.state.is_terminal() || self.turn.is_pending() || self.speaking > 0 {
            return;
        }
        self.idle_deadline = Some(Instant::now() + self.services.settings.idle_reprompt);
    }

    async fn on_idle(&mut self) -> Option<CallOutcome> {
        self.idle_deadline = None;
        if self.speaking > 0 || self.state.is_terminal() || self.pending_action.is_some() {
            return None;
        }

        if self.idle_reprompts >= self.services.settings.max_idle_reprompts {
            info!(reprompts = self.idle_reprompts, "Caller silent, ending call");
            let decision = self.services.engine.idle_goodbye();
            self.state = decision.next_state;
            self.speak(decision.response);
            self.pending_action = Some(decision.action);
            return self.run_pending_if_silent().await;
        }

        self.idle_reprompts += 1;
        debug!(attempt = self.idle_reprompts, "Caller silent, reprompting");
        let text = self.services.engine.reprompt(self.state, self.payer.as_ref());
        self.speak(text);
        None
    }

    fn speak(&mut self, text: String) {
        self.history.push(Role::Agent, text.as_str());
        self.speech_seq += 1;
        if self.speaker.say(self.speech_seq, text) {
            self.speaking += 1;
        } else {
            warn!("Speaker stopped; response not played");
            self.arm_idle();
        }
    }

    async fn on_disconnect(&mut self, reason: &str) -> CallOutcome {
        info!(call_sid = ?self.call_sid, reason, "Carrier ended the call");
        let summary = self.summary();
        self.executor.flush(CallOutcome::Disconnected, &summary).await;
        CallOutcome::Disconnected
    }

    async fn teardown(&mut self, outcome: CallOutcome) {
        if let Some(stream) = self.transcription.take() {
            stream.close();
        }
        self.speaker.cancel();
        if !self.executor.is_logged() {
            let summary = self.summary();
            self.executor.flush(outcome, &summary).await;
        }
        self.sink.close();
        #[cfg(feature = "metrics")]
        crate::metrics::record_outcome(outcome.as_str());

        info!(
            call_sid = ?self.call_sid,
            outcome = outcome.as_str(),
            state = self.state.as_str(),
            turns = self.history.len(),
            duration_secs = self.started.elapsed().as_secs(),
            "Call session ended"
        );
    }

    fn summary(&self) -> CallSummary {
        CallSummary {
            call_sid: self.call_sid.clone(),
            payer_id: self.payer_id.clone(),
            history: self.history.clone(),
            started_at: self.started_at,
            duration_secs: self.started.elapsed().as_secs(),
        }
    }
}

async fn next_transcript(stream: &mut Option<TranscriptionHandle>) -> Option<TranscriptEvent> {
    match stream {
        Some(stream) => stream.next_event().await,
        None => pending().await,
    }
}

async fn recv_payer(rx: &mut Option<PayerLookup>) -> Result<Option<PayerContext>> {
    let Some(lookup) = rx else {
        return pending().await;
    };
    let result = lookup
        .await
        .unwrap_or_else(|_| Err(CollectIqError::Payer("lookup task dropped".into())));
    *rx = None;
    result
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => pending().await,
    }
}
