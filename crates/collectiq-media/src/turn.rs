//! Silence-debounced turn detection over final transcript fragments.

use std::time::Duration;

use collectiq_core::types::Utterance;
use tokio::time::Instant;

/// Joins final transcript fragments into one utterance once the caller has
/// been quiet for the debounce window.
///
/// Each new fragment restarts the window. An explicit utterance-end signal
/// from the transcription provider flushes immediately.
#[derive(Debug)]
pub struct TurnDetector {
    debounce: Duration,
    fragments: Vec<String>,
    deadline: Option<Instant>,
}

impl TurnDetector {
    pub fn new(debounce: Duration) -> Self {
        Self {
            debounce,
            fragments: Vec::new(),
            deadline: None,
        }
    }

    pub fn debounce(&self) -> Duration {
        self.debounce
    }

    /// Record a final fragment and restart the silence window.
    pub fn push_final(&mut self, text: &str, now: Instant) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        self.fragments.push(text.to_string());
        self.deadline = Some(now + self.debounce);
    }

    /// Provider says the caller stopped talking: flush what we have.
    pub fn utterance_end(&mut self) -> Option<Utterance> {
        self.take()
    }

    /// When the pending utterance becomes due, if one is pending.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_pending(&self) -> bool {
        !self.fragments.is_empty()
    }

    /// Emit the utterance if its silence window has elapsed.
    pub fn poll(&mut self, now: Instant) -> Option<Utterance> {
        match self.deadline {
            Some(deadline) if deadline <= now => self.take(),
            _ => None,
        }
    }

    pub fn reset(&mut self) {
        self.fragments.clear();
        self.deadline = None;
    }

    fn take(&mut self) -> Option<Utterance> {
        self.deadline = None;
        if self.fragments.is_empty() {
            return None;
        }
        let text = std::mem::take(&mut self.fragments).join(" ");
        Some(Utterance::new(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_millis(800);

    #[test]
    fn test_fragments_join_after_silence() {
        let start = Instant::now();
        let mut turn = TurnDetector::new(WINDOW);

        turn.push_final("no I'm", start);
        turn.push_final("busy", start + Duration::from_millis(300));

        // Second fragment restarted the window.
        assert!(turn.poll(start + Duration::from_millis(900)).is_none());
        let utterance = turn.poll(start + Duration::from_millis(1100)).unwrap();
        assert_eq!(utterance.text, "no I'm busy");
        assert!(!turn.is_pending());
        assert!(turn.deadline().is_none());
    }

    #[test]
    fn test_utterance_end_short_circuits() {
        let start = Instant::now();
        let mut turn = TurnDetector::new(WINDOW);

        turn.push_final("call me Friday", start);
        let utterance = turn.utterance_end().unwrap();
        assert_eq!(utterance.text, "call me Friday");
        // Nothing left for the timer to emit.
        assert!(turn.poll(start + WINDOW * 2).is_none());
    }

    #[test]
    fn test_utterance_end_without_fragments() {
        let mut turn = TurnDetector::new(WINDOW);
        assert!(turn.utterance_end().is_none());
    }

    #[test]
    fn test_blank_fragments_ignored() {
        let mut turn = TurnDetector::new(WINDOW);
        turn.push_final("   ", Instant::now());
        assert!(!turn.is_pending());
        assert!(turn.deadline().is_none());
    }

    #[test]
    fn test_reset_discards() {
        let start = Instant::now();
        let mut turn = TurnDetector::new(WINDOW);
        turn.push_final("yes", start);
        turn.reset();
        assert!(turn.poll(start + WINDOW * 2).is_none());
    }
}
