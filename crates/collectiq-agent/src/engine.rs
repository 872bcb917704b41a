//! The collections conversation state machine.

use chrono::{Days, NaiveDate};
use collectiq_core::types::{Action, ConversationState, PayerContext};
use serde::Serialize;
use tracing::debug;

use crate::dates::infer_follow_up_date;
use crate::intent::{Intent, RuleSet};
use crate::phrasing::{Phrasing, SpeechContext};

/// Default furthest follow-up we will book, in days from today.
pub const DEFAULT_FOLLOW_UP_HORIZON_DAYS: u32 = 30;

/// Outcome of one decision step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Decision {
    pub response: String,
    pub next_state: ConversationState,
    pub action: Action,
    /// The rule that fired, `None` when the utterance matched nothing.
    pub intent: Option<Intent>,
}

impl Decision {
    fn new(response: String, next_state: ConversationState, action: Action, intent: Option<Intent>) -> Self {
        Self {
            response,
            next_state,
            action,
            intent,
        }
    }
}

/// Deterministic decision function over (state, utterance, payer, today).
#[derive(Debug, Clone)]
pub struct DialogueEngine {
    rules: RuleSet,
    phrasing: Phrasing,
    horizon_days: u32,
}

impl DialogueEngine {
    pub fn new(agent_name: impl Into<String>, horizon_days: u32) -> Result<Self, regex::Error> {
        Ok(Self {
            rules: RuleSet::standard()?,
            phrasing: Phrasing::new(agent_name),
            horizon_days,
        })
    }

    pub fn with_defaults() -> Result<Self, regex::Error> {
        Self::new("CollectIQ", DEFAULT_FOLLOW_UP_HORIZON_DAYS)
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn horizon_days(&self) -> u32 {
        self.horizon_days
    }

    /// Opening line, spoken before any caller input.
    pub fn greeting(&self, payer: Option<&PayerContext>) -> String {
        self.phrasing.greeting(&SpeechContext::from_payer(payer))
    }

    /// Nudge spoken when the caller has been silent for too long.
    pub fn reprompt(&self, state: ConversationState, payer: Option<&PayerContext>) -> String {
        self.phrasing.reprompt(state, &SpeechContext::from_payer(payer))
    }

    /// Final line when the caller never answers.
    pub fn idle_goodbye(&self) -> Decision {
        Decision::new(
            self.phrasing.idle_goodbye(),
            ConversationState::Ended,
            Action::EndCall,
            None,
        )
    }

    /// Decide the response, next state, and action for one utterance.
    pub fn decide(
        &self,
        state: ConversationState,
        utterance: &str,
        payer: Option<&PayerContext>,
        today: NaiveDate,
    ) -> Decision {
        let ctx = SpeechContext::from_payer(payer);
        let intent = self.rules.classify(state, utterance);

        let decision = match state {
            ConversationState::GreetingResponse => self.on_greeting(intent, &ctx),
            ConversationState::AwaitingConfirmation => self.on_confirmation(intent, &ctx),
            ConversationState::AwaitingDate => self.on_date(intent, utterance, today),
            ConversationState::Closing => Decision::new(
                self.phrasing.goodbye(&ctx),
                ConversationState::Ended,
                Action::EndCall,
                intent,
            ),
            ConversationState::Ended => Decision::new(
                self.phrasing.goodbye(&ctx),
                ConversationState::Ended,
                Action::None,
                intent,
            ),
        };

        debug!(
            state = state.as_str(),
            intent = intent.map(Intent::as_str).unwrap_or("unmatched"),
            next_state = decision.next_state.as_str(),
            action = decision.action.kind(),
            "Dialogue decision"
        );
        decision
    }

    fn transfer(&self, intent: Intent) -> Decision {
        let response = match intent {
            Intent::Dispute => self.phrasing.transfer_dispute(),
            Intent::Positive | Intent::PaymentCommitment => self.phrasing.transfer_to_payments(),
            _ => self.phrasing.transfer_to_specialist(),
        };
        Decision::new(response, ConversationState::Ended, Action::Transfer, Some(intent))
    }

    fn on_greeting(&self, intent: Option<Intent>, ctx: &SpeechContext) -> Decision {
        use ConversationState::*;

        match intent {
            Some(i @ (Intent::HumanRequest | Intent::Dispute)) => self.transfer(i),
            Some(Intent::Negative) => Decision::new(
                self.phrasing.ask_for_better_time(),
                AwaitingDate,
                Action::None,
                intent,
            ),
            Some(Intent::Question) => Decision::new(
                self.phrasing.introduce_and_ask(ctx),
                AwaitingConfirmation,
                Action::None,
                intent,
            ),
            Some(Intent::CallbackRequest) => Decision::new(
                self.phrasing.restate_balance(ctx),
                AwaitingConfirmation,
                Action::None,
                intent,
            ),
            _ => Decision::new(
                self.phrasing.ask_for_payment(ctx),
                AwaitingConfirmation,
                Action::None,
                intent,
            ),
        }
    }

    fn on_confirmation(&self, intent: Option<Intent>, ctx: &SpeechContext) -> Decision {
        use ConversationState::*;

        match intent {
            Some(
                i @ (Intent::HumanRequest
                | Intent::Dispute
                | Intent::Positive
                | Intent::PaymentCommitment),
            ) => self.transfer(i),
            Some(Intent::Negative) => Decision::new(
                self.phrasing.ask_for_follow_up_day(),
                AwaitingDate,
                Action::None,
                intent,
            ),
            Some(Intent::CallbackRequest) => Decision::new(
                self.phrasing.ask_for_callback_day(),
                AwaitingDate,
                Action::None,
                intent,
            ),
            Some(Intent::Question) => Decision::new(
                self.phrasing.restate_balance(ctx),
                AwaitingConfirmation,
                Action::None,
                intent,
            ),
            _ => Decision::new(
                self.phrasing.ask_for_better_time(),
                AwaitingDate,
                Action::None,
                intent,
            ),
        }
    }

    fn on_date(&self, intent: Option<Intent>, utterance: &str, today: NaiveDate) -> Decision {
        use ConversationState::*;

        match intent {
            Some(i @ Intent::HumanRequest) => self.transfer(i),
            Some(Intent::Negative) => Decision::new(
                self.phrasing.decline_goodbye(),
                Ended,
                Action::EndCall,
                intent,
            ),
            Some(Intent::FarFuture) => self.refuse_far_future(intent),
            Some(Intent::CallbackRequest) => {
                let guess = infer_follow_up_date(today, utterance);
                if !self.within_horizon(today, guess.date) {
                    return self.refuse_far_future(Some(Intent::FarFuture));
                }
                Decision::new(
                    self.phrasing.follow_up_scheduled(guess.date),
                    Closing,
                    Action::FollowUp {
                        date: guess.date,
                        reason: format!("Customer requested a callback for {}", guess.label),
                    },
                    intent,
                )
            }
            _ => {
                let date = today.checked_add_days(Days::new(1)).unwrap_or(today);
                Decision::new(
                    self.phrasing.follow_up_default(date),
                    Closing,
                    Action::FollowUp {
                        date,
                        reason: "No specific date given; defaulted to next day".to_string(),
                    },
                    intent,
                )
            }
        }
    }

    fn refuse_far_future(&self, intent: Option<Intent>) -> Decision {
        Decision::new(
            self.phrasing.far_future(self.horizon_days),
            ConversationState::AwaitingDate,
            Action::None,
            intent,
        )
    }

    fn within_horizon(&self, today: NaiveDate, date: NaiveDate) -> bool {
        today
            .checked_add_days(Days::new(u64::from(self.horizon_days)))
            .is_none_or(|limit| date <= limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ConversationState::*;

    fn engine() -> DialogueEngine {
        DialogueEngine::with_defaults().unwrap()
    }

    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
    }

    fn payer() -> PayerContext {
        PayerContext {
            id: "1003".into(),
            name: "Adani Ports".into(),
            amount_due: Some(85000.0),
            currency_code: Some("USD".into()),
            last_status: None,
        }
    }

    #[test]
    fn test_busy_then_friday_schedules_follow_up() {
        let e = engine();
        let p = payer();

        let first = e.decide(GreetingResponse, "no I'm busy", Some(&p), monday());
        assert_eq!(first.next_state, AwaitingDate);
        assert_eq!(first.action, Action::None);

        let second = e.decide(first.next_state, "call me Friday", Some(&p), monday());
        assert_eq!(second.next_state, Closing);
        match second.action {
            Action::FollowUp { date, reason } => {
                assert_eq!(date, NaiveDate::from_ymd_opt(2024, 1, 5).unwrap());
                assert!(reason.contains("Friday"));
            }
            other => panic!("expected follow-up, got {other:?}"),
        }

        let third = e.decide(Closing, "no that's all", Some(&p), monday());
        assert_eq!(third.next_state, Ended);
        assert_eq!(third.action, Action::EndCall);
    }

    #[test]
    fn test_payment_commitment_transfers() {
        let e = engine();
        let d = e.decide(AwaitingConfirmation, "yes I will pay now", Some(&payer()), monday());
        assert_eq!(d.next_state, Ended);
        assert_eq!(d.action, Action::Transfer);
        assert!(d.response.contains("payments team"));
    }

    #[test]
    fn test_greeting_paths() {
        let e = engine();
        let p = payer();

        let d = e.decide(GreetingResponse, "yes this is me", Some(&p), monday());
        assert_eq!(d.next_state, AwaitingConfirmation);
        assert!(d.response.contains("eighty five thousand dollars"));

        let d = e.decide(GreetingResponse, "I want to speak to a person", Some(&p), monday());
        assert_eq!((d.next_state, d.action), (Ended, Action::Transfer));

        let d = e.decide(GreetingResponse, "that's not my debt", Some(&p), monday());
        assert_eq!(d.action, Action::Transfer);
        assert!(d.response.contains("specialist"));

        let d = e.decide(GreetingResponse, "mmm", Some(&p), monday());
        assert_eq!(d.next_state, AwaitingConfirmation);
        assert_eq!(d.intent, None);
    }

    #[test]
    fn test_confirmation_paths() {
        let e = engine();
        let p = payer();

        let d = e.decide(AwaitingConfirmation, "I can't right now", Some(&p), monday());
        assert_eq!((d.next_state, d.action), (AwaitingDate, Action::None));

        let d = e.decide(AwaitingConfirmation, "how much was it?", Some(&p), monday());
        assert_eq!(d.next_state, AwaitingConfirmation);
        assert!(d.response.contains("eighty five thousand dollars"));

        let d = e.decide(AwaitingConfirmation, "call me back next week", Some(&p), monday());
        assert_eq!(d.next_state, AwaitingDate);

        let d = e.decide(AwaitingConfirmation, "hmm", Some(&p), monday());
        assert_eq!(d.next_state, AwaitingDate);
    }

    #[test]
    fn test_date_paths() {
        let e = engine();

        let d = e.decide(AwaitingDate, "no thanks", None, monday());
        assert_eq!((d.next_state, d.action), (Ended, Action::EndCall));

        let d = e.decide(AwaitingDate, "put me through to a supervisor", None, monday());
        assert_eq!(d.action, Action::Transfer);

        let d = e.decide(AwaitingDate, "whenever suits you", None, monday());
        assert_eq!(d.next_state, Closing);
        assert_eq!(
            d.action,
            Action::FollowUp {
                date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
                reason: "No specific date given; defaulted to next day".into(),
            }
        );
    }

    #[test]
    fn test_far_future_is_refused() {
        let e = engine();

        let d = e.decide(AwaitingDate, "maybe next month", None, monday());
        assert_eq!((d.next_state, d.action.clone()), (AwaitingDate, Action::None));
        assert!(d.response.contains("30 days"));

        // Counted offsets past the horizon are refused too.
        let d = e.decide(AwaitingDate, "call me in 45 days", None, monday());
        assert_eq!(d.next_state, AwaitingDate);
        assert_eq!(d.intent, Some(Intent::FarFuture));

        let d = e.decide(AwaitingDate, "call me in 30 days", None, monday());
        assert_eq!(d.next_state, Closing);
    }

    #[test]
    fn test_ended_is_inert() {
        let e = engine();
        let d = e.decide(Ended, "hello?", None, monday());
        assert_eq!((d.next_state, d.action), (Ended, Action::None));
        assert!(!d.response.is_empty());
    }

    #[test]
    fn test_unmatched_input_always_gets_a_response() {
        let e = engine();
        for state in [GreetingResponse, AwaitingConfirmation, AwaitingDate, Closing, Ended] {
            for text in ["", "zzz qqq", "   "] {
                let d = e.decide(state, text, None, monday());
                assert!(!d.response.trim().is_empty(), "{state:?} / {text:?}");
            }
        }
    }

    #[test]
    fn test_decide_is_deterministic() {
        let e = engine();
        let p = payer();
        for state in [GreetingResponse, AwaitingConfirmation, AwaitingDate] {
            let a = e.decide(state, "maybe Thursday", Some(&p), monday());
            let b = e.decide(state, "maybe Thursday", Some(&p), monday());
            assert_eq!(a, b);
        }
    }

    #[test]
    fn test_fallback_phrasing_without_payer() {
        let e = engine();
        let greeting = e.greeting(None);
        assert!(greeting.contains("the customer"));
        assert!(greeting.contains("your outstanding balance"));
    }

    #[test]
    fn test_idle_goodbye_ends_call() {
        let d = engine().idle_goodbye();
        assert_eq!((d.next_state, d.action), (Ended, Action::EndCall));
    }
}
