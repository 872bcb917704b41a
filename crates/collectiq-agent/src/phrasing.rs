//! What the agent says.

use chrono::NaiveDate;
use collectiq_core::types::{ConversationState, PayerContext};

use crate::amount::verbalize;

const UNKNOWN_NAME: &str = "the customer";
const UNKNOWN_BALANCE: &str = "your outstanding balance";

/// Payer-derived fragments used in spoken responses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeechContext {
    pub name: String,
    /// e.g. "your outstanding balance of eighty five thousand dollars"
    pub balance: String,
}

impl SpeechContext {
    pub fn from_payer(payer: Option<&PayerContext>) -> Self {
        let name = payer
            .and_then(PayerContext::display_name)
            .unwrap_or(UNKNOWN_NAME)
            .to_string();

        let balance = match payer.and_then(|p| p.amount_due) {
            Some(amount) => {
                let currency = payer
                    .and_then(|p| p.currency_code.as_deref())
                    .unwrap_or("");
                format!("{UNKNOWN_BALANCE} of {}", verbalize(amount, currency))
            }
            None => UNKNOWN_BALANCE.to_string(),
        };

        Self { name, balance }
    }
}

/// Response templates for one agent persona.
#[derive(Debug, Clone)]
pub struct Phrasing {
    agent_name: String,
}

impl Phrasing {
    pub fn new(agent_name: impl Into<String>) -> Self {
        Self {
            agent_name: agent_name.into(),
        }
    }

    pub fn agent_name(&self) -> &str {
        &self.agent_name
    }

    pub fn greeting(&self, ctx: &SpeechContext) -> String {
        format!(
            "Hello, this call is for {}. This is {} calling about {}. Is now a good time to talk?",
            ctx.name, self.agent_name, ctx.balance
        )
    }

    pub fn ask_for_payment(&self, ctx: &SpeechContext) -> String {
        format!(
            "Thank you. Our records show {}. Would you be able to make a payment today?",
            ctx.balance
        )
    }

    pub fn introduce_and_ask(&self, ctx: &SpeechContext) -> String {
        format!(
            "I'm calling from {} about {}. Would you be able to make a payment today?",
            self.agent_name, ctx.balance
        )
    }

    pub fn restate_balance(&self, ctx: &SpeechContext) -> String {
        format!(
            "Of course. You currently have {}. Would you be able to make a payment today?",
            ctx.balance
        )
    }

    pub fn ask_for_better_time(&self) -> String {
        "No problem. When would be a better day for us to follow up with you?".to_string()
    }

    pub fn ask_for_callback_day(&self) -> String {
        "Sure. Which day should we call you back?".to_string()
    }

    pub fn ask_for_follow_up_day(&self) -> String {
        "I understand. What day would work best for us to follow up?".to_string()
    }

    pub fn transfer_to_specialist(&self) -> String {
        "Of course. I'm transferring you to a specialist now. Please hold.".to_string()
    }

    pub fn transfer_dispute(&self) -> String {
        "I understand you have a concern about this balance. Let me connect you with a specialist who can review it with you. Please hold.".to_string()
    }

    pub fn transfer_to_payments(&self) -> String {
        "Great, thank you. I'll connect you to our payments team now to complete your payment. Please hold.".to_string()
    }

    pub fn follow_up_scheduled(&self, date: NaiveDate) -> String {
        format!(
            "Thank you. I've scheduled a follow-up for {}. Is there anything else I can help you with?",
            date.format("%A, %B %-d")
        )
    }

    pub fn follow_up_default(&self, date: NaiveDate) -> String {
        format!(
            "Thank you. We'll follow up with you tomorrow, {}. Is there anything else I can help you with?",
            date.format("%A, %B %-d")
        )
    }

    pub fn far_future(&self, horizon_days: u32) -> String {
        format!(
            "I'm sorry, we can only schedule a follow-up within the next {horizon_days} days. Could you choose a day within that time?"
        )
    }

    pub fn decline_goodbye(&self) -> String {
        "I understand. We'll reach out again soon. Thank you for your time. Goodbye.".to_string()
    }

    pub fn goodbye(&self, ctx: &SpeechContext) -> String {
        format!("Thank you for your time, {}. Goodbye.", ctx.name)
    }

    pub fn reprompt(&self, state: ConversationState, ctx: &SpeechContext) -> String {
        match state {
            ConversationState::GreetingResponse => format!(
                "Are you still there? I'm calling about {}. Is now a good time to talk?",
                ctx.balance
            ),
            ConversationState::AwaitingConfirmation => {
                "Are you still there? Would you be able to make a payment today?".to_string()
            }
            ConversationState::AwaitingDate => {
                "Are you still there? What day would work best for a follow-up?".to_string()
            }
            ConversationState::Closing => "Is there anything else I can help you with?".to_string(),
            ConversationState::Ended => self.goodbye(ctx),
        }
    }

    pub fn idle_goodbye(&self) -> String {
        "It seems we've lost the connection. We'll try you again later. Goodbye.".to_string()
    }
}
