use std::time::Instant;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Read-only snapshot of the payer being called.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayerContext {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount_due: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_status: Option<String>,
}

impl PayerContext {
    /// Display name, or `None` when the record has a blank name.
    pub fn display_name(&self) -> Option<&str> {
        let name = self.name.trim();
        (!name.is_empty()).then_some(name)
    }
}

/// How the next caller utterance is interpreted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationState {
    #[default]
    GreetingResponse,
    AwaitingConfirmation,
    AwaitingDate,
    Closing,
    /// Reached once a transfer or end-call action fires.
    Ended,
}

impl ConversationState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Ended)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::GreetingResponse => "greeting_response",
            Self::AwaitingConfirmation => "awaiting_confirmation",
            Self::AwaitingDate => "awaiting_date",
            Self::Closing => "closing",
            Self::Ended => "ended",
        }
    }
}

/// Side effect decided by the dialogue engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    #[default]
    None,
    Transfer,
    EndCall,
    FollowUp { date: NaiveDate, reason: String },
}

impl Action {
    /// Whether carrying out this action ends the session.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Transfer | Self::EndCall)
    }

    /// Same spelling as the serialized `type` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Transfer => "transfer",
            Self::EndCall => "end_call",
            Self::FollowUp { .. } => "follow_up",
        }
    }
}

/// One complete unit of caller speech after debouncing.
#[derive(Debug, Clone)]
pub struct Utterance {
    pub text: String,
    pub received_at: Instant,
}

impl Utterance {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            received_at: Instant::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Customer,
    Agent,
}

impl Role {
    pub fn label(self) -> &'static str {
        match self {
            Self::Customer => "Customer",
            Self::Agent => "Agent",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

/// Append-only record of what was said, used for post-call logging only.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversationHistory {
    turns: Vec<Turn>,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, role: Role, text: impl Into<String>) {
        self.turns.push(Turn {
            role,
            text: text.into(),
            timestamp: Utc::now(),
        });
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// All lines spoken by one side, newline separated.
    pub fn lines_for(&self, role: Role) -> String {
        self.turns
            .iter()
            .filter(|t| t.role == role)
            .map(|t| t.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// The full conversation as `Role: text` lines.
    pub fn render(&self) -> String {
        self.turns
            .iter()
            .map(|t| format!("{}: {}", t.role.label(), t.text))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
