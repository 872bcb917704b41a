//! Ordered, per-state intent classification rules.
//!
//! Each conversation state carries its own rule list. Rules are evaluated in
//! order against the normalized utterance and the first match wins, so more
//! specific intents (asking for a person, disputing the debt) sit ahead of
//! the generic yes/no patterns they would otherwise collide with.

use collectiq_core::types::ConversationState;
use regex::Regex;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    HumanRequest,
    Dispute,
    Negative,
    Positive,
    PaymentCommitment,
    CallbackRequest,
    Question,
    GreetingAck,
    IdentityConfirm,
    /// A follow-up date further out than we are allowed to schedule.
    FarFuture,
}

impl Intent {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::HumanRequest => "human_request",
            Self::Dispute => "dispute",
            Self::Negative => "negative",
            Self::Positive => "positive",
            Self::PaymentCommitment => "payment_commitment",
            Self::CallbackRequest => "callback_request",
            Self::Question => "question",
            Self::GreetingAck => "greeting_ack",
            Self::IdentityConfirm => "identity_confirm",
            Self::FarFuture => "far_future",
        }
    }
}

const HUMAN: &str = r"\b(human|real person|live person|actual person|representative|operator|supervisor|manager|specialist)\b|\b(speak|talk) (to|with) (a |an |the |your )?(person|someone|somebody|agent|human|rep)\b";

const DISPUTE: &str = r"\b(dispute|disputed|disputing|not my (debt|bill|account|invoice|balance)|(don't|do not|dont) owe|never (owed|received|ordered|signed)|wrong (amount|account|person|number|invoice)|incorrect|already paid|paid (it|this|that) already|scam|fraud|mistake)\b";

/// Phrases containing "no" that mean yes.
const POSITIVE_IDIOM: &str = r"\b(no problem|no worries|no issue|of course|why not)\b";

const NEGATIVE: &str = r"\b(no|nope|nah|not now|not today|not really|busy|(can't|cannot|can not|cant)|(won't|will not|wont)|(don't|do not|dont)|unable|not able|bad time|not a good time)\b";

const CALLBACK: &str = r"\b(call (me )?back|callback|call me (later|another|on|next|in)|later|another (day|time)|tomorrow|next week|few days|couple (of )?days|weekend|monday|tuesday|wednesday|thursday|friday|saturday|sunday|end of (the )?month|tonight|this (evening|afternoon)|in \w+ (days?|weeks?))\b";

const PAYMENT_COMMIT: &str = r"\b(pay (it |that |this )?(now|today|right now|right away|immediately)|make (a |the )?payment|pay (the )?(full|balance|amount|whole|everything)|i will pay|i'll pay|ready to pay|want to pay|settle (it|this|the))\b";

const POSITIVE: &str = r"\b(yes|yeah|yep|yup|yea|sure|okay|ok|alright|all right|fine|go ahead|correct|right|absolutely|definitely|certainly|please do|good time)\b";

const QUESTION: &str = r"\?|^(what|who|why|how|which|where|is this|are you|can you|could you)\b|\b(who is this|who are you|what is this|what's this|what company|how much|which invoice|what for)\b";

const IDENTITY: &str = r"\b(speaking|this is (he|she|him|her|me)|that's me|that is me|it's me|you've got (him|her|me)|you have (him|her|me))\b";

const GREETING_ACK: &str = r"^(hi|hello|hey|good (morning|afternoon|evening)|yes hello)\b";

const FAR_FUTURE: &str = r"\b(next (month|year|quarter)|in (a|one|two|three|four|five|six|seven|eight|nine|ten|eleven|twelve|\d+) (months?|years?)|months from now|after the holidays|sometime next year)\b";

/// One pattern mapped to an intent.
#[derive(Debug, Clone)]
pub struct IntentRule {
    pub intent: Intent,
    pattern: Regex,
}

impl IntentRule {
    pub fn new(intent: Intent, pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            intent,
            pattern: Regex::new(pattern)?,
        })
    }

    pub fn matches(&self, normalized: &str) -> bool {
        self.pattern.is_match(normalized)
    }
}

/// Rule lists for each state that accepts input.
#[derive(Debug, Clone)]
pub struct RuleSet {
    greeting: Vec<IntentRule>,
    confirmation: Vec<IntentRule>,
    date: Vec<IntentRule>,
}

fn compile(rules: &[(Intent, &str)]) -> Result<Vec<IntentRule>, regex::Error> {
    rules
        .iter()
        .map(|(intent, pattern)| IntentRule::new(*intent, pattern))
        .collect()
}

impl RuleSet {
    /// The production rule tables.
    pub fn standard() -> Result<Self, regex::Error> {
        use Intent::*;

        let greeting = compile(&[
            (HumanRequest, HUMAN),
            (Dispute, DISPUTE),
            (Positive, POSITIVE_IDIOM),
            (Negative, NEGATIVE),
            (CallbackRequest, CALLBACK),
            (PaymentCommitment, PAYMENT_COMMIT),
            (Question, QUESTION),
            (IdentityConfirm, IDENTITY),
            (Positive, POSITIVE),
            (GreetingAck, GREETING_ACK),
        ])?;

        let confirmation = compile(&[
            (HumanRequest, HUMAN),
            (Dispute, DISPUTE),
            (Positive, POSITIVE_IDIOM),
            (Negative, NEGATIVE),
            (CallbackRequest, CALLBACK),
            (PaymentCommitment, PAYMENT_COMMIT),
            (Question, QUESTION),
            (Positive, POSITIVE),
        ])?;

        let date = compile(&[
            (HumanRequest, HUMAN),
            (FarFuture, FAR_FUTURE),
            (CallbackRequest, CALLBACK),
            (Negative, NEGATIVE),
        ])?;

        Ok(Self {
            greeting,
            confirmation,
            date,
        })
    }

    /// Rules consulted in `state`. Closing and ended accept any input.
    pub fn rules_for(&self, state: ConversationState) -> &[IntentRule] {
        match state {
            ConversationState::GreetingResponse => &self.greeting,
            ConversationState::AwaitingConfirmation => &self.confirmation,
            ConversationState::AwaitingDate => &self.date,
            ConversationState::Closing | ConversationState::Ended => &[],
        }
    }

    /// First matching intent for `utterance` in `state`.
    pub fn classify(&self, state: ConversationState, utterance: &str) -> Option<Intent> {
        let text = normalize(utterance);
        self.rules_for(state)
            .iter()
            .find(|rule| rule.matches(&text))
            .map(|rule| rule.intent)
    }
}

/// Lowercase, unify apostrophes, drop punctuation other than `?` and `'`,
/// and collapse whitespace.
pub fn normalize(utterance: &str) -> String {
    let cleaned: String = utterance
        .chars()
        .map(|c| match c {
            '\u{2019}' | '\u{2018}' | '`' => '\'',
            c if c.is_alphanumeric() || c == '\'' || c == '?' => c,
            _ => ' ',
        })
        .collect::<String>()
        .to_lowercase();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}
