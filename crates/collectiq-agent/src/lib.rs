//! Dialogue engine for outbound collections calls.
//!
//! The engine is a deterministic decision function: given the current
//! [`ConversationState`](collectiq_core::types::ConversationState), a caller
//! utterance and the payer snapshot, it classifies intent with ordered
//! per-state pattern rules and returns the spoken response, the next state
//! and an optional [`Action`](collectiq_core::types::Action) for the caller
//! to execute. It performs no I/O and never reads the system clock.

pub mod amount;
pub mod dates;
pub mod engine;
pub mod intent;
pub mod phrasing;

pub use engine::{Decision, DialogueEngine};
pub use intent::{Intent, RuleSet};
