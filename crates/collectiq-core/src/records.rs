//! Records written to the persistence collaborator at the end of a call.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// Outreach-history row for one call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutreachRecord {
    pub id: String,
    pub payer_id: String,
    pub call_id: String,
    pub outreach_type: String,
    pub outreach_date: DateTime<Utc>,
    pub status: OutreachStatus,
    pub response_received: bool,
    pub notes: String,
    pub body_text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutreachStatus {
    /// The caller engaged and an outcome was recorded.
    Responded,
    /// The call connected but nothing was agreed.
    Delivered,
    Transferred,
}

/// Call transcript and analysis row.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptRecord {
    pub id: String,
    pub payer_id: String,
    pub call_id: String,
    pub call_date: DateTime<Utc>,
    pub duration_secs: u64,
    pub transcript_agent: String,
    pub transcript_payer: String,
    pub full_transcript: String,
    pub call_conclusion: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_promise_date: Option<NaiveDate>,
    pub payment_promise_confirmed: bool,
    pub recommended_action: String,
}

/// Pending follow-up row.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowUpRecord {
    pub id: String,
    pub payer_id: String,
    pub original_call_id: String,
    pub scheduled_date: NaiveDate,
    pub scheduled_time: NaiveTime,
    pub reason: String,
    pub status: String,
}

/// Last-outreach status shown on the payer record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PayerStatus {
    #[serde(rename = "Follow-up Scheduled")]
    FollowUpScheduled,
    #[serde(rename = "Call Completed")]
    CallCompleted,
    #[serde(rename = "Transferred to Agent")]
    TransferredToAgent,
}

impl PayerStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FollowUpScheduled => "Follow-up Scheduled",
            Self::CallCompleted => "Call Completed",
            Self::TransferredToAgent => "Transferred to Agent",
        }
    }
}

/// Status update for a payer, as persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayerStatusUpdate {
    pub payer_id: String,
    pub status: PayerStatus,
    pub updated_at: DateTime<Utc>,
}
