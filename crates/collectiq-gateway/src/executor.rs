//! Carries out dialogue actions: persistence writes, transfers, hang-ups.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use tracing::{debug, info, warn};

use collectiq_core::error::CollectIqError;
use collectiq_core::ports::{CallControl, OutreachStore};
use collectiq_core::records::{
    FollowUpRecord, OutreachRecord, OutreachStatus, PayerStatus, TranscriptRecord,
};
use collectiq_core::types::{Action, ConversationHistory, Role};

use crate::sink::CarrierSink;

/// How a call finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOutcome {
    /// The agent closed the call.
    Completed,
    Transferred,
    /// A transfer was requested but the carrier could not redirect the call.
    TransferFailed,
    /// The carrier ended the stream, or the socket dropped.
    Disconnected,
}

impl CallOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Transferred => "transferred",
            Self::TransferFailed => "transfer_failed",
            Self::Disconnected => "disconnected",
        }
    }
}

/// Snapshot of the call used to build persisted records.
#[derive(Debug, Clone)]
pub struct CallSummary {
    pub call_sid: Option<String>,
    pub payer_id: Option<String>,
    pub history: ConversationHistory,
    pub started_at: DateTime<Utc>,
    pub duration_secs: u64,
}

impl CallSummary {
    fn customer_spoke(&self) -> bool {
        self.history.turns().iter().any(|t| t.role == Role::Customer)
    }
}

pub struct ActionExecutor {
    store: Arc<dyn OutreachStore>,
    call_control: Option<Arc<dyn CallControl>>,
    transfer_number: Option<String>,
    sink: CarrierSink,
    logged: bool,
}

impl ActionExecutor {
    pub fn new(
        store: Arc<dyn OutreachStore>,
        call_control: Option<Arc<dyn CallControl>>,
        transfer_number: Option<String>,
        sink: CarrierSink,
    ) -> Self {
        Self {
            store,
            call_control,
            transfer_number,
            sink,
            logged: false,
        }
    }

    /// Whether the outcome of this call has been persisted.
    pub fn is_logged(&self) -> bool {
        self.logged
    }

    /// Perform `action`. Returns the outcome when the action ends the call.
    pub async fn execute(&mut self, action: &Action, summary: &CallSummary) -> Option<CallOutcome> {
        match action {
            Action::None => None,
            Action::FollowUp { date, reason } => {
                self.schedule_follow_up(*date, reason, summary).await;
                None
            }
            Action::Transfer => {
                let outcome = self.transfer(summary).await;
                self.sink.close();
                self.flush(outcome, summary).await;
                Some(outcome)
            }
            Action::EndCall => {
                self.flush(CallOutcome::Completed, summary).await;
                self.sink.close();
                Some(CallOutcome::Completed)
            }
        }
    }

    async fn transfer(&self, summary: &CallSummary) -> CallOutcome {
        let Some(call_sid) = summary.call_sid.as_deref() else {
            warn!("Transfer requested before the carrier reported a call sid");
            return CallOutcome::TransferFailed;
        };
        let (Some(control), Some(number)) = (&self.call_control, self.transfer_number.as_deref())
        else {
            warn!(call_sid, "Transfer requested but call control is not configured");
            return CallOutcome::TransferFailed;
        };

        match control.transfer_call(call_sid, number).await {
            Ok(()) => CallOutcome::Transferred,
            Err(e) => {
                warn!(call_sid, error = %e, "Transfer failed");
                record_error(&e);
                CallOutcome::TransferFailed
            }
        }
    }

    /// Persist a confirmed follow-up. Each write is attempted independently;
    /// returns how many failed.
    pub async fn schedule_follow_up(
        &mut self,
        date: NaiveDate,
        reason: &str,
        summary: &CallSummary,
    ) -> usize {
        let Some((call_sid, payer_id)) = ids(summary) else {
            warn!(%date, "Follow-up decided without call or payer id; not persisted");
            return 0;
        };

        let mut failures = 0;
        let follow_up = FollowUpRecord {
            id: uuid::Uuid::new_v4().to_string(),
            payer_id: payer_id.to_string(),
            original_call_id: call_sid.to_string(),
            scheduled_date: date,
            scheduled_time: NaiveTime::from_hms_opt(10, 0, 0).unwrap_or_default(),
            reason: reason.to_string(),
            status: "pending".into(),
        };
        if let Err(e) = self.store.schedule_follow_up(&follow_up).await {
            warn!(call_sid, error = %e, "Failed to schedule follow-up");
            record_error(&e);
            failures += 1;
        }

        let outreach = outreach_record(
            summary,
            call_sid,
            payer_id,
            OutreachStatus::Responded,
            format!("Follow-up scheduled for {date}"),
        );
        if let Err(e) = self.store.log_outreach(&outreach).await {
            warn!(call_sid, error = %e, "Failed to log outreach");
            record_error(&e);
            failures += 1;
        }

        if let Err(e) = self
            .store
            .update_payer_status(payer_id, PayerStatus::FollowUpScheduled)
            .await
        {
            warn!(call_sid, error = %e, "Failed to update payer status");
            record_error(&e);
            failures += 1;
        }

        let transcript = TranscriptRecord {
            payment_promise_date: Some(date),
            payment_promise_confirmed: true,
            ..transcript_record(
                summary,
                call_sid,
                payer_id,
                format!("Customer agreed to a follow-up on {date}"),
                "Follow up on scheduled date".into(),
            )
        };
        if let Err(e) = self.store.log_transcript(&transcript).await {
            warn!(call_sid, error = %e, "Failed to log transcript");
            record_error(&e);
            failures += 1;
        }

        self.logged = true;
        info!(call_sid, payer_id, %date, failures, "Follow-up recorded");
        failures
    }

    /// Persist the call outcome once. Skipped when this call already has a
    /// transcript, whether written here or elsewhere. Returns whether records
    /// were written.
    pub async fn flush(&mut self, outcome: CallOutcome, summary: &CallSummary) -> bool {
        if self.logged {
            debug!(outcome = outcome.as_str(), "Call outcome already logged");
            return false;
        }
        let Some((call_sid, payer_id)) = ids(summary) else {
            warn!(outcome = outcome.as_str(), "No call or payer id; outcome not persisted");
            self.logged = true;
            return false;
        };

        match self.store.transcript_exists(call_sid).await {
            Ok(true) => {
                debug!(call_sid, "Transcript already present, skipping outcome log");
                self.logged = true;
                return false;
            }
            Ok(false) => {}
            Err(e) => {
                warn!(call_sid, error = %e, "Transcript lookup failed; logging anyway");
                record_error(&e);
            }
        }
        self.logged = true;

        let (status, notes, conclusion, recommended, payer_status) = match outcome {
            CallOutcome::Completed => (
                if summary.customer_spoke() {
                    OutreachStatus::Responded
                } else {
                    OutreachStatus::Delivered
                },
                "Call completed",
                "Call completed by agent",
                "No action required",
                PayerStatus::CallCompleted,
            ),
            CallOutcome::Transferred => (
                OutreachStatus::Transferred,
                "Transferred to specialist",
                "Customer transferred to a specialist",
                "Specialist to follow up",
                PayerStatus::TransferredToAgent,
            ),
            CallOutcome::TransferFailed => (
                OutreachStatus::Responded,
                "Transfer requested but not completed",
                "Customer asked for a specialist; transfer failed",
                "Call back and connect to a specialist",
                PayerStatus::CallCompleted,
            ),
            CallOutcome::Disconnected => (
                OutreachStatus::Delivered,
                "Call ended by carrier",
                "Call ended before an outcome was agreed",
                "Retry outreach",
                PayerStatus::CallCompleted,
            ),
        };

        let transcript =
            transcript_record(summary, call_sid, payer_id, conclusion.into(), recommended.into());
        if let Err(e) = self.store.log_transcript(&transcript).await {
            warn!(call_sid, error = %e, "Failed to log transcript");
            record_error(&e);
        }

        let outreach = outreach_record(summary, call_sid, payer_id, status, notes.into());
        if let Err(e) = self.store.log_outreach(&outreach).await {
            warn!(call_sid, error = %e, "Failed to log outreach");
            record_error(&e);
        }

        if let Err(e) = self.store.update_payer_status(payer_id, payer_status).await {
            warn!(call_sid, error = %e, "Failed to update payer status");
            record_error(&e);
        }

        info!(call_sid, payer_id, outcome = outcome.as_str(), "Call outcome logged");
        true
    }
}

fn ids(summary: &CallSummary) -> Option<(&str, &str)> {
    Some((summary.call_sid.as_deref()?, summary.payer_id.as_deref()?))
}

fn outreach_record(
    summary: &CallSummary,
    call_sid: &str,
    payer_id: &str,
    status: OutreachStatus,
    notes: String,
) -> OutreachRecord {
    OutreachRecord {
        id: uuid::Uuid::new_v4().to_string(),
        payer_id: payer_id.to_string(),
        call_id: call_sid.to_string(),
        outreach_type: "call".into(),
        outreach_date: summary.started_at,
        status,
        response_received: summary.customer_spoke(),
        notes,
        body_text: summary.history.lines_for(Role::Agent),
    }
}

fn transcript_record(
    summary: &CallSummary,
    call_sid: &str,
    payer_id: &str,
    conclusion: String,
    recommended_action: String,
) -> TranscriptRecord {
    TranscriptRecord {
        id: uuid::Uuid::new_v4().to_string(),
        payer_id: payer_id.to_string(),
        call_id: call_sid.to_string(),
        call_date: summary.started_at,
        duration_secs: summary.duration_secs,
        transcript_agent: summary.history.lines_for(Role::Agent),
        transcript_payer: summary.history.lines_for(Role::Customer),
        full_transcript: summary.history.render(),
        call_conclusion: conclusion,
        payment_promise_date: None,
        payment_promise_confirmed: false,
        recommended_action,
    }
}

fn record_error(_error: &CollectIqError) {
    #[cfg(feature = "metrics")]
    crate::metrics::record_collaborator_error(_error.kind());
}
