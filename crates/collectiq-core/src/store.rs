//! JSON-file persistence: payer lookup plus append-only JSONL call records.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{CollectIqError, Result};
use crate::ports::{OutreachStore, PayerDirectory};
use crate::records::{FollowUpRecord, OutreachRecord, PayerStatus, PayerStatusUpdate, TranscriptRecord};
use crate::types::PayerContext;

/// File-based store.
///
/// Layout:
/// - `<base>/payers.json`: array of `PayerContext`
/// - `<base>/outreach.jsonl`, `<base>/transcripts.jsonl`, `<base>/followups.jsonl`
/// - `<base>/payer_status.json`: latest status per payer id
pub struct JsonFileStore {
    base: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(base: PathBuf) -> Self {
        Self {
            base,
            write_lock: Mutex::new(()),
        }
    }

    fn payers_path(&self) -> PathBuf {
        self.base.join("payers.json")
    }

    fn outreach_path(&self) -> PathBuf {
        self.base.join("outreach.jsonl")
    }

    fn transcripts_path(&self) -> PathBuf {
        self.base.join("transcripts.jsonl")
    }

    fn followups_path(&self) -> PathBuf {
        self.base.join("followups.jsonl")
    }

    fn status_path(&self) -> PathBuf {
        self.base.join("payer_status.json")
    }

    async fn append<T: Serialize>(&self, path: PathBuf, record: &T) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        tokio::fs::create_dir_all(&self.base).await?;
        let mut line = serde_json::to_string(record)?;
        line.push('\n');
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    async fn read_lines<T: DeserializeOwned>(&self, path: PathBuf) -> Result<Vec<T>> {
        if !path.exists() {
            return Ok(Vec::new());
        }
        let data = tokio::fs::read_to_string(&path).await?;
        let mut records = Vec::new();
        for line in data.lines() {
            if line.trim().is_empty() {
                continue;
            }
            let record: T = serde_json::from_str(line).map_err(|e| {
                CollectIqError::Persistence(format!("corrupt line in {}: {e}", path.display()))
            })?;
            records.push(record);
        }
        Ok(records)
    }

    pub async fn outreach(&self) -> Result<Vec<OutreachRecord>> {
        self.read_lines(self.outreach_path()).await
    }

    pub async fn transcripts(&self) -> Result<Vec<TranscriptRecord>> {
        self.read_lines(self.transcripts_path()).await
    }

    pub async fn follow_ups(&self) -> Result<Vec<FollowUpRecord>> {
        self.read_lines(self.followups_path()).await
    }

    pub async fn payer_statuses(&self) -> Result<HashMap<String, PayerStatusUpdate>> {
        let path = self.status_path();
        if !path.exists() {
            return Ok(HashMap::new());
        }
        let data = tokio::fs::read_to_string(&path).await?;
        Ok(serde_json::from_str(&data)?)
    }
}

#[async_trait]
impl PayerDirectory for JsonFileStore {
    async fn get_payer(&self, id: &str) -> Result<Option<PayerContext>> {
        let path = self.payers_path();
        if !path.exists() {
            return Ok(None);
        }
        let data = tokio::fs::read_to_string(&path).await?;
        let payers: Vec<PayerContext> = serde_json::from_str(&data)?;
        let payer = payers.into_iter().find(|p| p.id == id);
        debug!(payer_id = id, found = payer.is_some(), "Payer lookup");
        Ok(payer)
    }
}

#[async_trait]
impl OutreachStore for JsonFileStore {
    async fn log_outreach(&self, record: &OutreachRecord) -> Result<()> {
        self.append(self.outreach_path(), record).await
    }

    async fn log_transcript(&self, record: &TranscriptRecord) -> Result<()> {
        self.append(self.transcripts_path(), record).await
    }

    async fn transcript_exists(&self, call_id: &str) -> Result<bool> {
        let transcripts: Vec<TranscriptRecord> = self.read_lines(self.transcripts_path()).await?;
        Ok(transcripts.iter().any(|t| t.call_id == call_id))
    }

    async fn update_payer_status(&self, payer_id: &str, status: PayerStatus) -> Result<()> {
        // Covers the whole read-modify-write.
        let _guard = self.write_lock.lock().await;
        let mut statuses = self.payer_statuses().await?;
        statuses.insert(
            payer_id.to_string(),
            PayerStatusUpdate {
                payer_id: payer_id.to_string(),
                status,
                updated_at: Utc::now(),
            },
        );
        tokio::fs::create_dir_all(&self.base).await?;
        let path = self.status_path();
        // Atomic write: write to temp then rename
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_string_pretty(&statuses)?).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn schedule_follow_up(&self, record: &FollowUpRecord) -> Result<()> {
        self.append(self.followups_path(), record).await
    }
}
