use crate::pipeline::PipelineError;
use crate::store::AuditStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::{error, info};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditStatus {
    Success,
    Failed,
}

impl AuditStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditStatus::Success => "success",
            AuditStatus::Failed => "failed",
        }
    }
}

/// One generation attempt. The only durable trace of failed generations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    pub id: String,
    pub input: String,
    pub result: Value,
    pub status: AuditStatus,
    pub created_at: DateTime<Utc>,
}

impl AuditRecord {
    pub fn success(input: String, merged: &Map<String, Value>) -> Self {
        Self::new(input, Value::Object(merged.clone()), AuditStatus::Success)
    }

    /// `payload` is the merged model output when generation got that far, so a
    /// draft lost to a catalog write failure can still be recovered by hand.
    pub fn failure(input: String, err: &PipelineError, payload: Option<&Map<String, Value>>) -> Self {
        let mut result = json!({
            "error": err.detail(),
            "stage": err.stage(),
        });
        if let Some(raw) = err.raw_output() {
            result["rawOutput"] = Value::String(raw.to_string());
        }
        if let Some(payload) = payload {
            result["payload"] = Value::Object(payload.clone());
        }
        Self::new(input, result, AuditStatus::Failed)
    }

    fn new(input: String, result: Value, status: AuditStatus) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            input,
            result,
            status,
            created_at: Utc::now(),
        }
    }
}

/// Write the record. A failing audit store is logged and never changes the
/// outcome reported to the caller.
pub async fn record(store: &dyn AuditStore, record: AuditRecord) {
    match store.append(&record).await {
        Ok(()) => info!(
            target = "estate.audit",
            audit_id = %record.id,
            status = record.status.as_str(),
            input = %record.input,
            "generation_audited"
        ),
        Err(err) => error!(
            target = "estate.audit",
            audit_id = %record.id,
            status = record.status.as_str(),
            input = %record.input,
            error = %err,
            result = %record.result,
            "audit_write_failed"
        ),
    }
}
