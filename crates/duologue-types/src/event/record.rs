use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::payload::{EventKind, EventPayload};

/// One event as it appears on a JSONL line.
///
/// `sequence` is strictly monotonically increasing within one conversation's
/// log and assigned atomically by the bus before any subscriber or writer
/// observes the event. Events without a `conversation_id` are experiment-level
/// and land in `experiment.jsonl`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub sequence: u64,

    /// Event timestamp (UTC, ISO-8601 on the wire)
    pub timestamp: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<Uuid>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experiment_id: Option<Uuid>,

    /// Event type and content (flattened enum)
    #[serde(flatten)]
    pub payload: EventPayload,

    /// Provider-specific raw data and debug information
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl EventRecord {
    pub fn kind(&self) -> EventKind {
        self.payload.kind()
    }

    /// Serialize to one JSONL line (no trailing newline)
    pub fn to_jsonl(&self) -> crate::error::Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse one JSONL line
    pub fn from_jsonl(line: &str) -> crate::error::Result<Self> {
        Ok(serde_json::from_str(line)?)
    }
}
