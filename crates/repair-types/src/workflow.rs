use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Status of a persisted workflow session (§3, §4.B).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
}

/// `{id, workflow id, status, start time, end time?, execution context,
/// metadata}` (§3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSession {
    pub id: String,
    pub workflow_id: String,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub execution_context: serde_json::Value,
    pub metadata: HashMap<String, serde_json::Value>,
    /// Stage ids known to have failed in this session, consulted by the
    /// recovery-strategy derivation (`retry_failed`).
    #[serde(default)]
    pub failed_stages: Vec<String>,
}

/// `{session id, stage id, timestamp, state snapshot}` (§3). Keys
/// (`sessionId_stageId_unixNanoTimestamp`) sort lexicographically into
/// timestamp order when the nanosecond component is zero-padded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub session_id: String,
    pub stage_id: String,
    pub timestamp: DateTime<Utc>,
    pub state_snapshot: serde_json::Value,
}

impl Checkpoint {
    /// `sessionId_stageId_unixNanoTimestamp`, zero-padded to 19 digits so
    /// lexicographic and timestamp order agree (§8 round-trip property).
    pub fn key(&self) -> String {
        let nanos = self.timestamp.timestamp_nanos_opt().unwrap_or_default();
        format!("{}_{}_{:019}", self.session_id, self.stage_id, nanos)
    }
}

/// `{id, session id, event type, stage id?, tool name?, timestamp,
/// duration?, success, error?, data}` (§3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEvent {
    pub id: String,
    pub session_id: String,
    pub event_type: String,
    pub stage_id: Option<String>,
    pub tool_name: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub duration_ms: Option<i64>,
    pub success: bool,
    pub error: Option<String>,
    pub data: serde_json::Value,
}

impl HistoryEvent {
    /// Builds a new history event with a freshly generated id, matching
    /// the teacher's `audit/mod.rs` use of `Uuid::new_v4()` for run ids.
    pub fn new(session_id: impl Into<String>, event_type: impl Into<String>, stage_id: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.into(),
            event_type: event_type.into(),
            stage_id,
            tool_name: None,
            timestamp: Utc::now(),
            duration_ms: None,
            success: true,
            error: None,
            data: serde_json::json!({}),
        }
    }
}

/// Recovery strategy derived by session recovery (§4.B).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryStrategy {
    Restart,
    Resume,
    RetryFailed,
    ResumeStale,
    Wait,
    Completed,
}
