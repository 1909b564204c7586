use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The asynchronous work a job represents (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    Build,
    Validate,
    Push,
}

/// A job's lifecycle position. Created jobs start `Pending`; acquiring a
/// worker slot moves them to `Running`; `Completed`/`Failed`/`Cancelled` are
/// terminal (§3, §4.C).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled)
    }
}

/// `{id, type, session id, status, created-at, started-at?, completed-at?,
/// duration?, progress, last-message, error?, result, log buffer, metadata}`
/// (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub job_type: JobType,
    pub session_id: String,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub progress: f32,
    pub last_message: String,
    pub error: Option<String>,
    pub result: Option<serde_json::Value>,
    pub log: Vec<String>,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Job {
    pub fn new(id: impl Into<String>, job_type: JobType, session_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            job_type,
            session_id: session_id.into(),
            status: JobStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            duration_ms: None,
            progress: 0.0,
            last_message: String::new(),
            error: None,
            result: None,
            log: Vec::new(),
            metadata: HashMap::new(),
        }
    }

    /// Recompute `duration_ms` from `started_at`/`completed_at` when both are
    /// set, as required whenever status becomes terminal (§4.C).
    pub fn recompute_duration(&mut self) {
        if let (Some(started), Some(completed)) = (self.started_at, self.completed_at) {
            self.duration_ms = Some((completed - started).num_milliseconds());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_job_starts_pending_with_zero_progress() {
        let job = Job::new("abc123", JobType::Build, "session-1");
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.progress, 0.0);
        assert!(job.completed_at.is_none());
    }

    #[test]
    fn recompute_duration_only_fires_when_both_timestamps_set() {
        let mut job = Job::new("abc123", JobType::Build, "session-1");
        job.recompute_duration();
        assert!(job.duration_ms.is_none());

        job.started_at = Some(Utc::now());
        job.recompute_duration();
        assert!(job.duration_ms.is_none());

        job.completed_at = job.started_at;
        job.recompute_duration();
        assert_eq!(job.duration_ms, Some(0));
    }

    #[test]
    fn terminal_statuses() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
    }
}
