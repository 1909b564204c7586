//! Durable workflow persistence — the optional extension of Component B
//! (§4.B). Backs the `{sessions, checkpoints, specs, templates, history}`
//! key/value buckets with `libsql`, an embedded transactional store already
//! in the corpus's dependency stack. The disk format itself is
//! implementation-defined per §9; the engine only needs the per-bucket
//! key/value contract, which this type provides over five simple tables.

use std::path::Path;

use chrono::{Duration as ChronoDuration, Utc};
use libsql::params;
use repair_types::{Checkpoint, EngineError, ErrorKind, HistoryEvent, RecoveryStrategy, SessionStatus, WorkflowSession};

/// Staleness threshold used by recovery-strategy derivation: a `Running`
/// session whose last activity is older than this is `resume_stale` (§4.B).
const STALE_THRESHOLD: ChronoDuration = ChronoDuration::minutes(10);

pub struct WorkflowStore {
    conn: libsql::Connection,
}

impl WorkflowStore {
    pub async fn open(path: &Path) -> Result<Self, EngineError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                EngineError::new(ErrorKind::Filesystem, "create_dir_failed", e.to_string())
            })?;
        }
        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(store_error("open_store_failed"))?;
        let conn = db.connect().map_err(store_error("connect_store_failed"))?;

        for ddl in [
            "CREATE TABLE IF NOT EXISTS workflow_sessions (key TEXT PRIMARY KEY, value TEXT NOT NULL)",
            "CREATE TABLE IF NOT EXISTS workflow_checkpoints (key TEXT PRIMARY KEY, session_id TEXT NOT NULL, value TEXT NOT NULL)",
            "CREATE TABLE IF NOT EXISTS workflow_specs (key TEXT PRIMARY KEY, value TEXT NOT NULL)",
            "CREATE TABLE IF NOT EXISTS workflow_templates (key TEXT PRIMARY KEY, value TEXT NOT NULL)",
            "CREATE TABLE IF NOT EXISTS workflow_history (key TEXT PRIMARY KEY, session_id TEXT NOT NULL, value TEXT NOT NULL)",
        ] {
            conn.execute(ddl, ()).await.map_err(store_error("create_table_failed"))?;
        }

        Ok(Self { conn })
    }

    pub async fn put_session(&self, session: &WorkflowSession) -> Result<(), EngineError> {
        let value = serde_json::to_string(session).map_err(serialize_error)?;
        self.conn
            .execute(
                "INSERT OR REPLACE INTO workflow_sessions (key, value) VALUES (?1, ?2)",
                params![session.id.clone(), value],
            )
            .await
            .map_err(store_error("put_session_failed"))?;
        Ok(())
    }

    pub async fn get_session(&self, id: &str) -> Result<Option<WorkflowSession>, EngineError> {
        self.get_one("workflow_sessions", id).await
    }

    pub async fn put_checkpoint(&self, checkpoint: &Checkpoint) -> Result<(), EngineError> {
        let key = checkpoint.key();
        let value = serde_json::to_string(checkpoint).map_err(serialize_error)?;
        self.conn
            .execute(
                "INSERT OR REPLACE INTO workflow_checkpoints (key, session_id, value) VALUES (?1, ?2, ?3)",
                params![key, checkpoint.session_id.clone(), value],
            )
            .await
            .map_err(store_error("put_checkpoint_failed"))?;
        Ok(())
    }

    /// Checkpoint keys are `sessionId_stageId_unixNanoTimestamp`
    /// zero-padded, so the lexicographically largest key for a session is
    /// also the most recent (§8 round-trip property).
    pub async fn latest_checkpoint_for_session(&self, session_id: &str) -> Result<Option<Checkpoint>, EngineError> {
        let mut rows = self
            .conn
            .query(
                "SELECT value FROM workflow_checkpoints WHERE session_id = ?1 ORDER BY key DESC LIMIT 1",
                params![session_id.to_string()],
            )
            .await
            .map_err(store_error("query_checkpoint_failed"))?;
        match rows.next().await.map_err(store_error("read_checkpoint_failed"))? {
            Some(row) => {
                let value: String = row.get(0).map_err(store_error("decode_checkpoint_failed"))?;
                let checkpoint = serde_json::from_str(&value).map_err(serialize_error)?;
                Ok(Some(checkpoint))
            }
            None => Ok(None),
        }
    }

    pub async fn put_spec(&self, workflow_id: &str, spec: &serde_json::Value) -> Result<(), EngineError> {
        self.put_value("workflow_specs", workflow_id, spec).await
    }

    pub async fn get_spec(&self, workflow_id: &str) -> Result<Option<serde_json::Value>, EngineError> {
        self.get_one("workflow_specs", workflow_id).await
    }

    pub async fn put_template(&self, path: &str, content: &str) -> Result<(), EngineError> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO workflow_templates (key, value) VALUES (?1, ?2)",
                params![path.to_string(), content.to_string()],
            )
            .await
            .map_err(store_error("put_template_failed"))?;
        Ok(())
    }

    pub async fn get_template(&self, path: &str) -> Result<Option<String>, EngineError> {
        let mut rows = self
            .conn
            .query("SELECT value FROM workflow_templates WHERE key = ?1", params![path.to_string()])
            .await
            .map_err(store_error("query_template_failed"))?;
        match rows.next().await.map_err(store_error("read_template_failed"))? {
            Some(row) => Ok(Some(row.get(0).map_err(store_error("decode_template_failed"))?)),
            None => Ok(None),
        }
    }

    /// Appends a history event under its session's nested bucket, keyed
    /// `unixNano_eventId` (§6 persisted state layout).
    pub async fn append_history(&self, event: &HistoryEvent) -> Result<(), EngineError> {
        let nanos = event.timestamp.timestamp_nanos_opt().unwrap_or_default();
        let key = format!("{:019}_{}", nanos, event.id);
        let value = serde_json::to_string(event).map_err(serialize_error)?;
        self.conn
            .execute(
                "INSERT OR REPLACE INTO workflow_history (key, session_id, value) VALUES (?1, ?2, ?3)",
                params![key, event.session_id.clone(), value],
            )
            .await
            .map_err(store_error("append_history_failed"))?;
        Ok(())
    }

    pub async fn history_for_session(&self, session_id: &str) -> Result<Vec<HistoryEvent>, EngineError> {
        let mut rows = self
            .conn
            .query(
                "SELECT value FROM workflow_history WHERE session_id = ?1 ORDER BY key ASC",
                params![session_id.to_string()],
            )
            .await
            .map_err(store_error("query_history_failed"))?;
        let mut events = Vec::new();
        while let Some(row) = rows.next().await.map_err(store_error("read_history_failed"))? {
            let value: String = row.get(0).map_err(store_error("decode_history_failed"))?;
            events.push(serde_json::from_str(&value).map_err(serialize_error)?);
        }
        Ok(events)
    }

    async fn put_value(&self, table: &str, key: &str, value: &serde_json::Value) -> Result<(), EngineError> {
        let json = serde_json::to_string(value).map_err(serialize_error)?;
        let sql = format!("INSERT OR REPLACE INTO {table} (key, value) VALUES (?1, ?2)");
        self.conn
            .execute(&sql, params![key.to_string(), json])
            .await
            .map_err(store_error("put_value_failed"))?;
        Ok(())
    }

    async fn get_one<T: serde::de::DeserializeOwned>(&self, table: &str, key: &str) -> Result<Option<T>, EngineError> {
        let sql = format!("SELECT value FROM {table} WHERE key = ?1");
        let mut rows = self
            .conn
            .query(&sql, params![key.to_string()])
            .await
            .map_err(store_error("query_value_failed"))?;
        match rows.next().await.map_err(store_error("read_value_failed"))? {
            Some(row) => {
                let value: String = row.get(0).map_err(store_error("decode_value_failed"))?;
                Ok(Some(serde_json::from_str(&value).map_err(serialize_error)?))
            }
            None => Ok(None),
        }
    }
}

/// Derives a recovery strategy from a session and its latest checkpoint
/// (§4.B): `restart` with no checkpoint, `resume` when paused,
/// `retry_failed` when failed with known failed stages, `resume_stale` when
/// running but last activity is older than 10 minutes, `wait` when running
/// and recent, `completed` otherwise.
pub fn derive_recovery_strategy(session: &WorkflowSession, checkpoint: Option<&Checkpoint>) -> RecoveryStrategy {
    match session.status {
        SessionStatus::Completed => RecoveryStrategy::Completed,
        SessionStatus::Paused => RecoveryStrategy::Resume,
        SessionStatus::Failed if !session.failed_stages.is_empty() => RecoveryStrategy::RetryFailed,
        SessionStatus::Failed => {
            if checkpoint.is_some() {
                RecoveryStrategy::Resume
            } else {
                RecoveryStrategy::Restart
            }
        }
        SessionStatus::Running => {
            let last_activity = checkpoint.map(|c| c.timestamp).unwrap_or(session.started_at);
            if Utc::now() - last_activity > STALE_THRESHOLD {
                RecoveryStrategy::ResumeStale
            } else {
                RecoveryStrategy::Wait
            }
        }
        SessionStatus::Pending => {
            if checkpoint.is_some() {
                RecoveryStrategy::Resume
            } else {
                RecoveryStrategy::Restart
            }
        }
    }
}

fn store_error(code: &'static str) -> impl Fn(libsql::Error) -> EngineError {
    move |e| EngineError::new(ErrorKind::Filesystem, code, e.to_string())
}

fn serialize_error(e: serde_json::Error) -> EngineError {
    EngineError::new(ErrorKind::Internal, "serialize_failed", e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use repair_types::Checkpoint;
    use tempfile::tempdir;

    fn session(status: SessionStatus) -> WorkflowSession {
        WorkflowSession {
            id: "s1".to_string(),
            workflow_id: "wf1".to_string(),
            status,
            started_at: Utc::now() - ChronoDuration::minutes(20),
            ended_at: None,
            execution_context: serde_json::json!({}),
            metadata: Default::default(),
            failed_stages: Vec::new(),
        }
    }

    #[tokio::test]
    async fn session_snapshot_and_reload_is_an_equal_record() {
        let dir = tempdir().unwrap();
        let store = WorkflowStore::open(&dir.path().join("wf.db")).await.unwrap();
        let original = session(SessionStatus::Running);
        store.put_session(&original).await.unwrap();
        let loaded = store.get_session("s1").await.unwrap().unwrap();
        assert_eq!(loaded, original);
    }

    #[tokio::test]
    async fn latest_checkpoint_returns_most_recent() {
        let dir = tempdir().unwrap();
        let store = WorkflowStore::open(&dir.path().join("wf.db")).await.unwrap();
        let earlier = Checkpoint {
            session_id: "s1".to_string(),
            stage_id: "build".to_string(),
            timestamp: Utc::now() - ChronoDuration::seconds(10),
            state_snapshot: serde_json::json!({"n": 1}),
        };
        let later = Checkpoint {
            session_id: "s1".to_string(),
            stage_id: "deploy".to_string(),
            timestamp: Utc::now(),
            state_snapshot: serde_json::json!({"n": 2}),
        };
        store.put_checkpoint(&earlier).await.unwrap();
        store.put_checkpoint(&later).await.unwrap();

        let latest = store.latest_checkpoint_for_session("s1").await.unwrap().unwrap();
        assert_eq!(latest.stage_id, "deploy");
    }

    #[tokio::test]
    async fn history_is_returned_in_append_order() {
        let dir = tempdir().unwrap();
        let store = WorkflowStore::open(&dir.path().join("wf.db")).await.unwrap();
        for i in 0..3 {
            let event = HistoryEvent {
                id: format!("evt-{i}"),
                session_id: "s1".to_string(),
                event_type: "stage_run".to_string(),
                stage_id: Some("build".to_string()),
                tool_name: None,
                timestamp: Utc::now() + ChronoDuration::milliseconds(i),
                duration_ms: None,
                success: true,
                error: None,
                data: serde_json::json!({}),
            };
            store.append_history(&event).await.unwrap();
        }
        let events = store.history_for_session("s1").await.unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].id, "evt-0");
        assert_eq!(events[2].id, "evt-2");
    }

    #[test]
    fn recovery_strategy_restart_when_no_checkpoint() {
        let s = session(SessionStatus::Pending);
        assert_eq!(derive_recovery_strategy(&s, None), RecoveryStrategy::Restart);
    }

    #[test]
    fn recovery_strategy_paused_is_resume() {
        let s = session(SessionStatus::Paused);
        assert_eq!(derive_recovery_strategy(&s, None), RecoveryStrategy::Resume);
    }

    #[test]
    fn recovery_strategy_failed_with_known_stages_is_retry_failed() {
        let mut s = session(SessionStatus::Failed);
        s.failed_stages.push("build".to_string());
        assert_eq!(derive_recovery_strategy(&s, None), RecoveryStrategy::RetryFailed);
    }

    #[test]
    fn recovery_strategy_stale_running_session() {
        let mut s = session(SessionStatus::Running);
        s.started_at = Utc::now() - ChronoDuration::minutes(15);
        assert_eq!(derive_recovery_strategy(&s, None), RecoveryStrategy::ResumeStale);
    }

    #[test]
    fn recovery_strategy_recent_running_session_waits() {
        let mut s = session(SessionStatus::Running);
        s.started_at = Utc::now();
        assert_eq!(derive_recovery_strategy(&s, None), RecoveryStrategy::Wait);
    }

    #[test]
    fn recovery_strategy_completed() {
        let s = session(SessionStatus::Completed);
        assert_eq!(derive_recovery_strategy(&s, None), RecoveryStrategy::Completed);
    }
}
