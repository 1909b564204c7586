//! In-memory per-session fix history (§4.D step 2/6). Capped at 50 entries
//! per session; consulted for the 3-strikes skip rule and the
//! should-use-chain failure count. Kept in memory rather than the durable
//! `WorkflowStore`: fix history is a fast, short-lived signal for the
//! current run, not part of the durable session record in §3's data model.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use repair_types::ErrorKind;

const HISTORY_CAP: usize = 50;

#[derive(Debug, Clone)]
pub struct FixAttempt {
    pub stage_id: String,
    pub error_text: String,
    pub error_kind: ErrorKind,
    pub strategy: String,
    pub success: bool,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct SessionFixState {
    pub detected_language: Option<String>,
    pub detected_framework: Option<String>,
    pub tool_list: Vec<String>,
    history: VecDeque<FixAttempt>,
}

impl SessionFixState {
    pub fn record(&mut self, attempt: FixAttempt) {
        if self.history.len() >= HISTORY_CAP {
            self.history.pop_front();
        }
        self.history.push_back(attempt);
    }

    pub fn failures_for_stage(&self, stage_id: &str) -> usize {
        self.history.iter().filter(|a| a.stage_id == stage_id && !a.success).count()
    }

    pub fn strategy_failure_count(&self, stage_id: &str, error_kind: ErrorKind, strategy: &str) -> usize {
        self.history
            .iter()
            .filter(|a| a.stage_id == stage_id && a.error_kind == error_kind && a.strategy == strategy && !a.success)
            .count()
    }

    pub fn last_errors(&self, n: usize) -> Vec<String> {
        self.history.iter().rev().take(n).map(|a| a.error_text.clone()).collect()
    }

    pub fn last_attempts(&self, n: usize) -> Vec<FixAttempt> {
        self.history.iter().rev().take(n).cloned().collect()
    }
}

/// Registry of per-session fix state, keyed by session id.
#[derive(Default)]
pub struct SessionStore {
    sessions: Mutex<HashMap<String, SessionFixState>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session<R>(&self, session_id: &str, f: impl FnOnce(&mut SessionFixState) -> R) -> R {
        let mut sessions = self.sessions.lock().expect("session store mutex poisoned");
        let state = sessions.entry(session_id.to_string()).or_default();
        f(state)
    }
}
