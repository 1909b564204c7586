//! Component D's fix system (§4.D "fix system contract"): consulted only
//! after a stage reports an error. Exposes one entry point, `attempt_fix`,
//! implementing the six-step procedure (session context, should-use-chain,
//! context-aware single strategies, unconditional fallback sweep, history
//! recording).

pub mod chain;
pub mod session;
pub mod strategy;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use repair_types::{ErrorKind, MetadataKey, StageKind};
use serde_json::Value;

use crate::run_state::RunState;
use crate::stage::Stage;

use chain::{default_chains, run_chain, FixChain};
use session::{FixAttempt, SessionStore};
use strategy::{default_strategies, FixStrategy, StrategyEffect};

pub use repair_types::EngineError;

/// Whether a fix attempt resolved the error it was consulted about. Fix
/// attempts never throw (§4.D "failure semantics"): this is the complete
/// outcome space.
pub enum FixOutcome {
    Resolved,
    Unresolved(EngineError),
}

pub struct FixSystem {
    strategies: HashMap<&'static str, Box<dyn FixStrategy>>,
    strategy_order: Vec<&'static str>,
    chains: Vec<FixChain>,
    sessions: SessionStore,
    step_timeout: Duration,
}

impl Default for FixSystem {
    fn default() -> Self {
        Self::new(Duration::from_secs(120))
    }
}

impl FixSystem {
    pub fn new(step_timeout: Duration) -> Self {
        let mut strategies = HashMap::new();
        let mut strategy_order = Vec::new();
        for strategy in default_strategies() {
            strategy_order.push(strategy.name());
            strategies.insert(strategy.name(), strategy);
        }
        Self {
            strategies,
            strategy_order,
            chains: default_chains(),
            sessions: SessionStore::new(),
            step_timeout,
        }
    }

    fn session_id(args: &Value) -> String {
        args.get("session_id")
            .and_then(Value::as_str)
            .unwrap_or("default-session")
            .to_string()
    }

    fn detected_language(state: &RunState) -> Option<String> {
        state
            .get_metadata(MetadataKey::DetectedLanguage)
            .and_then(|v| v.as_str().map(str::to_string))
    }

    /// §4.D "attempt fix" over `{context, stage, args, error}`.
    pub async fn attempt_fix(
        &self,
        stage_config: &crate::stage::StageConfig,
        state: &mut RunState,
        args: &Value,
        error: &EngineError,
    ) -> FixOutcome {
        let stage = &stage_config.stage;
        let stage_id = stage_config.id.as_str();
        let session_id = Self::session_id(args);
        let language = Self::detected_language(state);
        let error_text = error.message.clone();

        let failures_for_stage = self.sessions.with_session(&session_id, |s| s.failures_for_stage(stage_id));
        let should_use_chain = failures_for_stage >= 3
            || (contains_ci(&error_text, "dockerfile") && contains_ci(&error_text, "syntax"))
            || (contains_ci(&error_text, "build failed") && contains_ci(&error_text, "multiple"));

        if should_use_chain {
            if let Some(chain) = self.chains.iter().find(|c| c.is_applicable(&error_text, stage.kind())) {
                let result = run_chain(chain, stage, state, args, &self.strategies, language.as_deref(), self.step_timeout).await;
                // §8 scenario 5: chain attempts are recorded under the
                // generic "chain" label, not the individual chain's name.
                self.record(&session_id, stage_id, &error_text, error.kind, "chain", result.resolved);
                if result.resolved {
                    return FixOutcome::Resolved;
                }
            }
        }

        // Context-aware pass: matching strategies not yet 3-strikes-skipped
        // for this (stage, error kind) pair, language-specific ones first.
        let mut candidates: Vec<&'static str> = self
            .strategy_order
            .iter()
            .copied()
            .filter(|name| self.strategies[name].matches(&error_text, stage.kind()))
            .filter(|name| self.sessions.with_session(&session_id, |s| s.strategy_failure_count(stage_id, error.kind, name)) < 3)
            .collect();
        candidates.sort_by_key(|name| !self.strategies[name].is_language_specific());

        if let Some(outcome) = self.try_strategies(&candidates, stage, state, stage_id, &session_id, &error_text, error.kind, language.as_deref()).await {
            return outcome;
        }

        // Fallback sweep: every matching strategy, including 3-strikes ones.
        let all_matching: Vec<&'static str> = self
            .strategy_order
            .iter()
            .copied()
            .filter(|name| self.strategies[name].matches(&error_text, stage.kind()))
            .collect();

        if let Some(outcome) = self.try_strategies(&all_matching, stage, state, stage_id, &session_id, &error_text, error.kind, language.as_deref()).await {
            return outcome;
        }

        FixOutcome::Unresolved(error.clone())
    }

    #[allow(clippy::too_many_arguments)]
    async fn try_strategies(
        &self,
        names: &[&'static str],
        stage: &Arc<dyn Stage>,
        state: &mut RunState,
        stage_id: &str,
        session_id: &str,
        error_text: &str,
        error_kind: ErrorKind,
        language: Option<&str>,
    ) -> Option<FixOutcome> {
        for name in names {
            let strategy = &self.strategies[name];
            match strategy.propose(stage.kind(), language) {
                StrategyEffect::RetryWithArgs(retry_candidates) => {
                    let mut resolved = false;
                    for candidate in &retry_candidates {
                        if stage.run(state, candidate).await.is_ok() {
                            resolved = true;
                            break;
                        }
                    }
                    self.record(session_id, stage_id, error_text, error_kind, name, resolved);
                    if resolved {
                        return Some(FixOutcome::Resolved);
                    }
                }
                StrategyEffect::Surface { kind, code, suggestion } => {
                    self.record(session_id, stage_id, error_text, error_kind, name, false);
                    let mut surfaced = EngineError::new(kind, code, error_text.to_string());
                    if let Some(suggestion) = suggestion {
                        surfaced = surfaced.with_suggestion(suggestion);
                    }
                    return Some(FixOutcome::Unresolved(surfaced));
                }
            }
        }
        None
    }

    fn record(&self, session_id: &str, stage_id: &str, error_text: &str, error_kind: ErrorKind, strategy: &str, success: bool) {
        self.sessions.with_session(session_id, |s| {
            s.record(FixAttempt {
                stage_id: stage_id.to_string(),
                error_text: error_text.to_string(),
                error_kind,
                strategy: strategy.to_string(),
                success,
                timestamp: Utc::now(),
            })
        });
    }
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(needle)
}
