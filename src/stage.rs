//! The `Stage` trait and `StageConfig` declaration, grounded on `phase.rs`'s
//! `Phase` record (fields + constructors + load/save) generalized from a
//! single linear phase list to the retry/goto stage graph §3/§4.D describe.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use repair_types::{EngineError, ErrorKind, StageKind};

use crate::run_state::RunState;

/// Open-typed invoking arguments a stage's `run` receives. Each concrete
/// stage interprets its own shape (dockerfile path, build context, port,
/// replicas, ...); fix strategies produce alternative values of this same
/// type when they ask the orchestrator to retry with different arguments.
pub type StageArgs = serde_json::Value;

/// A named unit of work with Initialize / Generate / Run / Deploy /
/// WriteSuccessfulFiles / GetErrors lifecycle hooks (Glossary).
#[async_trait]
pub trait Stage: Send + Sync {
    fn id(&self) -> &str;

    fn kind(&self) -> StageKind;

    async fn initialize(&self, path: &Path) -> Result<(), EngineError>;

    async fn generate(&self) -> Result<(), EngineError>;

    async fn run(&self, state: &mut RunState, args: &StageArgs) -> Result<(), EngineError>;

    /// Deploy failures are non-fatal; the orchestrator only logs and flags
    /// them (§4.D).
    async fn deploy(&self, state: &mut RunState) -> Result<(), EngineError>;

    fn write_successful_files(&self, state: &RunState) -> Result<(), EngineError>;

    /// This stage's current error report, or `None` if it has none. Used to
    /// build the `<stage-type-name>_errors` map in iteration snapshots
    /// (§4.B).
    fn error_report(&self) -> Option<String>;

    /// Default invoking arguments used for the first attempt at this stage.
    fn default_args(&self) -> StageArgs {
        serde_json::json!({})
    }
}

/// Immutable declaration of one node in the run graph: `{id, stage-impl,
/// max-retries, on-fail-goto id, on-success-goto id, path}` (§3).
pub struct StageConfig {
    pub id: String,
    pub stage: std::sync::Arc<dyn Stage>,
    pub max_retries: u32,
    pub on_fail_goto: String,
    pub on_success_goto: Option<String>,
    pub path: PathBuf,
}

impl StageConfig {
    pub fn new(id: impl Into<String>, stage: std::sync::Arc<dyn Stage>, max_retries: u32, path: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            stage,
            max_retries,
            on_fail_goto: String::new(),
            on_success_goto: None,
            path: path.into(),
        }
    }

    pub fn with_on_fail_goto(mut self, target: impl Into<String>) -> Self {
        self.on_fail_goto = target.into();
        self
    }

    pub fn with_on_success_goto(mut self, target: impl Into<String>) -> Self {
        self.on_success_goto = Some(target.into());
        self
    }
}

/// Validates and backfills a declared stage sequence (§4.D construction
/// contract):
/// - no duplicate ids,
/// - `on-fail-goto` backfilled to the first stage id when empty, and must
///   always refer to an existing id,
/// - `on-success-goto` backfilled to the next declared stage when omitted;
///   an empty value on the *last* stage stays empty and terminates the run,
/// - the graph must be finite and every node reachable from the entry
///   (§9 "cyclic references").
pub fn validate_and_backfill(mut stages: Vec<StageConfig>) -> Result<Vec<StageConfig>, EngineError> {
    if stages.is_empty() {
        return Err(EngineError::new(ErrorKind::Validation, "empty_stage_list", "at least one stage is required"));
    }

    let mut seen = HashSet::new();
    for stage in &stages {
        if !seen.insert(stage.id.clone()) {
            return Err(EngineError::validation("duplicate_stage_id", format!("duplicate stage id: {}", stage.id)));
        }
    }

    let first_id = stages[0].id.clone();
    let ids: Vec<String> = stages.iter().map(|s| s.id.clone()).collect();

    for (index, stage) in stages.iter_mut().enumerate() {
        if stage.on_fail_goto.is_empty() {
            stage.on_fail_goto = first_id.clone();
        }
        if !ids.contains(&stage.on_fail_goto) {
            return Err(EngineError::validation(
                "unknown_on_fail_goto",
                format!("stage {} on-fail-goto references unknown id {}", stage.id, stage.on_fail_goto),
            ));
        }

        if stage.on_success_goto.is_none() {
            stage.on_success_goto = Some(ids.get(index + 1).cloned().unwrap_or_default());
        }
        if let Some(target) = &stage.on_success_goto {
            if !target.is_empty() && !ids.contains(target) {
                return Err(EngineError::validation(
                    "unknown_on_success_goto",
                    format!("stage {} on-success-goto references unknown id {}", stage.id, target),
                ));
            }
        }
    }

    validate_reachable_and_finite(&stages)?;

    Ok(stages)
}

/// Every node must be reachable from the entry stage via `on-success-goto`
/// edges, and the graph must not admit an infinite loop that does not
/// decrement a retry budget (§9). Since every `on-fail-goto` transition only
/// fires after the retry budget is exhausted, the only cycles that matter
/// here are `on-success-goto` cycles, which would let the advance loop spin
/// forever without ever terminating (an empty `on-success-goto` is the only
/// terminal condition). We require the success-goto graph to be acyclic.
fn validate_reachable_and_finite(stages: &[StageConfig]) -> Result<(), EngineError> {
    let index: HashMap<&str, &StageConfig> = stages.iter().map(|s| (s.id.as_str(), s)).collect();

    // Reachability from the entry via success-goto edges.
    let mut reachable = HashSet::new();
    let mut frontier = vec![stages[0].id.as_str()];
    while let Some(id) = frontier.pop() {
        if !reachable.insert(id) {
            continue;
        }
        if let Some(stage) = index.get(id) {
            if let Some(target) = stage.on_success_goto.as_deref().filter(|t| !t.is_empty()) {
                frontier.push(target);
            }
        }
    }
    for stage in stages {
        if !reachable.contains(stage.id.as_str()) {
            return Err(EngineError::validation(
                "unreachable_stage",
                format!("stage {} is unreachable from the entry stage via on-success-goto", stage.id),
            ));
        }
    }

    // Acyclicity of the success-goto graph.
    let mut visiting = HashSet::new();
    let mut done = HashSet::new();
    for stage in stages {
        if !done.contains(stage.id.as_str()) {
            detect_cycle(stage.id.as_str(), &index, &mut visiting, &mut done)?;
        }
    }
    Ok(())
}

fn detect_cycle<'a>(
    id: &'a str,
    index: &HashMap<&'a str, &'a StageConfig>,
    visiting: &mut HashSet<&'a str>,
    done: &mut HashSet<&'a str>,
) -> Result<(), EngineError> {
    if done.contains(id) {
        return Ok(());
    }
    if !visiting.insert(id) {
        return Err(EngineError::validation(
            "cyclic_stage_graph",
            format!("on-success-goto graph contains a cycle reachable from {id}"),
        ));
    }
    if let Some(stage) = index.get(id) {
        if let Some(target) = stage.on_success_goto.as_deref().filter(|t| !t.is_empty()) {
            detect_cycle(target, index, visiting, done)?;
        }
    }
    visiting.remove(id);
    done.insert(id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopStage {
        id: String,
    }

    impl NoopStage {
        fn new(id: &str) -> Self {
            Self { id: id.to_string() }
        }
    }

    #[async_trait]
    impl Stage for NoopStage {
        fn id(&self) -> &str {
            &self.id
        }

        fn kind(&self) -> StageKind {
            StageKind::Other
        }

        async fn initialize(&self, _path: &Path) -> Result<(), EngineError> {
            Ok(())
        }

        async fn generate(&self) -> Result<(), EngineError> {
            Ok(())
        }

        async fn run(&self, _state: &mut RunState, _args: &StageArgs) -> Result<(), EngineError> {
            Ok(())
        }

        async fn deploy(&self, _state: &mut RunState) -> Result<(), EngineError> {
            Ok(())
        }

        fn write_successful_files(&self, _state: &RunState) -> Result<(), EngineError> {
            Ok(())
        }

        fn error_report(&self) -> Option<String> {
            None
        }
    }

    fn config(id: &str) -> StageConfig {
        StageConfig::new(id, std::sync::Arc::new(NoopStage::new(id)), 0, ".")
    }

    #[test]
    fn backfills_on_fail_goto_to_first_stage() {
        let stages = validate_and_backfill(vec![config("a"), config("b")]).unwrap();
        assert_eq!(stages[1].on_fail_goto, "a");
    }

    #[test]
    fn backfills_on_success_goto_to_next_declared_stage() {
        let stages = validate_and_backfill(vec![config("a"), config("b")]).unwrap();
        assert_eq!(stages[0].on_success_goto.as_deref(), Some("b"));
        assert_eq!(stages[1].on_success_goto.as_deref(), Some(""));
    }

    #[test]
    fn rejects_duplicate_ids() {
        let err = validate_and_backfill(vec![config("a"), config("a")]).unwrap_err();
        assert_eq!(err.code, "duplicate_stage_id");
    }

    #[test]
    fn rejects_unknown_on_fail_goto() {
        let stages = vec![config("a").with_on_fail_goto("nonexistent")];
        let err = validate_and_backfill(stages).unwrap_err();
        assert_eq!(err.code, "unknown_on_fail_goto");
    }

    #[test]
    fn rejects_unknown_on_success_goto() {
        let stages = vec![config("a").with_on_success_goto("nonexistent")];
        let err = validate_and_backfill(stages).unwrap_err();
        assert_eq!(err.code, "unknown_on_success_goto");
    }

    #[test]
    fn empty_on_success_goto_terminates_and_is_allowed() {
        let stages = vec![config("a").with_on_success_goto("")];
        let stages = validate_and_backfill(stages).unwrap();
        assert_eq!(stages[0].on_success_goto.as_deref(), Some(""));
    }

    #[test]
    fn rejects_cycles_in_success_goto_graph() {
        let stages = vec![
            config("a").with_on_success_goto("b"),
            config("b").with_on_success_goto("a"),
        ];
        let err = validate_and_backfill(stages).unwrap_err();
        assert_eq!(err.code, "cyclic_stage_graph");
    }
}
