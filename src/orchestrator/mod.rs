//! Component D's stage orchestrator: the single-threaded advance loop that
//! drives a validated stage graph to completion, consulting the fix system
//! on every stage error (§4.D). Grounded on `dag/executor.rs`'s
//! state-machine-over-a-graph shape, generalized from a DAG walk to the
//! retry/goto graph this spec describes.

use std::path::Path;

use repair_types::{EngineError, ErrorKind, MetadataKey, StageOutcome};
use tokio_util::sync::CancellationToken;

use crate::config::EngineConfig;
use crate::fixes::{FixOutcome, FixSystem};
use crate::run_state::RunState;
use crate::snapshot::{derive_outcome, ReportStore, RunReport};
use crate::stage::{validate_and_backfill, StageConfig};

pub struct Orchestrator {
    stages: Vec<StageConfig>,
    fix_system: FixSystem,
    report_store: ReportStore,
    snapshot_enabled: bool,
    completion_capture_enabled: bool,
}

impl Orchestrator {
    /// Validates and backfills the declared stage graph (§4.D construction
    /// contract) before accepting it.
    pub fn new(stages: Vec<StageConfig>, config: &EngineConfig) -> Result<Self, EngineError> {
        let stages = validate_and_backfill(stages)?;
        Ok(Self {
            stages,
            fix_system: FixSystem::new(config.job_deadline()),
            report_store: ReportStore::new(config.report_root.clone()),
            snapshot_enabled: config.snapshot_enabled,
            completion_capture_enabled: config.completion_capture_enabled,
        })
    }

    fn stage(&self, id: &str) -> Option<&StageConfig> {
        self.stages.iter().find(|s| s.id == id)
    }

    fn snapshot_if_enabled(&self, state: &RunState, target_dir: &Path) -> Result<(), EngineError> {
        if !self.snapshot_enabled {
            return Ok(());
        }
        self.report_store
            .write_iteration_snapshot(state, target_dir, &self.stages, self.completion_capture_enabled)
    }

    /// Runs Initialize-all, Generate-all, then the advance loop, finally
    /// writing successful files and the run report (§4.D "Run phase
    /// ordering"). Cancellation during the advance loop still produces a
    /// `timeout`-outcome report before the context error is surfaced; a
    /// fatal (`internal`) stage error does the same before that error is
    /// surfaced (§7 propagation policy).
    pub async fn run(&self, state: &mut RunState, target_dir: &Path, token: CancellationToken) -> Result<RunReport, EngineError> {
        for stage_config in &self.stages {
            stage_config.stage.initialize(&stage_config.path).await?;
        }
        for stage_config in &self.stages {
            stage_config.stage.generate().await?;
        }

        let mut current_id = self.stages[0].id.clone();
        let mut retry_count = 0u32;
        let mut cancelled = false;
        let mut fatal_error: Option<EngineError> = None;

        loop {
            state.increment_iteration();

            if token.is_cancelled() {
                cancelled = true;
                break;
            }

            let stage_config = self.stage(&current_id).expect("every goto target was validated to exist");
            let args = stage_config.stage.default_args();

            let run_result = tokio::select! {
                biased;
                _ = token.cancelled() => {
                    cancelled = true;
                    None
                }
                result = stage_config.stage.run(state, &args) => Some(result),
            };
            let Some(run_result) = run_result else {
                break;
            };

            // Configuration/permission errors short-circuit straight to
            // on-fail-goto without consulting the fix system; internal
            // errors abort the run outright (§7 propagation policy).
            let mut force_goto = false;
            let resolved_ok = match run_result {
                Ok(()) => true,
                Err(error) => {
                    if error.kind.is_fatal() {
                        fatal_error = Some(error);
                        break;
                    }
                    if error.kind.is_not_auto_fixable() {
                        force_goto = true;
                        false
                    } else {
                        match self.fix_system.attempt_fix(stage_config, state, &args, &error).await {
                            FixOutcome::Resolved => true,
                            FixOutcome::Unresolved(_) => false,
                        }
                    }
                }
            };

            if resolved_ok {
                if let Err(e) = stage_config.stage.deploy(state).await {
                    tracing::warn!(stage_id = %stage_config.id, error = %e, "stage deploy failed; continuing");
                }
                state.record_visit(stage_config.id.clone(), retry_count, StageOutcome::Success);
                retry_count = 0;
                self.snapshot_if_enabled(state, target_dir)?;

                let next = stage_config.on_success_goto.clone().unwrap_or_default();
                if next.is_empty() {
                    state.mark_success();
                    break;
                }
                current_id = next;
                continue;
            }

            state.record_visit(stage_config.id.clone(), retry_count, StageOutcome::Failure);
            retry_count += 1;
            if force_goto || retry_count > stage_config.max_retries {
                self.snapshot_if_enabled(state, target_dir)?;
                current_id = stage_config.on_fail_goto.clone();
                retry_count = 0;
            }
        }

        let report = self.finish(state, target_dir, cancelled)?;
        if let Some(error) = fatal_error {
            return Err(error);
        }
        if cancelled {
            return Err(EngineError::new(ErrorKind::Timeout, "run_cancelled", "run aborted by context cancellation"));
        }
        Ok(report)
    }

    fn finish(&self, state: &mut RunState, target_dir: &Path, cancelled_or_expired: bool) -> Result<RunReport, EngineError> {
        for stage_config in &self.stages {
            if let Err(e) = stage_config.stage.write_successful_files(state) {
                tracing::warn!(stage_id = %stage_config.id, error = %e, "failed to write successful files");
            }
        }

        let outcome = derive_outcome(state, cancelled_or_expired);
        let detected_databases = detected_databases(state);
        self.report_store.write_run_report(state, target_dir, outcome, detected_databases.clone())?;

        Ok(RunReport {
            iteration_count: state.iteration_count(),
            outcome,
            stage_history: state.visits().to_vec(),
            detected_databases,
            token_usage: state.token_usage(),
        })
    }
}

fn detected_databases(state: &RunState) -> Vec<String> {
    state
        .get_metadata(MetadataKey::DetectedDatabases)
        .and_then(|v| v.as_array())
        .map(|items| items.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use repair_types::{StageKind, StageVisit};
    use serde_json::Value;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tempfile::tempdir;

    struct CountingStage {
        id: &'static str,
        fail_until: u32,
        attempts: AtomicU32,
    }

    #[async_trait::async_trait]
    impl crate::stage::Stage for CountingStage {
        fn id(&self) -> &str {
            self.id
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
        async fn run(&self, _state: &mut RunState, _args: &Value) -> Result<(), EngineError> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
            if attempt < self.fail_until {
                Err(EngineError::new(ErrorKind::Execution, "unrecognized_error", "an error with no matching strategy"))
            } else {
                Ok(())
            }
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

    fn config() -> EngineConfig {
        EngineConfig::default()
    }

    #[tokio::test]
    async fn single_stage_happy_path_marks_success() {
        let stage = Arc::new(CountingStage { id: "only", fail_until: 0, attempts: AtomicU32::new(0) });
        let stages = vec![StageConfig::new("only", stage, 0, ".")];
        let orchestrator = Orchestrator::new(stages, &config()).unwrap();
        let mut state = RunState::new("r", "i");
        let dir = tempdir().unwrap();

        let report = orchestrator.run(&mut state, dir.path(), CancellationToken::new()).await.unwrap();
        assert_eq!(report.outcome, crate::snapshot::RunOutcome::Success);
        assert!(state.success());
    }

    #[tokio::test]
    async fn retries_then_succeeds_within_budget() {
        let stage = Arc::new(CountingStage { id: "only", fail_until: 2, attempts: AtomicU32::new(0) });
        let stages = vec![StageConfig::new("only", stage, 3, ".")];
        let orchestrator = Orchestrator::new(stages, &config()).unwrap();
        let mut state = RunState::new("r", "i");
        let dir = tempdir().unwrap();

        let report = orchestrator.run(&mut state, dir.path(), CancellationToken::new()).await.unwrap();
        assert_eq!(report.outcome, crate::snapshot::RunOutcome::Success);
        assert_eq!(report.stage_history.len(), 3);
        assert_eq!(report.stage_history[0], StageVisit { stage_id: "only".to_string(), retry_count: 0, outcome: StageOutcome::Failure });
        assert_eq!(report.stage_history[1], StageVisit { stage_id: "only".to_string(), retry_count: 1, outcome: StageOutcome::Failure });
        assert_eq!(report.stage_history[2], StageVisit { stage_id: "only".to_string(), retry_count: 2, outcome: StageOutcome::Success });
    }

    #[tokio::test]
    async fn exhausting_retries_jumps_to_on_fail_goto() {
        let failing = Arc::new(CountingStage { id: "flaky", fail_until: u32::MAX, attempts: AtomicU32::new(0) });
        let recovery = Arc::new(CountingStage { id: "recovery", fail_until: 0, attempts: AtomicU32::new(0) });
        let stages = vec![
            StageConfig::new("flaky", failing, 1, ".").with_on_fail_goto("recovery").with_on_success_goto(""),
            StageConfig::new("recovery", recovery, 0, ".").with_on_success_goto(""),
        ];
        let orchestrator = Orchestrator::new(stages, &config()).unwrap();
        let mut state = RunState::new("r", "i");
        let dir = tempdir().unwrap();

        let report = orchestrator.run(&mut state, dir.path(), CancellationToken::new()).await.unwrap();
        assert_eq!(report.outcome, crate::snapshot::RunOutcome::Success);
        assert!(report.stage_history.iter().any(|v| v.stage_id == "flaky" && v.outcome == StageOutcome::Failure));
        assert!(report.stage_history.iter().any(|v| v.stage_id == "recovery" && v.outcome == StageOutcome::Success));
    }

    struct CancelAfterNStage {
        token: CancellationToken,
        cancel_after: u32,
        attempts: AtomicU32,
    }

    #[async_trait::async_trait]
    impl crate::stage::Stage for CancelAfterNStage {
        fn id(&self) -> &str {
            "only"
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
        async fn run(&self, _state: &mut RunState, _args: &Value) -> Result<(), EngineError> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if attempt >= self.cancel_after {
                self.token.cancel();
            }
            // Always fails with no matching fix strategy, so retries
            // accumulate without ever crossing the fail-goto threshold
            // (max_retries is large) and without ever reaching a
            // success-goto transition.
            Err(EngineError::new(ErrorKind::Execution, "unrecognized_error", "an error with no matching strategy"))
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

    #[tokio::test]
    async fn cancellation_during_advance_loop_stops_appending_visits() {
        let token = CancellationToken::new();
        let stage = Arc::new(CancelAfterNStage {
            token: token.clone(),
            cancel_after: 2,
            attempts: AtomicU32::new(0),
        });
        let stages = vec![StageConfig::new("only", stage, 1000, ".")];
        let orchestrator = Orchestrator::new(stages, &config()).unwrap();
        let mut state = RunState::new("r", "i");
        let dir = tempdir().unwrap();

        let err = orchestrator.run(&mut state, dir.path(), token).await.unwrap_err();
        assert_eq!(err.code, "run_cancelled");
        assert_eq!(state.visits().len(), 2);
        assert_eq!(state.visits()[0], StageVisit { stage_id: "only".to_string(), retry_count: 0, outcome: StageOutcome::Failure });
        assert_eq!(state.visits()[1], StageVisit { stage_id: "only".to_string(), retry_count: 1, outcome: StageOutcome::Failure });

        let report_json = std::fs::read_to_string(dir.path().join("forge-report").join("run_report.json")).unwrap();
        assert!(report_json.contains("\"timeout\""));
    }

    struct AlwaysErrorStage {
        id: &'static str,
        kind: ErrorKind,
        attempts: AtomicU32,
    }

    #[async_trait::async_trait]
    impl crate::stage::Stage for AlwaysErrorStage {
        fn id(&self) -> &str {
            self.id
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
        async fn run(&self, _state: &mut RunState, _args: &Value) -> Result<(), EngineError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(EngineError::new(self.kind, "unrecognized_error", "an error with no matching strategy"))
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

    #[tokio::test]
    async fn internal_error_aborts_the_run_and_still_writes_a_report() {
        let stage = Arc::new(AlwaysErrorStage { id: "only", kind: ErrorKind::Internal, attempts: AtomicU32::new(0) });
        let stages = vec![StageConfig::new("only", stage, 5, ".")];
        let orchestrator = Orchestrator::new(stages, &config()).unwrap();
        let mut state = RunState::new("r", "i");
        let dir = tempdir().unwrap();

        let err = orchestrator.run(&mut state, dir.path(), CancellationToken::new()).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Internal);
        assert_eq!(err.code, "unrecognized_error");
        assert_eq!(state.visits().len(), 0);

        let report_json = std::fs::read_to_string(dir.path().join("forge-report").join("run_report.json")).unwrap();
        assert!(!report_json.is_empty());
    }

    #[tokio::test]
    async fn configuration_error_short_circuits_straight_to_on_fail_goto() {
        let flaky = Arc::new(AlwaysErrorStage { id: "flaky", kind: ErrorKind::Configuration, attempts: AtomicU32::new(0) });
        let recovery = Arc::new(CountingStage { id: "recovery", fail_until: 0, attempts: AtomicU32::new(0) });
        let stages = vec![
            StageConfig::new("flaky", flaky.clone(), 1000, ".").with_on_fail_goto("recovery").with_on_success_goto(""),
            StageConfig::new("recovery", recovery, 0, ".").with_on_success_goto(""),
        ];
        let orchestrator = Orchestrator::new(stages, &config()).unwrap();
        let mut state = RunState::new("r", "i");
        let dir = tempdir().unwrap();

        let report = orchestrator.run(&mut state, dir.path(), CancellationToken::new()).await.unwrap();
        assert_eq!(report.outcome, crate::snapshot::RunOutcome::Success);
        assert_eq!(flaky.attempts.load(Ordering::SeqCst), 1);
        assert_eq!(report.stage_history[0], StageVisit { stage_id: "flaky".to_string(), retry_count: 0, outcome: StageOutcome::Failure });
        assert!(report.stage_history.iter().any(|v| v.stage_id == "recovery" && v.outcome == StageOutcome::Success));
    }

    #[tokio::test]
    async fn cancellation_before_first_run_still_emits_timeout_report() {
        let stage = Arc::new(CountingStage { id: "only", fail_until: 0, attempts: AtomicU32::new(0) });
        let stages = vec![StageConfig::new("only", stage, 0, ".")];
        let orchestrator = Orchestrator::new(stages, &config()).unwrap();
        let mut state = RunState::new("r", "i");
        let dir = tempdir().unwrap();
        let token = CancellationToken::new();
        token.cancel();

        let err = orchestrator.run(&mut state, dir.path(), token).await.unwrap_err();
        assert_eq!(err.code, "run_cancelled");

        let report_json = std::fs::read_to_string(dir.path().join("forge-report").join("run_report.json")).unwrap();
        assert!(report_json.contains("\"timeout\""));
    }
}
