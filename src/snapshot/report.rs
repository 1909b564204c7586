use std::collections::HashMap;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use repair_types::{EngineError, ErrorKind, StageVisit, TokenUsage};
use serde::Serialize;

use crate::run_state::RunState;
use crate::stage::StageConfig;

/// `{iteration count, outcome, stage history, detected databases}` plus a
/// token-usage block (§4.B).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Success,
    Failure,
    Timeout,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub iteration_count: u32,
    pub outcome: RunOutcome,
    pub stage_history: Vec<StageVisit>,
    pub detected_databases: Vec<String>,
    pub token_usage: TokenUsage,
}

#[derive(Serialize)]
struct IterationMetadata<'a> {
    iteration: u32,
    success: bool,
    metadata: &'a serde_json::Value,
    registry_host: &'a str,
    image_name: &'a str,
    errors: HashMap<String, String>,
}

/// Durable write-through of per-iteration state and a final run report
/// (§4.B). Grounded on `audit/logger.rs`'s `AuditLogger`: a small struct over
/// a root directory that writes JSON with `serde_json::to_string_pretty` and
/// propagates every I/O error rather than swallowing it.
pub struct ReportStore {
    report_root: String,
}

impl ReportStore {
    pub fn new(report_root: impl Into<String>) -> Self {
        Self {
            report_root: report_root.into(),
        }
    }

    fn root_dir(&self, target_dir: &Path) -> std::path::PathBuf {
        target_dir.join(&self.report_root)
    }

    /// Creates `<target>/<report-root>/iteration_<N>` and writes
    /// `metadata.json`, an optional `Dockerfile`, `manifests/*.yaml`, and an
    /// optional `llm_completions.json` (§4.B).
    pub fn write_iteration_snapshot(
        &self,
        state: &RunState,
        target_dir: &Path,
        stages: &[StageConfig],
        completion_capture_enabled: bool,
    ) -> Result<(), EngineError> {
        let iter_dir = self
            .root_dir(target_dir)
            .join(format!("iteration_{}", state.iteration_count()));
        create_dir(&iter_dir)?;

        let mut errors = HashMap::new();
        for stage_config in stages {
            if let Some(error_text) = stage_config.stage.error_report() {
                let kind = stage_config.stage.kind();
                errors.insert(format!("{}_errors", kind.type_name()), error_text.clone());
                if let Some(alias) = kind.legacy_alias() {
                    errors.insert(alias.to_string(), error_text);
                }
            }
        }

        let metadata_value = serde_json::to_value(state.metadata())
            .map_err(|e| EngineError::new(ErrorKind::Internal, "metadata_serialize_failed", e.to_string()))?;

        let metadata = IterationMetadata {
            iteration: state.iteration_count(),
            success: state.success(),
            metadata: &metadata_value,
            registry_host: state.registry_host(),
            image_name: state.image_name(),
            errors,
        };
        write_json(&iter_dir.join("metadata.json"), &metadata)?;

        if !state.build().content.is_empty() {
            write_atomic(&iter_dir.join("Dockerfile"), state.build().content.as_bytes())?;
        }

        let manifests_dir = iter_dir.join("manifests");
        let has_manifests = state.manifests().next().is_some();
        if has_manifests {
            create_dir(&manifests_dir)?;
            for (key, entry) in state.manifests() {
                write_atomic(&manifests_dir.join(format!("{key}.yaml")), &entry.content)?;
            }
        }

        if completion_capture_enabled {
            if let Some(completions) = state.completions() {
                if !completions.is_empty() {
                    write_json(&iter_dir.join("llm_completions.json"), &completions)?;
                }
            }
        }

        Ok(())
    }

    /// Emits `run_report.json` and `report.md` under the report root
    /// (§4.B). Outcome precedence: `timeout` is passed in explicitly by the
    /// caller when the driving context signaled cancellation/deadline, else
    /// `success` when the state's success flag is true, else `failure`.
    pub fn write_run_report(
        &self,
        state: &RunState,
        target_dir: &Path,
        outcome: RunOutcome,
        detected_databases: Vec<String>,
    ) -> Result<(), EngineError> {
        let root = self.root_dir(target_dir);
        create_dir(&root)?;

        let report = RunReport {
            iteration_count: state.iteration_count(),
            outcome,
            stage_history: state.visits().to_vec(),
            detected_databases,
            token_usage: state.token_usage(),
        };

        write_json(&root.join("run_report.json"), &report)?;
        write_atomic(&root.join("report.md"), render_markdown(&report).as_bytes())?;
        Ok(())
    }
}

/// Derives the final outcome per §4.B's precedence rules.
pub fn derive_outcome(state: &RunState, cancelled_or_expired: bool) -> RunOutcome {
    if cancelled_or_expired {
        RunOutcome::Timeout
    } else if state.success() {
        RunOutcome::Success
    } else {
        RunOutcome::Failure
    }
}

fn render_markdown(report: &RunReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# Run Report\n");
    let _ = writeln!(out, "- Iterations: {}", report.iteration_count);
    let _ = writeln!(out, "- Outcome: {:?}", report.outcome);
    let _ = writeln!(out, "- Detected databases: {}", report.detected_databases.join(", "));
    let _ = writeln!(out, "\n## Stage history\n");
    for visit in &report.stage_history {
        let _ = writeln!(out, "- `{}` (retry {}): {:?}", visit.stage_id, visit.retry_count, visit.outcome);
    }
    let _ = writeln!(out, "\n## Token usage\n");
    let _ = writeln!(out, "- Prompt: {}", report.token_usage.prompt);
    let _ = writeln!(out, "- Completion: {}", report.token_usage.completion);
    let _ = writeln!(out, "- Total: {}", report.token_usage.total);
    out
}

fn create_dir(path: &Path) -> Result<(), EngineError> {
    fs::create_dir_all(path).map_err(|e| {
        EngineError::new(ErrorKind::Filesystem, "create_dir_failed", e.to_string())
            .with_source_location(path.display().to_string())
    })
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), EngineError> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| EngineError::new(ErrorKind::Internal, "serialize_failed", e.to_string()))?;
    write_atomic(path, json.as_bytes())
}

/// Writes to a sibling `.tmp` path then renames into place, so a crash
/// mid-write never leaves a half-written file at the canonical path.
fn write_atomic(path: &Path, content: &[u8]) -> Result<(), EngineError> {
    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, content).map_err(|e| {
        EngineError::new(ErrorKind::Filesystem, "write_file_failed", e.to_string())
            .with_source_location(tmp_path.display().to_string())
    })?;
    fs::rename(&tmp_path, path).map_err(|e| {
        EngineError::new(ErrorKind::Filesystem, "rename_file_failed", e.to_string())
            .with_source_location(path.display().to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use repair_types::StageKind;
    use tempfile::tempdir;

    #[test]
    fn derive_outcome_prioritizes_cancellation_over_success_flag() {
        let mut state = RunState::new("r", "i");
        state.mark_success();
        assert_eq!(derive_outcome(&state, true), RunOutcome::Timeout);
        assert_eq!(derive_outcome(&state, false), RunOutcome::Success);
    }

    #[test]
    fn derive_outcome_is_failure_when_not_successful_and_not_cancelled() {
        let state = RunState::new("r", "i");
        assert_eq!(derive_outcome(&state, false), RunOutcome::Failure);
    }

    #[test]
    fn write_iteration_snapshot_writes_metadata_dockerfile_and_manifests() {
        let dir = tempdir().unwrap();
        let mut state = RunState::new("registry.example.com", "app");
        state.increment_iteration();
        state.set_build_content("FROM alpine", dir.path().join("Dockerfile"));
        state.upsert_manifest(
            "deployment-app",
            crate::run_state::ManifestEntry {
                content: b"kind: Deployment".to_vec(),
                source_path: dir.path().join("app.yaml"),
                last_error: String::new(),
                successfully_deployed: false,
            },
        );

        let store = ReportStore::new("forge-report");
        store.write_iteration_snapshot(&state, dir.path(), &[], false).unwrap();

        let iter_dir = dir.path().join("forge-report").join("iteration_1");
        assert!(iter_dir.join("metadata.json").exists());
        assert!(iter_dir.join("Dockerfile").exists());
        assert!(iter_dir.join("manifests").join("deployment-app.yaml").exists());
    }

    struct ErroringStage {
        kind: StageKind,
        error: String,
    }

    #[async_trait::async_trait]
    impl crate::stage::Stage for ErroringStage {
        fn id(&self) -> &str {
            "stage"
        }
        fn kind(&self) -> StageKind {
            self.kind
        }
        async fn initialize(&self, _path: &Path) -> Result<(), EngineError> {
            Ok(())
        }
        async fn generate(&self) -> Result<(), EngineError> {
            Ok(())
        }
        async fn run(&self, _state: &mut RunState, _args: &crate::stage::StageArgs) -> Result<(), EngineError> {
            Ok(())
        }
        async fn deploy(&self, _state: &mut RunState) -> Result<(), EngineError> {
            Ok(())
        }
        fn write_successful_files(&self, _state: &RunState) -> Result<(), EngineError> {
            Ok(())
        }
        fn error_report(&self) -> Option<String> {
            Some(self.error.clone())
        }
    }

    #[test]
    fn write_iteration_snapshot_includes_legacy_error_aliases() {
        let dir = tempdir().unwrap();
        let state = RunState::new("r", "i");
        let stage_config = StageConfig::new(
            "dockerfile",
            std::sync::Arc::new(ErroringStage {
                kind: StageKind::DockerfileGenerator,
                error: "syntax error".to_string(),
            }),
            0,
            ".",
        );

        let store = ReportStore::new("forge-report");
        store.write_iteration_snapshot(&state, dir.path(), &[stage_config], false).unwrap();

        let metadata_path = dir.path().join("forge-report").join("iteration_0").join("metadata.json");
        let metadata: serde_json::Value = serde_json::from_str(&fs::read_to_string(metadata_path).unwrap()).unwrap();
        assert_eq!(metadata["errors"]["dockerfile_generator_errors"], "syntax error");
        assert_eq!(metadata["errors"]["docker_errors"], "syntax error");
    }

    #[test]
    fn write_run_report_emits_json_and_markdown() {
        let dir = tempdir().unwrap();
        let mut state = RunState::new("r", "i");
        state.mark_success();
        state.record_visit("build", 0, repair_types::StageOutcome::Success);

        let store = ReportStore::new("forge-report");
        store.write_run_report(&state, dir.path(), RunOutcome::Success, vec!["postgres".to_string()]).unwrap();

        let root = dir.path().join("forge-report");
        assert!(root.join("run_report.json").exists());
        let markdown = fs::read_to_string(root.join("report.md")).unwrap();
        assert!(markdown.contains("postgres"));
    }
}
