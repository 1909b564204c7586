use serde::{Deserialize, Serialize};

/// A stage's declared role, used both for legacy metadata-key aliasing in
/// snapshots (`docker_errors`/`manifest_errors`) and for fix-strategy
/// conditions that only apply to a particular kind of stage (§4.D).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    DockerfileGenerator,
    ManifestGenerator,
    Validator,
    Pusher,
    Other,
}

impl StageKind {
    /// Name used for the `<stage-type-name>_errors` snapshot key (§4.B).
    pub fn type_name(self) -> &'static str {
        match self {
            StageKind::DockerfileGenerator => "dockerfile_generator",
            StageKind::ManifestGenerator => "manifest_generator",
            StageKind::Validator => "validator",
            StageKind::Pusher => "pusher",
            StageKind::Other => "other",
        }
    }

    /// Legacy alias key that must additionally be present when this stage
    /// kind appears in a snapshot (§4.B).
    pub fn legacy_alias(self) -> Option<&'static str> {
        match self {
            StageKind::DockerfileGenerator => Some("docker_errors"),
            StageKind::ManifestGenerator => Some("manifest_errors"),
            _ => None,
        }
    }
}

/// Outcome of a single stage `Run` invocation, recorded in the visit log.
/// A closed enumeration per §9: "the source sometimes compares stage
/// outcomes by string; implementations should use a closed enumeration."
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageOutcome {
    Success,
    Failure,
}

/// One entry in the run state's stage visit log: `{stage id, retry count
/// within this visit, outcome}` (§3). Every transition is appended exactly
/// once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageVisit {
    pub stage_id: String,
    pub retry_count: u32,
    pub outcome: StageOutcome,
}

impl StageVisit {
    pub fn new(stage_id: impl Into<String>, retry_count: u32, outcome: StageOutcome) -> Self {
        Self {
            stage_id: stage_id.into(),
            retry_count,
            outcome,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dockerfile_generator_has_docker_errors_alias() {
        assert_eq!(StageKind::DockerfileGenerator.legacy_alias(), Some("docker_errors"));
        assert_eq!(StageKind::ManifestGenerator.legacy_alias(), Some("manifest_errors"));
        assert_eq!(StageKind::Validator.legacy_alias(), None);
    }

    #[test]
    fn stage_visit_carries_all_three_fields() {
        let visit = StageVisit::new("build_image", 2, StageOutcome::Failure);
        assert_eq!(visit.stage_id, "build_image");
        assert_eq!(visit.retry_count, 2);
        assert_eq!(visit.outcome, StageOutcome::Failure);
    }
}
