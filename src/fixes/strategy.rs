//! The 16 named fix strategies (§4.D). Each strategy is a pure function
//! over `{stage kind, detected language}` — it never touches `RunState`
//! directly. It either proposes alternative invocation arguments for the
//! orchestrator to retry the stage with, or surfaces a reclassified error
//! for the caller to report. Only `FixSystem`'s own loop re-invokes
//! `Stage::run`.

use repair_types::{ErrorKind, StageKind};
use serde_json::{json, Value};

/// What a strategy recommends doing about an error.
pub enum StrategyEffect {
    /// Retry the failing stage with each of these argument sets, in order,
    /// stopping at the first that succeeds.
    RetryWithArgs(Vec<Value>),
    /// Give up retrying and reclassify the error for reporting.
    Surface {
        kind: ErrorKind,
        code: &'static str,
        suggestion: Option<String>,
    },
}

pub trait FixStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    fn matches(&self, error_text: &str, stage_kind: StageKind) -> bool;
    fn propose(&self, stage_kind: StageKind, language: Option<&str>) -> StrategyEffect;
    /// Language-specific strategies are tried first in the context-aware
    /// pass (§4.D step 4).
    fn is_language_specific(&self) -> bool {
        false
    }
}

fn has(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(needle)
}

/// Alternate base images, minimum set per language (§4.D).
pub fn alternate_base_images(language: Option<&str>) -> &'static [&'static str] {
    match language.map(str::to_lowercase).as_deref() {
        Some("go") => &["golang:alpine", "golang:1.21-alpine", "alpine:latest"],
        Some("javascript") | Some("typescript") => &["node:alpine", "node:18-alpine", "node:16-alpine"],
        Some("python") => &["python:alpine", "python:3.11-slim", "python:3.10-slim"],
        Some("java") => &["openjdk:alpine", "openjdk:17-alpine", "amazoncorretto:17-alpine"],
        _ => &["alpine:latest", "ubuntu:22.04", "debian:bullseye-slim"],
    }
}

struct DockerfileNotFound;
impl FixStrategy for DockerfileNotFound {
    fn name(&self) -> &'static str {
        "dockerfile_not_found"
    }
    fn matches(&self, error_text: &str, _: StageKind) -> bool {
        has(error_text, "dockerfile not found")
    }
    fn propose(&self, _: StageKind, _: Option<&str>) -> StrategyEffect {
        StrategyEffect::RetryWithArgs(
            ["dockerfile", "Dockerfile.dev", "docker/Dockerfile", ".dockerfile"]
                .iter()
                .map(|p| json!({ "dockerfile_path": p }))
                .collect(),
        )
    }
}

struct ContextNotFound;
impl FixStrategy for ContextNotFound {
    fn name(&self) -> &'static str {
        "context_not_found"
    }
    fn matches(&self, error_text: &str, _: StageKind) -> bool {
        has(error_text, "context path does not exist") || has(error_text, "context path error")
    }
    fn propose(&self, _: StageKind, _: Option<&str>) -> StrategyEffect {
        StrategyEffect::RetryWithArgs(vec![json!({ "build_context": "." })])
    }
}

struct InvalidPort;
impl FixStrategy for InvalidPort {
    fn name(&self) -> &'static str {
        "invalid_port"
    }
    fn matches(&self, error_text: &str, _: StageKind) -> bool {
        has(error_text, "invalid port") || has(error_text, "port out of range")
    }
    fn propose(&self, _: StageKind, _: Option<&str>) -> StrategyEffect {
        StrategyEffect::RetryWithArgs(
            [8080, 3000, 5000, 8000, 9000, 80, 443]
                .iter()
                .map(|p| json!({ "port": p }))
                .collect(),
        )
    }
}

struct PortInUse;
impl FixStrategy for PortInUse {
    fn name(&self) -> &'static str {
        "port_in_use"
    }
    fn matches(&self, error_text: &str, _: StageKind) -> bool {
        has(error_text, "port already in use") || has(error_text, "address already in use")
    }
    fn propose(&self, _: StageKind, _: Option<&str>) -> StrategyEffect {
        StrategyEffect::RetryWithArgs(
            [8081, 8082, 8083, 3001, 3002, 5001, 5002, 9001, 9002]
                .iter()
                .map(|p| json!({ "port": p }))
                .collect(),
        )
    }
}

struct MissingDependency;
impl FixStrategy for MissingDependency {
    fn name(&self) -> &'static str {
        "missing_dependency"
    }
    fn matches(&self, error_text: &str, _: StageKind) -> bool {
        has(error_text, "package not found") || has(error_text, "module not found") || has(error_text, "dependency not found")
    }
    fn propose(&self, _: StageKind, _: Option<&str>) -> StrategyEffect {
        StrategyEffect::Surface {
            kind: ErrorKind::Validation,
            code: "missing_dependency",
            suggestion: Some("Check the lockfile for your package manager and install the missing dependency".to_string()),
        }
    }
}

struct DockerfileSyntaxError;
impl FixStrategy for DockerfileSyntaxError {
    fn name(&self) -> &'static str {
        "dockerfile_syntax_error"
    }
    fn matches(&self, error_text: &str, _: StageKind) -> bool {
        has(error_text, "dockerfile parse error") || has(error_text, "syntax error") || has(error_text, "unknown instruction")
    }
    fn is_language_specific(&self) -> bool {
        true
    }
    fn propose(&self, stage_kind: StageKind, language: Option<&str>) -> StrategyEffect {
        if stage_kind != StageKind::DockerfileGenerator {
            return StrategyEffect::Surface {
                kind: ErrorKind::Validation,
                code: "dockerfile_syntax_error",
                suggestion: Some("Review the generated Dockerfile for invalid instructions".to_string()),
            };
        }
        let base_image = alternate_base_images(language)[0];
        StrategyEffect::RetryWithArgs(vec![json!({
            "multi_stage": false,
            "optimize": false,
            "base_image": base_image,
        })])
    }
}

struct ResourceLimits;
impl FixStrategy for ResourceLimits {
    fn name(&self) -> &'static str {
        "resource_limits"
    }
    fn matches(&self, error_text: &str, _: StageKind) -> bool {
        has(error_text, "memory limit") || has(error_text, "cpu limit") || has(error_text, "resource limit")
    }
    fn propose(&self, _: StageKind, _: Option<&str>) -> StrategyEffect {
        StrategyEffect::Surface {
            kind: ErrorKind::Resource,
            code: "resource_limits",
            suggestion: Some("Shrink the requested CPU/memory resources".to_string()),
        }
    }
}

struct HealthCheckFailure;
impl FixStrategy for HealthCheckFailure {
    fn name(&self) -> &'static str {
        "health_check_failure"
    }
    fn matches(&self, error_text: &str, _: StageKind) -> bool {
        has(error_text, "health check failed") || has(error_text, "health endpoint")
    }
    fn propose(&self, _: StageKind, _: Option<&str>) -> StrategyEffect {
        StrategyEffect::RetryWithArgs(
            ["/health", "/healthz", "/ping", "/status", "/api/health"]
                .iter()
                .map(|p| json!({ "health_check_path": p }))
                .collect(),
        )
    }
}

struct ImageNotFound;
impl FixStrategy for ImageNotFound {
    fn name(&self) -> &'static str {
        "image_not_found"
    }
    fn matches(&self, error_text: &str, _: StageKind) -> bool {
        has(error_text, "image not found") || has(error_text, "pull access denied") || has(error_text, "repository does not exist")
    }
    fn is_language_specific(&self) -> bool {
        true
    }
    fn propose(&self, _: StageKind, language: Option<&str>) -> StrategyEffect {
        StrategyEffect::RetryWithArgs(
            alternate_base_images(language)
                .iter()
                .map(|image| json!({ "base_image": image }))
                .collect(),
        )
    }
}

struct TimeoutError;
impl FixStrategy for TimeoutError {
    fn name(&self) -> &'static str {
        "timeout_error"
    }
    fn matches(&self, error_text: &str, _: StageKind) -> bool {
        has(error_text, "timeout") || has(error_text, "deadline exceeded")
    }
    fn propose(&self, _: StageKind, _: Option<&str>) -> StrategyEffect {
        StrategyEffect::Surface {
            kind: ErrorKind::Timeout,
            code: "timeout_error",
            suggestion: None,
        }
    }
}

struct RegistryAuthError;
impl FixStrategy for RegistryAuthError {
    fn name(&self) -> &'static str {
        "registry_auth_error"
    }
    fn matches(&self, error_text: &str, _: StageKind) -> bool {
        has(error_text, "registry") && (has(error_text, "unauthorized") || has(error_text, "authentication"))
    }
    fn propose(&self, _: StageKind, _: Option<&str>) -> StrategyEffect {
        StrategyEffect::Surface {
            kind: ErrorKind::Auth,
            code: "registry_auth_error",
            suggestion: Some("Check registry credentials".to_string()),
        }
    }
}

struct ManifestError;
impl FixStrategy for ManifestError {
    fn name(&self) -> &'static str {
        "manifest_error"
    }
    fn matches(&self, error_text: &str, _: StageKind) -> bool {
        has(error_text, "manifest") && (has(error_text, "invalid") || has(error_text, "generation failed"))
    }
    fn propose(&self, stage_kind: StageKind, _: Option<&str>) -> StrategyEffect {
        if stage_kind != StageKind::ManifestGenerator {
            return StrategyEffect::Surface {
                kind: ErrorKind::Validation,
                code: "manifest_error",
                suggestion: Some("Review the generated manifest".to_string()),
            };
        }
        StrategyEffect::RetryWithArgs(vec![json!({
            "replicas": 1,
            "strategy": "Recreate",
            "drop_resources": true,
            "drop_affinity": true,
            "drop_tolerations": true,
        })])
    }
}

struct DeploymentError;
impl FixStrategy for DeploymentError {
    fn name(&self) -> &'static str {
        "deployment_error"
    }
    fn matches(&self, error_text: &str, _: StageKind) -> bool {
        has(error_text, "deployment failed") || has(error_text, "pod failed") || has(error_text, "imagepullbackoff")
    }
    fn propose(&self, _: StageKind, _: Option<&str>) -> StrategyEffect {
        StrategyEffect::Surface {
            kind: ErrorKind::Execution,
            code: "deployment_error",
            suggestion: None,
        }
    }
}

struct BuildCacheError;
impl FixStrategy for BuildCacheError {
    fn name(&self) -> &'static str {
        "build_cache_error"
    }
    fn matches(&self, error_text: &str, _: StageKind) -> bool {
        has(error_text, "cache") && (has(error_text, "invalid") || has(error_text, "corrupted"))
    }
    fn propose(&self, _: StageKind, _: Option<&str>) -> StrategyEffect {
        StrategyEffect::Surface {
            kind: ErrorKind::Execution,
            code: "build_cache_error",
            suggestion: Some("Clear the build cache and retry".to_string()),
        }
    }
}

struct ObviousSubstringError {
    name: &'static str,
    triggers: &'static [&'static str],
    kind: ErrorKind,
}
impl FixStrategy for ObviousSubstringError {
    fn name(&self) -> &'static str {
        self.name
    }
    fn matches(&self, error_text: &str, _: StageKind) -> bool {
        self.triggers.iter().any(|t| has(error_text, t))
    }
    fn propose(&self, _: StageKind, _: Option<&str>) -> StrategyEffect {
        StrategyEffect::Surface {
            kind: self.kind,
            code: self.name,
            suggestion: None,
        }
    }
}

/// Builds the 16 required strategies in the table order of §4.D.
pub fn default_strategies() -> Vec<Box<dyn FixStrategy>> {
    vec![
        Box::new(DockerfileNotFound),
        Box::new(ContextNotFound),
        Box::new(InvalidPort),
        Box::new(PortInUse),
        Box::new(MissingDependency),
        Box::new(DockerfileSyntaxError),
        Box::new(ResourceLimits),
        Box::new(HealthCheckFailure),
        Box::new(ImageNotFound),
        Box::new(TimeoutError),
        Box::new(RegistryAuthError),
        Box::new(ManifestError),
        Box::new(DeploymentError),
        Box::new(BuildCacheError),
        Box::new(ObviousSubstringError {
            name: "auth_error",
            triggers: &["unauthorized", "authentication failed", "forbidden"],
            kind: ErrorKind::Auth,
        }),
        Box::new(ObviousSubstringError {
            name: "network_error",
            triggers: &["connection refused", "network unreachable", "dns resolution failed"],
            kind: ErrorKind::Network,
        }),
        Box::new(ObviousSubstringError {
            name: "permission_error",
            triggers: &["permission denied", "access denied"],
            kind: ErrorKind::Permission,
        }),
        Box::new(ObviousSubstringError {
            name: "disk_space_error",
            triggers: &["no space left", "disk full", "disk quota exceeded"],
            kind: ErrorKind::Resource,
        }),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dockerfile_not_found_matches_and_proposes_four_paths() {
        let strategy = DockerfileNotFound;
        assert!(strategy.matches("Dockerfile not found at root", StageKind::DockerfileGenerator));
        match strategy.propose(StageKind::DockerfileGenerator, None) {
            StrategyEffect::RetryWithArgs(candidates) => assert_eq!(candidates.len(), 4),
            _ => panic!("expected retry effect"),
        }
    }

    #[test]
    fn dockerfile_syntax_error_surfaces_outside_dockerfile_generator() {
        let strategy = DockerfileSyntaxError;
        assert!(strategy.matches("syntax error on line 3", StageKind::Validator));
        match strategy.propose(StageKind::Validator, Some("python")) {
            StrategyEffect::Surface { code, .. } => assert_eq!(code, "dockerfile_syntax_error"),
            _ => panic!("expected surface effect"),
        }
    }

    #[test]
    fn dockerfile_syntax_error_retries_with_language_matched_image() {
        let strategy = DockerfileSyntaxError;
        match strategy.propose(StageKind::DockerfileGenerator, Some("python")) {
            StrategyEffect::RetryWithArgs(candidates) => {
                assert_eq!(candidates[0]["base_image"], "python:alpine");
            }
            _ => panic!("expected retry effect"),
        }
    }

    #[test]
    fn registry_auth_error_requires_both_substrings() {
        let strategy = RegistryAuthError;
        assert!(!strategy.matches("authentication failed", StageKind::Pusher));
        assert!(strategy.matches("registry returned unauthorized", StageKind::Pusher));
    }

    #[test]
    fn default_strategies_cover_all_sixteen_names() {
        let names: Vec<&str> = default_strategies().iter().map(|s| s.name()).collect();
        assert_eq!(names.len(), 16);
        assert!(names.contains(&"disk_space_error"));
    }
}
