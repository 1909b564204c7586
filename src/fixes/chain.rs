//! Fix chains: an ordered sequence of strategies run by a small interpreter
//! loop rather than nested callbacks (§9, §4.D "chain execution"). A chain
//! is a first-class value — conditions and steps are data, not control
//! flow — matching the teacher's `hooks/manager.rs` config-driven
//! registry-lookup-then-execute pattern generalized to multi-step recipes.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use repair_types::StageKind;
use serde_json::Value;

use crate::run_state::RunState;
use crate::stage::Stage;

use super::strategy::{FixStrategy, StrategyEffect};

/// A single AND-ed condition: both the substring (when set) and the stage
/// kind (when set) must hold for the chain to be applicable.
pub struct ChainCondition {
    pub error_substring: Option<&'static str>,
    pub stage_kind: Option<StageKind>,
}

impl ChainCondition {
    fn matches(&self, error_text: &str, stage_kind: StageKind) -> bool {
        let substring_ok = self.error_substring.is_none_or(|s| error_text.to_lowercase().contains(s));
        let stage_ok = self.stage_kind.is_none_or(|k| k == stage_kind);
        substring_ok && stage_ok
    }
}

pub struct FixStep {
    pub strategy_name: &'static str,
    pub max_retries: u32,
    pub continue_on_error: bool,
    pub args_transform: Option<fn(&Value) -> Value>,
}

pub struct FixChain {
    pub name: &'static str,
    pub conditions: Vec<ChainCondition>,
    pub steps: Vec<FixStep>,
}

impl FixChain {
    pub fn is_applicable(&self, error_text: &str, stage_kind: StageKind) -> bool {
        self.conditions.iter().all(|c| c.matches(error_text, stage_kind))
    }
}

pub struct ChainResult {
    pub resolved: bool,
    pub suggestions: Vec<String>,
}

/// Runs a matched chain's steps in order against the real stage, bounding
/// each step by `step_timeout` and `1 + max_retries` attempts (§4.D).
pub async fn run_chain(
    chain: &FixChain,
    stage: &Arc<dyn Stage>,
    state: &mut RunState,
    initial_args: &Value,
    strategies: &HashMap<&'static str, Box<dyn FixStrategy>>,
    language: Option<&str>,
    step_timeout: Duration,
) -> ChainResult {
    let mut carried_error: Option<String> = None;
    let mut suggestions = Vec::new();
    let mut had_result = false;

    for step in &chain.steps {
        let Some(strategy) = strategies.get(step.strategy_name) else {
            continue;
        };

        let candidates = match strategy.propose(stage.kind(), language) {
            StrategyEffect::RetryWithArgs(candidates) => candidates,
            StrategyEffect::Surface { suggestion, .. } => {
                if let Some(s) = suggestion {
                    suggestions.push(s);
                }
                carried_error = Some(format!("{} surfaced a non-retryable error", step.strategy_name));
                if step.continue_on_error {
                    continue;
                }
                break;
            }
        };

        let attempts = (1 + step.max_retries) as usize;
        let mut step_succeeded = false;
        for candidate in candidates.iter().take(attempts.max(1)) {
            let args = match step.args_transform {
                Some(transform) => transform(candidate),
                None => candidate.clone(),
            };
            if tokio::time::timeout(step_timeout, stage.run(state, &args)).await.is_ok_and(|r| r.is_ok()) {
                step_succeeded = true;
                break;
            }
        }

        if step_succeeded {
            had_result = true;
            carried_error = None;
            suggestions.push(format!("{} resolved the error", step.strategy_name));
        } else {
            carried_error = Some(format!("{} did not resolve the error", step.strategy_name));
            suggestions.push(format!("{} failed; manual remediation may be required", step.strategy_name));
            if !step.continue_on_error {
                break;
            }
        }
    }

    ChainResult {
        resolved: had_result && carried_error.is_none(),
        suggestions,
    }
}

/// Chains matching the should-use-chain triggers named in §4.D step 3.
pub fn default_chains() -> Vec<FixChain> {
    vec![
        FixChain {
            // The general repeated-build-failure recovery chain: applicable
            // whenever the error text itself says a build failed, most
            // often selected via the three-prior-failures should-use-chain
            // trigger rather than its own condition.
            name: "docker_build_complex",
            conditions: vec![ChainCondition {
                error_substring: Some("build failed"),
                stage_kind: None,
            }],
            steps: vec![
                FixStep {
                    strategy_name: "build_cache_error",
                    max_retries: 0,
                    continue_on_error: true,
                    args_transform: None,
                },
                FixStep {
                    strategy_name: "dockerfile_syntax_error",
                    max_retries: 1,
                    continue_on_error: true,
                    args_transform: None,
                },
                FixStep {
                    strategy_name: "image_not_found",
                    max_retries: 1,
                    continue_on_error: false,
                    args_transform: None,
                },
            ],
        },
        FixChain {
            name: "dockerfile_syntax_chain",
            conditions: vec![
                ChainCondition {
                    error_substring: Some("dockerfile"),
                    stage_kind: None,
                },
                ChainCondition {
                    error_substring: Some("syntax"),
                    stage_kind: None,
                },
            ],
            steps: vec![
                FixStep {
                    strategy_name: "dockerfile_syntax_error",
                    max_retries: 1,
                    continue_on_error: true,
                    args_transform: None,
                },
                FixStep {
                    strategy_name: "image_not_found",
                    max_retries: 1,
                    continue_on_error: false,
                    args_transform: None,
                },
            ],
        },
        FixChain {
            name: "multiple_build_failures_chain",
            conditions: vec![
                ChainCondition {
                    error_substring: Some("build failed"),
                    stage_kind: None,
                },
                ChainCondition {
                    error_substring: Some("multiple"),
                    stage_kind: None,
                },
            ],
            steps: vec![
                FixStep {
                    strategy_name: "context_not_found",
                    max_retries: 0,
                    continue_on_error: true,
                    args_transform: None,
                },
                FixStep {
                    strategy_name: "dockerfile_not_found",
                    max_retries: 0,
                    continue_on_error: true,
                    args_transform: None,
                },
                FixStep {
                    strategy_name: "image_not_found",
                    max_retries: 1,
                    continue_on_error: false,
                    args_transform: None,
                },
            ],
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn docker_build_complex_chain_matches_on_build_failed_alone() {
        let chain = &default_chains()[0];
        assert_eq!(chain.name, "docker_build_complex");
        assert!(chain.is_applicable("docker build failed", StageKind::Other));
        assert!(!chain.is_applicable("dockerfile not found", StageKind::Other));
    }

    #[test]
    fn chain_condition_requires_all_substrings() {
        let chain = &default_chains()[1];
        assert!(chain.is_applicable("dockerfile parse error: syntax error at line 2", StageKind::DockerfileGenerator));
        assert!(!chain.is_applicable("dockerfile not found", StageKind::DockerfileGenerator));
    }

    #[test]
    fn multiple_build_failures_chain_requires_both_keywords() {
        let chain = &default_chains()[2];
        assert!(chain.is_applicable("build failed: multiple errors detected", StageKind::Other));
        assert!(!chain.is_applicable("build failed", StageKind::Other));
    }
}
