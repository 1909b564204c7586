//! An iterative repair orchestrator for AI-assisted containerization
//! workflows: a stage graph with per-stage retry/goto transitions, a
//! fix-strategy/fix-chain recovery system, a bounded-concurrency job
//! executor, and a durable snapshot/report store. Grounded throughout on
//! the teacher's `phase.rs`/`dag/executor.rs`/`audit/logger.rs`/
//! `hooks/manager.rs` shapes, generalized to this spec's data model.

pub mod adapters;
pub mod config;
pub mod external;
pub mod fixes;
pub mod jobs;
pub mod orchestrator;
pub mod run_state;
pub mod snapshot;
pub mod stage;
pub mod tools;

pub use config::EngineConfig;
pub use external::{BuildExecutor, BuildOutput, Completion, DeployOutput, FileMetadata, FilesystemAccessService, LanguageModelClient, ManifestExecutor, TemplateLibrary};
pub use fixes::{FixOutcome, FixSystem};
pub use jobs::{JobExecutor, JobStats};
pub use orchestrator::Orchestrator;
pub use run_state::RunState;
pub use snapshot::{derive_recovery_strategy, ReportStore, RunOutcome, RunReport, WorkflowStore};
pub use stage::{validate_and_backfill, Stage, StageArgs, StageConfig};
pub use tools::tool_catalog;

pub use repair_types::*;
