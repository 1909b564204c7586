//! Injected collaborator traits (§6 "external interfaces"). The engine
//! depends only on these traits; no concrete transport (HTTP, gRPC, a
//! specific LLM provider, a specific registry) is assumed anywhere in this
//! crate. Grounded on the teacher's own `async-trait` collaborator
//! boundaries (the build/manifest/LLM clients `main.rs` wires by hand).
//!
//! The "session store" collaborator named in §6 is treated as the same
//! concrete type as [`crate::snapshot::WorkflowStore`] rather than a
//! seventh trait: every operation it names (session CRUD, checkpoint
//! save/restore, workspace get/set) is already covered by `WorkflowStore`'s
//! bucket API, and splitting it into a trait would only add an indirection
//! with one implementation.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use repair_types::{EngineError, TokenUsage};
use serde_json::Value;

#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    pub token_usage: TokenUsage,
}

/// `complete`, `complete-with-filesystem-tools`, `complete-with-format`
/// (§6).
#[async_trait]
pub trait LanguageModelClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<Completion, EngineError>;

    async fn complete_with_filesystem_tools(&self, prompt: &str, base_directory: &Path) -> Result<Completion, EngineError>;

    async fn complete_with_format(&self, template: &str, args: &Value) -> Result<Completion, EngineError>;
}

#[derive(Debug, Clone, Default)]
pub struct BuildOutput {
    pub errors_text: String,
}

/// `build`, `push` (§6).
#[async_trait]
pub trait BuildExecutor: Send + Sync {
    async fn build(&self, recipe_content: &str, context_directory: &Path, registry: &str, image: &str) -> Result<BuildOutput, EngineError>;

    async fn push(&self, registry: &str, image: &str) -> Result<(), EngineError>;
}

#[derive(Debug, Clone, Default)]
pub struct DeployOutput {
    pub ok: bool,
    pub output: String,
}

/// `deploy-and-verify` plus a `kubectl`-installed precheck (§6).
#[async_trait]
pub trait ManifestExecutor: Send + Sync {
    async fn deploy_and_verify(&self, manifest_path: &Path, is_deployment: bool) -> Result<DeployOutput, EngineError>;

    async fn kubectl_installed(&self) -> bool;
}

#[derive(Debug, Clone)]
pub struct FileMetadata {
    pub path: PathBuf,
    pub size: u64,
    pub modified: DateTime<Utc>,
}

/// `read-file`, `list-directory`, `file-exists`, `file-tree`,
/// `read-file-with-metadata`, `search-files`, each scoped by a
/// session-qualified root (§6).
#[async_trait]
pub trait FilesystemAccessService: Send + Sync {
    async fn read_file(&self, session_id: &str, path: &Path) -> Result<Vec<u8>, EngineError>;

    async fn list_directory(&self, session_id: &str, path: &Path) -> Result<Vec<PathBuf>, EngineError>;

    async fn file_exists(&self, session_id: &str, path: &Path) -> Result<bool, EngineError>;

    async fn file_tree(&self, session_id: &str, path: &Path) -> Result<Vec<PathBuf>, EngineError>;

    async fn read_file_with_metadata(&self, session_id: &str, path: &Path) -> Result<(Vec<u8>, FileMetadata), EngineError>;

    async fn search_files(&self, session_id: &str, pattern: &str) -> Result<Vec<PathBuf>, EngineError>;
}

/// `load-template`, `list-templates` (§6).
#[async_trait]
pub trait TemplateLibrary: Send + Sync {
    async fn load_template(&self, relative_path: &str) -> Result<String, EngineError>;

    async fn list_templates(&self) -> Result<Vec<String>, EngineError>;
}
