//! Component A — Run State & History: the in-memory record of a single run.
//! The orchestrator is the sole writer; every other component holds typed
//! readers. Grounded on `phase.rs`'s typed-struct-with-builder-methods style,
//! generalized from a single `Phase` record to the full run record §3
//! describes.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

use repair_types::{EngineError, ErrorKind, MetadataKey, StageOutcome, StageVisit, TokenUsage};

/// The build-recipe artifact slot: text content + filesystem path + last
/// build-error string + a running summary of prior repair attempts (§3).
#[derive(Debug, Clone, Default)]
pub struct BuildArtifact {
    pub content: String,
    pub path: PathBuf,
    pub last_error: String,
    pub repair_summary: String,
}

/// One entry in the deploy-manifests map, keyed by a stable `kind-name`
/// string (§3).
#[derive(Debug, Clone, Default)]
pub struct ManifestEntry {
    pub content: Vec<u8>,
    pub source_path: PathBuf,
    pub last_error: String,
    pub successfully_deployed: bool,
}

/// `{prompt, token-usage, ...}`-shaped record of one completion, kept only
/// when completion-capture is enabled (§3).
#[derive(Debug, Clone, Serialize)]
pub struct CompletionRecord {
    pub prompt: String,
    pub text: String,
    pub token_usage: TokenUsage,
}

/// Default cap on the recent-completions log when capture is enabled.
const DEFAULT_COMPLETION_CAP: usize = 200;

/// The single mutable record carried through one run (§3). All fields are
/// private; mutation goes through methods that enforce the invariants in
/// §4.A / §8.
#[derive(Debug, Clone)]
pub struct RunState {
    iteration_count: u32,
    retry_count: u32,
    success: bool,
    build: BuildArtifact,
    manifests: HashMap<String, ManifestEntry>,
    manifest_order: Vec<String>,
    registry_host: String,
    image_name: String,
    token_usage: TokenUsage,
    visits: Vec<StageVisit>,
    metadata: HashMap<MetadataKey, serde_json::Value>,
    completions: Option<Vec<CompletionRecord>>,
    completion_cap: usize,
}

impl RunState {
    pub fn new(registry_host: impl Into<String>, image_name: impl Into<String>) -> Self {
        Self {
            iteration_count: 0,
            retry_count: 0,
            success: false,
            build: BuildArtifact::default(),
            manifests: HashMap::new(),
            manifest_order: Vec::new(),
            registry_host: registry_host.into(),
            image_name: image_name.into(),
            token_usage: TokenUsage::default(),
            visits: Vec::new(),
            metadata: HashMap::new(),
            completions: None,
            completion_cap: DEFAULT_COMPLETION_CAP,
        }
    }

    /// Enables bounded recent-completions recording.
    pub fn with_completion_capture(mut self, cap: usize) -> Self {
        self.completions = Some(Vec::new());
        self.completion_cap = cap.max(1);
        self
    }

    // -- readers -----------------------------------------------------------

    pub fn iteration_count(&self) -> u32 {
        self.iteration_count
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn success(&self) -> bool {
        self.success
    }

    pub fn build(&self) -> &BuildArtifact {
        &self.build
    }

    pub fn manifests(&self) -> impl Iterator<Item = (&str, &ManifestEntry)> {
        self.manifest_order
            .iter()
            .map(|key| (key.as_str(), self.manifests.get(key).expect("manifest_order is kept in sync")))
    }

    pub fn registry_host(&self) -> &str {
        &self.registry_host
    }

    pub fn image_name(&self) -> &str {
        &self.image_name
    }

    pub fn token_usage(&self) -> TokenUsage {
        self.token_usage
    }

    pub fn visits(&self) -> &[StageVisit] {
        &self.visits
    }

    pub fn metadata(&self) -> &HashMap<MetadataKey, serde_json::Value> {
        &self.metadata
    }

    pub fn completions(&self) -> Option<&[CompletionRecord]> {
        self.completions.as_deref()
    }

    /// Whether deploy operations are permitted: both registry coordinates
    /// must be non-empty (§3).
    pub fn registry_ready(&self) -> bool {
        !self.registry_host.is_empty() && !self.image_name.is_empty()
    }

    // -- writers (orchestrator-only) ----------------------------------------

    pub fn increment_iteration(&mut self) {
        self.iteration_count += 1;
    }

    pub fn increment_retry(&mut self) {
        self.retry_count += 1;
    }

    pub fn reset_retry(&mut self) {
        self.retry_count = 0;
    }

    pub fn mark_success(&mut self) {
        self.success = true;
    }

    /// Appends a stage visit. §4.A / §8: the visit log must grow by exactly
    /// one entry per `stage.Run` return observed by the orchestrator.
    pub fn record_visit(&mut self, stage_id: impl Into<String>, retry_count: u32, outcome: StageOutcome) {
        self.visits.push(StageVisit::new(stage_id, retry_count, outcome));
    }

    /// Accumulates token usage; `total` always reconciles to `prompt +
    /// completion` (§4.A invariant).
    pub fn accumulate_tokens(&mut self, prompt: u64, completion: u64) {
        self.token_usage.accumulate(prompt, completion);
        debug_assert!(self.token_usage.is_consistent());
    }

    pub fn set_registry(&mut self, host: impl Into<String>, image: impl Into<String>) {
        self.registry_host = host.into();
        self.image_name = image.into();
    }

    pub fn set_build_content(&mut self, content: impl Into<String>, path: impl Into<PathBuf>) {
        self.build.content = content.into();
        self.build.path = path.into();
        self.build.last_error.clear();
    }

    pub fn set_build_error(&mut self, error: impl Into<String>) {
        self.build.last_error = error.into();
    }

    pub fn append_repair_summary(&mut self, note: impl AsRef<str>) {
        if !self.build.repair_summary.is_empty() {
            self.build.repair_summary.push('\n');
        }
        self.build.repair_summary.push_str(note.as_ref());
    }

    /// Inserts or replaces a manifest entry. Key uniqueness is the
    /// invariant: re-inserting an existing key replaces its entry in place
    /// rather than duplicating it.
    pub fn upsert_manifest(&mut self, key: impl Into<String>, entry: ManifestEntry) {
        let key = key.into();
        if !self.manifests.contains_key(&key) {
            self.manifest_order.push(key.clone());
        }
        self.manifests.insert(key, entry);
    }

    /// Marks a manifest entry deployed. A `successfully-deployed = true`
    /// entry must have an empty error log (§4.A invariant) — enforced here
    /// by clearing it rather than trusting the caller.
    pub fn mark_manifest_deployed(&mut self, key: &str) -> Result<(), EngineError> {
        let entry = self.manifests.get_mut(key).ok_or_else(|| {
            EngineError::new(ErrorKind::Internal, "unknown_manifest_key", format!("no manifest entry for key {key}"))
        })?;
        entry.successfully_deployed = true;
        entry.last_error.clear();
        Ok(())
    }

    pub fn set_metadata(&mut self, key: MetadataKey, value: serde_json::Value) {
        self.metadata.insert(key, value);
    }

    pub fn get_metadata(&self, key: MetadataKey) -> Option<&serde_json::Value> {
        self.metadata.get(&key)
    }

    /// Records a completion if capture is enabled, dropping the oldest entry
    /// once the bound is reached.
    pub fn record_completion(&mut self, record: CompletionRecord) {
        if let Some(log) = self.completions.as_mut() {
            if log.len() >= self.completion_cap {
                log.remove(0);
            }
            log.push(record);
        }
    }

    /// Writes artifact slots to their filesystem paths. Invoked only at
    /// successful terminations, and only for slots whose `last_error` is
    /// empty and whose content is non-empty (§4.A).
    pub fn write_successful_artifacts(&self) -> Result<(), EngineError> {
        if self.build.last_error.is_empty() && !self.build.content.is_empty() {
            write_file(&self.build.path, self.build.content.as_bytes())?;
        }
        for (_key, entry) in self.manifests() {
            if entry.last_error.is_empty() && !entry.content.is_empty() {
                write_file(&entry.source_path, &entry.content)?;
            }
        }
        Ok(())
    }
}

fn write_file(path: &Path, content: &[u8]) -> Result<(), EngineError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            EngineError::new(ErrorKind::Filesystem, "create_dir_failed", e.to_string())
                .with_source_location(parent.display().to_string())
        })?;
    }
    fs::write(path, content).map_err(|e| {
        EngineError::new(ErrorKind::Filesystem, "write_file_failed", e.to_string())
            .with_source_location(path.display().to_string())
    })
}
