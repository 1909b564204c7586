//! Layered engine configuration: CLI flags > environment variables > a
//! `forge.toml` file > built-in defaults, mirroring the CLI>env>file>default
//! resolution order the teacher's `Config`/`ForgeConfig` pair uses.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use repair_types::{EngineError, ErrorKind};

/// The 30-minute job deadline and 1-hour default TTL are load-bearing
/// defaults carried over from the source (§9); they are configurable here
/// but the defaults stand.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub worker_count: usize,
    pub job_deadline_secs: u64,
    pub job_ttl_secs: u64,
    pub cleanup_tick_secs: u64,
    pub report_root: String,
    pub snapshot_enabled: bool,
    pub completion_capture_enabled: bool,
    pub persistence_path: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            worker_count: 5,
            job_deadline_secs: 30 * 60,
            job_ttl_secs: 60 * 60,
            cleanup_tick_secs: 10 * 60,
            report_root: "forge-report".to_string(),
            snapshot_enabled: true,
            completion_capture_enabled: false,
            persistence_path: None,
        }
    }
}

impl EngineConfig {
    pub fn job_deadline(&self) -> Duration {
        Duration::from_secs(self.job_deadline_secs)
    }

    pub fn job_ttl(&self) -> Duration {
        Duration::from_secs(self.job_ttl_secs)
    }

    pub fn cleanup_tick(&self) -> Duration {
        Duration::from_secs(self.cleanup_tick_secs)
    }

    /// Layers a `forge.toml` file (if present) and `FORGE_*` environment
    /// variables over the built-in defaults. CLI flags are applied by the
    /// caller afterward via the `with_*` builder methods.
    pub fn load(project_dir: &Path) -> Result<Self, EngineError> {
        dotenvy::dotenv().ok();

        let mut config = Self::default();

        let toml_path = project_dir.join("forge.toml");
        if toml_path.exists() {
            let content = std::fs::read_to_string(&toml_path).map_err(|e| {
                EngineError::new(ErrorKind::Configuration, "config_read_failed", e.to_string())
                    .with_source_location(toml_path.display().to_string())
            })?;
            config = toml::from_str(&content).map_err(|e| {
                EngineError::new(ErrorKind::Configuration, "config_parse_failed", e.to_string())
                    .with_source_location(toml_path.display().to_string())
            })?;
        }

        if let Ok(value) = std::env::var("FORGE_WORKER_COUNT") {
            config.worker_count = value.parse().map_err(|_| {
                EngineError::new(
                    ErrorKind::Configuration,
                    "invalid_env_var",
                    "FORGE_WORKER_COUNT must be a positive integer",
                )
            })?;
        }
        if let Ok(value) = std::env::var("FORGE_REPORT_ROOT") {
            config.report_root = value;
        }
        if let Ok(value) = std::env::var("FORGE_SNAPSHOT_ENABLED") {
            config.snapshot_enabled = value != "0" && value.to_lowercase() != "false";
        }

        if config.persistence_path.is_none() {
            config.persistence_path = default_persistence_path();
        }

        Ok(config)
    }

    pub fn with_worker_count(mut self, count: usize) -> Self {
        self.worker_count = count;
        self
    }

    pub fn with_report_root(mut self, root: impl Into<String>) -> Self {
        self.report_root = root.into();
        self
    }
}

fn default_persistence_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".forge").join("workflow.db"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn defaults_match_load_bearing_values() {
        let config = EngineConfig::default();
        assert_eq!(config.worker_count, 5);
        assert_eq!(config.job_deadline(), Duration::from_secs(1800));
        assert_eq!(config.job_ttl(), Duration::from_secs(3600));
        assert_eq!(config.cleanup_tick(), Duration::from_secs(600));
    }

    #[test]
    fn load_without_forge_toml_falls_back_to_defaults() {
        let dir = tempdir().unwrap();
        let config = EngineConfig::load(dir.path()).unwrap();
        assert_eq!(config.worker_count, 5);
        assert!(config.persistence_path.is_some());
    }

    #[test]
    fn load_reads_forge_toml_overrides() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("forge.toml"), "worker_count = 9\nreport_root = \"custom-report\"\n").unwrap();
        let config = EngineConfig::load(dir.path()).unwrap();
        assert_eq!(config.worker_count, 9);
        assert_eq!(config.report_root, "custom-report");
    }

    #[test]
    fn builder_methods_override_fields() {
        let config = EngineConfig::default().with_worker_count(2).with_report_root("r");
        assert_eq!(config.worker_count, 2);
        assert_eq!(config.report_root, "r");
    }
}
