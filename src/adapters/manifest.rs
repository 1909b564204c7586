//! `NoopManifestExecutor` — records invocations and reports success, for
//! local runs and tests with no real cluster wired in.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use repair_types::EngineError;

use crate::external::{DeployOutput, ManifestExecutor};

#[derive(Default)]
pub struct NoopManifestExecutor {
    deploys: Mutex<Vec<(PathBuf, bool)>>,
}

impl NoopManifestExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deploys(&self) -> Vec<(PathBuf, bool)> {
        self.deploys.lock().expect("deploy invocation log mutex poisoned").clone()
    }
}

#[async_trait]
impl ManifestExecutor for NoopManifestExecutor {
    async fn deploy_and_verify(&self, manifest_path: &Path, is_deployment: bool) -> Result<DeployOutput, EngineError> {
        self.deploys
            .lock()
            .expect("deploy invocation log mutex poisoned")
            .push((manifest_path.to_path_buf(), is_deployment));
        Ok(DeployOutput { ok: true, output: String::new() })
    }

    async fn kubectl_installed(&self) -> bool {
        false
    }
}
