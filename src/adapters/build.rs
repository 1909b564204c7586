//! `NoopBuildExecutor` — records invocations and reports success, for local
//! runs and tests with no real container builder wired in.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use repair_types::EngineError;

use crate::external::{BuildExecutor, BuildOutput};

#[derive(Debug, Clone, PartialEq)]
pub struct BuildInvocation {
    pub context_directory: PathBuf,
    pub registry: String,
    pub image: String,
}

#[derive(Default)]
pub struct NoopBuildExecutor {
    builds: Mutex<Vec<BuildInvocation>>,
    pushes: Mutex<Vec<(String, String)>>,
}

impl NoopBuildExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builds(&self) -> Vec<BuildInvocation> {
        self.builds.lock().expect("build invocation log mutex poisoned").clone()
    }

    pub fn pushes(&self) -> Vec<(String, String)> {
        self.pushes.lock().expect("push invocation log mutex poisoned").clone()
    }
}

#[async_trait]
impl BuildExecutor for NoopBuildExecutor {
    async fn build(&self, _recipe_content: &str, context_directory: &Path, registry: &str, image: &str) -> Result<BuildOutput, EngineError> {
        self.builds.lock().expect("build invocation log mutex poisoned").push(BuildInvocation {
            context_directory: context_directory.to_path_buf(),
            registry: registry.to_string(),
            image: image.to_string(),
        });
        Ok(BuildOutput::default())
    }

    async fn push(&self, registry: &str, image: &str) -> Result<(), EngineError> {
        self.pushes.lock().expect("push invocation log mutex poisoned").push((registry.to_string(), image.to_string()));
        Ok(())
    }
}
