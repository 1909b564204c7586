//! `LocalTemplateLibrary` — loads templates from a local directory tree.

use std::path::PathBuf;

use async_trait::async_trait;
use repair_types::{EngineError, ErrorKind};
use walkdir::WalkDir;

use crate::external::TemplateLibrary;

pub struct LocalTemplateLibrary {
    root: PathBuf,
}

impl LocalTemplateLibrary {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl TemplateLibrary for LocalTemplateLibrary {
    async fn load_template(&self, relative_path: &str) -> Result<String, EngineError> {
        let full_path = self.root.join(relative_path);
        std::fs::read_to_string(&full_path)
            .map_err(|e| EngineError::new(ErrorKind::Filesystem, "load_template_failed", e.to_string()).with_source_location(full_path.display().to_string()))
    }

    async fn list_templates(&self) -> Result<Vec<String>, EngineError> {
        Ok(WalkDir::new(&self.root)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .filter_map(|entry| entry.path().strip_prefix(&self.root).ok().map(|p| p.display().to_string()))
            .collect())
    }
}
