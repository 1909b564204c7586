//! `LocalFilesystemAccess` — walks a local root directory via `walkdir`,
//! matching the teacher's own filesystem-walking use of that crate. Every
//! path is resolved under a session-qualified subdirectory of the root so
//! one session cannot read another's files, and `..` components are
//! rejected outright rather than resolved.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use repair_types::{EngineError, ErrorKind};
use walkdir::WalkDir;

use crate::external::{FileMetadata, FilesystemAccessService};

pub struct LocalFilesystemAccess {
    root: PathBuf,
}

impl LocalFilesystemAccess {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, session_id: &str, path: &Path) -> Result<PathBuf, EngineError> {
        if path.components().any(|c| matches!(c, std::path::Component::ParentDir)) {
            return Err(EngineError::new(ErrorKind::Permission, "path_escapes_session_root", "path must not contain parent-directory components"));
        }
        Ok(self.root.join(session_id).join(path))
    }
}

#[async_trait]
impl FilesystemAccessService for LocalFilesystemAccess {
    async fn read_file(&self, session_id: &str, path: &Path) -> Result<Vec<u8>, EngineError> {
        let full_path = self.resolve(session_id, path)?;
        std::fs::read(&full_path).map_err(|e| EngineError::new(ErrorKind::Filesystem, "read_file_failed", e.to_string()).with_source_location(full_path.display().to_string()))
    }

    async fn list_directory(&self, session_id: &str, path: &Path) -> Result<Vec<PathBuf>, EngineError> {
        let full_path = self.resolve(session_id, path)?;
        let mut entries = Vec::new();
        for entry in std::fs::read_dir(&full_path)
            .map_err(|e| EngineError::new(ErrorKind::Filesystem, "list_directory_failed", e.to_string()))?
        {
            let entry = entry.map_err(|e| EngineError::new(ErrorKind::Filesystem, "list_directory_failed", e.to_string()))?;
            entries.push(entry.path());
        }
        Ok(entries)
    }

    async fn file_exists(&self, session_id: &str, path: &Path) -> Result<bool, EngineError> {
        Ok(self.resolve(session_id, path)?.exists())
    }

    async fn file_tree(&self, session_id: &str, path: &Path) -> Result<Vec<PathBuf>, EngineError> {
        let full_path = self.resolve(session_id, path)?;
        Ok(WalkDir::new(&full_path)
            .into_iter()
            .filter_map(Result::ok)
            .map(|entry| entry.path().to_path_buf())
            .collect())
    }

    async fn read_file_with_metadata(&self, session_id: &str, path: &Path) -> Result<(Vec<u8>, FileMetadata), EngineError> {
        let full_path = self.resolve(session_id, path)?;
        let content = std::fs::read(&full_path).map_err(|e| EngineError::new(ErrorKind::Filesystem, "read_file_failed", e.to_string()))?;
        let metadata = std::fs::metadata(&full_path).map_err(|e| EngineError::new(ErrorKind::Filesystem, "stat_failed", e.to_string()))?;
        let modified: DateTime<Utc> = metadata.modified().map(DateTime::from).unwrap_or_else(|_| Utc::now());
        Ok((
            content,
            FileMetadata {
                path: full_path,
                size: metadata.len(),
                modified,
            },
        ))
    }

    async fn search_files(&self, session_id: &str, pattern: &str) -> Result<Vec<PathBuf>, EngineError> {
        let session_root = self.resolve(session_id, Path::new(""))?;
        let pattern = pattern.to_lowercase();
        Ok(WalkDir::new(&session_root)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| entry.file_name().to_string_lossy().to_lowercase().contains(&pattern))
            .map(|entry| entry.path().to_path_buf())
            .collect())
    }
}
