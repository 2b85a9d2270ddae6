use std::path::{Path, PathBuf};

use async_trait::async_trait;
use shared::{domain::FilePayload, error::WorkspaceError};

/// Host capability that produces files for intake (dialog, drop target, argv).
#[async_trait]
pub trait FilePicker: Send + Sync {
    async fn pick_files(&self) -> Result<Vec<FilePayload>, WorkspaceError>;
}

/// Picker for hosts without any file source. Always yields nothing.
pub struct NoFilePicker;

#[async_trait]
impl FilePicker for NoFilePicker {
    async fn pick_files(&self) -> Result<Vec<FilePayload>, WorkspaceError> {
        Ok(Vec::new())
    }
}

/// Reads a fixed list of paths, labelling each by its extension.
pub struct PathFilePicker {
    paths: Vec<PathBuf>,
}

impl PathFilePicker {
    pub fn new(paths: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            paths: paths.into_iter().collect(),
        }
    }
}

#[async_trait]
impl FilePicker for PathFilePicker {
    async fn pick_files(&self) -> Result<Vec<FilePayload>, WorkspaceError> {
        let mut files = Vec::with_capacity(self.paths.len());
        for path in &self.paths {
            let bytes = tokio::fs::read(path).await.map_err(|err| {
                WorkspaceError::Picker(format!("failed to read {}: {err}", path.display()))
            })?;
            files.push(FilePayload::new(
                file_name_for(path),
                guess_mime_type(path),
                bytes,
            ));
        }
        Ok(files)
    }
}

pub fn guess_mime_type(path: &Path) -> Option<String> {
    mime_guess::from_path(path).first_raw().map(str::to_string)
}

fn file_name_for(path: &Path) -> String {
    path.file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("upload.bin")
        .to_string()
}
