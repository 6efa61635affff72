//! Storage backends for dated archive folders of reconciliation files.

use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::fs;

use crate::paths::PathError;

/// Errors emitted by archive storage operations.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("invalid archive name `{name}` (empty or contains path separators)")]
    InvalidName { name: String },
    #[error("archive folder `{id}` not found")]
    NotFound { id: String },
    #[error("filesystem error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{what} file {path} not found")]
    MissingCredentials { what: &'static str, path: PathBuf },
    #[error("invalid {what} file {path}: {reason}")]
    InvalidCredentials {
        what: &'static str,
        path: PathBuf,
        reason: String,
    },
    #[error("archive parent folder id is not configured")]
    MissingParentFolder,
    #[error("invalid URL `{0}`")]
    InvalidUrl(String),
    #[error("request error during `{stage}`: {source}")]
    Request {
        stage: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("unexpected HTTP status {status} during `{stage}`")]
    HttpStatus { stage: &'static str, status: u16 },
    #[error("JSON decode error during `{stage}`: {source}")]
    Json {
        stage: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error(transparent)]
    Paths(#[from] PathError),
}

impl ArchiveError {
    fn io(path: &Path, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::NotFound {
            return Self::NotFound {
                id: path.display().to_string(),
            };
        }
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// A folder directly under the archive root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderEntry {
    pub id: String,
    pub name: String,
    pub modified: DateTime<Utc>,
}

/// Trait abstracting over archive backends. Folders live directly under one
/// configured parent; files live directly inside a folder.
#[async_trait::async_trait]
pub trait ArchiveStore: Send + Sync {
    /// Short backend name used in log records.
    fn backend(&self) -> &'static str;

    /// Every folder under the parent, in no particular order.
    async fn list_folders(&self) -> Result<Vec<FolderEntry>, ArchiveError>;

    /// Create a folder named `name` and return its id.
    async fn create_folder(&self, name: &str) -> Result<String, ArchiveError>;

    /// Store `contents` as a plain-text file inside `folder_id`.
    async fn put_text(
        &self,
        folder_id: &str,
        file_name: &str,
        contents: String,
    ) -> Result<(), ArchiveError>;

    /// Delete a folder together with everything inside it.
    async fn delete_folder(&self, folder_id: &str) -> Result<(), ArchiveError>;

    /// First folder named exactly `name`, if any.
    async fn find_folder(&self, name: &str) -> Result<Option<FolderEntry>, ArchiveError> {
        Ok(self
            .list_folders()
            .await?
            .into_iter()
            .find(|folder| folder.name == name))
    }
}

/// Reject names that would escape the archive root.
pub fn validate_name(name: &str) -> Result<(), ArchiveError> {
    let trimmed = name.trim();
    if trimmed.is_empty()
        || trimmed == "."
        || trimmed == ".."
        || trimmed.contains(['/', '\\'])
    {
        return Err(ArchiveError::InvalidName {
            name: name.to_string(),
        });
    }
    Ok(())
}

/// Archive kept in a local directory; folder ids are the folder names.
#[derive(Debug, Clone, bon::Builder)]
pub struct FsArchiveStore {
    #[builder(into)]
    root: PathBuf,
}

impl FsArchiveStore {
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn folder_path(&self, folder_id: &str) -> Result<PathBuf, ArchiveError> {
        validate_name(folder_id)?;
        Ok(self.root.join(folder_id))
    }
}

#[async_trait::async_trait]
impl ArchiveStore for FsArchiveStore {
    fn backend(&self) -> &'static str {
        "fs"
    }

    async fn list_folders(&self) -> Result<Vec<FolderEntry>, ArchiveError> {
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(ArchiveError::io(&self.root, err)),
        };

        let mut folders = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|err| ArchiveError::io(&self.root, err))?
        {
            let path = entry.path();
            let metadata = entry
                .metadata()
                .await
                .map_err(|err| ArchiveError::io(&path, err))?;
            if !metadata.is_dir() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            let modified = metadata
                .modified()
                .map(DateTime::<Utc>::from)
                .map_err(|err| ArchiveError::io(&path, err))?;
            folders.push(FolderEntry {
                id: name.clone(),
                name,
                modified,
            });
        }
        Ok(folders)
    }

    async fn create_folder(&self, name: &str) -> Result<String, ArchiveError> {
        let path = self.folder_path(name)?;
        fs::create_dir_all(&path)
            .await
            .map_err(|err| ArchiveError::io(&path, err))?;
        Ok(name.to_string())
    }

    async fn put_text(
        &self,
        folder_id: &str,
        file_name: &str,
        contents: String,
    ) -> Result<(), ArchiveError> {
        validate_name(file_name)?;
        let folder = self.folder_path(folder_id)?;
        if !fs::try_exists(&folder).await.unwrap_or(false) {
            return Err(ArchiveError::NotFound {
                id: folder_id.to_string(),
            });
        }
        let path = folder.join(file_name);
        fs::write(&path, contents)
            .await
            .map_err(|err| ArchiveError::io(&path, err))
    }

    async fn delete_folder(&self, folder_id: &str) -> Result<(), ArchiveError> {
        let path = self.folder_path(folder_id)?;
        fs::remove_dir_all(&path)
            .await
            .map_err(|err| ArchiveError::io(&path, err))
    }
}
