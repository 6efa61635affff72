//! Filesystem path helpers (XDG-aware) for archive credentials and local
//! archive storage.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use thiserror::Error;

use crate::constants::{CREDENTIALS_FILE_NAME, TOKEN_FILE_NAME};

#[derive(Debug, Error)]
pub enum PathError {
    #[error("unable to determine project directories")]
    MissingProjectDirs,
    #[error("failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Default locations used when the configuration leaves a path unset. In
/// production this is `$XDG_CONFIG_HOME/statscollector` and
/// `$XDG_DATA_HOME/statscollector`; tests construct custom instances.
#[derive(Debug, Clone)]
pub struct AppPaths {
    config_dir: PathBuf,
    data_dir: PathBuf,
}

impl AppPaths {
    pub fn from_project_dirs() -> Result<Self, PathError> {
        let dirs = ProjectDirs::from("org", "adsabs", "statscollector")
            .ok_or(PathError::MissingProjectDirs)?;
        Ok(Self::new(dirs.config_dir(), dirs.data_dir()))
    }

    /// Paths rooted at the provided directories. Nothing is created until a
    /// caller asks for a writable directory.
    pub fn new<C: AsRef<Path>, D: AsRef<Path>>(config_dir: C, data_dir: D) -> Self {
        Self {
            config_dir: config_dir.as_ref().to_path_buf(),
            data_dir: data_dir.as_ref().to_path_buf(),
        }
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// OAuth client secrets (`.../credentials.json`).
    pub fn credentials_file(&self) -> PathBuf {
        self.config_dir.join(CREDENTIALS_FILE_NAME)
    }

    /// Stored OAuth token (`.../token.json`).
    pub fn token_file(&self) -> PathBuf {
        self.config_dir.join(TOKEN_FILE_NAME)
    }

    /// Root for the filesystem archive backend (`.../archive`), created on
    /// demand.
    pub fn archive_dir(&self) -> Result<PathBuf, PathError> {
        ensure_dir(&self.data_dir.join("archive"))
    }
}

pub(crate) fn ensure_dir(path: &Path) -> Result<PathBuf, PathError> {
    if let Err(err) = fs::create_dir_all(path) {
        if err.kind() != io::ErrorKind::AlreadyExists {
            return Err(PathError::CreateDir {
                path: path.to_path_buf(),
                source: err,
            });
        }
    }
    Ok(path.to_path_buf())
}
