//! Canonical reference list read from a local file.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use statscollector_core::Bibcode;
use tracing::debug;

use super::{FetchError, IdentifierSource};

/// One identifier per line; surrounding whitespace is trimmed and blank lines
/// are skipped.
#[derive(Debug, Clone)]
pub struct CanonicalFile {
    path: PathBuf,
}

impl CanonicalFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl IdentifierSource for CanonicalFile {
    fn name(&self) -> &'static str {
        "canonical"
    }

    async fn fetch(&self) -> Result<Vec<Bibcode>, FetchError> {
        let contents = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|err| FetchError::Io {
                path: self.path.clone(),
                source: Arc::new(err),
            })?;

        let bibcodes: Vec<Bibcode> = parse_lines(&contents).collect();
        debug!(
            path = %self.path.display(),
            count = bibcodes.len(),
            "canonical list read"
        );
        Ok(bibcodes)
    }
}

fn parse_lines(contents: &str) -> impl Iterator<Item = Bibcode> + '_ {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(Bibcode::from)
}
