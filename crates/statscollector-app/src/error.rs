//! Application-level error type surfaced to the binary.

use thiserror::Error;

use crate::config::AppConfigError;
use crate::services::archive::ArchiveError;
use crate::services::pushgateway::PublishError;
use crate::sources::FetchError;

/// Failures that end the process with a non-zero exit.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    ConfigLoad(#[from] AppConfigError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Publish(#[from] PublishError),
    #[error(transparent)]
    Archive(#[from] ArchiveError),
}
