//! Backends that yield identifier sets and metric snapshots.

pub mod classic;
pub mod graylog;
pub mod postgres;
pub mod solr;

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use statscollector_core::{Bibcode, IdentifierSet, MetricTree};
use thiserror::Error;
use tracing::{info, warn};
use url::{ParseError, Url};

use crate::constants::USER_AGENT;

pub use classic::CanonicalFile;
pub use graylog::GraylogClient;
pub use postgres::{PostgresSource, RecordQuery};
pub use solr::SolrClient;

/// Failure while fetching from one backend.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("invalid base URL `{0}`")]
    InvalidBaseUrl(String),
    #[error("failed to join `{path}` onto base URL: {source}")]
    UrlJoin {
        path: String,
        #[source]
        source: ParseError,
    },
    #[error("request error during `{stage}`: {source}")]
    Request {
        stage: &'static str,
        #[source]
        source: Arc<reqwest::Error>,
    },
    #[error("unexpected HTTP status {status} during `{stage}`")]
    HttpStatus { stage: &'static str, status: u16 },
    #[error("JSON decode error during `{stage}`: {source}")]
    Json {
        stage: &'static str,
        #[source]
        source: Arc<reqwest::Error>,
    },
    #[error("malformed response during `{stage}`: {message}")]
    Malformed {
        stage: &'static str,
        message: String,
    },
    #[error("database error during `{stage}`: {source}")]
    Database {
        stage: &'static str,
        #[source]
        source: Arc<sqlx::Error>,
    },
    #[error("`{stage}` did not finish within {after:?}")]
    Timeout { stage: &'static str, after: Duration },
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: Arc<std::io::Error>,
    },
}

impl FetchError {
    pub fn request(stage: &'static str, error: reqwest::Error) -> Self {
        Self::Request {
            stage,
            source: Arc::new(error),
        }
    }

    pub fn json(stage: &'static str, error: reqwest::Error) -> Self {
        Self::Json {
            stage,
            source: Arc::new(error),
        }
    }

    pub fn malformed(stage: &'static str, message: impl Into<String>) -> Self {
        Self::Malformed {
            stage,
            message: message.into(),
        }
    }

    pub fn database(stage: &'static str, error: sqlx::Error) -> Self {
        Self::Database {
            stage,
            source: Arc::new(error),
        }
    }
}

/// A backend holding one copy of the identifier collection.
#[async_trait]
pub trait IdentifierSource: Send + Sync {
    /// Short name used in log records.
    fn name(&self) -> &'static str;

    /// Every identifier the backend currently holds.
    async fn fetch(&self) -> Result<Vec<Bibcode>, FetchError>;
}

/// A backend reporting a nested statistics snapshot.
///
/// Collection never fails as a whole: each independent sub-query that fails
/// is logged and left out of the returned tree.
#[async_trait]
pub trait MetricCollector: Send + Sync {
    fn series(&self) -> &'static str;

    async fn collect(&self) -> MetricTree;
}

/// Fetch from `source`, degrading any failure to an empty set.
///
/// An empty set is skipped by reconciliation, so a broken backend produces no
/// discrepancy counts rather than false ones.
pub async fn fetch_or_empty(source: &dyn IdentifierSource) -> IdentifierSet {
    match source.fetch().await {
        Ok(bibcodes) => {
            let set: IdentifierSet = bibcodes.into_iter().filter(|b| !b.is_blank()).collect();
            info!(
                event = "identifiers_fetched",
                source = source.name(),
                count = set.len(),
                "identifier set loaded"
            );
            set
        }
        Err(err) => {
            warn!(
                event = "identifiers_unavailable",
                source = source.name(),
                error = %err,
                "identifier fetch failed; treating set as empty"
            );
            IdentifierSet::new()
        }
    }
}

/// Await `call`, failing with `FetchError::Timeout` once `limit` elapses.
pub(crate) async fn with_deadline<T, F>(
    stage: &'static str,
    limit: Duration,
    call: F,
) -> Result<T, FetchError>
where
    F: Future<Output = Result<T, FetchError>>,
{
    tokio::time::timeout(limit, call)
        .await
        .map_err(|_| FetchError::Timeout {
            stage,
            after: limit,
        })?
}

pub(crate) fn http_client(timeout: Duration) -> Result<Client, FetchError> {
    Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .map_err(|err| FetchError::request("build_client", err))
}

/// Parse a base URL, forcing a trailing slash so relative joins append
/// rather than replace the last segment.
pub(crate) fn parse_base_url(raw: &str) -> Result<Url, FetchError> {
    let trimmed = raw.trim();
    let normalized = if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{trimmed}/")
    };
    Url::parse(&normalized).map_err(|_| FetchError::InvalidBaseUrl(raw.to_string()))
}

pub(crate) fn join_url(base: &Url, path: &str) -> Result<Url, FetchError> {
    base.join(path).map_err(|source| FetchError::UrlJoin {
        path: path.to_string(),
        source,
    })
}

/// Check the status and decode a JSON body.
pub(crate) async fn read_json<T: DeserializeOwned>(
    stage: &'static str,
    response: Response,
) -> Result<T, FetchError> {
    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::HttpStatus {
            stage,
            status: status.as_u16(),
        });
    }
    response
        .json::<T>()
        .await
        .map_err(|err| FetchError::json(stage, err))
}
