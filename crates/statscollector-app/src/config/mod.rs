//! Configuration loading.
//!
//! Layers, lowest precedence first: built-in defaults, `config/settings.*` in
//! the working directory, the file named by `--config` (or
//! `STATSCOLLECTOR_CONFIG_FILE`), then `STATSCOLLECTOR__SECTION__KEY`
//! environment variables.

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;

use crate::constants::{
    DEFAULT_CANONICAL_FILE, DEFAULT_CONTAINER_NAMES, DEFAULT_DRIVE_API_URL,
    DEFAULT_DRIVE_TOKEN_URL, DEFAULT_GRAYLOG_CONTAINER_QUERY, DEFAULT_GRAYLOG_MYADS_QUERY,
    DEFAULT_KEEP_LAST_FOLDERS, DEFAULT_PUSHGATEWAY_INSTANCE, DEFAULT_PUSHGATEWAY_PROVIDER,
    DEFAULT_PUSHGATEWAY_URL, DEFAULT_SOLR_CURSOR_ROWS, DEFAULT_SOLR_URL,
};

const CONFIG_FILE: &str = "config/settings";
const CONFIG_FILE_ENV: &str = "STATSCOLLECTOR_CONFIG_FILE";
const ENV_PREFIX: &str = "STATSCOLLECTOR";

#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("configuration file {path} does not exist")]
    MissingFile { path: PathBuf },
    #[error(transparent)]
    Build(#[from] config::ConfigError),
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub pushgateway: PushgatewayConfig,
    #[serde(default)]
    pub solr: SolrConfig,
    #[serde(default)]
    pub postgres: PostgresConfig,
    #[serde(default)]
    pub graylog: GraylogConfig,
    #[serde(default)]
    pub classic: ClassicConfig,
    #[serde(default)]
    pub archive: ArchiveConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_string()
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct HttpConfig {
    /// Per-request timeout applied to every backend call.
    #[serde(default = "HttpConfig::default_timeout_secs")]
    pub timeout_secs: u64,
}

impl HttpConfig {
    fn default_timeout_secs() -> u64 {
        30
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: Self::default_timeout_secs(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct PushgatewayConfig {
    #[serde(default = "PushgatewayConfig::default_url")]
    pub url: String,
    #[serde(default = "PushgatewayConfig::default_provider")]
    pub provider: String,
    #[serde(default = "PushgatewayConfig::default_instance")]
    pub instance: Option<String>,
}

impl PushgatewayConfig {
    fn default_url() -> String {
        DEFAULT_PUSHGATEWAY_URL.to_string()
    }

    fn default_provider() -> String {
        DEFAULT_PUSHGATEWAY_PROVIDER.to_string()
    }

    fn default_instance() -> Option<String> {
        Some(DEFAULT_PUSHGATEWAY_INSTANCE.to_string())
    }
}

impl Default for PushgatewayConfig {
    fn default() -> Self {
        Self {
            url: Self::default_url(),
            provider: Self::default_provider(),
            instance: Self::default_instance(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SolrConfig {
    #[serde(default = "SolrConfig::default_url")]
    pub url: String,
    /// Page size for cursor-based bibcode listing.
    #[serde(default = "SolrConfig::default_cursor_rows")]
    pub cursor_rows: usize,
}

impl SolrConfig {
    fn default_url() -> String {
        DEFAULT_SOLR_URL.to_string()
    }

    fn default_cursor_rows() -> usize {
        DEFAULT_SOLR_CURSOR_ROWS
    }
}

impl Default for SolrConfig {
    fn default() -> Self {
        Self {
            url: Self::default_url(),
            cursor_rows: Self::default_cursor_rows(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct PostgresConfig {
    #[serde(default = "PostgresConfig::default_host")]
    pub host: String,
    #[serde(default = "PostgresConfig::default_port")]
    pub port: u16,
    #[serde(default = "PostgresConfig::default_user")]
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "PostgresConfig::default_database")]
    pub database: String,
    /// Look-back window for the created/updated/processed counts, as a
    /// Postgres interval literal.
    #[serde(default = "PostgresConfig::default_interval")]
    pub interval: String,
}

impl PostgresConfig {
    fn default_host() -> String {
        "localhost".to_string()
    }

    fn default_port() -> u16 {
        5432
    }

    fn default_user() -> String {
        "user".to_string()
    }

    fn default_database() -> String {
        "master_pipeline".to_string()
    }

    fn default_interval() -> String {
        "1 hours".to_string()
    }
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            host: Self::default_host(),
            port: Self::default_port(),
            user: Self::default_user(),
            password: String::new(),
            database: Self::default_database(),
            interval: Self::default_interval(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct GraylogConfig {
    #[serde(default = "GraylogConfig::default_url")]
    pub url: String,
    #[serde(default)]
    pub token: String,
    #[serde(default = "GraylogConfig::default_myads_query")]
    pub myads_query: String,
    /// Query template; `{}` is replaced by each container name.
    #[serde(default = "GraylogConfig::default_container_query")]
    pub container_query: String,
    #[serde(default = "GraylogConfig::default_container_names")]
    pub container_names: Vec<String>,
    #[serde(default = "GraylogConfig::default_window_minutes")]
    pub window_minutes: i64,
}

impl GraylogConfig {
    fn default_url() -> String {
        "http://localhost:9000/".to_string()
    }

    fn default_myads_query() -> String {
        DEFAULT_GRAYLOG_MYADS_QUERY.to_string()
    }

    fn default_container_query() -> String {
        DEFAULT_GRAYLOG_CONTAINER_QUERY.to_string()
    }

    fn default_container_names() -> Vec<String> {
        DEFAULT_CONTAINER_NAMES.iter().map(|s| s.to_string()).collect()
    }

    fn default_window_minutes() -> i64 {
        60
    }
}

impl Default for GraylogConfig {
    fn default() -> Self {
        Self {
            url: Self::default_url(),
            token: String::new(),
            myads_query: Self::default_myads_query(),
            container_query: Self::default_container_query(),
            container_names: Self::default_container_names(),
            window_minutes: Self::default_window_minutes(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ClassicConfig {
    #[serde(default = "ClassicConfig::default_canonical_file")]
    pub canonical_file: PathBuf,
    /// Substrings marking identifiers that never count as "extra".
    #[serde(default = "ClassicConfig::default_exempt_markers")]
    pub exempt_markers: Vec<String>,
}

impl ClassicConfig {
    fn default_canonical_file() -> PathBuf {
        PathBuf::from(DEFAULT_CANONICAL_FILE)
    }

    fn default_exempt_markers() -> Vec<String> {
        vec![statscollector_core::exemption::ZENODO_MARKER.to_string()]
    }
}

impl Default for ClassicConfig {
    fn default() -> Self {
        Self {
            canonical_file: Self::default_canonical_file(),
            exempt_markers: Self::default_exempt_markers(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveBackend {
    #[default]
    Drive,
    Fs,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ArchiveConfig {
    #[serde(default)]
    pub backend: ArchiveBackend,
    /// Number of dated folders kept after each upload.
    #[serde(default = "ArchiveConfig::default_keep_last")]
    pub keep_last: usize,
    /// Root directory for the `fs` backend.
    #[serde(default)]
    pub fs_root: Option<PathBuf>,
    #[serde(default)]
    pub drive: DriveConfig,
}

impl ArchiveConfig {
    fn default_keep_last() -> usize {
        DEFAULT_KEEP_LAST_FOLDERS
    }
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            backend: ArchiveBackend::default(),
            keep_last: Self::default_keep_last(),
            fs_root: None,
            drive: DriveConfig::default(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DriveConfig {
    #[serde(default = "DriveConfig::default_api_url")]
    pub api_url: String,
    #[serde(default = "DriveConfig::default_token_url")]
    pub token_url: String,
    /// Parent folder receiving the dated subfolders.
    #[serde(default)]
    pub folder_id: String,
    #[serde(default)]
    pub credentials_file: Option<PathBuf>,
    #[serde(default)]
    pub token_file: Option<PathBuf>,
}

impl DriveConfig {
    fn default_api_url() -> String {
        DEFAULT_DRIVE_API_URL.to_string()
    }

    fn default_token_url() -> String {
        DEFAULT_DRIVE_TOKEN_URL.to_string()
    }
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            api_url: Self::default_api_url(),
            token_url: Self::default_token_url(),
            folder_id: String::new(),
            credentials_file: None,
            token_file: None,
        }
    }
}

/// Load configuration without an explicit override file.
pub fn load() -> Result<AppConfig, AppConfigError> {
    load_from(None)
}

/// Load configuration, layering `override_file` (or the file named by
/// `STATSCOLLECTOR_CONFIG_FILE`) above the working-directory settings.
pub fn load_from(override_file: Option<&Path>) -> Result<AppConfig, AppConfigError> {
    let override_file = override_file
        .map(Path::to_path_buf)
        .or_else(|| env::var_os(CONFIG_FILE_ENV).map(PathBuf::from));

    let mut builder = Config::builder().add_source(File::with_name(CONFIG_FILE).required(false));

    if let Some(path) = override_file {
        if !path.exists() {
            return Err(AppConfigError::MissingFile { path });
        }
        builder = builder.add_source(File::from(path).required(true));
    }

    let builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator("__")
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("graylog.container_names")
            .with_list_parse_key("classic.exempt_markers"),
    );

    let cfg = builder.build()?.try_deserialize()?;
    Ok(cfg)
}
