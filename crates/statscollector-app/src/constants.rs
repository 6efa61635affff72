//! Cross-cutting application constants.

/// Series name for Graylog log-volume counts.
pub const SERIES_LOGS: &str = "logs";
/// Series name for search-index statistics.
pub const SERIES_SOLR: &str = "solr";
/// Series name for database record statistics.
pub const SERIES_DATABASE: &str = "master_pipeline_records";
/// Series name for reconciliation summaries.
pub const SERIES_CLASSIC: &str = "classic";

pub const DEFAULT_PUSHGATEWAY_URL: &str = "http://localhost:9091";
pub const DEFAULT_PUSHGATEWAY_PROVIDER: &str = "ADSStatsCollector";
pub const DEFAULT_PUSHGATEWAY_INSTANCE: &str = "stats_collector";

pub const DEFAULT_SOLR_URL: &str = "http://localhost:9983/solr/collection1/";
pub const DEFAULT_SOLR_CURSOR_ROWS: usize = 20_000;

pub const DEFAULT_CANONICAL_FILE: &str = "/bibcodes.list.can";

pub const DEFAULT_GRAYLOG_MYADS_QUERY: &str =
    "namespace_name:back-prod AND container_name:myads_pipeline AND message:\"Email sent to *\"";
pub const DEFAULT_GRAYLOG_CONTAINER_QUERY: &str = "namespace_name:back-prod AND container_name:{}";

/// Containers whose hourly log volume is tracked.
pub const DEFAULT_CONTAINER_NAMES: &[&str] = &[
    "fulltext_pipeline",
    "citation_capture_pipeline",
    "import_pipeline",
    "orcid_pipeline",
    "master_pipeline",
    "augment_pipeline",
    "data_pipeline",
    "myads_pipeline",
    "montysolr",
    "postgresql",
    "rabbitmq",
    "article_of_the_day",
    "doc_matching_pipeline",
    "neo4j",
];

pub const DEFAULT_KEEP_LAST_FOLDERS: usize = 7;

pub const DEFAULT_DRIVE_API_URL: &str = "https://www.googleapis.com/";
pub const DEFAULT_DRIVE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
pub const DRIVE_FOLDER_MIME: &str = "application/vnd.google-apps.folder";

pub const CREDENTIALS_FILE_NAME: &str = "credentials.json";
pub const TOKEN_FILE_NAME: &str = "token.json";

/// User agent sent with every outbound HTTP request.
pub const USER_AGENT: &str = concat!("statscollector/", env!("CARGO_PKG_VERSION"));
