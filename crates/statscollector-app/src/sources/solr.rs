//! Search index: identifier listing via cursor paging and index statistics.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use statscollector_core::{Bibcode, MetricTree, MetricValue};
use tracing::{debug, warn};
use url::Url;

use super::{
    FetchError, IdentifierSource, MetricCollector, http_client, join_url, parse_base_url,
    read_json,
};
use crate::config::SolrConfig;
use crate::constants::SERIES_SOLR;

const SELECT_ENDPOINT: &str = "select";
const MBEANS_ENDPOINT: &str = "admin/mbeans";
const REPLICATION_ENDPOINT: &str = "replication";
const CURSOR_START: &str = "*";
const CURSOR_SORT: &str = "bibcode asc,id asc";

const UPDATE_STATS: &[(&str, &str)] = &[
    ("commits", "UPDATE.updateHandler.commits.count"),
    ("cumulative_adds", "UPDATE.updateHandler.cumulativeAdds.count"),
    ("cumulative_errors", "UPDATE.updateHandler.cumulativeErrors.count"),
    ("errors", "UPDATE.updateHandler.errors"),
];

#[derive(Debug, Deserialize)]
struct CursorPage {
    #[serde(rename = "nextCursorMark")]
    next_cursor_mark: Option<String>,
    #[serde(default)]
    response: CursorDocs,
}

#[derive(Debug, Default, Deserialize)]
struct CursorDocs {
    #[serde(default)]
    docs: Vec<BibcodeDoc>,
}

#[derive(Debug, Deserialize)]
struct BibcodeDoc {
    bibcode: String,
}

/// HTTP client for one Solr collection.
#[derive(Debug, Clone)]
pub struct SolrClient {
    http: Client,
    base_url: Url,
    cursor_rows: usize,
}

impl SolrClient {
    pub fn new(cfg: &SolrConfig, timeout: Duration) -> Result<Self, FetchError> {
        Ok(Self {
            http: http_client(timeout)?,
            base_url: parse_base_url(&cfg.url)?,
            cursor_rows: cfg.cursor_rows.max(1),
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        stage: &'static str,
        endpoint: &str,
        query: &[(&str, String)],
    ) -> Result<T, FetchError> {
        let url = join_url(&self.base_url, endpoint)?;
        let response = self
            .http
            .get(url)
            .query(query)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|err| FetchError::request(stage, err))?;
        read_json(stage, response).await
    }

    async fn cursor_page(&self, cursor: &str) -> Result<CursorPage, FetchError> {
        let query = [
            ("fl", "bibcode".to_string()),
            ("cursorMark", cursor.to_string()),
            ("q", "*:*".to_string()),
            ("rows", self.cursor_rows.to_string()),
            ("sort", CURSOR_SORT.to_string()),
            ("wt", "json".to_string()),
        ];
        self.get_json("solr_cursor", SELECT_ENDPOINT, &query).await
    }

    /// Update handler counters from the UPDATE mbeans category.
    pub async fn updates(&self) -> Result<MetricTree, FetchError> {
        let query = [
            ("stats", "true".to_string()),
            ("cat", "UPDATE".to_string()),
            ("wt", "json".to_string()),
        ];
        let body: Value = self.get_json("solr_updates", MBEANS_ENDPOINT, &query).await?;
        let stats = body.pointer("/solr-mbeans/1/updateHandler/stats");

        let mut tree = MetricTree::node();
        for (name, field) in UPDATE_STATS {
            tree.insert(*name, leaf(stats.and_then(|s| s.get(*field))));
        }
        Ok(tree)
    }

    /// Index size in GB plus the replicable version and generation.
    pub async fn index(&self) -> Result<MetricTree, FetchError> {
        let query = [
            ("command", "details".to_string()),
            ("wt", "json".to_string()),
        ];
        let body: Value = self
            .get_json("solr_index", REPLICATION_ENDPOINT, &query)
            .await?;
        let details = body.get("details");
        let raw_size = details
            .and_then(|d| d.get("indexSize"))
            .and_then(Value::as_str)
            .unwrap_or("0 GB");
        let size = index_size_gb(raw_size).ok_or_else(|| {
            FetchError::malformed("solr_index", format!("unrecognised index size `{raw_size}`"))
        })?;
        let primary = details.and_then(|d| d.get("master").or_else(|| d.get("leader")));

        let mut tree = MetricTree::node();
        tree.insert("index_size", MetricValue::float_2dp(size));
        tree.insert(
            "version",
            leaf(primary.and_then(|m| m.get("replicableVersion"))),
        );
        tree.insert(
            "generation",
            leaf(primary.and_then(|m| m.get("replicableGeneration"))),
        );
        Ok(tree)
    }

    /// Document count and citation sums.
    pub async fn content(&self) -> Result<MetricTree, FetchError> {
        let query = [
            ("q", "*:*".to_string()),
            ("rows", "0".to_string()),
            ("stats", "true".to_string()),
            ("stats.field", "citation_count".to_string()),
            ("stats.field", "citation_count_norm".to_string()),
            ("wt", "json".to_string()),
        ];
        let body: Value = self.get_json("solr_content", SELECT_ENDPOINT, &query).await?;
        let sum = |field: &str| {
            body.pointer(&format!("/stats/stats_fields/{field}/sum"))
                .and_then(Value::as_f64)
        };

        let mut tree = MetricTree::node();
        tree.insert("num_found", leaf(body.pointer("/response/numFound")));
        tree.insert(
            "citation_count",
            sum("citation_count").map(|v| MetricValue::Int(v.trunc() as i64)),
        );
        tree.insert(
            "citation_count_norm",
            sum("citation_count_norm").map(MetricValue::float_2dp),
        );
        Ok(tree)
    }
}

fn leaf(value: Option<&Value>) -> MetricTree {
    value.map(MetricTree::from).unwrap_or(MetricTree::Missing)
}

/// Convert a replication `indexSize` string (`"12.5 GB"`, `"300 MB"`, ...)
/// into gigabytes.
pub fn index_size_gb(raw: &str) -> Option<f64> {
    let mut parts = raw.split_whitespace();
    let size: f64 = parts.next()?.parse().ok()?;
    let factor = match parts.next()? {
        "TB" => 1024.0,
        "GB" => 1.0,
        "MB" => 1.0 / 1024.0,
        "KB" => 1.0 / (1024.0 * 1024.0),
        "bytes" => 1.0 / (1024.0 * 1024.0 * 1024.0),
        _ => return None,
    };
    Some(size * factor)
}

#[async_trait]
impl IdentifierSource for SolrClient {
    fn name(&self) -> &'static str {
        "search_index"
    }

    async fn fetch(&self) -> Result<Vec<Bibcode>, FetchError> {
        let mut bibcodes = Vec::new();
        let mut current = CURSOR_START.to_string();
        let mut pages = 0usize;

        loop {
            let page = self.cursor_page(&current).await?;
            pages += 1;
            bibcodes.extend(page.response.docs.into_iter().map(|d| Bibcode::from(d.bibcode)));

            match page.next_cursor_mark {
                Some(next) if next != current => current = next,
                _ => break,
            }
        }

        debug!(pages, count = bibcodes.len(), "search index bibcodes paged");
        Ok(bibcodes)
    }
}

#[async_trait]
impl MetricCollector for SolrClient {
    fn series(&self) -> &'static str {
        SERIES_SOLR
    }

    async fn collect(&self) -> MetricTree {
        let mut results = MetricTree::node();
        let parts = [
            ("updates", self.updates().await),
            ("index", self.index().await),
            ("content", self.content().await),
        ];
        for (part, outcome) in parts {
            match outcome {
                Ok(tree) => results.merge(tree),
                Err(err) => warn!(
                    event = "collector_query_failed",
                    series = SERIES_SOLR,
                    query = part,
                    error = %err,
                    "search index statistics query failed"
                ),
            }
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_size_units_convert_to_gb() {
        assert_eq!(index_size_gb("2 TB"), Some(2048.0));
        assert_eq!(index_size_gb("12.5 GB"), Some(12.5));
        assert_eq!(index_size_gb("512 MB"), Some(0.5));
        assert_eq!(index_size_gb("1048576 KB"), Some(1.0));
        assert_eq!(index_size_gb("1073741824 bytes"), Some(1.0));
    }

    #[test]
    fn unknown_index_size_is_rejected() {
        assert_eq!(index_size_gb("12 PB"), None);
        assert_eq!(index_size_gb("lots"), None);
        assert_eq!(index_size_gb(""), None);
    }

    #[test]
    fn trailing_slash_is_added_to_base_url() {
        let cfg = SolrConfig {
            url: "http://localhost:9983/solr/collection1".to_string(),
            cursor_rows: 10,
        };
        let client = SolrClient::new(&cfg, Duration::from_secs(1)).expect("client");
        assert_eq!(
            client.base_url.as_str(),
            "http://localhost:9983/solr/collection1/"
        );
    }
}
