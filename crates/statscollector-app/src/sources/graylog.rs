//! Log aggregator: per-container message volume over the last window.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use reqwest::Client;
use serde::Deserialize;
use statscollector_core::MetricTree;
use tracing::warn;
use url::Url;

use super::{FetchError, MetricCollector, http_client, join_url, parse_base_url, read_json};
use crate::config::GraylogConfig;
use crate::constants::SERIES_LOGS;

const SEARCH_ENDPOINT: &str = "api/search/universal/absolute";
const RESULT_FIELDS: &str = "timestamp,namespace_name,container_name,message";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";
const MYADS_KEY: &str = "myads_pipeline_emails";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    total_results: Option<i64>,
}

/// Search window passed to every query of one collection run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchWindow {
    pub from: String,
    pub to: String,
}

impl SearchWindow {
    /// `[now - minutes, now + 1 minute]`, rendered with millisecond precision.
    pub fn ending_at(now: DateTime<Utc>, minutes: i64) -> Self {
        let from = now - TimeDelta::minutes(minutes);
        let to = now + TimeDelta::minutes(1);
        Self {
            from: from.format(TIMESTAMP_FORMAT).to_string(),
            to: to.format(TIMESTAMP_FORMAT).to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GraylogClient {
    http: Client,
    search_url: Url,
    token: String,
    myads_query: String,
    container_query: String,
    container_names: Vec<String>,
    window_minutes: i64,
}

impl GraylogClient {
    pub fn new(cfg: &GraylogConfig, timeout: Duration) -> Result<Self, FetchError> {
        let base = parse_base_url(&cfg.url)?;
        Ok(Self {
            http: http_client(timeout)?,
            search_url: join_url(&base, SEARCH_ENDPOINT)?,
            token: cfg.token.clone(),
            myads_query: cfg.myads_query.clone(),
            container_query: cfg.container_query.clone(),
            container_names: cfg.container_names.clone(),
            window_minutes: cfg.window_minutes,
        })
    }

    /// Number of messages matching `query` inside `window`.
    pub async fn count(&self, query: &str, window: &SearchWindow) -> Result<MetricTree, FetchError> {
        let stage = "graylog_search";
        let params = [
            ("query", query),
            ("from", window.from.as_str()),
            ("to", window.to.as_str()),
            ("offset", "0"),
            ("limit", "1"),
            ("fields", RESULT_FIELDS),
            ("sort", "timestamp:asc"),
        ];
        let response = self
            .http
            .get(self.search_url.clone())
            .query(&params)
            .basic_auth(&self.token, Some("token"))
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|err| FetchError::request(stage, err))?;
        let body: SearchResponse = read_json(stage, response).await?;
        Ok(MetricTree::from(body.total_results))
    }

    fn container_query_for(&self, container: &str) -> String {
        self.container_query.replace("{}", container)
    }

    pub async fn collect_at(&self, now: DateTime<Utc>) -> MetricTree {
        let window = SearchWindow::ending_at(now, self.window_minutes);
        let mut results = MetricTree::node();

        match self.count(&self.myads_query, &window).await {
            Ok(count) => results.insert(MYADS_KEY, count),
            Err(err) => warn!(
                event = "collector_query_failed",
                series = SERIES_LOGS,
                query = MYADS_KEY,
                error = %err,
                "log volume query failed"
            ),
        }

        for container in &self.container_names {
            let query = self.container_query_for(container);
            match self.count(&query, &window).await {
                Ok(count) => results.insert(container.as_str(), count),
                Err(err) => warn!(
                    event = "collector_query_failed",
                    series = SERIES_LOGS,
                    query = %container,
                    error = %err,
                    "log volume query failed"
                ),
            }
        }
        results
    }
}

#[async_trait]
impl MetricCollector for GraylogClient {
    fn series(&self) -> &'static str {
        SERIES_LOGS
    }

    async fn collect(&self) -> MetricTree {
        self.collect_at(Utc::now()).await
    }
}
