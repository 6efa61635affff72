//! Publishes metric-tree leaves to a Prometheus push gateway.

use std::time::Duration;

use reqwest::Client;
use statscollector_core::{MetricLeaf, MetricTree, Sample, grouping_segments, render_sample};
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::PushgatewayConfig;
use crate::constants::USER_AGENT;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("invalid push gateway URL `{0}`")]
    InvalidBaseUrl(String),
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("push for job `{job}` failed: {source}")]
    Request {
        job: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("push for job `{job}` rejected with HTTP status {status}")]
    HttpStatus { job: String, status: u16 },
}

/// Outcome counts of one `publish` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    pub pushed: usize,
    pub simulated: usize,
    pub failed: usize,
}

#[derive(Debug, Clone)]
pub struct PushGateway {
    http: Client,
    base_url: Url,
    provider: String,
    instance: Option<String>,
}

impl PushGateway {
    pub fn new(cfg: &PushgatewayConfig, timeout: Duration) -> Result<Self, PublishError> {
        let base_url =
            Url::parse(cfg.url.trim()).map_err(|_| PublishError::InvalidBaseUrl(cfg.url.clone()))?;
        if base_url.cannot_be_a_base() {
            return Err(PublishError::InvalidBaseUrl(cfg.url.clone()));
        }
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(PublishError::Client)?;
        Ok(Self {
            http,
            base_url,
            provider: cfg.provider.clone(),
            instance: cfg.instance.clone(),
        })
    }

    /// Grouping URL for `job`; each segment is percent-encoded.
    pub fn grouping_url(&self, job: &str) -> Url {
        let mut url = self.base_url.clone();
        let segments = grouping_segments(job, &self.provider, self.instance.as_deref());
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// Publish every present leaf of `tree` under `series`, one request per
    /// leaf. A failing leaf is logged and counted; the rest still go out.
    pub async fn publish(&self, series: &str, tree: &MetricTree, simulate: bool) -> PublishReport {
        let mut report = PublishReport::default();

        for leaf in tree.leaves() {
            let job = leaf.path.join("_");
            if simulate {
                self.log_simulated(series, &job, &leaf);
                report.simulated += 1;
                continue;
            }
            match self.push_leaf(series, &job, &leaf).await {
                Ok(()) => report.pushed += 1,
                Err(err) => {
                    warn!(
                        event = "metric_push_failed",
                        series,
                        job = %job,
                        value = %leaf.value,
                        error = %err,
                        "unable to push metric"
                    );
                    report.failed += 1;
                }
            }
        }

        info!(
            event = "metrics_published",
            series,
            pushed = report.pushed,
            simulated = report.simulated,
            failed = report.failed,
            "series published"
        );
        report
    }

    async fn push_leaf(&self, series: &str, job: &str, leaf: &MetricLeaf) -> Result<(), PublishError> {
        let sample = Sample::from_leaf(series, leaf);
        let body = render_sample(&sample);
        let url = self.grouping_url(job);
        debug!(url = %url, metric = %sample.name, "pushing metric");

        let response = self
            .http
            .post(url)
            .header("Content-Type", "text/plain; version=0.0.4")
            .body(body)
            .send()
            .await
            .map_err(|source| PublishError::Request {
                job: job.to_string(),
                source,
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(PublishError::HttpStatus {
                job: job.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(())
    }

    fn log_simulated(&self, series: &str, job: &str, leaf: &MetricLeaf) {
        let sample = Sample::from_leaf(series, leaf);
        info!(
            event = "metric_push_simulated",
            series,
            job,
            metric = %sample.name,
            provider = %self.provider,
            instance = self.instance.as_deref().unwrap_or(""),
            value = %leaf.value,
            "simulated metric push"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gateway(url: &str, instance: Option<&str>) -> PushGateway {
        let cfg = PushgatewayConfig {
            url: url.to_string(),
            provider: "ADSStatsCollector".to_string(),
            instance: instance.map(str::to_string),
        };
        PushGateway::new(&cfg, Duration::from_secs(1)).expect("gateway")
    }

    #[test]
    fn grouping_url_includes_instance_when_set() {
        let gw = gateway("http://localhost:9091", Some("stats_collector"));
        assert_eq!(
            gw.grouping_url("updated_total").as_str(),
            "http://localhost:9091/metrics/job/updated_total/provider/ADSStatsCollector/instance/stats_collector"
        );
    }

    #[test]
    fn grouping_url_keeps_base_path_and_omits_missing_instance() {
        let gw = gateway("http://gw.example/push/", None);
        assert_eq!(
            gw.grouping_url("extra_in_db").as_str(),
            "http://gw.example/push/metrics/job/extra_in_db/provider/ADSStatsCollector"
        );
    }

    #[test]
    fn grouping_url_encodes_segments() {
        let gw = gateway("http://localhost:9091/", None);
        assert!(
            gw.grouping_url("a/b c")
                .as_str()
                .contains("/metrics/job/a%2Fb%20c/")
        );
    }

    #[test]
    fn cannot_be_a_base_url_is_rejected() {
        let cfg = PushgatewayConfig {
            url: "mailto:ops@example.org".to_string(),
            ..PushgatewayConfig::default()
        };
        assert!(matches!(
            PushGateway::new(&cfg, Duration::from_secs(1)),
            Err(PublishError::InvalidBaseUrl(_))
        ));
    }

    #[tokio::test]
    async fn simulate_counts_present_leaves_only() {
        let gw = gateway("http://127.0.0.1:1", Some("i"));
        let tree = MetricTree::from(serde_json::json!({
            "updated": {"total": 5, "bib_data": null},
            "created": 3
        }));
        let report = gw.publish("master_pipeline_records", &tree, true).await;
        assert_eq!(
            report,
            PublishReport {
                pushed: 0,
                simulated: 2,
                failed: 0
            }
        );
    }
}
