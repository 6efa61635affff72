use std::time::Duration;

use chrono::{TimeZone, Utc};
use serde_json::json;
use statscollector_app::MetricTree;
use statscollector_app::config::GraylogConfig;
use statscollector_app::sources::GraylogClient;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{header, method, path, query_param},
};

const SEARCH_PATH: &str = "/api/search/universal/absolute";

fn config(server: &MockServer) -> GraylogConfig {
    GraylogConfig {
        url: server.uri(),
        token: "secret".to_string(),
        container_names: vec!["neo4j".to_string(), "rabbitmq".to_string()],
        ..GraylogConfig::default()
    }
}

#[tokio::test]
async fn counts_emails_and_each_container() {
    let server = MockServer::start().await;
    let now = Utc
        .with_ymd_and_hms(2024, 3, 7, 9, 5, 0)
        .single()
        .expect("valid timestamp");

    // base64("secret:token")
    let auth = "Basic c2VjcmV0OnRva2Vu";
    Mock::given(method("GET"))
        .and(path(SEARCH_PATH))
        .and(header("authorization", auth))
        .and(query_param(
            "query",
            "namespace_name:back-prod AND container_name:myads_pipeline AND message:\"Email sent to *\"",
        ))
        .and(query_param("from", "2024-03-07 08:05:00.000"))
        .and(query_param("to", "2024-03-07 09:06:00.000"))
        .and(query_param("limit", "1"))
        .and(query_param("sort", "timestamp:asc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"total_results": 17})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(SEARCH_PATH))
        .and(query_param(
            "query",
            "namespace_name:back-prod AND container_name:neo4j",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"total_results": 250})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(SEARCH_PATH))
        .and(query_param(
            "query",
            "namespace_name:back-prod AND container_name:rabbitmq",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"total_results": 0})))
        .mount(&server)
        .await;

    let client = GraylogClient::new(&config(&server), Duration::from_secs(5)).expect("client");
    let tree = client.collect_at(now).await;

    assert_eq!(
        tree.get("myads_pipeline_emails"),
        Some(&MetricTree::from(17_i64))
    );
    assert_eq!(tree.get("neo4j"), Some(&MetricTree::from(250_i64)));
    assert_eq!(tree.get("rabbitmq"), Some(&MetricTree::from(0_i64)));
}

#[tokio::test]
async fn failing_container_is_omitted() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(SEARCH_PATH))
        .and(query_param(
            "query",
            "namespace_name:back-prod AND container_name:neo4j",
        ))
        .respond_with(ResponseTemplate::new(500))
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(SEARCH_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"total_results": 4})))
        .mount(&server)
        .await;

    let client = GraylogClient::new(&config(&server), Duration::from_secs(5)).expect("client");
    let tree = client.collect_at(Utc::now()).await;

    assert_eq!(tree.get("neo4j"), None);
    assert_eq!(tree.get("rabbitmq"), Some(&MetricTree::from(4_i64)));
    assert_eq!(
        tree.get("myads_pipeline_emails"),
        Some(&MetricTree::from(4_i64))
    );
}
