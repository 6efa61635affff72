use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use serde_json::{Value, json};
use statscollector_app::config::{AppConfig, DriveConfig};
use statscollector_app::run::verify_access;
use statscollector_app::services::{
    ArchiveError, ArchiveStore, DriveArchiveStore, DriveCredentials, UploadReport, Uploader,
};
use statscollector_app::{Batch, IdentifierSet};
use tempfile::TempDir;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_string_contains, header, method, path, query_param},
};

const FILES: &str = "/drive/v3/files";
const UPLOAD: &str = "/upload/drive/v3/files";
const PARENT: &str = "parent-folder";

fn drive_config(server: &MockServer) -> DriveConfig {
    DriveConfig {
        api_url: server.uri(),
        token_url: format!("{}/token", server.uri()),
        folder_id: PARENT.to_string(),
        ..DriveConfig::default()
    }
}

fn credentials() -> DriveCredentials {
    DriveCredentials {
        client_id: "cid".into(),
        client_secret: "secret".into(),
        refresh_token: "rt".into(),
    }
}

fn store(server: &MockServer) -> DriveArchiveStore {
    DriveArchiveStore::new(&drive_config(server), credentials(), Duration::from_secs(5))
        .expect("drive store")
}

fn folder(day: u32) -> Value {
    json!({
        "id": format!("f{day:02}"),
        "name": format!("202403{day:02}"),
        "modifiedTime": format!("2024-03-{day:02}T06:00:00Z"),
    })
}

async fn mount_token(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=rt"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"access_token": "at", "expires_in": 3599})),
        )
        .expect(1)
        .mount(server)
        .await;
}

/// Two listing pages: days 1..=5 plus an undated folder, then days `6..=last`.
async fn mount_listing(server: &MockServer, last: u32, calls: u64) {
    let mut first: Vec<Value> = (1..=5).map(folder).collect();
    first.push(json!({
        "id": "notes",
        "name": "notes",
        "modifiedTime": "2024-01-01T00:00:00Z",
    }));
    let second: Vec<Value> = (6..=last).map(folder).collect();

    Mock::given(method("GET"))
        .and(path(FILES))
        .and(query_param("pageToken", "page-2"))
        .and(header("authorization", "Bearer at"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"files": second})))
        .with_priority(1)
        .expect(calls)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(FILES))
        .and(query_param("supportsAllDrives", "true"))
        .and(query_param("includeItemsFromAllDrives", "true"))
        .and(query_param(
            "q",
            "'parent-folder' in parents and trashed=false and \
             mimeType='application/vnd.google-apps.folder'",
        ))
        .and(header("authorization", "Bearer at"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"nextPageToken": "page-2", "files": first})),
        )
        .expect(calls)
        .mount(server)
        .await;
}

async fn mount_deletes(server: &MockServer, ids: &[&str]) {
    for id in ids {
        Mock::given(method("DELETE"))
            .and(path(format!("{FILES}/{id}")))
            .and(query_param("supportsAllDrives", "true"))
            .respond_with(ResponseTemplate::new(204))
            .with_priority(1)
            .expect(1)
            .mount(server)
            .await;
    }
    Mock::given(method("DELETE"))
        .respond_with(ResponseTemplate::new(204))
        .with_priority(10)
        .expect(0)
        .mount(server)
        .await;
}

fn batch() -> Batch {
    let mut batch = Batch::default();
    batch.insert(
        "20240310_0905_missing_in_solr",
        IdentifierSet::from_strs(["2021MNRAS.3C", "2020ApJ...1A"]),
    );
    batch.insert(
        "20240310_0905_extra_in_db",
        IdentifierSet::from_strs(["2019A&A...9Z"]),
    );
    batch
}

#[tokio::test]
async fn upload_creates_todays_folder_and_prunes_old_ones() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    mount_listing(&server, 9, 2).await;
    Mock::given(method("POST"))
        .and(path(FILES))
        .and(query_param("fields", "id"))
        .and(body_string_contains("\"name\":\"20240310\""))
        .and(body_string_contains("\"parents\":[\"parent-folder\"]"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "today"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(UPLOAD))
        .and(query_param("uploadType", "multipart"))
        .and(header(
            "content-type",
            "multipart/related; boundary=statscollector_multipart_boundary",
        ))
        .and(body_string_contains("\"parents\":[\"today\"]"))
        .and(body_string_contains("2020ApJ...1A\n2021MNRAS.3C\n"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "file-1"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(UPLOAD))
        .and(body_string_contains("20240310_0905_extra_in_db.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "file-2"})))
        .expect(1)
        .mount(&server)
        .await;
    mount_deletes(&server, &["f01", "f02"]).await;

    let uploader = Uploader::builder().store(Arc::new(store(&server))).build();
    let day = NaiveDate::from_ymd_opt(2024, 3, 10).expect("date");
    let report = uploader.upload_on(&batch(), 7, day).await;

    assert_eq!(
        report,
        UploadReport {
            folder: Some("today".to_string()),
            uploaded: 2,
            failed: 0,
            simulated: 0,
            pruned: 2,
        }
    );
}

#[tokio::test]
async fn existing_folder_for_the_day_is_reused() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    mount_listing(&server, 10, 2).await;
    Mock::given(method("POST"))
        .and(path(FILES))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "dup"})))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(UPLOAD))
        .and(body_string_contains("\"parents\":[\"f10\"]"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "file"})))
        .expect(2)
        .mount(&server)
        .await;
    mount_deletes(&server, &["f01", "f02", "f03"]).await;

    let uploader = Uploader::builder().store(Arc::new(store(&server))).build();
    let day = NaiveDate::from_ymd_opt(2024, 3, 10).expect("date");
    let report = uploader.upload_on(&batch(), 7, day).await;

    assert_eq!(report.folder.as_deref(), Some("f10"));
    assert_eq!(report.uploaded, 2);
    assert_eq!(report.pruned, 3);
}

#[tokio::test]
async fn rejected_refresh_token_fails_listing() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({"error": "invalid_grant"})))
        .mount(&server)
        .await;

    let err = store(&server).list_folders().await.expect_err("refresh fails");
    assert!(matches!(
        err,
        ArchiveError::HttpStatus {
            stage: "drive_token_refresh",
            status: 400
        }
    ));
}

#[tokio::test]
async fn verify_access_lists_parent_folder() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    mount_listing(&server, 8, 1).await;

    let dir = TempDir::new().expect("tempdir");
    let credentials_file = dir.path().join("credentials.json");
    let token_file = dir.path().join("token.json");
    std::fs::write(
        &credentials_file,
        r#"{"installed": {"client_id": "cid", "client_secret": "secret"}}"#,
    )
    .expect("write credentials");
    std::fs::write(&token_file, r#"{"refresh_token": "rt"}"#).expect("write token");

    let mut cfg = AppConfig::default();
    cfg.archive.drive = DriveConfig {
        credentials_file: Some(credentials_file),
        token_file: Some(token_file),
        ..drive_config(&server)
    };

    let folders = verify_access(&cfg).await.expect("access verified");
    assert_eq!(folders, 9);
}
