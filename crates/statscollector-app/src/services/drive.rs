//! Google Drive v3 archive backend over plain REST calls.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tokio::sync::Mutex;
use tracing::debug;
use url::Url;

use super::archive::{ArchiveError, ArchiveStore, FolderEntry, validate_name};
use crate::config::DriveConfig;
use crate::constants::{DRIVE_FOLDER_MIME, USER_AGENT};
use crate::paths::{AppPaths, PathError};

const FILES_PATH: &str = "drive/v3/files";
const UPLOAD_PATH: &str = "upload/drive/v3/files";
const LIST_FIELDS: &str = "nextPageToken, files(id, name, modifiedTime)";
const PAGE_SIZE: &str = "1000";
const MULTIPART_BOUNDARY: &str = "statscollector_multipart_boundary";

const REDACTED: &str = "<redacted>";

/// OAuth client identity and the long-lived refresh token.
#[derive(Clone, PartialEq, Eq)]
pub struct DriveCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
}

#[derive(Deserialize)]
struct ClientSecretsFile {
    installed: Option<ClientSecret>,
    web: Option<ClientSecret>,
}

#[derive(Deserialize)]
struct ClientSecret {
    client_id: String,
    client_secret: String,
}

#[derive(Deserialize)]
struct StoredToken {
    refresh_token: String,
    client_id: Option<String>,
    client_secret: Option<String>,
}

impl DriveCredentials {
    /// Load the refresh token from `token_file`. The client identity comes
    /// from the token file when it carries one, else from `credentials_file`.
    pub fn load(credentials_file: &Path, token_file: &Path) -> Result<Self, ArchiveError> {
        let token: StoredToken = read_json_file("token", token_file)?;
        if let (Some(client_id), Some(client_secret)) = (token.client_id, token.client_secret) {
            return Ok(Self {
                client_id,
                client_secret,
                refresh_token: token.refresh_token,
            });
        }

        let secrets: ClientSecretsFile = read_json_file("credentials", credentials_file)?;
        let secret = secrets.installed.or(secrets.web).ok_or_else(|| {
            ArchiveError::InvalidCredentials {
                what: "credentials",
                path: credentials_file.to_path_buf(),
                reason: "expected an `installed` or `web` client".to_string(),
            }
        })?;
        Ok(Self {
            client_id: secret.client_id,
            client_secret: secret.client_secret,
            refresh_token: token.refresh_token,
        })
    }
}

impl fmt::Debug for DriveCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriveCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &REDACTED)
            .field("refresh_token", &REDACTED)
            .finish()
    }
}

fn read_json_file<T: DeserializeOwned>(what: &'static str, path: &Path) -> Result<T, ArchiveError> {
    let raw = std::fs::read_to_string(path).map_err(|err| {
        if err.kind() == std::io::ErrorKind::NotFound {
            ArchiveError::MissingCredentials {
                what,
                path: path.to_path_buf(),
            }
        } else {
            ArchiveError::Io {
                path: path.to_path_buf(),
                source: err,
            }
        }
    })?;
    serde_json::from_str(&raw).map_err(|err| ArchiveError::InvalidCredentials {
        what,
        path: path.to_path_buf(),
        reason: err.to_string(),
    })
}

/// Resolve the credentials and token paths. The project config directory is
/// consulted only for paths the configuration leaves unset.
pub fn credential_paths(cfg: &DriveConfig) -> Result<(PathBuf, PathBuf), PathError> {
    if let (Some(credentials), Some(token)) = (&cfg.credentials_file, &cfg.token_file) {
        return Ok((credentials.clone(), token.clone()));
    }
    let paths = AppPaths::from_project_dirs()?;
    let credentials = cfg
        .credentials_file
        .clone()
        .unwrap_or_else(|| paths.credentials_file());
    let token = cfg.token_file.clone().unwrap_or_else(|| paths.token_file());
    Ok((credentials, token))
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileList {
    next_page_token: Option<String>,
    #[serde(default)]
    files: Vec<DriveFile>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveFile {
    id: String,
    name: String,
    modified_time: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct CreatedFile {
    id: String,
}

/// Archive folders under one Drive parent folder (shared drives included).
pub struct DriveArchiveStore {
    http: Client,
    files_url: Url,
    upload_url: Url,
    token_url: Url,
    parent_id: String,
    credentials: DriveCredentials,
    access_token: Mutex<Option<String>>,
}

impl fmt::Debug for DriveArchiveStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriveArchiveStore")
            .field("files_url", &self.files_url.as_str())
            .field("upload_url", &self.upload_url.as_str())
            .field("token_url", &self.token_url.as_str())
            .field("parent_id", &self.parent_id)
            .field("credentials", &self.credentials)
            .finish_non_exhaustive()
    }
}

impl DriveArchiveStore {
    pub fn new(
        cfg: &DriveConfig,
        credentials: DriveCredentials,
        timeout: Duration,
    ) -> Result<Self, ArchiveError> {
        if cfg.folder_id.trim().is_empty() {
            return Err(ArchiveError::MissingParentFolder);
        }
        let api = parse_url(&with_trailing_slash(&cfg.api_url))?;
        let join = |path: &str| {
            api.join(path)
                .map_err(|_| ArchiveError::InvalidUrl(format!("{api}{path}")))
        };
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|err| ArchiveError::Request {
                stage: "build_client",
                source: err,
            })?;

        Ok(Self {
            http,
            files_url: join(FILES_PATH)?,
            upload_url: join(UPLOAD_PATH)?,
            token_url: parse_url(&cfg.token_url)?,
            parent_id: cfg.folder_id.trim().to_string(),
            credentials,
            access_token: Mutex::new(None),
        })
    }

    /// Build from configuration, loading credentials from disk.
    pub fn from_config(cfg: &DriveConfig, timeout: Duration) -> Result<Self, ArchiveError> {
        let (credentials_file, token_file) = credential_paths(cfg)?;
        let credentials = DriveCredentials::load(&credentials_file, &token_file)?;
        Self::new(cfg, credentials, timeout)
    }

    pub fn parent_id(&self) -> &str {
        &self.parent_id
    }

    /// Exchange the refresh token for an access token once per store.
    async fn access_token(&self) -> Result<String, ArchiveError> {
        let mut cached = self.access_token.lock().await;
        if let Some(token) = cached.as_ref() {
            return Ok(token.clone());
        }

        let stage = "drive_token_refresh";
        let form = [
            ("grant_type", "refresh_token"),
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
            ("refresh_token", self.credentials.refresh_token.as_str()),
        ];
        let response = send(stage, self.http.post(self.token_url.clone()).form(&form)).await?;
        let body: TokenResponse = decode(stage, response).await?;
        debug!("drive access token refreshed");
        *cached = Some(body.access_token.clone());
        Ok(body.access_token)
    }

    async fn authorized(
        &self,
        stage: &'static str,
        request: RequestBuilder,
    ) -> Result<Response, ArchiveError> {
        let token = self.access_token().await?;
        send(stage, request.bearer_auth(token)).await
    }

    fn folder_query(&self) -> String {
        format!(
            "'{}' in parents and trashed=false and mimeType='{}'",
            self.parent_id.replace('\'', "\\'"),
            DRIVE_FOLDER_MIME
        )
    }

    fn file_url(&self, id: &str) -> Url {
        let mut url = self.files_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.push(id);
        }
        url
    }
}

#[async_trait::async_trait]
impl ArchiveStore for DriveArchiveStore {
    fn backend(&self) -> &'static str {
        "drive"
    }

    async fn list_folders(&self) -> Result<Vec<FolderEntry>, ArchiveError> {
        let stage = "drive_list";
        let q = self.folder_query();
        let mut folders = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut query = vec![
                ("q", q.as_str()),
                ("orderBy", "modifiedTime"),
                ("fields", LIST_FIELDS),
                ("pageSize", PAGE_SIZE),
                ("supportsAllDrives", "true"),
                ("includeItemsFromAllDrives", "true"),
            ];
            if let Some(token) = page_token.as_deref() {
                query.push(("pageToken", token));
            }
            let request = self.http.get(self.files_url.clone()).query(&query);
            let response = self.authorized(stage, request).await?;
            let page: FileList = decode(stage, response).await?;

            folders.extend(page.files.into_iter().map(|file| FolderEntry {
                id: file.id,
                name: file.name,
                modified: file.modified_time,
            }));

            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }
        Ok(folders)
    }

    async fn create_folder(&self, name: &str) -> Result<String, ArchiveError> {
        validate_name(name)?;
        let stage = "drive_create_folder";
        let metadata = json!({
            "name": name,
            "mimeType": DRIVE_FOLDER_MIME,
            "parents": [self.parent_id],
        });
        let request = self
            .http
            .post(self.files_url.clone())
            .query(&[("supportsAllDrives", "true"), ("fields", "id")])
            .json(&metadata);
        let response = self.authorized(stage, request).await?;
        let created: CreatedFile = decode(stage, response).await?;
        Ok(created.id)
    }

    async fn put_text(
        &self,
        folder_id: &str,
        file_name: &str,
        contents: String,
    ) -> Result<(), ArchiveError> {
        validate_name(file_name)?;
        let stage = "drive_upload";
        let metadata = json!({
            "name": file_name,
            "mimeType": "text/plain",
            "parents": [folder_id],
        });
        let request = self
            .http
            .post(self.upload_url.clone())
            .query(&[
                ("uploadType", "multipart"),
                ("supportsAllDrives", "true"),
                ("fields", "id"),
            ])
            .header(
                "Content-Type",
                format!("multipart/related; boundary={MULTIPART_BOUNDARY}"),
            )
            .body(multipart_related(&metadata.to_string(), &contents));
        let response = self.authorized(stage, request).await?;
        let created: CreatedFile = decode(stage, response).await?;
        debug!(file = file_name, id = %created.id, folder = folder_id, "drive file uploaded");
        Ok(())
    }

    async fn delete_folder(&self, folder_id: &str) -> Result<(), ArchiveError> {
        let stage = "drive_delete";
        let request = self
            .http
            .delete(self.file_url(folder_id))
            .query(&[("supportsAllDrives", "true")]);
        self.authorized(stage, request).await?;
        Ok(())
    }
}

/// `multipart/related` body: JSON metadata part followed by the text media.
pub fn multipart_related(metadata: &str, contents: &str) -> String {
    format!(
        "--{b}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{metadata}\r\n\
         --{b}\r\nContent-Type: text/plain; charset=UTF-8\r\n\r\n{contents}\r\n\
         --{b}--\r\n",
        b = MULTIPART_BOUNDARY
    )
}

fn with_trailing_slash(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{trimmed}/")
    }
}

fn parse_url(raw: &str) -> Result<Url, ArchiveError> {
    Url::parse(raw.trim()).map_err(|_| ArchiveError::InvalidUrl(raw.to_string()))
}

async fn send(stage: &'static str, request: RequestBuilder) -> Result<Response, ArchiveError> {
    let response = request
        .send()
        .await
        .map_err(|source| ArchiveError::Request { stage, source })?;
    let status = response.status();
    if !status.is_success() {
        return Err(ArchiveError::HttpStatus {
            stage,
            status: status.as_u16(),
        });
    }
    Ok(response)
}

async fn decode<T: DeserializeOwned>(
    stage: &'static str,
    response: Response,
) -> Result<T, ArchiveError> {
    response
        .json::<T>()
        .await
        .map_err(|source| ArchiveError::Json { stage, source })
}
