//! HTTP implementation of the remote drive capability.
//!
//! Speaks a drive-style REST API: `GET /files?q=...` for searches,
//! `POST /files` for folders, `POST /upload/files` for content (multipart
//! for small payloads, the two-phase resumable protocol for documents),
//! `PATCH` for updates, and `GET /files/{id}?alt=media` for downloads.
//!
//! Failure semantics: 401/403 invalidates the local session so subsequent
//! calls fail fast. Idempotent read/write calls retry with bounded
//! exponential backoff plus random jitter; existence checks and creates are
//! single-shot so a "not found" is never masked and an object is never
//! created twice by the transport layer.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use reqwest::header::{CONTENT_TYPE, LOCATION};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use std::collections::BTreeMap;
use tracing::{debug, warn};

use fieldsync_core::{
    defaults, DriveQuery, Error, ObjectMeta, RemoteDrive, RemoteObject, Result,
};

use crate::session::AuthSession;
use crate::types::{build_query, FileList, FileMetadata, FileResource, TagPatch, OBJECT_FIELDS};

/// Configuration for the HTTP drive client.
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    /// API base URL, e.g. `https://store.example.com/api/v3`.
    pub base_url: String,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Retry policy for idempotent calls.
    pub retry: RetryPolicy,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/api/v3".to_string(),
            timeout: Duration::from_secs(defaults::HTTP_TIMEOUT_SECS),
            retry: RetryPolicy::default(),
        }
    }
}

impl RemoteConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `FIELDSYNC_API_BASE` | `http://localhost:8080/api/v3` | Remote store base URL |
    /// | `FIELDSYNC_HTTP_TIMEOUT_SECS` | `30` | Per-request timeout |
    /// | `FIELDSYNC_RETRY_ATTEMPTS` | `3` | Retries for idempotent calls |
    pub fn from_env() -> Self {
        let base_url = std::env::var("FIELDSYNC_API_BASE")
            .unwrap_or_else(|_| Self::default().base_url);

        let timeout_secs = std::env::var("FIELDSYNC_HTTP_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(defaults::HTTP_TIMEOUT_SECS);

        let attempts = std::env::var("FIELDSYNC_RETRY_ATTEMPTS")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(defaults::REMOTE_RETRY_ATTEMPTS);

        Self {
            base_url,
            timeout: Duration::from_secs(timeout_secs),
            retry: RetryPolicy {
                attempts,
                ..RetryPolicy::default()
            },
        }
    }
}

/// Bounded exponential backoff with random jitter.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub base_ms: u64,
    pub cap_ms: u64,
    pub jitter_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: defaults::REMOTE_RETRY_ATTEMPTS,
            base_ms: defaults::REMOTE_RETRY_BASE_MS,
            cap_ms: defaults::REMOTE_RETRY_CAP_MS,
            jitter_ms: defaults::REMOTE_RETRY_JITTER_MS,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (0-based): `base × 2^attempt`
    /// capped, plus jitter.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponential = self
            .base_ms
            .saturating_mul(1u64 << attempt.min(16))
            .min(self.cap_ms);
        let jitter = rand::thread_rng().gen_range(0..self.jitter_ms.max(1));
        Duration::from_millis(exponential + jitter)
    }
}

/// Authenticated drive-style REST client.
pub struct HttpDrive {
    client: Client,
    base_url: String,
    session: Arc<AuthSession>,
    retry: RetryPolicy,
}

impl HttpDrive {
    /// Create a new client over an existing session handle.
    pub fn new(config: RemoteConfig, session: Arc<AuthSession>) -> Self {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            session,
            retry: config.retry,
        }
    }

    /// The session handle this client authenticates with.
    pub fn session(&self) -> &Arc<AuthSession> {
        &self.session
    }

    fn files_url(&self) -> String {
        format!("{}/files", self.base_url)
    }

    fn file_url(&self, id: &str) -> String {
        format!("{}/files/{}", self.base_url, id)
    }

    fn upload_url(&self) -> String {
        format!("{}/upload/files", self.base_url)
    }

    fn upload_file_url(&self, id: &str) -> String {
        format!("{}/upload/files/{}", self.base_url, id)
    }

    fn auth_token(&self) -> Result<String> {
        self.session
            .token()
            .ok_or_else(|| Error::Unauthorized("no active remote session".into()))
    }

    /// Map a response status, invalidating the session on credential
    /// rejection so subsequent calls fail fast.
    fn check_status(&self, response: Response, op: &str) -> Result<Response> {
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            self.session.clear();
            return Err(Error::Unauthorized(format!(
                "remote rejected {op} ({status})"
            )));
        }
        if !status.is_success() {
            return Err(Error::Request(format!("{op} failed with status {status}")));
        }
        Ok(response)
    }

    /// Single-shot send for existence checks and creates.
    async fn send_once(&self, request: RequestBuilder, op: &str) -> Result<Response> {
        let response = request.send().await?;
        self.check_status(response, op)
    }

    /// Retrying send for idempotent calls. Network errors and 5xx/429
    /// responses back off and retry; everything else returns immediately.
    async fn send_with_retry<B>(&self, build: B, op: &'static str) -> Result<Response>
    where
        B: Fn() -> RequestBuilder,
    {
        let mut attempt = 0u32;
        loop {
            let error = match build().send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
                        Error::Request(format!("{op} failed with status {status}"))
                    } else {
                        return self.check_status(response, op);
                    }
                }
                Err(e) => Error::from(e),
            };

            if attempt + 1 >= self.retry.attempts {
                return Err(error);
            }
            let delay = self.retry.delay(attempt);
            warn!(
                subsystem = "remote",
                component = "http",
                op,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Transient remote failure, backing off"
            );
            attempt += 1;
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl RemoteDrive for HttpDrive {
    fn is_authenticated(&self) -> bool {
        self.session.is_authenticated()
    }

    async fn ensure_folder(&self, name: &str, parent: Option<&str>) -> Result<String> {
        let mut query = DriveQuery::by_name(name).folders();
        if let Some(parent) = parent {
            query = query.in_parent(parent);
        }
        if let Some(existing) = self.find(&query).await?.into_iter().next() {
            return Ok(existing.id);
        }

        let token = self.auth_token()?;
        let meta = FileMetadata {
            name: name.to_string(),
            mime_type: defaults::FOLDER_MEDIA_TYPE.to_string(),
            parents: parent.map(String::from).into_iter().collect(),
            app_properties: BTreeMap::new(),
        };
        let response = self
            .send_once(
                self.client
                    .post(self.files_url())
                    .bearer_auth(token)
                    .json(&meta),
                "create_folder",
            )
            .await?;
        let created: FileResource = response.json().await?;
        debug!(
            subsystem = "remote",
            component = "http",
            op = "ensure_folder",
            remote_id = %created.id,
            name,
            "Created folder"
        );
        Ok(created.id)
    }

    async fn find(&self, query: &DriveQuery) -> Result<Vec<RemoteObject>> {
        let token = self.auth_token()?;
        let q = build_query(query);
        let fields = format!("files({OBJECT_FIELDS})");
        let page_size = query.page_size.to_string();
        let response = self
            .send_once(
                self.client
                    .get(self.files_url())
                    .bearer_auth(token)
                    .query(&[
                        ("q", q.as_str()),
                        ("fields", fields.as_str()),
                        ("pageSize", page_size.as_str()),
                    ]),
                "find",
            )
            .await?;
        let list: FileList = response.json().await?;
        Ok(list.files.into_iter().map(RemoteObject::from).collect())
    }

    async fn create_object(&self, meta: &ObjectMeta, data: &[u8]) -> Result<RemoteObject> {
        let token = self.auth_token()?;
        let metadata = serde_json::to_string(&FileMetadata::from(meta))?;

        let form = reqwest::multipart::Form::new()
            .part(
                "metadata",
                reqwest::multipart::Part::text(metadata).mime_str("application/json")?,
            )
            .part(
                "media",
                reqwest::multipart::Part::bytes(data.to_vec()).mime_str(&meta.media_type)?,
            );

        let response = self
            .send_once(
                self.client
                    .post(self.upload_url())
                    .query(&[("uploadType", "multipart")])
                    .bearer_auth(token)
                    .multipart(form),
                "create_object",
            )
            .await?;
        let created: FileResource = response.json().await?;
        Ok(created.into())
    }

    async fn create_object_resumable(
        &self,
        meta: &ObjectMeta,
        data: &[u8],
    ) -> Result<RemoteObject> {
        let token = self.auth_token()?;

        // Phase 1: initiate the session with declared size and type.
        let response = self
            .send_once(
                self.client
                    .post(self.upload_url())
                    .query(&[("uploadType", "resumable")])
                    .bearer_auth(&token)
                    .header("X-Upload-Content-Type", &meta.media_type)
                    .header("X-Upload-Content-Length", data.len().to_string())
                    .json(&FileMetadata::from(meta)),
                "resumable_init",
            )
            .await?;

        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(String::from)
            .ok_or_else(|| {
                Error::Request("resumable session is missing the Location header".into())
            })?;

        // Phase 2: stream the body to the session URI. Re-sending the same
        // session body is idempotent, so this leg may retry.
        let response = self
            .send_with_retry(
                || {
                    self.client
                        .put(&location)
                        .bearer_auth(&token)
                        .header(CONTENT_TYPE, &meta.media_type)
                        .body(data.to_vec())
                },
                "resumable_body",
            )
            .await?;
        let created: FileResource = response.json().await?;
        debug!(
            subsystem = "remote",
            component = "http",
            op = "create_object_resumable",
            remote_id = %created.id,
            size = data.len(),
            "Resumable upload complete"
        );
        Ok(created.into())
    }

    async fn update_content(
        &self,
        id: &str,
        media_type: &str,
        data: &[u8],
    ) -> Result<RemoteObject> {
        let token = self.auth_token()?;
        let url = self.upload_file_url(id);
        let response = self
            .send_with_retry(
                || {
                    self.client
                        .patch(&url)
                        .query(&[("uploadType", "media")])
                        .bearer_auth(&token)
                        .header(CONTENT_TYPE, media_type)
                        .body(data.to_vec())
                },
                "update_content",
            )
            .await?;
        let updated: FileResource = response.json().await?;
        Ok(updated.into())
    }

    async fn update_tags(
        &self,
        id: &str,
        tags: &BTreeMap<String, String>,
    ) -> Result<RemoteObject> {
        let token = self.auth_token()?;
        let url = self.file_url(id);
        let response = self
            .send_with_retry(
                || {
                    self.client
                        .patch(&url)
                        .bearer_auth(&token)
                        .json(&TagPatch { app_properties: tags })
                },
                "update_tags",
            )
            .await?;
        let updated: FileResource = response.json().await?;
        Ok(updated.into())
    }

    async fn download(&self, id: &str) -> Result<Vec<u8>> {
        let token = self.auth_token()?;
        let url = self.file_url(id);
        let response = self
            .send_with_retry(
                || {
                    self.client
                        .get(&url)
                        .query(&[("alt", "media")])
                        .bearer_auth(&token)
                },
                "download",
            )
            .await?;
        Ok(response.bytes().await?.to_vec())
    }
}
