//! HTTP object-store upload handler
//!
//! Uploads every new file with a single `PUT` to an S3-style object store and
//! removes the local file once the store confirms it. The object lands at
//!
//! ```text
//! <endpoint>/<bucketName>/<extDir>/<YYYY-MM-DD>/<file name>
//! ```
//!
//! with the absolute source path attached as `x-amz-meta-originfilepath`.
//!
//! ## Failure classification
//!
//! | Failure | Class |
//! |---|---|
//! | local file not found (producer race) | transient |
//! | connect / timeout / interrupted transfer | transient |
//! | 408, 429, 5xx | transient |
//! | 401, 403, 404 and other 4xx | fatal |
//! | unreadable local file, invalid request | fatal |
//!
//! Transient failures are retried per the profile's [`RetryPolicy`]. The local
//! file is deleted only after a confirmed upload; after exhaustion or a fatal
//! failure it stays in place for inspection.

use std::{
    io::ErrorKind,
    path::Path,
    sync::Arc,
    time::Duration,
};

use anyhow::Context;
use async_trait::async_trait;
use chrono::{Local, NaiveDate};
use dropwatch_core::{
    config::{ConfigProfile, ConfigStore},
    ports::EventHandler,
    retry::{RetryPolicy, DEFAULT_RETRY_ATTEMPTS},
    ConfigError, HandlerError, NotificationEvent,
};
use reqwest::{Client, StatusCode, Url};
use tracing::{info, warn};

/// Identifier under which the upload handler is registered
pub const UPLOAD_ID: &str = "upload";

/// Profile the upload handler reads its settings from
pub const UPLOAD_PROFILE: &str = "upload";

/// Metadata header carrying the absolute source path
pub const ORIGIN_PATH_HEADER: &str = "x-amz-meta-originfilepath";

/// Keys of the upload profile
pub mod keys {
    pub const ENDPOINT: &str = "endpoint";
    pub const BUCKET_NAME: &str = "bucketName";
    pub const EXT_DIR: &str = "extDir";
    pub const AUTH_TOKEN: &str = "authToken";
    pub const RETRY_ATTEMPTS: &str = "retryAttemptsNumber";
    pub const RETRY_BACKOFF_BASE_SECS: &str = "retryBackoffBaseSecs";
    pub const REQUEST_TIMEOUT_SECS: &str = "requestTimeoutSecs";
}

const DEFAULT_BACKOFF_BASE_SECS: f64 = 5.0;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;

// ============================================================================
// UploadConfig
// ============================================================================

/// Settings of the upload handler
#[derive(Debug, Clone)]
pub struct UploadConfig {
    /// Object store base URL
    pub endpoint: Url,
    /// Bucket objects are written to
    pub bucket: String,
    /// Folder inside the bucket, without surrounding slashes (may be empty)
    pub ext_dir: String,
    /// Bearer token sent with every request, if any
    pub auth_token: Option<String>,
    /// Retry schedule for transient failures
    pub retry: RetryPolicy,
    /// Timeout of a single request
    pub request_timeout: Duration,
}

impl UploadConfig {
    /// Reads and checks the upload profile
    ///
    /// # Errors
    /// [`ConfigError::MissingKey`] for a missing endpoint or bucket,
    /// [`ConfigError::InvalidValue`] for malformed values.
    pub fn from_profile(profile: &ConfigProfile) -> Result<Self, ConfigError> {
        let invalid = |key: &str, value: &str, message: &str| ConfigError::InvalidValue {
            profile: profile.name().to_string(),
            key: key.to_string(),
            value: value.to_string(),
            message: message.to_string(),
        };

        let raw_endpoint = profile.require(keys::ENDPOINT)?.trim();
        let endpoint = Url::parse(raw_endpoint)
            .map_err(|e| invalid(keys::ENDPOINT, raw_endpoint, &e.to_string()))?;
        if !matches!(endpoint.scheme(), "http" | "https") || endpoint.cannot_be_a_base() {
            return Err(invalid(keys::ENDPOINT, raw_endpoint, "expected an http(s) base URL"));
        }

        let bucket = profile.require(keys::BUCKET_NAME)?.trim().to_string();
        if bucket.contains('/') {
            return Err(invalid(keys::BUCKET_NAME, &bucket, "must not contain '/'"));
        }

        let ext_dir = profile
            .get_or(keys::EXT_DIR, "")
            .trim()
            .trim_matches('/')
            .to_string();

        let auth_token = profile
            .get(keys::AUTH_TOKEN)
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string);

        let attempts = profile.parse(keys::RETRY_ATTEMPTS, DEFAULT_RETRY_ATTEMPTS)?;
        let base_secs: f64 = profile.parse(keys::RETRY_BACKOFF_BASE_SECS, DEFAULT_BACKOFF_BASE_SECS)?;
        let backoff_base = Duration::try_from_secs_f64(base_secs).map_err(|_| {
            invalid(
                keys::RETRY_BACKOFF_BASE_SECS,
                &base_secs.to_string(),
                "must be a non-negative, representable number of seconds",
            )
        })?;

        let timeout_secs = profile.parse(keys::REQUEST_TIMEOUT_SECS, DEFAULT_REQUEST_TIMEOUT_SECS)?;
        if timeout_secs == 0 {
            return Err(invalid(keys::REQUEST_TIMEOUT_SECS, "0", "must be greater than 0"));
        }

        Ok(Self {
            endpoint,
            bucket,
            ext_dir,
            auth_token,
            retry: RetryPolicy::new(attempts, backoff_base),
            request_timeout: Duration::from_secs(timeout_secs),
        })
    }

    /// Object key for `file_name` uploaded on `date`
    pub fn object_key(&self, file_name: &str, date: NaiveDate) -> String {
        let day = date.format("%Y-%m-%d").to_string();
        if self.ext_dir.is_empty() {
            format!("{day}/{file_name}")
        } else {
            format!("{}/{day}/{file_name}", self.ext_dir)
        }
    }

    /// Full URL of the object stored under `key`
    pub fn object_url(&self, key: &str) -> Result<Url, HandlerError> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|()| HandlerError::fatal("endpoint cannot be a base URL"))?
            .pop_if_empty()
            .push(&self.bucket)
            .extend(key.split('/').filter(|s| !s.is_empty()));
        Ok(url)
    }
}

// ============================================================================
// HttpUploadHandler
// ============================================================================

/// Uploads new files to an HTTP object store
pub struct HttpUploadHandler {
    client: Client,
    config: UploadConfig,
}

impl HttpUploadHandler {
    /// Creates the handler and its HTTP client
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built (TLS backend init).
    pub fn new(config: UploadConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client, config })
    }

    /// Registry constructor reading the [`UPLOAD_PROFILE`]
    pub fn from_config(store: &ConfigStore) -> anyhow::Result<Arc<dyn EventHandler>> {
        let profile = store.profile(UPLOAD_PROFILE)?;
        let config = UploadConfig::from_profile(&profile)?;
        info!(
            endpoint = %config.endpoint,
            bucket = %config.bucket,
            ext_dir = %config.ext_dir,
            retry_attempts = config.retry.attempts(),
            "Upload handler configured"
        );
        Ok(Arc::new(Self::new(config)?))
    }

    /// Handler settings
    pub fn config(&self) -> &UploadConfig {
        &self.config
    }

    /// One upload attempt: read the file and `PUT` it
    async fn upload_once(&self, path: &Path, url: &Url, attempt: u32) -> Result<(), HandlerError> {
        info!(attempt, path = %path.display(), url = %url, "Uploading file");

        let body = match tokio::fs::read(path).await {
            Ok(body) => body,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(HandlerError::transient(format!(
                    "source file not found: {}",
                    path.display()
                )));
            }
            Err(e) => {
                return Err(HandlerError::fatal(format!(
                    "cannot read {}: {e}",
                    path.display()
                )));
            }
        };

        let mut request = self
            .client
            .put(url.clone())
            .header(ORIGIN_PATH_HEADER, path.to_string_lossy().as_ref())
            .body(body);
        if let Some(token) = &self.config.auth_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(classify_transport_error)?;
        classify_status(response.status())
    }
}

#[async_trait]
impl EventHandler for HttpUploadHandler {
    async fn handle(&self, _event: &NotificationEvent, path: &Path) -> Result<(), HandlerError> {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| HandlerError::fatal(format!("no file name in {}", path.display())))?;
        let key = self.config.object_key(&file_name, Local::now().date_naive());
        let url = self.config.object_url(&key)?;
        let subject = path.display().to_string();

        let url_ref = &url;
        self.config
            .retry
            .run(&subject, move |attempt| self.upload_once(path, url_ref, attempt))
            .await?;

        if let Err(e) = tokio::fs::remove_file(path).await {
            warn!(path = %path.display(), error = %e, "Uploaded but could not remove source file");
            return Err(HandlerError::fatal(format!(
                "uploaded to {url} but could not remove {}: {e}",
                path.display()
            )));
        }

        info!(path = %path.display(), key = %key, "Upload complete, source file removed");
        Ok(())
    }
}

/// Classifies a failure to get any response at all
fn classify_transport_error(err: reqwest::Error) -> HandlerError {
    if err.is_builder() {
        HandlerError::fatal(format!("invalid request: {err}"))
    } else {
        HandlerError::transient(format!("request failed: {err}"))
    }
}

/// Classifies a response status
fn classify_status(status: StatusCode) -> Result<(), HandlerError> {
    if status.is_success() {
        return Ok(());
    }
    let retryable = status.is_server_error()
        || status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS;
    if retryable {
        Err(HandlerError::transient(format!("object store answered {status}")))
    } else {
        Err(HandlerError::fatal(format!("object store answered {status}")))
    }
}
