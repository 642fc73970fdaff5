//! HTTP client for the remote catalog API and archive hosting

use std::path::Path;
use std::time::Duration;

use grove_config::HttpSettings;
use grove_core::error::GroveError;
use grove_core::types::{CatalogIndex, Package, PackageVersionId, Remote};
use reqwest::{Client, ClientBuilder, StatusCode};
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::api::{AddDownloadsRequest, FindDependenciesRequest, FindDependenciesResponse};
use crate::RegistryResult;

/// Configuration for exponential backoff retry logic
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Attempts per request, including the first one
    pub max_attempts: u32,
    /// Initial delay before first retry
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    fn next_delay(&self, delay: Duration) -> Duration {
        std::cmp::min(
            Duration::from_millis((delay.as_millis() as f64 * self.multiplier) as u64),
            self.max_delay,
        )
    }
}

/// Main HTTP client for registry operations
#[derive(Debug, Clone)]
pub struct RegistryClient {
    /// Underlying HTTP client with connection pooling
    client: Client,
    /// Archive client; never decodes, so hashes cover the bytes as served
    download_client: Client,
    /// Retry configuration
    retry_config: RetryConfig,
    /// Initial connect timeout for catalog queries
    connect_timeout: Duration,
    /// Initial request timeout for catalog queries
    timeout: Duration,
}

/// Why one catalog query attempt failed
enum AttemptFailure {
    /// No response at all; shrinks the timeouts
    Connect(reqwest::Error),
    Status { status: StatusCode, body: String },
    Body(reqwest::Error),
}

impl AttemptFailure {
    fn into_error(self, remote: &str) -> GroveError {
        match self {
            AttemptFailure::Connect(e) => {
                GroveError::transport(remote, "Could not connect to server".to_string(), e)
            }
            AttemptFailure::Status { status, body } => {
                let rejection = serde_json::from_str::<FindDependenciesResponse>(&body)
                    .ok()
                    .and_then(|r| r.error);
                match rejection {
                    Some(message) => GroveError::RegistryRejected {
                        remote: remote.to_string(),
                        message,
                    },
                    None => GroveError::http_status(
                        remote,
                        format!("Error code: {}", status.as_u16()),
                        status.as_u16(),
                    ),
                }
            }
            AttemptFailure::Body(e) => {
                GroveError::transport(remote, "Failed to read response".to_string(), e)
            }
        }
    }
}

impl RegistryClient {
    /// Create new registry client with default transport settings
    pub fn new() -> RegistryResult<Self> {
        Self::with_settings(&HttpSettings::default())
    }

    /// Create registry client from transport settings
    pub fn with_settings(settings: &HttpSettings) -> RegistryResult<Self> {
        let connect_timeout = Duration::from_secs(settings.connect_timeout_secs);
        let retry_config = RetryConfig {
            max_attempts: settings.retries.max(1),
            ..RetryConfig::default()
        };

        Ok(Self {
            client: build_client(connect_timeout)?,
            download_client: build_download_client(connect_timeout)?,
            retry_config,
            connect_timeout,
            timeout: Duration::from_secs(settings.timeout_secs),
        })
    }

    /// Resolve requested packages against one remote.
    ///
    /// Attempts are bounded and only transient failures are retried; after an
    /// attempt that got no response both timeouts are halved before the next one.
    pub async fn find_dependencies(
        &self,
        remote: &Remote,
        packages: &[Package],
    ) -> RegistryResult<CatalogIndex> {
        let url = remote.api_url("find_dependencies");
        let body = serde_json::to_string(&FindDependenciesRequest::from_packages(packages))
            .map_err(|e| GroveError::JsonParse {
                message: format!("Failed to encode request: {}", e),
            })?;

        let mut client = self.client.clone();
        let mut connect_timeout = self.connect_timeout;
        let mut timeout = self.timeout;
        let mut delay = self.retry_config.initial_delay;
        let mut attempt = 1;

        let text = loop {
            match post_once(&client, &url, &body, timeout).await {
                Ok(text) => break text,
                Err(failure) => {
                    let no_response = matches!(failure, AttemptFailure::Connect(_));
                    let error = failure.into_error(&remote.name);
                    if !error.is_recoverable() || attempt >= self.retry_config.max_attempts {
                        return Err(error);
                    }
                    if no_response {
                        connect_timeout /= 2;
                        timeout /= 2;
                        client = build_client(connect_timeout)?;
                    }
                    warn!(
                        "Catalog query to {} failed, retrying (attempt {}): {}",
                        remote.name,
                        attempt + 1,
                        error
                    );
                    tokio::time::sleep(delay).await;
                    delay = self.retry_config.next_delay(delay);
                    attempt += 1;
                }
            }
        };

        let response: FindDependenciesResponse =
            serde_json::from_str(&text).map_err(|e| GroveError::JsonParse {
                message: format!("Invalid catalog response from {}: {}", remote.name, e),
            })?;
        response.into_index(packages, &remote.name)
    }

    /// Execute HTTP request with exponential backoff retry logic
    async fn with_retry<F, Fut, T>(&self, operation: F) -> RegistryResult<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = RegistryResult<T>>,
    {
        let mut delay = self.retry_config.initial_delay;
        let mut attempt = 1;

        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(error) if error.is_recoverable() && attempt < self.retry_config.max_attempts => {
                    debug!("Retrying after error: {}", error);
                    tokio::time::sleep(delay).await;
                    delay = self.retry_config.next_delay(delay);
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }

    /// Download `url` into `dest`, returning the sha-256 of the bytes written.
    ///
    /// Any previous content of `dest` is replaced; the caller verifies the hash.
    pub async fn download(&self, url: &str, dest: &Path) -> RegistryResult<String> {
        self.with_retry(|| async {
            let mut response = self
                .download_client
                .get(url)
                .send()
                .await
                .map_err(|e| GroveError::transport(url, format!("Failed to download: {}", e), e))?;

            let status = response.status();
            if !status.is_success() {
                return Err(GroveError::http_status(
                    url,
                    format!("Failed to download: {}", status),
                    status.as_u16(),
                ));
            }

            let mut file = tokio::fs::File::create(dest)
                .await
                .map_err(|e| GroveError::io(format!("Failed to create {}", dest.display()), e))?;
            let mut hasher = Sha256::new();

            while let Some(chunk) = response
                .chunk()
                .await
                .map_err(|e| GroveError::transport(url, format!("Failed to read body: {}", e), e))?
            {
                hasher.update(&chunk);
                file.write_all(&chunk)
                    .await
                    .map_err(|e| GroveError::io(format!("Failed to write {}", dest.display()), e))?;
            }
            file.flush()
                .await
                .map_err(|e| GroveError::io(format!("Failed to write {}", dest.display()), e))?;

            Ok(hex::encode(hasher.finalize()))
        })
        .await
    }

    /// Fetch a small text resource
    pub async fn fetch_text(&self, url: &str) -> RegistryResult<String> {
        self.with_retry(|| async {
            let response = self
                .client
                .get(url)
                .timeout(self.timeout)
                .send()
                .await
                .map_err(|e| GroveError::transport(url, format!("Failed to fetch: {}", e), e))?;

            let status = response.status();
            if !status.is_success() {
                return Err(GroveError::http_status(
                    url,
                    format!("Failed to fetch: {}", status),
                    status.as_u16(),
                ));
            }

            response
                .text()
                .await
                .map_err(|e| GroveError::transport(url, format!("Failed to read body: {}", e), e))
        })
        .await
    }

    /// Tell the registry which package versions were downloaded.
    ///
    /// Best effort: failures are logged and otherwise ignored.
    pub async fn report_downloads(&self, remote: &Remote, ids: &[PackageVersionId]) {
        if ids.is_empty() {
            return;
        }
        let request = AddDownloadsRequest { vids: ids.to_vec() };
        let result = self
            .client
            .post(remote.api_url("add_downloads"))
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await;
        match result {
            Ok(response) if response.status().is_success() => {
                debug!("Reported {} download(s) to {}", ids.len(), remote.name);
            }
            Ok(response) => debug!("Download report rejected by {}: {}", remote.name, response.status()),
            Err(e) => debug!("Download report to {} failed: {}", remote.name, e),
        }
    }
}

fn build_client(connect_timeout: Duration) -> RegistryResult<Client> {
    ClientBuilder::new()
        // Connection pooling configuration
        .pool_max_idle_per_host(50)
        .pool_idle_timeout(Duration::from_secs(90))
        .connect_timeout(connect_timeout)
        .gzip(true)
        .user_agent(concat!("grove/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| GroveError::transport("client", format!("Failed to create HTTP client: {}", e), e))
}

fn build_download_client(connect_timeout: Duration) -> RegistryResult<Client> {
    ClientBuilder::new()
        .pool_max_idle_per_host(50)
        .pool_idle_timeout(Duration::from_secs(90))
        .connect_timeout(connect_timeout)
        .no_gzip()
        .user_agent(concat!("grove/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| GroveError::transport("client", format!("Failed to create HTTP client: {}", e), e))
}

async fn post_once(
    client: &Client,
    url: &str,
    body: &str,
    timeout: Duration,
) -> Result<String, AttemptFailure> {
    let response = client
        .post(url)
        .header(reqwest::header::CONTENT_TYPE, "application/json")
        .timeout(timeout)
        .body(body.to_string())
        .send()
        .await
        .map_err(|e| {
            if e.is_connect() || e.is_timeout() {
                AttemptFailure::Connect(e)
            } else {
                AttemptFailure::Body(e)
            }
        })?;

    let status = response.status();
    let text = response.text().await.map_err(AttemptFailure::Body)?;
    if status != StatusCode::OK {
        return Err(AttemptFailure::Status { status, body: text });
    }
    Ok(text)
}
