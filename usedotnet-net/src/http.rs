use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use tokio::fs::{self, File as TokioFile};
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, warn};
use usedotnet_common::error::{Result, UseDotNetError};

use crate::validation::validate_url;

const DOWNLOAD_TIMEOUT_SECS: u64 = 600;
const CONNECT_TIMEOUT_SECS: u64 = 30;
const USER_AGENT_STRING: &str = "usedotnet installer (Rust; +https://github.com/usedotnet/usedotnet)";

/// The transport the resolver and installer depend on: GET a JSON document, GET a file.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn get_json(&self, url: &str) -> Result<Value>;

    /// Downloads `url` to `dest`. `dest` only appears once the whole body was written.
    async fn download_file(&self, url: &str, dest: &Path) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct ReqwestHttpClient {
    client: Client,
}

impl ReqwestHttpClient {
    pub fn new() -> Result<Self> {
        Ok(Self {
            client: build_http_client()?,
        })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

fn build_http_client() -> Result<Client> {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_STRING));
    headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
    Client::builder()
        .timeout(Duration::from_secs(DOWNLOAD_TIMEOUT_SECS))
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
        .default_headers(headers)
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()
        .map_err(|e| UseDotNetError::HttpError(format!("Failed to build HTTP client: {e}")))
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn get_json(&self, url: &str) -> Result<Value> {
        validate_url(url)?;
        debug!("Fetching JSON document from {}", url);

        let response = self.client.get(url).send().await.map_err(|e| {
            debug!("HTTP request failed for {url}: {e}");
            UseDotNetError::HttpError(format!("HTTP request failed for {url}: {e}"))
        })?;
        let status = response.status();
        debug!("Received HTTP status: {} for {}", status, url);
        if !status.is_success() {
            error!("HTTP error {} for URL {}", status, url);
            return Err(UseDotNetError::HttpError(format!(
                "HTTP error {status} for URL {url}"
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| UseDotNetError::HttpError(format!("Failed to read response body: {e}")))?;
        Ok(serde_json::from_slice(&body)?)
    }

    async fn download_file(&self, url: &str, dest: &Path) -> Result<()> {
        let could_not_download = |reason: String| UseDotNetError::CouldNotDownload {
            url: url.to_string(),
            reason,
        };
        validate_url(url).map_err(|e| could_not_download(e.to_string()))?;

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                could_not_download(format!("cannot create {}: {e}", parent.display()))
            })?;
        }
        let temp_filename = format!(
            ".{}.download",
            dest.file_name().unwrap_or_default().to_string_lossy()
        );
        let temp_path = dest.with_file_name(temp_filename);
        debug!("Downloading {} to temporary path: {}", url, temp_path.display());
        if fs::try_exists(&temp_path).await.unwrap_or(false) {
            if let Err(e) = fs::remove_file(&temp_path).await {
                warn!(
                    "Could not remove existing temporary file {}: {}",
                    temp_path.display(),
                    e
                );
            }
        }

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| could_not_download(format!("HTTP request failed: {e}")))?;
        let status = response.status();
        debug!("Received HTTP status: {} for {}", status, url);
        if !status.is_success() {
            error!("HTTP error {} for URL {}", status, url);
            return Err(could_not_download(match status {
                StatusCode::NOT_FOUND => "Resource not found (404)".to_string(),
                StatusCode::FORBIDDEN => "Access forbidden (403)".to_string(),
                _ => format!("HTTP error {status}"),
            }));
        }

        let mut temp_file = TokioFile::create(&temp_path).await.map_err(|e| {
            could_not_download(format!(
                "failed to create temp file {}: {e}",
                temp_path.display()
            ))
        })?;
        let mut stream = response.bytes_stream();
        let mut written: u64 = 0;
        while let Some(chunk) = stream.next().await {
            let write_result = match chunk {
                Ok(bytes) => {
                    written += bytes.len() as u64;
                    temp_file.write_all(&bytes).await.map_err(|e| e.to_string())
                }
                Err(e) => Err(format!("failed to read response body: {e}")),
            };
            if let Err(reason) = write_result {
                drop(temp_file);
                let _ = fs::remove_file(&temp_path).await;
                return Err(could_not_download(reason));
            }
        }
        temp_file
            .flush()
            .await
            .map_err(|e| could_not_download(e.to_string()))?;
        drop(temp_file);
        debug!("Wrote {} bytes to {}", written, temp_path.display());

        fs::rename(&temp_path, dest).await.map_err(|e| {
            could_not_download(format!(
                "failed to move {} to {}: {e}",
                temp_path.display(),
                dest.display()
            ))
        })?;
        debug!("Moved download to final location: {}", dest.display());
        Ok(())
    }
}
