// In-memory collaborators for unit tests.
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;
use usedotnet_common::error::{Result, UseDotNetError};
use usedotnet_net::HttpClient;

pub const INDEX_URL: &str = "https://example.com/releases-index.json";

#[derive(Default)]
pub struct FakeHttpClient {
    documents: HashMap<String, Value>,
    files: HashMap<String, Vec<u8>>,
    requests: Mutex<Vec<String>>,
}

impl FakeHttpClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_json(mut self, url: &str, document: Value) -> Self {
        self.documents.insert(url.to_string(), document);
        self
    }

    pub fn with_file(mut self, url: &str, bytes: Vec<u8>) -> Self {
        self.files.insert(url.to_string(), bytes);
        self
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    pub fn requests_to(&self, url: &str) -> usize {
        self.requests().iter().filter(|u| *u == url).count()
    }

    fn record(&self, url: &str) {
        self.requests.lock().unwrap().push(url.to_string());
    }
}

#[async_trait]
impl HttpClient for FakeHttpClient {
    async fn get_json(&self, url: &str) -> Result<Value> {
        self.record(url);
        self.documents
            .get(url)
            .cloned()
            .ok_or_else(|| UseDotNetError::HttpError(format!("HTTP error 404 for URL {url}")))
    }

    async fn download_file(&self, url: &str, dest: &Path) -> Result<()> {
        self.record(url);
        let bytes = self.files.get(url).ok_or_else(|| UseDotNetError::CouldNotDownload {
            url: url.to_string(),
            reason: "Resource not found (404)".to_string(),
        })?;
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(dest, bytes)?;
        Ok(())
    }
}

/// A gzipped tarball laid out like a .NET release archive.
pub fn tar_gz(files: &[(&str, &[u8])]) -> Vec<u8> {
    use flate2::write::GzEncoder;
    use flate2::Compression;

    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    for (name, data) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o755);
        header.set_cksum();
        builder.append_data(&mut header, name, *data).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}
