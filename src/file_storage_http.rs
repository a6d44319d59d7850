//! HTTP file storage implementation.
//!
//! Stores files through the board server's /files routes. The server
//! persists the bytes and serves them back at the URL it returns, which is
//! what gets written into note icon and document columns.

use std::time::Duration;

use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;

use crate::config::Config;
use crate::error::{BoardError, BoardResult};
use crate::file_storage::FileStore;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
struct UploadResponse {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    files: Vec<String>,
}

/// File storage served by the board server.
pub struct HttpFileStore {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpFileStore {
    /// Create a file store adapter from configuration.
    ///
    /// Requires the same store URL as the row-store adapter; a missing URL
    /// is fatal at construction.
    pub fn connect(config: &Config) -> BoardResult<Self> {
        let base_url = config
            .store_url()
            .ok_or_else(|| {
                BoardError::Config("store_url is not configured; cannot reach file storage".into())
            })?
            .trim_end_matches('/')
            .to_string();

        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| BoardError::network(e.to_string()))?;

        Ok(Self {
            client,
            base_url,
            api_key: config.api_key().map(String::from),
        })
    }

    fn file_url(&self, folder: &str, name: &str) -> String {
        format!(
            "{}/files/{}/{}",
            self.base_url,
            urlencoding::encode(folder),
            urlencoding::encode(name)
        )
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }
}

impl FileStore for HttpFileStore {
    async fn upload(&self, folder: &str, name: &str, bytes: Vec<u8>) -> BoardResult<String> {
        let size_bytes = bytes.len();
        let response = self
            .authorize(self.client.post(self.file_url(folder, name)))
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(bytes)
            .send()
            .await
            .map_err(|e| BoardError::Upload(e.to_string()))?;

        if !response.status().is_success() {
            return Err(BoardError::Upload(format!(
                "upload failed with status {}",
                response.status()
            )));
        }

        let uploaded: UploadResponse = response
            .json()
            .await
            .map_err(|e| BoardError::Upload(format!("Failed to parse upload response: {}", e)))?;

        tracing::info!(
            folder = %folder,
            name = %name,
            size_bytes = size_bytes,
            "Uploaded file"
        );

        Ok(uploaded.url)
    }

    async fn list(&self, folder: &str, limit: usize) -> BoardResult<Vec<String>> {
        let url = format!(
            "{}/files/{}?limit={}",
            self.base_url,
            urlencoding::encode(folder),
            limit
        );
        let response = self
            .authorize(self.client.get(url))
            .send()
            .await
            .map_err(|e| BoardError::network(e.to_string()))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        if !response.status().is_success() {
            return Err(BoardError::remote(format!(
                "listing failed with status {}",
                response.status()
            )));
        }

        let listing: ListResponse = response
            .json()
            .await
            .map_err(|e| BoardError::remote(format!("Failed to parse listing: {}", e)))?;
        Ok(listing.files)
    }

    async fn remove(&self, folder: &str, name: &str) -> BoardResult<()> {
        let response = self
            .authorize(self.client.delete(self.file_url(folder, name)))
            .send()
            .await
            .map_err(|e| BoardError::network(e.to_string()))?;

        // An already-absent file is a fine outcome for a removal.
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        if !response.status().is_success() {
            return Err(BoardError::remote(format!(
                "removal failed with status {}",
                response.status()
            )));
        }

        tracing::debug!(folder = %folder, name = %name, "Removed file");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_connect_requires_store_url() {
        let temp_dir = TempDir::new().unwrap();
        let config = Config::new(temp_dir.path()).unwrap();

        assert!(matches!(
            HttpFileStore::connect(&config),
            Err(BoardError::Config(_))
        ));
    }

    #[test]
    fn test_file_url_encodes_segments() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::new(temp_dir.path()).unwrap();
        config.set_store_url("http://localhost:8460").unwrap();

        let store = HttpFileStore::connect(&config).unwrap();
        assert_eq!(
            store.file_url("icons", "a b.png"),
            "http://localhost:8460/files/icons/a%20b.png"
        );
    }
}
