//! Blob object store for snapshot fallback.
//!
//! Snapshots land at `job-snapshots/{id}.json` in an S3-compatible bucket
//! reached over plain REST. Objects are overwrite-allowed and readable by
//! the status endpoint of any instance.

use async_trait::async_trait;
use reqwest::StatusCode;

use crate::{Error, Result};

fn object_path(job_id: &str) -> String {
    format!("job-snapshots/{}.json", job_id)
}

/// An object store holding the last published snapshot of each job.
#[async_trait]
pub trait SnapshotBlobStore: Send + Sync {
    /// Write (or overwrite) a snapshot JSON document.
    async fn put(&self, job_id: &str, snapshot_json: &str) -> Result<()>;

    /// Fetch a snapshot JSON document, if present.
    async fn get(&self, job_id: &str) -> Result<Option<String>>;
}

/// REST-backed blob store (S3-compatible bucket or any static object host).
pub struct HttpBlobStore {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpBlobStore {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, token: Option<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            client,
            base_url,
            token,
        }
    }

    fn object_url(&self, job_id: &str) -> String {
        format!("{}/{}", self.base_url, object_path(job_id))
    }
}

#[async_trait]
impl SnapshotBlobStore for HttpBlobStore {
    async fn put(&self, job_id: &str, snapshot_json: &str) -> Result<()> {
        let mut request = self
            .client
            .put(self.object_url(job_id))
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(snapshot_json.to_string());
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::Other(format!("Blob write failed: {}", e)))?;
        if !response.status().is_success() {
            return Err(Error::Other(format!(
                "Blob write returned HTTP {}",
                response.status()
            )));
        }
        Ok(())
    }

    async fn get(&self, job_id: &str) -> Result<Option<String>> {
        let mut request = self.client.get(self.object_url(job_id));
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::Other(format!("Blob read failed: {}", e)))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(Error::Other(format!(
                "Blob read returned HTTP {}",
                response.status()
            )));
        }
        let body = response
            .text()
            .await
            .map_err(|e| Error::Other(format!("Blob read failed: {}", e)))?;
        Ok(Some(body))
    }
}
