//! Remote asset download into scratch storage.

use std::path::PathBuf;

use futures::StreamExt;
use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::utils::filename::scratch_file_name;
use crate::utils::fs;
use crate::{Error, Result};

/// Maximum accepted asset size (2 GiB).
pub const MAX_ASSET_SIZE_BYTES: u64 = 2 * 1024 * 1024 * 1024;

/// Client-supplied reference to a remote asset.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteAssetRef {
    pub url: String,
    pub original_name: String,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub mime_type: Option<String>,
}

/// A downloaded asset sitting in scratch storage.
#[derive(Debug, Clone)]
pub struct LocalAsset {
    pub scratch_path: PathBuf,
    pub original_name: String,
}

/// Downloads client-supplied URLs into scratch storage and probes their
/// metadata.
pub struct AssetIngestor {
    client: reqwest::Client,
    scratch_dir: PathBuf,
    allow_insecure_http: bool,
    ffprobe_path: String,
}

impl AssetIngestor {
    pub fn new(
        client: reqwest::Client,
        scratch_dir: impl Into<PathBuf>,
        allow_insecure_http: bool,
        ffprobe_path: impl Into<String>,
    ) -> Self {
        Self {
            client,
            scratch_dir: scratch_dir.into(),
            allow_insecure_http,
            ffprobe_path: ffprobe_path.into(),
        }
    }

    pub(crate) fn ffprobe_path(&self) -> &str {
        &self.ffprobe_path
    }

    /// Download a remote asset into scratch storage.
    ///
    /// The URL must be HTTPS; plain HTTP is accepted only toward loopback
    /// hosts when the development flag is set. A declared or served size
    /// above 2 GiB is rejected before any bytes are written.
    pub async fn ingest(&self, remote: &RemoteAssetRef, label: &str) -> Result<LocalAsset> {
        let url = reqwest::Url::parse(&remote.url)
            .map_err(|_| Error::InvalidUrl(remote.url.clone()))?;
        self.check_scheme(&url)?;

        if let Some(size) = remote.size {
            if size > MAX_ASSET_SIZE_BYTES {
                return Err(Error::SizeExceedsLimit {
                    declared: size,
                    limit: MAX_ASSET_SIZE_BYTES,
                });
            }
        }

        fs::ensure_dir_all(&self.scratch_dir).await?;
        let path = self
            .scratch_dir
            .join(scratch_file_name(label, &remote.original_name));

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::RemoteFetchFailed(format!("{}: {}", label, e)))?;
        if !response.status().is_success() {
            return Err(Error::RemoteFetchFailed(format!(
                "{}: HTTP {}",
                label,
                response.status()
            )));
        }
        if let Some(length) = response.content_length() {
            if length > MAX_ASSET_SIZE_BYTES {
                return Err(Error::SizeExceedsLimit {
                    declared: length,
                    limit: MAX_ASSET_SIZE_BYTES,
                });
            }
        }

        let mut file = tokio::fs::File::create(&path)
            .await
            .map_err(|e| fs::io_error("creating scratch file", &path, e))?;
        let mut stream = response.bytes_stream();
        let mut written: u64 = 0;
        while let Some(chunk) = stream.next().await {
            let chunk =
                chunk.map_err(|e| Error::RemoteFetchFailed(format!("{}: {}", label, e)))?;
            written += chunk.len() as u64;
            if written > MAX_ASSET_SIZE_BYTES {
                fs::remove_file_best_effort(&path).await;
                return Err(Error::SizeExceedsLimit {
                    declared: written,
                    limit: MAX_ASSET_SIZE_BYTES,
                });
            }
            file.write_all(&chunk)
                .await
                .map_err(|e| fs::io_error("writing scratch file", &path, e))?;
        }
        file.flush()
            .await
            .map_err(|e| fs::io_error("writing scratch file", &path, e))?;

        debug!(label, bytes = written, path = %path.display(), "Asset ingested");
        Ok(LocalAsset {
            scratch_path: path,
            original_name: remote.original_name.clone(),
        })
    }

    fn check_scheme(&self, url: &reqwest::Url) -> Result<()> {
        match url.scheme() {
            "https" => Ok(()),
            "http" if self.allow_insecure_http && is_loopback_host(url) => Ok(()),
            scheme => Err(Error::ProtocolNotAllowed(format!(
                "{} (https required): {}",
                scheme, url
            ))),
        }
    }
}

fn is_loopback_host(url: &reqwest::Url) -> bool {
    match url.host() {
        Some(url::Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
        Some(url::Host::Ipv4(ip)) => ip.is_loopback(),
        Some(url::Host::Ipv6(ip)) => ip.is_loopback(),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ingestor(allow_insecure: bool) -> AssetIngestor {
        AssetIngestor::new(
            reqwest::Client::new(),
            std::env::temp_dir(),
            allow_insecure,
            "ffprobe",
        )
    }

    fn remote(url: &str) -> RemoteAssetRef {
        RemoteAssetRef {
            url: url.to_string(),
            original_name: "clip.mp4".to_string(),
            size: None,
            mime_type: None,
        }
    }

    #[tokio::test]
    async fn test_unparseable_url_is_invalid() {
        let err = ingestor(false)
            .ingest(&remote("not a url"), "source")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidUrl(_)));
    }

    #[tokio::test]
    async fn test_http_rejected_in_production_mode() {
        let err = ingestor(false)
            .ingest(&remote("http://cdn.example.com/clip.mp4"), "source")
            .await
            .unwrap_err();
        match err {
            Error::ProtocolNotAllowed(msg) => assert!(msg.contains("http")),
            other => panic!("expected ProtocolNotAllowed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_http_to_public_host_rejected_even_in_dev() {
        let err = ingestor(true)
            .ingest(&remote("http://cdn.example.com/clip.mp4"), "source")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ProtocolNotAllowed(_)));
    }

    #[tokio::test]
    async fn test_declared_size_over_limit_rejected() {
        let mut asset = remote("https://cdn.example.com/clip.mp4");
        asset.size = Some(MAX_ASSET_SIZE_BYTES + 1);
        let err = ingestor(false).ingest(&asset, "source").await.unwrap_err();
        assert!(matches!(err, Error::SizeExceedsLimit { .. }));
    }

    #[test]
    fn test_loopback_detection() {
        for url in [
            "http://localhost:3000/a.mp4",
            "http://127.0.0.1/a.mp4",
            "http://[::1]/a.mp4",
        ] {
            assert!(is_loopback_host(&reqwest::Url::parse(url).unwrap()), "{}", url);
        }
        assert!(!is_loopback_host(
            &reqwest::Url::parse("http://10.0.0.5/a.mp4").unwrap()
        ));
    }
}
