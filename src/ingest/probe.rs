//! Template metadata probing.
//!
//! Probing is best-effort: any failure falls back to the default metadata
//! (alpha assumed present) with a warning, never an error.

use std::path::Path;
use std::process::Stdio;

use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, warn};

use super::AssetIngestor;
use crate::store::TemplateMetadata;
use crate::{Error, Result};

/// Pixel-format name fragments that indicate an alpha channel.
const ALPHA_FORMAT_HINTS: &[&str] = &["alpha", "rgba", "bgra", "argb", "yuva"];

/// Decide whether a pixel format name carries an alpha channel.
pub fn pixel_format_has_alpha(pixel_format: &str) -> bool {
    let lower = pixel_format.to_ascii_lowercase();
    ALPHA_FORMAT_HINTS.iter().any(|hint| lower.contains(hint)) || lower.ends_with('a')
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    width: Option<u32>,
    height: Option<u32>,
    pix_fmt: Option<String>,
}

impl AssetIngestor {
    /// Probe a template's first video stream for dimensions and pixel
    /// format. Returns defaults when probing fails.
    pub async fn probe_template(&self, path: &Path, label: &str) -> TemplateMetadata {
        match self.run_probe(path).await {
            Ok(metadata) => {
                debug!(
                    label,
                    pixel_format = metadata.pixel_format.as_deref().unwrap_or("unknown"),
                    has_alpha = metadata.has_alpha_channel,
                    "Template probed"
                );
                metadata
            }
            Err(e) => {
                warn!(label, error = %e, "Template probe failed; assuming alpha channel");
                TemplateMetadata::default()
            }
        }
    }

    async fn run_probe(&self, path: &Path) -> Result<TemplateMetadata> {
        let output = Command::new(self.ffprobe_path())
            .args([
                "-v",
                "error",
                "-select_streams",
                "v:0",
                "-show_entries",
                "stream=width,height,pix_fmt",
                "-of",
                "json",
            ])
            .arg(path)
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .output()
            .await
            .map_err(|e| Error::Other(format!("Failed to spawn ffprobe: {}", e)))?;

        if !output.status.success() {
            return Err(Error::Other(format!(
                "ffprobe exited with {}",
                output.status
            )));
        }

        let parsed: ProbeOutput = serde_json::from_slice(&output.stdout)?;
        let stream = parsed
            .streams
            .into_iter()
            .next()
            .ok_or_else(|| Error::Other("no video stream in template".to_string()))?;

        Ok(TemplateMetadata {
            has_alpha_channel: stream
                .pix_fmt
                .as_deref()
                .map(pixel_format_has_alpha)
                .unwrap_or(true),
            width: stream.width,
            height: stream.height,
            pixel_format: stream.pix_fmt,
        })
    }
}
