//! ffmpeg-backed render engine.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use chrono::Utc;
use tokio::process::Command;
use tracing::{debug, info};

use super::command::FfmpegCommand;
use super::filter::composition_graph;
use super::VariantRenderer;
use crate::store::{SourceVideoRef, TemplateRef};
use crate::utils::filename::{file_stem, get_extension, is_image};
use crate::{Error, Result};

/// Number of trailing stderr lines carried into a `PipelineFailed` error.
const STDERR_TAIL_LINES: usize = 12;

/// Renders one (source, template) pair per invocation by driving ffmpeg.
pub struct RenderEngine {
    ffmpeg_path: String,
    scratch_dir: PathBuf,
}

impl RenderEngine {
    pub fn new(ffmpeg_path: impl Into<String>, scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            scratch_dir: scratch_dir.into(),
        }
    }

    /// Verify the ffmpeg binary is invocable. Called once at startup.
    pub async fn ensure_binary(&self) -> Result<()> {
        let status = Command::new(&self.ffmpeg_path)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|e| Error::MissingBinary(format!("{}: {}", self.ffmpeg_path, e)))?;
        if !status.success() {
            return Err(Error::MissingBinary(format!(
                "{} exited with {}",
                self.ffmpeg_path, status
            )));
        }
        info!(ffmpeg = %self.ffmpeg_path, "Media binary available");
        Ok(())
    }

    fn output_path(&self, template: &TemplateRef, source: &SourceVideoRef) -> PathBuf {
        let stamp = Utc::now().timestamp_millis();
        self.scratch_dir.join(format!(
            "{}_{}_{}.mp4",
            template.variant,
            file_stem(&source.scratch_path),
            stamp
        ))
    }

    fn build_command(&self, source: &SourceVideoRef, template: &TemplateRef) -> FfmpegCommand {
        let template_is_image = get_extension(&template.scratch_path.to_string_lossy())
            .map(|ext| is_image(&ext))
            .unwrap_or(false);

        let mut cmd = FfmpegCommand::new().input(&source.scratch_path);
        cmd = if template_is_image {
            cmd.looped_image_input(&template.scratch_path)
        } else {
            cmd.input(&template.scratch_path)
        };

        cmd.filter_graph(composition_graph(
            template.variant,
            template.metadata.has_alpha_channel,
        ))
        .map("[outv]")
        .map("0:a?")
        .option("-c:v", "libx264")
        .option("-preset", "slow")
        .option("-crf", "18")
        .option("-pix_fmt", "yuv420p")
        .option("-movflags", "+faststart")
        .option("-c:a", "aac")
        .option("-b:a", "192k")
        .flag("-shortest")
        .output(self.output_path(template, source))
    }

    async fn run(&self, cmd: &FfmpegCommand) -> Result<()> {
        let args = cmd.to_args();
        debug!(args = ?args, "Running ffmpeg");

        let output = Command::new(&self.ffmpeg_path)
            .args(&args)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| Error::Other(format!("Failed to spawn ffmpeg: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::PipelineFailed(format!(
                "ffmpeg exited with {}: {}",
                output.status,
                stderr_tail(&stderr, STDERR_TAIL_LINES)
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl VariantRenderer for RenderEngine {
    async fn render(&self, source: &SourceVideoRef, template: &TemplateRef) -> Result<PathBuf> {
        if !source.scratch_path.exists() {
            return Err(Error::io_path(
                "reading source",
                &source.scratch_path,
                std::io::Error::from(std::io::ErrorKind::NotFound),
            ));
        }
        if !template.scratch_path.exists() {
            return Err(Error::io_path(
                "reading template",
                &template.scratch_path,
                std::io::Error::from(std::io::ErrorKind::NotFound),
            ));
        }

        let cmd = self.build_command(source, template);
        let output_path = cmd.output_path().to_path_buf();
        self.run(&cmd).await?;

        if !output_path.exists() {
            return Err(Error::io_path(
                "writing output",
                &output_path,
                std::io::Error::from(std::io::ErrorKind::NotFound),
            ));
        }
        debug!(
            variant = %template.variant,
            output = %output_path.display(),
            "Variant rendered"
        );
        Ok(output_path)
    }
}

/// Keep only the last `max_lines` lines of a stderr dump.
fn stderr_tail(stderr: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = stderr.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(max_lines);
    lines[start..].join("\n")
}
