//! Render engine: composition pipeline construction and execution.

pub mod command;
pub mod engine;
pub mod filter;

use std::path::PathBuf;

use async_trait::async_trait;

use crate::store::{SourceVideoRef, TemplateRef};
use crate::Result;

pub use command::FfmpegCommand;
pub use engine::RenderEngine;
pub use filter::composition_graph;

/// The seam between the worker and the media tool.
///
/// The production implementation shells out to ffmpeg; tests substitute
/// stubs with controllable latency and failure modes.
#[async_trait]
pub trait VariantRenderer: Send + Sync {
    /// Render one (source, template) pair and return the output file path
    /// in scratch storage. The variant comes from the template reference.
    async fn render(&self, source: &SourceVideoRef, template: &TemplateRef) -> Result<PathBuf>;
}
