//! Typed ffmpeg command specification.
//!
//! The render engine never concatenates shell strings; it builds an
//! `FfmpegCommand` and renders it to an argv vector for `tokio::process`.

use std::path::{Path, PathBuf};

/// One input file with its per-input flags.
#[derive(Debug, Clone)]
pub struct InputSpec {
    pub path: PathBuf,
    /// Loop a still image indefinitely (`-loop 1`); the output is clamped
    /// by `-shortest`.
    pub loop_image: bool,
}

/// Specification of one ffmpeg invocation.
#[derive(Debug, Clone, Default)]
pub struct FfmpegCommand {
    inputs: Vec<InputSpec>,
    filter_graph: Option<String>,
    maps: Vec<String>,
    output_options: Vec<String>,
    output: PathBuf,
}

impl FfmpegCommand {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a plain input file.
    pub fn input(mut self, path: impl Into<PathBuf>) -> Self {
        self.inputs.push(InputSpec {
            path: path.into(),
            loop_image: false,
        });
        self
    }

    /// Add a still-image input looped to match the other streams.
    pub fn looped_image_input(mut self, path: impl Into<PathBuf>) -> Self {
        self.inputs.push(InputSpec {
            path: path.into(),
            loop_image: true,
        });
        self
    }

    /// Set the `-filter_complex` graph.
    pub fn filter_graph(mut self, graph: impl Into<String>) -> Self {
        self.filter_graph = Some(graph.into());
        self
    }

    /// Add a `-map` selector.
    pub fn map(mut self, selector: impl Into<String>) -> Self {
        self.maps.push(selector.into());
        self
    }

    /// Add a bare output option (flag without value).
    pub fn flag(mut self, flag: impl Into<String>) -> Self {
        self.output_options.push(flag.into());
        self
    }

    /// Add an output option with a value.
    pub fn option(mut self, flag: impl Into<String>, value: impl Into<String>) -> Self {
        self.output_options.push(flag.into());
        self.output_options.push(value.into());
        self
    }

    /// Set the output file path.
    pub fn output(mut self, path: impl Into<PathBuf>) -> Self {
        self.output = path.into();
        self
    }

    /// The output file path.
    pub fn output_path(&self) -> &Path {
        &self.output
    }

    /// Render the specification to an argv vector.
    pub fn to_args(&self) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "-y".into(),
            "-hide_banner".into(),
            "-nostats".into(),
            "-loglevel".into(),
            "error".into(),
        ];

        for input in &self.inputs {
            if input.loop_image {
                args.push("-loop".into());
                args.push("1".into());
            }
            args.push("-i".into());
            args.push(input.path.to_string_lossy().into_owned());
        }

        if let Some(graph) = &self.filter_graph {
            args.push("-filter_complex".into());
            args.push(graph.clone());
        }

        for selector in &self.maps {
            args.push("-map".into());
            args.push(selector.clone());
        }

        args.extend(self.output_options.iter().cloned());
        args.push(self.output.to_string_lossy().into_owned());
        args
    }
}
