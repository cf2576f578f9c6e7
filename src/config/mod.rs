//! Environment-driven application configuration.

use std::path::PathBuf;

use crate::{Error, Result};

/// Default per-owner active job cap.
pub const DEFAULT_OWNER_JOB_LIMIT: u32 = 2;

/// Default TTL for persisted job snapshots (24 hours).
pub const DEFAULT_SNAPSHOT_TTL_SECONDS: u64 = 86_400;

/// Application configuration, resolved once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Server bind address.
    pub bind_address: String,
    /// Server port.
    pub port: u16,
    /// Maximum jobs in {pending, processing} per owner fingerprint.
    pub max_active_jobs_per_owner: u32,
    /// TTL applied to KV snapshots and in-memory terminal-record eviction.
    pub snapshot_ttl_seconds: u64,
    /// Allow plain HTTP asset URLs (loopback hosts only).
    pub allow_insecure_http_sources: bool,
    /// Scratch directory for downloaded assets and render outputs.
    pub scratch_dir: PathBuf,
    /// Directory where finished artifacts are published for download.
    pub output_dir: PathBuf,
    /// Redis connection URL; presence enables the KV snapshot cache.
    pub redis_url: Option<String>,
    /// Blob store base URL; presence enables the blob snapshot fallback.
    pub blob_store_url: Option<String>,
    /// Optional bearer token for blob store writes.
    pub blob_store_token: Option<String>,
    /// Path to the ffmpeg binary.
    pub ffmpeg_path: String,
    /// Path to the ffprobe binary.
    pub ffprobe_path: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 8080,
            max_active_jobs_per_owner: DEFAULT_OWNER_JOB_LIMIT,
            snapshot_ttl_seconds: DEFAULT_SNAPSHOT_TTL_SECONDS,
            allow_insecure_http_sources: cfg!(debug_assertions),
            scratch_dir: std::env::temp_dir().join("overstamp"),
            output_dir: PathBuf::from("./output"),
            redis_url: None,
            blob_store_url: None,
            blob_store_token: None,
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables, validating ranges.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("BIND_ADDRESS") {
            config.bind_address = addr;
        }
        if let Ok(port) = std::env::var("PORT") {
            config.port = port
                .parse()
                .map_err(|_| Error::config(format!("invalid PORT: {}", port)))?;
        }
        if let Ok(limit) = std::env::var("MAX_ACTIVE_JOBS_PER_OWNER") {
            let parsed: u32 = limit
                .parse()
                .map_err(|_| Error::config(format!("invalid MAX_ACTIVE_JOBS_PER_OWNER: {}", limit)))?;
            if parsed < 1 {
                return Err(Error::config("MAX_ACTIVE_JOBS_PER_OWNER must be >= 1"));
            }
            config.max_active_jobs_per_owner = parsed;
        }
        if let Ok(ttl) = std::env::var("JOB_SNAPSHOT_TTL_SECONDS") {
            let parsed: u64 = ttl
                .parse()
                .map_err(|_| Error::config(format!("invalid JOB_SNAPSHOT_TTL_SECONDS: {}", ttl)))?;
            if parsed == 0 {
                return Err(Error::config("JOB_SNAPSHOT_TTL_SECONDS must be > 0"));
            }
            config.snapshot_ttl_seconds = parsed;
        }
        if let Ok(flag) = std::env::var("ALLOW_INSECURE_HTTP_SOURCES") {
            config.allow_insecure_http_sources = parse_bool(&flag)
                .ok_or_else(|| Error::config(format!("invalid ALLOW_INSECURE_HTTP_SOURCES: {}", flag)))?;
        }
        if let Ok(dir) = std::env::var("SCRATCH_DIR") {
            config.scratch_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = std::env::var("OUTPUT_DIR") {
            config.output_dir = PathBuf::from(dir);
        }
        config.redis_url = std::env::var("REDIS_URL").ok().filter(|s| !s.is_empty());
        config.blob_store_url = std::env::var("BLOB_STORE_URL").ok().filter(|s| !s.is_empty());
        config.blob_store_token = std::env::var("BLOB_STORE_TOKEN").ok().filter(|s| !s.is_empty());
        if let Ok(path) = std::env::var("FFMPEG_PATH") {
            config.ffmpeg_path = path;
        }
        if let Ok(path) = std::env::var("FFPROBE_PATH") {
            config.ffprobe_path = path;
        }

        Ok(config)
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
