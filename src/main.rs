use std::sync::Arc;

use tracing::warn;

use overstamp::api::{self, AppState};
use overstamp::config::AppConfig;
use overstamp::ingest::AssetIngestor;
use overstamp::queue::{QueueConfig, RenderQueue};
use overstamp::render::RenderEngine;
use overstamp::store::kv::RedisSnapshotCache;
use overstamp::store::blob::HttpBlobStore;
use overstamp::store::JobStore;
use overstamp::utils::{fs, http_client};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    overstamp::logging::init();

    // Load environment variables
    dotenvy::dotenv().ok();

    let config = Arc::new(AppConfig::from_env()?);
    fs::ensure_dir_all(&config.scratch_dir).await?;
    fs::ensure_dir_all(&config.output_dir).await?;

    // Fail fast when the media tool is absent.
    let engine = Arc::new(RenderEngine::new(
        config.ffmpeg_path.clone(),
        config.scratch_dir.clone(),
    ));
    engine.ensure_binary().await?;

    let mut store = JobStore::new(config.snapshot_ttl_seconds);
    if let Some(redis_url) = &config.redis_url {
        match RedisSnapshotCache::connect(redis_url).await {
            Ok(cache) => store = store.with_cache(Arc::new(cache)),
            Err(e) => warn!(error = %e, "KV snapshot cache disabled"),
        }
    }
    if let Some(blob_url) = &config.blob_store_url {
        store = store.with_blob(Arc::new(HttpBlobStore::new(
            http_client::build_client(),
            blob_url.clone(),
            config.blob_store_token.clone(),
        )));
    }
    let store = Arc::new(store);

    let queue = RenderQueue::new(
        store.clone(),
        engine,
        config.output_dir.clone(),
        QueueConfig::from_app(&config),
    );

    let ingestor = Arc::new(AssetIngestor::new(
        http_client::build_client(),
        config.scratch_dir.clone(),
        config.allow_insecure_http_sources,
        config.ffprobe_path.clone(),
    ));

    let state = AppState::new(config, store, queue, ingestor);
    api::serve(state).await?;

    Ok(())
}
