//! Remote asset ingestion: download into scratch storage and probe
//! template metadata.

pub mod download;
pub mod probe;

pub use download::{AssetIngestor, LocalAsset, RemoteAssetRef, MAX_ASSET_SIZE_BYTES};
pub use probe::pixel_format_has_alpha;
