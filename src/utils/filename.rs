//! Filename helpers for scratch and output files.
//!
//! Scratch names embed a label slug plus a UUID so concurrent downloads can
//! never collide; output names embed the variant, source stem, and a
//! millisecond timestamp.

use std::path::Path;

/// File extensions treated as still images when classifying templates.
const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp", "bmp"];

/// File extensions treated as moving-picture templates.
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "webm", "mkv", "avi", "gif"];

/// Reduce a free-form label to a lowercase ASCII slug.
///
/// Non-alphanumeric runs collapse to a single underscore; an empty result
/// becomes "asset".
pub fn label_slug(label: &str) -> String {
    let mut result = String::with_capacity(label.len());
    let mut last_was_replacement = false;

    for c in label.chars() {
        if c.is_ascii_alphanumeric() {
            result.push(c.to_ascii_lowercase());
            last_was_replacement = false;
        } else if !last_was_replacement {
            result.push('_');
            last_was_replacement = true;
        }
    }

    let trimmed = result.trim_matches('_');
    if trimmed.is_empty() {
        "asset".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Get the lowercase extension of a path, if any.
pub fn get_extension(path: &str) -> Option<String> {
    Path::new(path)
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
}

/// Get the file stem of a path, or "source" when the path has none.
pub fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "source".to_string())
}

/// Check if an extension belongs to a still image format.
pub fn is_image(ext: &str) -> bool {
    IMAGE_EXTENSIONS.contains(&ext)
}

/// Check if an extension belongs to a video format.
pub fn is_video(ext: &str) -> bool {
    VIDEO_EXTENSIONS.contains(&ext)
}

/// Build the scratch filename for an ingested asset: `{label_slug}_{uuid}{ext}`.
///
/// The extension is carried over from the client-supplied original name so
/// ffmpeg can rely on it for demuxer selection.
pub fn scratch_file_name(label: &str, original_name: &str) -> String {
    let ext = get_extension(original_name)
        .map(|e| format!(".{}", e))
        .unwrap_or_default();
    format!("{}_{}{}", label_slug(label), uuid::Uuid::new_v4(), ext)
}
