// screendiary — your desktop, remembered and searchable
// https://github.com/hermanntoast/screendiary

//! Fullscreen capture via spectacle, per-monitor cropping and the WebP
//! writers for frames and thumbnails.

use anyhow::{Context, Result};
use image::imageops::FilterType;
use image::DynamicImage;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, error, warn};

use crate::monitor::Monitor;
use crate::run_tool;

const CAPTURE_TIMEOUT: Duration = Duration::from_secs(10);
const PGREP_TIMEOUT: Duration = Duration::from_secs(2);

/// Thumbnail WebP quality.
pub const THUMBNAIL_QUALITY: u8 = 75;

/// Check whether the user has the screenshot GUI open themselves.
/// Capturing would contend with interactive use, so those ticks skip.
pub async fn gui_instance_running(tool: &str) -> bool {
    match run_tool("pgrep", &["-x", tool], &[], PGREP_TIMEOUT).await {
        Some(output) => output.code == 0,
        None => false,
    }
}

/// Take a fullscreen screenshot. Returns `None` when the tick should be
/// skipped (GUI open, tool failure, empty output) — the caller logs and
/// carries on.
pub async fn take_screenshot(tool: &str) -> Result<Option<DynamicImage>> {
    if gui_instance_running(tool).await {
        debug!("screenshot skipped: {} gui is open", tool);
        return Ok(None);
    }

    let tmp = tempfile::Builder::new()
        .prefix("sd_shot_")
        .suffix(".png")
        .tempfile()
        .context("failed to create screenshot temp file")?;
    let tmp_path = tmp.path().to_string_lossy().into_owned();

    let output = run_tool(
        tool,
        &[
            "--background",
            "--nonotify",
            "--fullscreen",
            "--output",
            &tmp_path,
        ],
        &[],
        CAPTURE_TIMEOUT,
    )
    .await;

    let Some(output) = output else {
        warn!("screenshot tool {} timed out", tool);
        return Ok(None);
    };
    if output.code != 0 {
        error!(
            "screenshot failed (code {}): {}",
            output.code,
            output.stderr.trim()
        );
        return Ok(None);
    }

    // Spectacle may leave an empty file behind when it refuses to
    // capture; validate before decoding.
    let bytes = tokio::fs::read(tmp.path()).await.unwrap_or_default();
    if bytes.is_empty() {
        warn!("screenshot produced an empty file");
        return Ok(None);
    }

    let image = tokio::task::spawn_blocking(move || image::load_from_memory(&bytes))
        .await
        .context("screenshot decode task failed")?;
    match image {
        Ok(image) => Ok(Some(image)),
        Err(e) => {
            error!("screenshot decode failed: {}", e);
            Ok(None)
        }
    }
}

/// Crop the full desktop image into per-monitor sub-images using the
/// cached topology.
pub fn crop_monitors(full: &DynamicImage, monitors: &[Monitor]) -> Vec<DynamicImage> {
    monitors
        .iter()
        .map(|m| full.crop_imm(m.x, m.y, m.width, m.height))
        .collect()
}

/// Lossy WebP encode at the given quality.
pub fn encode_webp(image: &DynamicImage, quality: u8) -> Vec<u8> {
    let rgb = image.to_rgb8();
    let encoder = webp::Encoder::from_rgb(rgb.as_raw(), rgb.width(), rgb.height());
    encoder.encode(f32::from(quality)).to_vec()
}

/// Write an image as WebP, creating parent directories. Returns the
/// file size in bytes.
pub fn save_webp(image: &DynamicImage, path: &Path, quality: u8) -> Result<u64> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let bytes = encode_webp(image, quality);
    std::fs::write(path, &bytes).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(bytes.len() as u64)
}

/// Write a width-constrained thumbnail as WebP. Returns the file size.
pub fn save_thumbnail(image: &DynamicImage, path: &Path, width: u32) -> Result<u64> {
    let ratio = f64::from(width) / f64::from(image.width());
    let height = (f64::from(image.height()) * ratio).round().max(1.0) as u32;
    let thumb = image.resize_exact(width, height, FilterType::Lanczos3);
    save_webp(&thumb, path, THUMBNAIL_QUALITY)
}
