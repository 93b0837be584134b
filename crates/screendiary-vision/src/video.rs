// screendiary — your desktop, remembered and searchable
// https://github.com/hermanntoast/screendiary

//! ffmpeg adapters: encoding a numbered WebP frame sequence into an
//! H.265 segment, and pulling a single frame back out of one. Both
//! fail closed — a non-zero exit leaves no partial segment behind and
//! returns an error instead of bytes.

use anyhow::{bail, Context, Result};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

use crate::run_tool;

const ENCODE_TIMEOUT: Duration = Duration::from_secs(300);
const EXTRACT_TIMEOUT: Duration = Duration::from_secs(10);

/// Frame name pattern expected inside the scratch directory.
pub const FRAME_PATTERN: &str = "frame_%04d.webp";

#[derive(Debug, Clone)]
pub struct EncodeSettings {
    /// Playback framerate — 1 / capture interval.
    pub framerate: f64,
    pub crf: u32,
    pub preset: String,
}

/// Encode `frame_%04d.webp` files in `frames_dir` into an H.265 mp4 at
/// `output`. The partial output file is removed on any failure.
pub async fn encode_segment(
    frames_dir: &Path,
    output: &Path,
    settings: &EncodeSettings,
) -> Result<()> {
    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    let input_pattern = frames_dir.join(FRAME_PATTERN).to_string_lossy().into_owned();
    let framerate = settings.framerate.to_string();
    let crf = settings.crf.to_string();
    let output_str = output.to_string_lossy().into_owned();

    info!("encoding segment {}", output.display());
    let result = run_tool(
        "ffmpeg",
        &[
            "-y",
            "-framerate",
            &framerate,
            "-i",
            &input_pattern,
            "-c:v",
            "libx265",
            "-crf",
            &crf,
            "-preset",
            &settings.preset,
            "-tag:v",
            "hvc1",
            "-pix_fmt",
            "yuv420p",
            &output_str,
        ],
        &[],
        ENCODE_TIMEOUT,
    )
    .await;

    match result {
        Some(output_info) if output_info.code == 0 => Ok(()),
        Some(output_info) => {
            let _ = std::fs::remove_file(output);
            bail!(
                "ffmpeg encode failed (code {}): {}",
                output_info.code,
                tail(&output_info.stderr, 500)
            );
        }
        None => {
            let _ = std::fs::remove_file(output);
            bail!("ffmpeg encode timed out after {:?}", ENCODE_TIMEOUT);
        }
    }
}

/// Extract one frame at `offset_ms` into the segment as WebP bytes.
pub async fn extract_frame(segment_path: &str, offset_ms: i64) -> Result<Vec<u8>> {
    let offset = format!("{:.3}", offset_ms as f64 / 1000.0);
    debug!("extracting frame {}@{}ms", segment_path, offset_ms);

    let result = run_tool(
        "ffmpeg",
        &[
            "-ss",
            &offset,
            "-i",
            segment_path,
            "-frames:v",
            "1",
            "-c:v",
            "libwebp",
            "-quality",
            "80",
            "-f",
            "image2pipe",
            "-",
        ],
        &[],
        EXTRACT_TIMEOUT,
    )
    .await;

    let Some(output) = result else {
        bail!(
            "frame extraction timed out ({} @ {}ms)",
            segment_path,
            offset_ms
        );
    };
    if output.code != 0 {
        bail!(
            "frame extraction failed (code {}): {}",
            output.code,
            tail(&output.stderr, 200)
        );
    }
    if output.stdout.is_empty() {
        bail!("frame extraction produced no data ({})", segment_path);
    }
    Ok(output.stdout)
}

fn tail(s: &str, max: usize) -> &str {
    let start = s.len().saturating_sub(max);
    // Stay on a char boundary
    let mut start = start;
    while start < s.len() && !s.is_char_boundary(start) {
        start += 1;
    }
    &s[start..]
}
