// screendiary — your desktop, remembered and searchable
// https://github.com/hermanntoast/screendiary

//! Row types for the catalog. Back-references (e.g. `MonitorCapture` →
//! `Screenshot`) are plain foreign-key ids, never object links.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// ISO timestamp layout used everywhere in the catalog (microseconds kept).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

/// Which tier a screenshot's pixels currently live in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    Live,
    Archived,
}

impl StorageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageType::Live => "live",
            StorageType::Archived => "archived",
        }
    }

    /// Catalog values are written by this code only; anything else is
    /// treated as live so the frame is at least looked for on disk.
    pub fn from_db(value: &str) -> Self {
        match value {
            "archived" => StorageType::Archived,
            _ => StorageType::Live,
        }
    }
}

/// One accepted capture tick covering the whole desktop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Screenshot {
    pub id: i64,
    pub timestamp: NaiveDateTime,
    pub date: String,
    pub width: i64,
    pub height: i64,
    pub file_size: i64,
    pub similarity: f64,
    pub storage_type: StorageType,
    pub segment_path: Option<String>,
    pub segment_offset_ms: Option<i64>,
    pub filepath_thumb: Option<String>,
}

/// Insert payload for [`Screenshot`].
#[derive(Debug, Clone)]
pub struct NewScreenshot {
    pub timestamp: NaiveDateTime,
    pub date: String,
    pub width: i64,
    pub height: i64,
    pub file_size: i64,
    pub similarity: f64,
    pub filepath_thumb: Option<String>,
}

/// One physical monitor inside a [`Screenshot`]. After archival the live
/// `filepath` is NULL and the segment reference is set — never both.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorCapture {
    pub id: i64,
    pub screenshot_id: i64,
    pub monitor_name: String,
    pub monitor_index: i64,
    pub filepath: Option<String>,
    pub segment_path: Option<String>,
    pub segment_offset_ms: Option<i64>,
    pub x: i64,
    pub y: i64,
    pub width: i64,
    pub height: i64,
}

#[derive(Debug, Clone)]
pub struct NewMonitorCapture {
    pub screenshot_id: i64,
    pub monitor_name: String,
    pub monitor_index: i64,
    pub filepath: String,
    pub x: i64,
    pub y: i64,
    pub width: i64,
    pub height: i64,
}

/// Per-monitor OCR text; only stored when it clears the length gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrResult {
    pub id: i64,
    pub screenshot_id: i64,
    pub monitor_capture_id: Option<i64>,
    pub text: String,
    pub language: String,
    pub confidence: f64,
}

#[derive(Debug, Clone)]
pub struct NewOcrResult {
    pub screenshot_id: i64,
    pub monitor_capture_id: i64,
    pub text: String,
    pub language: String,
    pub confidence: f64,
}

/// Word bounding box in original image coordinates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrWord {
    pub id: i64,
    pub ocr_result_id: i64,
    pub monitor_capture_id: i64,
    pub word: String,
    pub left: i64,
    pub top: i64,
    pub width: i64,
    pub height: i64,
    pub confidence: f64,
}

#[derive(Debug, Clone)]
pub struct NewOcrWord {
    pub ocr_result_id: i64,
    pub monitor_capture_id: i64,
    pub word: String,
    pub left: i64,
    pub top: i64,
    pub width: i64,
    pub height: i64,
    pub confidence: f64,
}

#[derive(Debug, Clone)]
pub struct NewEmbedding {
    pub screenshot_id: i64,
    pub vector: Vec<u8>,
    pub model: String,
    pub dimensions: i64,
    pub text_hash: String,
}

/// One encoded H.265 file holding the frames of one monitor over a
/// half-open segment interval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoSegment {
    pub id: i64,
    pub date: String,
    pub monitor_index: i64,
    pub filepath: String,
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    pub frame_count: i64,
    pub file_size: i64,
}

#[derive(Debug, Clone)]
pub struct NewVideoSegment {
    pub date: String,
    pub monitor_index: i64,
    pub filepath: String,
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    pub frame_count: i64,
    pub file_size: i64,
}

/// Active-window identity at capture time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowEvent {
    pub id: i64,
    pub screenshot_id: i64,
    pub timestamp: NaiveDateTime,
    pub app_class: String,
    pub app_name: String,
    pub window_title: String,
    pub desktop_file: String,
    pub pid: i64,
    pub browser_domain: String,
}

#[derive(Debug, Clone)]
pub struct NewWindowEvent {
    pub screenshot_id: i64,
    pub timestamp: NaiveDateTime,
    pub app_class: String,
    pub app_name: String,
    pub window_title: String,
    pub desktop_file: String,
    pub pid: i64,
    pub browser_domain: String,
}

/// A raw lexical-search hit straight from the FTS index.
#[derive(Debug, Clone)]
pub struct FtsHit {
    pub screenshot_id: i64,
    pub text: String,
    /// BM25 rank — smaller is better.
    pub rank: f64,
    pub snippet: String,
}

/// Cached AI narrative for one day.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaySummary {
    pub date: String,
    pub summary_text: String,
    pub model: String,
    pub created_at: NaiveDateTime,
    pub event_count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DateCount {
    pub date: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TimelineEntry {
    pub id: i64,
    pub timestamp: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize)]
pub struct AppUsage {
    pub app_class: String,
    pub app_name: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TitleUsage {
    pub window_title: String,
    pub app_class: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DomainUsage {
    pub browser_domain: String,
    pub count: i64,
}

/// Catalog-wide counters for the status surface.
#[derive(Debug, Clone, Serialize)]
pub struct Stats {
    pub total_screenshots: i64,
    pub live_screenshots: i64,
    pub archived_screenshots: i64,
    pub ocr_results: i64,
    pub embeddings: i64,
    pub video_segments: i64,
    pub storage_bytes: i64,
    pub storage_gb: f64,
}

/// Encode an embedding vector as raw little-endian f32 bytes.
pub fn vector_to_blob(vector: &[f32]) -> Vec<u8> {
    let mut blob = Vec::with_capacity(vector.len() * 4);
    for v in vector {
        blob.extend_from_slice(&v.to_le_bytes());
    }
    blob
}

/// Decode raw little-endian f32 bytes back into a vector. Trailing
/// partial floats are dropped.
pub fn blob_to_vector(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}
