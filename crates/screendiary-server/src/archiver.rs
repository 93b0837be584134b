// screendiary — your desktop, remembered and searchable
// https://github.com/hermanntoast/screendiary

//! Background tiering worker. Live WebP frames older than the archive
//! cutoff are grouped per (date, segment start, monitor), encoded into
//! H.265 segments, their catalog rows re-pointed, and the originals
//! deleted. Afterwards the oldest segments are pruned until total
//! storage fits the configured budget.

use anyhow::{Context, Result};
use chrono::{Duration as ChronoDuration, NaiveDateTime, Timelike};
use screendiary_core::Config;
use screendiary_db::{DatabaseManager, MonitorCapture, NewVideoSegment, Screenshot};
use screendiary_vision::video::{self, EncodeSettings};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

const CYCLE_INTERVAL: Duration = Duration::from_secs(60);

/// Floor a timestamp to its segment start and return the half-open
/// segment interval containing it.
pub fn segment_bounds(ts: NaiveDateTime, segment_minutes: u32) -> (NaiveDateTime, NaiveDateTime) {
    let floored_minute = ts.minute() - ts.minute() % segment_minutes;
    let start = ts
        .with_minute(floored_minute)
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0))
        .expect("floored minute is always valid");
    (start, start + ChronoDuration::minutes(i64::from(segment_minutes)))
}

/// A segment may only be encoded once its interval lies strictly
/// behind the cutoff; trailing intervals stay open for late frames.
pub fn segment_eligible(segment_end: NaiveDateTime, cutoff: NaiveDateTime) -> bool {
    segment_end < cutoff
}

pub struct Archiver {
    config: Arc<Config>,
    db: Arc<DatabaseManager>,
}

impl Archiver {
    pub fn new(config: Arc<Config>, db: Arc<DatabaseManager>) -> Self {
        Self { config, db }
    }

    /// Spawn the periodic worker. Abort the handle to stop it.
    pub fn start(self) -> tokio::task::JoinHandle<()> {
        info!("archiver started");
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(CYCLE_INTERVAL);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                if let Err(e) = self.archive_cycle().await {
                    error!("archiver cycle failed: {}", e);
                }
            }
        })
    }

    pub async fn archive_cycle(&self) -> Result<()> {
        let cutoff = chrono::Local::now().naive_local()
            - ChronoDuration::minutes(i64::from(self.config.storage.archive_after_minutes));
        self.archive_before(cutoff).await?;
        self.prune_old_segments().await
    }

    /// Archive every complete segment whose frames are older than
    /// `cutoff`.
    pub async fn archive_before(&self, cutoff: NaiveDateTime) -> Result<()> {
        let screenshots = self.db.get_live_screenshots_before(cutoff).await?;
        if screenshots.is_empty() {
            return Ok(());
        }

        let segment_minutes = self.config.storage.segment_duration_minutes;
        type GroupKey = (String, NaiveDateTime, i64);
        let mut groups: BTreeMap<GroupKey, Vec<(Screenshot, MonitorCapture)>> = BTreeMap::new();

        for screenshot in screenshots {
            let (seg_start, seg_end) = segment_bounds(screenshot.timestamp, segment_minutes);
            if !segment_eligible(seg_end, cutoff) {
                continue;
            }

            let captures = self.db.get_monitor_captures(screenshot.id).await?;
            for capture in captures {
                let has_file = capture
                    .filepath
                    .as_deref()
                    .map(|p| Path::new(p).is_file())
                    .unwrap_or(false);
                if !has_file {
                    continue;
                }
                groups
                    .entry((screenshot.date.clone(), seg_start, capture.monitor_index))
                    .or_default()
                    .push((screenshot.clone(), capture));
            }
        }

        for ((date, seg_start, monitor_index), items) in groups {
            let seg_end = seg_start + ChronoDuration::minutes(i64::from(segment_minutes));
            if let Err(e) = self
                .create_video_segment(&date, seg_start, seg_end, monitor_index, items)
                .await
            {
                error!(
                    "segment encode failed for {} monitor {}: {}",
                    date, monitor_index, e
                );
            }
        }
        Ok(())
    }

    async fn create_video_segment(
        &self,
        date: &str,
        seg_start: NaiveDateTime,
        seg_end: NaiveDateTime,
        monitor_index: i64,
        mut items: Vec<(Screenshot, MonitorCapture)>,
    ) -> Result<()> {
        if items.is_empty() {
            return Ok(());
        }
        items.sort_by_key(|(s, _)| s.timestamp);

        let archive_dir = self
            .config
            .storage
            .archive_path()
            .join(date.replace('-', "/"));
        let segment_path = archive_dir.join(format!(
            "monitor{}_{}-{}.mp4",
            monitor_index,
            seg_start.format("%H%M"),
            seg_end.format("%H%M"),
        ));

        if segment_path.is_file() {
            debug!("segment already exists: {}", segment_path.display());
            return Ok(());
        }

        // Scratch directory with the frames as a numbered sequence;
        // symlinks keep this free of pixel copies.
        let scratch = tempfile::TempDir::new().context("failed to create scratch dir")?;
        for (i, (_, capture)) in items.iter().enumerate() {
            let src = Path::new(capture.filepath.as_deref().expect("filtered on filepath"));
            let src = std::fs::canonicalize(src).unwrap_or_else(|_| src.to_path_buf());
            let dst = scratch.path().join(format!("frame_{:04}.webp", i));
            std::os::unix::fs::symlink(&src, &dst)
                .with_context(|| format!("failed to link frame {}", src.display()))?;
        }

        let settings = EncodeSettings {
            framerate: 1.0 / self.config.capture.interval as f64,
            crf: self.config.storage.h265_crf,
            preset: self.config.storage.h265_preset.clone(),
        };
        info!(
            "creating segment {} ({} frames)",
            segment_path.display(),
            items.len()
        );
        // Fail closed: the encoder removes its partial output, and no
        // segment row is written, so the group retries next cycle.
        video::encode_segment(scratch.path(), &segment_path, &settings).await?;

        let file_size = segment_path
            .metadata()
            .map(|m| m.len() as i64)
            .unwrap_or(0);
        let segment_path_str = segment_path.to_string_lossy().into_owned();
        self.db
            .insert_video_segment(&NewVideoSegment {
                date: date.to_string(),
                monitor_index,
                filepath: segment_path_str.clone(),
                start_time: seg_start,
                end_time: seg_end,
                frame_count: items.len() as i64,
                file_size,
            })
            .await?;

        let interval_ms = self.config.capture.interval as i64 * 1000;
        for (i, (screenshot, capture)) in items.iter().enumerate() {
            let offset_ms = i as i64 * interval_ms;
            self.db
                .update_monitor_capture_archived(capture.id, &segment_path_str, offset_ms)
                .await?;
            self.db
                .update_screenshot_archived(screenshot.id, &segment_path_str, offset_ms)
                .await?;

            // The encoded segment now owns these pixels; thumbnails stay.
            if let Some(filepath) = &capture.filepath {
                let _ = std::fs::remove_file(filepath);
            }
        }

        info!(
            "segment created: {} ({} frames)",
            segment_path.display(),
            items.len()
        );
        Ok(())
    }

    /// Delete oldest segments while total storage exceeds the budget.
    /// Catalog rows pointing at a pruned segment keep their stale
    /// reference; those frames become unretrievable.
    pub async fn prune_old_segments(&self) -> Result<()> {
        let max_bytes = self.config.storage.max_storage_bytes() as i64;
        let mut total = self.db.get_total_storage_bytes().await?;
        if total <= max_bytes {
            return Ok(());
        }

        info!(
            "pruning segments: {:.2} GB used",
            total as f64 / (1024f64 * 1024.0 * 1024.0)
        );
        while total > max_bytes {
            let oldest = self.db.get_oldest_video_segments(1).await?;
            let Some(segment) = oldest.into_iter().next() else {
                break;
            };
            let _ = std::fs::remove_file(&segment.filepath);
            self.db.delete_video_segment(segment.id).await?;
            total -= segment.file_size;
            info!(
                "pruned segment {} (freed {:.1} MB)",
                segment.filepath,
                segment.file_size as f64 / (1024.0 * 1024.0)
            );
        }
        Ok(())
    }
}
