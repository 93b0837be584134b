// screendiary — your desktop, remembered and searchable
// https://github.com/hermanntoast/screendiary

//! Tier-transparent frame access. Live frames are plain WebP files;
//! archived frames are pulled out of their H.265 segment, with an
//! in-memory cache in front of a content-addressed disk cache so the
//! extractor only runs on genuine misses.

use anyhow::{Context, Result};
use screendiary_core::config::StorageConfig;
use screendiary_db::{DatabaseManager, MonitorCapture};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Two-level frame cache keyed on (segment path, offset ms).
pub struct FrameCache {
    memory: moka::sync::Cache<(String, i64), Arc<Vec<u8>>>,
    disk_dir: PathBuf,
}

impl FrameCache {
    pub fn new(capacity: u64, disk_dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&disk_dir)
            .with_context(|| format!("failed to create {}", disk_dir.display()))?;
        Ok(Self {
            memory: moka::sync::Cache::new(capacity),
            disk_dir,
        })
    }

    fn disk_path(&self, segment_path: &str, offset_ms: i64) -> PathBuf {
        let digest = md5::compute(format!("{}:{}", segment_path, offset_ms));
        self.disk_dir.join(format!("{:x}.webp", digest))
    }

    /// Look a frame up: memory first, then disk (promoting to memory).
    pub fn get(&self, segment_path: &str, offset_ms: i64) -> Option<Arc<Vec<u8>>> {
        let key = (segment_path.to_string(), offset_ms);
        if let Some(bytes) = self.memory.get(&key) {
            return Some(bytes);
        }

        let disk_path = self.disk_path(segment_path, offset_ms);
        match std::fs::read(&disk_path) {
            Ok(bytes) if !bytes.is_empty() => {
                let bytes = Arc::new(bytes);
                self.memory.insert(key, bytes.clone());
                Some(bytes)
            }
            _ => None,
        }
    }

    /// Store a freshly extracted frame in both tiers. Disk write
    /// failures are swallowed — the disk tier is best-effort.
    pub fn insert(&self, segment_path: &str, offset_ms: i64, bytes: Arc<Vec<u8>>) {
        let key = (segment_path.to_string(), offset_ms);
        self.memory.insert(key, bytes.clone());

        let disk_path = self.disk_path(segment_path, offset_ms);
        if let Err(e) = std::fs::write(&disk_path, bytes.as_slice()) {
            debug!("frame cache disk write failed: {}", e);
        }
    }
}

pub struct StorageManager {
    db: Arc<DatabaseManager>,
    cache: FrameCache,
}

impl StorageManager {
    pub fn new(config: &StorageConfig, db: Arc<DatabaseManager>) -> Result<Self> {
        Ok(Self {
            db,
            cache: FrameCache::new(config.frame_cache_size, config.frame_cache_path())?,
        })
    }

    /// WebP bytes for a monitor capture, from whichever tier holds it.
    pub async fn get_frame(&self, capture: &MonitorCapture) -> Option<Vec<u8>> {
        if let Some(filepath) = &capture.filepath {
            let path = Path::new(filepath);
            if path.is_file() {
                return tokio::fs::read(path).await.ok();
            }
        }

        if let (Some(segment_path), Some(offset_ms)) =
            (&capture.segment_path, capture.segment_offset_ms)
        {
            if let Some(bytes) = self.cache.get(segment_path, offset_ms) {
                return Some(bytes.as_ref().clone());
            }
            match screendiary_vision::video::extract_frame(segment_path, offset_ms).await {
                Ok(bytes) => {
                    let bytes = Arc::new(bytes);
                    self.cache.insert(segment_path, offset_ms, bytes.clone());
                    return Some(bytes.as_ref().clone());
                }
                Err(e) => {
                    warn!("frame extraction failed: {}", e);
                    return None;
                }
            }
        }

        warn!(
            "frame not found for monitor capture {} (no live file, no segment)",
            capture.id
        );
        None
    }

    pub async fn get_thumbnail(&self, screenshot_id: i64) -> Option<Vec<u8>> {
        let screenshot = self.db.get_screenshot(screenshot_id).await.ok()??;
        let thumb = screenshot.filepath_thumb?;
        let path = Path::new(&thumb);
        if path.is_file() {
            tokio::fs::read(path).await.ok()
        } else {
            None
        }
    }

    /// A specific monitor's frame for a screenshot.
    pub async fn get_screenshot_frame(
        &self,
        screenshot_id: i64,
        monitor_index: i64,
    ) -> Option<Vec<u8>> {
        let captures = self.db.get_monitor_captures(screenshot_id).await.ok()?;
        for capture in &captures {
            if capture.monitor_index == monitor_index {
                return self.get_frame(capture).await;
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use screendiary_core::Config;
    use screendiary_db::{NewMonitorCapture, NewScreenshot};
    use tempfile::TempDir;

    fn cache(dir: &TempDir) -> FrameCache {
        FrameCache::new(100, dir.path().join("frame_cache")).unwrap()
    }

    #[test]
    fn test_cache_memory_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let cache = cache(&tmp);

        assert!(cache.get("/archive/seg.mp4", 4000).is_none());
        cache.insert("/archive/seg.mp4", 4000, Arc::new(vec![1, 2, 3]));
        let hit = cache.get("/archive/seg.mp4", 4000).unwrap();
        assert_eq!(*hit, vec![1, 2, 3]);

        // Different offset is a different key
        assert!(cache.get("/archive/seg.mp4", 6000).is_none());
    }

    #[test]
    fn test_cache_disk_tier_survives_memory_loss() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("frame_cache");

        let first = FrameCache::new(100, dir.clone()).unwrap();
        first.insert("/archive/seg.mp4", 2000, Arc::new(vec![9, 9, 9]));

        // A fresh cache has an empty memory tier but shares the disk dir
        let second = FrameCache::new(100, dir).unwrap();
        let hit = second.get("/archive/seg.mp4", 2000).unwrap();
        assert_eq!(*hit, vec![9, 9, 9]);
    }

    #[test]
    fn test_cache_disk_filenames_are_hashed() {
        let tmp = TempDir::new().unwrap();
        let cache = cache(&tmp);
        let path = cache.disk_path("/archive/seg.mp4", 4000);
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.ends_with(".webp"));
        // md5 hex digest + extension
        assert_eq!(name.len(), 32 + 5);
        assert_ne!(path, cache.disk_path("/archive/seg.mp4", 4001));
    }

    #[tokio::test]
    async fn test_get_frame_prefers_live_file() {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.storage.data_dir = tmp.path().to_path_buf();

        let db = Arc::new(DatabaseManager::new("sqlite::memory:").await.unwrap());
        let manager = StorageManager::new(&config.storage, db.clone()).unwrap();

        let live_path = tmp.path().join("monitor0_090000_000000.webp");
        std::fs::write(&live_path, b"live-bytes").unwrap();

        let capture = MonitorCapture {
            id: 1,
            screenshot_id: 1,
            monitor_name: "DP-1".to_string(),
            monitor_index: 0,
            filepath: Some(live_path.to_string_lossy().into_owned()),
            segment_path: None,
            segment_offset_ms: None,
            x: 0,
            y: 0,
            width: 1920,
            height: 1080,
        };

        let bytes = manager.get_frame(&capture).await.unwrap();
        assert_eq!(bytes, b"live-bytes");
    }

    #[tokio::test]
    async fn test_get_frame_archived_served_from_cache_without_extractor() {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.storage.data_dir = tmp.path().to_path_buf();

        let db = Arc::new(DatabaseManager::new("sqlite::memory:").await.unwrap());
        let manager = StorageManager::new(&config.storage, db.clone()).unwrap();

        // The segment file does not exist, so any extractor invocation
        // would fail — a cache hit is the only way to get bytes back.
        let segment = "/nonexistent/archive/monitor0_0900-0905.mp4";
        manager.cache.insert(segment, 4000, Arc::new(vec![7, 7]));

        let capture = MonitorCapture {
            id: 2,
            screenshot_id: 1,
            monitor_name: "DP-1".to_string(),
            monitor_index: 0,
            filepath: None,
            segment_path: Some(segment.to_string()),
            segment_offset_ms: Some(4000),
            x: 0,
            y: 0,
            width: 1920,
            height: 1080,
        };

        let bytes = manager.get_frame(&capture).await.unwrap();
        assert_eq!(bytes, vec![7, 7]);
        // Same key again — still served from cache
        assert_eq!(manager.get_frame(&capture).await.unwrap(), vec![7, 7]);
    }

    #[tokio::test]
    async fn test_get_frame_without_any_tier_is_none() {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.storage.data_dir = tmp.path().to_path_buf();

        let db = Arc::new(DatabaseManager::new("sqlite::memory:").await.unwrap());
        let manager = StorageManager::new(&config.storage, db).unwrap();

        let capture = MonitorCapture {
            id: 3,
            screenshot_id: 1,
            monitor_name: "DP-1".to_string(),
            monitor_index: 0,
            filepath: None,
            segment_path: None,
            segment_offset_ms: None,
            x: 0,
            y: 0,
            width: 1920,
            height: 1080,
        };
        assert!(manager.get_frame(&capture).await.is_none());
    }

    #[tokio::test]
    async fn test_get_thumbnail_reads_file() {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.storage.data_dir = tmp.path().to_path_buf();

        let db = Arc::new(DatabaseManager::new("sqlite::memory:").await.unwrap());
        let thumb_path = tmp.path().join("thumb_090000_000000.webp");
        std::fs::write(&thumb_path, b"thumb").unwrap();

        let id = db
            .insert_screenshot(&NewScreenshot {
                timestamp: chrono::NaiveDate::from_ymd_opt(2026, 8, 1)
                    .unwrap()
                    .and_hms_opt(9, 0, 0)
                    .unwrap(),
                date: "2026-08-01".to_string(),
                width: 1920,
                height: 1080,
                file_size: 0,
                similarity: 0.0,
                filepath_thumb: Some(thumb_path.to_string_lossy().into_owned()),
            })
            .await
            .unwrap();
        db.insert_monitor_capture(&NewMonitorCapture {
            screenshot_id: id,
            monitor_name: "DP-1".to_string(),
            monitor_index: 0,
            filepath: "/missing.webp".to_string(),
            x: 0,
            y: 0,
            width: 1920,
            height: 1080,
        })
        .await
        .unwrap();

        let manager = StorageManager::new(&config.storage, db).unwrap();
        assert_eq!(manager.get_thumbnail(id).await.unwrap(), b"thumb");
        assert!(manager.get_thumbnail(9999).await.is_none());
    }
}
