// screendiary — your desktop, remembered and searchable
// https://github.com/hermanntoast/screendiary

//! The capture daemon: a cooperative tick loop that screenshots the
//! desktop, crops per monitor, skips unchanged frames, persists the
//! rest and hands the pixels to the processing pipeline. Signals drive
//! pause/resume and shutdown; per-tick failures are logged and the loop
//! carries on.

use anyhow::{bail, Context, Result};
use chrono::Local;
use image::DynamicImage;
use screendiary_core::Config;
use screendiary_db::{DatabaseManager, NewMonitorCapture, NewScreenshot, NewWindowEvent};
use screendiary_vision::active_window::{get_active_window, WindowInfo};
use screendiary_vision::browser;
use screendiary_vision::dedup::is_duplicate;
use screendiary_vision::monitor::{detect_monitors, topology_changed, Monitor};
use screendiary_vision::screenshot::{crop_monitors, save_thumbnail, save_webp, take_screenshot};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::signal::unix::{signal, SignalKind};
use tracing::{debug, error, info, warn};

use crate::archiver::Archiver;
use crate::pipeline::{ProcessingPipeline, WorkItem};

/// Topology is re-detected every this many ticks.
const MONITOR_CHECK_INTERVAL: u32 = 30;

/// Sleep while paused before checking the flag again.
const PAUSE_POLL: Duration = Duration::from_secs(1);

/// Sleep needed to hold the tick cadence after a tick took `elapsed`.
fn remaining_sleep(interval_secs: u64, elapsed: Duration) -> Duration {
    Duration::from_secs(interval_secs).saturating_sub(elapsed)
}

pub struct Daemon {
    config: Arc<Config>,
    db: Arc<DatabaseManager>,
    pipeline: Option<ProcessingPipeline>,
    paused: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
    monitors: Vec<Monitor>,
    prev_images: HashMap<usize, Arc<DynamicImage>>,
    capture_count: u64,
    skip_count: u64,
    cycles_since_monitor_check: u32,
}

impl Daemon {
    pub fn new(config: Arc<Config>, db: Arc<DatabaseManager>) -> Self {
        let ai = config
            .ai
            .enabled
            .then(|| Arc::new(crate::ai::AiClient::new(&config.ai)));
        let pipeline = ProcessingPipeline::start(config.clone(), db.clone(), ai);
        Self {
            config,
            db,
            pipeline: Some(pipeline),
            paused: Arc::new(AtomicBool::new(false)),
            running: Arc::new(AtomicBool::new(false)),
            monitors: Vec::new(),
            prev_images: HashMap::new(),
            capture_count: 0,
            skip_count: 0,
            cycles_since_monitor_check: 0,
        }
    }

    pub async fn run(&mut self) -> Result<()> {
        std::fs::create_dir_all(self.config.storage.screenshots_path())
            .context("failed to create screenshots dir")?;
        std::fs::create_dir_all(self.config.storage.archive_path())
            .context("failed to create archive dir")?;

        self.monitors = detect_monitors().await?;
        if self.monitors.is_empty() {
            bail!("no monitors detected");
        }

        self.running.store(true, Ordering::SeqCst);
        self.install_signal_handlers()?;

        let archiver = Archiver::new(self.config.clone(), self.db.clone()).start();

        info!(
            "daemon started (interval {}s, {} monitors)",
            self.config.capture.interval,
            self.monitors.len()
        );

        while self.running.load(Ordering::SeqCst) {
            if self.paused.load(Ordering::SeqCst) {
                tokio::time::sleep(PAUSE_POLL).await;
                continue;
            }

            let tick_start = Instant::now();
            self.refresh_monitors().await;
            if let Err(e) = self.capture_cycle().await {
                error!("capture cycle failed: {:#}", e);
            }
            let sleep = remaining_sleep(self.config.capture.interval, tick_start.elapsed());
            tokio::time::sleep(sleep).await;
        }

        info!(
            "daemon stopping (captured {}, skipped {})",
            self.capture_count, self.skip_count
        );
        archiver.abort();
        let _ = archiver.await;
        if let Some(pipeline) = self.pipeline.take() {
            pipeline.stop().await;
        }
        self.db.close().await;
        Ok(())
    }

    /// SIGINT/SIGTERM stop the loop after the current tick; SIGUSR1
    /// pauses, SIGUSR2 resumes. Handlers only flip the two booleans.
    fn install_signal_handlers(&self) -> Result<()> {
        let mut interrupt = signal(SignalKind::interrupt()).context("sigint handler")?;
        let mut terminate = signal(SignalKind::terminate()).context("sigterm handler")?;
        let running = self.running.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = interrupt.recv() => {}
                _ = terminate.recv() => {}
            }
            info!("shutdown signal received");
            running.store(false, Ordering::SeqCst);
        });

        let mut pause = signal(SignalKind::user_defined1()).context("sigusr1 handler")?;
        let paused = self.paused.clone();
        tokio::spawn(async move {
            while pause.recv().await.is_some() {
                info!("capture paused");
                paused.store(true, Ordering::SeqCst);
            }
        });

        let mut resume = signal(SignalKind::user_defined2()).context("sigusr2 handler")?;
        let paused = self.paused.clone();
        tokio::spawn(async move {
            while resume.recv().await.is_some() {
                info!("capture resumed");
                paused.store(false, Ordering::SeqCst);
            }
        });
        Ok(())
    }

    /// Re-detect topology every [`MONITOR_CHECK_INTERVAL`] ticks. On
    /// any change the previous-image slots are cleared: dedup against
    /// frames of a different layout would be meaningless.
    async fn refresh_monitors(&mut self) {
        self.cycles_since_monitor_check += 1;
        if self.cycles_since_monitor_check < MONITOR_CHECK_INTERVAL {
            return;
        }
        self.cycles_since_monitor_check = 0;

        let new_monitors = match detect_monitors().await {
            Ok(monitors) => monitors,
            Err(e) => {
                warn!("monitor refresh failed: {}", e);
                return;
            }
        };
        if new_monitors.is_empty() {
            warn!("monitor refresh returned nothing, keeping current topology");
            return;
        }

        if topology_changed(&self.monitors, &new_monitors) {
            info!(
                "monitor topology changed: {} -> {} monitors",
                self.monitors.len(),
                new_monitors.len()
            );
            self.monitors = new_monitors;
            self.prev_images.clear();
        }
    }

    /// One tick: screenshot + window probe, dedup, persist, enqueue.
    async fn capture_cycle(&mut self) -> Result<()> {
        let (screenshot, window_info) = tokio::join!(
            take_screenshot(&self.config.capture.tool),
            get_active_window()
        );
        let Some(full_image) = screenshot? else {
            return Ok(());
        };

        let monitors = self.monitors.clone();
        let threshold = self.config.capture.similarity_threshold;
        let prev_images = std::mem::take(&mut self.prev_images);
        let full_size = (full_image.width(), full_image.height());

        // Crop + dedup downscale are CPU work; keep them off the loop.
        let (crops, prev_images, changed, min_similarity) =
            tokio::task::spawn_blocking(move || {
                let crops: Vec<Arc<DynamicImage>> = crop_monitors(&full_image, &monitors)
                    .into_iter()
                    .map(Arc::new)
                    .collect();

                let mut changed = false;
                let mut min_similarity = f32::MAX;
                for (i, crop) in crops.iter().enumerate() {
                    match prev_images.get(&i) {
                        Some(prev) => {
                            let (duplicate, similarity) = is_duplicate(crop, prev, threshold);
                            min_similarity = min_similarity.min(similarity);
                            if !duplicate {
                                changed = true;
                                break;
                            }
                        }
                        None => {
                            min_similarity = 0.0;
                            changed = true;
                            break;
                        }
                    }
                }
                (crops, prev_images, changed, min_similarity)
            })
            .await
            .context("dedup task failed")?;
        self.prev_images = prev_images;

        if !changed {
            self.skip_count += 1;
            debug!("tick skipped, all monitors unchanged");
            return Ok(());
        }

        let now = Local::now().naive_local();
        let date_str = now.format("%Y-%m-%d").to_string();
        let date_path = now.format("%Y/%m/%d").to_string();
        let time_str = now.format("%H%M%S_%6f").to_string();

        let day_dir = self.config.storage.screenshots_path().join(&date_path);
        let thumb_path = day_dir.join(format!("thumb_{}.webp", time_str));
        let monitor_paths: Vec<PathBuf> = (0..crops.len())
            .map(|i| day_dir.join(format!("monitor{}_{}.webp", i, time_str)))
            .collect();

        // Encode + write all files in one blocking task.
        let write_crops = crops.clone();
        let write_thumb = thumb_path.clone();
        let write_paths = monitor_paths.clone();
        let quality = self.config.storage.quality;
        let thumbnail_width = self.config.storage.thumbnail_width;
        let sizes: Vec<u64> = tokio::task::spawn_blocking(move || -> Result<Vec<u64>> {
            save_thumbnail(&write_crops[0], &write_thumb, thumbnail_width)?;
            write_crops
                .iter()
                .zip(&write_paths)
                .map(|(crop, path)| save_webp(crop, path, quality))
                .collect()
        })
        .await
        .context("frame write task failed")??;
        let total_size: u64 = sizes.iter().sum();

        let screenshot_id = self
            .db
            .insert_screenshot(&NewScreenshot {
                timestamp: now,
                date: date_str,
                width: i64::from(full_size.0),
                height: i64::from(full_size.1),
                file_size: 0,
                similarity: if min_similarity == f32::MAX {
                    0.0
                } else {
                    f64::from(min_similarity)
                },
                filepath_thumb: Some(thumb_path.to_string_lossy().into_owned()),
            })
            .await?;

        let mut monitor_images = Vec::with_capacity(crops.len());
        for (i, crop) in crops.iter().enumerate() {
            let monitor = &self.monitors[i];
            let mc_id = self
                .db
                .insert_monitor_capture(&NewMonitorCapture {
                    screenshot_id,
                    monitor_name: monitor.name.clone(),
                    monitor_index: i as i64,
                    filepath: monitor_paths[i].to_string_lossy().into_owned(),
                    x: i64::from(monitor.x),
                    y: i64::from(monitor.y),
                    width: i64::from(monitor.width),
                    height: i64::from(monitor.height),
                })
                .await?;
            monitor_images.push((mc_id, crop.clone()));
            self.prev_images.insert(i, crop.clone());
        }

        if let Some(window_info) = window_info {
            self.insert_window_event(screenshot_id, now, window_info)
                .await?;
        }

        self.db
            .update_screenshot_file_size(screenshot_id, total_size as i64)
            .await?;

        if let Some(pipeline) = &self.pipeline {
            pipeline
                .enqueue(WorkItem {
                    screenshot_id,
                    monitor_images,
                })
                .await;
        }

        self.capture_count += 1;
        debug!(
            "captured screenshot {} ({} monitors, {:.1} KB)",
            screenshot_id,
            crops.len(),
            total_size as f64 / 1024.0
        );
        Ok(())
    }

    async fn insert_window_event(
        &self,
        screenshot_id: i64,
        timestamp: chrono::NaiveDateTime,
        info: WindowInfo,
    ) -> Result<()> {
        // Best-effort: a failed history lookup just yields no domain.
        let browser_domain = if browser::is_browser(&info.resource_class) {
            browser::extract_domain(&info.resource_class).await
        } else {
            String::new()
        };

        self.db
            .insert_window_event(&NewWindowEvent {
                screenshot_id,
                timestamp,
                app_class: info.resource_class,
                app_name: info.resource_name,
                window_title: info.caption,
                desktop_file: info.desktop_file,
                pid: info.pid,
                browser_domain,
            })
            .await?;
        Ok(())
    }
}
