// screendiary — your desktop, remembered and searchable
// https://github.com/hermanntoast/screendiary

//! TOML configuration with defaults, range validation and the usual
//! search order: `$SCREENDIARY_CONFIG`, `./config.toml`,
//! `$XDG_CONFIG_HOME/screendiary/config.toml`.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Seconds between capture ticks (1-30).
    pub interval: u64,
    /// Dedup similarity above which a tick is skipped (0.0-1.0).
    pub similarity_threshold: f32,
    /// Screenshot tool binary.
    pub tool: String,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            interval: 2,
            similarity_threshold: 0.98,
            tool: "spectacle".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    pub format: String,
    pub quality: u8,
    pub thumbnail_width: u32,
    pub max_storage_gb: u64,
    pub archive_after_minutes: u32,
    pub segment_duration_minutes: u32,
    pub h265_crf: u32,
    pub h265_preset: String,
    pub frame_cache_size: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            format: "webp".to_string(),
            quality: 80,
            thumbnail_width: 320,
            max_storage_gb: 200,
            archive_after_minutes: 10,
            segment_duration_minutes: 5,
            h265_crf: 28,
            h265_preset: "medium".to_string(),
            frame_cache_size: 100,
        }
    }
}

impl StorageConfig {
    pub fn screenshots_path(&self) -> PathBuf {
        self.data_dir.join("screenshots")
    }

    pub fn archive_path(&self) -> PathBuf {
        self.data_dir.join("archive")
    }

    pub fn frame_cache_path(&self) -> PathBuf {
        self.data_dir.join("frame_cache")
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("screendiary.db")
    }

    pub fn max_storage_bytes(&self) -> u64 {
        self.max_storage_gb * 1024 * 1024 * 1024
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    /// Tesseract languages, e.g. "deu+eng".
    pub languages: String,
    /// Tesseract page segmentation mode.
    pub psm: u32,
    /// Results shorter than this are discarded.
    pub min_text_length: usize,
    /// Concurrent pipeline workers.
    pub workers: usize,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            languages: "deu+eng".to_string(),
            psm: 3,
            min_text_length: 10,
            workers: 2,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    pub api_base: String,
    pub api_key: String,
    pub embedding_model: String,
    pub chat_model: String,
    pub chunk_max_tokens: usize,
    pub enabled: bool,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            api_base: "http://localhost:8000/v1".to_string(),
            api_key: String::new(),
            embedding_model: "text-embedding-3-small".to_string(),
            chat_model: "gpt-4".to_string(),
            chunk_max_tokens: 512,
            enabled: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// Also write daily-rotated log files under `<data_dir>/logs`.
    pub file: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: false,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub capture: CaptureConfig,
    pub storage: StorageConfig,
    pub ocr: OcrConfig,
    pub ai: AiConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration. An explicit `path` must exist; otherwise the
    /// search order is consulted and missing config means defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(p) => {
                if !p.is_file() {
                    bail!("config not found: {}", p.display());
                }
                Some(p.to_path_buf())
            }
            None => find_config(),
        };

        let Some(config_path) = config_path else {
            warn!("no config file found, using defaults");
            return Ok(Self::default());
        };

        info!("loading config from {}", config_path.display());
        let raw = std::fs::read_to_string(&config_path)
            .with_context(|| format!("failed to read {}", config_path.display()))?;
        let config: Config = toml::from_str(&raw)
            .with_context(|| format!("failed to parse {}", config_path.display()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if !(1..=30).contains(&self.capture.interval) {
            bail!(
                "capture.interval must be 1-30, got {}",
                self.capture.interval
            );
        }
        if !(0.0..=1.0).contains(&self.capture.similarity_threshold) {
            bail!(
                "capture.similarity_threshold must be 0.0-1.0, got {}",
                self.capture.similarity_threshold
            );
        }
        if self.storage.segment_duration_minutes == 0 {
            bail!("storage.segment_duration_minutes must be positive");
        }
        if self.ocr.workers == 0 {
            bail!("ocr.workers must be positive");
        }
        Ok(())
    }
}

fn find_config() -> Option<PathBuf> {
    if let Ok(p) = env::var("SCREENDIARY_CONFIG") {
        let p = PathBuf::from(p);
        if p.is_file() {
            return Some(p);
        }
    }
    let cwd = PathBuf::from("config.toml");
    if cwd.is_file() {
        return Some(cwd);
    }
    if let Some(dir) = dirs::config_dir() {
        let xdg = dir.join("screendiary").join("config.toml");
        if xdg.is_file() {
            return Some(xdg);
        }
    }
    None
}
