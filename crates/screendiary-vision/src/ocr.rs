// screendiary — your desktop, remembered and searchable
// https://github.com/hermanntoast/screendiary

//! Tesseract adapter. Images are grayscaled and capped at 2000 px wide
//! before recognition; word boxes are scaled back into original image
//! coordinates so overlays line up with the stored frames.

use anyhow::{bail, Context, Result};
use image::imageops::FilterType;
use image::DynamicImage;
use std::time::Duration;
use tracing::debug;

use crate::run_tool;

/// Downscale bound for recognition input.
pub const OCR_MAX_WIDTH: u32 = 2000;

const OCR_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq)]
pub struct WordBox {
    pub word: String,
    pub left: i64,
    pub top: i64,
    pub width: i64,
    pub height: i64,
    pub confidence: f64,
}

#[derive(Debug, Clone, Default)]
pub struct OcrOutput {
    pub text: String,
    /// Mean word confidence (0-100).
    pub confidence: f64,
    /// Word boxes in original image coordinates.
    pub words: Vec<WordBox>,
}

/// Grayscale and downscale for recognition. Returns the prepared image
/// and the factor that maps prepared coordinates back to the original.
fn prepare_image(image: &DynamicImage) -> (DynamicImage, f64) {
    let mut scale = 1.0;
    let mut prepared = image.clone();
    if prepared.width() > OCR_MAX_WIDTH {
        scale = f64::from(image.width()) / f64::from(OCR_MAX_WIDTH);
        let height = ((f64::from(image.height()) / scale).round() as u32).max(1);
        prepared = prepared.resize_exact(OCR_MAX_WIDTH, height, FilterType::Lanczos3);
    }
    (DynamicImage::ImageLuma8(prepared.to_luma8()), scale)
}

/// Run tesseract over an image.
pub async fn ocr_image(image: &DynamicImage, languages: &str, psm: u32) -> Result<OcrOutput> {
    let input = image.clone();
    let (tmp_path, scale) = tokio::task::spawn_blocking(move || -> Result<_> {
        let (prepared, scale) = prepare_image(&input);
        let tmp = tempfile::Builder::new()
            .prefix("sd_ocr_")
            .suffix(".png")
            .tempfile()
            .context("failed to create ocr temp file")?;
        prepared
            .save(tmp.path())
            .context("failed to write ocr input")?;
        Ok((tmp, scale))
    })
    .await
    .context("ocr prepare task failed")??;

    let input_path = tmp_path.path().to_string_lossy().into_owned();
    let psm = psm.to_string();
    let output = run_tool(
        "tesseract",
        &[&input_path, "stdout", "-l", languages, "--psm", &psm, "tsv"],
        // One recognition per worker is parallelism enough; keep
        // tesseract's own OpenMP pool out of the way.
        &[("OMP_THREAD_LIMIT", "1")],
        OCR_TIMEOUT,
    )
    .await;

    let Some(output) = output else {
        bail!("tesseract timed out");
    };
    if output.code != 0 {
        bail!("tesseract failed: {}", output.stderr.trim());
    }

    let result = parse_tsv(&String::from_utf8_lossy(&output.stdout), scale);
    debug!(
        "ocr: {} words, confidence {:.1}",
        result.words.len(),
        result.confidence
    );
    Ok(result)
}

/// Parse tesseract TSV output. Word rows are level 5; negative
/// confidences count as 0. Box coordinates are multiplied by `scale`
/// and truncated, matching the downscale applied on the way in.
pub fn parse_tsv(tsv: &str, scale: f64) -> OcrOutput {
    let mut words = Vec::new();
    let mut text_parts = Vec::new();
    let mut confidences = Vec::new();

    for line in tsv.lines().skip(1) {
        let cols: Vec<&str> = line.split('\t').collect();
        if cols.len() < 12 || cols[0] != "5" {
            continue;
        }
        let word = cols[11].trim();
        if word.is_empty() {
            continue;
        }

        let raw_conf: f64 = cols[10].trim().parse().unwrap_or(-1.0);
        let confidence = if raw_conf >= 0.0 { raw_conf } else { 0.0 };

        let scaled = |col: &str| (col.trim().parse::<f64>().unwrap_or(0.0) * scale) as i64;
        words.push(WordBox {
            word: word.to_string(),
            left: scaled(cols[6]),
            top: scaled(cols[7]),
            width: scaled(cols[8]),
            height: scaled(cols[9]),
            confidence,
        });
        text_parts.push(word.to_string());
        confidences.push(confidence);
    }

    let confidence = if confidences.is_empty() {
        0.0
    } else {
        confidences.iter().sum::<f64>() / confidences.len() as f64
    };

    OcrOutput {
        text: text_parts.join(" "),
        confidence,
        words,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    const HEADER: &str = "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext";

    fn tsv_line(level: u32, left: i64, top: i64, w: i64, h: i64, conf: &str, text: &str) -> String {
        format!("{level}\t1\t1\t1\t1\t1\t{left}\t{top}\t{w}\t{h}\t{conf}\t{text}")
    }

    #[test]
    fn test_parse_tsv_extracts_words() {
        let tsv = [
            HEADER.to_string(),
            tsv_line(1, 0, 0, 2000, 1000, "-1", ""),
            tsv_line(5, 10, 20, 100, 30, "96.5", "Hello"),
            tsv_line(5, 120, 20, 110, 30, "88.5", "world"),
        ]
        .join("\n");

        let out = parse_tsv(&tsv, 1.0);
        assert_eq!(out.text, "Hello world");
        assert_eq!(out.words.len(), 2);
        assert_eq!(out.confidence, 92.5);
        assert_eq!(out.words[0].left, 10);
        assert_eq!(out.words[1].width, 110);
    }

    #[test]
    fn test_parse_tsv_scales_boxes_back() {
        let tsv = [
            HEADER.to_string(),
            tsv_line(5, 100, 50, 200, 25, "90", "scaled"),
        ]
        .join("\n");

        let out = parse_tsv(&tsv, 1.92);
        assert_eq!(out.words[0].left, 192);
        assert_eq!(out.words[0].top, 96);
        assert_eq!(out.words[0].width, 384);
        assert_eq!(out.words[0].height, 48);
    }

    #[test]
    fn test_parse_tsv_negative_conf_counts_as_zero() {
        let tsv = [
            HEADER.to_string(),
            tsv_line(5, 0, 0, 10, 10, "-1", "ghost"),
            tsv_line(5, 0, 0, 10, 10, "80", "real"),
        ]
        .join("\n");

        let out = parse_tsv(&tsv, 1.0);
        assert_eq!(out.text, "ghost real");
        assert_eq!(out.confidence, 40.0);
        assert_eq!(out.words[0].confidence, 0.0);
    }

    #[test]
    fn test_parse_tsv_skips_non_word_levels() {
        let tsv = [
            HEADER.to_string(),
            tsv_line(4, 0, 0, 500, 40, "-1", ""),
            tsv_line(5, 0, 0, 60, 20, "75", "only"),
        ]
        .join("\n");

        let out = parse_tsv(&tsv, 1.0);
        assert_eq!(out.words.len(), 1);
        assert_eq!(out.text, "only");
    }

    #[test]
    fn test_parse_tsv_empty_output() {
        let out = parse_tsv(HEADER, 1.0);
        assert!(out.text.is_empty());
        assert_eq!(out.confidence, 0.0);
        assert!(out.words.is_empty());
    }

    #[test]
    fn test_prepare_keeps_small_images() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(1920, 1080, Rgb([128, 0, 0])));
        let (prepared, scale) = prepare_image(&img);
        assert_eq!(scale, 1.0);
        assert_eq!(prepared.width(), 1920);
    }

    #[test]
    fn test_prepare_downscales_wide_images() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(3840, 1080, Rgb([0, 128, 0])));
        let (prepared, scale) = prepare_image(&img);
        assert_eq!(prepared.width(), 2000);
        assert_eq!(scale, 1.92);
        // A prepared box at the right edge maps back inside the original
        let right_edge = (2000.0 * scale) as i64;
        assert!(right_edge <= 3840);
    }
}
