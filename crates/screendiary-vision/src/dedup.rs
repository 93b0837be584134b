// screendiary — your desktop, remembered and searchable
// https://github.com/hermanntoast/screendiary

//! Pixel-difference frame dedup. Both images are downscaled to a small
//! fixed size so the comparison cost is independent of monitor
//! resolution.

use image::imageops::FilterType;
use image::DynamicImage;

const COMPARE_WIDTH: u32 = 480;
const COMPARE_HEIGHT: u32 = 300;

/// Similarity in 0.0-1.0: `1 − mean(|Δrgb|) / 255` over a 480×300
/// downscale. 1.0 means identical.
pub fn image_similarity(a: &DynamicImage, b: &DynamicImage) -> f32 {
    let a = a
        .resize_exact(COMPARE_WIDTH, COMPARE_HEIGHT, FilterType::Triangle)
        .to_rgb8();
    let b = b
        .resize_exact(COMPARE_WIDTH, COMPARE_HEIGHT, FilterType::Triangle)
        .to_rgb8();

    let total: u64 = a
        .as_raw()
        .iter()
        .zip(b.as_raw().iter())
        .map(|(&x, &y)| u64::from(x.abs_diff(y)))
        .sum();
    let mean = total as f32 / (COMPARE_WIDTH * COMPARE_HEIGHT * 3) as f32;
    1.0 - mean / 255.0
}

/// Returns (is_duplicate, similarity) against the previous frame.
pub fn is_duplicate(new: &DynamicImage, prev: &DynamicImage, threshold: f32) -> (bool, f32) {
    let similarity = image_similarity(new, prev);
    (similarity >= threshold, similarity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn solid(width: u32, height: u32, rgb: [u8; 3]) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb(rgb)))
    }

    #[test]
    fn test_identical_images_score_one() {
        let img = solid(1920, 1080, [40, 80, 120]);
        assert_eq!(image_similarity(&img, &img), 1.0);
    }

    #[test]
    fn test_black_vs_white_scores_zero() {
        let black = solid(640, 480, [0, 0, 0]);
        let white = solid(640, 480, [255, 255, 255]);
        let similarity = image_similarity(&black, &white);
        assert!(similarity.abs() < 1e-6, "similarity was {}", similarity);
    }

    #[test]
    fn test_similarity_is_symmetric() {
        let a = solid(800, 600, [10, 20, 30]);
        let b = solid(800, 600, [200, 180, 160]);
        assert_eq!(image_similarity(&a, &b), image_similarity(&b, &a));
    }

    #[test]
    fn test_threshold_decides_duplicate() {
        let a = solid(640, 480, [100, 100, 100]);
        let b = solid(640, 480, [105, 105, 105]);
        // 5/255 mean diff → similarity ≈ 0.98
        let (dup_strict, sim) = is_duplicate(&a, &b, 0.99);
        assert!(!dup_strict);
        let (dup_loose, _) = is_duplicate(&a, &b, 0.95);
        assert!(dup_loose);
        assert!(sim > 0.97 && sim < 0.99);
    }

    #[test]
    fn test_different_resolutions_compare_fine() {
        let a = solid(1920, 1080, [50, 50, 50]);
        let b = solid(2560, 1440, [50, 50, 50]);
        assert_eq!(image_similarity(&a, &b), 1.0);
    }
}
