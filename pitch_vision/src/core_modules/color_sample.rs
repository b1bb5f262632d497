// THEORY:
// A `ColorSample` is one player's jersey color for one frame, expressed in
// L*a*b*. It is the only thing the team layer knows about a player's appearance.
//
// Extraction from a crop works in three steps:
// 1.  **Background Masking**: every pixel whose HSV falls inside the configured
//     grass band is dropped. What remains is shirt, shorts, skin and shadow.
// 2.  **Pooling**: the remaining pixels are averaged per channel with integer
//     division, exactly like averaging a chunk of pixels. A single-cluster
//     k-means converges to this mean, so no iteration is needed.
// 3.  **Conversion**: the pooled RGB pixel is converted to L*a*b*.
//
// A crop that is empty, or that keeps fewer than `min_non_background_pixels`
// pixels after masking, yields no sample: the player gets no team label that frame.

use crate::config::AnalysisConfig;
use crate::core_modules::geometry::BoundingBox;
use crate::core_modules::pixel::pixel::Pixel;
use image::RgbImage;
use serde::{Deserialize, Serialize};

/// A dominant color in CIE L*a*b*.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColorSample {
    pub lightness: f64,
    pub a: f64,
    pub b: f64,
}

impl ColorSample {
    pub fn new(lightness: f64, a: f64, b: f64) -> Self {
        Self { lightness, a, b }
    }

    pub fn from_rgb(red: u8, green: u8, blue: u8) -> Self {
        let (lightness, a, b) = Pixel::new(red, green, blue).lab();
        Self { lightness, a, b }
    }

    /// Euclidean distance in L*a*b* (CIE76 delta E).
    pub fn distance(&self, other: &ColorSample) -> f64 {
        ((self.lightness - other.lightness).powi(2) + (self.a - other.a).powi(2) + (self.b - other.b).powi(2)).sqrt()
    }

    /// Extracts the dominant non-grass color of a player crop.
    pub fn from_crop(crop: &RgbImage, config: &AnalysisConfig) -> Option<ColorSample> {
        let pixels = crop.pixels().map(|p| Pixel::from(*p));
        Self::from_pixels(pixels, config)
    }

    /// Like [`ColorSample::from_crop`], but cuts the player's box out of a full frame first.
    /// Boxes are clipped to the frame; degenerate boxes yield nothing.
    pub fn from_frame_region(frame: &RgbImage, bounds: &BoundingBox, config: &AnalysisConfig) -> Option<ColorSample> {
        if !bounds.is_valid() {
            return None;
        }
        let (frame_width, frame_height) = frame.dimensions();
        let x1 = bounds.x1.max(0.0) as u32;
        let y1 = bounds.y1.max(0.0) as u32;
        let x2 = (bounds.x2.max(0.0) as u32).min(frame_width);
        let y2 = (bounds.y2.max(0.0) as u32).min(frame_height);
        if x1 >= x2 || y1 >= y2 {
            return None;
        }

        let pixels = (y1..y2).flat_map(|y| (x1..x2).map(move |x| Pixel::from(*frame.get_pixel(x, y))));
        Self::from_pixels(pixels, config)
    }

    fn from_pixels(pixels: impl Iterator<Item = Pixel>, config: &AnalysisConfig) -> Option<ColorSample> {
        let mut count = 0u64;
        let mut sum_r = 0u64;
        let mut sum_g = 0u64;
        let mut sum_b = 0u64;

        for pixel in pixels {
            if pixel.hsv().within(config.background_hsv_lower, config.background_hsv_upper) {
                continue;
            }
            count += 1;
            sum_r += pixel.red as u64;
            sum_g += pixel.green as u64;
            sum_b += pixel.blue as u64;
        }

        if count == 0 || count < config.min_non_background_pixels as u64 {
            return None;
        }

        let dominant = Pixel::new((sum_r / count) as u8, (sum_g / count) as u8, (sum_b / count) as u8);
        let (lightness, a, b) = dominant.lab();
        Some(ColorSample { lightness, a, b })
    }
}
