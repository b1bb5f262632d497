// THEORY:
// All tunable behavior of the engine is gathered into one immutable
// `AnalysisConfig`, handed to each component when it is constructed. There is no
// module-level mutable state: two runs with different configs can live side by
// side in the same process.
//
// `VideoMetadata` is fetched once by the host before a run. From it and the model
// resolution we derive a `FrameScale`, the only bridge between heatmap (model)
// coordinates and original frame coordinates.

use crate::core_modules::geometry::{BoundingBox, GridPoint, Point};
use crate::error::{AnalysisError, ConfigError};
use serde::{Deserialize, Serialize};
use tracing::warn;

const FALLBACK_FPS: f64 = 30.0;

/// Configuration for a single analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Width of the ball heatmap produced by the perception model.
    pub model_width: u32,
    /// Height of the ball heatmap produced by the perception model.
    pub model_height: u32,
    /// Minimum heatmap confidence for a peak to count as a ball detection.
    pub detection_threshold: f32,
    /// Half-size, in model pixels, of the square window searched around the prior.
    pub search_window_radius: f64,
    /// Side, in model pixels, of the box handed to the tracker around each peak.
    pub ball_box_size: f64,
    /// Consecutive misses after which the ball track is deleted.
    pub track_max_age: u32,
    /// Hits needed before a tentative track is confirmed.
    pub track_min_hits: u32,
    /// Optional association gate in frame pixels around the predicted ball position.
    pub track_gate_distance: Option<f64>,
    /// Maximum ball-to-player-center distance, in frame pixels, for possession.
    pub possession_distance: f64,
    /// Number of leading frames sampled to bootstrap the team reference colors.
    pub bootstrap_frames: usize,
    /// Minimum color samples needed for the bootstrap to enable team classification.
    pub min_bootstrap_samples: usize,
    /// LAB distance under which the two reference colors are reported as poorly separated.
    pub team_similarity_threshold: f64,
    /// Minimum non-grass pixels a player crop needs to yield a color sample.
    pub min_non_background_pixels: usize,
    /// Inclusive lower HSV bound (OpenCV scale: H 0..180, S/V 0..255) of the pitch color.
    pub background_hsv_lower: [u8; 3],
    /// Inclusive upper HSV bound of the pitch color.
    pub background_hsv_upper: [u8; 3],
    /// Which channel of a multi-channel model output carries the ball heatmap.
    pub heatmap_channel: usize,
    /// Upper bound on Lloyd iterations for each two-cluster grouping.
    pub kmeans_max_iterations: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            model_width: 1024,
            model_height: 576,
            detection_threshold: 0.3,
            search_window_radius: 50.0,
            ball_box_size: 15.0,
            track_max_age: 10,
            track_min_hits: 3,
            track_gate_distance: None,
            possession_distance: 150.0,
            bootstrap_frames: 50,
            min_bootstrap_samples: 10,
            team_similarity_threshold: 20.0,
            min_non_background_pixels: 50,
            background_hsv_lower: [30, 40, 40],
            background_hsv_upper: [90, 255, 255],
            heatmap_channel: 1,
            kmeans_max_iterations: 100,
        }
    }
}

impl AnalysisConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.model_width == 0 || self.model_height == 0 {
            return Err(ConfigError::ZeroResolution {
                width: self.model_width,
                height: self.model_height,
            });
        }
        if !(0.0..=1.0).contains(&self.detection_threshold) {
            return Err(ConfigError::DetectionThreshold(self.detection_threshold));
        }
        Self::require_positive("search_window_radius", self.search_window_radius)?;
        Self::require_positive("ball_box_size", self.ball_box_size)?;
        Self::require_positive("possession_distance", self.possession_distance)?;
        if let Some(gate) = self.track_gate_distance {
            Self::require_positive("track_gate_distance", gate)?;
        }
        if self.track_min_hits == 0 {
            return Err(ConfigError::ZeroConfirmHits);
        }
        if self.track_max_age == 0 {
            return Err(ConfigError::ZeroMaxAge);
        }
        if self.min_bootstrap_samples < 2 {
            return Err(ConfigError::TooFewBootstrapSamples(self.min_bootstrap_samples));
        }
        if self.bootstrap_frames == 0 {
            return Err(ConfigError::NonPositive { name: "bootstrap_frames" });
        }
        if self.kmeans_max_iterations == 0 {
            return Err(ConfigError::NonPositive { name: "kmeans_max_iterations" });
        }
        let lower = self.background_hsv_lower;
        let upper = self.background_hsv_upper;
        if lower.iter().zip(upper.iter()).any(|(lo, hi)| lo > hi) {
            return Err(ConfigError::EmptyBackgroundBand { lower, upper });
        }
        Ok(())
    }

    fn require_positive(name: &'static str, value: f64) -> Result<(), ConfigError> {
        if value.is_finite() && value > 0.0 {
            Ok(())
        } else {
            Err(ConfigError::NonPositive { name })
        }
    }
}

/// Static facts about the video, fetched once before the run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VideoMetadata {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub frame_count: u64,
}

impl VideoMetadata {
    /// Rejects videos that cannot be analyzed and repairs a missing frame rate.
    pub fn validated(mut self) -> Result<Self, AnalysisError> {
        if self.width == 0 || self.height == 0 {
            return Err(AnalysisError::InvalidDimensions {
                width: self.width,
                height: self.height,
            });
        }
        if self.frame_count == 0 {
            return Err(AnalysisError::EmptyVideo(self.frame_count));
        }
        if !(self.fps.is_finite() && self.fps > 0.0) {
            warn!(reported = self.fps, fallback = FALLBACK_FPS, "video fps unusable, falling back");
            self.fps = FALLBACK_FPS;
        }
        Ok(self)
    }
}

/// Fixed per-run conversion between model space and frame space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameScale {
    pub scale_x: f64,
    pub scale_y: f64,
    frame_width: f64,
    frame_height: f64,
    ball_box_size: f64,
}

impl FrameScale {
    pub fn new(metadata: &VideoMetadata, config: &AnalysisConfig) -> Self {
        Self {
            scale_x: metadata.width as f64 / config.model_width as f64,
            scale_y: metadata.height as f64 / config.model_height as f64,
            frame_width: metadata.width as f64,
            frame_height: metadata.height as f64,
            ball_box_size: config.ball_box_size,
        }
    }

    pub fn to_frame(&self, cell: GridPoint) -> Point {
        Point::new(cell.x as f64 * self.scale_x, cell.y as f64 * self.scale_y)
    }

    pub fn to_model(&self, point: Point) -> Point {
        Point::new(point.x / self.scale_x, point.y / self.scale_y)
    }

    /// Builds the frame-space ball box around a heatmap peak.
    ///
    /// The box is anchored at the top-left corner clamped to the frame, then its
    /// size is clipped to the frame edge, never dropping below one pixel.
    pub fn ball_box(&self, peak: GridPoint) -> BoundingBox {
        let center = self.to_frame(peak);
        let width = self.ball_box_size * self.scale_x;
        let height = self.ball_box_size * self.scale_y;
        let left = (center.x - width / 2.0).max(0.0);
        let top = (center.y - height / 2.0).max(0.0);

        let width = if left + width <= self.frame_width { width } else { self.frame_width - left };
        let height = if top + height <= self.frame_height { height } else { self.frame_height - top };
        let width = width.max(1.0);
        let height = height.max(1.0);

        BoundingBox::new(left, top, left + width, top + height)
    }
}
