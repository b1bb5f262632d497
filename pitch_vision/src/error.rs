// THEORY:
// Only two kinds of failure ever leave the engine. `ConfigError` describes a
// tunable that can never produce meaningful statistics. `AnalysisError` is the
// single top-level error a run can return. Everything else (a missing heatmap, a
// detector that raised, a crop with no usable color) is absorbed frame by frame
// into degraded-but-present statistics and never reaches the caller.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("model resolution must be non-zero, got {width}x{height}")]
    ZeroResolution { width: u32, height: u32 },

    #[error("detection threshold must lie in [0, 1], got {0}")]
    DetectionThreshold(f32),

    #[error("{name} must be a positive, finite number")]
    NonPositive { name: &'static str },

    #[error("track_min_hits must be at least 1")]
    ZeroConfirmHits,

    #[error("track_max_age must be at least 1")]
    ZeroMaxAge,

    #[error("min_bootstrap_samples must be at least 2 to form two teams, got {0}")]
    TooFewBootstrapSamples(usize),

    #[error("background HSV band is empty: lower {lower:?} exceeds upper {upper:?}")]
    EmptyBackgroundBand { lower: [u8; 3], upper: [u8; 3] },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AnalysisError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(#[from] ConfigError),

    #[error("video reports {0} frames, nothing to analyze")]
    EmptyVideo(u64),

    #[error("video dimensions must be non-zero, got {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    #[error("heatmap channel {channel} is out of range, model produced {available} channel(s)")]
    HeatmapChannelOutOfRange { channel: usize, available: usize },

    #[error("heatmap is {found_width}x{found_height}, expected {expected_width}x{expected_height}")]
    HeatmapShapeMismatch {
        expected_width: u32,
        expected_height: u32,
        found_width: u32,
        found_height: u32,
    },

    #[error("heatmap buffer holds {found} values, expected {expected}")]
    HeatmapBufferLength { expected: usize, found: usize },

    #[error("frame {got} arrived after frame {last}; frames must be strictly increasing")]
    OutOfOrderFrame { last: u64, got: u64 },

    #[error("frame sequence {sequence} was submitted twice")]
    DuplicateFrame { sequence: u64 },

    #[error("frame sequence {got} arrived after sequence {next_expected} was already due")]
    StaleFrame { next_expected: u64, got: u64 },

    #[error("analysis worker for run '{run}' stopped unexpectedly: {reason}")]
    WorkerFailed { run: String, reason: String },
}

impl AnalysisError {
    /// Configuration inconsistencies are discovered mid-run but mean every later
    /// frame would be wrong too, so the run must stop rather than emit zeros.
    pub fn is_configuration_inconsistency(&self) -> bool {
        matches!(
            self,
            AnalysisError::InvalidConfig(_)
                | AnalysisError::HeatmapChannelOutOfRange { .. }
                | AnalysisError::HeatmapShapeMismatch { .. }
                | AnalysisError::HeatmapBufferLength { .. }
        )
    }
}
