// THEORY:
// A `Heatmap` is the raw sensory input of the ball layer: a dense, row-major grid
// of confidence scores in [0, 1] at the model's fixed resolution. It is produced
// externally once per processed frame and is read-only to the engine.
//
// Perception models often emit several channels at once, and emit logits rather
// than probabilities. `HeatmapStack` and `Heatmap::from_logits` absorb both
// details at the boundary so that the peak search only ever sees one
// probability grid. Picking a channel that does not exist is a configuration
// inconsistency, not a missing signal, and is reported as a fatal error.

use crate::error::AnalysisError;
use image::{ImageBuffer, Luma};

/// A single-channel confidence grid in model space.
#[derive(Debug, Clone, PartialEq)]
pub struct Heatmap {
    width: u32,
    height: u32,
    values: Vec<f32>,
}

impl Heatmap {
    pub fn new(width: u32, height: u32, values: Vec<f32>) -> Result<Self, AnalysisError> {
        let expected = width as usize * height as usize;
        if values.len() != expected {
            return Err(AnalysisError::HeatmapBufferLength {
                expected,
                found: values.len(),
            });
        }
        Ok(Self { width, height, values })
    }

    pub fn zeros(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            values: vec![0.0; width as usize * height as usize],
        }
    }

    /// Builds a probability grid from raw model logits by applying the logistic function.
    pub fn from_logits(width: u32, height: u32, logits: Vec<f32>) -> Result<Self, AnalysisError> {
        let probabilities = logits.into_iter().map(sigmoid).collect();
        Self::new(width, height, probabilities)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn get(&self, x: u32, y: u32) -> Option<f32> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.values.get(y as usize * self.width as usize + x as usize).copied()
    }

    /// Writes one cell; out-of-bounds writes are ignored.
    pub fn set(&mut self, x: u32, y: u32, value: f32) {
        if x < self.width && y < self.height {
            let index = y as usize * self.width as usize + x as usize;
            self.values[index] = value;
        }
    }

    /// The row slice `y`, restricted to columns `x_start..x_end`.
    pub(crate) fn row_segment(&self, y: u32, x_start: u32, x_end: u32) -> &[f32] {
        let row_start = y as usize * self.width as usize;
        &self.values[row_start + x_start as usize..row_start + x_end as usize]
    }

    /// Fails if this grid does not have the resolution the run was configured for.
    pub fn ensure_shape(&self, width: u32, height: u32) -> Result<(), AnalysisError> {
        if self.width == width && self.height == height {
            Ok(())
        } else {
            Err(AnalysisError::HeatmapShapeMismatch {
                expected_width: width,
                expected_height: height,
                found_width: self.width,
                found_height: self.height,
            })
        }
    }
}

impl From<ImageBuffer<Luma<f32>, Vec<f32>>> for Heatmap {
    fn from(buffer: ImageBuffer<Luma<f32>, Vec<f32>>) -> Self {
        let (width, height) = buffer.dimensions();
        Self {
            width,
            height,
            values: buffer.into_raw(),
        }
    }
}

/// A multi-channel model output; one of the channels is the ball heatmap.
#[derive(Debug, Clone, PartialEq)]
pub struct HeatmapStack {
    channels: Vec<Heatmap>,
}

impl HeatmapStack {
    pub fn new(channels: Vec<Heatmap>) -> Self {
        Self { channels }
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn select(&self, channel: usize) -> Result<&Heatmap, AnalysisError> {
        self.channels
            .get(channel)
            .ok_or(AnalysisError::HeatmapChannelOutOfRange {
                channel,
                available: self.channels.len(),
            })
    }
}

/// What the perception model delivered for one frame.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelOutput {
    /// The ball channel has already been extracted upstream.
    Heatmap(Heatmap),
    /// The full model output; the configured channel is selected here.
    Channels(HeatmapStack),
}

impl ModelOutput {
    pub fn ball_heatmap(&self, channel: usize) -> Result<&Heatmap, AnalysisError> {
        match self {
            ModelOutput::Heatmap(heatmap) => Ok(heatmap),
            ModelOutput::Channels(stack) => stack.select(channel),
        }
    }
}

fn sigmoid(logit: f32) -> f32 {
    1.0 / (1.0 + (-logit).exp())
}
