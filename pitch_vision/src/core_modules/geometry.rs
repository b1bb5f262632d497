// THEORY:
// The `geometry` module holds the small, "dumb" coordinate containers shared by
// every layer of the engine. Nothing here has memory or behavior beyond simple
// arithmetic on its own fields.
//
// Two coordinate systems are in play:
// 1.  **Model space**: the fixed resolution of the ball heatmap. Heatmap cells are
//     addressed with integer `GridPoint`s; the tracker's prior is a fractional
//     `Point` in the same space.
// 2.  **Frame space**: the original video resolution. Player boxes arrive in this
//     space and possession distances are measured here.
//
// Conversions between the two live in `config::FrameScale`, which is derived once
// per run from the video metadata.

use serde::{Deserialize, Serialize};

/// The identity the external player tracker assigns to a player. Stable across frames.
pub type TrackId = u32;

/// A fractional 2D position, in either model space or frame space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance_squared(&self, other: &Point) -> f64 {
        (self.x - other.x).powi(2) + (self.y - other.y).powi(2)
    }

    pub fn distance(&self, other: &Point) -> f64 {
        self.distance_squared(other).sqrt()
    }
}

/// An integer cell coordinate on the heatmap grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GridPoint {
    pub x: u32,
    pub y: u32,
}

/// An axis-aligned box given by its top-left `(x1, y1)` and bottom-right `(x2, y2)` corners.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl BoundingBox {
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn center(&self) -> Point {
        Point::new((self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0)
    }

    pub fn width(&self) -> f64 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f64 {
        self.y2 - self.y1
    }

    /// A box is degenerate when it has no positive area or carries non-finite corners.
    pub fn is_valid(&self) -> bool {
        let finite = self.x1.is_finite() && self.y1.is_finite() && self.x2.is_finite() && self.y2.is_finite();
        finite && self.x1 < self.x2 && self.y1 < self.y2
    }
}

/// One player as reported by the external detector for a single frame.
/// Read-only to this engine; the `track_id` is owned by the upstream tracker.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlayerBox {
    pub track_id: TrackId,
    #[serde(flatten)]
    pub bounds: BoundingBox,
}

impl PlayerBox {
    pub fn new(track_id: TrackId, x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self {
            track_id,
            bounds: BoundingBox::new(x1, y1, x2, y2),
        }
    }

    pub fn center(&self) -> Point {
        self.bounds.center()
    }

    pub fn is_valid(&self) -> bool {
        self.bounds.is_valid()
    }
}
