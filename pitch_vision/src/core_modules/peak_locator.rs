// THEORY:
// The `PeakLocator` is the entry point of the ball layer. It turns one raw
// confidence heatmap into at most one candidate ball location.
//
// Key architectural principles & algorithm steps:
// 1.  **Prior-Biased Window Search**: When the tracker supplied a prior (the last
//     authoritative ball position, in model space), only a square window around
//     it is searched first. A hit there wins even if a brighter peak exists
//     elsewhere, which keeps the track continuous and suppresses spurious
//     far-away responses (crowd, line markings, a second ball on the bench).
// 2.  **Global Fallback**: With no prior, or when the windowed maximum is below
//     the detection threshold, the whole grid is searched.
// 3.  **Deterministic Ties**: Equal maxima resolve to the first cell in row-major
//     order. Scanning uses a strict `>` so the earliest cell is kept.
// 4.  **Stateless Utility**: Like the rest of the spatial layer, the locator keeps
//     no memory. Continuity lives entirely in the prior handed in by the caller.

use crate::core_modules::geometry::{GridPoint, Point};
use crate::core_modules::heatmap::Heatmap;

pub mod peak_locator {
    use super::*;

    /// The fixed parameters of a peak search.
    #[derive(Debug, Clone, Copy, PartialEq)]
    pub struct PeakSearch {
        pub threshold: f32,
        pub window_radius: f64,
    }

    /// A heatmap cell that cleared the detection threshold.
    #[derive(Debug, Clone, Copy, PartialEq)]
    pub struct Peak {
        pub cell: GridPoint,
        pub confidence: f32,
        /// True when the peak came from the window around the prior.
        pub from_window: bool,
    }

    /// Finds the ball candidate for one frame, or `None` if nothing clears the threshold.
    pub fn locate_peak(heatmap: &Heatmap, prior: Option<Point>, search: &PeakSearch) -> Option<Peak> {
        // --- 1. Windowed search around the prior ---
        if let Some(prior) = prior {
            if let Some((x_range, y_range)) = window_bounds(heatmap, prior, search.window_radius) {
                if let Some((cell, confidence)) = max_in_region(heatmap, x_range, y_range) {
                    if confidence >= search.threshold {
                        return Some(Peak {
                            cell,
                            confidence,
                            from_window: true,
                        });
                    }
                }
            }
        }

        // --- 2. Global search ---
        let (cell, confidence) = max_in_region(heatmap, (0, heatmap.width()), (0, heatmap.height()))?;
        if confidence >= search.threshold {
            Some(Peak {
                cell,
                confidence,
                from_window: false,
            })
        } else {
            None
        }
    }

    /// The half-open `[start, end)` column and row ranges of the window, clipped to the grid.
    /// Returns `None` when the clipped window is empty.
    fn window_bounds(heatmap: &Heatmap, prior: Point, radius: f64) -> Option<((u32, u32), (u32, u32))> {
        if !(prior.x.is_finite() && prior.y.is_finite()) {
            return None;
        }
        // Float-to-int `as` truncates and saturates negatives at zero.
        let x_min = (prior.x - radius).max(0.0) as u32;
        let x_max = (prior.x + radius).min(heatmap.width() as f64) as u32;
        let y_min = (prior.y - radius).max(0.0) as u32;
        let y_max = (prior.y + radius).min(heatmap.height() as f64) as u32;

        if x_min < x_max && y_min < y_max {
            Some(((x_min, x_max), (y_min, y_max)))
        } else {
            None
        }
    }

    /// Row-major scan for the maximum; the first occurrence wins ties. NaN cells are skipped.
    fn max_in_region(heatmap: &Heatmap, x_range: (u32, u32), y_range: (u32, u32)) -> Option<(GridPoint, f32)> {
        let mut best: Option<(GridPoint, f32)> = None;
        for y in y_range.0..y_range.1 {
            let row = heatmap.row_segment(y, x_range.0, x_range.1);
            for (offset, &value) in row.iter().enumerate() {
                if value.is_nan() {
                    continue;
                }
                let improves = match best {
                    Some((_, best_value)) => value > best_value,
                    None => true,
                };
                if improves {
                    let cell = GridPoint {
                        x: x_range.0 + offset as u32,
                        y,
                    };
                    best = Some((cell, value));
                }
            }
        }
        best
    }
}
