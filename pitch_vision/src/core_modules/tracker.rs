// THEORY:
// The `tracker` module adds "object permanence" to the ball layer. A single
// heatmap peak is noisy: the ball is occluded, blurred, or out-scored by a
// bright shoe for a frame or two. The tracker turns that flickering stream of
// detections into one identity with a lifecycle, and decides when its position
// is trustworthy enough to be counted.
//
// Key architectural principles:
// 1.  **Single Object**: There is exactly one ball. The tracker owns at most one
//     live `TrackedBall`; any detection while a track is live updates it.
// 2.  **Lifecycle Management**:
//     - **Birth**: a detection with no live track opens a `Tentative` track.
//     - **Confirmation**: once the track has collected `min_hits` hits it becomes
//       `Confirmed`. A short miss does not reset the hit count.
//     - **Death**: after `max_age` consecutive misses the track is `Deleted` and
//       dropped. The next detection opens a brand-new track with a new id; a dead
//       track is never resurrected.
// 3.  **Authority**: the track's position is only reported while it is confirmed
//     and was updated this frame or the one before. Everything else is "no ball
//     this frame", which also clears the peak search prior.
// 4.  **Motion Model**: position history gives a constant-velocity prediction.
//     When an association gate is configured, detections too far from the
//     prediction count as a miss for the live track.

use crate::core_modules::geometry::{BoundingBox, Point};
use std::collections::VecDeque;
use tracing::{debug, info};

const POSITION_HISTORY_SIZE: usize = 10;

/// The lifecycle stage of the ball track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackState {
    Tentative,
    Confirmed,
    Deleted,
}

/// One candidate ball location for one frame, in frame space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub bounds: BoundingBox,
    pub confidence: f32,
}

/// The lifecycle policy of the tracker.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackerParams {
    pub max_age: u32,
    pub min_hits: u32,
    pub gate_distance: Option<f64>,
}

/// The tracked ball identity.
#[derive(Debug, Clone)]
pub struct TrackedBall {
    /// Unique per run; a new id is issued every time a track is born.
    pub id: u64,
    pub state: TrackState,
    /// The most recent detection box assigned to this track.
    pub bounds: BoundingBox,
    pub confidence: f32,
    /// Total detections assigned to this track.
    pub hits: u32,
    /// Consecutive frames without a detection.
    pub time_since_update: u32,
    /// Frames since birth, hit or miss.
    pub age: u32,
    pub position_history: VecDeque<Point>,
    /// Displacement between the last two updates, in frame pixels per update.
    pub velocity: (f64, f64),
}

impl TrackedBall {
    fn new(id: u64, detection: Detection) -> Self {
        let mut position_history = VecDeque::with_capacity(POSITION_HISTORY_SIZE);
        position_history.push_back(detection.bounds.center());
        Self {
            id,
            state: TrackState::Tentative,
            bounds: detection.bounds,
            confidence: detection.confidence,
            hits: 1,
            time_since_update: 0,
            age: 1,
            position_history,
            velocity: (0.0, 0.0),
        }
    }

    pub fn center(&self) -> Point {
        self.bounds.center()
    }

    /// Predicts where the ball will be on the next update.
    pub fn predict_next_position(&self) -> Point {
        let current = self.center();
        let steps = (self.time_since_update + 1) as f64;
        Point::new(current.x + self.velocity.0 * steps, current.y + self.velocity.1 * steps)
    }

    /// Whether the position may be consumed downstream this frame.
    pub fn is_authoritative(&self) -> bool {
        self.state == TrackState::Confirmed && self.time_since_update <= 1
    }

    fn update(&mut self, detection: Detection, min_hits: u32) {
        self.bounds = detection.bounds;
        self.confidence = detection.confidence;
        self.position_history.push_back(self.bounds.center());
        if self.position_history.len() > POSITION_HISTORY_SIZE {
            self.position_history.pop_front();
        }

        if self.position_history.len() > 1 {
            let len = self.position_history.len();
            let new_pos = self.position_history[len - 1];
            let old_pos = self.position_history[len - 2];
            self.velocity = (new_pos.x - old_pos.x, new_pos.y - old_pos.y);
        }

        self.hits += 1;
        self.age += 1;
        self.time_since_update = 0;
        if self.state == TrackState::Tentative && self.hits >= min_hits {
            self.state = TrackState::Confirmed;
            info!(track_id = self.id, hits = self.hits, "ball track confirmed");
        }
    }

    fn mark_missed(&mut self, max_age: u32) {
        self.age += 1;
        self.time_since_update += 1;
        if self.time_since_update >= max_age {
            self.state = TrackState::Deleted;
        }
    }
}

/// What the tracker reports for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackOutput {
    /// Frame-space ball position, present only when the track is authoritative.
    pub position: Option<Point>,
    pub track_id: Option<u64>,
    pub state: Option<TrackState>,
}

impl TrackOutput {
    const NONE: TrackOutput = TrackOutput {
        position: None,
        track_id: None,
        state: None,
    };
}

/// Manages the single ball track from one frame to the next.
pub struct BallTracker {
    params: TrackerParams,
    track: Option<TrackedBall>,
    next_id: u64,
}

impl BallTracker {
    pub fn new(params: TrackerParams) -> Self {
        Self {
            params,
            track: None,
            next_id: 0,
        }
    }

    pub fn track(&self) -> Option<&TrackedBall> {
        self.track.as_ref()
    }

    /// Advances the lifecycle by one frame. `None` means no detection this frame,
    /// including the case where the upstream model failed.
    pub fn update(&mut self, detection: Option<Detection>) -> TrackOutput {
        // A detection outside the gate is a miss for the live track; it may still
        // seed the successor if that miss ends the track.
        let (assigned, orphan) = match detection {
            Some(detection) if self.outside_gate(&detection) => (None, Some(detection)),
            other => (other, None),
        };

        match (self.track.as_mut(), assigned) {
            (Some(track), Some(detection)) => {
                track.update(detection, self.params.min_hits);
            }
            (Some(track), None) => {
                track.mark_missed(self.params.max_age);
                if track.state == TrackState::Deleted {
                    info!(
                        track_id = track.id,
                        misses = track.time_since_update,
                        "ball track lost"
                    );
                    self.track = None;
                    if let Some(detection) = orphan {
                        self.spawn(detection);
                        return self.output();
                    }
                    return TrackOutput {
                        state: Some(TrackState::Deleted),
                        ..TrackOutput::NONE
                    };
                }
            }
            (None, Some(detection)) => self.spawn(detection),
            (None, None) => return TrackOutput::NONE,
        }

        self.output()
    }

    fn spawn(&mut self, detection: Detection) {
        let mut track = TrackedBall::new(self.next_id, detection);
        self.next_id += 1;
        debug!(track_id = track.id, "tentative ball track opened");
        if track.hits >= self.params.min_hits {
            track.state = TrackState::Confirmed;
            info!(track_id = track.id, hits = track.hits, "ball track confirmed");
        }
        self.track = Some(track);
    }

    fn outside_gate(&self, detection: &Detection) -> bool {
        let (Some(gate), Some(track)) = (self.params.gate_distance, self.track.as_ref()) else {
            return false;
        };
        let distance = track.predict_next_position().distance(&detection.bounds.center());
        if distance > gate {
            debug!(track_id = track.id, distance, gate, "detection outside association gate");
            true
        } else {
            false
        }
    }

    fn output(&self) -> TrackOutput {
        match &self.track {
            Some(track) => TrackOutput {
                position: track.is_authoritative().then(|| track.center()),
                track_id: Some(track.id),
                state: Some(track.state),
            },
            None => TrackOutput::NONE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PARAMS: TrackerParams = TrackerParams {
        max_age: 10,
        min_hits: 3,
        gate_distance: None,
    };

    fn detection_at(x: f64, y: f64) -> Option<Detection> {
        Some(Detection {
            bounds: BoundingBox::new(x - 5.0, y - 5.0, x + 5.0, y + 5.0),
            confidence: 0.9,
        })
    }

    #[test]
    fn confirms_after_min_hits() {
        let mut tracker = BallTracker::new(PARAMS);
        let first = tracker.update(detection_at(10.0, 10.0));
        assert_eq!(first.state, Some(TrackState::Tentative));
        assert_eq!(first.position, None);

        tracker.update(detection_at(12.0, 10.0));
        let third = tracker.update(detection_at(14.0, 10.0));
        assert_eq!(third.state, Some(TrackState::Confirmed));
        assert_eq!(third.position, Some(Point::new(14.0, 10.0)));
    }

    #[test]
    fn deletes_after_max_age_misses() {
        let mut tracker = BallTracker::new(PARAMS);
        for i in 0..3 {
            tracker.update(detection_at(10.0 + i as f64, 10.0));
        }
        for _ in 0..PARAMS.max_age - 1 {
            let output = tracker.update(None);
            assert_ne!(output.state, Some(TrackState::Deleted));
        }
        let last = tracker.update(None);
        assert_eq!(last.state, Some(TrackState::Deleted));
        assert!(tracker.track().is_none());
    }

    #[test]
    fn position_is_reported_for_one_missed_frame_only() {
        let mut tracker = BallTracker::new(PARAMS);
        for i in 0..3 {
            tracker.update(detection_at(10.0 + i as f64, 10.0));
        }
        let one_miss = tracker.update(None);
        assert_eq!(one_miss.position, Some(Point::new(12.0, 10.0)));
        let two_misses = tracker.update(None);
        assert_eq!(two_misses.position, None);
        assert_eq!(two_misses.state, Some(TrackState::Confirmed));
    }

    #[test]
    fn single_miss_keeps_hit_count() {
        let mut tracker = BallTracker::new(PARAMS);
        tracker.update(detection_at(10.0, 10.0));
        tracker.update(detection_at(11.0, 10.0));
        tracker.update(None);
        let output = tracker.update(detection_at(12.0, 10.0));
        let track = tracker.track().unwrap();
        assert_eq!(track.hits, 3);
        assert_eq!(track.time_since_update, 0);
        assert_eq!(output.state, Some(TrackState::Confirmed));
    }

    #[test]
    fn new_track_after_deletion_gets_new_identity() {
        let params = TrackerParams { max_age: 2, ..PARAMS };
        let mut tracker = BallTracker::new(params);
        for _ in 0..3 {
            tracker.update(detection_at(10.0, 10.0));
        }
        let old_id = tracker.track().unwrap().id;
        tracker.update(None);
        tracker.update(None);
        assert!(tracker.track().is_none());

        let reborn = tracker.update(detection_at(50.0, 50.0));
        assert_eq!(reborn.state, Some(TrackState::Tentative));
        assert_ne!(reborn.track_id, Some(old_id));
        assert_eq!(reborn.position, None);
    }

    #[test]
    fn velocity_drives_prediction() {
        let mut tracker = BallTracker::new(PARAMS);
        tracker.update(detection_at(10.0, 10.0));
        tracker.update(detection_at(14.0, 12.0));
        let track = tracker.track().unwrap();
        assert_eq!(track.velocity, (4.0, 2.0));
        assert_eq!(track.predict_next_position(), Point::new(18.0, 14.0));
    }

    #[test]
    fn gate_rejects_far_detection_as_a_miss() {
        let params = TrackerParams {
            gate_distance: Some(20.0),
            ..PARAMS
        };
        let mut tracker = BallTracker::new(params);
        for i in 0..3 {
            tracker.update(detection_at(10.0 + i as f64, 10.0));
        }
        let output = tracker.update(detection_at(400.0, 400.0));
        let track = tracker.track().unwrap();
        assert_eq!(track.time_since_update, 1);
        assert_eq!(track.hits, 3);
        assert_eq!(output.position, Some(Point::new(12.0, 10.0)));
    }

    #[test]
    fn gated_detection_seeds_successor_when_the_miss_deletes() {
        let params = TrackerParams {
            max_age: 1,
            gate_distance: Some(20.0),
            ..PARAMS
        };
        let mut tracker = BallTracker::new(params);
        for i in 0..3 {
            tracker.update(detection_at(10.0 + i as f64, 10.0));
        }
        let old_id = tracker.track().unwrap().id;

        let output = tracker.update(detection_at(400.0, 400.0));
        assert_eq!(output.state, Some(TrackState::Tentative));
        assert_eq!(output.position, None);
        assert_ne!(output.track_id, Some(old_id));

        let successor = tracker.track().unwrap();
        assert_eq!(successor.hits, 1);
        assert_eq!(successor.center(), Point::new(400.0, 400.0));
    }

    #[test]
    fn min_hits_of_one_confirms_immediately() {
        let params = TrackerParams { min_hits: 1, ..PARAMS };
        let mut tracker = BallTracker::new(params);
        let output = tracker.update(detection_at(3.0, 4.0));
        assert_eq!(output.state, Some(TrackState::Confirmed));
        assert_eq!(output.position, Some(Point::new(3.0, 4.0)));
    }
}
