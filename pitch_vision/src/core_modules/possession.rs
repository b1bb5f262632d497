// THEORY:
// The `PossessionLedger` is the only component with irreversible state. Every
// other layer can forget; the ledger's counters only ever go up.
//
// Per frame, given the authoritative ball position (or none), the player boxes
// and this frame's team labels:
// 1.  **Possessor Search**: the player whose box center is nearest the ball, and
//     strictly closer than the possession distance. Equal distances keep the
//     first player in slice order. Degenerate boxes are skipped.
// 2.  **Possession Count**: a possessor with a known team adds one frame to that
//     team. A possessor without a label counts for nobody.
// 3.  **Pass Chain**: a known-team possessor who differs from the previous
//     known-team possessor but shares their team completes a pass.
//     - An unknown-team possessor neither starts nor ends a chain; the previous
//       possessor is kept.
//     - No possessor at all (ball lost, or nobody close enough) breaks the chain.

use crate::core_modules::geometry::{PlayerBox, Point, TrackId};
use crate::core_modules::stats_log::StatsSnapshot;
use crate::core_modules::team_classifier::Team;
use std::collections::HashMap;
use tracing::{debug, info};

/// The player holding the ball, together with their team for that frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Possessor {
    pub track_id: TrackId,
    pub team: Team,
}

/// What changed in the ledger for one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LedgerUpdate {
    /// The nearest player within range, if any, whether or not they have a team.
    pub nearest_player: Option<TrackId>,
    /// The team credited with a possession frame.
    pub credited: Option<Team>,
    /// The team credited with a pass.
    pub pass: Option<Team>,
}

/// Cumulative possession and pass counters for one run.
#[derive(Debug, Clone)]
pub struct PossessionLedger {
    possession_distance: f64,
    possession_frames: [u64; 2],
    pass_counts: [u64; 2],
    last_possessor: Option<Possessor>,
}

impl PossessionLedger {
    pub fn new(possession_distance: f64) -> Self {
        Self {
            possession_distance,
            possession_frames: [0; 2],
            pass_counts: [0; 2],
            last_possessor: None,
        }
    }

    pub fn possession_frames(&self) -> [u64; 2] {
        self.possession_frames
    }

    pub fn pass_counts(&self) -> [u64; 2] {
        self.pass_counts
    }

    pub fn last_possessor(&self) -> Option<Possessor> {
        self.last_possessor
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot::from_counters(self.possession_frames, self.pass_counts)
    }

    /// The nearest valid player strictly within the possession distance.
    pub fn find_possessor(&self, ball: Point, players: &[PlayerBox]) -> Option<TrackId> {
        let mut best_distance_sq = self.possession_distance * self.possession_distance;
        let mut best = None;
        for player in players.iter().filter(|p| p.is_valid()) {
            let distance_sq = ball.distance_squared(&player.center());
            if distance_sq < best_distance_sq {
                best_distance_sq = distance_sq;
                best = Some(player.track_id);
            }
        }
        best
    }

    /// Applies one frame.
    pub fn update(
        &mut self,
        frame_index: u64,
        ball: Option<Point>,
        players: &[PlayerBox],
        teams: &HashMap<TrackId, Team>,
    ) -> LedgerUpdate {
        // --- 1. Who has the ball ---
        let Some(track_id) = ball.and_then(|ball| self.find_possessor(ball, players)) else {
            if self.last_possessor.take().is_some() {
                debug!(frame = frame_index, "possession gap, pass chain broken");
            }
            return LedgerUpdate::default();
        };

        let mut update = LedgerUpdate {
            nearest_player: Some(track_id),
            ..LedgerUpdate::default()
        };
        let Some(&team) = teams.get(&track_id) else {
            return update;
        };

        // --- 2. Possession ---
        self.possession_frames[team.index()] += 1;
        update.credited = Some(team);

        // --- 3. Pass chain ---
        if let Some(previous) = self.last_possessor {
            if previous.track_id != track_id && previous.team == team {
                self.pass_counts[team.index()] += 1;
                update.pass = Some(team);
                info!(
                    frame = frame_index,
                    team = team.index() + 1,
                    from = previous.track_id,
                    to = track_id,
                    "pass detected"
                );
            }
        }
        self.last_possessor = Some(Possessor { track_id, team });

        update
    }
}
