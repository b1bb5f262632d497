// THEORY:
// The stats log is the engine's only contract with the outside world. Counters
// live in the `PossessionLedger`; this module derives the human-facing view from
// them and decides when that view is worth writing down.
//
// 1.  **Derived, Never Stored**: a `StatsSnapshot` is recomputed from the raw
//     counters every frame. Percentages are never a source of truth.
// 2.  **Emit On Change**: a record is appended under the current frame index only
//     when the possession split or the pass totals differ from the last emitted
//     record, and a record carries only the sections that changed. The first
//     frame always emits the baseline.
// 3.  **Stable Wire Names**: `POSSESSION`, `PASS`, `team1`, `team2`,
//     `final_possession` and `final_passes` are consumed verbatim by the web layer.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A per-team pair as it appears on the wire: `team1` is team 0 (dark), `team2` is team 1 (light).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TeamSplit {
    pub team1: u64,
    pub team2: u64,
}

impl TeamSplit {
    pub fn from_counts(counts: [u64; 2]) -> Self {
        Self {
            team1: counts[0],
            team2: counts[1],
        }
    }

    /// Possession percentages from per-team frame counts.
    /// Both are zero when nobody has had the ball yet; otherwise they sum to 100.
    pub fn percentages(frames: [u64; 2]) -> Self {
        let total = frames[0] + frames[1];
        if total == 0 {
            return Self::default();
        }
        // Ties round to even, so 50.5 becomes 50 and 2.5 becomes 2.
        let team1 = ((frames[0] as f64 / total as f64) * 100.0).round_ties_even() as u64;
        Self {
            team1,
            team2: 100 - team1,
        }
    }
}

/// The derived statistics at one point in the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    pub possession: TeamSplit,
    pub passes: TeamSplit,
}

impl StatsSnapshot {
    pub fn from_counters(possession_frames: [u64; 2], pass_counts: [u64; 2]) -> Self {
        Self {
            possession: TeamSplit::percentages(possession_frames),
            passes: TeamSplit::from_counts(pass_counts),
        }
    }
}

/// One sparse change record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsUpdate {
    #[serde(rename = "POSSESSION", skip_serializing_if = "Option::is_none", default)]
    pub possession: Option<TeamSplit>,
    #[serde(rename = "PASS", skip_serializing_if = "Option::is_none", default)]
    pub passes: Option<TeamSplit>,
}

/// The sparse, frame-keyed change log.
#[derive(Debug, Clone, Default)]
pub struct ChangeLog {
    records: BTreeMap<u64, StatsUpdate>,
    last_emitted: Option<StatsSnapshot>,
}

impl ChangeLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compares `snapshot` with the last emitted one and records the differences.
    /// Returns the record written, if any.
    pub fn observe(&mut self, frame_index: u64, snapshot: StatsSnapshot) -> Option<StatsUpdate> {
        let (possession_changed, passes_changed) = match self.last_emitted {
            Some(last) => (last.possession != snapshot.possession, last.passes != snapshot.passes),
            None => (true, true),
        };
        if !possession_changed && !passes_changed {
            return None;
        }

        let update = StatsUpdate {
            possession: possession_changed.then_some(snapshot.possession),
            passes: passes_changed.then_some(snapshot.passes),
        };
        self.records.insert(frame_index, update);
        self.last_emitted = Some(snapshot);
        Some(update)
    }

    pub fn records(&self) -> &BTreeMap<u64, StatsUpdate> {
        &self.records
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }
}

/// The cumulative result at the end of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalSummary {
    pub final_possession: TeamSplit,
    pub final_passes: TeamSplit,
}

impl From<StatsSnapshot> for FinalSummary {
    fn from(snapshot: StatsSnapshot) -> Self {
        Self {
            final_possession: snapshot.possession,
            final_passes: snapshot.passes,
        }
    }
}

/// The complete output of one analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsLog {
    /// Change records keyed by frame index.
    pub stats: BTreeMap<u64, StatsUpdate>,
    pub summary: FinalSummary,
    /// Present only when the run produced no change records at all.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub message: Option<String>,
}

impl StatsLog {
    pub fn new(log: ChangeLog, summary: FinalSummary) -> Self {
        let message = log.is_empty().then(|| "Analysis completed but no statistics were logged.".to_string());
        Self {
            stats: log.records,
            summary,
            message,
        }
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
