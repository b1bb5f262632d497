// THEORY:
// This file is the main entry point for the `pitch_vision` library crate. It
// defines the public API exposed to hosts such as the `replay_tester` binary or
// a web service that owns decoding and model inference.
//
// The primary export is `MatchAnalyzer`, which turns a stream of per-frame
// perception outputs (a ball heatmap and identity-tagged player boxes) into a
// sparse, frame-keyed statistics log. `BatchAnalyzer` runs several videos side
// by side. The four core components (`peak_locator`, `tracker`,
// `team_classifier`, `possession`) live in `core_modules` and can also be used
// on their own.

pub mod config;
pub mod core_modules;
pub mod error;
pub mod parallel_pipeline;
pub mod pipeline;

pub use config::{AnalysisConfig, FrameScale, VideoMetadata};
pub use core_modules::color_sample::ColorSample;
pub use core_modules::geometry::{BoundingBox, PlayerBox, Point, TrackId};
pub use core_modules::heatmap::{Heatmap, HeatmapStack, ModelOutput};
pub use core_modules::stats_log::{FinalSummary, StatsLog, StatsUpdate, TeamSplit};
pub use core_modules::team_classifier::{BootstrapOutcome, Team};
pub use error::{AnalysisError, ConfigError};
pub use parallel_pipeline::{BatchAnalyzer, FrameSequencer, RunOutcome, RunRequest, SequencedFrame};
pub use pipeline::{FrameInput, FrameReport, MatchAnalyzer, PlayerObservation, Signal};
