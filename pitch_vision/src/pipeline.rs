// THEORY:
// The `pipeline` module is the top-level API of the statistics engine. It wires
// the four core components into one per-video state machine, `MatchAnalyzer`,
// and is the only place that knows the order in which they run.
//
// Key architectural principles & per-frame stages:
// 1.  **Strict Frame Order**: the peak-search prior and the pass chain both
//     depend on the previous frame, so frames must arrive with strictly
//     increasing indices. Anything else is rejected, never silently reordered.
//     (Re-sequencing belongs to the host; see `parallel_pipeline`.)
// 2.  **Stage Order**: peak search -> track update -> team classification ->
//     ledger update -> snapshot. Each frame is fully processed before the next.
// 3.  **Degrade, Don't Abort**: each upstream signal is `Present`, `Missing` or
//     `Failed`. A missing or failed heatmap is a tracker miss. Missing players
//     mean nobody can possess the ball. Failed players skip team classification
//     and the ledger for that frame, leaving counters and the pass chain as they
//     were. Only configuration inconsistencies stop the run.
// 4.  **One Owner Per Run**: the analyzer owns its tracker, team model, ledger
//     and change log. Two analyzers never share anything.

use crate::config::{AnalysisConfig, FrameScale, VideoMetadata};
use crate::core_modules::color_sample::ColorSample;
use crate::core_modules::geometry::{PlayerBox, Point, TrackId};
use crate::core_modules::heatmap::ModelOutput;
use crate::core_modules::peak_locator::peak_locator::{self, Peak, PeakSearch};
use crate::core_modules::possession::{LedgerUpdate, PossessionLedger};
use crate::core_modules::stats_log::{ChangeLog, FinalSummary, StatsLog, StatsSnapshot, StatsUpdate};
use crate::core_modules::team_classifier::{BootstrapOutcome, Team, TeamColorModel};
use crate::core_modules::tracker::{BallTracker, Detection, TrackOutput, TrackerParams};
use crate::error::AnalysisError;
use image::RgbImage;
use std::collections::HashMap;
use std::fmt::Display;
use tracing::{debug, info, warn};

const PROGRESS_LOG_INTERVAL: u64 = 200;

/// One upstream signal for one frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Signal<T> {
    Present(T),
    /// Nothing was produced for this frame.
    Missing,
    /// The upstream collaborator raised an error; the reason is only logged.
    Failed(String),
}

impl<T> Signal<T> {
    pub fn from_result<E: Display>(result: Result<T, E>) -> Self {
        match result {
            Ok(value) => Signal::Present(value),
            Err(error) => Signal::Failed(error.to_string()),
        }
    }

    pub fn present(&self) -> Option<&T> {
        match self {
            Signal::Present(value) => Some(value),
            _ => None,
        }
    }
}

impl<T> From<Option<T>> for Signal<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(value) => Signal::Present(value),
            None => Signal::Missing,
        }
    }
}

/// One detected player with the jersey color sampled from their crop, if any.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerObservation {
    pub bounds: PlayerBox,
    pub color: Option<ColorSample>,
}

impl PlayerObservation {
    pub fn new(bounds: PlayerBox, color: Option<ColorSample>) -> Self {
        Self { bounds, color }
    }

    /// Samples the player's color from the decoded frame.
    pub fn from_frame(frame: &RgbImage, bounds: PlayerBox, config: &AnalysisConfig) -> Self {
        let color = ColorSample::from_frame_region(frame, &bounds.bounds, config);
        Self { bounds, color }
    }
}

/// Everything the engine consumes for one processed frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameInput {
    pub frame_index: u64,
    pub heatmap: Signal<ModelOutput>,
    pub players: Signal<Vec<PlayerObservation>>,
}

/// What happened during one frame, for hosts that want more than the change log.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameReport {
    pub frame_index: u64,
    pub peak: Option<Peak>,
    pub ball: TrackOutput,
    pub teams: HashMap<TrackId, Team>,
    /// `None` when the ledger was skipped because player detection failed.
    pub ledger: Option<LedgerUpdate>,
    /// The change record emitted for this frame, if the statistics changed.
    pub update: Option<StatsUpdate>,
}

/// The per-video statistics engine.
pub struct MatchAnalyzer {
    config: AnalysisConfig,
    metadata: VideoMetadata,
    scale: FrameScale,
    search: PeakSearch,
    tracker: BallTracker,
    team_model: TeamColorModel,
    ledger: PossessionLedger,
    change_log: ChangeLog,
    /// Model-space prior for the next peak search.
    prior: Option<Point>,
    bootstrap: Option<BootstrapOutcome>,
    last_frame: Option<u64>,
    frames_processed: u64,
}

impl MatchAnalyzer {
    pub fn new(config: AnalysisConfig, metadata: VideoMetadata) -> Result<Self, AnalysisError> {
        config.validate()?;
        let metadata = metadata.validated()?;
        let scale = FrameScale::new(&metadata, &config);
        info!(
            width = metadata.width,
            height = metadata.height,
            fps = metadata.fps,
            frames = metadata.frame_count,
            scale_x = scale.scale_x,
            scale_y = scale.scale_y,
            "starting match analysis"
        );

        Ok(Self {
            search: PeakSearch {
                threshold: config.detection_threshold,
                window_radius: config.search_window_radius,
            },
            tracker: BallTracker::new(TrackerParams {
                max_age: config.track_max_age,
                min_hits: config.track_min_hits,
                gate_distance: config.track_gate_distance,
            }),
            team_model: TeamColorModel::new(&config),
            ledger: PossessionLedger::new(config.possession_distance),
            change_log: ChangeLog::new(),
            prior: None,
            bootstrap: None,
            last_frame: None,
            frames_processed: 0,
            config,
            metadata,
            scale,
        })
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn metadata(&self) -> &VideoMetadata {
        &self.metadata
    }

    pub fn team_model(&self) -> &TeamColorModel {
        &self.team_model
    }

    pub fn tracker(&self) -> &BallTracker {
        &self.tracker
    }

    pub fn ledger(&self) -> &PossessionLedger {
        &self.ledger
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    /// How the team color bootstrap ended, once it has. Hosts check
    /// `is_poorly_separated()` here to learn that the two kits look alike.
    pub fn bootstrap_outcome(&self) -> Option<&BootstrapOutcome> {
        self.bootstrap.as_ref()
    }

    fn record_bootstrap(&mut self, outcome: Option<BootstrapOutcome>) -> Option<BootstrapOutcome> {
        if outcome.is_some() {
            self.bootstrap = outcome;
        }
        outcome
    }

    /// Runs the team color bootstrap over the opening frames before the main
    /// pass. Each item holds one frame's color samples; only the first
    /// `bootstrap_frames` items are read. Returns `None` if the bootstrap
    /// already finished.
    pub fn bootstrap_teams<I, F>(&mut self, frames: I) -> Option<BootstrapOutcome>
    where
        I: IntoIterator<Item = F>,
        F: IntoIterator<Item = ColorSample>,
    {
        if !self.team_model.is_bootstrapping() {
            return None;
        }
        info!(frames = self.config.bootstrap_frames, "starting team color bootstrap");
        for samples in frames.into_iter().take(self.config.bootstrap_frames) {
            let outcome = self.team_model.observe_bootstrap_frame(samples);
            if outcome.is_some() {
                return self.record_bootstrap(outcome);
            }
        }
        // The video was shorter than the bootstrap window.
        let outcome = self.team_model.finish_bootstrap();
        self.record_bootstrap(outcome)
    }

    /// Processes the next frame.
    pub fn process_frame(&mut self, input: FrameInput) -> Result<FrameReport, AnalysisError> {
        let frame_index = input.frame_index;
        if let Some(last) = self.last_frame {
            if frame_index <= last {
                return Err(AnalysisError::OutOfOrderFrame { last, got: frame_index });
            }
        }
        self.last_frame = Some(frame_index);
        self.frames_processed += 1;
        if self.frames_processed == 1 || self.frames_processed % PROGRESS_LOG_INTERVAL == 0 {
            info!(
                frame = frame_index,
                processed = self.frames_processed,
                total = self.metadata.frame_count,
                "processing frame"
            );
        }

        // --- 1. Peak search ---
        let peak = match &input.heatmap {
            Signal::Present(output) => {
                let heatmap = output.ball_heatmap(self.config.heatmap_channel)?;
                heatmap.ensure_shape(self.config.model_width, self.config.model_height)?;
                peak_locator::locate_peak(heatmap, self.prior, &self.search)
            }
            Signal::Missing => {
                debug!(frame = frame_index, "no heatmap for frame");
                None
            }
            Signal::Failed(reason) => {
                warn!(frame = frame_index, %reason, "ball model failed, treating frame as a miss");
                None
            }
        };

        // --- 2. Track update ---
        let detection = peak.map(|peak| Detection {
            bounds: self.scale.ball_box(peak.cell),
            confidence: peak.confidence,
        });
        let ball = self.tracker.update(detection);
        self.prior = ball.position.map(|position| self.scale.to_model(position));

        // --- 3. Team classification and 4. ledger ---
        let (teams, ledger) = match input.players {
            Signal::Present(players) => {
                let teams = self.classify(&players);
                let boxes: Vec<PlayerBox> = players.iter().map(|p| p.bounds).collect();
                let update = self.ledger.update(frame_index, ball.position, &boxes, &teams);
                (teams, Some(update))
            }
            Signal::Missing => {
                debug!(frame = frame_index, "no player detections for frame");
                let outcome = self.team_model.observe_bootstrap_frame([]);
                self.record_bootstrap(outcome);
                let update = self.ledger.update(frame_index, ball.position, &[], &HashMap::new());
                (HashMap::new(), Some(update))
            }
            Signal::Failed(reason) => {
                warn!(frame = frame_index, %reason, "player detection failed, skipping statistics for frame");
                let outcome = self.team_model.observe_bootstrap_frame([]);
                self.record_bootstrap(outcome);
                (HashMap::new(), None)
            }
        };

        // --- 5. Snapshot ---
        let update = self.change_log.observe(frame_index, self.ledger.snapshot());
        if let Some(update) = &update {
            debug!(frame = frame_index, ?update, "statistics changed");
        }

        Ok(FrameReport {
            frame_index,
            peak,
            ball,
            teams,
            ledger,
            update,
        })
    }

    /// Labels this frame's players. While the team model is still bootstrapping
    /// in streaming mode, the frame's samples feed the bootstrap instead and
    /// nobody gets a label.
    fn classify(&mut self, players: &[PlayerObservation]) -> HashMap<TrackId, Team> {
        let samples: Vec<(TrackId, ColorSample)> = players
            .iter()
            .filter(|p| p.bounds.is_valid())
            .filter_map(|p| p.color.map(|color| (p.bounds.track_id, color)))
            .collect();

        if self.team_model.is_bootstrapping() {
            let outcome = self
                .team_model
                .observe_bootstrap_frame(samples.into_iter().map(|(_, color)| color));
            self.record_bootstrap(outcome);
            return HashMap::new();
        }
        self.team_model.assign_teams(&samples)
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        self.ledger.snapshot()
    }

    pub fn summary(&self) -> FinalSummary {
        FinalSummary::from(self.snapshot())
    }

    /// Ends the run. Safe to call at any frame boundary, including after cancellation.
    pub fn finish(self) -> StatsLog {
        let summary = self.summary();
        info!(
            frames = self.frames_processed,
            records = self.change_log.len(),
            possession_team1 = summary.final_possession.team1,
            possession_team2 = summary.final_possession.team2,
            passes_team1 = summary.final_passes.team1,
            passes_team2 = summary.final_passes.team2,
            "match analysis finished"
        );
        if self.change_log.is_empty() {
            warn!("analysis completed but no statistics were logged");
        }
        StatsLog::new(self.change_log, summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::heatmap::{Heatmap, HeatmapStack};
    use crate::core_modules::stats_log::TeamSplit;

    const MODEL_WIDTH: u32 = 256;
    const MODEL_HEIGHT: u32 = 144;

    fn config() -> AnalysisConfig {
        AnalysisConfig {
            model_width: MODEL_WIDTH,
            model_height: MODEL_HEIGHT,
            bootstrap_frames: 10,
            ..AnalysisConfig::default()
        }
    }

    fn metadata() -> VideoMetadata {
        VideoMetadata {
            width: 1280,
            height: 720,
            fps: 25.0,
            frame_count: 100,
        }
    }

    fn dark() -> ColorSample {
        ColorSample::new(22.0, 4.0, -35.0)
    }

    fn light() -> ColorSample {
        ColorSample::new(88.0, -1.0, 6.0)
    }

    /// Tracks 1 and 2 wear the dark kit, 3 and 4 the light one.
    /// Centers are (250, 400), (600, 400), (900, 100) and (1100, 100).
    fn players() -> Vec<PlayerObservation> {
        vec![
            PlayerObservation::new(PlayerBox::new(1, 230.0, 350.0, 270.0, 450.0), Some(dark())),
            PlayerObservation::new(PlayerBox::new(2, 580.0, 350.0, 620.0, 450.0), Some(dark())),
            PlayerObservation::new(PlayerBox::new(3, 880.0, 50.0, 920.0, 150.0), Some(light())),
            PlayerObservation::new(PlayerBox::new(4, 1080.0, 50.0, 1120.0, 150.0), Some(light())),
        ]
    }

    /// A heatmap with a single hot cell. The frame scale is 5, so cell (50, 80)
    /// sits on track 1 and cell (120, 80) on track 2.
    fn ball_at(x: u32, y: u32) -> Signal<ModelOutput> {
        let mut heatmap = Heatmap::zeros(MODEL_WIDTH, MODEL_HEIGHT);
        heatmap.set(x, y, 0.95);
        Signal::Present(ModelOutput::Heatmap(heatmap))
    }

    fn on_track_one() -> Signal<ModelOutput> {
        ball_at(50, 80)
    }

    fn on_track_two() -> Signal<ModelOutput> {
        ball_at(120, 80)
    }

    fn frame(frame_index: u64, heatmap: Signal<ModelOutput>, players: Signal<Vec<PlayerObservation>>) -> FrameInput {
        FrameInput {
            frame_index,
            heatmap,
            players,
        }
    }

    fn bootstrapped(config: AnalysisConfig) -> MatchAnalyzer {
        let mut analyzer = MatchAnalyzer::new(config, metadata()).unwrap();
        let frames = (0..50).map(|_| vec![dark(), dark(), light(), light()]);
        let outcome = analyzer.bootstrap_teams(frames);
        assert!(matches!(
            outcome,
            Some(BootstrapOutcome::Ready {
                poorly_separated: false,
                ..
            })
        ));
        assert_eq!(analyzer.bootstrap_outcome(), outcome.as_ref());
        analyzer
    }

    fn run_scenario(analyzer: &mut MatchAnalyzer) {
        for index in 1..=100 {
            let heatmap = if index <= 50 { on_track_one() } else { on_track_two() };
            analyzer
                .process_frame(frame(index, heatmap, Signal::Present(players())))
                .unwrap();
        }
    }

    #[test]
    fn end_to_end_possession_and_pass() {
        let mut analyzer = bootstrapped(AnalysisConfig {
            track_min_hits: 1,
            ..config()
        });
        run_scenario(&mut analyzer);

        assert_eq!(analyzer.ledger().possession_frames(), [100, 0]);
        assert_eq!(analyzer.ledger().pass_counts(), [1, 0]);

        let log = analyzer.finish();
        assert_eq!(log.summary.final_possession, TeamSplit { team1: 100, team2: 0 });
        assert_eq!(log.summary.final_passes, TeamSplit { team1: 1, team2: 0 });
        assert_eq!(log.stats.keys().copied().collect::<Vec<_>>(), vec![1, 51]);
        assert_eq!(log.stats[&51].possession, None);
        assert_eq!(log.stats[&51].passes, Some(TeamSplit { team1: 1, team2: 0 }));
        assert_eq!(log.message, None);
    }

    #[test]
    fn tentative_frames_do_not_count() {
        let mut analyzer = bootstrapped(config());
        run_scenario(&mut analyzer);

        // The first two detections only open a tentative track.
        assert_eq!(analyzer.ledger().possession_frames(), [98, 0]);
        assert_eq!(analyzer.ledger().pass_counts(), [1, 0]);
        let log = analyzer.finish();
        assert_eq!(log.stats[&1].possession, Some(TeamSplit { team1: 0, team2: 0 }));
        assert_eq!(log.stats[&3].possession, Some(TeamSplit { team1: 100, team2: 0 }));
    }

    #[test]
    fn teams_are_labelled_against_the_bootstrap() {
        let mut analyzer = bootstrapped(config());
        let report = analyzer
            .process_frame(frame(1, Signal::Missing, Signal::Present(players())))
            .unwrap();
        assert_eq!(report.teams[&1], Team::Dark);
        assert_eq!(report.teams[&2], Team::Dark);
        assert_eq!(report.teams[&3], Team::Light);
        assert_eq!(report.teams[&4], Team::Light);
    }

    #[test]
    fn teams_are_labelled_from_decoded_frame_crops() {
        use image::{Rgb, RgbImage};

        let cfg = config();
        let mut decoded = RgbImage::from_pixel(1280, 720, Rgb([40, 140, 50]));
        let kits = [Rgb([20, 20, 90]), Rgb([20, 20, 90]), Rgb([235, 235, 235]), Rgb([235, 235, 235])];
        let boxes: Vec<PlayerBox> = players().iter().map(|p| p.bounds).collect();
        for (player, kit) in boxes.iter().zip(kits) {
            let b = player.bounds;
            for y in (b.y1 as u32 + 20)..(b.y2 as u32 - 20) {
                for x in (b.x1 as u32 + 5)..(b.x2 as u32 - 5) {
                    decoded.put_pixel(x, y, kit);
                }
            }
        }
        let observations: Vec<PlayerObservation> = boxes
            .iter()
            .map(|bounds| PlayerObservation::from_frame(&decoded, *bounds, &cfg))
            .collect();
        assert!(observations.iter().all(|o| o.color.is_some()));

        let mut analyzer = MatchAnalyzer::new(cfg, metadata()).unwrap();
        let colors: Vec<ColorSample> = observations.iter().filter_map(|o| o.color).collect();
        let outcome = analyzer.bootstrap_teams((0..10).map(|_| colors.clone())).unwrap();
        assert!(!outcome.is_poorly_separated());

        let report = analyzer
            .process_frame(frame(1, Signal::Missing, Signal::Present(observations)))
            .unwrap();
        assert_eq!(report.teams[&1], Team::Dark);
        assert_eq!(report.teams[&2], Team::Dark);
        assert_eq!(report.teams[&3], Team::Light);
        assert_eq!(report.teams[&4], Team::Light);
    }

    #[test]
    fn poorly_separated_kits_are_reported_to_the_host() {
        let mut analyzer = MatchAnalyzer::new(config(), metadata()).unwrap();
        let grey = ColorSample::new(50.0, 0.0, 0.0);
        let slightly_lighter = ColorSample::new(52.0, 0.0, 0.0);
        let outcome = analyzer
            .bootstrap_teams((0..10).map(|_| vec![grey, slightly_lighter]))
            .unwrap();
        assert!(outcome.is_poorly_separated());
        assert!(analyzer.bootstrap_outcome().unwrap().is_poorly_separated());
        assert!(analyzer.team_model().is_enabled());
    }

    #[test]
    fn out_of_order_frames_are_rejected() {
        let mut analyzer = bootstrapped(config());
        analyzer.process_frame(frame(5, Signal::Missing, Signal::Missing)).unwrap();
        let error = analyzer.process_frame(frame(5, Signal::Missing, Signal::Missing)).unwrap_err();
        assert_eq!(error, AnalysisError::OutOfOrderFrame { last: 5, got: 5 });
        let error = analyzer.process_frame(frame(3, Signal::Missing, Signal::Missing)).unwrap_err();
        assert_eq!(error, AnalysisError::OutOfOrderFrame { last: 5, got: 3 });
    }

    #[test]
    fn failed_heatmap_is_a_tracker_miss() {
        let mut analyzer = bootstrapped(AnalysisConfig {
            track_min_hits: 1,
            ..config()
        });
        analyzer
            .process_frame(frame(1, on_track_one(), Signal::Present(players())))
            .unwrap();
        let report = analyzer
            .process_frame(frame(2, Signal::Failed("cuda oom".into()), Signal::Present(players())))
            .unwrap();
        assert!(report.ball.position.is_some());
        assert_eq!(analyzer.tracker().track().unwrap().time_since_update, 1);
        assert_eq!(analyzer.ledger().possession_frames(), [2, 0]);
    }

    #[test]
    fn failed_players_leave_counters_and_chain_alone() {
        let mut analyzer = bootstrapped(AnalysisConfig {
            track_min_hits: 1,
            ..config()
        });
        analyzer
            .process_frame(frame(1, on_track_one(), Signal::Present(players())))
            .unwrap();
        let report = analyzer
            .process_frame(frame(2, on_track_one(), Signal::Failed("detector raised".into())))
            .unwrap();
        assert_eq!(report.ledger, None);
        assert_eq!(report.update, None);
        assert_eq!(analyzer.ledger().possession_frames(), [1, 0]);

        analyzer
            .process_frame(frame(3, on_track_two(), Signal::Present(players())))
            .unwrap();
        assert_eq!(analyzer.ledger().pass_counts(), [1, 0]);
    }

    #[test]
    fn missing_players_break_the_chain() {
        let mut analyzer = bootstrapped(AnalysisConfig {
            track_min_hits: 1,
            ..config()
        });
        analyzer
            .process_frame(frame(1, on_track_one(), Signal::Present(players())))
            .unwrap();
        analyzer
            .process_frame(frame(2, on_track_one(), Signal::Missing))
            .unwrap();
        analyzer
            .process_frame(frame(3, on_track_two(), Signal::Present(players())))
            .unwrap();
        assert_eq!(analyzer.ledger().pass_counts(), [0, 0]);
        assert_eq!(analyzer.ledger().possession_frames(), [2, 0]);
    }

    #[test]
    fn streaming_bootstrap_labels_after_the_window() {
        let mut analyzer = MatchAnalyzer::new(
            AnalysisConfig {
                track_min_hits: 1,
                bootstrap_frames: 5,
                ..config()
            },
            metadata(),
        )
        .unwrap();
        for index in 1..=5 {
            let report = analyzer
                .process_frame(frame(index, on_track_one(), Signal::Present(players())))
                .unwrap();
            assert!(report.teams.is_empty());
        }
        assert!(analyzer.team_model().is_enabled());
        assert!(!analyzer.bootstrap_outcome().unwrap().is_poorly_separated());
        assert_eq!(analyzer.ledger().possession_frames(), [0, 0]);

        let report = analyzer
            .process_frame(frame(6, on_track_one(), Signal::Present(players())))
            .unwrap();
        assert_eq!(report.teams.len(), 4);
        assert_eq!(analyzer.ledger().possession_frames(), [1, 0]);
        assert_eq!(analyzer.bootstrap_teams(Vec::<Vec<ColorSample>>::new()), None);
    }

    #[test]
    fn sparse_bootstrap_disables_teams_for_the_run() {
        let mut analyzer = MatchAnalyzer::new(config(), metadata()).unwrap();
        let outcome = analyzer.bootstrap_teams(vec![vec![dark()], vec![light()]]);
        assert_eq!(outcome, Some(BootstrapOutcome::Disabled { samples: 2 }));
        assert_eq!(analyzer.bootstrap_outcome(), outcome.as_ref());

        for index in 1..=10 {
            analyzer
                .process_frame(frame(index, on_track_one(), Signal::Present(players())))
                .unwrap();
        }
        let log = analyzer.finish();
        assert_eq!(log.summary.final_possession, TeamSplit { team1: 0, team2: 0 });
        assert_eq!(log.stats.len(), 1);
    }

    #[test]
    fn channel_is_selected_from_stacked_output() {
        let mut analyzer = bootstrapped(AnalysisConfig {
            track_min_hits: 1,
            ..config()
        });
        let mut ball = Heatmap::zeros(MODEL_WIDTH, MODEL_HEIGHT);
        ball.set(50, 80, 0.9);
        let stack = HeatmapStack::new(vec![Heatmap::zeros(MODEL_WIDTH, MODEL_HEIGHT), ball]);
        let report = analyzer
            .process_frame(frame(
                1,
                Signal::Present(ModelOutput::Channels(stack)),
                Signal::Present(players()),
            ))
            .unwrap();
        assert_eq!(report.ball.position, Some(Point::new(250.0, 400.0)));
    }

    #[test]
    fn configuration_inconsistencies_are_fatal() {
        let mut analyzer = bootstrapped(config());
        let stack = HeatmapStack::new(vec![Heatmap::zeros(MODEL_WIDTH, MODEL_HEIGHT)]);
        let error = analyzer
            .process_frame(frame(1, Signal::Present(ModelOutput::Channels(stack)), Signal::Missing))
            .unwrap_err();
        assert!(error.is_configuration_inconsistency());

        let wrong_size = Signal::Present(ModelOutput::Heatmap(Heatmap::zeros(64, 64)));
        let error = analyzer.process_frame(frame(2, wrong_size, Signal::Missing)).unwrap_err();
        assert!(matches!(error, AnalysisError::HeatmapShapeMismatch { .. }));
    }

    #[test]
    fn empty_video_is_rejected_up_front() {
        let metadata = VideoMetadata {
            frame_count: 0,
            ..metadata()
        };
        assert!(matches!(
            MatchAnalyzer::new(config(), metadata),
            Err(AnalysisError::EmptyVideo(0))
        ));
    }

    #[test]
    fn signal_conversions() {
        let failed: Signal<u8> = Signal::from_result(Err::<u8, _>("boom"));
        assert_eq!(failed, Signal::Failed("boom".to_string()));
        assert_eq!(Signal::from(Some(3)).present(), Some(&3));
        assert_eq!(Signal::<u8>::from(None), Signal::Missing);
    }
}
