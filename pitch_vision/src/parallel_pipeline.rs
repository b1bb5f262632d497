// THEORY:
// The engine itself is strictly sequential per video. Parallelism happens one
// level up, in two places:
// 1.  **Re-sequencing**: upstream inference may finish frames out of order. The
//     `FrameSequencer` buffers early arrivals and releases them strictly by
//     sequence number, so the `MatchAnalyzer` never sees a frame out of order.
// 2.  **Run-Level Parallelism**: `BatchAnalyzer` analyzes several videos at once.
//     Each run is its own tokio task owning its own `MatchAnalyzer`; runs share
//     nothing but a semaphore that caps how many are active at a time (one per
//     CPU by default). Frames reach a run through an mpsc channel.
//
// Cancellation is coarse: a watch flag is checked between frames, never inside
// one, so a cancelled run still returns a consistent partial log.

use crate::config::{AnalysisConfig, VideoMetadata};
use crate::core_modules::color_sample::ColorSample;
use crate::core_modules::stats_log::StatsLog;
use crate::core_modules::team_classifier::BootstrapOutcome;
use crate::error::AnalysisError;
use crate::pipeline::{FrameInput, MatchAnalyzer};
use futures::future::join_all;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{Semaphore, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const FRAME_QUEUE_DEPTH: usize = 32;

/// Releases items strictly in sequence order, from a chosen first sequence number.
#[derive(Debug)]
pub struct FrameSequencer<T> {
    pending: BTreeMap<u64, T>,
    next_expected: u64,
}

impl<T> Default for FrameSequencer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> FrameSequencer<T> {
    pub fn new() -> Self {
        Self::starting_at(0)
    }

    /// For hosts whose numbering does not start at zero, such as one-based frame indices.
    pub fn starting_at(first: u64) -> Self {
        Self {
            pending: BTreeMap::new(),
            next_expected: first,
        }
    }

    pub fn next_expected(&self) -> u64 {
        self.next_expected
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Buffers one item. Sequence numbers already released or already buffered are rejected.
    pub fn push(&mut self, sequence: u64, item: T) -> Result<(), AnalysisError> {
        if sequence < self.next_expected {
            return Err(AnalysisError::StaleFrame {
                next_expected: self.next_expected,
                got: sequence,
            });
        }
        if self.pending.contains_key(&sequence) {
            return Err(AnalysisError::DuplicateFrame { sequence });
        }
        self.pending.insert(sequence, item);
        Ok(())
    }

    /// Removes and returns the contiguous run of items starting at the next expected sequence.
    pub fn drain_ready(&mut self) -> Vec<(u64, T)> {
        let mut ready = Vec::new();
        while let Some(item) = self.pending.remove(&self.next_expected) {
            ready.push((self.next_expected, item));
            self.next_expected += 1;
        }
        ready
    }

    /// Releases everything still buffered, in order, skipping over gaps.
    /// Used once the producer is done and missing sequence numbers will never arrive.
    pub fn flush(&mut self) -> Vec<(u64, T)> {
        let pending = std::mem::take(&mut self.pending);
        if let Some(last) = pending.keys().next_back() {
            self.next_expected = last + 1;
        }
        pending.into_iter().collect()
    }
}

/// One video to analyze.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub name: String,
    pub config: AnalysisConfig,
    pub metadata: VideoMetadata,
    /// Color samples from the opening frames for the bootstrap pre-pass.
    /// Without them the team model bootstraps from the first processed frames.
    pub bootstrap: Option<Vec<Vec<ColorSample>>>,
    /// Sequence number of the first frame the host will send.
    pub first_sequence: u64,
}

/// A frame tagged with its submission order.
#[derive(Debug, Clone)]
pub struct SequencedFrame {
    pub sequence: u64,
    pub input: FrameInput,
}

/// The result of one run.
#[derive(Debug)]
pub struct RunOutcome {
    pub name: String,
    pub frames_processed: u64,
    pub cancelled: bool,
    /// How the team color bootstrap ended; `None` if it never finished.
    pub bootstrap: Option<BootstrapOutcome>,
    pub result: Result<StatsLog, AnalysisError>,
}

/// Analyzes several independent videos concurrently.
pub struct BatchAnalyzer {
    permits: Arc<Semaphore>,
    cancel_tx: watch::Sender<bool>,
    cancel_rx: watch::Receiver<bool>,
    runs: Vec<(String, JoinHandle<RunOutcome>)>,
}

impl Default for BatchAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchAnalyzer {
    /// One active run per CPU.
    pub fn new() -> Self {
        Self::with_concurrency(num_cpus::get())
    }

    pub fn with_concurrency(max_active_runs: usize) -> Self {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        Self {
            permits: Arc::new(Semaphore::new(max_active_runs.max(1))),
            cancel_tx,
            cancel_rx,
            runs: Vec::new(),
        }
    }

    /// Starts a run and returns the channel its frames are fed through.
    /// Dropping the sender marks the end of the video.
    pub fn spawn_run(&mut self, request: RunRequest) -> mpsc::Sender<SequencedFrame> {
        let (frame_tx, frame_rx) = mpsc::channel(FRAME_QUEUE_DEPTH);
        let permits = Arc::clone(&self.permits);
        let cancel = self.cancel_rx.clone();
        let name = request.name.clone();
        let handle = tokio::spawn(run_worker(request, frame_rx, permits, cancel));
        self.runs.push((name, handle));
        frame_tx
    }

    /// Asks every run to stop at its next frame boundary.
    pub fn cancel(&self) {
        info!(runs = self.runs.len(), "cancelling batch");
        // Receivers live inside `self`, so the send cannot fail.
        let _ = self.cancel_tx.send(true);
    }

    /// Waits for every run to end.
    pub async fn join(self) -> Vec<RunOutcome> {
        let BatchAnalyzer { cancel_tx, runs, .. } = self;
        let (names, handles): (Vec<_>, Vec<_>) = runs.into_iter().unzip();
        let results = join_all(handles).await;
        drop(cancel_tx);

        names
            .into_iter()
            .zip(results)
            .map(|(name, joined)| match joined {
                Ok(outcome) => outcome,
                Err(error) => RunOutcome {
                    result: Err(AnalysisError::WorkerFailed {
                        run: name.clone(),
                        reason: error.to_string(),
                    }),
                    name,
                    frames_processed: 0,
                    cancelled: false,
                    bootstrap: None,
                },
            })
            .collect()
    }
}

async fn run_worker(
    request: RunRequest,
    mut frames: mpsc::Receiver<SequencedFrame>,
    permits: Arc<Semaphore>,
    mut cancel: watch::Receiver<bool>,
) -> RunOutcome {
    let RunRequest {
        name,
        config,
        metadata,
        bootstrap,
        first_sequence,
    } = request;
    let failed = |name: String, error: AnalysisError| RunOutcome {
        name,
        frames_processed: 0,
        cancelled: false,
        bootstrap: None,
        result: Err(error),
    };

    let _permit = match permits.acquire_owned().await {
        Ok(permit) => permit,
        Err(error) => {
            let reason = error.to_string();
            return failed(name.clone(), AnalysisError::WorkerFailed { run: name, reason });
        }
    };
    debug!(run = %name, "run acquired a worker slot");

    let mut analyzer = match MatchAnalyzer::new(config, metadata) {
        Ok(analyzer) => analyzer,
        Err(error) => {
            warn!(run = %name, %error, "run rejected before the first frame");
            return failed(name, error);
        }
    };
    if let Some(bootstrap) = bootstrap {
        analyzer.bootstrap_teams(bootstrap);
    }
    if let Some(outcome) = analyzer.bootstrap_outcome() {
        if outcome.is_poorly_separated() {
            warn!(run = %name, "team colors are poorly separated, team labels may be unreliable");
        }
    }

    let mut sequencer = FrameSequencer::starting_at(first_sequence);
    let mut cancelled = *cancel.borrow();
    while !cancelled {
        let frame = tokio::select! {
            biased;
            Ok(()) = cancel.changed() => {
                cancelled = *cancel.borrow();
                continue;
            }
            frame = frames.recv() => frame,
        };

        let ready = match frame {
            Some(SequencedFrame { sequence, input }) => {
                if let Err(error) = sequencer.push(sequence, input) {
                    warn!(run = %name, %error, "dropping frame that cannot be sequenced");
                    continue;
                }
                sequencer.drain_ready()
            }
            None => {
                if sequencer.pending_len() > 0 {
                    warn!(
                        run = %name,
                        pending = sequencer.pending_len(),
                        next_expected = sequencer.next_expected(),
                        "input ended with gaps, processing buffered frames"
                    );
                }
                let remaining = sequencer.flush();
                if let Err(error) = process_all(&mut analyzer, remaining, &cancel, &mut cancelled) {
                    return fatal(name, analyzer, error);
                }
                break;
            }
        };
        if let Err(error) = process_all(&mut analyzer, ready, &cancel, &mut cancelled) {
            return fatal(name, analyzer, error);
        }
    }

    if cancelled {
        info!(run = %name, frames = analyzer.frames_processed(), "run cancelled between frames");
    }
    RunOutcome {
        frames_processed: analyzer.frames_processed(),
        bootstrap: analyzer.bootstrap_outcome().copied(),
        result: Ok(analyzer.finish()),
        name,
        cancelled,
    }
}

fn process_all(
    analyzer: &mut MatchAnalyzer,
    frames: Vec<(u64, FrameInput)>,
    cancel: &watch::Receiver<bool>,
    cancelled: &mut bool,
) -> Result<(), AnalysisError> {
    for (_, input) in frames {
        if *cancel.borrow() {
            *cancelled = true;
            return Ok(());
        }
        analyzer.process_frame(input)?;
    }
    Ok(())
}

fn fatal(name: String, analyzer: MatchAnalyzer, error: AnalysisError) -> RunOutcome {
    warn!(run = %name, %error, "run stopped by a fatal error");
    RunOutcome {
        name,
        frames_processed: analyzer.frames_processed(),
        cancelled: false,
        bootstrap: analyzer.bootstrap_outcome().copied(),
        result: Err(error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::geometry::PlayerBox;
    use crate::core_modules::heatmap::{Heatmap, ModelOutput};
    use crate::pipeline::{PlayerObservation, Signal};

    fn config() -> AnalysisConfig {
        AnalysisConfig {
            model_width: 64,
            model_height: 36,
            track_min_hits: 1,
            bootstrap_frames: 2,
            min_bootstrap_samples: 4,
            ..AnalysisConfig::default()
        }
    }

    fn metadata() -> VideoMetadata {
        VideoMetadata {
            width: 640,
            height: 360,
            fps: 25.0,
            frame_count: 20,
        }
    }

    fn dark() -> ColorSample {
        ColorSample::new(20.0, 0.0, -30.0)
    }

    fn light() -> ColorSample {
        ColorSample::new(90.0, 0.0, 0.0)
    }

    fn request(name: &str) -> RunRequest {
        RunRequest {
            name: name.to_string(),
            config: config(),
            metadata: metadata(),
            bootstrap: Some(vec![vec![dark(), dark(), light(), light()]; 2]),
            first_sequence: 0,
        }
    }

    /// Scale is 10. Track 1 sits on cell (10, 10), track 2 on cell (30, 10).
    fn frame(frame_index: u64, cell_x: u32) -> FrameInput {
        let mut heatmap = Heatmap::zeros(64, 36);
        heatmap.set(cell_x, 10, 0.9);
        let players = vec![
            PlayerObservation::new(PlayerBox::new(1, 90.0, 60.0, 110.0, 140.0), Some(dark())),
            PlayerObservation::new(PlayerBox::new(2, 290.0, 60.0, 310.0, 140.0), Some(dark())),
            PlayerObservation::new(PlayerBox::new(3, 500.0, 300.0, 520.0, 350.0), Some(light())),
            PlayerObservation::new(PlayerBox::new(4, 600.0, 300.0, 620.0, 350.0), Some(light())),
        ];
        FrameInput {
            frame_index,
            heatmap: Signal::Present(ModelOutput::Heatmap(heatmap)),
            players: Signal::Present(players),
        }
    }

    fn scripted_frames() -> Vec<SequencedFrame> {
        (0..10)
            .map(|sequence| SequencedFrame {
                sequence,
                input: frame(sequence + 1, if sequence < 5 { 10 } else { 30 }),
            })
            .collect()
    }

    #[test]
    fn sequencer_releases_in_order() {
        let mut sequencer = FrameSequencer::new();
        sequencer.push(2, "c").unwrap();
        sequencer.push(1, "b").unwrap();
        assert!(sequencer.drain_ready().is_empty());

        sequencer.push(0, "a").unwrap();
        assert_eq!(sequencer.drain_ready(), vec![(0, "a"), (1, "b"), (2, "c")]);
        assert_eq!(sequencer.next_expected(), 3);
    }

    #[test]
    fn sequencer_rejects_duplicates_and_stale_items() {
        let mut sequencer = FrameSequencer::new();
        sequencer.push(0, ()).unwrap();
        sequencer.push(4, ()).unwrap();
        sequencer.drain_ready();

        assert_eq!(
            sequencer.push(0, ()),
            Err(AnalysisError::StaleFrame {
                next_expected: 1,
                got: 0
            })
        );
        assert_eq!(sequencer.push(4, ()), Err(AnalysisError::DuplicateFrame { sequence: 4 }));
    }

    #[test]
    fn flush_skips_gaps() {
        let mut sequencer = FrameSequencer::new();
        sequencer.push(5, 'x').unwrap();
        sequencer.push(3, 'y').unwrap();
        assert_eq!(sequencer.flush(), vec![(3, 'y'), (5, 'x')]);
        assert_eq!(sequencer.next_expected(), 6);
        assert_eq!(sequencer.pending_len(), 0);
    }

    #[test]
    fn sequencer_can_start_past_zero() {
        let mut sequencer = FrameSequencer::starting_at(1);
        sequencer.push(1, "first").unwrap();
        assert_eq!(sequencer.drain_ready(), vec![(1, "first")]);
        assert_eq!(
            sequencer.push(0, "early"),
            Err(AnalysisError::StaleFrame {
                next_expected: 2,
                got: 0
            })
        );
    }

    #[tokio::test]
    async fn one_based_sequences_are_processed_as_they_arrive() {
        let mut batch = BatchAnalyzer::with_concurrency(1);
        let frames = batch.spawn_run(RunRequest {
            first_sequence: 1,
            ..request("one-based")
        });
        for sequenced in scripted_frames() {
            let one_based = SequencedFrame {
                sequence: sequenced.sequence + 1,
                input: sequenced.input,
            };
            frames.send(one_based).await.unwrap();
        }

        // Nothing may sit in the buffer waiting for a sequence zero that never comes.
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        batch.cancel();

        let outcomes = batch.join().await;
        let outcome = &outcomes[0];
        assert_eq!(outcome.frames_processed, 10);
        assert_eq!(outcome.result.as_ref().unwrap().summary.final_passes.team1, 1);
        drop(frames);
    }

    #[tokio::test]
    async fn bootstrap_outcome_reaches_the_host() {
        let mut batch = BatchAnalyzer::with_concurrency(1);
        let close = ColorSample::new(21.0, 0.0, -30.0);
        let frames = batch.spawn_run(RunRequest {
            bootstrap: Some(vec![vec![dark(), dark(), close, close]; 2]),
            ..request("look-alike kits")
        });
        drop(frames);

        let outcomes = batch.join().await;
        let bootstrap = outcomes[0].bootstrap.unwrap();
        assert!(bootstrap.is_poorly_separated());
    }

    #[tokio::test]
    async fn shuffled_frames_match_sequential_processing() {
        let mut sequential = MatchAnalyzer::new(config(), metadata()).unwrap();
        sequential.bootstrap_teams(vec![vec![dark(), dark(), light(), light()]; 2]);
        for sequenced in scripted_frames() {
            sequential.process_frame(sequenced.input).unwrap();
        }
        let expected = sequential.finish();

        let mut batch = BatchAnalyzer::with_concurrency(2);
        let first = batch.spawn_run(request("first"));
        let second = batch.spawn_run(request("second"));

        let mut shuffled = scripted_frames();
        shuffled.reverse();
        for sequenced in shuffled {
            first.send(sequenced).await.unwrap();
        }
        for sequenced in scripted_frames() {
            second.send(sequenced).await.unwrap();
        }
        drop(first);
        drop(second);

        let outcomes = batch.join().await;
        assert_eq!(outcomes.len(), 2);
        for outcome in outcomes {
            assert!(!outcome.cancelled);
            assert_eq!(outcome.frames_processed, 10);
            let log = outcome.result.unwrap();
            assert_eq!(log, expected);
            assert_eq!(log.summary.final_passes.team1, 1);
        }
    }

    #[tokio::test]
    async fn cancelled_run_returns_partial_log() {
        let mut batch = BatchAnalyzer::with_concurrency(1);
        let frames = batch.spawn_run(request("cancelled"));
        for sequenced in scripted_frames().into_iter().take(3) {
            frames.send(sequenced).await.unwrap();
        }
        batch.cancel();

        let outcomes = batch.join().await;
        let outcome = &outcomes[0];
        assert!(outcome.cancelled);
        assert!(outcome.frames_processed <= 3);
        assert!(outcome.result.is_ok());
        drop(frames);
    }

    #[tokio::test]
    async fn invalid_run_fails_without_affecting_others() {
        let mut batch = BatchAnalyzer::with_concurrency(2);
        let mut broken = request("broken");
        broken.metadata.frame_count = 0;
        let broken_frames = batch.spawn_run(broken);
        let healthy_frames = batch.spawn_run(request("healthy"));
        drop(broken_frames);
        for sequenced in scripted_frames() {
            healthy_frames.send(sequenced).await.unwrap();
        }
        drop(healthy_frames);

        let outcomes = batch.join().await;
        assert_eq!(outcomes[0].name, "broken");
        assert!(matches!(outcomes[0].result, Err(AnalysisError::EmptyVideo(0))));
        assert_eq!(outcomes[1].name, "healthy");
        assert!(outcomes[1].result.is_ok());
    }
}
