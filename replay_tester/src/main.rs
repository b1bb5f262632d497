// Replays recorded perception output through the statistics engine.
//
// A recording is a JSON file holding the video metadata and, per processed
// frame, the sparse heatmap peaks and the player boxes the models produced:
//
// {
//   "metadata": {"width": 1920, "height": 1080, "fps": 25.0, "frame_count": 3000},
//   "frames": [
//     {"frame_index": 1,
//      "ball_peaks": [[512, 300, 0.92]],
//      "players": [{"track_id": 4, "x1": 100, "y1": 200, "x2": 140, "y2": 300, "rgb": [200, 20, 20]}]},
//     {"frame_index": 2, "heatmap_error": "inference timed out", "players_error": "detector raised"}
//   ]
// }
//
// Every recording becomes one run of a `BatchAnalyzer`; each run's statistics
// log is written next to the others in the output directory.

use anyhow::{Context, Result, bail};
use clap::Parser;
use pitch_vision::{
    AnalysisConfig, BatchAnalyzer, ColorSample, FrameInput, Heatmap, ModelOutput, PlayerBox, PlayerObservation,
    RunRequest, SequencedFrame, Signal, VideoMetadata,
};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "replay_tester")]
#[command(about = "Replay recorded detector output and write possession/pass statistics", long_about = None)]
struct Args {
    /// Recording files to analyze, one run per file
    #[arg(required = true)]
    recordings: Vec<PathBuf>,

    /// Directory the `<name>.stats.json` files are written to
    #[arg(long, default_value = ".")]
    out_dir: PathBuf,

    /// JSON file overriding analysis tunables; missing keys keep their defaults
    #[arg(long)]
    config: Option<PathBuf>,

    /// Bootstrap team colors from the opening frames before the main pass
    #[arg(long, default_value = "false")]
    prepass: bool,

    /// Maximum number of recordings analyzed at the same time (defaults to CPU count)
    #[arg(long)]
    jobs: Option<usize>,
}

#[derive(Deserialize)]
struct Recording {
    metadata: VideoMetadata,
    frames: Vec<RecordedFrame>,
}

#[derive(Deserialize)]
struct RecordedFrame {
    frame_index: u64,
    /// Model-space `[x, y, score]` cells; every other cell is zero.
    #[serde(default)]
    ball_peaks: Option<Vec<[f64; 3]>>,
    #[serde(default)]
    heatmap_error: Option<String>,
    #[serde(default)]
    players: Option<Vec<RecordedPlayer>>,
    #[serde(default)]
    players_error: Option<String>,
}

#[derive(Deserialize)]
struct RecordedPlayer {
    #[serde(flatten)]
    bounds: PlayerBox,
    /// Pre-computed L*a*b* jersey color.
    #[serde(default)]
    lab: Option<[f64; 3]>,
    /// Dominant jersey color as sRGB; converted when `lab` is absent.
    #[serde(default)]
    rgb: Option<[u8; 3]>,
}

impl RecordedPlayer {
    fn observation(&self) -> PlayerObservation {
        let color = match (self.lab, self.rgb) {
            (Some([l, a, b]), _) => Some(ColorSample::new(l, a, b)),
            (None, Some([r, g, b])) => Some(ColorSample::from_rgb(r, g, b)),
            (None, None) => None,
        };
        PlayerObservation::new(self.bounds, color)
    }
}

impl RecordedFrame {
    fn into_input(self, config: &AnalysisConfig) -> FrameInput {
        let heatmap = match (self.heatmap_error, self.ball_peaks) {
            (Some(reason), _) => Signal::Failed(reason),
            (None, Some(peaks)) => Signal::Present(ModelOutput::Heatmap(render_heatmap(&peaks, config))),
            (None, None) => Signal::Missing,
        };
        let players = match (self.players_error, self.players) {
            (Some(reason), _) => Signal::Failed(reason),
            (None, Some(players)) => Signal::Present(players.iter().map(RecordedPlayer::observation).collect()),
            (None, None) => Signal::Missing,
        };
        FrameInput {
            frame_index: self.frame_index,
            heatmap,
            players,
        }
    }
}

fn render_heatmap(peaks: &[[f64; 3]], config: &AnalysisConfig) -> Heatmap {
    let mut heatmap = Heatmap::zeros(config.model_width, config.model_height);
    for &[x, y, score] in peaks {
        if x >= 0.0 && y >= 0.0 {
            heatmap.set(x as u32, y as u32, score as f32);
        }
    }
    heatmap
}

fn load_config(path: Option<&Path>) -> Result<AnalysisConfig> {
    let Some(path) = path else {
        return Ok(AnalysisConfig::default());
    };
    let raw = fs::read_to_string(path).with_context(|| format!("reading config {}", path.display()))?;
    let config: AnalysisConfig =
        serde_json::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))?;
    config.validate().with_context(|| format!("validating config {}", path.display()))?;
    Ok(config)
}

fn load_recording(path: &Path) -> Result<Recording> {
    let raw = fs::read_to_string(path).with_context(|| format!("reading recording {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing recording {}", path.display()))
}

fn run_name(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "recording".to_string())
}

/// Color samples of the opening frames, for the bootstrap pre-pass.
fn bootstrap_samples(frames: &[RecordedFrame], config: &AnalysisConfig) -> Vec<Vec<ColorSample>> {
    frames
        .iter()
        .take(config.bootstrap_frames)
        .map(|frame| {
            frame
                .players
                .iter()
                .flatten()
                .map(RecordedPlayer::observation)
                .filter(|observation| observation.bounds.is_valid())
                .filter_map(|observation| observation.color)
                .collect()
        })
        .collect()
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // --- 1. Argument Parsing & Setup ---
    let args = Args::parse();
    let config = load_config(args.config.as_deref())?;
    fs::create_dir_all(&args.out_dir).with_context(|| format!("creating {}", args.out_dir.display()))?;

    let mut batch = match args.jobs {
        Some(jobs) => BatchAnalyzer::with_concurrency(jobs),
        None => BatchAnalyzer::new(),
    };

    // --- 2. Feeding Every Recording ---
    let mut feeders = Vec::new();
    for path in &args.recordings {
        let recording = load_recording(path)?;
        let name = run_name(path);
        info!(run = %name, frames = recording.frames.len(), "loaded recording");

        let bootstrap = args.prepass.then(|| bootstrap_samples(&recording.frames, &config));
        let sender = batch.spawn_run(RunRequest {
            name: name.clone(),
            config: config.clone(),
            metadata: recording.metadata,
            bootstrap,
            first_sequence: 0,
        });

        let frame_config = config.clone();
        feeders.push(tokio::spawn(async move {
            for (sequence, frame) in recording.frames.into_iter().enumerate() {
                let input = frame.into_input(&frame_config);
                let sequenced = SequencedFrame {
                    sequence: sequence as u64,
                    input,
                };
                if sender.send(sequenced).await.is_err() {
                    warn!(run = %name, "run stopped before all frames were delivered");
                    break;
                }
            }
        }));
    }

    let cancel = tokio::signal::ctrl_c();
    tokio::pin!(cancel);
    let feeding = wait_for_feeders(feeders);
    tokio::pin!(feeding);
    tokio::select! {
        _ = &mut feeding => {}
        _ = &mut cancel => {
            warn!("interrupted, stopping runs at the next frame boundary");
            batch.cancel();
        }
    }

    // --- 3. Writing Results ---
    let mut failures = 0usize;
    for outcome in batch.join().await {
        if outcome.bootstrap.is_some_and(|bootstrap| bootstrap.is_poorly_separated()) {
            warn!(run = %outcome.name, "kits looked alike during bootstrap, team statistics may be unreliable");
        }
        match outcome.result {
            Ok(log) => {
                let path = args.out_dir.join(format!("{}.stats.json", outcome.name));
                let json = log.to_json_pretty().context("serializing statistics log")?;
                fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?;
                info!(
                    run = %outcome.name,
                    frames = outcome.frames_processed,
                    cancelled = outcome.cancelled,
                    possession_team1 = log.summary.final_possession.team1,
                    possession_team2 = log.summary.final_possession.team2,
                    passes_team1 = log.summary.final_passes.team1,
                    passes_team2 = log.summary.final_passes.team2,
                    output = %path.display(),
                    "statistics written"
                );
            }
            Err(err) => {
                error!(run = %outcome.name, error = %err, "analysis failed");
                failures += 1;
            }
        }
    }

    if failures > 0 {
        bail!("{failures} of {} run(s) failed", args.recordings.len());
    }
    Ok(())
}

async fn wait_for_feeders(feeders: Vec<tokio::task::JoinHandle<()>>) {
    for feeder in feeders {
        if let Err(err) = feeder.await {
            error!(error = %err, "frame feeder panicked");
        }
    }
}
