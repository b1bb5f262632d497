// THEORY:
// The `TeamColorModel` is the "who plays for whom" layer. It never learns a
// per-player identity; it only knows two reference colors and, every frame,
// which of this frame's players look like which reference.
//
// Key architectural principles:
// 1.  **Two-Phase Lifecycle**: the model starts in `Bootstrapping`, collecting
//     color samples from the first frames. It then moves exactly once to either
//     `Ready` (reference colors fixed for the rest of the run) or `Disabled`
//     (too few samples; every lookup returns no team, never retried).
// 2.  **Darker Is Team 0**: after clustering the bootstrap samples, the center
//     with the lower L* becomes the `Dark` team. This is the only place the two
//     teams are told apart by meaning rather than by distance.
// 3.  **Per-Frame Re-Clustering**: each frame's samples are clustered on their
//     own, and the two fresh centers are matched to the references by the cheaper
//     of the two permutations. Lighting drift moves both fresh centers together,
//     so the match stays stable even when absolute colors shift.
// 4.  **No Smoothing**: labels are not carried across frames. A player near the
//     cluster boundary may flicker; that is accepted behavior.

use crate::config::AnalysisConfig;
use crate::core_modules::color_sample::ColorSample;
use crate::core_modules::geometry::TrackId;
use crate::core_modules::kmeans::two_means;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{error, info, warn};

/// One of the two teams on the pitch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Team {
    /// Team 0, the darker reference color.
    Dark,
    /// Team 1, the lighter reference color.
    Light,
}

impl Team {
    pub fn index(self) -> usize {
        match self {
            Team::Dark => 0,
            Team::Light => 1,
        }
    }
}

/// The two reference colors fixed after bootstrap. Immutable once built.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TeamReference {
    pub dark: ColorSample,
    pub light: ColorSample,
}

impl TeamReference {
    /// Orders two cluster centers so the lower lightness becomes the dark team.
    pub fn from_centers(first: ColorSample, second: ColorSample) -> Self {
        if first.lightness <= second.lightness {
            Self { dark: first, light: second }
        } else {
            Self { dark: second, light: first }
        }
    }

    pub fn color(&self, team: Team) -> &ColorSample {
        match team {
            Team::Dark => &self.dark,
            Team::Light => &self.light,
        }
    }

    pub fn separation(&self) -> f64 {
        self.dark.distance(&self.light)
    }
}

/// Gathers bootstrap color samples frame by frame.
#[derive(Debug, Clone, Default)]
pub struct BootstrapCollector {
    samples: Vec<ColorSample>,
    frames_seen: usize,
}

impl BootstrapCollector {
    pub fn observe_frame(&mut self, samples: impl IntoIterator<Item = ColorSample>) {
        self.frames_seen += 1;
        self.samples.extend(samples);
    }

    pub fn frames_seen(&self) -> usize {
        self.frames_seen
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    pub fn samples(&self) -> &[ColorSample] {
        &self.samples
    }
}

/// How a bootstrap ended. `poorly_separated` is set when the two reference
/// colors lie closer than `team_similarity_threshold`; the model still runs,
/// but its labels deserve less trust.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BootstrapOutcome {
    Ready {
        reference: TeamReference,
        poorly_separated: bool,
    },
    Disabled {
        samples: usize,
    },
}

impl BootstrapOutcome {
    pub fn reference(&self) -> Option<&TeamReference> {
        match self {
            BootstrapOutcome::Ready { reference, .. } => Some(reference),
            BootstrapOutcome::Disabled { .. } => None,
        }
    }

    pub fn is_poorly_separated(&self) -> bool {
        matches!(self, BootstrapOutcome::Ready { poorly_separated: true, .. })
    }
}

/// Two-phase team classifier.
#[derive(Debug, Clone)]
pub enum TeamColorModel {
    Bootstrapping {
        collector: BootstrapCollector,
        frame_budget: usize,
        min_samples: usize,
        similarity_threshold: f64,
        max_iterations: usize,
    },
    Ready {
        reference: TeamReference,
        max_iterations: usize,
    },
    Disabled,
}

impl TeamColorModel {
    pub fn new(config: &AnalysisConfig) -> Self {
        TeamColorModel::Bootstrapping {
            collector: BootstrapCollector::default(),
            frame_budget: config.bootstrap_frames,
            min_samples: config.min_bootstrap_samples,
            similarity_threshold: config.team_similarity_threshold,
            max_iterations: config.kmeans_max_iterations,
        }
    }

    pub fn is_bootstrapping(&self) -> bool {
        matches!(self, TeamColorModel::Bootstrapping { .. })
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self, TeamColorModel::Ready { .. })
    }

    pub fn reference(&self) -> Option<&TeamReference> {
        match self {
            TeamColorModel::Ready { reference, .. } => Some(reference),
            _ => None,
        }
    }

    /// Adds one bootstrap frame. Once the frame budget is spent the bootstrap is
    /// finished automatically and the outcome returned.
    pub fn observe_bootstrap_frame(&mut self, samples: impl IntoIterator<Item = ColorSample>) -> Option<BootstrapOutcome> {
        let TeamColorModel::Bootstrapping {
            collector, frame_budget, ..
        } = self
        else {
            return None;
        };
        collector.observe_frame(samples);
        if collector.frames_seen() >= *frame_budget {
            self.finish_bootstrap()
        } else {
            None
        }
    }

    /// Ends the bootstrap with whatever was collected. Calling it outside the
    /// bootstrap phase does nothing.
    pub fn finish_bootstrap(&mut self) -> Option<BootstrapOutcome> {
        let TeamColorModel::Bootstrapping {
            collector,
            min_samples,
            similarity_threshold,
            max_iterations,
            ..
        } = self
        else {
            return None;
        };
        let (min_samples, similarity_threshold, max_iterations) = (*min_samples, *similarity_threshold, *max_iterations);
        let sample_count = collector.sample_count();
        info!(samples = sample_count, frames = collector.frames_seen(), "team color bootstrap gathered samples");

        let clustered = if sample_count >= min_samples {
            two_means(collector.samples(), max_iterations)
        } else {
            None
        };

        let Some(clusters) = clustered else {
            if sample_count >= min_samples {
                error!(samples = sample_count, "reference color clustering failed, team assignment disabled");
            } else {
                warn!(
                    samples = sample_count,
                    required = min_samples,
                    "not enough color samples for clustering, team assignment disabled"
                );
            }
            *self = TeamColorModel::Disabled;
            return Some(BootstrapOutcome::Disabled { samples: sample_count });
        };

        let [first, second] = clusters.centers;
        let reference = TeamReference::from_centers(first, second);
        let separation = reference.separation();
        let poorly_separated = separation < similarity_threshold;
        if poorly_separated {
            warn!(separation, threshold = similarity_threshold, "team centroids similar, separation might be poor");
        }
        info!(
            dark_l = reference.dark.lightness,
            dark_a = reference.dark.a,
            dark_b = reference.dark.b,
            light_l = reference.light.lightness,
            light_a = reference.light.a,
            light_b = reference.light.b,
            "teams initialized"
        );

        *self = TeamColorModel::Ready { reference, max_iterations };
        Some(BootstrapOutcome::Ready {
            reference,
            poorly_separated,
        })
    }

    /// Labels this frame's sampled players. Returns an empty map while
    /// bootstrapping, when disabled, or with fewer than two samples.
    pub fn assign_teams(&self, samples: &[(TrackId, ColorSample)]) -> HashMap<TrackId, Team> {
        let TeamColorModel::Ready {
            reference,
            max_iterations,
        } = self
        else {
            return HashMap::new();
        };
        if samples.len() < 2 {
            return HashMap::new();
        }

        let colors: Vec<ColorSample> = samples.iter().map(|(_, color)| *color).collect();
        let Some(clusters) = two_means(&colors, *max_iterations) else {
            return HashMap::new();
        };

        let cluster_to_team = match_to_reference(&clusters.centers, reference);
        samples
            .iter()
            .zip(clusters.labels)
            .map(|((track_id, _), label)| (*track_id, cluster_to_team[label]))
            .collect()
    }
}

/// Chooses the cluster-to-team permutation with the lower total distance.
/// The identity mapping wins ties.
fn match_to_reference(centers: &[ColorSample; 2], reference: &TeamReference) -> [Team; 2] {
    let identity = centers[0].distance(&reference.dark) + centers[1].distance(&reference.light);
    let swapped = centers[0].distance(&reference.light) + centers[1].distance(&reference.dark);
    if identity <= swapped {
        [Team::Dark, Team::Light]
    } else {
        [Team::Light, Team::Dark]
    }
}
