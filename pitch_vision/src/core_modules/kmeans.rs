// THEORY:
// A tiny, deterministic two-cluster k-means over L*a*b* samples. It is used twice:
// once over the whole bootstrap window to find the two team reference colors,
// and once per frame over that frame's samples.
//
// Determinism matters more than global optimality here, because the per-frame
// labels must be reproducible for identical inputs. So there is no random
// restart:
// 1.  **Seeding**: the first center is the sample farthest from the mean, the
//     second is the sample farthest from the first. Earlier samples win ties.
// 2.  **Lloyd Iterations**: assign each sample to its nearest center (cluster 0
//     wins ties), recompute centers as means, stop when no label changes or the
//     iteration cap is reached. A cluster that loses all members keeps its center.

use crate::core_modules::color_sample::ColorSample;

/// The result of a two-cluster grouping.
#[derive(Debug, Clone, PartialEq)]
pub struct TwoMeans {
    pub centers: [ColorSample; 2],
    /// Cluster index (0 or 1) of each input sample, in input order.
    pub labels: Vec<usize>,
}

/// Groups `samples` into two clusters. Needs at least two samples.
pub fn two_means(samples: &[ColorSample], max_iterations: usize) -> Option<TwoMeans> {
    if samples.len() < 2 {
        return None;
    }

    let mut centers = seed_centers(samples);
    let mut labels = vec![usize::MAX; samples.len()];

    for _ in 0..max_iterations.max(1) {
        let mut changed = false;
        for (label, sample) in labels.iter_mut().zip(samples) {
            let nearest = nearest_center(&centers, sample);
            if *label != nearest {
                *label = nearest;
                changed = true;
            }
        }
        if !changed {
            break;
        }

        for (cluster, center) in centers.iter_mut().enumerate() {
            let members = samples.iter().zip(&labels).filter(|(_, label)| **label == cluster).map(|(s, _)| s);
            if let Some(mean) = mean_of(members) {
                *center = mean;
            }
        }
    }

    Some(TwoMeans { centers, labels })
}

fn seed_centers(samples: &[ColorSample]) -> [ColorSample; 2] {
    let overall = mean_of(samples.iter()).unwrap_or(samples[0]);
    let first = farthest_from(samples, &overall);
    let second = farthest_from(samples, &first);
    [first, second]
}

fn farthest_from(samples: &[ColorSample], anchor: &ColorSample) -> ColorSample {
    let mut best = samples[0];
    let mut best_distance = anchor.distance(&best);
    for sample in &samples[1..] {
        let distance = anchor.distance(sample);
        if distance > best_distance {
            best = *sample;
            best_distance = distance;
        }
    }
    best
}

fn nearest_center(centers: &[ColorSample; 2], sample: &ColorSample) -> usize {
    if centers[1].distance(sample) < centers[0].distance(sample) { 1 } else { 0 }
}

fn mean_of<'a>(samples: impl Iterator<Item = &'a ColorSample>) -> Option<ColorSample> {
    let mut count = 0usize;
    let (mut l, mut a, mut b) = (0.0, 0.0, 0.0);
    for sample in samples {
        count += 1;
        l += sample.lightness;
        a += sample.a;
        b += sample.b;
    }
    if count == 0 {
        return None;
    }
    let n = count as f64;
    Some(ColorSample::new(l / n, a / n, b / n))
}
