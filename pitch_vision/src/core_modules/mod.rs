pub mod color_sample;
pub mod geometry;
pub mod heatmap;
pub mod kmeans;
pub mod peak_locator;
pub mod pixel;
pub mod possession;
pub mod stats_log;
pub mod team_classifier;
pub mod tracker;
