pub mod aggregate;
pub mod catalog;
pub mod chart;
pub mod config;
pub mod dataset;
pub mod enrich;
pub mod explorer;
pub mod model;

/// Track files loaded when neither the command line nor the config names any
pub const DEFAULT_DATA_FILES: &[&str] = &["data/tracks_1.csv", "data/tracks_2.csv"];

/// Application name for XDG paths
pub const APP_NAME: &str = "trackscope";
