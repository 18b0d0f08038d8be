use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::Deserialize;

use crate::chart::ColorScale;
use crate::model::Column;

/// Application configuration loaded from TOML config file.
/// Every field has a default, so the file is optional.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Track files (or directories of `*.csv`) to load, in order.
    pub data_files: Vec<PathBuf>,
    /// Catalog API settings.
    pub catalog: CatalogConfig,
    /// Chart styling.
    pub charts: ChartConfig,
    /// Popularity page settings.
    pub popularity: PopularityConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_files: crate::DEFAULT_DATA_FILES.iter().map(PathBuf::from).collect(),
            catalog: CatalogConfig::default(),
            charts: ChartConfig::default(),
            popularity: PopularityConfig::default(),
        }
    }
}

/// Catalog (Spotify Web API) configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Client id; the `CLIENT_ID` env var and `api_keys.yaml` take precedence.
    pub client_id: Option<String>,
    /// Client secret; the `CLIENT_SECRET` env var and `api_keys.yaml` take precedence.
    pub client_secret: Option<String>,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// How many matches to ask for (only the top one is used).
    pub search_limit: usize,
    pub api_base: String,
    pub auth_url: String,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            timeout_secs: 10,
            search_limit: 3,
            api_base: "https://api.spotify.com/v1".to_string(),
            auth_url: "https://accounts.spotify.com/api/token".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChartConfig {
    pub color_scale: ColorScale,
    pub radar_width: u32,
    pub radar_height: u32,
}

impl Default for ChartConfig {
    fn default() -> Self {
        Self {
            color_scale: ColorScale::Tealgrn,
            radar_width: crate::chart::radar::DEFAULT_WIDTH,
            radar_height: crate::chart::radar::DEFAULT_HEIGHT,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PopularityConfig {
    /// Features plotted against popularity, one scatter each.
    pub features: Vec<Column>,
    /// Tracks above this popularity count as "popular".
    pub popular_threshold: u32,
}

impl Default for PopularityConfig {
    fn default() -> Self {
        Self {
            features: vec![Column::Danceability, Column::Instrumentalness],
            popular_threshold: 80,
        }
    }
}

impl AppConfig {
    /// Load config from `~/.config/trackscope/config.toml`.
    /// Returns default config if file doesn't exist.
    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => {
                log::debug!("No config directory, using defaults");
                Self::default()
            }
        }
    }

    /// Load config from an explicit path.
    /// Logs a warning if the file exists but can't be parsed.
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            log::debug!("No config file at {}, using defaults", path.display());
            return Self::default();
        }
        match std::fs::read_to_string(path) {
            Ok(contents) => match toml::from_str::<AppConfig>(&contents) {
                Ok(config) => {
                    log::info!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    log::warn!("Failed to parse {}: {}. Using defaults.", path.display(), e);
                    Self::default()
                }
            },
            Err(e) => {
                log::warn!("Failed to read {}: {}. Using defaults.", path.display(), e);
                Self::default()
            }
        }
    }

    /// Get the config file path.
    pub fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", crate::APP_NAME).map(|dirs| dirs.config_dir().join("config.toml"))
    }
}
