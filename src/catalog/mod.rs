pub mod credentials;
pub mod spotify;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::enrich;
use crate::model::{Column, FeatureVector};

pub use credentials::Credentials;
pub use spotify::SpotifyClient;

/// Text shown to the user when a search has no match.
pub const NOT_FOUND_MESSAGE: &str = "Song not found, please try again.";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CatalogError {
    #[error("no track matches '{query}'")]
    NotFound { query: String },
    #[error("catalog credentials are not configured (set CLIENT_ID and CLIENT_SECRET)")]
    MissingCredentials,
    #[error("catalog authentication failed: {0}")]
    Auth(String),
    #[error("catalog request failed: {0}")]
    Transport(String),
    #[error("catalog returned HTTP {status} for {url}")]
    Status { status: u16, url: String },
    #[error("unexpected catalog response: {0}")]
    Decode(String),
    #[error("no audio features available for track {track_id}")]
    NoFeatures { track_id: String },
}

impl CatalogError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Message for the presentation layer. Not-found is an expected outcome and
    /// gets its own wording, distinct from connectivity problems.
    pub fn user_message(&self) -> String {
        match self {
            Self::NotFound { .. } => NOT_FOUND_MESSAGE.to_string(),
            Self::NoFeatures { .. } => "Audio features are not available for this song.".to_string(),
            Self::MissingCredentials | Self::Auth(_) => format!("Could not sign in to the music catalog: {self}"),
            _ => format!("Could not reach the music catalog: {self}"),
        }
    }
}

/// A ranked search hit, flattened from the catalog's nested response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogTrack {
    pub id: String,
    pub name: String,
    pub artist_name: String,
    pub artist_url: Option<String>,
    pub album_name: String,
    pub album_url: Option<String>,
    pub album_image_url: Option<String>,
    pub release_date: String,
    pub preview_url: Option<String>,
}

/// Per-track audio features as returned by the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioFeatures {
    pub danceability: f64,
    pub energy: f64,
    pub speechiness: f64,
    pub acousticness: f64,
    pub instrumentalness: f64,
    pub liveness: f64,
    pub valence: f64,
    pub loudness: f64,
    pub tempo: f64,
    pub duration_ms: u64,
    #[serde(default)]
    pub key: Option<i32>,
    #[serde(default)]
    pub mode: Option<u8>,
    #[serde(default)]
    pub time_signature: Option<u32>,
}

impl AudioFeatures {
    /// The seven bounded features, in `Column::COMPARABLE` order.
    pub fn comparable(&self) -> FeatureVector {
        FeatureVector::from_pairs([
            (Column::Danceability, self.danceability),
            (Column::Energy, self.energy),
            (Column::Speechiness, self.speechiness),
            (Column::Acousticness, self.acousticness),
            (Column::Instrumentalness, self.instrumentalness),
            (Column::Liveness, self.liveness),
            (Column::Valence, self.valence),
        ])
    }
}

/// The external music catalog. Implementations own their transport and auth.
pub trait CatalogApi {
    /// Ranked matches for a free-text query, best first.
    fn search_tracks(&self, query: &str, limit: usize) -> Result<Vec<CatalogTrack>, CatalogError>;

    /// Audio features for one track id, `None` if the catalog has none.
    fn audio_features(&self, track_id: &str) -> Result<Option<AudioFeatures>, CatalogError>;
}

/// Everything the song examiner shows about one searched track.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedTrackProfile {
    pub id: String,
    pub name: String,
    pub artist: String,
    pub artist_url: Option<String>,
    pub album: String,
    pub album_url: Option<String>,
    pub album_image_url: Option<String>,
    pub release_date: String,
    pub preview_url: Option<String>,
    /// The comparable features, in `Column::COMPARABLE` order.
    pub features: FeatureVector,
    pub loudness: f64,
    pub tempo: f64,
    pub duration_ms: u64,
}

impl ResolvedTrackProfile {
    /// Decade of the album release, when the date has a numeric year.
    pub fn release_decade(&self) -> Option<i32> {
        enrich::parse_year(&self.release_date).and_then(enrich::decade_of)
    }

    pub fn duration_display(&self) -> String {
        format_duration(self.duration_ms)
    }
}

/// Anything that can turn a search string into a profile.
pub trait ProfileLookup {
    fn lookup(&self, query: &str) -> Result<ResolvedTrackProfile, CatalogError>;
}

/// Resolves free-text queries to a single profile through a [`CatalogApi`].
pub struct TrackProfileFetcher<C> {
    client: C,
    search_limit: usize,
}

impl<C: CatalogApi> TrackProfileFetcher<C> {
    pub fn new(client: C) -> Self {
        Self {
            client,
            search_limit: 3,
        }
    }

    pub fn with_search_limit(mut self, limit: usize) -> Self {
        self.search_limit = limit.max(1);
        self
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Top-ranked match for `query` plus its features. Zero matches (or a blank
    /// query) is `CatalogError::NotFound`; other matches are ignored.
    pub fn search(&self, query: &str) -> Result<ResolvedTrackProfile, CatalogError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(CatalogError::NotFound {
                query: String::new(),
            });
        }

        let hits = self.client.search_tracks(query, self.search_limit)?;
        let Some(top) = hits.into_iter().next() else {
            log::info!("No catalog match for '{query}'");
            return Err(CatalogError::NotFound {
                query: query.to_string(),
            });
        };
        log::debug!("Top match for '{query}': {} by {} ({})", top.name, top.artist_name, top.id);

        let features = self
            .client
            .audio_features(&top.id)?
            .ok_or_else(|| CatalogError::NoFeatures {
                track_id: top.id.clone(),
            })?;

        Ok(ResolvedTrackProfile {
            features: features.comparable(),
            loudness: features.loudness,
            tempo: features.tempo,
            duration_ms: features.duration_ms,
            id: top.id,
            name: top.name,
            artist: top.artist_name,
            artist_url: top.artist_url,
            album: top.album_name,
            album_url: top.album_url,
            album_image_url: top.album_image_url,
            release_date: top.release_date,
            preview_url: top.preview_url,
        })
    }
}

impl<C: CatalogApi> ProfileLookup for TrackProfileFetcher<C> {
    fn lookup(&self, query: &str) -> Result<ResolvedTrackProfile, CatalogError> {
        self.search(query)
    }
}

/// `m:ss` with zero-padded seconds, e.g. 340_000 ms → "5:40".
pub fn format_duration(duration_ms: u64) -> String {
    let total_secs = (duration_ms + 500) / 1000;
    format!("{}:{:02}", total_secs / 60, total_secs % 60)
}

#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use std::cell::RefCell;

    /// In-memory catalog: tracks match when their name contains the query.
    #[derive(Default)]
    pub struct FakeCatalog {
        pub tracks: Vec<(CatalogTrack, Option<AudioFeatures>)>,
        pub fail_with: RefCell<Option<CatalogError>>,
        pub searches: RefCell<Vec<String>>,
    }

    pub fn features(value: f64) -> AudioFeatures {
        AudioFeatures {
            danceability: value,
            energy: value,
            speechiness: value,
            acousticness: value,
            instrumentalness: value,
            liveness: value,
            valence: value,
            loudness: -5.5,
            tempo: 114.2,
            duration_ms: 340_000,
            key: Some(7),
            mode: Some(1),
            time_signature: Some(4),
        }
    }

    pub fn track(id: &str, name: &str, release_date: &str) -> CatalogTrack {
        CatalogTrack {
            id: id.to_string(),
            name: name.to_string(),
            artist_name: "Deep Purple".to_string(),
            artist_url: Some(format!("https://open.spotify.com/artist/{id}")),
            album_name: "Machine Head".to_string(),
            album_url: None,
            album_image_url: Some("https://i.scdn.co/image/medium".to_string()),
            release_date: release_date.to_string(),
            preview_url: None,
        }
    }

    impl CatalogApi for FakeCatalog {
        fn search_tracks(&self, query: &str, limit: usize) -> Result<Vec<CatalogTrack>, CatalogError> {
            self.searches.borrow_mut().push(query.to_string());
            if let Some(err) = self.fail_with.borrow_mut().take() {
                return Err(err);
            }
            let q = query.to_lowercase();
            Ok(self
                .tracks
                .iter()
                .filter(|(t, _)| t.name.to_lowercase().contains(&q))
                .take(limit)
                .map(|(t, _)| t.clone())
                .collect())
        }

        fn audio_features(&self, track_id: &str) -> Result<Option<AudioFeatures>, CatalogError> {
            Ok(self
                .tracks
                .iter()
                .find(|(t, _)| t.id == track_id)
                .and_then(|(_, f)| f.clone()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fake::{features, track, FakeCatalog};
    use super::*;

    fn catalog() -> FakeCatalog {
        FakeCatalog {
            tracks: vec![
                (track("sotw", "Smoke on the Water", "1972-03-25"), Some(features(0.4))),
                (track("sotw-live", "Smoke on the Water - Live", "1973-12-01"), Some(features(0.9))),
                (track("nofeat", "Silent Track", "2001"), None),
            ],
            ..FakeCatalog::default()
        }
    }

    #[test]
    fn test_top_match_wins() {
        let fetcher = TrackProfileFetcher::new(catalog());
        let profile = fetcher.search("smoke on the water").unwrap();
        assert_eq!(profile.id, "sotw");
        assert_eq!(profile.features.get(Column::Danceability), Some(0.4));
        assert_eq!(profile.features.columns(), Column::COMPARABLE.to_vec());
        assert_eq!(profile.release_decade(), Some(1970));
        assert_eq!(profile.duration_display(), "5:40");
        assert_eq!(profile.loudness, -5.5);
    }

    #[test]
    fn test_no_match_is_not_found() {
        let fetcher = TrackProfileFetcher::new(catalog());
        let err = fetcher.search("Stairway to Heaven").unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(err.user_message(), NOT_FOUND_MESSAGE);
        assert!(err.user_message().to_lowercase().contains("song not found"));

        // the fetcher stays usable afterwards
        assert!(fetcher.search("Smoke").is_ok());
    }

    #[test]
    fn test_blank_query_is_not_found_without_request() {
        let fetcher = TrackProfileFetcher::new(catalog());
        assert!(fetcher.search("   ").unwrap_err().is_not_found());
        assert!(fetcher.client().searches.borrow().is_empty());
    }

    #[test]
    fn test_missing_features() {
        let fetcher = TrackProfileFetcher::new(catalog());
        let err = fetcher.search("Silent").unwrap_err();
        assert_eq!(err, CatalogError::NoFeatures { track_id: "nofeat".into() });
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_transport_failure_is_distinct_from_not_found() {
        let cat = catalog();
        *cat.fail_with.borrow_mut() = Some(CatalogError::Transport("timed out".into()));
        let fetcher = TrackProfileFetcher::new(cat);

        let err = fetcher.search("Smoke").unwrap_err();
        assert!(!err.is_not_found());
        assert!(err.user_message().starts_with("Could not reach"));
        assert_ne!(err.user_message(), NOT_FOUND_MESSAGE);
    }

    #[test]
    fn test_search_limit_passed_through() {
        let fetcher = TrackProfileFetcher::new(catalog()).with_search_limit(0);
        assert_eq!(fetcher.search("smoke").unwrap().id, "sotw");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0), "0:00");
        assert_eq!(format_duration(61_000), "1:01");
        assert_eq!(format_duration(340_000), "5:40");
        assert_eq!(format_duration(59_600), "1:00");
    }
}
