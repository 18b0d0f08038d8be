//! Spotify Web API client: client-credentials auth, track search and audio features.

use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use serde::Deserialize;
use ureq::Agent;

use super::{AudioFeatures, CatalogApi, CatalogError, CatalogTrack, Credentials};
use crate::config::CatalogConfig;

/// Refresh the token this long before the catalog says it expires.
const TOKEN_SLACK: Duration = Duration::from_secs(30);

/// Token endpoint response.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

/// `/search?type=track` response; only `tracks` is read.
#[derive(Debug, Deserialize)]
struct SearchResponse {
    tracks: Paging,
}

#[derive(Debug, Deserialize)]
struct Paging {
    #[serde(default)]
    items: Vec<TrackObject>,
}

#[derive(Debug, Deserialize)]
struct TrackObject {
    /// Local files have no id
    id: Option<String>,
    name: String,
    preview_url: Option<String>,
    #[serde(default)]
    artists: Vec<ArtistObject>,
    album: AlbumObject,
}

#[derive(Debug, Deserialize)]
struct ArtistObject {
    name: String,
    #[serde(default)]
    external_urls: ExternalUrls,
}

#[derive(Debug, Default, Deserialize)]
struct ExternalUrls {
    spotify: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AlbumObject {
    name: String,
    #[serde(default)]
    release_date: String,
    #[serde(default)]
    images: Vec<ImageObject>,
    #[serde(default)]
    external_urls: ExternalUrls,
}

#[derive(Debug, Deserialize)]
struct ImageObject {
    url: String,
}

/// `/audio-features?ids=` response; unknown ids come back as null.
#[derive(Debug, Deserialize)]
struct AudioFeaturesResponse {
    #[serde(default)]
    audio_features: Vec<Option<AudioFeatures>>,
}

impl TrackObject {
    fn into_catalog_track(self) -> Option<CatalogTrack> {
        let id = self.id?;
        let (artist_name, artist_url) = match self.artists.into_iter().next() {
            Some(a) => (a.name, a.external_urls.spotify),
            None => ("Unknown artist".to_string(), None),
        };
        // Index 1 is the medium (300px) cover
        let album_image_url = self
            .album
            .images
            .get(1)
            .or_else(|| self.album.images.first())
            .map(|img| img.url.clone());

        Some(CatalogTrack {
            id,
            name: self.name,
            artist_name,
            artist_url,
            album_name: self.album.name,
            album_url: self.album.external_urls.spotify,
            album_image_url,
            release_date: self.album.release_date,
            preview_url: self.preview_url,
        })
    }
}

struct AccessToken {
    value: String,
    expires_at: Instant,
}

/// Blocking Spotify client. Credentials and endpoints are injected; the access
/// token is fetched lazily and reused until shortly before it expires.
pub struct SpotifyClient {
    agent: Agent,
    credentials: Credentials,
    api_base: String,
    auth_url: String,
    token: Mutex<Option<AccessToken>>,
}

impl SpotifyClient {
    pub fn new(credentials: Credentials, config: &CatalogConfig) -> Self {
        let agent_config = Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(config.timeout_secs.max(1))))
            .build();

        Self {
            agent: Agent::new_with_config(agent_config),
            credentials,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            auth_url: config.auth_url.clone(),
            token: Mutex::new(None),
        }
    }

    fn token_slot(&self) -> MutexGuard<'_, Option<AccessToken>> {
        self.token.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn access_token(&self) -> Result<String, CatalogError> {
        let mut slot = self.token_slot();
        if let Some(token) = slot.as_ref() {
            if Instant::now() + TOKEN_SLACK < token.expires_at {
                return Ok(token.value.clone());
            }
        }

        log::debug!("Requesting catalog access token from {}", self.auth_url);
        let response: TokenResponse = self
            .agent
            .post(self.auth_url.as_str())
            .send_form([
                ("grant_type", "client_credentials"),
                ("client_id", self.credentials.client_id.as_str()),
                ("client_secret", self.credentials.client_secret.as_str()),
            ])
            .map_err(|e| match e {
                ureq::Error::StatusCode(status) => {
                    CatalogError::Auth(format!("token endpoint returned HTTP {status}"))
                }
                other => transport_error(other),
            })?
            .body_mut()
            .read_json()
            .map_err(|e| CatalogError::Decode(format!("token response: {e}")))?;

        let value = response.access_token;
        *slot = Some(AccessToken {
            value: value.clone(),
            expires_at: Instant::now() + Duration::from_secs(response.expires_in),
        });
        Ok(value)
    }

    fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T, CatalogError> {
        let token = self.access_token()?;
        let url = format!("{}/{}", self.api_base, path);
        log::debug!("GET {url} {query:?}");

        let mut request = self
            .agent
            .get(url.as_str())
            .header("Authorization", format!("Bearer {token}"));
        for (key, value) in query {
            request = request.query(*key, *value);
        }

        let mut response = request.call().map_err(|e| match e {
            ureq::Error::StatusCode(401) => {
                // Token revoked or expired early; fetch a fresh one next time
                self.token_slot().take();
                CatalogError::Auth("access token rejected".to_string())
            }
            ureq::Error::StatusCode(status) => CatalogError::Status {
                status,
                url: url.clone(),
            },
            other => transport_error(other),
        })?;

        response
            .body_mut()
            .read_json()
            .map_err(|e| CatalogError::Decode(format!("{path}: {e}")))
    }
}

fn transport_error(e: ureq::Error) -> CatalogError {
    let err = match e {
        ureq::Error::Timeout(_) => CatalogError::Transport("request timed out".to_string()),
        other => CatalogError::Transport(other.to_string()),
    };
    log::warn!("{err}");
    err
}

impl CatalogApi for SpotifyClient {
    fn search_tracks(&self, query: &str, limit: usize) -> Result<Vec<CatalogTrack>, CatalogError> {
        let q = format!("track:{query}");
        let limit = limit.clamp(1, 50).to_string();
        let response: SearchResponse =
            self.get_json("search", &[("q", q.as_str()), ("type", "track"), ("limit", limit.as_str())])?;

        Ok(response
            .tracks
            .items
            .into_iter()
            .filter_map(TrackObject::into_catalog_track)
            .collect())
    }

    fn audio_features(&self, track_id: &str) -> Result<Option<AudioFeatures>, CatalogError> {
        let response: AudioFeaturesResponse = self.get_json("audio-features", &[("ids", track_id)])?;
        Ok(response.audio_features.into_iter().next().flatten())
    }
}
