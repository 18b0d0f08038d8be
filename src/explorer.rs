//! A browsing session over one canonical table. Aggregates are computed once per
//! session and shared by both views; user input arrives as plain values.

use std::fmt;
use std::sync::{Arc, OnceLock};

use serde::Serialize;

use crate::aggregate::{self, CorrelationMatrix, DecadeAggregate, PopularityAggregate};
use crate::catalog::{CatalogError, ProfileLookup, ResolvedTrackProfile};
use crate::chart::radar::{decade_label, track_label};
use crate::chart::{self, ColorScale, HeatmapSpec, RadarSpec, ScatterSpec};
use crate::config::AppConfig;
use crate::enrich::decade_of;
use crate::model::{Column, FeatureVector, TrackTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum View {
    SongExaminer,
    Popularity,
}

impl View {
    pub fn label(&self) -> &'static str {
        match self {
            Self::SongExaminer => "Song examiner",
            Self::Popularity => "Popularity",
        }
    }
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Presentation knobs for both views.
#[derive(Debug, Clone)]
pub struct ExplorerSettings {
    pub color_scale: ColorScale,
    pub radar_width: u32,
    pub radar_height: u32,
    pub popularity_features: Vec<Column>,
    pub popular_threshold: u32,
}

impl Default for ExplorerSettings {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for ExplorerSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            color_scale: config.charts.color_scale,
            radar_width: config.charts.radar_width,
            radar_height: config.charts.radar_height,
            popularity_features: config.popularity.features.clone(),
            popular_threshold: config.popularity.popular_threshold,
        }
    }
}

/// What the user asked to see.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewRequest {
    SongExaminer { query: String, decade: Option<i32> },
    /// An empty feature list means the configured default features.
    Popularity { features: Vec<Column> },
}

impl ViewRequest {
    pub fn view(&self) -> View {
        match self {
            Self::SongExaminer { .. } => View::SongExaminer,
            Self::Popularity { .. } => View::Popularity,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewPayload {
    SongExaminer(SongExaminerView),
    Popularity(PopularityView),
}

impl ViewPayload {
    pub fn view(&self) -> View {
        match self {
            Self::SongExaminer(_) => View::SongExaminer,
            Self::Popularity(_) => View::Popularity,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SongExaminerView {
    Resolved {
        profile: ResolvedTrackProfile,
        decade: i32,
        /// Decades the user can compare against.
        decades: Vec<i32>,
        decade_features: FeatureVector,
        radar: RadarSpec,
    },
    Failed {
        query: String,
        message: String,
        not_found: bool,
    },
}

impl SongExaminerView {
    fn failed(query: &str, message: impl Into<String>) -> Self {
        Self::Failed {
            query: query.to_string(),
            message: message.into(),
            not_found: false,
        }
    }

    fn from_catalog_error(query: &str, err: &CatalogError) -> Self {
        Self::Failed {
            query: query.to_string(),
            message: err.user_message(),
            not_found: err.is_not_found(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PopularityPanel {
    pub feature: Column,
    pub aggregate: PopularityAggregate,
    pub scatter: ScatterSpec,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PopularityView {
    pub track_count: usize,
    pub popular_threshold: u32,
    pub popular_track_count: usize,
    pub panels: Vec<PopularityPanel>,
    pub heatmap: Option<HeatmapSpec>,
}

pub struct Explorer {
    table: Arc<TrackTable>,
    settings: ExplorerSettings,
    decades: OnceLock<DecadeAggregate>,
    correlations: OnceLock<CorrelationMatrix>,
}

impl Explorer {
    pub fn new(table: Arc<TrackTable>) -> Self {
        Self::with_settings(table, ExplorerSettings::default())
    }

    pub fn with_settings(table: Arc<TrackTable>, settings: ExplorerSettings) -> Self {
        Self {
            table,
            settings,
            decades: OnceLock::new(),
            correlations: OnceLock::new(),
        }
    }

    pub fn table(&self) -> &TrackTable {
        &self.table
    }

    pub fn settings(&self) -> &ExplorerSettings {
        &self.settings
    }

    pub fn decade_averages(&self) -> &DecadeAggregate {
        self.decades.get_or_init(|| {
            let agg = aggregate::decade_averages(&self.table);
            log::debug!("Computed decade averages: {} decades", agg.len());
            agg
        })
    }

    pub fn correlations(&self) -> &CorrelationMatrix {
        self.correlations
            .get_or_init(|| aggregate::correlation_matrix(&self.table, &Column::CORRELATION_ORDER))
    }

    /// Dispatch a request to its view. `catalog` is only needed by the song
    /// examiner; without one, searches fail with a credentials message.
    pub fn render(&self, request: &ViewRequest, catalog: Option<&dyn ProfileLookup>) -> ViewPayload {
        log::debug!("Rendering {} view", request.view());
        match request {
            ViewRequest::SongExaminer { query, decade } => {
                ViewPayload::SongExaminer(self.song_examiner(catalog, query, *decade))
            }
            ViewRequest::Popularity { features } => ViewPayload::Popularity(self.popularity(features)),
        }
    }

    /// Resolve `query` and compare it against a decade: the requested one, else
    /// the track's own release decade, else the earliest decade in the table.
    pub fn song_examiner(
        &self,
        catalog: Option<&dyn ProfileLookup>,
        query: &str,
        decade: Option<i32>,
    ) -> SongExaminerView {
        let Some(catalog) = catalog else {
            return SongExaminerView::from_catalog_error(query, &CatalogError::MissingCredentials);
        };

        let profile = match catalog.lookup(query) {
            Ok(profile) => profile,
            Err(e) => {
                if e.is_not_found() {
                    log::info!("Search '{query}': {e}");
                } else {
                    log::warn!("Search '{query}' failed: {e}");
                }
                return SongExaminerView::from_catalog_error(query, &e);
            }
        };

        let decades = self.decade_averages();
        if decades.is_empty() {
            return SongExaminerView::failed(query, "No decade averages available: the track table is empty.");
        }

        let chosen = match decade {
            Some(requested) => match decade_of(requested) {
                Some(d) => d,
                None => return SongExaminerView::failed(query, format!("{requested} is not a valid decade.")),
            },
            None => profile
                .release_decade()
                .filter(|d| decades.row(*d).is_some())
                .unwrap_or_else(|| decades.rows()[0].decade),
        };

        let Some(decade_features) = decades.feature_vector(chosen) else {
            return SongExaminerView::failed(query, format!("No tracks from the {chosen}s in the dataset."));
        };

        let radar = match chart::radar_spec(
            &decade_features,
            &profile.features,
            &decade_label(chosen),
            &track_label(&profile.name, &profile.release_date),
        ) {
            Ok(spec) => spec.with_size(self.settings.radar_width, self.settings.radar_height),
            Err(e) => {
                log::error!("Radar chart for '{query}' is malformed: {e}");
                return SongExaminerView::failed(query, format!("Cannot compare features: {e}"));
            }
        };

        SongExaminerView::Resolved {
            profile,
            decade: chosen,
            decades: decades.decades(),
            decade_features,
            radar,
        }
    }

    /// Feature-vs-popularity scatters plus the full correlation heatmap.
    pub fn popularity(&self, features: &[Column]) -> PopularityView {
        let features = if features.is_empty() {
            self.settings.popularity_features.as_slice()
        } else {
            features
        };

        let panels = features
            .iter()
            .map(|&feature| {
                let aggregate = aggregate::popularity_average(&self.table, feature);
                let scatter = chart::scatter_spec(&aggregate.points(), Column::Popularity, feature, feature, feature)
                    .with_color_scale(self.settings.color_scale);
                PopularityPanel {
                    feature,
                    aggregate,
                    scatter,
                }
            })
            .collect();

        let heatmap = match chart::correlation_heatmap_spec(self.correlations(), &Column::CORRELATION_ORDER) {
            Ok(spec) => Some(spec.with_color_scale(self.settings.color_scale)),
            Err(e) => {
                log::error!("Correlation heatmap is malformed: {e}");
                None
            }
        };

        PopularityView {
            track_count: self.table.len(),
            popular_threshold: self.settings.popular_threshold,
            popular_track_count: aggregate::popular_tracks(&self.table, self.settings.popular_threshold).len(),
            panels,
            heatmap,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::fake::{features, track, FakeCatalog};
    use crate::catalog::{TrackProfileFetcher, NOT_FOUND_MESSAGE};
    use crate::model::sample_track;

    fn explorer() -> Explorer {
        let mut tracks = Vec::new();
        for (i, year) in [1962, 1968, 1975, 1979, 1983, 1999].iter().enumerate() {
            let mut t = sample_track("x", *year, 50 + i as u32 * 9);
            t.danceability = 0.1 + 0.1 * i as f64;
            t.instrumentalness = 0.5 - 0.05 * i as f64;
            tracks.push(t);
        }
        Explorer::new(Arc::new(TrackTable::new(tracks)))
    }

    fn fetcher() -> TrackProfileFetcher<FakeCatalog> {
        TrackProfileFetcher::new(FakeCatalog {
            tracks: vec![
                (track("sotw", "Smoke on the Water", "1972-03-25"), Some(features(0.4))),
                (track("new", "Brand New", "2021-05-01"), Some(features(0.6))),
            ],
            ..FakeCatalog::default()
        })
    }

    #[test]
    fn test_request_view() {
        let examine = ViewRequest::SongExaminer {
            query: "Smoke".into(),
            decade: None,
        };
        let popularity = ViewRequest::Popularity { features: vec![] };
        assert_eq!(examine.view(), View::SongExaminer);
        assert_eq!(popularity.view().to_string(), "Popularity");

        let ex = explorer();
        assert_eq!(ex.render(&popularity, None).view(), View::Popularity);
        assert_eq!(ex.render(&examine, None).view(), View::SongExaminer);
    }

    #[test]
    fn test_examiner_defaults_to_release_decade() {
        let ex = explorer();
        let f = fetcher();
        match ex.song_examiner(Some(&f), "Smoke on the Water", None) {
            SongExaminerView::Resolved { decade, decades, radar, profile, .. } => {
                assert_eq!(decade, 1970);
                assert_eq!(decades, vec![1960, 1970, 1980, 1990]);
                assert_eq!(radar.traces[0].name, "Decade 1970 average");
                assert_eq!(radar.traces[1].name, "Smoke on the Water, 1972-03-25");
                assert_eq!(profile.id, "sotw");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_examiner_falls_back_to_earliest_decade() {
        let ex = explorer();
        let f = fetcher();
        match ex.song_examiner(Some(&f), "Brand New", None) {
            SongExaminerView::Resolved { decade, .. } => assert_eq!(decade, 1960),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_examiner_requested_decade() {
        let ex = explorer();
        let f = fetcher();
        match ex.song_examiner(Some(&f), "Smoke", Some(1985)) {
            SongExaminerView::Resolved { decade, decade_features, .. } => {
                assert_eq!(decade, 1980);
                assert_eq!(decade_features, ex.decade_averages().feature_vector(1980).unwrap());
            }
            other => panic!("unexpected {other:?}"),
        }

        match ex.song_examiner(Some(&f), "Smoke", Some(1940)) {
            SongExaminerView::Failed { not_found, message, .. } => {
                assert!(!not_found);
                assert!(message.contains("1940"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_examiner_extreme_decade_fails_cleanly() {
        let ex = explorer();
        let f = fetcher();
        match ex.song_examiner(Some(&f), "Smoke", Some(i32::MIN)) {
            SongExaminerView::Failed { not_found, message, .. } => {
                assert!(!not_found);
                assert!(message.contains("not a valid decade"));
            }
            other => panic!("unexpected {other:?}"),
        }
        match ex.song_examiner(Some(&f), "Smoke", Some(i32::MAX)) {
            SongExaminerView::Failed { message, .. } => assert!(message.contains("2147483640")),
            other => panic!("unexpected {other:?}"),
        }

        // the session keeps working afterwards
        assert!(matches!(
            ex.song_examiner(Some(&f), "Smoke", None),
            SongExaminerView::Resolved { .. }
        ));
    }

    #[test]
    fn test_not_found_then_next_search_works() {
        let ex = explorer();
        let f = fetcher();

        match ex.render(
            &ViewRequest::SongExaminer {
                query: "Nothing Like This".into(),
                decade: None,
            },
            Some(&f),
        ) {
            ViewPayload::SongExaminer(SongExaminerView::Failed { not_found, message, .. }) => {
                assert!(not_found);
                assert_eq!(message, NOT_FOUND_MESSAGE);
            }
            other => panic!("unexpected {other:?}"),
        }

        let again = ex.render(
            &ViewRequest::SongExaminer {
                query: "Smoke".into(),
                decade: None,
            },
            Some(&f),
        );
        assert!(matches!(
            again,
            ViewPayload::SongExaminer(SongExaminerView::Resolved { .. })
        ));
    }

    #[test]
    fn test_examiner_without_catalog() {
        let ex = explorer();
        match ex.song_examiner(None, "Smoke", None) {
            SongExaminerView::Failed { not_found, message, .. } => {
                assert!(!not_found);
                assert!(message.contains("credentials"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_popularity_view() {
        let ex = explorer();
        let view = ex.popularity(&[]);
        assert_eq!(view.track_count, 6);
        assert_eq!(view.panels.len(), 2);
        assert_eq!(view.panels[0].feature, Column::Danceability);
        assert_eq!(view.panels[1].feature, Column::Instrumentalness);
        assert_eq!(view.panels[0].scatter.points.len(), 6);
        // popularity 50 + 9i: only 86 and 95 exceed 80
        assert_eq!(view.popular_track_count, 2);

        let heatmap = view.heatmap.unwrap();
        assert_eq!(heatmap.x_labels.len(), Column::CORRELATION_ORDER.len());

        let custom = ex.popularity(&[Column::Energy]);
        assert_eq!(custom.panels.len(), 1);
        assert_eq!(custom.panels[0].feature, Column::Energy);
    }

    #[test]
    fn test_aggregates_are_shared() {
        let ex = explorer();
        let a = ex.decade_averages() as *const DecadeAggregate;
        let _ = ex.popularity(&[]);
        let b = ex.decade_averages() as *const DecadeAggregate;
        assert_eq!(a, b);
    }

    #[test]
    fn test_empty_table_views() {
        let ex = Explorer::new(Arc::new(TrackTable::default()));
        let f = fetcher();
        assert!(matches!(
            ex.song_examiner(Some(&f), "Smoke", None),
            SongExaminerView::Failed { .. }
        ));
        let view = ex.popularity(&[]);
        assert!(view.panels.iter().all(|p| p.scatter.points.is_empty()));
        assert!(view.heatmap.unwrap().z.iter().flatten().all(|c| c.is_none()));
    }

    #[test]
    fn test_payload_serializes() {
        let ex = explorer();
        let f = fetcher();
        let payload = ex.render(
            &ViewRequest::SongExaminer {
                query: "Smoke".into(),
                decade: None,
            },
            Some(&f),
        );
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["song_examiner"]["status"], "resolved");
        assert_eq!(json["song_examiner"]["radar"]["radial_range"][1], 1.0);
    }
}
