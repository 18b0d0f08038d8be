use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A numeric column of the canonical track table.
///
/// Declaration order is the column order used for the correlation heatmap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Column {
    Popularity,
    DurationMs,
    Explicit,
    Decade,
    Year,
    Danceability,
    Energy,
    Key,
    Loudness,
    Mode,
    Speechiness,
    Acousticness,
    Instrumentalness,
    Liveness,
    Valence,
    Tempo,
    TimeSignature,
}

impl Column {
    /// Every numeric column, in correlation order.
    pub const ALL: [Column; 17] = [
        Column::Popularity,
        Column::DurationMs,
        Column::Explicit,
        Column::Decade,
        Column::Year,
        Column::Danceability,
        Column::Energy,
        Column::Key,
        Column::Loudness,
        Column::Mode,
        Column::Speechiness,
        Column::Acousticness,
        Column::Instrumentalness,
        Column::Liveness,
        Column::Valence,
        Column::Tempo,
        Column::TimeSignature,
    ];

    /// Columns shown on the popularity page's correlation heatmap.
    pub const CORRELATION_ORDER: [Column; 17] = Self::ALL;

    /// The bounded [0, 1] features that can be compared between a track and a decade.
    pub const COMPARABLE: [Column; 7] = [
        Column::Danceability,
        Column::Energy,
        Column::Speechiness,
        Column::Acousticness,
        Column::Instrumentalness,
        Column::Liveness,
        Column::Valence,
    ];

    /// Header name in the input files.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Popularity => "popularity",
            Self::DurationMs => "duration_ms",
            Self::Explicit => "explicit",
            Self::Decade => "decade",
            Self::Year => "year",
            Self::Danceability => "danceability",
            Self::Energy => "energy",
            Self::Key => "key",
            Self::Loudness => "loudness",
            Self::Mode => "mode",
            Self::Speechiness => "speechiness",
            Self::Acousticness => "acousticness",
            Self::Instrumentalness => "instrumentalness",
            Self::Liveness => "liveness",
            Self::Valence => "valence",
            Self::Tempo => "tempo",
            Self::TimeSignature => "time_signature",
        }
    }

    /// Human-readable label for chart axes and tables.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Popularity => "Popularity",
            Self::DurationMs => "Duration (ms)",
            Self::Explicit => "Explicit",
            Self::Decade => "Decade",
            Self::Year => "Year",
            Self::Danceability => "Danceability",
            Self::Energy => "Energy",
            Self::Key => "Key",
            Self::Loudness => "Loudness",
            Self::Mode => "Mode",
            Self::Speechiness => "Speechiness",
            Self::Acousticness => "Acousticness",
            Self::Instrumentalness => "Instrumentalness",
            Self::Liveness => "Liveness",
            Self::Valence => "Valence",
            Self::Tempo => "Tempo",
            Self::TimeSignature => "Time signature",
        }
    }

    pub fn is_comparable(&self) -> bool {
        Self::COMPARABLE.contains(self)
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Column {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase().replace(['-', ' '], "_");
        Column::ALL
            .iter()
            .copied()
            .find(|c| c.name() == wanted)
            .ok_or_else(|| format!("unknown column '{s}'"))
    }
}

/// Anything that exposes named numeric columns. Aggregations and chart
/// builders work over slices of these, so aggregate rows can be fed back in.
pub trait NumericRow {
    fn value(&self, column: Column) -> Option<f64>;
}

/// One enriched row of the canonical track table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Track {
    pub id: String,
    pub name: String,
    pub artists: Vec<String>,
    pub album: String,
    pub release_date: String,
    pub year: i32,
    pub decade: i32,
    pub popularity: u32,
    pub duration_ms: u64,
    pub explicit: bool,
    pub danceability: f64,
    pub energy: f64,
    pub key: i32,
    pub loudness: f64,
    pub mode: u8,
    pub speechiness: f64,
    pub acousticness: f64,
    pub instrumentalness: f64,
    pub liveness: f64,
    pub valence: f64,
    pub tempo: f64,
    pub time_signature: u32,
}

impl Track {
    /// Values of every numeric column, in `Column::ALL` order.
    pub fn numeric_values(&self) -> [f64; 17] {
        Column::ALL.map(|c| self.get(c))
    }

    pub fn get(&self, column: Column) -> f64 {
        match column {
            Column::Popularity => self.popularity as f64,
            Column::DurationMs => self.duration_ms as f64,
            Column::Explicit => {
                if self.explicit {
                    1.0
                } else {
                    0.0
                }
            }
            Column::Decade => self.decade as f64,
            Column::Year => self.year as f64,
            Column::Danceability => self.danceability,
            Column::Energy => self.energy,
            Column::Key => self.key as f64,
            Column::Loudness => self.loudness,
            Column::Mode => self.mode as f64,
            Column::Speechiness => self.speechiness,
            Column::Acousticness => self.acousticness,
            Column::Instrumentalness => self.instrumentalness,
            Column::Liveness => self.liveness,
            Column::Valence => self.valence,
            Column::Tempo => self.tempo,
            Column::TimeSignature => self.time_signature as f64,
        }
    }

    /// The comparable feature vector of this track.
    pub fn comparable_features(&self) -> FeatureVector {
        FeatureVector::from_pairs(Column::COMPARABLE.iter().map(|&c| (c, self.get(c))))
    }
}

impl NumericRow for Track {
    fn value(&self, column: Column) -> Option<f64> {
        Some(self.get(column))
    }
}

/// The canonical track table. Immutable once built.
#[derive(Debug, Clone, Default)]
pub struct TrackTable {
    tracks: Vec<Track>,
}

impl TrackTable {
    pub fn new(tracks: Vec<Track>) -> Self {
        Self { tracks }
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Track> {
        self.tracks.iter()
    }

    /// (earliest, latest) release year, if any rows exist.
    pub fn year_range(&self) -> Option<(i32, i32)> {
        let min = self.tracks.iter().map(|t| t.year).min()?;
        let max = self.tracks.iter().map(|t| t.year).max()?;
        Some((min, max))
    }
}

impl<'a> IntoIterator for &'a TrackTable {
    type Item = &'a Track;
    type IntoIter = std::slice::Iter<'a, Track>;

    fn into_iter(self) -> Self::IntoIter {
        self.tracks.iter()
    }
}

/// An ordered set of (column, value) pairs, e.g. one decade's averages or
/// a single track's audio features.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct FeatureVector(Vec<(Column, f64)>);

impl FeatureVector {
    /// Later duplicates of a column replace earlier ones.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (Column, f64)>) -> Self {
        let mut out: Vec<(Column, f64)> = Vec::new();
        for (column, value) in pairs {
            match out.iter_mut().find(|(c, _)| *c == column) {
                Some(slot) => slot.1 = value,
                None => out.push((column, value)),
            }
        }
        Self(out)
    }

    pub fn get(&self, column: Column) -> Option<f64> {
        self.0.iter().find(|(c, _)| *c == column).map(|(_, v)| *v)
    }

    pub fn columns(&self) -> Vec<Column> {
        self.0.iter().map(|(c, _)| *c).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(Column, f64)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl NumericRow for FeatureVector {
    fn value(&self, column: Column) -> Option<f64> {
        self.get(column)
    }
}

#[cfg(test)]
pub(crate) fn sample_track(release_date: &str, year: i32, popularity: u32) -> Track {
    Track {
        id: format!("id-{year}-{popularity}"),
        name: format!("Song {year}"),
        artists: vec!["Some Artist".to_string()],
        album: String::new(),
        release_date: release_date.to_string(),
        year,
        decade: year - year.rem_euclid(10),
        popularity,
        duration_ms: 200_000,
        explicit: false,
        danceability: 0.5,
        energy: 0.5,
        key: 5,
        loudness: -8.0,
        mode: 1,
        speechiness: 0.05,
        acousticness: 0.3,
        instrumentalness: 0.0,
        liveness: 0.1,
        valence: 0.6,
        tempo: 120.0,
        time_signature: 4,
    }
}
