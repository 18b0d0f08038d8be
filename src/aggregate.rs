//! Summary views over the canonical track table: decade averages, per-popularity
//! feature means and the Pearson correlation matrix. None of these mutate their input
//! and all of them return an empty result for an empty table.

use std::collections::BTreeMap;

use rayon::prelude::*;
use serde::Serialize;

use crate::model::{Column, FeatureVector, NumericRow, Track, TrackTable};

/// Mean of every numeric column for one decade.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecadeRow {
    pub decade: i32,
    pub track_count: usize,
    /// Means in `Column::ALL` order, excluding `decade` itself.
    pub means: FeatureVector,
}

impl DecadeRow {
    /// The comparable features of this decade, in `Column::COMPARABLE` order.
    pub fn comparable_features(&self) -> FeatureVector {
        FeatureVector::from_pairs(
            Column::COMPARABLE
                .iter()
                .filter_map(|&c| self.means.get(c).map(|v| (c, v))),
        )
    }
}

impl NumericRow for DecadeRow {
    fn value(&self, column: Column) -> Option<f64> {
        if column == Column::Decade {
            Some(self.decade as f64)
        } else {
            self.means.get(column)
        }
    }
}

/// One row per decade present in the table, ascending by decade.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DecadeAggregate {
    rows: Vec<DecadeRow>,
}

impl DecadeAggregate {
    pub fn rows(&self) -> &[DecadeRow] {
        &self.rows
    }

    pub fn decades(&self) -> Vec<i32> {
        self.rows.iter().map(|r| r.decade).collect()
    }

    /// Typed lookup of one decade.
    pub fn row(&self, decade: i32) -> Option<&DecadeRow> {
        self.rows
            .binary_search_by_key(&decade, |r| r.decade)
            .ok()
            .map(|i| &self.rows[i])
    }

    pub fn feature_vector(&self, decade: i32) -> Option<FeatureVector> {
        self.row(decade).map(DecadeRow::comparable_features)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Per-decade mean of every numeric column.
pub fn decade_averages(table: &TrackTable) -> DecadeAggregate {
    decade_averages_of(table.tracks())
}

/// Group any numeric rows by their `decade` value. Rows without a decade are
/// skipped; a column missing from every row of a group is omitted for that group.
pub fn decade_averages_of<R: NumericRow>(rows: &[R]) -> DecadeAggregate {
    let mut groups: BTreeMap<i32, Accumulator> = BTreeMap::new();

    for row in rows {
        let Some(decade) = row.value(Column::Decade) else {
            continue;
        };
        let acc = groups.entry(decade as i32).or_default();
        acc.rows += 1;
        for (i, &column) in Column::ALL.iter().enumerate() {
            if column == Column::Decade {
                continue;
            }
            if let Some(v) = row.value(column) {
                acc.sums[i] += v;
                acc.counts[i] += 1;
            }
        }
    }

    let rows = groups
        .into_iter()
        .map(|(decade, acc)| DecadeRow {
            decade,
            track_count: acc.rows,
            means: acc.means(),
        })
        .collect();

    DecadeAggregate { rows }
}

#[derive(Default)]
struct Accumulator {
    rows: usize,
    sums: [f64; 17],
    counts: [usize; 17],
}

impl Accumulator {
    fn means(&self) -> FeatureVector {
        FeatureVector::from_pairs(
            Column::ALL
                .iter()
                .enumerate()
                .filter(|(i, c)| **c != Column::Decade && self.counts[*i] > 0)
                .map(|(i, &c)| (c, self.sums[i] / self.counts[i] as f64)),
        )
    }
}

/// Mean of one feature for a single popularity value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PopularityRow {
    pub popularity: u32,
    pub track_count: usize,
    pub mean: f64,
}

/// Mean of `feature` per popularity value, sorted by popularity descending.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PopularityAggregate {
    pub feature: Column,
    pub rows: Vec<PopularityRow>,
}

impl PopularityAggregate {
    /// Rows as numeric rows exposing `popularity` and the chosen feature.
    pub fn points(&self) -> Vec<PopularityPoint> {
        self.rows
            .iter()
            .map(|r| PopularityPoint {
                feature: self.feature,
                popularity: r.popularity,
                mean: r.mean,
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// A popularity row paired with the feature it averages, for chart building.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PopularityPoint {
    pub feature: Column,
    pub popularity: u32,
    pub mean: f64,
}

impl NumericRow for PopularityPoint {
    fn value(&self, column: Column) -> Option<f64> {
        if column == self.feature {
            Some(self.mean)
        } else if column == Column::Popularity {
            Some(self.popularity as f64)
        } else {
            None
        }
    }
}

pub fn popularity_average(table: &TrackTable, feature: Column) -> PopularityAggregate {
    popularity_average_of(table.tracks(), feature)
}

pub fn popularity_average_of<R: NumericRow>(rows: &[R], feature: Column) -> PopularityAggregate {
    let mut groups: BTreeMap<u32, (usize, f64)> = BTreeMap::new();

    for row in rows {
        let (Some(pop), Some(v)) = (row.value(Column::Popularity), row.value(feature)) else {
            continue;
        };
        if !(pop.is_finite() && pop >= 0.0) {
            continue;
        }
        let entry = groups.entry(pop as u32).or_insert((0, 0.0));
        entry.0 += 1;
        entry.1 += v;
    }

    let rows = groups
        .into_iter()
        .rev()
        .map(|(popularity, (count, sum))| PopularityRow {
            popularity,
            track_count: count,
            mean: sum / count as f64,
        })
        .collect();

    PopularityAggregate { feature, rows }
}

/// Tracks strictly more popular than `threshold`.
pub fn popular_tracks(table: &TrackTable, threshold: u32) -> Vec<&Track> {
    table.iter().filter(|t| t.popularity > threshold).collect()
}

/// Square Pearson correlation matrix over an ordered column list.
///
/// A column with zero variance correlates as NaN with everything, itself included.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CorrelationMatrix {
    columns: Vec<Column>,
    values: Vec<Vec<f64>>,
}

impl CorrelationMatrix {
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Row-major values, `values()[i][j]` for `columns()[i]` × `columns()[j]`.
    pub fn values(&self) -> &[Vec<f64>] {
        &self.values
    }

    pub fn get(&self, a: Column, b: Column) -> Option<f64> {
        let i = self.index_of(a)?;
        let j = self.index_of(b)?;
        Some(self.values[i][j])
    }

    pub fn index_of(&self, column: Column) -> Option<usize> {
        self.columns.iter().position(|&c| c == column)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

pub fn correlation_matrix(table: &TrackTable, columns: &[Column]) -> CorrelationMatrix {
    correlation_matrix_of(table.tracks(), columns)
}

/// Rows missing any requested column are left out of every coefficient.
pub fn correlation_matrix_of<R: NumericRow>(rows: &[R], columns: &[Column]) -> CorrelationMatrix {
    let mut columns_dedup: Vec<Column> = Vec::with_capacity(columns.len());
    for &c in columns {
        if !columns_dedup.contains(&c) {
            columns_dedup.push(c);
        }
    }
    let columns = columns_dedup;

    // Column-major samples, complete rows only
    let mut samples: Vec<Vec<f64>> = vec![Vec::with_capacity(rows.len()); columns.len()];
    for row in rows {
        let values: Option<Vec<f64>> = columns.iter().map(|&c| row.value(c)).collect();
        if let Some(values) = values {
            for (k, v) in values.into_iter().enumerate() {
                samples[k].push(v);
            }
        }
    }

    let n = samples.first().map(|s| s.len()).unwrap_or(0);
    if n == 0 || columns.is_empty() {
        return CorrelationMatrix::default();
    }

    let centered: Vec<Centered> = samples.par_iter().map(|s| Centered::new(s)).collect();
    let k = columns.len();

    // Upper triangle in parallel, then mirror so the result is exactly symmetric
    let upper: Vec<Vec<f64>> = (0..k)
        .into_par_iter()
        .map(|i| (i..k).map(|j| pearson(&centered[i], &centered[j], i == j)).collect())
        .collect();

    let mut values = vec![vec![f64::NAN; k]; k];
    for (i, row) in upper.iter().enumerate() {
        for (offset, &r) in row.iter().enumerate() {
            let j = i + offset;
            values[i][j] = r;
            values[j][i] = r;
        }
    }

    CorrelationMatrix { columns, values }
}

/// Mean-centered samples of one column plus their sum of squares.
struct Centered {
    deviations: Vec<f64>,
    sum_sq: f64,
    constant: bool,
}

impl Centered {
    fn new(samples: &[f64]) -> Self {
        let n = samples.len() as f64;
        let mean = samples.iter().sum::<f64>() / n;
        let deviations: Vec<f64> = samples.iter().map(|v| v - mean).collect();
        let sum_sq = deviations.iter().map(|d| d * d).sum();
        let constant = samples.windows(2).all(|w| w[0] == w[1]);
        Self {
            deviations,
            sum_sq,
            constant,
        }
    }

    fn has_variance(&self) -> bool {
        !self.constant && self.sum_sq > 0.0
    }
}

fn pearson(a: &Centered, b: &Centered, same: bool) -> f64 {
    if !a.has_variance() || !b.has_variance() {
        return f64::NAN;
    }
    if same {
        return 1.0;
    }
    let cov: f64 = a
        .deviations
        .iter()
        .zip(&b.deviations)
        .map(|(x, y)| x * y)
        .sum();
    (cov / (a.sum_sq * b.sum_sq).sqrt()).clamp(-1.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::sample_track;

    fn table(tracks: Vec<Track>) -> TrackTable {
        TrackTable::new(tracks)
    }

    #[test]
    fn test_two_decades_from_two_rows() {
        let mut a = sample_track("1975-03-10", 1975, 90);
        a.danceability = 0.71;
        a.tempo = 133.3;
        let mut b = sample_track("1983-07-01", 1983, 70);
        b.danceability = 0.42;
        b.explicit = true;

        let agg = decade_averages(&table(vec![a.clone(), b.clone()]));
        assert_eq!(agg.decades(), vec![1970, 1980]);

        for (row, source) in agg.rows().iter().zip([&a, &b]) {
            assert_eq!(row.track_count, 1);
            for column in Column::ALL {
                if column == Column::Decade {
                    assert_eq!(row.value(column), Some(source.decade as f64));
                } else {
                    assert_eq!(row.means.get(column), Some(source.get(column)), "{column}");
                }
            }
        }
    }

    #[test]
    fn test_decade_means() {
        let mut a = sample_track("1990", 1990, 10);
        a.energy = 0.2;
        let mut b = sample_track("1994", 1994, 30);
        b.energy = 0.6;
        let c = sample_track("2001", 2001, 50);

        let agg = decade_averages(&table(vec![a, b, c]));
        let nineties = agg.row(1990).unwrap();
        assert_eq!(nineties.track_count, 2);
        assert!((nineties.means.get(Column::Energy).unwrap() - 0.4).abs() < 1e-12);
        assert_eq!(nineties.means.get(Column::Year), Some(1992.0));
        assert_eq!(nineties.means.get(Column::Popularity), Some(20.0));
        assert!(agg.row(1980).is_none());
        assert_eq!(agg.feature_vector(2000).unwrap().columns(), Column::COMPARABLE.to_vec());
    }

    #[test]
    fn test_decade_averages_idempotent() {
        let mut tracks = Vec::new();
        for (i, year) in [1961, 1965, 1972, 1978, 1979, 1985, 2004].iter().enumerate() {
            let mut t = sample_track("x", *year, i as u32 * 7);
            t.valence = 0.1 * i as f64;
            t.loudness = -3.0 - i as f64;
            tracks.push(t);
        }
        let once = decade_averages(&table(tracks));
        let twice = decade_averages_of(once.rows());

        assert_eq!(once.decades(), twice.decades());
        for (a, b) in once.rows().iter().zip(twice.rows()) {
            assert_eq!(a.means, b.means);
        }
    }

    #[test]
    fn test_popularity_sorted_descending() {
        let mut tracks = Vec::new();
        for (pop, dance) in [(10, 0.1), (80, 0.8), (10, 0.3), (55, 0.5), (80, 0.6), (0, 0.9)] {
            let mut t = sample_track("2000", 2000, pop);
            t.danceability = dance;
            tracks.push(t);
        }

        let agg = popularity_average(&table(tracks), Column::Danceability);
        let pops: Vec<u32> = agg.rows.iter().map(|r| r.popularity).collect();
        assert_eq!(pops, vec![80, 55, 10, 0]);
        assert!(pops.windows(2).all(|w| w[0] >= w[1]));
        assert!((agg.rows[0].mean - 0.7).abs() < 1e-12);
        assert_eq!(agg.rows[0].track_count, 2);
        assert!((agg.rows[2].mean - 0.2).abs() < 1e-12);

        let points = agg.points();
        assert_eq!(points[0].value(Column::Popularity), Some(80.0));
        assert_eq!(points[0].value(Column::Danceability), Some(agg.rows[0].mean));
        assert_eq!(points[0].value(Column::Energy), None);
    }

    #[test]
    fn test_correlation_symmetric_with_unit_diagonal() {
        let mut tracks = Vec::new();
        for i in 0..20 {
            let mut t = sample_track("2010", 2010 + (i % 7), (i * 5) as u32);
            t.energy = (i as f64 * 0.37).sin().abs();
            t.loudness = -20.0 + i as f64 * 0.8;
            t.danceability = ((i * i) % 11) as f64 / 11.0;
            tracks.push(t);
        }
        let cols = Column::CORRELATION_ORDER;
        let m = correlation_matrix(&table(tracks), &cols);

        assert_eq!(m.len(), cols.len());
        for i in 0..m.len() {
            for j in 0..m.len() {
                let (a, b) = (m.values()[i][j], m.values()[j][i]);
                assert!(a == b || (a.is_nan() && b.is_nan()));
            }
        }
        for c in [Column::Popularity, Column::Energy, Column::Loudness, Column::Year] {
            assert_eq!(m.get(c, c), Some(1.0));
        }
        // popularity and loudness both increase linearly with i
        assert!((m.get(Column::Popularity, Column::Loudness).unwrap() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_constant_column_is_nan_everywhere() {
        let mut tracks = Vec::new();
        for i in 0..5 {
            let mut t = sample_track("2010", 2010, i * 10);
            t.tempo = 100.0 + i as f64;
            t.liveness = 0.3; // constant
            tracks.push(t);
        }
        let m = correlation_matrix(
            &table(tracks),
            &[Column::Liveness, Column::Popularity, Column::Tempo],
        );
        assert!(m.get(Column::Liveness, Column::Liveness).unwrap().is_nan());
        assert!(m.get(Column::Liveness, Column::Popularity).unwrap().is_nan());
        assert!(m.get(Column::Tempo, Column::Liveness).unwrap().is_nan());
        assert_eq!(m.get(Column::Tempo, Column::Tempo), Some(1.0));
    }

    #[test]
    fn test_empty_table_gives_empty_results() {
        let empty = TrackTable::default();
        assert!(decade_averages(&empty).is_empty());
        assert!(popularity_average(&empty, Column::Energy).is_empty());
        assert!(correlation_matrix(&empty, &Column::CORRELATION_ORDER).is_empty());
    }

    #[test]
    fn test_popular_tracks_threshold() {
        let t = table(vec![
            sample_track("2000", 2000, 80),
            sample_track("2000", 2000, 81),
            sample_track("2000", 2000, 99),
        ]);
        assert_eq!(popular_tracks(&t, 80).len(), 2);
    }
}
