//! Turn raw CSV rows into the canonical track table.
//!
//! Row-level problems never abort the batch: a row whose release date cannot be
//! parsed, whose numeric fields cannot be coerced or fall outside their range
//! (popularity 0-100, the seven comparable features 0-1), or which has an empty
//! required field is dropped and recorded as a [`Rejection`].

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

use crate::dataset::{RawRecord, RawTable};
use crate::model::{Track, TrackTable};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EnrichError {
    #[error("row {row}: release date '{value}' has no numeric year")]
    Parse { row: usize, value: String },
    #[error("row {row}: column '{column}' value '{value}' is not a valid number")]
    TypeCoercion {
        row: usize,
        column: &'static str,
        value: String,
    },
    #[error("row {row}: column '{column}' value {value} is out of range")]
    OutOfRange {
        row: usize,
        column: &'static str,
        value: String,
    },
    #[error("row {row}: required column '{column}' is empty")]
    MissingValue { row: usize, column: &'static str },
}

impl EnrichError {
    /// Short machine-friendly reason, used for grouping in reports.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Parse { .. } => "unparseable_release_date",
            Self::TypeCoercion { .. } => "non_numeric",
            Self::OutOfRange { .. } => "out_of_range",
            Self::MissingValue { .. } => "missing_value",
        }
    }
}

/// A dropped input row and why.
#[derive(Debug, Clone, PartialEq)]
pub struct Rejection {
    /// "path:line" of the offending row.
    pub location: String,
    pub error: EnrichError,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnrichReport {
    pub total_rows: usize,
    pub kept: usize,
    pub rejections: Vec<Rejection>,
}

impl EnrichReport {
    /// Rejection counts grouped by reason, sorted by reason name.
    pub fn counts_by_reason(&self) -> Vec<(&'static str, usize)> {
        let mut counts: BTreeMap<&'static str, usize> = BTreeMap::new();
        for r in &self.rejections {
            *counts.entry(r.error.reason()).or_insert(0) += 1;
        }
        counts.into_iter().collect()
    }
}

#[derive(Debug, Clone)]
pub struct Enriched {
    pub table: TrackTable,
    pub report: EnrichReport,
}

/// Parse the year from a `YYYY[-MM[-DD]]` release date.
pub fn parse_year(release_date: &str) -> Option<i32> {
    let prefix = release_date.trim().split('-').next()?.trim();
    if prefix.is_empty() || !prefix.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    prefix.parse().ok()
}

/// `year - (year mod 10)`, e.g. 1975 → 1970. `None` when the decade would
/// fall below `i32::MIN`.
pub fn decade_of(year: i32) -> Option<i32> {
    year.checked_sub(year.rem_euclid(10))
}

/// Build the canonical track table from a raw table.
pub fn enrich(raw: &RawTable) -> Enriched {
    let columns = ColumnIndex::new(raw);
    let mut tracks = Vec::with_capacity(raw.len());
    let mut report = EnrichReport {
        total_rows: raw.len(),
        ..EnrichReport::default()
    };

    for (i, record) in raw.records.iter().enumerate() {
        match enrich_record(&columns, record, i + 1) {
            Ok(track) => tracks.push(track),
            Err(error) => {
                let location = raw.location(record);
                log::debug!("Dropping {location}: {error}");
                report.rejections.push(Rejection { location, error });
            }
        }
    }

    report.kept = tracks.len();
    if !report.rejections.is_empty() {
        let summary: Vec<String> = report
            .counts_by_reason()
            .iter()
            .map(|(reason, n)| format!("{n} {reason}"))
            .collect();
        log::warn!(
            "Dropped {} of {} rows ({})",
            report.rejections.len(),
            report.total_rows,
            summary.join(", ")
        );
    }

    Enriched {
        table: TrackTable::new(tracks),
        report,
    }
}

/// Columns enrichment reads; the discriminant indexes `ColumnIndex::positions`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Id,
    Name,
    Artists,
    Album,
    ReleaseDate,
    Popularity,
    DurationMs,
    Explicit,
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

impl Field {
    const ALL: [Field; 20] = [
        Field::Id,
        Field::Name,
        Field::Artists,
        Field::Album,
        Field::ReleaseDate,
        Field::Popularity,
        Field::DurationMs,
        Field::Explicit,
        Field::Danceability,
        Field::Energy,
        Field::Key,
        Field::Loudness,
        Field::Mode,
        Field::Speechiness,
        Field::Acousticness,
        Field::Instrumentalness,
        Field::Liveness,
        Field::Valence,
        Field::Tempo,
        Field::TimeSignature,
    ];

    fn name(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Name => "name",
            Self::Artists => "artists",
            Self::Album => "album",
            Self::ReleaseDate => "release_date",
            Self::Popularity => "popularity",
            Self::DurationMs => "duration_ms",
            Self::Explicit => "explicit",
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
}

/// Positions of the columns enrichment reads, resolved once per table.
struct ColumnIndex {
    positions: [Option<usize>; Field::ALL.len()],
}

impl ColumnIndex {
    fn new(raw: &RawTable) -> Self {
        let mut positions = [None; Field::ALL.len()];
        for field in Field::ALL {
            positions[field as usize] = raw.column_index(field.name());
        }
        Self { positions }
    }

    fn field<'a>(&self, record: &'a RawRecord, field: Field) -> Option<&'a str> {
        let idx = self.positions[field as usize]?;
        record.fields.get(idx).map(|f| f.trim())
    }
}

/// Field accessor for one record, carrying its row number for errors.
struct Row<'a> {
    columns: &'a ColumnIndex,
    record: &'a RawRecord,
    row: usize,
}

impl Row<'_> {
    fn text(&self, field: Field) -> Result<&str, EnrichError> {
        match self.columns.field(self.record, field) {
            Some(v) if !v.is_empty() => Ok(v),
            _ => Err(EnrichError::MissingValue {
                row: self.row,
                column: field.name(),
            }),
        }
    }

    fn optional_text(&self, field: Field) -> String {
        self.columns
            .field(self.record, field)
            .unwrap_or_default()
            .to_string()
    }

    fn coercion_error(&self, field: Field, value: &str) -> EnrichError {
        EnrichError::TypeCoercion {
            row: self.row,
            column: field.name(),
            value: value.to_string(),
        }
    }

    fn range_error(&self, field: Field, value: impl ToString) -> EnrichError {
        EnrichError::OutOfRange {
            row: self.row,
            column: field.name(),
            value: value.to_string(),
        }
    }

    fn real(&self, field: Field) -> Result<f64, EnrichError> {
        let v = self.text(field)?;
        v.parse::<f64>()
            .ok()
            .filter(|x| x.is_finite())
            .ok_or_else(|| self.coercion_error(field, v))
    }

    /// A real in [0, 1].
    fn unit(&self, field: Field) -> Result<f64, EnrichError> {
        let x = self.real(field)?;
        if (0.0..=1.0).contains(&x) {
            Ok(x)
        } else {
            Err(self.range_error(field, x))
        }
    }

    /// Integral value, accepting "4" and "4.0".
    fn integer(&self, field: Field) -> Result<i64, EnrichError> {
        let v = self.text(field)?;
        if let Ok(n) = v.parse::<i64>() {
            return Ok(n);
        }
        match v.parse::<f64>() {
            Ok(x) if x.is_finite() && x.fract() == 0.0 && x.abs() < 9.0e15 => Ok(x as i64),
            _ => Err(self.coercion_error(field, v)),
        }
    }

    fn unsigned(&self, field: Field) -> Result<u64, EnrichError> {
        let n = self.integer(field)?;
        u64::try_from(n).map_err(|_| self.coercion_error(field, &n.to_string()))
    }

    fn flag(&self, field: Field) -> Result<bool, EnrichError> {
        let v = self.text(field)?;
        match v.to_ascii_lowercase().as_str() {
            "1" | "1.0" | "true" => Ok(true),
            "0" | "0.0" | "false" => Ok(false),
            _ => Err(self.coercion_error(field, v)),
        }
    }
}

fn enrich_record(columns: &ColumnIndex, record: &RawRecord, row: usize) -> Result<Track, EnrichError> {
    let r = Row {
        columns,
        record,
        row,
    };

    let release_date = r.text(Field::ReleaseDate)?;
    let parse_error = || EnrichError::Parse {
        row,
        value: release_date.to_string(),
    };
    let year = parse_year(release_date).ok_or_else(parse_error)?;
    let decade = decade_of(year).ok_or_else(parse_error)?;

    let mode = r.integer(Field::Mode)?;
    if !(0..=1).contains(&mode) {
        return Err(r.coercion_error(Field::Mode, &mode.to_string()));
    }

    let popularity = r.unsigned(Field::Popularity)?;
    if popularity > 100 {
        return Err(r.range_error(Field::Popularity, popularity));
    }
    let time_signature = r.unsigned(Field::TimeSignature)?;

    Ok(Track {
        id: r.text(Field::Id)?.to_string(),
        name: r.text(Field::Name)?.to_string(),
        artists: parse_artists(r.text(Field::Artists)?),
        album: r.optional_text(Field::Album),
        release_date: release_date.to_string(),
        year,
        decade,
        popularity: popularity as u32,
        duration_ms: r.unsigned(Field::DurationMs)?,
        explicit: r.flag(Field::Explicit)?,
        danceability: r.unit(Field::Danceability)?,
        energy: r.unit(Field::Energy)?,
        key: i32::try_from(r.integer(Field::Key)?).map_err(|_| r.coercion_error(Field::Key, "out of range"))?,
        loudness: r.real(Field::Loudness)?,
        mode: mode as u8,
        speechiness: r.unit(Field::Speechiness)?,
        acousticness: r.unit(Field::Acousticness)?,
        instrumentalness: r.unit(Field::Instrumentalness)?,
        liveness: r.unit(Field::Liveness)?,
        valence: r.unit(Field::Valence)?,
        tempo: r.real(Field::Tempo)?,
        time_signature: u32::try_from(time_signature)
            .map_err(|_| r.coercion_error(Field::TimeSignature, &time_signature.to_string()))?,
    })
}

fn quoted_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"'((?:[^'\\]|\\.)*)'|"((?:[^"\\]|\\.)*)""#).expect("valid artist regex")
    })
}

/// Parse an artist list literal like `['Simon & Garfunkel', "Guns N' Roses"]`.
/// Anything that is not a bracketed list is treated as a single artist name.
pub fn parse_artists(field: &str) -> Vec<String> {
    let field = field.trim();
    if !(field.starts_with('[') && field.ends_with(']')) {
        return if field.is_empty() {
            Vec::new()
        } else {
            vec![field.to_string()]
        };
    }

    quoted_name_re()
        .captures_iter(field)
        .filter_map(|caps| caps.get(1).or_else(|| caps.get(2)))
        .map(|m| m.as_str().replace("\\'", "'").replace("\\\"", "\""))
        .filter(|name| !name.trim().is_empty())
        .collect()
}
