pub mod cache;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use indicatif::{ProgressBar, ProgressStyle};
use thiserror::Error;
use walkdir::WalkDir;

use crate::enrich::{self, EnrichReport};
use crate::model::TrackTable;

pub use cache::TableCache;

/// Columns every input file must carry. `album` and `id_artists` are optional.
pub const REQUIRED_COLUMNS: &[&str] = &[
    "id",
    "name",
    "popularity",
    "duration_ms",
    "explicit",
    "artists",
    "release_date",
    "danceability",
    "energy",
    "key",
    "loudness",
    "mode",
    "speechiness",
    "acousticness",
    "instrumentalness",
    "liveness",
    "valence",
    "tempo",
    "time_signature",
];

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("No input files given")]
    NoInput,
    #[error("Input file not found: {0}")]
    Missing(PathBuf),
    #[error("Malformed CSV in {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("{path} is missing required columns: {}", missing.join(", "))]
    MissingColumns { path: PathBuf, missing: Vec<String> },
    #[error("{path} does not match the schema of the first file (expected [{}], found [{}])", expected.join(","), found.join(","))]
    SchemaMismatch {
        path: PathBuf,
        expected: Vec<String>,
        found: Vec<String>,
    },
}

/// One data row as read from disk, before any type coercion.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    /// Index into `RawTable::sources`.
    pub source: usize,
    /// 1-based line number within its source file (header is line 1).
    pub line: u64,
    pub fields: Vec<String>,
}

/// Row-wise concatenation of every input file, all sharing one header.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    pub columns: Vec<String>,
    pub sources: Vec<PathBuf>,
    pub records: Vec<RawRecord>,
}

impl RawTable {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// "path:line" of a record, for diagnostics.
    pub fn location(&self, record: &RawRecord) -> String {
        match self.sources.get(record.source) {
            Some(path) => format!("{}:{}", path.display(), record.line),
            None => format!("<row>:{}", record.line),
        }
    }
}

/// Read every file in `paths` (directories expand to the `*.csv` files under
/// them, in sorted order) and concatenate them into one raw table.
pub fn load(paths: &[PathBuf]) -> Result<RawTable, LoadError> {
    let files = expand_paths(paths)?;
    if files.is_empty() {
        return Err(LoadError::NoInput);
    }

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.enable_steady_tick(Duration::from_millis(120));

    let table = load_files(&files, &pb)?;
    log::info!(
        "Loaded {} rows from {} file(s)",
        table.records.len(),
        table.sources.len()
    );
    Ok(table)
}

/// Read and concatenate `files`. `pb` is cleared whether or not reading succeeds.
fn load_files(files: &[PathBuf], pb: &ProgressBar) -> Result<RawTable, LoadError> {
    let result = read_all(files, pb);
    pb.finish_and_clear();
    result
}

fn read_all(files: &[PathBuf], pb: &ProgressBar) -> Result<RawTable, LoadError> {
    let mut table = RawTable::default();

    for (source, path) in files.iter().enumerate() {
        pb.set_message(format!("Loading {}", path.display()));
        let (columns, records) = read_file(path, source)?;

        if table.sources.is_empty() {
            table.columns = columns;
        } else if table.columns != columns {
            return Err(LoadError::SchemaMismatch {
                path: path.clone(),
                expected: table.columns.clone(),
                found: columns,
            });
        }

        log::info!("Loaded {} rows from {}", records.len(), path.display());
        table.sources.push(path.clone());
        table.records.extend(records);
    }

    Ok(table)
}

fn read_file(path: &Path, source: usize) -> Result<(Vec<String>, Vec<RawRecord>), LoadError> {
    let csv_err = |e: csv::Error| LoadError::Csv {
        path: path.to_path_buf(),
        source: e,
    };

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .map_err(|e| match e.kind() {
            csv::ErrorKind::Io(io) if io.kind() == std::io::ErrorKind::NotFound => {
                LoadError::Missing(path.to_path_buf())
            }
            _ => csv_err(e),
        })?;

    let columns: Vec<String> = reader
        .headers()
        .map_err(csv_err)?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let missing: Vec<String> = REQUIRED_COLUMNS
        .iter()
        .filter(|&&c| !columns.iter().any(|h| h == c))
        .map(|c| c.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(LoadError::MissingColumns {
            path: path.to_path_buf(),
            missing,
        });
    }

    let mut records = Vec::new();
    for result in reader.records() {
        let record = result.map_err(csv_err)?;
        let line = record.position().map(|p| p.line()).unwrap_or(0);
        records.push(RawRecord {
            source,
            line,
            fields: record.iter().map(|f| f.to_string()).collect(),
        });
    }

    Ok((columns, records))
}

/// Expand directories to their `*.csv` files. Plain files are kept as given.
fn expand_paths(paths: &[PathBuf]) -> Result<Vec<PathBuf>, LoadError> {
    let mut files = Vec::new();

    for path in paths {
        if path.is_dir() {
            let mut found: Vec<PathBuf> = WalkDir::new(path)
                .follow_links(true)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
                .filter(|e| {
                    e.path()
                        .extension()
                        .and_then(|ext| ext.to_str())
                        .map(|ext| ext.eq_ignore_ascii_case("csv"))
                        .unwrap_or(false)
                })
                .map(|e| e.into_path())
                .collect();
            found.sort();
            log::debug!("{} expands to {} csv file(s)", path.display(), found.len());
            files.extend(found);
        } else if path.exists() {
            files.push(path.clone());
        } else {
            return Err(LoadError::Missing(path.clone()));
        }
    }

    Ok(files)
}

/// A loaded and enriched dataset: the canonical table plus what enrichment dropped.
#[derive(Debug)]
pub struct Dataset {
    pub table: Arc<TrackTable>,
    pub report: EnrichReport,
    pub sources: Vec<PathBuf>,
    pub loaded_at: DateTime<Utc>,
}

impl Dataset {
    /// Load `paths` and run enrichment. Only file-level problems are errors;
    /// bad rows end up in `report`.
    pub fn open(paths: &[PathBuf]) -> Result<Self, LoadError> {
        let raw = load(paths)?;
        let enriched = enrich::enrich(&raw);
        Ok(Self {
            table: Arc::new(enriched.table),
            report: enriched.report,
            sources: raw.sources,
            loaded_at: Utc::now(),
        })
    }
}

#[cfg(test)]
pub(crate) const TEST_HEADER: &str = "id,name,popularity,duration_ms,explicit,artists,id_artists,release_date,release_date_precision,danceability,energy,key,loudness,mode,speechiness,acousticness,instrumentalness,liveness,valence,tempo,time_signature";
