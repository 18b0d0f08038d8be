use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use trackscope::catalog::credentials::KEYS_FILE;
use trackscope::catalog::{Credentials, ProfileLookup, SpotifyClient, TrackProfileFetcher};
use trackscope::dataset::cache::TableCache;
use trackscope::dataset::Dataset;
use trackscope::explorer::{Explorer, ExplorerSettings, PopularityView, SongExaminerView, ViewPayload, ViewRequest};
use trackscope::model::Column;

#[derive(Parser)]
#[command(name = "trackscope", version, about = "Explore a music-track dataset by decade and popularity")]
struct Cli {
    /// Track CSV files or directories (defaults to config data_files)
    #[arg(long, global = true)]
    data: Vec<PathBuf>,

    /// Path to an alternative config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print view payloads as JSON instead of tables
    #[arg(long, global = true)]
    json: bool,

    /// Verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search the catalog for a song and compare it to a decade average
    Examine {
        /// Song title to search for
        query: String,

        /// Decade to compare against (e.g. 1970; any year in it works)
        #[arg(long)]
        decade: Option<i32>,
    },

    /// Features vs. popularity, plus the correlation heatmap
    Popularity {
        /// Feature to plot against popularity (repeatable; defaults to config)
        #[arg(long = "feature")]
        features: Vec<Column>,
    },

    /// Show per-decade feature averages
    Decades,

    /// Show dataset statistics
    Stats,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    // Load config file (optional, defaults if missing)
    let config = match &cli.config {
        Some(path) => trackscope::config::AppConfig::load_from(path),
        None => trackscope::config::AppConfig::load(),
    };

    // Resolve data files: CLI > config
    let data_files = if !cli.data.is_empty() { cli.data.clone() } else { config.data_files.clone() };
    if data_files.is_empty() {
        anyhow::bail!("No track files to load. Pass --data or set data_files in config.");
    }

    let cache = TableCache::new();
    let dataset = cache.get_or_load(&data_files).context("Failed to load track data")?;
    log::info!(
        "Loaded {} tracks from {} file(s)",
        dataset.table.len(),
        dataset.sources.len()
    );

    let explorer = Explorer::with_settings(Arc::clone(&dataset.table), ExplorerSettings::from(&config));

    match cli.command {
        Commands::Examine { query, decade } => {
            let fetcher = Credentials::resolve(&config.catalog, Path::new(KEYS_FILE)).map(|creds| {
                TrackProfileFetcher::new(SpotifyClient::new(creds, &config.catalog))
                    .with_search_limit(config.catalog.search_limit)
            });
            let lookup = fetcher.as_ref().map(|f| f as &dyn ProfileLookup);

            let payload = explorer.render(&ViewRequest::SongExaminer { query, decade }, lookup);
            if cli.json {
                print_json(&payload)?;
            } else {
                print_payload(&payload);
            }
        }

        Commands::Popularity { features } => {
            let payload = explorer.render(&ViewRequest::Popularity { features }, None);
            if cli.json {
                print_json(&payload)?;
            } else {
                print_payload(&payload);
            }
        }

        Commands::Decades => {
            let decades = explorer.decade_averages();
            if cli.json {
                print_json(decades)?;
                return Ok(());
            }
            if decades.is_empty() {
                println!("No tracks loaded.");
                return Ok(());
            }

            println!(
                "{:<7} {:>7}  {:>5} {:>5} {:>5} {:>5} {:>5} {:>5} {:>5} {:>6} {:>4}",
                "Decade", "Tracks", "Dnc", "Eng", "Spc", "Acs", "Ins", "Liv", "Val", "Tempo", "Pop"
            );
            println!("{}", "-".repeat(75));
            for row in decades.rows() {
                let v = |c: Column| row.means.get(c).unwrap_or(f64::NAN);
                println!(
                    "{:<7} {:>7}  {:>5.2} {:>5.2} {:>5.2} {:>5.2} {:>5.2} {:>5.2} {:>5.2} {:>6.1} {:>4.0}",
                    format!("{}s", row.decade),
                    row.track_count,
                    v(Column::Danceability),
                    v(Column::Energy),
                    v(Column::Speechiness),
                    v(Column::Acousticness),
                    v(Column::Instrumentalness),
                    v(Column::Liveness),
                    v(Column::Valence),
                    v(Column::Tempo),
                    v(Column::Popularity),
                );
            }

            println!();
            println!("Dnc=Danceability  Eng=Energy  Spc=Speechiness  Acs=Acousticness");
            println!("Ins=Instrumentalness  Liv=Liveness  Val=Valence  Pop=Popularity");
        }

        Commands::Stats => {
            if cli.json {
                print_json(&serde_json::json!({
                    "sources": dataset.sources,
                    "loaded_at": dataset.loaded_at,
                    "total_rows": dataset.report.total_rows,
                    "kept": dataset.report.kept,
                    "rejected": dataset.report.counts_by_reason(),
                    "year_range": dataset.table.year_range(),
                }))?;
                return Ok(());
            }
            print_stats(&dataset, explorer.decade_averages().len());
        }
    }

    Ok(())
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    let out = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{out}");
    Ok(())
}

fn print_payload(payload: &ViewPayload) {
    let title = payload.view().label();
    println!("{title}");
    println!("{}", "=".repeat(title.len()));
    match payload {
        ViewPayload::SongExaminer(view) => print_song_examiner(view),
        ViewPayload::Popularity(view) => print_popularity(view),
    }
}

fn print_stats(dataset: &Dataset, decade_count: usize) {
    println!("Dataset Statistics");
    println!("==================");
    println!("Rows read:        {}", dataset.report.total_rows);
    println!("Tracks kept:      {}", dataset.report.kept);
    println!("Rows dropped:     {}", dataset.report.rejections.len());
    if let Some((first, last)) = dataset.table.year_range() {
        println!("Years:            {first}-{last} ({decade_count} decades)");
    }
    println!("Loaded at:        {}", dataset.loaded_at.format("%Y-%m-%d %H:%M:%S UTC"));
    println!();

    println!("Sources:");
    for path in &dataset.sources {
        println!("  {}", path.display());
    }

    let reasons = dataset.report.counts_by_reason();
    if !reasons.is_empty() {
        println!();
        println!("Dropped rows:");
        for (reason, count) in &reasons {
            println!("  {:<26} {}", reason, count);
        }
    }
}

fn print_song_examiner(view: &SongExaminerView) {
    match view {
        SongExaminerView::Failed { message, .. } => {
            println!("{message}");
        }
        SongExaminerView::Resolved {
            profile,
            decade,
            decade_features,
            ..
        } => {
            println!("{} by {}", profile.name, profile.artist);
            println!("Album:     {} ({})", profile.album, profile.release_date);
            println!("Duration:  {}", profile.duration_display());
            println!("Tempo:     {:.1} BPM", profile.tempo);
            println!("Loudness:  {:.1} dB", profile.loudness);
            if let Some(url) = &profile.album_image_url {
                println!("Cover:     {url}");
            }
            if let Some(url) = &profile.preview_url {
                println!("Preview:   {url}");
            }
            println!();

            println!("{:<18} {:>7} {:>7} {:>7}", "Feature", "Track", format!("{decade}s"), "Diff");
            println!("{}", "-".repeat(42));
            for &column in Column::COMPARABLE.iter() {
                let (Some(t), Some(d)) = (profile.features.get(column), decade_features.get(column)) else {
                    continue;
                };
                println!("{:<18} {:>7.3} {:>7.3} {:>+7.3}", column.label(), t, d, t - d);
            }
        }
    }
}

fn print_popularity(view: &PopularityView) {
    println!(
        "{} of {} tracks have popularity above {}",
        view.popular_track_count, view.track_count, view.popular_threshold
    );

    for panel in &view.panels {
        println!();
        println!("{} by popularity:", panel.feature.label());
        println!("{:>10} {:>7} {:>8}", "Popularity", "Tracks", "Mean");
        println!("{}", "-".repeat(27));
        for row in panel.aggregate.rows.iter().take(15) {
            println!("{:>10} {:>7} {:>8.3}", row.popularity, row.track_count, row.mean);
        }
        if panel.aggregate.rows.len() > 15 {
            println!("{:>10}", "...");
        }
    }

    let Some(heatmap) = &view.heatmap else {
        return;
    };

    println!();
    println!("Correlation with popularity:");
    let Some(pop_row) = heatmap.y_labels.iter().position(|l| l == Column::Popularity.name()) else {
        return;
    };
    for (col, label) in heatmap.x_labels.iter().enumerate() {
        if col == pop_row {
            continue;
        }
        match heatmap.cell(pop_row, col) {
            Some(r) => println!("  {:<18} {:>+6.3}", label, r),
            None => println!("  {:<18} {:>6}", label, "n/a"),
        }
    }
}
