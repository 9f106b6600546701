use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use clipmatch::config::AppConfig;
use clipmatch::db::Database;
use clipmatch::matcher::report::ClaimLine;
use clipmatch::matcher::{self, MatchObserver};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(
    name = "clipmatch",
    version,
    about = "Find which catalogue tracks a short audio clip was taken from"
)]
struct Cli {
    /// Config file (defaults to the platform config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Identify the tracks a query clip was cut from
    Match {
        /// Path to the catalogue database
        catalogue: PathBuf,

        /// Path to the query audio file
        query: PathBuf,

        /// Number of parallel workers (0 = auto-detect from config)
        #[arg(short = 'j', long, default_value = "0")]
        jobs: usize,
    },

    /// Extract features from audio files and add them to a catalogue
    Index {
        /// Path to the catalogue database (created if missing)
        catalogue: PathBuf,

        /// Directories or files to index
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Re-extract files that haven't changed
        #[arg(long)]
        force: bool,

        /// Number of parallel workers (0 = auto-detect from config)
        #[arg(short = 'j', long, default_value = "0")]
        jobs: usize,
    },

    /// Merge other catalogues into one
    Merge {
        /// Destination catalogue (created if missing)
        catalogue: PathBuf,

        /// Catalogues to copy from
        #[arg(required = true)]
        sources: Vec<PathBuf>,
    },

    /// List the tracks in a catalogue
    List {
        /// Path to the catalogue database
        catalogue: PathBuf,
    },

    /// Show catalogue statistics
    Stats {
        /// Path to the catalogue database
        catalogue: PathBuf,
    },
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
    let config = AppConfig::load(cli.config.as_deref());

    match cli.command {
        Commands::Match { catalogue, query, jobs } => {
            let workers = if jobs > 0 { jobs } else { config.resolve_workers() };
            let db = open_existing(&catalogue)?;
            db.check_feature_params(&config.features)
                .context("Catalogue does not match the configured feature settings")?;

            log::info!("Processing query {}", query.display());
            let extracted = clipmatch::features::extract_file(&query, &config.features)
                .with_context(|| format!("Failed to extract features from {}", query.display()))?;
            log::info!(
                "Query: {} frames ({:.1}s)",
                extracted.frames.len(),
                extracted.duration_secs
            );

            let total = db.track_count().context("Failed to read catalogue")?;
            let observer = ProgressObserver::new(total as u64);
            let outcome = matcher::match_catalogue(
                &extracted.frames,
                db.references(workers * 2),
                &config.matching,
                workers,
                &observer,
            )
            .context("Matching failed")?;

            let hop = config.features.hop_seconds();
            for claim in &outcome.claims {
                log::info!(
                    "{} [{}..{}) score {:.5}",
                    claim.track,
                    claim.query_start,
                    claim.query_end(),
                    claim.score
                );
                println!("{}", ClaimLine::new(claim, hop));
            }
            log::info!(
                "Matching done: {} tracks searched, {} claims",
                outcome.tracks_searched,
                outcome.claims.len()
            );
        }

        Commands::Index { catalogue, paths, force, jobs } => {
            let workers = if jobs > 0 { jobs } else { config.resolve_workers() };
            let db = Database::open(&catalogue).context("Failed to open catalogue")?;
            let result = clipmatch::scanner::index(&db, &paths, force, workers, &config.features)
                .context("Indexing failed")?;
            eprintln!(
                "Index complete: {} scanned, {} indexed, {} skipped, {} errors",
                result.scanned, result.indexed, result.skipped, result.errors
            );
        }

        Commands::Merge { catalogue, sources } => {
            let db = Database::open(&catalogue).context("Failed to open catalogue")?;
            let mut total = 0;
            for source in &sources {
                let other = open_existing(source)?;
                let copied = db
                    .merge_from(&other)
                    .with_context(|| format!("Failed to merge {}", source.display()))?;
                eprintln!("Merged {} tracks from {}", copied, source.display());
                total += copied;
            }
            eprintln!("Merge complete: {} tracks from {} catalogues", total, sources.len());
        }

        Commands::List { catalogue } => {
            let db = open_existing(&catalogue)?;
            let tracks = db.list_tracks().context("Query failed")?;

            if tracks.is_empty() {
                println!("Catalogue is empty.");
                return Ok(());
            }

            println!("{:>5} {:<50} {:>6} {:>6}", "Id", "Track", "Frames", "Min");
            println!("{}", "-".repeat(70));
            for t in &tracks {
                // Truncate long labels
                let label: String = if t.label.chars().count() > 50 {
                    format!("{}...", t.label.chars().take(47).collect::<String>())
                } else {
                    t.label.clone()
                };
                println!(
                    "{:>5} {:<50} {:>6} {:>6.1}",
                    t.id,
                    label,
                    t.frame_count,
                    t.duration_secs.unwrap_or(0.0) / 60.0
                );
                log::debug!("{} -> {}", t.id, t.file_path);
            }
        }

        Commands::Stats { catalogue } => {
            let db = open_existing(&catalogue)?;
            let stats = db.stats().context("Failed to get stats")?;
            println!("Catalogue Statistics");
            println!("====================");
            println!("Tracks:           {}", stats.total_tracks);
            println!("Feature frames:   {}", stats.total_frames);
            println!("Total duration:   {:.1} hours", stats.total_duration_hours);
            if let Some(dim) = stats.dimensions {
                println!("Frame dimensions: {}", dim);
            }
            if let Some(params) = db.feature_params().context("Failed to read settings")? {
                println!(
                    "Window / hop:     {} / {} samples at {} Hz ({:.3}s hop)",
                    params.window_samples,
                    params.hop_samples,
                    params.sample_rate,
                    params.hop_seconds()
                );
            }
        }
    }

    Ok(())
}

/// Open a catalogue that must already exist (opening would otherwise create it).
fn open_existing(path: &Path) -> Result<Database> {
    if !path.is_file() {
        anyhow::bail!("Catalogue not found: {}", path.display());
    }
    Database::open(path).with_context(|| format!("Failed to open catalogue {}", path.display()))
}

/// Drives a progress bar on stderr while the catalogue is searched.
struct ProgressObserver {
    pb: ProgressBar,
}

impl ProgressObserver {
    fn new(total: u64) -> Self {
        let pb = ProgressBar::new(total);
        pb.set_style(
            ProgressStyle::with_template(
                "{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} tracks ({eta}) {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-"),
        );
        Self { pb }
    }
}

impl MatchObserver for ProgressObserver {
    fn track_done(&self, label: &str, _candidates: usize, segments: usize) {
        if segments > 0 {
            self.pb.set_message(format!("hit: {label}"));
        }
        self.pb.inc(1);
    }

    fn searching_done(&self, _tracks: usize, _pooled: usize) {
        self.pb.finish_and_clear();
    }
}
