pub mod filename;
pub mod metadata;

use crate::SUPPORTED_EXTENSIONS;
use crate::config::FeatureConfig;
use crate::db::Database;
use crate::db::models::NewReference;
use crate::features::FeatureError;
use crate::features::mfcc::MfccExtractor;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Database error: {0}")]
    Db(#[from] crate::db::DbError),
    #[error("Feature extraction error: {0}")]
    Features(#[from] FeatureError),
    #[error("Thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

#[derive(Debug)]
pub struct IndexResult {
    pub scanned: u64,
    pub indexed: u64,
    pub skipped: u64,
    pub errors: u64,
}

/// A file waiting to be indexed.
struct PendingFile {
    path: PathBuf,
    file_size: i64,
    file_modified: String,
}

/// Walk `paths` for audio files and add their feature sequences to the catalogue.
///
/// Files already catalogued with the same size and mtime are skipped unless
/// `force` is set. Extraction runs on `jobs` threads a chunk at a time and
/// each chunk is written before the next starts, so an interrupted run keeps
/// its progress. A file that fails to decode is logged and counted, not fatal.
pub fn index(
    db: &Database,
    paths: &[PathBuf],
    force: bool,
    jobs: usize,
    features: &FeatureConfig,
) -> std::result::Result<IndexResult, IndexError> {
    db.ensure_feature_params(features)?;
    let extractor = MfccExtractor::new(features)?;

    let audio_files = collect_audio_files(paths);

    let mut result = IndexResult {
        scanned: audio_files.len() as u64,
        indexed: 0,
        skipped: 0,
        errors: 0,
    };

    let mut pending = Vec::new();
    for path in audio_files {
        match pending_file(db, path, force) {
            Ok(Some(file)) => pending.push(file),
            Ok(None) => result.skipped += 1,
            Err(e) => {
                log::warn!("Error scanning: {}", e);
                result.errors += 1;
            }
        }
    }

    if pending.is_empty() {
        log::info!("Nothing new to index");
        return Ok(result);
    }

    log::info!("Indexing {} files with {} workers", pending.len(), jobs);

    let pb = ProgressBar::new(pending.len() as u64);
    pb.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-"),
    );

    let jobs = jobs.max(1);
    let pool = rayon::ThreadPoolBuilder::new().num_threads(jobs).build()?;

    for chunk in pending.chunks(jobs * 2) {
        let references: Vec<_> = pool.install(|| {
            use rayon::prelude::*;
            chunk
                .par_iter()
                .map(|file| {
                    let reference = build_reference(&extractor, file);
                    pb.inc(1);
                    (file, reference)
                })
                .collect()
        });

        for (file, reference) in references {
            match reference {
                Ok(reference) => match db.upsert_reference(&reference) {
                    Ok(_) => result.indexed += 1,
                    Err(e) => {
                        log::error!("DB error storing {}: {}", file.path.display(), e);
                        result.errors += 1;
                    }
                },
                Err(e) => {
                    log::warn!("Skipping {}: {}", file.path.display(), e);
                    result.errors += 1;
                }
            }
        }

        pb.set_message(format!("{} indexed, {} failed", result.indexed, result.errors));
    }

    pb.finish_with_message(format!(
        "Done: {} indexed, {} failed",
        result.indexed, result.errors
    ));

    Ok(result)
}

/// Every supported audio file under `paths`, sorted for a stable indexing order.
fn collect_audio_files(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = paths
        .iter()
        .flat_map(|root| WalkDir::new(root).follow_links(true).into_iter())
        .filter_map(|e| match e {
            Ok(entry) => Some(entry),
            Err(err) => {
                log::warn!("Cannot read directory entry: {}", err);
                None
            }
        })
        .filter(|entry| entry.file_type().is_file() && is_supported(entry.path()))
        .map(walkdir::DirEntry::into_path)
        .collect();
    files.sort();
    files.dedup();
    files
}

fn is_supported(path: &Path) -> bool {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();
    SUPPORTED_EXTENSIONS.contains(&ext.as_str())
}

/// `None` if the file is already catalogued and unchanged.
fn pending_file(
    db: &Database,
    path: PathBuf,
    force: bool,
) -> std::result::Result<Option<PendingFile>, IndexError> {
    let meta = std::fs::metadata(&path)?;
    let file_size = meta.len() as i64;
    let file_modified = format_mtime(&meta);

    if !force && db.is_unchanged(&path.to_string_lossy(), file_size, &file_modified)? {
        return Ok(None);
    }

    Ok(Some(PendingFile {
        path,
        file_size,
        file_modified,
    }))
}

fn build_reference(
    extractor: &MfccExtractor,
    file: &PendingFile,
) -> std::result::Result<NewReference, FeatureError> {
    let extracted = extractor.extract_file(&file.path)?;
    let parsed = filename::parse_path(&file.path);
    let artist = parsed.artist.or_else(|| metadata::read_artist(&file.path));

    Ok(NewReference {
        file_path: file.path.to_string_lossy().to_string(),
        file_size: file.file_size,
        file_modified: file.file_modified.clone(),
        artist,
        title: parsed.title,
        duration_secs: Some(extracted.duration_secs),
        frames: extracted.frames,
    })
}

fn format_mtime(meta: &std::fs::Metadata) -> String {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs().to_string())
        .unwrap_or_default()
}
