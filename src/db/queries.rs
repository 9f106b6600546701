use std::collections::VecDeque;

use super::models::{CatalogueStats, NewReference, ReferenceTrack, TrackSummary, track_label};
use super::{Database, Result};
use crate::Frame;
use rusqlite::{OptionalExtension, params};

impl Database {
    /// Insert or update a reference track. Returns the track id.
    pub fn upsert_reference(&self, t: &NewReference) -> Result<i64> {
        let dimensions = t.frames.first().map_or(0, Vec::len);
        let features = serde_json::to_string(&t.frames)?;

        self.conn.execute(
            "INSERT INTO tracks (
                file_path, file_size, file_modified,
                artist, title, duration_secs,
                frame_count, dimensions, features,
                updated_at
            ) VALUES (
                ?1, ?2, ?3,
                ?4, ?5, ?6,
                ?7, ?8, ?9,
                datetime('now')
            )
            ON CONFLICT(file_path) DO UPDATE SET
                file_size = excluded.file_size,
                file_modified = excluded.file_modified,
                artist = excluded.artist,
                title = excluded.title,
                duration_secs = excluded.duration_secs,
                frame_count = excluded.frame_count,
                dimensions = excluded.dimensions,
                features = excluded.features,
                updated_at = datetime('now')
            ",
            params![
                t.file_path, t.file_size, t.file_modified,
                t.artist, t.title, t.duration_secs,
                t.frames.len() as i64, dimensions as i64, features,
            ],
        )?;

        let id: i64 = self.conn.query_row(
            "SELECT id FROM tracks WHERE file_path = ?1",
            params![t.file_path],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    /// True if `file_path` is already catalogued with the same size and mtime.
    pub fn is_unchanged(&self, file_path: &str, file_size: i64, file_modified: &str) -> Result<bool> {
        let existing: Option<(i64, String)> = self
            .conn
            .query_row(
                "SELECT file_size, file_modified FROM tracks WHERE file_path = ?1",
                params![file_path],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        Ok(matches!(existing, Some((size, mtime)) if size == file_size && mtime == file_modified))
    }

    pub fn track_count(&self) -> Result<i64> {
        Ok(self.conn.query_row("SELECT COUNT(*) FROM tracks", [], |row| row.get(0))?)
    }

    /// Stream every reference track in id order, reading `batch` rows at a time.
    pub fn references(&self, batch: usize) -> CatalogueStream<'_> {
        CatalogueStream {
            db: self,
            batch: batch.max(1),
            last_id: 0,
            buffer: VecDeque::new(),
            exhausted: false,
        }
    }

    /// Up to `limit` tracks with id greater than `after`.
    fn reference_page(&self, after: i64, limit: usize) -> Result<Vec<ReferenceTrack>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, artist, title, features
             FROM tracks
             WHERE id > ?1
             ORDER BY id
             LIMIT ?2",
        )?;
        let rows: Vec<(i64, Option<String>, String, String)> = stmt
            .query_map(params![after, limit as i64], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(id, artist, title, features)| -> Result<ReferenceTrack> {
                let frames: Vec<Frame> = serde_json::from_str(&features)?;
                Ok(ReferenceTrack { id, artist, title, frames })
            })
            .collect()
    }

    /// All tracks without their feature data, ordered by label.
    pub fn list_tracks(&self) -> Result<Vec<TrackSummary>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, artist, title, frame_count, duration_secs, file_path
             FROM tracks
             ORDER BY COALESCE(artist, ''), title",
        )?;
        let rows = stmt
            .query_map([], |row| {
                let artist: Option<String> = row.get(1)?;
                let title: String = row.get(2)?;
                Ok(TrackSummary {
                    id: row.get(0)?,
                    label: track_label(artist.as_deref(), &title),
                    frame_count: row.get(3)?,
                    duration_secs: row.get(4)?,
                    file_path: row.get(5)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn stats(&self) -> Result<CatalogueStats> {
        let (total_tracks, total_frames, total_duration_hours): (i64, i64, f64) =
            self.conn.query_row(
                "SELECT COUNT(*), COALESCE(SUM(frame_count), 0),
                        COALESCE(SUM(duration_secs), 0.0) / 3600.0
                 FROM tracks",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )?;

        let dimensions: Option<i64> = self
            .conn
            .query_row(
                "SELECT dimensions FROM tracks WHERE frame_count > 0 LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;

        Ok(CatalogueStats {
            total_tracks,
            total_frames,
            total_duration_hours,
            dimensions,
        })
    }

    /// Copy every track of `other` into this catalogue. Both must have been
    /// built with the same feature settings. Returns the number of tracks copied.
    pub fn merge_from(&self, other: &Database) -> Result<usize> {
        let Some(params) = other.feature_params()? else {
            return Ok(0);
        };

        let tx = self.conn.unchecked_transaction()?;
        // Inside the transaction: a failed copy records nothing
        self.ensure_feature_params(&params)?;
        let mut stmt = other.conn.prepare(
            "SELECT file_path, file_size, file_modified, artist, title, duration_secs,
                    frame_count, dimensions, features
             FROM tracks
             ORDER BY id",
        )?;
        let mut rows = stmt.query([])?;
        let mut copied = 0;

        while let Some(row) = rows.next()? {
            let file_path: String = row.get(0)?;
            tx.execute(
                "INSERT INTO tracks (
                    file_path, file_size, file_modified, artist, title, duration_secs,
                    frame_count, dimensions, features, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, datetime('now'))
                ON CONFLICT(file_path) DO UPDATE SET
                    file_size = excluded.file_size,
                    file_modified = excluded.file_modified,
                    artist = excluded.artist,
                    title = excluded.title,
                    duration_secs = excluded.duration_secs,
                    frame_count = excluded.frame_count,
                    dimensions = excluded.dimensions,
                    features = excluded.features,
                    updated_at = datetime('now')
                ",
                params![
                    file_path,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, Option<f64>>(5)?,
                    row.get::<_, i64>(6)?,
                    row.get::<_, i64>(7)?,
                    row.get::<_, String>(8)?,
                ],
            )?;
            log::debug!("Merged {}", file_path);
            copied += 1;
        }

        drop(rows);
        drop(stmt);
        tx.commit()?;
        Ok(copied)
    }
}

/// One-pass iterator over the catalogue. Yields `None` at the end of the
/// catalogue and `Some(Err(_))` if a read fails part way; nothing further is
/// yielded after an error.
pub struct CatalogueStream<'a> {
    db: &'a Database,
    batch: usize,
    last_id: i64,
    buffer: VecDeque<ReferenceTrack>,
    exhausted: bool,
}

impl Iterator for CatalogueStream<'_> {
    type Item = Result<ReferenceTrack>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() && !self.exhausted {
            match self.db.reference_page(self.last_id, self.batch) {
                Ok(page) => {
                    if page.len() < self.batch {
                        self.exhausted = true;
                    }
                    if let Some(last) = page.last() {
                        self.last_id = last.id;
                    }
                    self.buffer.extend(page);
                }
                Err(e) => {
                    self.exhausted = true;
                    return Some(Err(e));
                }
            }
        }
        self.buffer.pop_front().map(Ok)
    }
}
