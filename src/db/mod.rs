pub mod models;
pub mod queries;

use crate::config::FeatureConfig;
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Corrupt feature data: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Migration failed: {0}")]
    Migration(String),
    #[error(
        "Catalogue was built with different feature settings \
         (catalogue: {stored:?}, requested: {requested:?})"
    )]
    Incompatible {
        stored: Box<FeatureConfig>,
        requested: Box<FeatureConfig>,
    },
}

pub type Result<T> = std::result::Result<T, DbError>;

/// Schema version written to `user_version`.
const SCHEMA_VERSION: i32 = 1;

/// `catalogue_meta` key holding the extraction settings as JSON.
const FEATURES_KEY: &str = "features";

pub struct Database {
    pub conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    fn init(&self) -> Result<()> {
        // WAL mode for better concurrent read performance
        self.conn.pragma_update(None, "journal_mode", "WAL")?;
        self.conn.pragma_update(None, "synchronous", "NORMAL")?;
        self.migrate()?;
        Ok(())
    }

    fn migrate(&self) -> Result<()> {
        let version: i32 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap_or(0);

        if version > SCHEMA_VERSION {
            return Err(DbError::Migration(format!(
                "catalogue schema v{version} is newer than supported v{SCHEMA_VERSION}"
            )));
        }
        if version < 1 {
            self.migrate_v1()?;
        }

        self.conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
        Ok(())
    }

    /// V1: reference tracks with their feature sequences + catalogue settings
    fn migrate_v1(&self) -> Result<()> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS tracks (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                file_path       TEXT NOT NULL UNIQUE,
                file_size       INTEGER NOT NULL,
                file_modified   TEXT NOT NULL,

                artist          TEXT,
                title           TEXT NOT NULL,
                duration_secs   REAL,

                -- Feature sequence: JSON [[f64; dimensions]; frame_count]
                frame_count     INTEGER NOT NULL,
                dimensions      INTEGER NOT NULL,
                features        TEXT NOT NULL,

                created_at      TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at      TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX IF NOT EXISTS idx_tracks_artist ON tracks(artist);

            CREATE TABLE IF NOT EXISTS catalogue_meta (
                key     TEXT PRIMARY KEY,
                value   TEXT NOT NULL
            );
            ",
        )?;
        Ok(())
    }

    /// Extraction settings this catalogue was built with, if any track was added yet.
    pub fn feature_params(&self) -> Result<Option<FeatureConfig>> {
        let stored: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM catalogue_meta WHERE key = ?1",
                [FEATURES_KEY],
                |row| row.get(0),
            )
            .optional()?;
        Ok(stored.map(|json| serde_json::from_str(&json)).transpose()?)
    }

    /// Record `config` on first use; afterwards require every caller to use the same settings.
    pub fn ensure_feature_params(&self, config: &FeatureConfig) -> Result<()> {
        match self.feature_params()? {
            Some(stored) if stored == *config => Ok(()),
            Some(stored) => Err(DbError::Incompatible {
                stored: Box::new(stored),
                requested: Box::new(config.clone()),
            }),
            None => {
                self.conn.execute(
                    "INSERT INTO catalogue_meta (key, value) VALUES (?1, ?2)",
                    rusqlite::params![FEATURES_KEY, serde_json::to_string(config)?],
                )?;
                Ok(())
            }
        }
    }

    /// Fail if the catalogue was built with settings other than `config`.
    /// An empty catalogue is compatible with anything.
    pub fn check_feature_params(&self, config: &FeatureConfig) -> Result<()> {
        match self.feature_params()? {
            Some(stored) if stored != *config => Err(DbError::Incompatible {
                stored: Box::new(stored),
                requested: Box::new(config.clone()),
            }),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_in_memory_migrates() {
        let db = Database::open_in_memory().unwrap();
        let version: i32 = db
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }

    #[test]
    fn test_reopen_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("catalogue.db");
        {
            let db = Database::open(&path).unwrap();
            db.ensure_feature_params(&FeatureConfig::default()).unwrap();
        }
        let db = Database::open(&path).unwrap();
        assert_eq!(db.feature_params().unwrap(), Some(FeatureConfig::default()));
    }

    #[test]
    fn test_newer_schema_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("future.db");
        {
            let conn = Connection::open(&path).unwrap();
            conn.pragma_update(None, "user_version", SCHEMA_VERSION + 1).unwrap();
        }
        assert!(matches!(Database::open(&path), Err(DbError::Migration(_))));
    }

    #[test]
    fn test_feature_params_recorded_once() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(db.feature_params().unwrap(), None);

        let config = FeatureConfig::default();
        db.ensure_feature_params(&config).unwrap();
        db.ensure_feature_params(&config).unwrap();

        let other = FeatureConfig {
            hop_samples: 16_384,
            ..FeatureConfig::default()
        };
        assert!(matches!(
            db.ensure_feature_params(&other),
            Err(DbError::Incompatible { .. })
        ));
        assert!(db.check_feature_params(&other).is_err());
        assert!(db.check_feature_params(&config).is_ok());
    }

    #[test]
    fn test_empty_catalogue_compatible() {
        let db = Database::open_in_memory().unwrap();
        let odd = FeatureConfig {
            mel_bands: 12,
            coefficients: 6,
            ..FeatureConfig::default()
        };
        assert!(db.check_feature_params(&odd).is_ok());
    }
}
