use crate::Frame;

/// Data for inserting or updating a reference track (index phase).
pub struct NewReference {
    pub file_path: String,
    pub file_size: i64,
    pub file_modified: String,

    pub artist: Option<String>,
    pub title: String,

    pub duration_secs: Option<f64>,
    pub frames: Vec<Frame>,
}

/// A reference track read from the catalogue, with its feature sequence.
#[derive(Debug, Clone)]
pub struct ReferenceTrack {
    pub id: i64,
    pub artist: Option<String>,
    pub title: String,
    pub frames: Vec<Frame>,
}

impl ReferenceTrack {
    /// `"<artist> - <title>"`, or just the title when the artist is unknown.
    pub fn label(&self) -> String {
        track_label(self.artist.as_deref(), &self.title)
    }
}

pub fn track_label(artist: Option<&str>, title: &str) -> String {
    match artist {
        Some(artist) => format!("{artist} - {title}"),
        None => title.to_string(),
    }
}

/// Lightweight listing row (no feature data).
#[derive(Debug, Clone)]
pub struct TrackSummary {
    pub id: i64,
    pub label: String,
    pub frame_count: i64,
    pub duration_secs: Option<f64>,
    pub file_path: String,
}

/// Catalogue-wide statistics.
#[derive(Debug)]
pub struct CatalogueStats {
    pub total_tracks: i64,
    pub total_frames: i64,
    pub total_duration_hours: f64,
    pub dimensions: Option<i64>,
}
