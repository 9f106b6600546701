use std::path::Path;

/// Track identity derived from a file name.
#[derive(Debug, Default, PartialEq)]
pub struct ParsedName {
    pub artist: Option<String>,
    pub title: String,
}

/// Split the file stem on the first `" - "` into artist and title.
/// Without a separator the whole stem is the title.
pub fn parse_path(path: &Path) -> ParsedName {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();

    match stem.split_once(" - ") {
        Some((artist, title)) if !artist.trim().is_empty() && !title.trim().is_empty() => {
            ParsedName {
                artist: Some(artist.trim().to_string()),
                title: title.trim().to_string(),
            }
        }
        _ => ParsedName {
            artist: None,
            title: stem.trim().to_string(),
        },
    }
}
