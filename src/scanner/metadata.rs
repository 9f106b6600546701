use lofty::file::TaggedFileExt;
use lofty::prelude::*;
use std::path::Path;

/// Artist tag of an audio file, if it has one. Returns `None` on any read failure.
pub fn read_artist(path: &Path) -> Option<String> {
    let tagged_file = match lofty::read_from_path(path) {
        Ok(f) => f,
        Err(e) => {
            log::debug!("Could not read tags from {}: {}", path.display(), e);
            return None;
        }
    };

    // Try primary tag, then fall back
    let tag = tagged_file
        .primary_tag()
        .or_else(|| tagged_file.first_tag())?;

    tag.artist()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
