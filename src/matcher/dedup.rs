//! Cross-track resolution of competing claims on the query timeline.

use super::{Segment, by_score_desc};

/// Give every query frame to at most one track.
///
/// Segments from all tracks are visited best score first. Each one claims the
/// first contiguous stretch of still-unclaimed frames in its range: leading
/// frames already taken are skipped, and the stretch ends at the first taken
/// frame after it. Stretches shorter than `min_run_length` are discarded,
/// though the frames they touched stay taken.
///
/// Surviving claims are returned in the order they were accepted.
pub fn deduplicate(mut pool: Vec<Segment>, query_len: usize, min_run_length: usize) -> Vec<Segment> {
    pool.sort_by(|a, b| {
        by_score_desc(a.score, b.score)
            .then(a.query_start.cmp(&b.query_start))
            .then_with(|| a.track.cmp(&b.track))
            .then(a.frame_count.cmp(&b.frame_count))
    });

    let mut occupied = vec![false; query_len];
    let mut claims = Vec::new();

    for segment in &pool {
        let start = segment.query_start.min(query_len);
        let end = segment.query_end().min(query_len);
        let mut hit_count = 0;
        let mut first_hit = start;

        for (pos, taken) in (start..end).zip(occupied[start..end].iter_mut()) {
            if !*taken {
                if hit_count == 0 {
                    first_hit = pos;
                }
                hit_count += 1;
                *taken = true;
            } else if hit_count != 0 {
                break;
            }
        }

        if hit_count > 0 && hit_count >= min_run_length {
            claims.push(segment.trimmed(first_hit, hit_count));
        }
    }

    log::debug!("Deduplicated {} segments into {} claims", pool.len(), claims.len());
    claims
}
