//! Per-track consolidation of overlapping candidates.

use std::sync::Arc;

use super::{Candidate, Segment, by_score_desc};
use crate::config::MatchConfig;

/// Collapse one track's candidates into maximal segments on the query timeline.
///
/// Candidates are visited best score first; those more than
/// `flatten_tolerance` below the best are ignored. Each query frame takes the
/// score of the first candidate covering it. Runs of covered frames become
/// segments (scored by their mean), and segments separated by at most
/// `gap_tolerance` uncovered frames are merged.
///
/// The result is sorted by query start and non-overlapping.
pub fn flatten(mut candidates: Vec<Candidate>, query_len: usize, config: &MatchConfig) -> Vec<Segment> {
    candidates.sort_by(|a, b| {
        by_score_desc(a.score, b.score)
            .then(a.query_start.cmp(&b.query_start))
            .then(a.track_offset.cmp(&b.track_offset))
    });

    let Some(best) = candidates.first() else {
        return Vec::new();
    };
    let track = Arc::clone(&best.track);
    let lower_bound = best.score - config.flatten_tolerance;

    let mut scores: Vec<Option<f64>> = vec![None; query_len];
    for c in candidates.iter().take_while(|c| c.score >= lower_bound) {
        let end = c.query_end().min(query_len);
        for slot in scores[c.query_start.min(end)..end].iter_mut() {
            if slot.is_none() {
                *slot = Some(c.score);
            }
        }
    }

    merge_gaps(covered_runs(&scores, &track), config.gap_tolerance)
}

/// Turn each maximal run of filled positions into a segment.
fn covered_runs(scores: &[Option<f64>], track: &Arc<str>) -> Vec<Segment> {
    let mut runs = Vec::new();
    let mut total = 0.0;
    let mut count = 0;

    for (i, slot) in scores.iter().enumerate() {
        match slot {
            Some(score) => {
                total += score;
                count += 1;
            }
            None if count > 0 => {
                runs.push(Segment::new(total / count as f64, i - count, count, track));
                total = 0.0;
                count = 0;
            }
            None => {}
        }
    }
    if count > 0 {
        runs.push(Segment::new(total / count as f64, scores.len() - count, count, track));
    }

    runs
}

/// Merge neighbours separated by at most `tolerance` frames. The merged score
/// is weighted by the two segments' frame counts; the merged span includes the gap.
fn merge_gaps(mut segments: Vec<Segment>, tolerance: usize) -> Vec<Segment> {
    segments.sort_by_key(|s| s.query_start);

    let mut merged = Vec::with_capacity(segments.len());
    let mut iter = segments.into_iter();
    let Some(mut current) = iter.next() else {
        return merged;
    };

    for next in iter {
        let gap = next.query_start.saturating_sub(current.query_end());
        if gap <= tolerance {
            let a = current.frame_count as f64;
            let b = next.frame_count as f64;
            let score = (current.score * a + next.score * b) / (a + b);
            let span = next.query_end().max(current.query_end()) - current.query_start;
            current = Segment::new(score, current.query_start, span, &current.track);
        } else {
            merged.push(std::mem::replace(&mut current, next));
        }
    }
    merged.push(current);

    merged
}
