//! Brute-force alignment search between a query and one reference track.

use std::sync::Arc;

use rayon::prelude::*;

use super::Candidate;
use crate::Frame;
use crate::config::MatchConfig;

/// Find every run where the track, shifted by some offset, matches the query.
///
/// For each track offset `i` and query start `k`, query frame `j` is compared
/// with track frame `i + j` for `j = k, k+1, ...` until the first frame pair
/// scoring below `sim_threshold` or the end of either sequence. A run is kept
/// when it has at least `min_run_length` frames and its mean similarity
/// reaches `score_threshold`.
///
/// Overlapping and nested runs of the same alignment are all reported;
/// [`super::flatten`] collapses them. Output is ordered by offset, then
/// query start.
pub fn search<F>(
    query: &[Frame],
    track: &[Frame],
    label: &Arc<str>,
    config: &MatchConfig,
    sim: F,
) -> Vec<Candidate>
where
    F: Fn(&[f64], &[f64]) -> f64 + Sync,
{
    let min_run = config.min_run_length.max(1);
    if query.len() < min_run || track.len() < min_run {
        return Vec::new();
    }

    let sim = &sim;
    (0..track.len())
        .into_par_iter()
        .flat_map_iter(|offset| {
            (0..query.len()).filter_map(move |start| {
                let (frame_count, total) =
                    walk(query, track, offset, start, config.sim_threshold, sim);
                if frame_count < min_run {
                    return None;
                }
                let score = total / frame_count as f64;
                (score >= config.score_threshold).then(|| Candidate {
                    score,
                    track_offset: offset,
                    query_start: start,
                    frame_count,
                    track: Arc::clone(label),
                })
            })
        })
        .collect()
}

/// Length and similarity total of the run starting at query frame `start`.
fn walk<F>(
    query: &[Frame],
    track: &[Frame],
    offset: usize,
    start: usize,
    threshold: f64,
    sim: &F,
) -> (usize, f64)
where
    F: Fn(&[f64], &[f64]) -> f64,
{
    let mut total = 0.0;
    let mut j = start;
    while j < query.len() && offset + j < track.len() {
        let s = sim(track[offset + j].as_slice(), query[j].as_slice());
        if s < threshold {
            break;
        }
        total += s;
        j += 1;
    }
    (j - start, total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::tests::{basis, thresholds};
    use crate::similarity::cosine_similarity;

    fn label() -> Arc<str> {
        Arc::from("Artist - Song")
    }

    #[test]
    fn test_identical_sequences() {
        let query: Vec<Frame> = (0..10).map(|i| basis(i, 64)).collect();
        let found = search(&query, &query, &label(), &thresholds(), cosine_similarity);

        // Only offset 0 lines up; every start leaving >= 3 frames is a candidate
        assert_eq!(found.len(), 8);
        assert!(found.iter().all(|c| c.track_offset == 0));
        assert_eq!(found[0].query_start, 0);
        assert_eq!(found[0].frame_count, 10);
        assert!((found[0].score - 1.0).abs() < 1e-12);
        assert_eq!(found[7].query_start, 7);
        assert_eq!(found[7].frame_count, 3);
    }

    #[test]
    fn test_query_embedded_in_track() {
        let query: Vec<Frame> = (0..6).map(|i| basis(i, 64)).collect();
        let track: Vec<Frame> = (30..37)
            .map(|i| basis(i, 64))
            .chain(query.iter().cloned())
            .chain((40..45).map(|i| basis(i, 64)))
            .collect();

        let found = search(&query, &track, &label(), &thresholds(), cosine_similarity);
        let full = found
            .iter()
            .find(|c| c.query_start == 0)
            .expect("full-length candidate");
        assert_eq!(full.track_offset, 7);
        assert_eq!(full.frame_count, 6);
        for c in &found {
            assert!(c.track_offset + c.query_start + c.frame_count <= track.len());
            assert!(c.query_start + c.frame_count <= query.len());
        }
    }

    #[test]
    fn test_single_bad_frame_breaks_run() {
        let query: Vec<Frame> = (0..10).map(|i| basis(i, 64)).collect();
        let mut track = query.clone();
        track[4] = basis(50, 64);

        let found = search(&query, &track, &label(), &thresholds(), cosine_similarity);
        assert!(found.iter().all(|c| c.query_start + c.frame_count <= 4 || c.query_start >= 5));
        assert!(found.iter().any(|c| c.query_start == 0 && c.frame_count == 4));
        assert!(found.iter().any(|c| c.query_start == 5 && c.frame_count == 5));
    }

    #[test]
    fn test_candidates_respect_thresholds() {
        // Frames drift slowly so neighbouring offsets partially match
        let frame = |x: f64| vec![1.0, x, x * x * 0.1];
        let query: Vec<Frame> = (0..30).map(|i| frame(i as f64 * 0.05)).collect();
        let track: Vec<Frame> = (0..40).map(|i| frame(i as f64 * 0.05 - 0.2)).collect();
        let config = MatchConfig {
            sim_threshold: 0.99,
            score_threshold: 0.995,
            min_run_length: 4,
            ..thresholds()
        };

        let found = search(&query, &track, &label(), &config, cosine_similarity);
        assert!(!found.is_empty());
        for c in &found {
            assert!(c.frame_count >= 4);
            assert!(c.score >= 0.995);
            for j in c.query_start..c.query_start + c.frame_count {
                let s = cosine_similarity(&track[c.track_offset + j], &query[j]);
                assert!(s >= 0.99);
            }
        }
    }

    #[test]
    fn test_short_query_finds_nothing() {
        let query: Vec<Frame> = (0..2).map(|i| basis(i, 8)).collect();
        let found = search(&query, &query, &label(), &thresholds(), cosine_similarity);
        assert!(found.is_empty());
    }

    #[test]
    fn test_low_average_rejected() {
        // Every pair passes the per-frame cutoff but the mean stays below the run cutoff
        let query: Vec<Frame> = (0..5).map(|_| vec![1.0, 0.0]).collect();
        let track: Vec<Frame> = (0..5).map(|_| vec![1.0, 0.4]).collect();
        let found = search(&query, &track, &label(), &thresholds(), cosine_similarity);
        // cos = 1 / sqrt(1.16) ≈ 0.928: above 0.9, below 0.95
        assert!(found.is_empty());
    }
}
