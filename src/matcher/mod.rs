//! Matching a query clip against the catalogue.
//!
//! Per track: [`search::search`] finds every locally aligned run, then
//! [`flatten::flatten`] collapses them into segments on the query timeline.
//! Tracks are processed in parallel, a chunk at a time, so only a bounded
//! number of feature sequences are held in memory. Once the catalogue is
//! exhausted, [`dedup::deduplicate`] resolves overlaps between tracks and
//! [`report::chronological`] orders the surviving claims.

pub mod dedup;
pub mod flatten;
pub mod report;
pub mod search;

use std::cmp::Ordering;
use std::sync::Arc;

use rayon::prelude::*;
use thiserror::Error;

use crate::Frame;
use crate::config::MatchConfig;
use crate::db::DbError;
use crate::db::models::ReferenceTrack;
use crate::similarity::cosine_similarity;

#[derive(Error, Debug)]
pub enum MatchError {
    #[error("Catalogue read failed: {0}")]
    Catalogue(#[from] DbError),
    #[error("Track \"{track}\" has {found}-dimensional frames, query has {expected}")]
    Dimensions {
        track: String,
        expected: usize,
        found: usize,
    },
    #[error("Thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// A raw alignment run from [`search::search`].
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    /// Mean frame similarity over the run.
    pub score: f64,
    /// Track frame aligned with query frame 0; the run covers track frames
    /// `track_offset + query_start ..`.
    pub track_offset: usize,
    pub query_start: usize,
    pub frame_count: usize,
    pub track: Arc<str>,
}

impl Candidate {
    pub fn query_end(&self) -> usize {
        self.query_start + self.frame_count
    }
}

/// A stretch of the query attributed to one track. Produced by
/// consolidation; claims surviving deduplication are trimmed copies.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub score: f64,
    pub query_start: usize,
    pub frame_count: usize,
    pub track: Arc<str>,
}

impl Segment {
    pub fn new(score: f64, query_start: usize, frame_count: usize, track: &Arc<str>) -> Self {
        Self {
            score,
            query_start,
            frame_count,
            track: Arc::clone(track),
        }
    }

    pub fn query_end(&self) -> usize {
        self.query_start + self.frame_count
    }

    /// Same track and score over a narrower range.
    pub fn trimmed(&self, query_start: usize, frame_count: usize) -> Self {
        Self::new(self.score, query_start, frame_count, &self.track)
    }
}

/// Higher scores first.
pub(crate) fn by_score_desc(a: f64, b: f64) -> Ordering {
    b.total_cmp(&a)
}

/// Progress hooks for a catalogue match. Called from worker threads.
pub trait MatchObserver: Sync {
    /// A track finished search and consolidation.
    fn track_done(&self, _label: &str, _candidates: usize, _segments: usize) {}
    /// All tracks are done and `pooled` segments are about to be deduplicated.
    fn searching_done(&self, _tracks: usize, _pooled: usize) {}
}

/// Observer that ignores everything.
pub struct Silent;

impl MatchObserver for Silent {}

pub struct MatchOutcome {
    /// Surviving claims in chronological order.
    pub claims: Vec<Segment>,
    pub tracks_searched: usize,
    pub segments_pooled: usize,
}

/// Search and consolidate a single reference track.
/// Returns the number of raw candidates alongside the segments.
pub fn match_track(
    query: &[Frame],
    track: &ReferenceTrack,
    config: &MatchConfig,
) -> (usize, Vec<Segment>) {
    let label: Arc<str> = Arc::from(track.label());
    let candidates = search::search(query, &track.frames, &label, config, cosine_similarity);
    let found = candidates.len();
    (found, flatten::flatten(candidates, query.len(), config))
}

/// Match `query` against every track the catalogue yields.
///
/// Tracks are read `2 * jobs` at a time and processed on a pool of `jobs`
/// threads. A catalogue read error aborts the whole match.
pub fn match_catalogue<I>(
    query: &[Frame],
    catalogue: I,
    config: &MatchConfig,
    jobs: usize,
    observer: &dyn MatchObserver,
) -> Result<MatchOutcome, MatchError>
where
    I: IntoIterator<Item = Result<ReferenceTrack, DbError>>,
{
    let jobs = jobs.max(1);
    let pool = rayon::ThreadPoolBuilder::new().num_threads(jobs).build()?;
    let chunk_size = jobs * 2;
    let dimensions = query.first().map(Vec::len);

    let mut stream = catalogue.into_iter();
    let mut pooled: Vec<Segment> = Vec::new();
    let mut tracks_searched = 0;

    loop {
        let chunk: Vec<ReferenceTrack> = stream
            .by_ref()
            .take(chunk_size)
            .collect::<Result<_, _>>()?;
        if chunk.is_empty() {
            break;
        }

        if let Some(expected) = dimensions {
            for track in &chunk {
                if let Some(bad) = track.frames.iter().find(|f| f.len() != expected) {
                    return Err(MatchError::Dimensions {
                        track: track.label(),
                        expected,
                        found: bad.len(),
                    });
                }
            }
        }

        let results: Vec<Vec<Segment>> = pool.install(|| {
            chunk
                .par_iter()
                .map(|track| {
                    let (found, segments) = match_track(query, track, config);
                    log::debug!(
                        "{}: {} candidates -> {} segments",
                        track.label(),
                        found,
                        segments.len()
                    );
                    observer.track_done(&track.label(), found, segments.len());
                    segments
                })
                .collect()
        });

        tracks_searched += chunk.len();
        pooled.extend(results.into_iter().flatten());
    }

    let segments_pooled = pooled.len();
    observer.searching_done(tracks_searched, segments_pooled);
    log::info!(
        "Searched {} tracks, {} segments pooled",
        tracks_searched,
        segments_pooled
    );

    let claims = dedup::deduplicate(pooled, query.len(), config.min_run_length);

    Ok(MatchOutcome {
        claims: report::chronological(claims),
        tracks_searched,
        segments_pooled,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

    /// Unit vector along axis `i`; distinct axes have similarity 0.
    pub(crate) fn basis(i: usize, dim: usize) -> Frame {
        let mut v = vec![0.0; dim];
        v[i % dim] = 1.0;
        v
    }

    pub(crate) fn thresholds() -> MatchConfig {
        MatchConfig {
            sim_threshold: 0.9,
            score_threshold: 0.95,
            min_run_length: 3,
            flatten_tolerance: 0.004,
            gap_tolerance: 3,
        }
    }

    fn track(id: i64, artist: Option<&str>, title: &str, frames: Vec<Frame>) -> ReferenceTrack {
        ReferenceTrack {
            id,
            artist: artist.map(str::to_string),
            title: title.to_string(),
            frames,
        }
    }

    fn run(query: &[Frame], tracks: Vec<ReferenceTrack>) -> MatchOutcome {
        match_catalogue(
            query,
            tracks.into_iter().map(Ok),
            &thresholds(),
            2,
            &Silent,
        )
        .unwrap()
    }

    #[test]
    fn test_identical_track_single_claim() {
        let query: Vec<Frame> = (0..10).map(|i| basis(i, 64)).collect();
        let outcome = run(&query, vec![track(1, Some("A"), "Same", query.clone())]);

        assert_eq!(outcome.claims.len(), 1);
        let claim = &outcome.claims[0];
        assert_eq!((claim.query_start, claim.frame_count), (0, 10));
        assert!((claim.score - 1.0).abs() < 1e-12);
        assert_eq!(&*claim.track, "A - Same");
    }

    #[test]
    fn test_query_shorter_than_min_run() {
        let query: Vec<Frame> = (0..2).map(|i| basis(i, 16)).collect();
        let outcome = run(&query, vec![track(1, None, "T", query.clone())]);
        assert!(outcome.claims.is_empty());
        assert_eq!(outcome.tracks_searched, 1);
    }

    #[test]
    fn test_empty_catalogue() {
        let query: Vec<Frame> = (0..10).map(|i| basis(i, 16)).collect();
        let outcome = run(&query, Vec::new());
        assert!(outcome.claims.is_empty());
        assert_eq!(outcome.tracks_searched, 0);
    }

    #[test]
    fn test_clip_spanning_two_tracks() {
        // Query = last 6 frames of track A followed by 8 frames from track B.
        // B's material sits 10 frames into B, so it lines up at a non-negative offset.
        let a: Vec<Frame> = (0..20).map(|i| basis(i, 80)).collect();
        let b: Vec<Frame> = (60..70).chain(20..40).map(|i| basis(i, 80)).collect();
        let query: Vec<Frame> = a[14..].iter().chain(&b[10..18]).cloned().collect();
        let noise: Vec<Frame> = (40..60).map(|i| basis(i, 80)).collect();

        let outcome = run(
            &query,
            vec![
                track(1, None, "Noise", noise),
                track(2, Some("X"), "B", b),
                track(3, Some("X"), "A", a),
            ],
        );

        assert_eq!(outcome.tracks_searched, 3);
        assert_eq!(outcome.claims.len(), 2);
        assert_eq!(&*outcome.claims[0].track, "X - A");
        assert_eq!((outcome.claims[0].query_start, outcome.claims[0].frame_count), (0, 6));
        assert_eq!(&*outcome.claims[1].track, "X - B");
        assert_eq!((outcome.claims[1].query_start, outcome.claims[1].frame_count), (6, 8));
    }

    #[test]
    fn test_better_track_wins_overlap() {
        // Both tracks cover the whole query; the exact copy beats the slightly detuned one
        let query: Vec<Frame> = (0..12).map(|i| basis(i, 32)).collect();
        let detuned: Vec<Frame> = query
            .iter()
            .map(|f| f.iter().map(|v| v + 0.05).collect())
            .collect();

        let outcome = run(
            &query,
            vec![
                track(1, None, "Detuned", detuned),
                track(2, None, "Exact", query.clone()),
            ],
        );
        assert_eq!(outcome.claims.len(), 1);
        assert_eq!(&*outcome.claims[0].track, "Exact");
        assert_eq!(outcome.segments_pooled, 2);
    }

    #[test]
    fn test_noisy_frame_bridged() {
        let query: Vec<Frame> = (0..16).map(|i| basis(i, 64)).collect();
        let mut reference = query.clone();
        reference[7] = basis(60, 64);

        let outcome = run(&query, vec![track(1, None, "Live", reference)]);
        assert_eq!(outcome.claims.len(), 1);
        assert_eq!((outcome.claims[0].query_start, outcome.claims[0].frame_count), (0, 16));
    }

    #[test]
    fn test_deterministic() {
        let a: Vec<Frame> = (0..30).map(|i| basis(i, 48)).collect();
        let query: Vec<Frame> = a[5..20].to_vec();
        let tracks = || {
            vec![
                track(1, None, "A", a.clone()),
                track(2, None, "A copy", a.clone()),
                track(3, None, "Other", (30..48).map(|i| basis(i, 48)).collect()),
            ]
        };
        let first = run(&query, tracks()).claims;
        let second = run(&query, tracks()).claims;
        assert_eq!(first, second);
        // Equal scores: label order decides
        assert_eq!(&*first[0].track, "A");
    }

    #[test]
    fn test_catalogue_error_aborts() {
        let query: Vec<Frame> = (0..10).map(|i| basis(i, 16)).collect();
        let items = vec![
            Ok(track(1, None, "T", query.clone())),
            Err(DbError::Migration("truncated".into())),
        ];
        let result = match_catalogue(&query, items, &thresholds(), 1, &Silent);
        assert!(matches!(result, Err(MatchError::Catalogue(_))));
    }

    #[test]
    fn test_dimension_mismatch() {
        let query: Vec<Frame> = (0..10).map(|i| basis(i, 16)).collect();
        let wrong: Vec<Frame> = (0..10).map(|i| basis(i, 8)).collect();
        let result = match_catalogue(
            &query,
            vec![Ok(track(1, None, "Wrong", wrong))],
            &thresholds(),
            1,
            &Silent,
        );
        assert!(matches!(
            result,
            Err(MatchError::Dimensions { expected: 16, found: 8, .. })
        ));
    }

    #[test]
    fn test_observer_sees_every_track() {
        struct Counting(AtomicUsize);
        impl MatchObserver for Counting {
            fn track_done(&self, _label: &str, _candidates: usize, _segments: usize) {
                self.0.fetch_add(1, AtomicOrdering::SeqCst);
            }
        }

        let query: Vec<Frame> = (0..10).map(|i| basis(i, 16)).collect();
        let tracks: Vec<_> = (0..7)
            .map(|i| Ok(track(i, None, "T", query.clone())))
            .collect();
        let counter = Counting(AtomicUsize::new(0));
        let outcome = match_catalogue(&query, tracks, &thresholds(), 2, &counter).unwrap();
        assert_eq!(counter.0.load(AtomicOrdering::SeqCst), 7);
        assert_eq!(outcome.tracks_searched, 7);
    }
}
