//! Frame similarity.
//!
//! Alignment search scores a query frame against a track frame with
//! [`cosine_similarity`] and compares the result with
//! `MatchConfig::sim_threshold`. Both frames come from the same extractor
//! settings, so they always have the same number of coefficients; the
//! matcher rejects a catalogue track whose dimensionality differs before any
//! frame is scored.

/// Cosine of the angle between two MFCC frames, in [-1, 1].
///
/// Frames carry no c0 term, so overall loudness barely moves the score and
/// the angle reflects spectral shape. A silent or degenerate frame (norm
/// close to zero) scores 0.0 against anything, which keeps it below every
/// useful threshold.
pub fn cosine_similarity(query: &[f64], track: &[f64]) -> f64 {
    debug_assert_eq!(query.len(), track.len(), "frame dimensions differ");

    let (dot, norm_q, norm_t) = query
        .iter()
        .zip(track)
        .fold((0.0_f64, 0.0_f64, 0.0_f64), |(dot, nq, nt), (&q, &t)| {
            (dot + q * t, nq + q * q, nt + t * t)
        });

    let denom = norm_q.sqrt() * norm_t.sqrt();
    if denom < 1e-10 { 0.0 } else { dot / denom }
}
