//! Chronological ordering and time formatting of claims.

use std::fmt;

use super::{Segment, by_score_desc};

/// A whole-second position split into minutes and seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timestamp {
    pub minutes: u64,
    pub seconds: u64,
}

impl Timestamp {
    /// Time of `frame` given the seconds between frame starts, rounded to
    /// the nearest second.
    pub fn from_frame(frame: usize, hop_seconds: f64) -> Self {
        let total = (frame as f64 * hop_seconds).round() as u64;
        Self {
            minutes: total / 60,
            seconds: total % 60,
        }
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.minutes, self.seconds)
    }
}

/// Sort claims by where they start in the query.
pub fn chronological(mut claims: Vec<Segment>) -> Vec<Segment> {
    claims.sort_by(|a, b| {
        a.query_start
            .cmp(&b.query_start)
            .then_with(|| a.track.cmp(&b.track))
            .then(by_score_desc(a.score, b.score))
    });
    claims
}

/// One output line: `startMin startSec endMin endSec label`.
pub struct ClaimLine<'a> {
    claim: &'a Segment,
    hop_seconds: f64,
}

impl<'a> ClaimLine<'a> {
    pub fn new(claim: &'a Segment, hop_seconds: f64) -> Self {
        Self { claim, hop_seconds }
    }

    pub fn start(&self) -> Timestamp {
        Timestamp::from_frame(self.claim.query_start, self.hop_seconds)
    }

    pub fn end(&self) -> Timestamp {
        Timestamp::from_frame(self.claim.query_end(), self.hop_seconds)
    }
}

impl fmt::Display for ClaimLine<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.start(), self.end(), self.claim.track)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const HOP: f64 = 32768.0 / 44100.0;

    fn seg(start: usize, count: usize, track: &str) -> Segment {
        Segment::new(0.995, start, count, &Arc::from(track))
    }

    #[test]
    fn test_timestamp_rounding() {
        assert_eq!(Timestamp::from_frame(0, HOP), Timestamp { minutes: 0, seconds: 0 });
        // 2 * 0.743 = 1.486 -> 1
        assert_eq!(Timestamp::from_frame(2, HOP).seconds, 1);
        // 3 * 0.743 = 2.229 -> 2
        assert_eq!(Timestamp::from_frame(3, HOP).seconds, 2);
        // 81 * 0.743 = 60.19 -> 1:00
        assert_eq!(Timestamp::from_frame(81, HOP), Timestamp { minutes: 1, seconds: 0 });
    }

    #[test]
    fn test_timestamp_half_rounds_up() {
        assert_eq!(Timestamp::from_frame(1, 0.5).seconds, 1);
        assert_eq!(Timestamp::from_frame(5, 0.5).seconds, 3);
    }

    #[test]
    fn test_chronological_order() {
        let ordered = chronological(vec![seg(40, 12, "C"), seg(0, 12, "A"), seg(20, 12, "B")]);
        let starts: Vec<usize> = ordered.iter().map(|c| c.query_start).collect();
        assert_eq!(starts, vec![0, 20, 40]);
    }

    #[test]
    fn test_claim_line_format() {
        let claim = seg(10, 100, "Hans Zimmer - Time");
        let line = ClaimLine::new(&claim, HOP).to_string();
        // 10 * 0.743 = 7.43 -> 0:07; 110 * 0.743 = 81.7 -> 1:22
        assert_eq!(line, "0 7 1 22 Hans Zimmer - Time");
    }
}
