pub mod decode;
pub mod mfcc;

use crate::Frame;
use crate::config::FeatureConfig;
use mfcc::MfccExtractor;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FeatureError {
    #[error("Decode error: {0}")]
    Decode(#[from] decode::DecodeError),
    #[error("{path}: sample rate is {found} Hz, expected {expected} Hz")]
    SampleRate {
        path: String,
        found: u32,
        expected: u32,
    },
    #[error("Invalid feature configuration: {0}")]
    InvalidConfig(String),
}

/// Feature sequence of one decoded file.
#[derive(Debug)]
pub struct Extracted {
    pub frames: Vec<Frame>,
    pub duration_secs: f64,
}

impl MfccExtractor {
    /// Decode `path` and extract its feature sequence.
    pub fn extract_file(&self, path: &Path) -> Result<Extracted, FeatureError> {
        let pcm = decode::load_pcm(path)?;
        if pcm.sample_rate != self.sample_rate() {
            return Err(FeatureError::SampleRate {
                path: path.display().to_string(),
                found: pcm.sample_rate,
                expected: self.sample_rate(),
            });
        }
        let frames = self.extract(&pcm.samples);
        log::debug!(
            "{}: {} frames from {:.1}s of audio",
            path.display(),
            frames.len(),
            pcm.duration_secs()
        );
        Ok(Extracted {
            frames,
            duration_secs: pcm.duration_secs(),
        })
    }
}

/// One-shot extraction for a single file (e.g. the query clip).
pub fn extract_file(path: &Path, config: &FeatureConfig) -> Result<Extracted, FeatureError> {
    MfccExtractor::new(config)?.extract_file(path)
}
