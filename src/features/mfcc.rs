//! Mel-frequency cepstral coefficients.
//!
//! Each frame is Hamming-windowed, transformed with a forward FFT of the full
//! window length, reduced to log mel-band energies and decorrelated with a
//! DCT-II. Coefficient 0 is dropped; it tracks overall loudness.

use std::f64::consts::PI;
use std::sync::Arc;

use rayon::prelude::*;
use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

use super::FeatureError;
use crate::Frame;
use crate::config::FeatureConfig;

/// Floor applied before taking the log of a mel energy.
const LOG_FLOOR: f64 = 1e-10;

pub struct MfccExtractor {
    window_samples: usize,
    hop_samples: usize,
    sample_rate: u32,
    window: Vec<f64>,
    /// Per mel band: (FFT bin, weight) pairs with non-zero weight.
    filterbank: Vec<Vec<(usize, f64)>>,
    /// Row k-1 holds the DCT-II basis for coefficient k.
    dct: Vec<Vec<f64>>,
    fft: Arc<dyn Fft<f64>>,
}

impl MfccExtractor {
    pub fn new(config: &FeatureConfig) -> Result<Self, FeatureError> {
        if config.window_samples < 2 || config.hop_samples == 0 {
            return Err(FeatureError::InvalidConfig(
                "window_samples must be >= 2 and hop_samples > 0".into(),
            ));
        }
        if config.sample_rate == 0 {
            return Err(FeatureError::InvalidConfig("sample_rate must be > 0".into()));
        }
        if config.coefficients == 0 || config.coefficients >= config.mel_bands {
            return Err(FeatureError::InvalidConfig(format!(
                "coefficients ({}) must be between 1 and mel_bands - 1 ({})",
                config.coefficients,
                config.mel_bands.saturating_sub(1)
            )));
        }
        let max_frequency = config.resolved_max_frequency();
        if config.min_frequency < 0.0 || config.min_frequency >= max_frequency {
            return Err(FeatureError::InvalidConfig(format!(
                "min_frequency ({}) must be below the upper band edge ({})",
                config.min_frequency, max_frequency
            )));
        }

        let n = config.window_samples;
        let window: Vec<f64> = (0..n)
            .map(|i| 0.54 - 0.46 * (2.0 * PI * i as f64 / (n - 1) as f64).cos())
            .collect();

        let filterbank = mel_filterbank(
            config.mel_bands,
            n,
            config.sample_rate as f64,
            config.min_frequency,
            max_frequency,
        );

        let bands = config.mel_bands as f64;
        let dct: Vec<Vec<f64>> = (1..=config.coefficients)
            .map(|k| {
                (0..config.mel_bands)
                    .map(|m| (PI * k as f64 * (m as f64 + 0.5) / bands).cos())
                    .collect()
            })
            .collect();

        let fft = FftPlanner::<f64>::new().plan_fft_forward(n);

        Ok(Self {
            window_samples: n,
            hop_samples: config.hop_samples,
            sample_rate: config.sample_rate,
            window,
            filterbank,
            dct,
            fft,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of whole windows that fit in `len` samples.
    pub fn frame_count(&self, len: usize) -> usize {
        if len < self.window_samples {
            0
        } else {
            (len - self.window_samples) / self.hop_samples + 1
        }
    }

    /// Extract one frame per hop. Trailing samples that don't fill a whole
    /// window are ignored.
    pub fn extract(&self, samples: &[f32]) -> Vec<Frame> {
        (0..self.frame_count(samples.len()))
            .into_par_iter()
            .map(|i| {
                let start = i * self.hop_samples;
                self.frame(&samples[start..start + self.window_samples])
            })
            .collect()
    }

    fn frame(&self, samples: &[f32]) -> Frame {
        let mut buffer: Vec<Complex<f64>> = samples
            .iter()
            .zip(&self.window)
            .map(|(&s, &w)| Complex::new(s as f64 * w, 0.0))
            .collect();
        self.fft.process(&mut buffer);

        let log_energies: Vec<f64> = self
            .filterbank
            .iter()
            .map(|band| {
                let energy: f64 = band.iter().map(|&(bin, w)| w * buffer[bin].norm_sqr()).sum();
                energy.max(LOG_FLOOR).ln()
            })
            .collect();

        self.dct
            .iter()
            .map(|basis| basis.iter().zip(&log_energies).map(|(b, e)| b * e).sum())
            .collect()
    }
}

fn hz_to_mel(hz: f64) -> f64 {
    2595.0 * (1.0 + hz / 700.0).log10()
}

fn mel_to_hz(mel: f64) -> f64 {
    700.0 * (10f64.powf(mel / 2595.0) - 1.0)
}

/// Triangular filters spaced evenly on the mel scale between `min_hz` and
/// `max_hz`, over the `fft_size / 2 + 1` non-negative frequency bins.
fn mel_filterbank(
    bands: usize,
    fft_size: usize,
    sample_rate: f64,
    min_hz: f64,
    max_hz: f64,
) -> Vec<Vec<(usize, f64)>> {
    let min_mel = hz_to_mel(min_hz);
    let max_mel = hz_to_mel(max_hz);
    let edges: Vec<f64> = (0..bands + 2)
        .map(|i| mel_to_hz(min_mel + (max_mel - min_mel) * i as f64 / (bands + 1) as f64))
        .collect();

    let bin_hz = sample_rate / fft_size as f64;
    let bins = fft_size / 2 + 1;

    (0..bands)
        .map(|m| {
            let (left, center, right) = (edges[m], edges[m + 1], edges[m + 2]);
            let first = (left / bin_hz).floor() as usize;
            let last = ((right / bin_hz).ceil() as usize).min(bins - 1);
            (first..=last)
                .filter_map(|bin| {
                    let hz = bin as f64 * bin_hz;
                    let weight = if hz > left && hz <= center {
                        (hz - left) / (center - left)
                    } else if hz > center && hz < right {
                        (right - hz) / (right - center)
                    } else {
                        0.0
                    };
                    (weight > 0.0).then_some((bin, weight))
                })
                .collect()
        })
        .collect()
}
