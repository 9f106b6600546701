use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

/// Application configuration loaded from TOML config file.
/// All fields have defaults; the config file is optional.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Number of parallel workers. 0 = auto-detect (cores / 2, min 1).
    pub workers: usize,
    /// Matching thresholds.
    pub matching: MatchConfig,
    /// Feature extraction parameters. A catalogue remembers the values it
    /// was built with and refuses queries extracted differently.
    pub features: FeatureConfig,
}

/// Thresholds for alignment search, consolidation and deduplication.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MatchConfig {
    /// Per-frame similarity below which a run ends.
    pub sim_threshold: f64,
    /// Minimum mean similarity for a run to become a candidate.
    pub score_threshold: f64,
    /// Minimum matched frames for a candidate and for a final claim.
    pub min_run_length: usize,
    /// How far below a track's best candidate score a candidate may fall
    /// and still take part in consolidation.
    pub flatten_tolerance: f64,
    /// Largest gap (in frames) bridged when merging consolidated segments.
    pub gap_tolerance: usize,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            sim_threshold: 0.985,
            score_threshold: 0.993,
            // 12 frames ≈ 9 seconds at the default hop
            min_run_length: 12,
            flatten_tolerance: 0.004,
            gap_tolerance: 3,
        }
    }
}

/// MFCC extraction parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// Expected sample rate of every input file (Hz).
    pub sample_rate: u32,
    /// Analysis window length in samples (also the FFT size).
    pub window_samples: usize,
    /// Advance between consecutive windows in samples.
    pub hop_samples: usize,
    /// Number of triangular mel filters.
    pub mel_bands: usize,
    /// Cepstral coefficients kept per frame (c0 excluded).
    pub coefficients: usize,
    /// Lower edge of the mel filterbank (Hz).
    pub min_frequency: f64,
    /// Upper edge of the mel filterbank (Hz). 0 = Nyquist.
    pub max_frequency: f64,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            // ~2.97 s window, ~0.74 s hop at 44.1 kHz
            window_samples: 131_072,
            hop_samples: 131_072 / 4,
            mel_bands: 40,
            coefficients: 20,
            min_frequency: 20.0,
            max_frequency: 0.0,
        }
    }
}

impl FeatureConfig {
    /// Seconds between the starts of consecutive frames.
    pub fn hop_seconds(&self) -> f64 {
        self.hop_samples as f64 / self.sample_rate as f64
    }

    /// Upper filterbank edge with the Nyquist default resolved.
    pub fn resolved_max_frequency(&self) -> f64 {
        let nyquist = self.sample_rate as f64 / 2.0;
        if self.max_frequency > 0.0 {
            self.max_frequency.min(nyquist)
        } else {
            nyquist
        }
    }
}

impl AppConfig {
    /// Load config from an explicit path, or from
    /// `~/.config/clipmatch/config.toml` when none is given.
    /// Returns default config if file doesn't exist.
    /// Logs a warning if the file exists but can't be parsed.
    pub fn load(explicit: Option<&Path>) -> Self {
        let config_path = explicit.map(Path::to_path_buf).or_else(Self::config_path);
        match config_path {
            Some(path) if path.exists() => match std::fs::read_to_string(&path) {
                Ok(contents) => match toml::from_str::<AppConfig>(&contents) {
                    Ok(config) => {
                        log::info!("Loaded config from {}", path.display());
                        config
                    }
                    Err(e) => {
                        log::warn!("Failed to parse {}: {}. Using defaults.", path.display(), e);
                        Self::default()
                    }
                },
                Err(e) => {
                    log::warn!("Failed to read {}: {}. Using defaults.", path.display(), e);
                    Self::default()
                }
            },
            Some(path) if explicit.is_some() => {
                log::warn!("Config file {} not found, using defaults", path.display());
                Self::default()
            }
            _ => {
                log::debug!("No config file found, using defaults");
                Self::default()
            }
        }
    }

    /// Resolve worker count: 0 → auto-detect (cores / 2, min 1).
    pub fn resolve_workers(&self) -> usize {
        if self.workers > 0 {
            self.workers
        } else {
            let cores = std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(2);
            (cores / 2).max(1)
        }
    }

    /// Get the config file path.
    fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", crate::APP_NAME)
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }
}
