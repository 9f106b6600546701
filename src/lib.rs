pub mod config;
pub mod db;
pub mod features;
pub mod matcher;
pub mod scanner;
pub mod similarity;

/// Audio file extensions we can decode (symphonia)
pub const SUPPORTED_EXTENSIONS: &[&str] = &["wav", "flac", "mp3", "ogg"];

/// Application name for XDG paths
pub const APP_NAME: &str = "clipmatch";

/// One feature frame: the cepstral coefficients of a single analysis window.
pub type Frame = Vec<f64>;
