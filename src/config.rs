//! # Configuration
//!
//! Settings for rendering and transcription, read from a YAML file:
//!
//! ```yaml
//! ticks-per-beat: 960
//! transcription:
//!   grid: 0.25
//!   tempo: 96
//!   feel: swing
//!   swing-ratio: 0.6
//!   poll-interval-ms: 10
//! ```
//!
//! Every key is optional. Values that are merely out of range are clamped
//! with a warning; values that cannot mean anything (a zero tempo, an unknown
//! feel) are rejected with [`AldaError::Config`].

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::error::AldaError;
use crate::midi::DEFAULT_TICKS_PER_BEAT;
use crate::transcribe::{QuantizeOptions, DEFAULT_POLL_INTERVAL};

/// Largest metrical division an SMF header can hold (the top bit flags SMPTE)
const MAX_TICKS_PER_BEAT: u32 = 0x7FFF;

/// Grid sizes are limited to a whole note
const MAX_GRID_BEATS: f64 = 4.0;

/// Swing ratios are kept strictly inside (0, 1)
const MIN_SWING_RATIO: f64 = 0.01;
const MAX_SWING_RATIO: f64 = 0.99;

/// Raw configuration for YAML deserialization
#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "kebab-case")]
struct RawConfig {
    ticks_per_beat: Option<u32>,
    transcription: Option<RawTranscription>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "kebab-case")]
struct RawTranscription {
    grid: Option<f64>,
    tempo: Option<f64>,
    feel: Option<String>,
    swing_ratio: Option<f64>,
    poll_interval_ms: Option<u64>,
}

/// Validated configuration
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Resolution of written MIDI files
    pub ticks_per_beat: u16,
    pub transcription: TranscriptionConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptionConfig {
    pub options: QuantizeOptions,
    /// Interval between polls while recording
    pub poll_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ticks_per_beat: DEFAULT_TICKS_PER_BEAT,
            transcription: TranscriptionConfig::default(),
        }
    }
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            options: QuantizeOptions::default(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl Config {
    /// Parse and validate a YAML configuration.
    ///
    /// # Example
    /// ```
    /// use aldakit::config::Config;
    /// use aldakit::transcribe::Feel;
    ///
    /// let config = Config::from_yaml("transcription: { feel: triplet, tempo: 90 }").unwrap();
    /// assert_eq!(config.ticks_per_beat, 480);
    /// assert_eq!(config.transcription.options.feel, Feel::Triplet);
    /// assert_eq!(config.transcription.options.tempo, 90.0);
    /// ```
    pub fn from_yaml(source: &str) -> Result<Self, AldaError> {
        // an empty document is an empty configuration
        let raw: RawConfig = if source.trim().is_empty() {
            RawConfig::default()
        } else {
            serde_yaml::from_str(source)?
        };

        let mut config = Config::default();

        if let Some(ticks) = raw.ticks_per_beat {
            if ticks == 0 || ticks > MAX_TICKS_PER_BEAT {
                return Err(AldaError::Config(format!(
                    "ticks-per-beat must be between 1 and {MAX_TICKS_PER_BEAT}, got {ticks}"
                )));
            }
            config.ticks_per_beat = ticks as u16;
        }

        if let Some(raw) = raw.transcription {
            config.transcription = TranscriptionConfig::from_raw(raw)?;
        }

        Ok(config)
    }

    /// Read and validate a configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, AldaError> {
        let source = std::fs::read_to_string(path)?;
        Self::from_yaml(&source)
    }
}

impl TranscriptionConfig {
    fn from_raw(raw: RawTranscription) -> Result<Self, AldaError> {
        let mut config = TranscriptionConfig::default();
        let options = &mut config.options;

        if let Some(grid) = raw.grid {
            if !grid.is_finite() || grid <= 0.0 {
                return Err(AldaError::Config(format!("grid must be a positive number of beats, got {grid}")));
            }
            if grid > MAX_GRID_BEATS {
                warn!(grid, "grid larger than a whole note; clamping");
            }
            options.grid = grid.min(MAX_GRID_BEATS);
        }

        if let Some(tempo) = raw.tempo {
            if !tempo.is_finite() || tempo <= 0.0 {
                return Err(AldaError::Config(format!("tempo must be positive, got {tempo}")));
            }
            options.tempo = tempo;
        }

        if let Some(feel) = raw.feel {
            options.feel = feel.parse()?;
        }

        if let Some(ratio) = raw.swing_ratio {
            if !ratio.is_finite() {
                return Err(AldaError::Config("swing-ratio must be a number".to_string()));
            }
            let clamped = ratio.clamp(MIN_SWING_RATIO, MAX_SWING_RATIO);
            if clamped != ratio {
                warn!(ratio, clamped, "swing-ratio outside (0, 1); clamping");
            }
            options.swing_ratio = clamped;
        }

        if let Some(ms) = raw.poll_interval_ms {
            if ms == 0 {
                warn!("poll-interval-ms of 0 would spin; using 1");
            }
            config.poll_interval = Duration::from_millis(ms.max(1));
        }

        Ok(config)
    }
}
