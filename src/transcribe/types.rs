//! Transcription types: recorded notes, raw messages, options and results

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ast::{Node, PartDeclaration, Score};
use crate::error::AldaError;
use crate::notation::{to_nodes, Element};
use crate::time::{self, DEFAULT_TEMPO_BPM};

/// Notes starting closer together than this are one chord (seconds)
pub const CHORD_TOLERANCE_SECONDS: f64 = 0.002;

/// Shorter gaps between notes are absorbed instead of becoming rests (seconds)
pub const MIN_REST_GAP_SECONDS: f64 = 0.05;

/// Lengths strictly inside this band (in beats) are swung under the swing feel
pub const SWING_MIN_BEATS: f64 = 0.15;
pub const SWING_MAX_BEATS: f64 = 0.85;

/// Shortest duration a released note is recorded with (seconds)
pub const MIN_NOTE_SECONDS: f64 = 0.01;

/// Shortest duration a note still held at stop is recorded with (seconds)
pub const MIN_HELD_NOTE_SECONDS: f64 = 0.1;

/// A completed note, timed in seconds since the session started
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RecordedNote {
    pub pitch: u8,
    pub velocity: u8,
    pub start_time: f64,
    pub duration: f64,
}

/// A channel voice message as it arrives from an input port
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawMessage {
    pub status: u8,
    pub data1: u8,
    pub data2: u8,
}

impl RawMessage {
    pub fn note_on(channel: u8, pitch: u8, velocity: u8) -> Self {
        Self {
            status: 0x90 | (channel & 0x0F),
            data1: pitch,
            data2: velocity,
        }
    }

    pub fn note_off(channel: u8, pitch: u8) -> Self {
        Self {
            status: 0x80 | (channel & 0x0F),
            data1: pitch,
            data2: 0,
        }
    }

    /// Build a message from raw port bytes.
    ///
    /// Note messages need all three bytes; other two-byte messages get a zero
    /// second data byte. Anything shorter is rejected.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        match *bytes {
            [status, data1, data2, ..] => Some(Self { status, data1, data2 }),
            [status, data1] if !matches!(status & 0xF0, 0x80 | 0x90) => Some(Self {
                status,
                data1,
                data2: 0,
            }),
            _ => None,
        }
    }
}

/// Rhythmic interpretation applied while quantizing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Feel {
    /// Round to the configured grid
    #[default]
    Straight,
    /// Alternate long and short values inside the swing band
    Swing,
    /// Fixed grid of a third of a beat
    Triplet,
    /// Fixed grid of a fifth of a beat
    Quintuplet,
}

impl Feel {
    /// Tuplet size this feel collapses runs into
    pub fn tuplet_division(&self) -> Option<u32> {
        match self {
            Feel::Triplet => Some(3),
            Feel::Quintuplet => Some(5),
            Feel::Straight | Feel::Swing => None,
        }
    }
}

impl fmt::Display for Feel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Feel::Straight => "straight",
            Feel::Swing => "swing",
            Feel::Triplet => "triplet",
            Feel::Quintuplet => "quintuplet",
        };
        f.write_str(name)
    }
}

impl FromStr for Feel {
    type Err = AldaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "straight" => Ok(Feel::Straight),
            "swing" => Ok(Feel::Swing),
            "triplet" => Ok(Feel::Triplet),
            "quintuplet" => Ok(Feel::Quintuplet),
            other => Err(AldaError::Config(format!(
                "unknown feel '{other}' (expected straight, swing, triplet or quintuplet)"
            ))),
        }
    }
}

/// Quantizer settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct QuantizeOptions {
    /// Grid size in beats (0.25 = sixteenth notes)
    pub grid: f64,
    /// Tempo used to convert recorded seconds into beats
    pub tempo: f64,
    pub feel: Feel,
    /// Share of a swung beat given to the long note
    pub swing_ratio: f64,
}

impl Default for QuantizeOptions {
    fn default() -> Self {
        Self {
            grid: 0.25,
            tempo: DEFAULT_TEMPO_BPM,
            feel: Feel::Straight,
            swing_ratio: 2.0 / 3.0,
        }
    }
}

impl QuantizeOptions {
    /// Grid the durations are rounded to; tuplet feels override the configured grid
    pub fn effective_grid(&self) -> f64 {
        match self.feel {
            Feel::Triplet => 1.0 / 3.0,
            Feel::Quintuplet => 0.2,
            Feel::Straight | Feel::Swing => self.grid,
        }
    }

    pub fn seconds_to_beats(&self, seconds: f64) -> f64 {
        time::seconds_to_beats(seconds, self.tempo)
    }
}

/// What a transcription was quantized with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TranscriptionMetadata {
    pub feel: Feel,
    pub grid: f64,
    pub tempo: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub swing_ratio: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tuplet_division: Option<u32>,
}

impl TranscriptionMetadata {
    pub fn from_options(options: &QuantizeOptions) -> Self {
        Self {
            feel: options.feel,
            grid: options.grid,
            tempo: options.tempo,
            swing_ratio: (options.feel == Feel::Swing).then_some(options.swing_ratio),
            tuplet_division: options.feel.tuplet_division(),
        }
    }
}

/// Quantized notation plus the settings that produced it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcription {
    pub elements: Vec<Element>,
    pub metadata: TranscriptionMetadata,
}

impl Transcription {
    pub fn empty(options: &QuantizeOptions) -> Self {
        Self {
            elements: Vec::new(),
            metadata: TranscriptionMetadata::from_options(options),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Wrap the notation in a part for `instrument`, preceded by the
    /// transcription tempo, ready for the event generator.
    pub fn into_score(self, instrument: &str) -> Score {
        let mut events = vec![Node::attribute("tempo", self.metadata.tempo)];
        events.extend(to_nodes(&self.elements, 4));

        Score::new(vec![Node::Part {
            declaration: PartDeclaration {
                names: vec![instrument.to_string()],
                alias: None,
            },
            events,
        }])
    }
}
