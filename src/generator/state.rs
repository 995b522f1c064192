//! Interpreter state for one generation pass

use std::collections::HashMap;

use crate::ast::{Duration, Node};
use crate::time::{self, DEFAULT_TEMPO_BPM};

/// Name of the part that collects events written outside any part
pub const DEFAULT_PART: &str = "_default";

/// Highest MIDI channel; parts past the sixteenth share it
pub const MAX_CHANNEL: u8 = 15;

/// Octaves outside this range only produce clamped pitches
pub const OCTAVE_RANGE: std::ops::RangeInclusive<i32> = -1..=10;

/// Performance state of one part
#[derive(Debug, Clone, PartialEq)]
pub struct PartState {
    pub octave: i32,
    /// Beats per minute
    pub tempo: f64,
    /// MIDI velocity 0-127
    pub volume: u8,
    /// Fraction of a note's length that actually sounds (0.0-1.0)
    pub quantization: f64,
    /// Length in beats of notes written without a duration
    pub default_duration: f64,
    /// Cursor in seconds
    pub current_time: f64,
    pub channel: u8,
    pub program: u8,
}

impl PartState {
    pub fn new(channel: u8, program: u8, tempo: f64) -> Self {
        Self {
            octave: 4,
            tempo,
            volume: 80,
            quantization: 0.9,
            default_duration: 1.0,
            current_time: 0.0,
            channel,
            program,
        }
    }

    /// Length in beats of an explicit duration, or the sticky default
    pub fn duration_beats(&self, duration: Option<&Duration>) -> f64 {
        match duration {
            Some(duration) => duration.beats(self.tempo),
            None => self.default_duration,
        }
    }

    /// Set the octave, kept inside [`OCTAVE_RANGE`]
    pub fn set_octave(&mut self, octave: i32) {
        self.octave = octave.clamp(*OCTAVE_RANGE.start(), *OCTAVE_RANGE.end());
    }

    /// Seconds for a number of beats at this part's tempo
    pub fn seconds(&self, beats: f64) -> f64 {
        time::beats_to_seconds(beats, self.tempo)
    }
}

/// Run-scoped state: created by one `generate` call and dropped with it
#[derive(Debug)]
pub struct GeneratorState<'a> {
    pub global_tempo: f64,
    /// Variable bodies, borrowed from the score tree
    pub variables: HashMap<&'a str, &'a [Node]>,
    /// Marker name -> time in seconds
    pub markers: HashMap<&'a str, f64>,
    pub parts: HashMap<String, PartState>,
    pub current_part: Option<String>,
    pub next_channel: u8,
    /// 1-based ordinal of the innermost repeat being played
    pub repetition: u32,
}

impl Default for GeneratorState<'_> {
    fn default() -> Self {
        Self {
            global_tempo: DEFAULT_TEMPO_BPM,
            variables: HashMap::new(),
            markers: HashMap::new(),
            parts: HashMap::new(),
            current_part: None,
            next_channel: 0,
            repetition: 1,
        }
    }
}

impl<'a> GeneratorState<'a> {
    /// Hand out the next channel. Once channel 15 is reached it is handed out
    /// again for every further part.
    pub fn allocate_channel(&mut self) -> u8 {
        let channel = self.next_channel;
        self.next_channel = (self.next_channel + 1).min(MAX_CHANNEL);
        channel
    }

    /// The part events are currently written to.
    ///
    /// Outside any part declaration this is the implicit `_default` part, which
    /// is created on first use with a channel but no program change.
    pub fn active_part(&mut self) -> &mut PartState {
        let name = self
            .current_part
            .get_or_insert_with(|| DEFAULT_PART.to_string())
            .clone();
        let next_channel = &mut self.next_channel;
        let tempo = self.global_tempo;
        self.parts.entry(name).or_insert_with(|| {
            let channel = *next_channel;
            *next_channel = (channel + 1).min(MAX_CHANNEL);
            PartState::new(channel, 0, tempo)
        })
    }
}
