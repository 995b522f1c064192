//! Performance event type definitions
//!
//! These are the flat, absolute-time events the generator produces and the
//! SMF codec reads and writes. All times are in seconds from the start of the
//! score.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Default MIDI file resolution
pub const DEFAULT_TICKS_PER_BEAT: u16 = 480;

/// A sounding note
///
/// # Fields
/// - `pitch`: MIDI note number (60 = middle C)
/// - `velocity`: 0-127
/// - `start_time`: onset in seconds
/// - `duration`: sounded length in seconds (already shortened by quantization)
/// - `channel`: MIDI channel 0-15
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceNote {
    pub pitch: u8,
    pub velocity: u8,
    pub start_time: f64,
    pub duration: f64,
    pub channel: u8,
}

impl PerformanceNote {
    pub fn end_time(&self) -> f64 {
        self.start_time + self.duration
    }
}

/// Instrument selection for a channel
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgramChange {
    pub program: u8,
    pub time: f64,
    pub channel: u8,
}

/// Controller change (panning uses controller 10)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlChange {
    pub control: u8,
    pub value: u8,
    pub time: f64,
    pub channel: u8,
}

/// Tempo change in beats per minute
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TempoChange {
    pub bpm: f64,
    pub time: f64,
}

/// Everything needed to perform or encode a score
///
/// After generation all four lists are sorted by time. `ticks_per_beat` only
/// matters to the SMF codec.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceSequence {
    pub notes: Vec<PerformanceNote>,
    pub program_changes: Vec<ProgramChange>,
    pub control_changes: Vec<ControlChange>,
    pub tempo_changes: Vec<TempoChange>,
    pub ticks_per_beat: u16,
}

impl Default for PerformanceSequence {
    fn default() -> Self {
        Self {
            notes: Vec::new(),
            program_changes: Vec::new(),
            control_changes: Vec::new(),
            tempo_changes: Vec::new(),
            ticks_per_beat: DEFAULT_TICKS_PER_BEAT,
        }
    }
}

impl PerformanceSequence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Time in seconds at which the last note stops sounding
    pub fn duration(&self) -> f64 {
        self.notes
            .iter()
            .map(PerformanceNote::end_time)
            .fold(0.0, f64::max)
    }

    /// Channels that carry notes, program changes or control changes
    pub fn channels(&self) -> BTreeSet<u8> {
        self.notes
            .iter()
            .map(|n| n.channel)
            .chain(self.program_changes.iter().map(|p| p.channel))
            .chain(self.control_changes.iter().map(|c| c.channel))
            .collect()
    }

    /// Stable sort of every list by time; simultaneous events keep their order
    pub fn sort_by_time(&mut self) {
        self.notes.sort_by(|a, b| a.start_time.total_cmp(&b.start_time));
        self.program_changes.sort_by(|a, b| a.time.total_cmp(&b.time));
        self.control_changes.sort_by(|a, b| a.time.total_cmp(&b.time));
        self.tempo_changes.sort_by(|a, b| a.time.total_cmp(&b.time));
    }

    /// Flatten into the ordered timeline a realtime player schedules.
    ///
    /// Every note contributes a note-on and a note-off. At equal times
    /// note-offs come first, then tempo, program and control changes, then
    /// note-ons, so a release never cuts off a note starting at the same
    /// instant.
    pub fn timeline(&self) -> Vec<TimedEvent> {
        let mut events = Vec::with_capacity(
            self.notes.len() * 2
                + self.tempo_changes.len()
                + self.program_changes.len()
                + self.control_changes.len(),
        );

        for tempo in &self.tempo_changes {
            events.push(TimedEvent {
                time: tempo.time,
                event: PlaybackEvent::Tempo { bpm: tempo.bpm },
            });
        }
        for pc in &self.program_changes {
            events.push(TimedEvent {
                time: pc.time,
                event: PlaybackEvent::ProgramChange {
                    channel: pc.channel,
                    program: pc.program,
                },
            });
        }
        for cc in &self.control_changes {
            events.push(TimedEvent {
                time: cc.time,
                event: PlaybackEvent::ControlChange {
                    channel: cc.channel,
                    control: cc.control,
                    value: cc.value,
                },
            });
        }
        for note in &self.notes {
            events.push(TimedEvent {
                time: note.start_time,
                event: PlaybackEvent::NoteOn {
                    channel: note.channel,
                    pitch: note.pitch,
                    velocity: note.velocity,
                },
            });
            events.push(TimedEvent {
                time: note.end_time(),
                event: PlaybackEvent::NoteOff {
                    channel: note.channel,
                    pitch: note.pitch,
                },
            });
        }

        events.sort_by(|a, b| {
            a.time
                .total_cmp(&b.time)
                .then(a.event.order().cmp(&b.event.order()))
        });
        events
    }
}

/// A realtime playback event
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PlaybackEvent {
    NoteOn { channel: u8, pitch: u8, velocity: u8 },
    NoteOff { channel: u8, pitch: u8 },
    ProgramChange { channel: u8, program: u8 },
    ControlChange { channel: u8, control: u8, value: u8 },
    Tempo { bpm: f64 },
}

impl PlaybackEvent {
    fn order(&self) -> u8 {
        match self {
            PlaybackEvent::NoteOff { .. } => 0,
            PlaybackEvent::Tempo { .. } => 1,
            PlaybackEvent::ProgramChange { .. } => 2,
            PlaybackEvent::ControlChange { .. } => 3,
            PlaybackEvent::NoteOn { .. } => 4,
        }
    }
}

/// A playback event at an absolute time in seconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TimedEvent {
    pub time: f64,
    pub event: PlaybackEvent,
}
