//! # MIDI Module
//!
//! Performance events, the tempo map, and the Standard MIDI File codec.
//!
//! ## Purpose
//! The event generator produces a [`PerformanceSequence`] with every time in
//! seconds. This module turns that sequence into:
//! 1. **SMF bytes** - a format 1 file with a tempo track and one track per channel
//! 2. **A realtime timeline** - via [`PerformanceSequence::timeline`]
//!
//! and reads MIDI files back, optionally all the way to a score tree.
//!
//! ## Sub-modules
//! - `types` - PerformanceNote, ProgramChange, ControlChange, TempoChange, PerformanceSequence
//! - `tempo_map` - seconds/ticks conversion over a tempo schedule
//! - `smf` - binary writer and reader
//! - `import` - decoded sequence to score tree
//!
//! ## Entry Points
//! - [`encode_smf()`] / [`write_midi_file()`] - sequence to bytes or file
//! - [`decode_smf()`] / [`read_midi_file()`] - bytes or file to sequence
//! - [`sequence_to_score()`] - sequence to score tree
//!
//! ## Example
//! ```rust
//! use aldakit::midi::{decode_smf, encode_smf, PerformanceNote, PerformanceSequence};
//!
//! let mut sequence = PerformanceSequence::new();
//! sequence.notes.push(PerformanceNote {
//!     pitch: 60,
//!     velocity: 100,
//!     start_time: 0.0,
//!     duration: 0.5,
//!     channel: 0,
//! });
//!
//! let bytes = encode_smf(&sequence);
//! assert_eq!(&bytes[..4], b"MThd");
//!
//! let decoded = decode_smf(&bytes).unwrap();
//! assert_eq!(decoded.notes[0].pitch, 60);
//! ```
//!
//! ## Tick Conversion
//!
//! Seconds become ticks by walking the tempo schedule segment by segment.
//! Each segment's ticks are truncated before being accumulated, and queries
//! extrapolate from the latest breakpoint at or before the requested time.
//! At 120 BPM and 480 ticks per beat one second is 960 ticks.

mod import;
mod smf;
mod tempo_map;
mod types;


pub use import::{sequence_to_score, ImportOptions};
pub use smf::{decode_smf, encode_smf, read_midi_file, write_midi_file, write_vlq};
pub use tempo_map::{TempoMap, TempoPoint};
pub use types::{
    ControlChange, PerformanceNote, PerformanceSequence, PlaybackEvent, ProgramChange, TempoChange,
    TimedEvent, DEFAULT_TICKS_PER_BEAT,
};
