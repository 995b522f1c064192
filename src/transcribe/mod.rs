//! # Transcribe Module
//!
//! Turns a live stream of note-on/note-off messages back into notation.
//!
//! ## Purpose
//! Recorded timing is continuous; notation is not. This module pairs raw
//! messages into [`RecordedNote`]s and quantizes them into notation
//! [`Element`](crate::notation::Element)s with a selectable [`Feel`]:
//! - **straight** - round to the configured grid
//! - **swing** - alternate long and short values (default 2:1)
//! - **triplet** / **quintuplet** - fixed subdivision grid, runs collapsed into crams
//!
//! ## Sub-modules
//! - `types` - RecordedNote, RawMessage, Feel, QuantizeOptions, Transcription
//! - `quantizer` - grouping, gap rests, quantization, decomposition, tuplets
//! - `session` - thread-safe message queue, note pairing, polling loop
//!
//! ## Entry Points
//! - [`quantize()`] - recorded notes to a [`Transcription`]
//! - [`transcribe_messages()`] - a timestamped message stream to a [`Transcription`]
//! - [`RecordingSession`] / [`record()`] - live recording
//!
//! ## Example
//! ```rust
//! use aldakit::transcribe::{quantize, Feel, QuantizeOptions, RecordedNote};
//! use aldakit::notation::Element;
//!
//! let options = QuantizeOptions { feel: Feel::Triplet, ..QuantizeOptions::default() };
//! let notes: Vec<RecordedNote> = (0..3)
//!     .map(|i| RecordedNote {
//!         pitch: 60 + i * 2,
//!         velocity: 90,
//!         start_time: f64::from(i) / 6.0,
//!         duration: 1.0 / 6.0,
//!     })
//!     .collect();
//!
//! let transcription = quantize(&notes, &options);
//! assert!(matches!(
//!     &transcription.elements[..],
//!     [Element::Cram { duration: 4, dots: 0, .. }]
//! ));
//! ```

mod quantizer;
mod session;
mod types;


pub use quantizer::{collapse_tuplets, quantize};
pub use session::{
    forward_stream, record, transcribe_messages, MessageSender, NoteCallback, NotePairer,
    RecordingSession, StreamFramer, DEFAULT_POLL_INTERVAL,
};
pub use types::{
    Feel, QuantizeOptions, RawMessage, RecordedNote, Transcription, TranscriptionMetadata,
    CHORD_TOLERANCE_SECONDS, MIN_HELD_NOTE_SECONDS, MIN_NOTE_SECONDS, MIN_REST_GAP_SECONDS,
    SWING_MAX_BEATS, SWING_MIN_BEATS,
};
