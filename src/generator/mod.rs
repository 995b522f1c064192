//! # Generator Module
//!
//! Interprets a score tree into absolute-time performance events.
//!
//! ## Purpose
//! The score tree says *what* is played relative to a moving cursor; this
//! module works out *when*. Each part keeps its own octave, tempo, volume,
//! quantization, sticky default duration and time cursor, so parts written
//! one after another in the score still sound together.
//!
//! ## Sub-modules
//! - `state` - per-part state and the run-scoped interpreter state
//! - `engine` - the tree walk that emits events
//!
//! ## Entry Point
//! - [`generate()`] - score tree to [`PerformanceSequence`](crate::midi::PerformanceSequence)
//!
//! ## Timing Rules
//! - one beat is a quarter note; seconds = beats * 60 / tempo
//! - a note sounds for its length times the part's quantization unless it is slurred
//! - the cursor always advances by the full, unshortened length
//! - a chord advances by its longest member
//! - every voice of a voice group starts together; the group ends with the longest
//! - a cram divides its total duration evenly between its events
//!
//! ## Example
//! ```rust
//! use aldakit::ast::{Node, NoteName, NoteNode, Score};
//! use aldakit::generator::generate;
//!
//! let score = Score::new(vec![Node::part(
//!     &["violin"],
//!     vec![
//!         Node::attribute("tempo", 60.0),
//!         NoteNode::new(NoteName::A).into(),
//!     ],
//! )]);
//!
//! let sequence = generate(&score);
//! assert_eq!(sequence.program_changes[0].program, 40);
//! assert_eq!(sequence.notes[0].pitch, 69);
//! assert!((sequence.notes[0].duration - 0.9).abs() < 1e-9);
//! ```

mod engine;
mod state;

#[cfg(test)]
mod tests;

pub use engine::{generate, generate_nodes};
pub use state::{PartState, DEFAULT_PART, MAX_CHANNEL};
