//! # Notation Elements
//!
//! The vocabulary the transcription quantizer and MIDI import speak: notes,
//! rests, chords and crams expressed as standard note values. Elements convert
//! back into score-tree nodes with [`to_nodes`], so a transcription can be fed
//! straight into the event generator.
//!
//! ## Duration catalog
//! Note values are denominators in the usual sense (`4` = quarter = 1 beat,
//! `8` = eighth). Besides the binary values the catalog holds the triplet and
//! quintuplet subdivisions (`6`, `12`, `20`, `24`, `40`, `48`, `80`) and a
//! handful of dotted values. [`beats_to_duration`] picks the entry closest to
//! a beat length.

use serde::{Deserialize, Serialize};

use crate::ast::{Accidental, Duration, Node, NoteName, NoteNode};
use crate::time;

/// Plain note values and their length in beats
pub const PLAIN_VALUES: [(u32, f64); 14] = [
    (1, 4.0),
    (2, 2.0),
    (4, 1.0),
    (6, 2.0 / 3.0),
    (8, 0.5),
    (12, 1.0 / 3.0),
    (16, 0.25),
    (20, 0.2),
    (24, 1.0 / 6.0),
    (32, 0.125),
    (40, 0.1),
    (48, 1.0 / 12.0),
    (64, 0.0625),
    (80, 0.05),
];

/// Dotted note values: (denominator, dots, beats)
pub const DOTTED_VALUES: [(u32, u8, f64); 7] = [
    (1, 1, 6.0),
    (2, 1, 3.0),
    (4, 1, 1.5),
    (8, 1, 0.75),
    (12, 1, 0.5),
    (16, 1, 0.375),
    (24, 1, 0.25),
];

/// Distance under which a beat length counts as an exact catalog hit
const EXACT_MATCH: f64 = 0.01;

/// Closest catalog note value for a length in beats, as (denominator, dots).
///
/// Exact hits (within 0.01 beat) on plain values win over dotted ones;
/// otherwise the nearest entry is chosen, preferring plain values on ties.
/// Non-positive lengths fall back to a quarter note.
///
/// # Example
/// ```
/// use aldakit::notation::beats_to_duration;
///
/// assert_eq!(beats_to_duration(1.0), (4, 0));
/// assert_eq!(beats_to_duration(0.75), (8, 1));
/// assert_eq!(beats_to_duration(1.0 / 3.0), (12, 0));
/// ```
pub fn beats_to_duration(beats: f64) -> (u32, u8) {
    if beats.is_nan() || beats <= 0.0 {
        return (4, 0);
    }

    if let Some((denominator, _)) = PLAIN_VALUES
        .iter()
        .find(|(_, length)| (beats - length).abs() < EXACT_MATCH)
    {
        return (*denominator, 0);
    }
    if let Some((denominator, dots, _)) = DOTTED_VALUES
        .iter()
        .find(|(_, _, length)| (beats - length).abs() < EXACT_MATCH)
    {
        return (*denominator, *dots);
    }

    let candidates = PLAIN_VALUES
        .iter()
        .map(|&(denominator, length)| (denominator, 0, length))
        .chain(DOTTED_VALUES.iter().copied());

    let mut best = (4, 0);
    let mut best_diff = f64::INFINITY;
    for (denominator, dots, length) in candidates {
        let diff = (beats - length).abs();
        if diff < best_diff {
            best_diff = diff;
            best = (denominator, dots);
        }
    }
    best
}

/// Break a beat length into a chain of catalog values that add up to it.
///
/// Each step takes the longest value that fits in the remainder (plain values
/// win ties), so the chain never overshoots by more than `tolerance`. The
/// chain ends once the remainder is within `tolerance` or shorter than every
/// catalog value. Non-positive lengths give an empty chain.
pub fn decompose_beats(beats: f64, tolerance: f64) -> Vec<(u32, u8)> {
    let mut chain = Vec::new();
    let mut remaining = if beats.is_finite() { beats } else { 0.0 };
    while remaining > tolerance {
        let Some((denominator, dots, length)) = longest_fitting(remaining + tolerance) else {
            break;
        };
        chain.push((denominator, dots));
        remaining -= length;
    }
    chain
}

fn longest_fitting(limit: f64) -> Option<(u32, u8, f64)> {
    PLAIN_VALUES
        .iter()
        .map(|&(denominator, length)| (denominator, 0, length))
        .chain(DOTTED_VALUES.iter().copied())
        .filter(|&(_, _, length)| length <= limit)
        .fold(None, |best: Option<(u32, u8, f64)>, candidate| match best {
            Some(best) if best.2 >= candidate.2 => Some(best),
            _ => Some(candidate),
        })
}

/// Length in beats of a note value (inverse of [`beats_to_duration`] for catalog entries)
pub fn duration_beats(denominator: u32, dots: u8) -> f64 {
    time::note_length_beats(denominator, dots)
}

/// A transcribed note
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotationNote {
    pub letter: NoteName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accidental: Option<Accidental>,
    pub octave: i32,
    pub duration: u32,
    #[serde(default)]
    pub dots: u8,
    #[serde(default)]
    pub slurred: bool,
}

impl NotationNote {
    pub fn beats(&self) -> f64 {
        duration_beats(self.duration, self.dots)
    }

    /// MIDI pitch this note spells
    pub fn pitch(&self) -> u8 {
        let accidentals: Vec<Accidental> = self.accidental.into_iter().collect();
        crate::pitch::note_to_midi(self.letter, self.octave, &accidentals)
    }

    fn to_node(&self, with_duration: bool) -> NoteNode {
        NoteNode {
            letter: self.letter,
            accidentals: self.accidental.into_iter().collect(),
            duration: with_duration.then(|| Duration::note(self.duration, self.dots)),
            slurred: self.slurred,
        }
    }
}

/// One element of a transcription
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Element {
    Note(NotationNote),
    Rest {
        duration: u32,
        #[serde(default)]
        dots: u8,
    },
    Chord {
        notes: Vec<NotationNote>,
    },
    /// Tuplet: `elements` share one outer duration
    Cram {
        elements: Vec<Element>,
        duration: u32,
        #[serde(default)]
        dots: u8,
    },
}

impl Element {
    /// Nominal length in beats (for a cram, its outer duration)
    pub fn beats(&self) -> f64 {
        match self {
            Element::Note(note) => note.beats(),
            Element::Rest { duration, dots } => duration_beats(*duration, *dots),
            Element::Chord { notes } => notes.iter().map(NotationNote::beats).fold(0.0, f64::max),
            Element::Cram { duration, dots, .. } => duration_beats(*duration, *dots),
        }
    }

    /// Copy of this element with every slur flag cleared
    pub fn without_slurs(&self) -> Element {
        match self {
            Element::Note(note) => Element::Note(NotationNote {
                slurred: false,
                ..note.clone()
            }),
            Element::Chord { notes } => Element::Chord {
                notes: notes
                    .iter()
                    .map(|n| NotationNote {
                        slurred: false,
                        ..n.clone()
                    })
                    .collect(),
            },
            other => other.clone(),
        }
    }
}

/// Convert notation elements into score-tree nodes.
///
/// `start_octave` is the octave the receiving part is in; an octave-set node
/// is emitted only when a note's octave differs from the last one set. Notes
/// inside a cram carry no duration of their own, since the cram divides its
/// outer duration evenly among them.
pub fn to_nodes(elements: &[Element], start_octave: i32) -> Vec<Node> {
    let mut octave = start_octave;
    let mut nodes = Vec::with_capacity(elements.len());
    for element in elements {
        push_element(element, &mut octave, true, &mut nodes);
    }
    nodes
}

fn push_element(element: &Element, octave: &mut i32, with_duration: bool, out: &mut Vec<Node>) {
    match element {
        Element::Note(note) => {
            set_octave(note.octave, octave, out);
            out.push(Node::Note(note.to_node(with_duration)));
        }
        Element::Rest { duration, dots } => {
            let duration = with_duration.then(|| Duration::note(*duration, *dots));
            out.push(Node::rest(duration));
        }
        Element::Chord { notes } => {
            let mut members = Vec::with_capacity(notes.len());
            for note in notes {
                set_octave(note.octave, octave, &mut members);
                members.push(Node::Note(note.to_node(with_duration)));
            }
            out.push(Node::Chord { notes: members });
        }
        Element::Cram {
            elements,
            duration,
            dots,
        } => {
            let mut events = Vec::with_capacity(elements.len());
            for inner in elements {
                push_element(inner, octave, false, &mut events);
            }
            out.push(Node::Cram {
                events,
                duration: Some(Duration::note(*duration, *dots)),
            });
        }
    }
}

fn set_octave(target: i32, current: &mut i32, out: &mut Vec<Node>) {
    if target != *current {
        out.push(Node::OctaveSet { octave: target });
        *current = target;
    }
}
