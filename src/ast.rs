//! # Score Tree Types
//!
//! This module defines the score tree the event generator interprets. The
//! parser and the compose builders both produce these nodes; the
//! transcription quantizer and MIDI import produce them too.
//!
//! ## Type Hierarchy
//! ```text
//! Score
//!   └── Vec<Node>
//!
//! Node (enum)
//!   ├── Part { declaration, events }      instrument line, owns a channel
//!   ├── Sequence / Bracketed { events }   plain event lists
//!   ├── Note(NoteNode)                    letter, accidentals, duration, slur
//!   ├── Rest(RestNode)
//!   ├── Chord { notes }                   notes plus octave/attribute changes
//!   ├── Barline                           visual only
//!   ├── OctaveSet / OctaveUp / OctaveDown
//!   ├── Attribute(AttributeCall)          (tempo 90), (vol 50), (pp), ...
//!   ├── VariableDefinition / VariableReference
//!   ├── Marker / AtMarker
//!   ├── VoiceGroup { voices }
//!   ├── Cram { events, duration }         tuplet squeezed into one duration
//!   ├── Repeat { event, times }
//!   └── OnRepetitions { event, ranges }
//! ```
//!
//! ## Durations
//! A [`Duration`] is a list of components that are added together, which is
//! how ties inside one note (`c4~8`) are represented. Components are note
//! lengths (`4` = quarter = 1 beat, `8.` = dotted eighth), milliseconds or
//! seconds. Notes without a duration use the part's sticky default.
//!
//! ## Serialization
//! Every node derives serde, so score trees can be stored as YAML. Nodes are
//! internally tagged with a `type` key:
//!
//! ```yaml
//! children:
//!   - type: part
//!     declaration: { names: [piano] }
//!     events:
//!       - { type: note, letter: c, duration: { components: [{ kind: note, denominator: 4 }] } }
//!       - { type: note, letter: e }
//! ```

use serde::{Deserialize, Serialize};

use crate::error::AldaError;
use crate::time;

/// Note names A through G
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoteName {
    #[default]
    C,
    D,
    E,
    F,
    G,
    A,
    B,
}

impl NoteName {
    /// Semitones above C within one octave
    pub fn semitone(&self) -> i32 {
        match self {
            NoteName::C => 0,
            NoteName::D => 2,
            NoteName::E => 4,
            NoteName::F => 5,
            NoteName::G => 7,
            NoteName::A => 9,
            NoteName::B => 11,
        }
    }

    /// Parse a note letter (case-insensitive)
    pub fn from_char(c: char) -> Option<Self> {
        match c.to_ascii_lowercase() {
            'c' => Some(NoteName::C),
            'd' => Some(NoteName::D),
            'e' => Some(NoteName::E),
            'f' => Some(NoteName::F),
            'g' => Some(NoteName::G),
            'a' => Some(NoteName::A),
            'b' => Some(NoteName::B),
            _ => None,
        }
    }

    pub fn as_char(&self) -> char {
        match self {
            NoteName::C => 'c',
            NoteName::D => 'd',
            NoteName::E => 'e',
            NoteName::F => 'f',
            NoteName::G => 'g',
            NoteName::A => 'a',
            NoteName::B => 'b',
        }
    }
}

/// Accidentals: `+` sharp, `-` flat, `_` natural. Several may be stacked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Accidental {
    Sharp,   // +
    Flat,    // -
    Natural, // _
}

impl Accidental {
    /// Semitone offset this accidental contributes
    pub fn offset(&self) -> i32 {
        match self {
            Accidental::Sharp => 1,
            Accidental::Flat => -1,
            Accidental::Natural => 0,
        }
    }

    pub fn symbol(&self) -> char {
        match self {
            Accidental::Sharp => '+',
            Accidental::Flat => '-',
            Accidental::Natural => '_',
        }
    }
}

/// One component of a duration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum NoteLength {
    /// Standard note value: 1 = whole, 4 = quarter, 12 = triplet eighth
    Note {
        denominator: u32,
        #[serde(default)]
        dots: u8,
    },
    /// Absolute length in milliseconds, converted through the current tempo
    Milliseconds { ms: f64 },
    /// Absolute length in seconds, converted through the current tempo
    Seconds { seconds: f64 },
}

/// A note or rest duration: components are summed (tied together)
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Duration {
    pub components: Vec<NoteLength>,
}

impl Duration {
    /// A single note value, e.g. `Duration::note(4, 1)` for a dotted quarter
    pub fn note(denominator: u32, dots: u8) -> Self {
        Self {
            components: vec![NoteLength::Note { denominator, dots }],
        }
    }

    pub fn millis(ms: f64) -> Self {
        Self {
            components: vec![NoteLength::Milliseconds { ms }],
        }
    }

    pub fn seconds(seconds: f64) -> Self {
        Self {
            components: vec![NoteLength::Seconds { seconds }],
        }
    }

    /// Append another duration's components (a tie)
    pub fn tie(mut self, other: Duration) -> Self {
        self.components.extend(other.components);
        self
    }

    /// Total length in beats at the given tempo
    pub fn beats(&self, bpm: f64) -> f64 {
        self.components
            .iter()
            .map(|component| match *component {
                NoteLength::Note { denominator, dots } => time::note_length_beats(denominator, dots),
                NoteLength::Milliseconds { ms } => time::seconds_to_beats(ms / 1000.0, bpm),
                NoteLength::Seconds { seconds } => time::seconds_to_beats(seconds, bpm),
            })
            .sum()
    }
}

/// A note event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteNode {
    pub letter: NoteName,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub accidentals: Vec<Accidental>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<Duration>,
    /// Slurred notes sound for their full length (legato into the next note)
    #[serde(default, skip_serializing_if = "is_false")]
    pub slurred: bool,
}

impl NoteNode {
    pub fn new(letter: NoteName) -> Self {
        Self {
            letter,
            accidentals: Vec::new(),
            duration: None,
            slurred: false,
        }
    }

    pub fn with_accidental(mut self, accidental: Accidental) -> Self {
        self.accidentals.push(accidental);
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn slurred(mut self) -> Self {
        self.slurred = true;
        self
    }
}

/// A rest event
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RestNode {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<Duration>,
}

/// Part declaration: one or more instrument names plus an optional alias
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartDeclaration {
    pub names: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

impl PartDeclaration {
    /// The name the part is tracked under: the alias if given, else the first instrument
    pub fn part_name(&self) -> &str {
        match (&self.alias, self.names.first()) {
            (Some(alias), _) => alias,
            (None, Some(first)) => first,
            (None, None) => "",
        }
    }
}

/// An attribute call such as `(tempo 90)`, `(quant 50)` or `(ff)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeCall {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
}

/// One voice inside a voice group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Voice {
    pub number: u32,
    pub events: Vec<Node>,
}

/// A repetition number or inclusive range (`'1-3,5`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepetitionRange {
    pub first: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last: Option<u32>,
}

impl RepetitionRange {
    pub fn contains(&self, repetition: u32) -> bool {
        match self.last {
            None => repetition == self.first,
            Some(last) => (self.first..=last).contains(&repetition),
        }
    }
}

/// A node of the score tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Node {
    Part {
        declaration: PartDeclaration,
        events: Vec<Node>,
    },
    Sequence {
        events: Vec<Node>,
    },
    Bracketed {
        events: Vec<Node>,
    },
    Note(NoteNode),
    Rest(RestNode),
    Chord {
        notes: Vec<Node>,
    },
    Barline,
    OctaveSet {
        octave: i32,
    },
    OctaveUp,
    OctaveDown,
    Attribute(AttributeCall),
    VariableDefinition {
        name: String,
        events: Vec<Node>,
    },
    VariableReference {
        name: String,
    },
    Marker {
        name: String,
    },
    AtMarker {
        name: String,
    },
    VoiceGroup {
        voices: Vec<Voice>,
    },
    Cram {
        events: Vec<Node>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        duration: Option<Duration>,
    },
    Repeat {
        event: Box<Node>,
        times: u32,
    },
    OnRepetitions {
        event: Box<Node>,
        ranges: Vec<RepetitionRange>,
    },
}

impl Node {
    /// Part declaration followed by its events
    pub fn part(names: &[&str], events: Vec<Node>) -> Self {
        Node::Part {
            declaration: PartDeclaration {
                names: names.iter().map(|n| n.to_string()).collect(),
                alias: None,
            },
            events,
        }
    }

    /// Attribute call with a numeric argument, e.g. `Node::attribute("tempo", 90.0)`
    pub fn attribute(name: &str, value: f64) -> Self {
        Node::Attribute(AttributeCall {
            name: name.to_string(),
            value: Some(value),
        })
    }

    /// Attribute call without arguments, e.g. dynamics like `(ff)`
    pub fn marking(name: &str) -> Self {
        Node::Attribute(AttributeCall {
            name: name.to_string(),
            value: None,
        })
    }

    pub fn rest(duration: Option<Duration>) -> Self {
        Node::Rest(RestNode { duration })
    }
}

impl From<NoteNode> for Node {
    fn from(note: NoteNode) -> Self {
        Node::Note(note)
    }
}

/// A complete score tree
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Score {
    pub children: Vec<Node>,
}

impl Score {
    pub fn new(children: Vec<Node>) -> Self {
        Self { children }
    }

    /// Load a score tree stored as YAML
    pub fn from_yaml(source: &str) -> Result<Self, AldaError> {
        Ok(serde_yaml::from_str(source)?)
    }

    pub fn to_yaml(&self) -> Result<String, AldaError> {
        Ok(serde_yaml::to_string(self)?)
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}
