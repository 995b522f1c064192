//! Performance event generation engine
//!
//! Walks a score tree depth first, threading each part's time cursor through
//! the walk, and collects absolute-time notes, program changes, control
//! changes and tempo changes.

use tracing::{debug, warn};

use super::state::{GeneratorState, PartState, MAX_CHANNEL};
use crate::ast::{AttributeCall, Duration, Node, NoteNode, PartDeclaration, RestNode, Score, Voice};
use crate::midi::{ControlChange, PerformanceNote, PerformanceSequence, ProgramChange, TempoChange};
use crate::pitch::{instrument_program, note_to_midi};

/// Controller number for pan position
const PAN_CONTROLLER: u8 = 10;

/// Velocity for each named dynamic marking, softest to loudest
const DYNAMICS: [(&str, u8); 14] = [
    ("pppppp", 10),
    ("ppppp", 20),
    ("pppp", 30),
    ("ppp", 40),
    ("pp", 50),
    ("p", 60),
    ("mp", 70),
    ("mf", 80),
    ("f", 90),
    ("ff", 100),
    ("fff", 110),
    ("ffff", 115),
    ("fffff", 120),
    ("ffffff", 127),
];

/// How deep variable references are followed when counting the events of a cram
const MAX_VARIABLE_DEPTH: usize = 32;

/// Generate the performance events for a score.
///
/// Generation is total: unknown attributes, unmapped instruments, undefined
/// variables and unknown markers are skipped or replaced by defaults. The
/// returned lists are sorted by time; events at equal times keep the order in
/// which they were produced.
///
/// # Example
/// ```rust
/// use aldakit::ast::{Duration, Node, NoteName, NoteNode, Score};
/// use aldakit::generator::generate;
///
/// let score = Score::new(vec![Node::part(
///     &["piano"],
///     vec![NoteNode::new(NoteName::C).with_duration(Duration::note(4, 0)).into()],
/// )]);
/// let sequence = generate(&score);
///
/// assert_eq!(sequence.notes.len(), 1);
/// assert_eq!(sequence.notes[0].pitch, 60);
/// assert!((sequence.notes[0].duration - 0.45).abs() < 1e-9);
/// ```
pub fn generate(score: &Score) -> PerformanceSequence {
    generate_nodes(&score.children)
}

/// Generate the performance events for a bare list of top-level nodes
pub fn generate_nodes(nodes: &[Node]) -> PerformanceSequence {
    Generator::new().run(nodes)
}

struct Generator<'a> {
    state: GeneratorState<'a>,
    sequence: PerformanceSequence,
    /// Variables currently being expanded, innermost last
    expanding: Vec<&'a str>,
}

impl<'a> Generator<'a> {
    fn new() -> Self {
        Self {
            state: GeneratorState::default(),
            sequence: PerformanceSequence::new(),
            expanding: Vec::new(),
        }
    }

    fn run(mut self, nodes: &'a [Node]) -> PerformanceSequence {
        // time 0 is always anchored at the starting tempo
        self.sequence.tempo_changes.push(TempoChange {
            bpm: self.state.global_tempo,
            time: 0.0,
        });

        self.process_all(nodes);
        self.sequence.sort_by_time();

        debug!(
            notes = self.sequence.notes.len(),
            parts = self.state.parts.len(),
            "generated performance"
        );
        self.sequence
    }

    fn process_all(&mut self, nodes: &'a [Node]) {
        for node in nodes {
            self.process(node);
        }
    }

    fn process(&mut self, node: &'a Node) {
        match node {
            Node::Part { declaration, events } => {
                self.enter_part(declaration);
                self.process_all(events);
            }
            Node::Sequence { events } | Node::Bracketed { events } => self.process_all(events),
            Node::Note(note) => {
                self.note(note, false);
            }
            Node::Rest(rest) => self.rest(rest),
            Node::Chord { notes } => self.chord(notes),
            Node::Barline => {}
            Node::OctaveSet { octave } => self.state.active_part().set_octave(*octave),
            Node::OctaveUp => self.shift_octave(1),
            Node::OctaveDown => self.shift_octave(-1),
            Node::Attribute(call) => self.attribute(call),
            Node::VariableDefinition { name, events } => {
                self.state.variables.insert(name.as_str(), events.as_slice());
            }
            Node::VariableReference { name } => self.variable_reference(name),
            Node::Marker { name } => {
                let time = self.state.active_part().current_time;
                self.state.markers.insert(name.as_str(), time);
            }
            Node::AtMarker { name } => self.at_marker(name),
            Node::VoiceGroup { voices } => self.voice_group(voices),
            Node::Cram { events, duration } => self.cram(events, duration.as_ref()),
            Node::Repeat { event, times } => self.repeat(event, *times),
            Node::OnRepetitions { event, ranges } => {
                let repetition = self.state.repetition;
                if ranges.iter().any(|range| range.contains(repetition)) {
                    self.process(event);
                }
            }
        }
    }

    /// Make a part active, creating it (channel + program change) on first use
    fn enter_part(&mut self, declaration: &PartDeclaration) {
        let name = declaration.part_name();

        if !self.state.parts.contains_key(name) {
            let program = match declaration.names.iter().find_map(|n| instrument_program(n)) {
                Some(program) => program,
                None => {
                    debug!(instruments = ?declaration.names, "unknown instrument; using piano");
                    0
                }
            };

            let channel = self.state.allocate_channel();
            if channel == MAX_CHANNEL && self.state.parts.values().any(|p| p.channel == channel) {
                warn!(part = name, channel, "out of MIDI channels; part shares the last channel");
            }

            self.state.parts.insert(
                name.to_string(),
                PartState::new(channel, program, self.state.global_tempo),
            );
            self.sequence.program_changes.push(ProgramChange {
                program,
                time: 0.0,
                channel,
            });
        }

        self.state.current_part = Some(name.to_string());
    }

    /// Emit one note and return its unshortened length in seconds.
    ///
    /// Chord members do not move the cursor; the chord does that once.
    fn note(&mut self, note: &NoteNode, in_chord: bool) -> f64 {
        let part = self.state.active_part();

        let pitch = note_to_midi(note.letter, part.octave, &note.accidentals);
        let beats = part.duration_beats(note.duration.as_ref()).max(0.0);
        let seconds = part.seconds(beats);

        // slurred notes run into the next one
        let sounded = if note.slurred {
            seconds
        } else {
            seconds * part.quantization
        };

        self.sequence.notes.push(PerformanceNote {
            pitch,
            velocity: part.volume,
            start_time: part.current_time,
            duration: sounded,
            channel: part.channel,
        });

        if note.duration.is_some() {
            part.default_duration = beats;
        }
        if !in_chord {
            part.current_time += seconds;
        }
        seconds
    }

    fn rest(&mut self, rest: &RestNode) {
        let part = self.state.active_part();
        let beats = part.duration_beats(rest.duration.as_ref()).max(0.0);
        if rest.duration.is_some() {
            part.default_duration = beats;
        }
        part.current_time += part.seconds(beats);
    }

    fn shift_octave(&mut self, by: i32) {
        let part = self.state.active_part();
        part.set_octave(part.octave.saturating_add(by));
    }

    fn chord(&mut self, members: &'a [Node]) {
        let start = self.state.active_part().current_time;
        let mut longest = 0.0f64;

        for member in members {
            match member {
                Node::Note(note) => longest = longest.max(self.note(note, true)),
                Node::OctaveSet { octave } => self.state.active_part().set_octave(*octave),
                Node::OctaveUp => self.shift_octave(1),
                Node::OctaveDown => self.shift_octave(-1),
                Node::Attribute(call) => self.attribute(call),
                _ => debug!("ignoring chord member that is not a note, octave change or attribute"),
            }
        }

        self.state.active_part().current_time = start + longest;
    }

    fn attribute(&mut self, call: &AttributeCall) {
        let name = call.name.to_lowercase();
        let value = call.value.filter(|v| v.is_finite());

        match name.as_str() {
            "tempo" | "tempo!" => {
                let Some(bpm) = value else {
                    debug!(attribute = %call.name, "tempo without a value");
                    return;
                };
                if bpm <= 0.0 {
                    warn!(bpm, "ignoring non-positive tempo");
                    return;
                }

                let time = if name == "tempo!" {
                    self.state.global_tempo = bpm;
                    for part in self.state.parts.values_mut() {
                        part.tempo = bpm;
                    }
                    // a global tempo before any part does not create one
                    match self.state.current_part {
                        Some(_) => self.state.active_part().current_time,
                        None => 0.0,
                    }
                } else {
                    let part = self.state.active_part();
                    part.tempo = bpm;
                    part.current_time
                };
                self.sequence.tempo_changes.push(TempoChange { bpm, time });
            }
            "vol" | "volume" | "vol!" | "volume!" => {
                if let Some(volume) = value {
                    self.state.active_part().volume = percent_to_midi(volume);
                }
            }
            "quant" | "quantize" | "quantization" => {
                if let Some(quant) = value {
                    self.state.active_part().quantization = (quant / 100.0).clamp(0.0, 1.0);
                }
            }
            "panning" => {
                if let Some(pan) = value {
                    let part = self.state.active_part();
                    let change = ControlChange {
                        control: PAN_CONTROLLER,
                        value: percent_to_midi(pan),
                        time: part.current_time,
                        channel: part.channel,
                    };
                    self.sequence.control_changes.push(change);
                }
            }
            "octave" | "octave!" => {
                if let Some(octave) = value {
                    self.state.active_part().set_octave(octave as i32);
                }
            }
            marking => match DYNAMICS.iter().find(|(dynamic, _)| *dynamic == marking) {
                Some((_, velocity)) => self.state.active_part().volume = *velocity,
                None => debug!(attribute = %call.name, "ignoring unknown attribute"),
            },
        }
    }

    /// Replay a variable's body against the state at the call site
    fn variable_reference(&mut self, name: &'a str) {
        let Some(body) = self.state.variables.get(name).copied() else {
            debug!(variable = name, "reference to undefined variable");
            return;
        };
        if self.expanding.contains(&name) {
            warn!(variable = name, "skipping recursive variable reference");
            return;
        }

        self.expanding.push(name);
        self.process_all(body);
        self.expanding.pop();
    }

    fn at_marker(&mut self, name: &str) {
        match self.state.markers.get(name).copied() {
            Some(time) => self.state.active_part().current_time = time,
            None => debug!(marker = name, "jump to unknown marker"),
        }
    }

    /// Every voice starts at the group's start; the group ends with its longest voice
    fn voice_group(&mut self, voices: &'a [Voice]) {
        let start = self.state.active_part().current_time;
        let mut end = start;

        for voice in voices {
            self.state.active_part().current_time = start;
            self.process_all(&voice.events);
            end = end.max(self.state.active_part().current_time);
        }

        self.state.active_part().current_time = end;
    }

    /// Squeeze the events into one duration, split evenly between them
    fn cram(&mut self, events: &'a [Node], duration: Option<&Duration>) {
        let count = self.count_sounding(events, 0);

        let part = self.state.active_part();
        let total_beats = part.duration_beats(duration).max(0.0);
        let total_seconds = part.seconds(total_beats);
        if count == 0 {
            debug!("cram without notes or rests");
            return;
        }

        let start = part.current_time;
        let saved_duration = part.default_duration;
        part.default_duration = total_beats / count as f64;

        self.process_all(events);

        // land exactly on the cram's end, whatever the inner events added up to
        let part = self.state.active_part();
        part.default_duration = saved_duration;
        part.current_time = start + total_seconds;
    }

    /// Number of events a cram divides its duration between.
    ///
    /// Notes, rests, chords and nested crams count once; bracketed sequences
    /// and variable references count their contents; repeats multiply.
    fn count_sounding(&self, events: &[Node], depth: usize) -> usize {
        events.iter().map(|event| self.sounding_events(event, depth)).sum()
    }

    fn sounding_events(&self, node: &Node, depth: usize) -> usize {
        match node {
            Node::Note(_) | Node::Rest(_) | Node::Chord { .. } | Node::Cram { .. } => 1,
            Node::Sequence { events } | Node::Bracketed { events } => self.count_sounding(events, depth),
            Node::Repeat { event, times } => self.sounding_events(event, depth) * *times as usize,
            Node::VariableReference { name } if depth < MAX_VARIABLE_DEPTH => self
                .state
                .variables
                .get(name.as_str())
                .map_or(0, |body| self.count_sounding(body, depth + 1)),
            _ => 0,
        }
    }

    /// Run a repeated event, exposing the 1-based ordinal to on-repetition guards
    fn repeat(&mut self, event: &'a Node, times: u32) {
        for ordinal in 1..=times {
            self.state.repetition = ordinal;
            self.process(event);
        }
        // after any loop the ordinal is 1 again, even inside an outer repeat
        self.state.repetition = 1;
    }
}

/// Map a 0-100 attribute value onto 0-127
fn percent_to_midi(value: f64) -> u8 {
    ((value.trunc() * 127.0 / 100.0) as i64).clamp(0, 127) as u8
}
