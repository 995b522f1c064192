//! Turn a decoded MIDI sequence back into a score tree.
//!
//! Each channel becomes one part named after its first program change.
//! Note starts are snapped to a beat grid; durations are snapped too and
//! written as tied note values so that regenerating the score keeps every
//! note on its grid position.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::tempo_map::TempoMap;
use super::types::{PerformanceNote, PerformanceSequence, TempoChange};
use crate::ast::{Duration, Node, NoteNode, PartDeclaration, Score};
use crate::notation::decompose_beats;
use crate::pitch::{midi_to_note, program_instrument};
use crate::time::{quantize_to_grid, DEFAULT_TEMPO_BPM};

/// Start times closer than this (in beats) form one chord
const CHORD_TOLERANCE: f64 = 0.01;

/// Gaps shorter than this (in beats) are not written as rests
const MIN_REST: f64 = 0.01;

/// Tempo changes are due this long (in seconds) before the note they precede
const TEMPO_LOOKAHEAD: f64 = 1e-4;

/// Options for [`sequence_to_score`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ImportOptions {
    /// Grid in beats for note starts and durations (0.25 = sixteenth notes)
    pub grid: f64,
    /// Tempo used when the sequence has no tempo changes
    pub default_bpm: f64,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            grid: 0.25,
            default_bpm: DEFAULT_TEMPO_BPM,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct GridNote {
    pitch: u8,
    start_beat: f64,
    duration_beats: f64,
    start_seconds: f64,
}

/// Convert a performance sequence into a score tree.
///
/// The first tempo becomes a global `tempo!` attribute when it differs from
/// 120 BPM; later tempo changes are inserted as `tempo` attributes before the
/// first note that starts at or after them.
pub fn sequence_to_score(sequence: &PerformanceSequence, options: &ImportOptions) -> Score {
    let grid = if options.grid > 0.0 { options.grid } else { ImportOptions::default().grid };
    let tempo_changes = collapse_tempo_changes(&sequence.tempo_changes);

    let bpm = tempo_changes.first().map_or(options.default_bpm, |change| change.bpm);
    let later_tempos: Vec<TempoChange> = tempo_changes.iter().skip(1).copied().collect();

    // beat positions follow the whole tempo schedule, not just the first tempo
    let anchor = [TempoChange { bpm, time: 0.0 }];
    let schedule = if tempo_changes.is_empty() { &anchor[..] } else { &tempo_changes[..] };
    let tempo_map = TempoMap::build(schedule, sequence.ticks_per_beat);

    let mut by_channel: BTreeMap<u8, Vec<&PerformanceNote>> = BTreeMap::new();
    for note in &sequence.notes {
        by_channel.entry(note.channel).or_default().push(note);
    }

    let mut programs: BTreeMap<u8, u8> = BTreeMap::new();
    for pc in &sequence.program_changes {
        programs.entry(pc.channel).or_insert(pc.program);
    }

    let mut children = Vec::new();
    if (bpm - DEFAULT_TEMPO_BPM).abs() > 0.1 {
        children.push(Node::attribute("tempo!", bpm.round()));
    }

    let mut used_names: BTreeMap<String, usize> = BTreeMap::new();
    for (channel, notes) in by_channel {
        let program = programs.get(&channel).copied().unwrap_or(0);
        let instrument = program_instrument(program);

        // a second channel with the same instrument needs its own part
        let count = used_names.entry(instrument.clone()).or_insert(0);
        *count += 1;
        let alias = (*count > 1).then(|| format!("{}-{}", instrument, count));

        let grid_notes = snap_notes(&notes, &tempo_map, grid);
        let events = notes_to_events(&grid_notes, &later_tempos);
        debug!(channel, program, notes = grid_notes.len(), "imported channel");

        children.push(Node::Part {
            declaration: PartDeclaration {
                names: vec![instrument],
                alias,
            },
            events,
        });
    }

    Score::new(children)
}

/// Sort tempo changes by time; of several changes at one instant the last wins
fn collapse_tempo_changes(changes: &[TempoChange]) -> Vec<TempoChange> {
    let mut sorted: Vec<TempoChange> = changes
        .iter()
        .filter(|change| change.bpm.is_finite() && change.bpm > 0.0)
        .copied()
        .collect();
    sorted.sort_by(|a, b| a.time.total_cmp(&b.time));

    let mut collapsed: Vec<TempoChange> = Vec::with_capacity(sorted.len());
    for change in sorted {
        match collapsed.last_mut() {
            Some(last) if (last.time - change.time).abs() < 1e-9 => *last = change,
            _ => collapsed.push(change),
        }
    }
    collapsed
}

fn snap_notes(notes: &[&PerformanceNote], tempo_map: &TempoMap, grid: f64) -> Vec<GridNote> {
    let mut snapped: Vec<GridNote> = notes
        .iter()
        .map(|note| {
            let start = tempo_map.seconds_to_beats(note.start_time);
            let end = tempo_map.seconds_to_beats(note.end_time());
            GridNote {
                pitch: note.pitch,
                start_beat: quantize_to_grid(start, grid),
                duration_beats: quantize_to_grid(end - start, grid).max(grid),
                start_seconds: note.start_time,
            }
        })
        .collect();
    snapped.sort_by(|a, b| a.start_beat.total_cmp(&b.start_beat).then(a.pitch.cmp(&b.pitch)));
    snapped
}

fn tied_duration(beats: f64) -> Option<Duration> {
    let chain = decompose_beats(beats, CHORD_TOLERANCE);
    let mut values = chain.into_iter();
    let (denominator, dots) = values.next()?;
    Some(values.fold(Duration::note(denominator, dots), |duration, (d, dots)| {
        duration.tie(Duration::note(d, dots))
    }))
}

fn notes_to_events(notes: &[GridNote], tempos: &[TempoChange]) -> Vec<Node> {
    let mut events = Vec::new();
    let mut current_beat = 0.0;
    let mut octave = 4;
    let mut next_tempo = 0;

    let mut i = 0;
    while i < notes.len() {
        let first = notes[i];
        next_tempo = emit_due_tempos(tempos, next_tempo, first.start_seconds, &mut events);

        let gap = first.start_beat - current_beat;
        if gap > MIN_REST {
            events.push(Node::rest(tied_duration(gap)));
        }

        let mut j = i + 1;
        while j < notes.len() && (notes[j].start_beat - first.start_beat).abs() < CHORD_TOLERANCE {
            j += 1;
        }
        let group = &notes[i..j];
        let duration = tied_duration(first.duration_beats);

        if group.len() > 1 {
            // duration on the first member; the rest reuse it as the sticky default
            let mut members = Vec::with_capacity(group.len());
            for (index, note) in group.iter().enumerate() {
                let (letter, note_octave, accidental) = midi_to_note(note.pitch);
                if note_octave != octave {
                    members.push(Node::OctaveSet { octave: note_octave });
                    octave = note_octave;
                }
                members.push(Node::Note(NoteNode {
                    letter,
                    accidentals: accidental.into_iter().collect(),
                    duration: if index == 0 { duration.clone() } else { None },
                    slurred: false,
                }));
            }
            events.push(Node::Chord { notes: members });
        } else {
            let (letter, note_octave, accidental) = midi_to_note(first.pitch);
            if note_octave != octave {
                events.push(Node::OctaveSet { octave: note_octave });
                octave = note_octave;
            }
            events.push(Node::Note(NoteNode {
                letter,
                accidentals: accidental.into_iter().collect(),
                duration,
                slurred: false,
            }));
        }

        current_beat = first.start_beat + first.duration_beats;
        i = j;
    }

    emit_due_tempos(tempos, next_tempo, f64::INFINITY, &mut events);
    events
}

fn emit_due_tempos(tempos: &[TempoChange], mut index: usize, before: f64, events: &mut Vec<Node>) -> usize {
    while index < tempos.len() && tempos[index].time <= before + TEMPO_LOOKAHEAD {
        events.push(Node::attribute("tempo", tempos[index].bpm.round()));
        index += 1;
    }
    index
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Accidental, NoteName};
    use crate::midi::ProgramChange;

    fn note(pitch: u8, start_time: f64, duration: f64, channel: u8) -> PerformanceNote {
        PerformanceNote {
            pitch,
            velocity: 80,
            start_time,
            duration,
            channel,
        }
    }

    fn sequence(notes: Vec<PerformanceNote>, tempo_changes: Vec<TempoChange>) -> PerformanceSequence {
        PerformanceSequence {
            notes,
            tempo_changes,
            ..PerformanceSequence::default()
        }
    }

    fn part_events(score: &Score, index: usize) -> &[Node] {
        match &score.children[index] {
            Node::Part { events, .. } => events,
            other => panic!("expected a part, got {:?}", other),
        }
    }

    #[test]
    fn test_single_note_becomes_piano_part() {
        let seq = sequence(vec![note(60, 0.0, 0.5, 0)], vec![]);
        let score = sequence_to_score(&seq, &ImportOptions::default());
        assert_eq!(score.children.len(), 1);

        let Node::Part { declaration, events } = &score.children[0] else {
            panic!("expected a part");
        };
        assert_eq!(declaration.names, vec!["piano".to_string()]);
        assert_eq!(
            events,
            &vec![Node::Note(NoteNode::new(NoteName::C).with_duration(Duration::note(4, 0)))]
        );
    }

    #[test]
    fn test_non_default_tempo_is_global() {
        let seq = sequence(vec![note(60, 0.0, 1.0, 0)], vec![TempoChange { bpm: 60.0, time: 0.0 }]);
        let score = sequence_to_score(&seq, &ImportOptions::default());
        assert_eq!(score.children[0], Node::attribute("tempo!", 60.0));
        // one second at 60 BPM is one beat
        assert_eq!(
            part_events(&score, 1),
            &[Node::Note(NoteNode::new(NoteName::C).with_duration(Duration::note(4, 0)))]
        );
    }

    #[test]
    fn test_same_time_tempo_changes_collapse() {
        let seq = sequence(
            vec![note(60, 0.0, 1.0, 0)],
            vec![TempoChange { bpm: 120.0, time: 0.0 }, TempoChange { bpm: 60.0, time: 0.0 }],
        );
        let score = sequence_to_score(&seq, &ImportOptions::default());
        assert_eq!(score.children[0], Node::attribute("tempo!", 60.0));
    }

    #[test]
    fn test_gap_becomes_rest_and_octaves_change() {
        // c4 at 0, then e5 one beat after the first note ends
        let seq = sequence(vec![note(60, 0.0, 0.5, 0), note(76, 1.0, 0.5, 0)], vec![]);
        let score = sequence_to_score(&seq, &ImportOptions::default());
        let events = part_events(&score, 0);
        assert_eq!(events.len(), 4);
        assert!(matches!(events[0], Node::Note(_)));
        assert_eq!(events[1], Node::rest(Some(Duration::note(4, 0))));
        assert_eq!(events[2], Node::OctaveSet { octave: 5 });
        assert_eq!(
            events[3],
            Node::Note(NoteNode::new(NoteName::E).with_duration(Duration::note(4, 0)))
        );
    }

    #[test]
    fn test_simultaneous_notes_become_chord() {
        let seq = sequence(
            vec![note(64, 0.0, 0.5, 0), note(60, 0.0, 0.5, 0), note(67, 0.001, 0.5, 0)],
            vec![],
        );
        let score = sequence_to_score(&seq, &ImportOptions::default());
        let events = part_events(&score, 0);
        assert_eq!(events.len(), 1);
        let Node::Chord { notes } = &events[0] else {
            panic!("expected a chord");
        };
        assert_eq!(notes.len(), 3);
        let Node::Note(first) = &notes[0] else {
            panic!("expected a note");
        };
        assert_eq!(first.letter, NoteName::C);
        assert!(first.duration.is_some());
        let Node::Note(second) = &notes[1] else {
            panic!("expected a note");
        };
        assert_eq!(second.letter, NoteName::E);
        assert!(second.duration.is_none());
    }

    #[test]
    fn test_off_grid_duration_is_tied() {
        // 1.25 beats: quarter tied to sixteenth
        let seq = sequence(vec![note(61, 0.0, 0.625, 0)], vec![]);
        let score = sequence_to_score(&seq, &ImportOptions::default());
        let expected = NoteNode::new(NoteName::C)
            .with_accidental(Accidental::Sharp)
            .with_duration(Duration::note(4, 0).tie(Duration::note(16, 0)));
        assert_eq!(part_events(&score, 0), &[Node::Note(expected)]);
    }

    #[test]
    fn test_repeated_instrument_gets_alias() {
        let mut seq = sequence(vec![note(60, 0.0, 0.5, 0), note(62, 0.0, 0.5, 1)], vec![]);
        seq.program_changes = vec![
            ProgramChange { program: 40, time: 0.0, channel: 0 },
            ProgramChange { program: 40, time: 0.0, channel: 1 },
        ];
        let score = sequence_to_score(&seq, &ImportOptions::default());
        let names: Vec<String> = score
            .children
            .iter()
            .filter_map(|child| match child {
                Node::Part { declaration, .. } => Some(declaration.part_name().to_string()),
                _ => None,
            })
            .collect();
        assert_eq!(names, vec!["violin".to_string(), "violin-2".to_string()]);
    }

    #[test]
    fn test_later_tempo_inserted_before_due_note() {
        let seq = sequence(
            vec![note(60, 0.0, 0.5, 0), note(62, 0.5, 1.0, 0)],
            vec![TempoChange { bpm: 120.0, time: 0.0 }, TempoChange { bpm: 60.0, time: 0.5 }],
        );
        let score = sequence_to_score(&seq, &ImportOptions::default());
        let events = part_events(&score, 0);
        assert_eq!(events.len(), 3);
        assert_eq!(events[1], Node::attribute("tempo", 60.0));
        // the second note lasts one beat at the new tempo
        assert_eq!(
            events[2],
            Node::Note(NoteNode::new(NoteName::D).with_duration(Duration::note(4, 0)))
        );
    }
}
