use super::*;
use crate::ast::{
    Accidental, Duration, Node, NoteName, NoteNode, PartDeclaration, RepetitionRange, Score, Voice,
};
use crate::midi::PerformanceSequence;

fn close(actual: f64, expected: f64) -> bool {
    (actual - expected).abs() < 1e-9
}

fn n(letter: NoteName) -> Node {
    NoteNode::new(letter).into()
}

fn nd(letter: NoteName, denominator: u32, dots: u8) -> Node {
    NoteNode::new(letter)
        .with_duration(Duration::note(denominator, dots))
        .into()
}

fn piano(events: Vec<Node>) -> PerformanceSequence {
    generate(&Score::new(vec![Node::part(&["piano"], events)]))
}

fn aliased(name: &str, alias: &str, events: Vec<Node>) -> Node {
    Node::Part {
        declaration: PartDeclaration {
            names: vec![name.to_string()],
            alias: Some(alias.to_string()),
        },
        events,
    }
}

fn pitches(sequence: &PerformanceSequence) -> Vec<u8> {
    sequence.notes.iter().map(|note| note.pitch).collect()
}

fn starts(sequence: &PerformanceSequence) -> Vec<f64> {
    sequence.notes.iter().map(|note| note.start_time).collect()
}

// ============================================================================
// Pitch
// ============================================================================

#[test]
fn test_generate_middle_c() {
    let sequence = piano(vec![n(NoteName::C)]);
    assert_eq!(sequence.notes.len(), 1);
    assert_eq!(sequence.notes[0].pitch, 60);
    assert_eq!(sequence.notes[0].velocity, 80);
    assert_eq!(sequence.notes[0].channel, 0);
}

#[test]
fn test_generate_octaves() {
    assert_eq!(pitches(&piano(vec![Node::OctaveSet { octave: 5 }, n(NoteName::C)])), vec![72]);
    assert_eq!(pitches(&piano(vec![Node::OctaveUp, n(NoteName::C)])), vec![72]);
    assert_eq!(pitches(&piano(vec![Node::OctaveDown, n(NoteName::C)])), vec![48]);
}

#[test]
fn test_generate_extreme_octaves_clamp() {
    let high = piano(vec![Node::attribute("octave", 1e12), Node::OctaveUp, n(NoteName::C)]);
    assert_eq!(pitches(&high), vec![127]);

    let low = piano(vec![Node::OctaveSet { octave: i32::MIN }, Node::OctaveDown, n(NoteName::B)]);
    assert_eq!(pitches(&low), vec![11]);

    // the top octave is 10, so one step down lands on octave 9
    let back = piano(vec![Node::OctaveSet { octave: i32::MAX }, Node::OctaveDown, n(NoteName::C)]);
    assert_eq!(pitches(&back), vec![120]);
}

#[test]
fn test_generate_accidentals() {
    let sharp = NoteNode::new(NoteName::C).with_accidental(Accidental::Sharp);
    let flat = NoteNode::new(NoteName::B).with_accidental(Accidental::Flat);
    assert_eq!(pitches(&piano(vec![sharp.into(), flat.into()])), vec![61, 70]);
}

// ============================================================================
// Durations
// ============================================================================

#[test]
fn test_generate_note_values() {
    // 120 BPM: one beat is 0.5s and notes sound for 90% of their length
    let cases = [(4, 0, 0.45), (2, 0, 0.9), (1, 0, 1.8), (8, 0, 0.225), (4, 1, 0.675)];
    for (denominator, dots, expected) in cases {
        let sequence = piano(vec![nd(NoteName::C, denominator, dots)]);
        assert!(
            close(sequence.notes[0].duration, expected),
            "c{denominator} with {dots} dots sounded {}",
            sequence.notes[0].duration
        );
    }
}

#[test]
fn test_generate_absolute_durations() {
    let millis = NoteNode::new(NoteName::C).with_duration(Duration::millis(500.0));
    let seconds = NoteNode::new(NoteName::C).with_duration(Duration::seconds(2.0));
    let sequence = piano(vec![millis.into(), seconds.into()]);

    assert!(close(sequence.notes[0].duration, 0.45));
    assert!(close(sequence.notes[1].start_time, 0.5));
    assert!(close(sequence.notes[1].duration, 1.8));
}

#[test]
fn test_generate_tied_duration() {
    let tied = NoteNode::new(NoteName::C).with_duration(Duration::note(4, 0).tie(Duration::note(8, 0)));
    let sequence = piano(vec![tied.into(), n(NoteName::D)]);

    assert!(close(sequence.notes[0].duration, 0.675));
    assert!(close(sequence.notes[1].start_time, 0.75));
}

#[test]
fn test_generate_sticky_default_duration() {
    let sequence = piano(vec![nd(NoteName::C, 4, 0), nd(NoteName::D, 8, 0), n(NoteName::E)]);

    let expected_starts = [0.0, 0.5, 0.75];
    for (actual, expected) in starts(&sequence).into_iter().zip(expected_starts) {
        assert!(close(actual, expected));
    }
    // e inherits the eighth note
    assert!(close(sequence.notes[2].duration, 0.225));
}

#[test]
fn test_generate_slurred_note_sounds_full_length() {
    let slurred = NoteNode::new(NoteName::C).slurred();
    let sequence = piano(vec![slurred.into(), n(NoteName::D)]);

    assert!(close(sequence.notes[0].duration, 0.5));
    assert!(close(sequence.notes[1].start_time, 0.5));
}

#[test]
fn test_generate_rests_advance_and_set_default() {
    let sequence = piano(vec![
        n(NoteName::C),
        Node::rest(Some(Duration::note(2, 0))),
        n(NoteName::D),
        Node::rest(None),
        n(NoteName::E),
    ]);

    assert_eq!(sequence.notes.len(), 3);
    assert!(close(sequence.notes[1].start_time, 1.5));
    // the half rest sets the default
    assert!(close(sequence.notes[1].duration, 0.9));
    assert!(close(sequence.notes[2].start_time, 3.5));
}

#[test]
fn test_generate_barlines_take_no_time() {
    let sequence = piano(vec![n(NoteName::C), Node::Barline, n(NoteName::D)]);
    assert!(close(sequence.notes[1].start_time, 0.5));
}

// ============================================================================
// Chords
// ============================================================================

#[test]
fn test_generate_chord_shares_start() {
    let chord = Node::Chord {
        notes: vec![n(NoteName::C), n(NoteName::E), n(NoteName::G)],
    };
    let sequence = piano(vec![chord, n(NoteName::D)]);

    assert_eq!(pitches(&sequence)[..3], [60, 64, 67]);
    assert!(sequence.notes[..3].iter().all(|note| note.start_time == 0.0));
    assert!(close(sequence.notes[3].start_time, 0.5));
}

#[test]
fn test_generate_chord_octave_change() {
    let chord = Node::Chord {
        notes: vec![n(NoteName::C), Node::OctaveUp, n(NoteName::E), n(NoteName::G)],
    };
    assert_eq!(pitches(&piano(vec![chord])), vec![60, 76, 79]);
}

#[test]
fn test_generate_chord_advances_by_longest_member() {
    let chord = Node::Chord {
        notes: vec![nd(NoteName::C, 1, 0), nd(NoteName::E, 4, 0)],
    };
    let sequence = piano(vec![chord, n(NoteName::G)]);

    assert!(close(sequence.notes[2].start_time, 2.0));
    // the last explicit member sets the default
    assert!(close(sequence.notes[2].duration, 0.45));
}

#[test]
fn test_generate_chord_ignores_rests() {
    let chord = Node::Chord {
        notes: vec![n(NoteName::C), Node::rest(Some(Duration::note(1, 0)))],
    };
    let sequence = piano(vec![chord, n(NoteName::D)]);

    assert_eq!(sequence.notes.len(), 2);
    assert!(close(sequence.notes[1].start_time, 0.5));
}

// ============================================================================
// Attributes
// ============================================================================

#[test]
fn test_generate_initial_tempo_change() {
    let sequence = generate(&Score::default());
    assert!(sequence.notes.is_empty());
    assert_eq!(sequence.tempo_changes.len(), 1);
    assert_eq!(sequence.tempo_changes[0].bpm, 120.0);
    assert_eq!(sequence.tempo_changes[0].time, 0.0);
}

#[test]
fn test_generate_part_tempo() {
    let sequence = piano(vec![Node::attribute("tempo", 60.0), n(NoteName::C)]);
    assert!(close(sequence.notes[0].duration, 0.9));
}

#[test]
fn test_generate_tempo_change_at_cursor() {
    let sequence = piano(vec![
        n(NoteName::C),
        n(NoteName::C),
        Node::attribute("tempo", 60.0),
        n(NoteName::D),
    ]);

    let last = sequence.tempo_changes.last().unwrap();
    assert_eq!(last.bpm, 60.0);
    assert!(close(last.time, 1.0));
    assert!(close(sequence.notes[2].duration, 0.9));
}

#[test]
fn test_generate_part_tempo_is_local() {
    let sequence = generate(&Score::new(vec![
        Node::part(&["piano"], vec![Node::attribute("tempo", 60.0), n(NoteName::C)]),
        Node::part(&["violin"], vec![n(NoteName::C)]),
    ]));

    let piano_note = sequence.notes.iter().find(|note| note.channel == 0).unwrap();
    let violin_note = sequence.notes.iter().find(|note| note.channel == 1).unwrap();
    assert!(close(piano_note.duration, 0.9));
    assert!(close(violin_note.duration, 0.45));
}

#[test]
fn test_generate_global_tempo() {
    let sequence = generate(&Score::new(vec![
        Node::part(&["piano"], vec![Node::attribute("tempo!", 240.0), n(NoteName::C)]),
        Node::part(&["violin"], vec![n(NoteName::C)]),
    ]));

    for note in &sequence.notes {
        assert!(close(note.duration, 0.225));
    }
}

#[test]
fn test_generate_global_tempo_before_parts() {
    let sequence = generate(&Score::new(vec![
        Node::attribute("tempo!", 90.0),
        Node::part(&["piano"], vec![n(NoteName::C)]),
    ]));

    // no implicit part is created for the tempo alone
    assert_eq!(sequence.program_changes.len(), 1);
    assert_eq!(sequence.notes[0].channel, 0);
    assert!(close(sequence.notes[0].duration, 0.6));
    assert!(sequence
        .tempo_changes
        .iter()
        .any(|change| change.bpm == 90.0 && change.time == 0.0));
}

#[test]
fn test_generate_ignores_non_positive_tempo() {
    let sequence = piano(vec![Node::attribute("tempo", 0.0), n(NoteName::C)]);
    assert_eq!(sequence.tempo_changes.len(), 1);
    assert!(close(sequence.notes[0].duration, 0.45));
}

#[test]
fn test_generate_volume() {
    let sequence = piano(vec![Node::attribute("vol", 50.0), n(NoteName::C)]);
    assert_eq!(sequence.notes[0].velocity, 63);

    let sequence = piano(vec![Node::attribute("VOLUME", 100.0), n(NoteName::C)]);
    assert_eq!(sequence.notes[0].velocity, 127);

    let sequence = piano(vec![Node::attribute("vol", 150.0), n(NoteName::C)]);
    assert_eq!(sequence.notes[0].velocity, 127);
}

#[test]
fn test_generate_dynamics() {
    let cases = [("pppppp", 10), ("pp", 50), ("mf", 80), ("ff", 100), ("ffffff", 127)];
    for (marking, velocity) in cases {
        let sequence = piano(vec![Node::marking(marking), n(NoteName::C)]);
        assert_eq!(sequence.notes[0].velocity, velocity, "dynamic {marking}");
    }
}

#[test]
fn test_generate_quantization() {
    let sequence = piano(vec![Node::attribute("quant", 50.0), n(NoteName::C)]);
    assert!(close(sequence.notes[0].duration, 0.25));

    let sequence = piano(vec![Node::attribute("quantization", 200.0), n(NoteName::C)]);
    assert!(close(sequence.notes[0].duration, 0.5));
}

#[test]
fn test_generate_panning() {
    let sequence = piano(vec![n(NoteName::C), Node::attribute("panning", 100.0)]);

    assert_eq!(sequence.control_changes.len(), 1);
    let change = &sequence.control_changes[0];
    assert_eq!((change.control, change.value, change.channel), (10, 127, 0));
    assert!(close(change.time, 0.5));
}

#[test]
fn test_generate_octave_attribute() {
    let sequence = piano(vec![Node::attribute("octave", 2.0), n(NoteName::C)]);
    assert_eq!(sequence.notes[0].pitch, 36);
}

#[test]
fn test_generate_unknown_attribute_is_ignored() {
    let sequence = piano(vec![Node::attribute("reverb", 40.0), n(NoteName::C)]);
    assert_eq!(sequence.notes.len(), 1);
    assert_eq!(sequence.notes[0].velocity, 80);
}

// ============================================================================
// Parts and channels
// ============================================================================

#[test]
fn test_generate_instrument_program() {
    let sequence = generate(&Score::new(vec![Node::part(&["violin"], vec![n(NoteName::C)])]));

    assert_eq!(sequence.program_changes.len(), 1);
    let change = &sequence.program_changes[0];
    assert_eq!((change.program, change.channel), (40, 0));
    assert_eq!(change.time, 0.0);
}

#[test]
fn test_generate_unknown_instrument_uses_piano() {
    let sequence = generate(&Score::new(vec![Node::part(&["kazoo-orchestra"], vec![n(NoteName::C)])]));
    assert_eq!(sequence.program_changes[0].program, 0);
}

#[test]
fn test_generate_first_mapped_instrument_wins() {
    let sequence = generate(&Score::new(vec![Node::part(
        &["kazoo-orchestra", "cello", "violin"],
        vec![n(NoteName::C)],
    )]));
    assert_eq!(sequence.program_changes[0].program, 42);
}

#[test]
fn test_generate_channel_per_part() {
    let sequence = generate(&Score::new(vec![
        Node::part(&["piano"], vec![n(NoteName::C)]),
        Node::part(&["violin"], vec![n(NoteName::E)]),
        Node::part(&["piano"], vec![n(NoteName::D)]),
    ]));

    // re-entering a part neither reallocates nor repeats the program change
    assert_eq!(sequence.program_changes.len(), 2);
    let d = sequence.notes.iter().find(|note| note.pitch == 62).unwrap();
    assert_eq!(d.channel, 0);
    assert!(close(d.start_time, 0.5));
    let e = sequence.notes.iter().find(|note| note.pitch == 64).unwrap();
    assert_eq!(e.channel, 1);
    assert_eq!(e.start_time, 0.0);
}

#[test]
fn test_generate_default_part() {
    let sequence = generate(&Score::new(vec![
        n(NoteName::C),
        Node::part(&["violin"], vec![n(NoteName::E)]),
    ]));

    assert_eq!(sequence.notes[0].channel, 0);
    // only the declared part gets a program change
    assert_eq!(sequence.program_changes.len(), 1);
    assert_eq!(sequence.program_changes[0].channel, 1);
}

#[test]
fn test_generate_channel_cap() {
    let parts: Vec<Node> = (0..18)
        .map(|i| aliased("piano", &format!("piano-{i}"), vec![n(NoteName::C)]))
        .collect();
    let sequence = generate(&Score::new(parts));

    let channels: Vec<u8> = sequence.program_changes.iter().map(|change| change.channel).collect();
    assert_eq!(channels.len(), 18);
    assert_eq!(channels[15..], [15, 15, 15]);
    assert!(sequence.notes.iter().all(|note| note.channel <= 15));
}

#[test]
fn test_generate_output_sorted() {
    let sequence = generate(&Score::new(vec![
        Node::part(&["piano"], vec![n(NoteName::C), n(NoteName::D), n(NoteName::E)]),
        Node::part(&["violin"], vec![nd(NoteName::G, 8, 0), n(NoteName::A)]),
    ]));

    let times = starts(&sequence);
    assert!(times.windows(2).all(|pair| pair[0] <= pair[1]));
    // equal start times keep generation order
    assert_eq!(sequence.notes[0].pitch, 60);
    assert_eq!(sequence.notes[1].pitch, 67);
}

// ============================================================================
// Variables
// ============================================================================

#[test]
fn test_generate_variable_reference() {
    let sequence = piano(vec![
        Node::VariableDefinition {
            name: "motif".to_string(),
            events: vec![n(NoteName::C), n(NoteName::D), n(NoteName::E)],
        },
        Node::VariableReference { name: "motif".to_string() },
        Node::VariableReference { name: "motif".to_string() },
    ]);

    assert_eq!(pitches(&sequence), vec![60, 62, 64, 60, 62, 64]);
    assert!(close(sequence.notes[5].start_time, 2.5));
}

#[test]
fn test_generate_variable_uses_call_site_state() {
    let sequence = piano(vec![
        Node::VariableDefinition {
            name: "riff".to_string(),
            events: vec![n(NoteName::C)],
        },
        Node::VariableReference { name: "riff".to_string() },
        Node::OctaveUp,
        Node::attribute("tempo", 60.0),
        Node::VariableReference { name: "riff".to_string() },
    ]);

    assert_eq!(pitches(&sequence), vec![60, 72]);
    assert!(close(sequence.notes[0].duration, 0.45));
    assert!(close(sequence.notes[1].duration, 0.9));
}

#[test]
fn test_generate_undefined_variable() {
    let sequence = piano(vec![
        Node::VariableReference { name: "missing".to_string() },
        n(NoteName::C),
    ]);
    assert_eq!(sequence.notes.len(), 1);
    assert_eq!(sequence.notes[0].start_time, 0.0);
}

#[test]
fn test_generate_recursive_variable_terminates() {
    let sequence = piano(vec![
        Node::VariableDefinition {
            name: "loop".to_string(),
            events: vec![n(NoteName::C), Node::VariableReference { name: "loop".to_string() }],
        },
        Node::VariableReference { name: "loop".to_string() },
    ]);
    assert_eq!(sequence.notes.len(), 1);
}

// ============================================================================
// Repeats
// ============================================================================

#[test]
fn test_generate_repeat() {
    let sequence = piano(vec![Node::Repeat {
        event: Box::new(n(NoteName::C)),
        times: 4,
    }]);

    assert_eq!(sequence.notes.len(), 4);
    assert!(close(sequence.notes[3].start_time, 1.5));
}

#[test]
fn test_generate_repeat_bracketed() {
    let sequence = piano(vec![Node::Repeat {
        event: Box::new(Node::Bracketed {
            events: vec![n(NoteName::C), n(NoteName::D)],
        }),
        times: 3,
    }]);
    assert_eq!(pitches(&sequence), vec![60, 62, 60, 62, 60, 62]);
}

#[test]
fn test_generate_on_repetitions() {
    let sequence = piano(vec![Node::Repeat {
        event: Box::new(Node::Bracketed {
            events: vec![
                n(NoteName::C),
                Node::OnRepetitions {
                    event: Box::new(n(NoteName::D)),
                    ranges: vec![RepetitionRange { first: 2, last: None }],
                },
            ],
        }),
        times: 3,
    }]);

    assert_eq!(pitches(&sequence), vec![60, 60, 62, 60]);
    assert!(close(sequence.notes[3].start_time, 1.5));
}

#[test]
fn test_generate_inner_repeat_resets_ordinal() {
    let inner = Node::Repeat {
        event: Box::new(n(NoteName::C)),
        times: 2,
    };
    let first_only = Node::OnRepetitions {
        event: Box::new(n(NoteName::D)),
        ranges: vec![RepetitionRange { first: 1, last: None }],
    };
    let sequence = piano(vec![Node::Repeat {
        event: Box::new(Node::Bracketed {
            events: vec![inner, first_only],
        }),
        times: 2,
    }]);

    // the guard sees ordinal 1 after the inner loop on both outer passes
    assert_eq!(pitches(&sequence), vec![60, 60, 62, 60, 60, 62]);
}

#[test]
fn test_generate_on_repetitions_outside_repeat() {
    let guarded = |first, last| Node::OnRepetitions {
        event: Box::new(n(NoteName::C)),
        ranges: vec![RepetitionRange { first, last }],
    };
    // outside any repeat the ordinal is 1
    let sequence = piano(vec![guarded(1, None), guarded(2, Some(4))]);
    assert_eq!(sequence.notes.len(), 1);
}

// ============================================================================
// Voices, markers and crams
// ============================================================================

#[test]
fn test_generate_voice_group() {
    let sequence = piano(vec![
        Node::VoiceGroup {
            voices: vec![
                Voice {
                    number: 1,
                    events: vec![nd(NoteName::C, 1, 0)],
                },
                Voice {
                    number: 2,
                    events: vec![nd(NoteName::E, 4, 0), n(NoteName::G)],
                },
            ],
        },
        n(NoteName::B),
    ]);

    let expected = [(60, 0.0), (64, 0.0), (67, 0.5), (71, 2.0)];
    for (note, (pitch, start)) in sequence.notes.iter().zip(expected) {
        assert_eq!(note.pitch, pitch);
        assert!(close(note.start_time, start));
    }
}

#[test]
fn test_generate_markers() {
    let sequence = generate(&Score::new(vec![
        Node::part(
            &["piano"],
            vec![
                n(NoteName::C),
                n(NoteName::D),
                Node::Marker { name: "chorus".to_string() },
            ],
        ),
        Node::part(
            &["violin"],
            vec![Node::AtMarker { name: "chorus".to_string() }, n(NoteName::E)],
        ),
    ]));

    let e = sequence.notes.iter().find(|note| note.pitch == 64).unwrap();
    assert!(close(e.start_time, 1.0));
}

#[test]
fn test_generate_unknown_marker_is_ignored() {
    let sequence = piano(vec![Node::AtMarker { name: "nowhere".to_string() }, n(NoteName::C)]);
    assert_eq!(sequence.notes[0].start_time, 0.0);
}

#[test]
fn test_generate_cram_even_split() {
    let sequence = piano(vec![
        Node::Cram {
            events: vec![n(NoteName::C), n(NoteName::D), n(NoteName::E)],
            duration: Some(Duration::note(2, 0)),
        },
        n(NoteName::F),
    ]);

    let third = 1.0 / 3.0;
    assert!(close(sequence.notes[1].start_time, third));
    assert!(close(sequence.notes[2].start_time, 2.0 * third));
    assert!(close(sequence.notes[0].duration, third * 0.9));
    // the cram ends exactly on its duration and restores the default length
    assert!(close(sequence.notes[3].start_time, 1.0));
    assert!(close(sequence.notes[3].duration, 0.45));
}

#[test]
fn test_generate_cram_default_duration() {
    let sequence = piano(vec![Node::Cram {
        events: vec![n(NoteName::C), n(NoteName::D)],
        duration: None,
    }]);
    assert!(close(sequence.notes[1].start_time, 0.25));
}

#[test]
fn test_generate_cram_counts_nested_events() {
    let sequence = piano(vec![Node::Cram {
        events: vec![
            n(NoteName::C),
            Node::Repeat {
                event: Box::new(n(NoteName::D)),
                times: 2,
            },
            Node::Barline,
        ],
        duration: Some(Duration::note(1, 0)),
    }]);

    // a whole note (2s) split three ways
    let expected = [0.0, 2.0 / 3.0, 4.0 / 3.0];
    for (actual, expected) in starts(&sequence).into_iter().zip(expected) {
        assert!(close(actual, expected));
    }
}

#[test]
fn test_generate_cram_snaps_to_total() {
    let sequence = piano(vec![
        Node::Cram {
            events: vec![nd(NoteName::C, 8, 0), nd(NoteName::D, 8, 0)],
            duration: Some(Duration::note(1, 0)),
        },
        n(NoteName::E),
    ]);
    assert!(close(sequence.notes[2].start_time, 2.0));
}

#[test]
fn test_generate_empty_cram_does_not_advance() {
    let sequence = piano(vec![
        Node::Cram {
            events: vec![Node::Barline],
            duration: Some(Duration::note(1, 0)),
        },
        n(NoteName::C),
    ]);
    assert_eq!(sequence.notes[0].start_time, 0.0);
}

#[test]
fn test_generate_from_yaml_score() {
    let source = r#"
children:
  - type: part
    declaration: { names: [cello] }
    events:
      - { type: attribute, name: tempo, value: 60 }
      - { type: octave-set, octave: 3 }
      - type: chord
        notes:
          - { type: note, letter: c }
          - { type: note, letter: g }
      - { type: note, letter: e, accidentals: [flat] }
"#;
    let sequence = generate(&Score::from_yaml(source).unwrap());

    assert_eq!(sequence.program_changes[0].program, 42);
    assert_eq!(pitches(&sequence), vec![48, 55, 51]);
    assert!(close(sequence.notes[2].start_time, 1.0));
}

#[test]
fn test_generate_nodes_matches_generate() {
    let nodes = vec![n(NoteName::C), n(NoteName::D)];
    assert_eq!(generate_nodes(&nodes), generate(&Score::new(nodes.clone())));
}
