//! # Pitches and Instruments
//!
//! MIDI pitch arithmetic (C4 = 60, middle C) and the General MIDI program
//! table used to resolve part names.
//!
//! Instrument names are matched case-insensitively with underscores treated
//! as hyphens. Every General MIDI program is reachable as `midi-<name>`
//! (e.g. `midi-electric-guitar-jazz`) or as the bare `<name>`, and the common
//! orchestral names (`piano`, `violin`, `flute`, ...) are aliases.

use crate::ast::{Accidental, NoteName};

/// General MIDI level 1 program names, indexed by program number
const GM_PROGRAMS: [&str; 128] = [
    // Piano
    "acoustic-grand-piano", "bright-acoustic-piano", "electric-grand-piano", "honky-tonk-piano",
    "electric-piano-1", "electric-piano-2", "harpsichord", "clavi",
    // Chromatic percussion
    "celesta", "glockenspiel", "music-box", "vibraphone",
    "marimba", "xylophone", "tubular-bells", "dulcimer",
    // Organ
    "drawbar-organ", "percussive-organ", "rock-organ", "church-organ",
    "reed-organ", "accordion", "harmonica", "tango-accordion",
    // Guitar
    "acoustic-guitar-nylon", "acoustic-guitar-steel", "electric-guitar-jazz", "electric-guitar-clean",
    "electric-guitar-muted", "overdriven-guitar", "distortion-guitar", "guitar-harmonics",
    // Bass
    "acoustic-bass", "electric-bass-finger", "electric-bass-pick", "fretless-bass",
    "slap-bass-1", "slap-bass-2", "synth-bass-1", "synth-bass-2",
    // Strings
    "violin", "viola", "cello", "contrabass",
    "tremolo-strings", "pizzicato-strings", "orchestral-harp", "timpani",
    // Ensemble
    "string-ensemble-1", "string-ensemble-2", "synth-strings-1", "synth-strings-2",
    "choir-aahs", "voice-oohs", "synth-voice", "orchestra-hit",
    // Brass
    "trumpet", "trombone", "tuba", "muted-trumpet",
    "french-horn", "brass-section", "synth-brass-1", "synth-brass-2",
    // Reed
    "soprano-sax", "alto-sax", "tenor-sax", "baritone-sax",
    "oboe", "english-horn", "bassoon", "clarinet",
    // Pipe
    "piccolo", "flute", "recorder", "pan-flute",
    "blown-bottle", "shakuhachi", "whistle", "ocarina",
    // Synth lead
    "lead-1-square", "lead-2-sawtooth", "lead-3-calliope", "lead-4-chiff",
    "lead-5-charang", "lead-6-voice", "lead-7-fifths", "lead-8-bass-and-lead",
    // Synth pad
    "pad-1-new-age", "pad-2-warm", "pad-3-polysynth", "pad-4-choir",
    "pad-5-bowed", "pad-6-metallic", "pad-7-halo", "pad-8-sweep",
    // Synth effects
    "fx-1-rain", "fx-2-soundtrack", "fx-3-crystal", "fx-4-atmosphere",
    "fx-5-brightness", "fx-6-goblins", "fx-7-echoes", "fx-8-sci-fi",
    // Ethnic
    "sitar", "banjo", "shamisen", "koto",
    "kalimba", "bagpipe", "fiddle", "shanai",
    // Percussive
    "tinkle-bell", "agogo", "steel-drums", "woodblock",
    "taiko-drum", "melodic-tom", "synth-drum", "reverse-cymbal",
    // Sound effects
    "guitar-fret-noise", "breath-noise", "seashore", "bird-tweet",
    "telephone-ring", "helicopter", "applause", "gunshot",
];

/// Short names for common instruments. The first alias listed for a program
/// is the name used when importing MIDI files.
const ALIASES: &[(&str, u8)] = &[
    ("piano", 0),
    ("harpsichord", 6),
    ("celesta", 8),
    ("glockenspiel", 9),
    ("vibraphone", 11),
    ("marimba", 12),
    ("xylophone", 13),
    ("organ", 19),
    ("accordion", 21),
    ("harmonica", 22),
    ("guitar", 24),
    ("acoustic-guitar", 24),
    ("electric-guitar", 27),
    ("electric-bass", 33),
    ("upright-bass", 32),
    ("violin", 40),
    ("viola", 41),
    ("cello", 42),
    ("double-bass", 43),
    ("contrabass", 43),
    ("harp", 46),
    ("timpani", 47),
    ("strings", 48),
    ("choir", 52),
    ("trumpet", 56),
    ("trombone", 57),
    ("tuba", 58),
    ("french-horn", 60),
    ("soprano-sax", 64),
    ("soprano-saxophone", 64),
    ("alto-sax", 65),
    ("alto-saxophone", 65),
    ("tenor-sax", 66),
    ("tenor-saxophone", 66),
    ("baritone-sax", 67),
    ("baritone-saxophone", 67),
    ("oboe", 68),
    ("english-horn", 69),
    ("bassoon", 70),
    ("clarinet", 71),
    ("piccolo", 72),
    ("flute", 73),
    ("recorder", 74),
    ("pan-flute", 75),
    ("ocarina", 79),
    ("sitar", 104),
    ("banjo", 105),
    ("bagpipes", 109),
    ("bagpipe", 109),
];

/// MIDI pitch for a note letter in an octave, with stacked accidentals.
///
/// Octave 4 starts at middle C, so `c` in octave 4 is 60 and `a` is 69.
/// The result is clamped to the MIDI range 0-127.
///
/// # Example
/// ```
/// use aldakit::ast::{Accidental, NoteName};
/// use aldakit::pitch::note_to_midi;
///
/// assert_eq!(note_to_midi(NoteName::C, 4, &[]), 60);
/// assert_eq!(note_to_midi(NoteName::B, 3, &[Accidental::Flat]), 58);
/// ```
pub fn note_to_midi(letter: NoteName, octave: i32, accidentals: &[Accidental]) -> u8 {
    let offset = accidentals
        .iter()
        .fold(0i32, |sum, accidental| sum.saturating_add(accidental.offset()));
    let pitch = octave
        .saturating_add(1)
        .saturating_mul(12)
        .saturating_add(letter.semitone())
        .saturating_add(offset);
    pitch.clamp(0, 127) as u8
}

/// Spell a MIDI pitch as letter, octave and accidental, using sharps for black keys.
pub fn midi_to_note(pitch: u8) -> (NoteName, i32, Option<Accidental>) {
    let octave = (pitch / 12) as i32 - 1;
    let (letter, accidental) = match pitch % 12 {
        0 => (NoteName::C, None),
        1 => (NoteName::C, Some(Accidental::Sharp)),
        2 => (NoteName::D, None),
        3 => (NoteName::D, Some(Accidental::Sharp)),
        4 => (NoteName::E, None),
        5 => (NoteName::F, None),
        6 => (NoteName::F, Some(Accidental::Sharp)),
        7 => (NoteName::G, None),
        8 => (NoteName::G, Some(Accidental::Sharp)),
        9 => (NoteName::A, None),
        10 => (NoteName::A, Some(Accidental::Sharp)),
        _ => (NoteName::B, None),
    };
    (letter, octave, accidental)
}

/// Look up the General MIDI program for an instrument name
pub fn instrument_program(name: &str) -> Option<u8> {
    let normalized = name.trim().to_lowercase().replace('_', "-");
    let bare = normalized.strip_prefix("midi-").unwrap_or(&normalized);

    if let Some((_, program)) = ALIASES.iter().find(|(alias, _)| *alias == bare) {
        return Some(*program);
    }
    GM_PROGRAMS
        .iter()
        .position(|gm| *gm == bare)
        .map(|program| program as u8)
}

/// Instrument name for a General MIDI program (inverse of [`instrument_program`])
pub fn program_instrument(program: u8) -> String {
    match ALIASES.iter().find(|(_, p)| *p == program) {
        Some((alias, _)) => alias.to_string(),
        None => format!("midi-{}", GM_PROGRAMS[(program & 0x7F) as usize]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_middle_c_and_a440() {
        assert_eq!(note_to_midi(NoteName::C, 4, &[]), 60);
        assert_eq!(note_to_midi(NoteName::A, 4, &[]), 69);
    }

    #[test]
    fn test_stacked_accidentals() {
        assert_eq!(note_to_midi(NoteName::C, 4, &[Accidental::Sharp]), 61);
        assert_eq!(note_to_midi(NoteName::C, 4, &[Accidental::Sharp, Accidental::Sharp]), 62);
        assert_eq!(note_to_midi(NoteName::B, 4, &[Accidental::Flat]), 70);
        assert_eq!(note_to_midi(NoteName::C, 4, &[Accidental::Natural]), 60);
    }

    #[test]
    fn test_octave_extremes_clamp() {
        assert_eq!(note_to_midi(NoteName::C, 0, &[]), 12);
        assert_eq!(note_to_midi(NoteName::C, -1, &[Accidental::Flat]), 0);
        assert_eq!(note_to_midi(NoteName::B, 9, &[]), 127);
        assert_eq!(note_to_midi(NoteName::C, i32::MAX, &[Accidental::Sharp]), 127);
        assert_eq!(note_to_midi(NoteName::C, i32::MIN, &[Accidental::Flat]), 0);
    }

    #[test]
    fn test_midi_to_note() {
        assert_eq!(midi_to_note(60), (NoteName::C, 4, None));
        assert_eq!(midi_to_note(61), (NoteName::C, 4, Some(Accidental::Sharp)));
        assert_eq!(midi_to_note(69), (NoteName::A, 4, None));
        assert_eq!(midi_to_note(36), (NoteName::C, 2, None));
        assert_eq!(midi_to_note(84), (NoteName::C, 6, None));
    }

    #[test]
    fn test_instrument_lookup_is_normalized() {
        assert_eq!(instrument_program("piano"), Some(0));
        assert_eq!(instrument_program("Violin"), Some(40));
        assert_eq!(instrument_program("midi-acoustic-grand-piano"), Some(0));
        assert_eq!(instrument_program("electric_guitar_jazz"), Some(26));
        assert_eq!(instrument_program("MIDI_GUNSHOT"), Some(127));
        assert_eq!(instrument_program("theremin"), None);
    }

    #[test]
    fn test_program_instrument_round_trips() {
        assert_eq!(program_instrument(0), "piano");
        assert_eq!(program_instrument(40), "violin");
        assert_eq!(program_instrument(1), "midi-bright-acoustic-piano");
        for program in 0..128u8 {
            assert_eq!(instrument_program(&program_instrument(program)), Some(program));
        }
    }
}
