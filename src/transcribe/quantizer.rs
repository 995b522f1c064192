//! Recorded notes to quantized notation
//!
//! The pipeline runs once over the complete recording:
//! 1. sort by start and group notes starting within 2 ms into chords
//! 2. fill gaps longer than 50 ms with rests
//! 3. quantize each group's longest duration to the grid (or swing it)
//! 4. decompose the quantized length into catalog note values, slurring all
//!    but the last
//! 5. for tuplet feels, collapse runs of N subdivision-long elements into crams

use tracing::debug;

use super::types::{
    Feel, QuantizeOptions, RecordedNote, Transcription, TranscriptionMetadata,
    CHORD_TOLERANCE_SECONDS, MIN_REST_GAP_SECONDS, SWING_MAX_BEATS, SWING_MIN_BEATS,
};
use crate::notation::{beats_to_duration, decompose_beats, Element, NotationNote};
use crate::pitch::midi_to_note;
use crate::time;

/// Remainders below this many beats end a decomposition chain
const MIN_SEGMENT_TOLERANCE: f64 = 0.005;

/// Quantize recorded notes into notation.
///
/// Never fails: negative lengths are clamped to zero and every decomposition
/// is bounded, so any input produces a (possibly empty) transcription.
///
/// # Example
/// ```rust
/// use aldakit::notation::Element;
/// use aldakit::transcribe::{quantize, QuantizeOptions, RecordedNote};
///
/// // 0.375s at 120 BPM is three quarters of a beat
/// let notes = [RecordedNote { pitch: 60, velocity: 90, start_time: 0.0, duration: 0.375 }];
/// let transcription = quantize(&notes, &QuantizeOptions::default());
///
/// let Element::Note(note) = &transcription.elements[0] else { panic!("expected a note") };
/// assert_eq!((note.duration, note.dots), (8, 1));
/// ```
pub fn quantize(notes: &[RecordedNote], options: &QuantizeOptions) -> Transcription {
    let mut quantizer = Quantizer::new(options);
    let elements = quantizer.elements(notes);

    let elements = match options.feel.tuplet_division() {
        Some(division) => collapse_tuplets(elements, division),
        None => elements,
    };

    debug!(
        notes = notes.len(),
        elements = elements.len(),
        feel = %options.feel,
        "quantized recording"
    );

    Transcription {
        elements,
        metadata: TranscriptionMetadata::from_options(options),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Note,
    Rest,
}

struct Quantizer<'a> {
    options: &'a QuantizeOptions,
    /// Swing state: whether the next swingable note takes the long value
    swing_long_next: bool,
}

impl<'a> Quantizer<'a> {
    fn new(options: &'a QuantizeOptions) -> Self {
        Self {
            options,
            swing_long_next: true,
        }
    }

    fn elements(&mut self, notes: &[RecordedNote]) -> Vec<Element> {
        let mut sorted = notes.to_vec();
        sorted.sort_by(|a, b| a.start_time.total_cmp(&b.start_time));

        let mut elements = Vec::new();
        let mut cursor = 0.0;

        for group in group_chords(&sorted) {
            let start = group[0].start_time;

            let gap = start - cursor;
            if gap > MIN_REST_GAP_SECONDS {
                let beats = self.options.seconds_to_beats(gap);
                for (duration, dots) in self.segments(beats, Kind::Rest) {
                    elements.push(Element::Rest { duration, dots });
                }
            }

            let longest = group.iter().map(|note| note.duration).fold(0.0, f64::max);
            let segments = self.segments(self.options.seconds_to_beats(longest), Kind::Note);
            if segments.is_empty() {
                debug!(start, "group quantized to nothing");
                continue;
            }

            push_group(group, &segments, &mut elements);
            cursor = start + longest;
        }

        elements
    }

    /// Quantize a length and break it into catalog note values
    fn segments(&mut self, beats: f64, kind: Kind) -> Vec<(u32, u8)> {
        let quantized = self.quantize_beats(beats, kind).max(0.0);
        let grid = self.options.effective_grid();
        let tolerance = if grid > 0.0 {
            (grid / 16.0).max(MIN_SEGMENT_TOLERANCE)
        } else {
            MIN_SEGMENT_TOLERANCE
        };
        decompose_beats(quantized, tolerance)
    }

    fn quantize_beats(&mut self, beats: f64, kind: Kind) -> f64 {
        let beats = beats.max(0.0);

        if kind == Kind::Note && self.options.feel == Feel::Swing {
            if SWING_MIN_BEATS < beats && beats < SWING_MAX_BEATS {
                let long = self.options.swing_ratio.clamp(0.0, 1.0);
                let value = if self.swing_long_next { long } else { 1.0 - long };
                self.swing_long_next = !self.swing_long_next;
                return value;
            }
            self.swing_long_next = true;
        }

        time::quantize_to_grid(beats, self.options.effective_grid())
    }
}

/// Split sorted notes into groups whose starts lie within the chord
/// tolerance of the group's first note
fn group_chords(notes: &[RecordedNote]) -> Vec<&[RecordedNote]> {
    let mut groups = Vec::new();
    let mut first = 0;

    for (index, note) in notes.iter().enumerate().skip(1) {
        if (note.start_time - notes[first].start_time).abs() > CHORD_TOLERANCE_SECONDS {
            groups.push(&notes[first..index]);
            first = index;
        }
    }
    if first < notes.len() {
        groups.push(&notes[first..]);
    }
    groups
}

fn push_group(group: &[RecordedNote], segments: &[(u32, u8)], elements: &mut Vec<Element>) {
    let last = segments.len().saturating_sub(1);

    for (index, &(duration, dots)) in segments.iter().enumerate() {
        let slurred = index < last;
        let mut notes: Vec<NotationNote> = group
            .iter()
            .map(|recorded| {
                let (letter, octave, accidental) = midi_to_note(recorded.pitch);
                NotationNote {
                    letter,
                    accidental,
                    octave,
                    duration,
                    dots,
                    slurred,
                }
            })
            .collect();

        let element = if notes.len() > 1 {
            Element::Chord { notes }
        } else {
            match notes.pop() {
                Some(note) => Element::Note(note),
                None => continue,
            }
        };
        elements.push(element);
    }
}

/// Replace runs of exactly `division` elements, each a 1/`division` beat
/// long, with a cram of one beat.
///
/// Crams never nest. Elements keep their slurs unless they end up inside a
/// cram.
pub fn collapse_tuplets(elements: Vec<Element>, division: u32) -> Vec<Element> {
    if division <= 1 {
        return elements;
    }

    let size = division as usize;
    let target = 1.0 / division as f64;
    let tolerance = target / 8.0;

    let mut collapsed = Vec::with_capacity(elements.len());
    let mut run: Vec<Element> = Vec::with_capacity(size);
    let mut run_beats = 0.0;

    for element in elements {
        let beats = element.beats();
        let fits = !matches!(element, Element::Cram { .. }) && (beats - target).abs() <= tolerance;
        if !fits {
            collapsed.append(&mut run);
            run_beats = 0.0;
            collapsed.push(element);
            continue;
        }

        run_beats += beats;
        run.push(element);

        if run.len() == size {
            let whole = size as f64 * target;
            if (run_beats - whole).abs() <= tolerance * size as f64 {
                let (duration, dots) = beats_to_duration(whole);
                collapsed.push(Element::Cram {
                    elements: run.drain(..).map(|e| e.without_slurs()).collect(),
                    duration,
                    dots,
                });
            } else {
                collapsed.append(&mut run);
            }
            run_beats = 0.0;
        }
    }

    collapsed.append(&mut run);
    collapsed
}
