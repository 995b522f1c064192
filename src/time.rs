//! # Time Model
//!
//! Beats, seconds and microsecond tempos shared by the generator, the MIDI
//! codec and the transcription quantizer.
//!
//! A beat is always a quarter note. Tempo is given in beats per minute (BPM);
//! MIDI files store it as microseconds per beat.

/// Tempo assumed wherever no tempo has been set.
pub const DEFAULT_TEMPO_BPM: f64 = 120.0;

/// Microseconds per beat at [`DEFAULT_TEMPO_BPM`].
pub const DEFAULT_TEMPO_US: u32 = 500_000;

/// Convert beats to seconds at the given tempo.
///
/// # Example
/// ```
/// use aldakit::time::beats_to_seconds;
/// assert_eq!(beats_to_seconds(1.0, 120.0), 0.5);
/// ```
pub fn beats_to_seconds(beats: f64, bpm: f64) -> f64 {
    beats * 60.0 / bpm
}

/// Convert seconds to beats at the given tempo.
pub fn seconds_to_beats(seconds: f64, bpm: f64) -> f64 {
    seconds * bpm / 60.0
}

/// Convert BPM to microseconds per beat, truncated to an integer.
pub fn bpm_to_us_per_beat(bpm: f64) -> u32 {
    (60_000_000.0 / bpm) as u32
}

/// Convert microseconds per beat back to BPM.
pub fn us_per_beat_to_bpm(us_per_beat: u32) -> f64 {
    60_000_000.0 / us_per_beat as f64
}

/// Length in beats of a note value written as a denominator plus dots.
///
/// `4` is a quarter note (1 beat), `8` an eighth, `12` a triplet eighth.
/// Every dot adds half of the previous addition: `4.` = 1.5, `4..` = 1.75.
/// A zero denominator has no length.
pub fn note_length_beats(denominator: u32, dots: u8) -> f64 {
    if denominator == 0 {
        return 0.0;
    }
    let base = 4.0 / denominator as f64;
    let mut total = base;
    let mut addition = base / 2.0;
    for _ in 0..dots {
        total += addition;
        addition /= 2.0;
    }
    total
}

/// Snap a value to the nearest multiple of `grid`. A non-positive grid leaves
/// the value unchanged.
pub fn quantize_to_grid(value: f64, grid: f64) -> f64 {
    if grid <= 0.0 {
        return value;
    }
    (value / grid).round() * grid
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_beats_and_seconds() {
        assert_eq!(beats_to_seconds(2.0, 120.0), 1.0);
        assert_eq!(seconds_to_beats(1.0, 60.0), 1.0);
        assert_eq!(seconds_to_beats(0.5, 120.0), 1.0);
    }

    #[test]
    fn test_tempo_conversions() {
        assert_eq!(bpm_to_us_per_beat(120.0), DEFAULT_TEMPO_US);
        assert_eq!(bpm_to_us_per_beat(60.0), 1_000_000);
        assert_eq!(us_per_beat_to_bpm(500_000), 120.0);
    }

    #[test]
    fn test_note_lengths() {
        assert_eq!(note_length_beats(1, 0), 4.0);
        assert_eq!(note_length_beats(4, 0), 1.0);
        assert_eq!(note_length_beats(4, 1), 1.5);
        assert_eq!(note_length_beats(4, 2), 1.75);
        assert_eq!(note_length_beats(8, 1), 0.75);
        assert!((note_length_beats(12, 0) - 1.0 / 3.0).abs() < 1e-12);
        assert_eq!(note_length_beats(0, 0), 0.0);
    }

    #[test]
    fn test_quantize_to_grid() {
        assert_eq!(quantize_to_grid(0.3, 0.25), 0.25);
        assert_eq!(quantize_to_grid(0.4, 0.25), 0.5);
        assert_eq!(quantize_to_grid(0.3, 0.0), 0.3);
    }
}
