pub mod ast;
pub mod config;
pub mod error;
pub mod generator;
pub mod midi;
pub mod notation;
pub mod pitch;
pub mod time;
pub mod transcribe;

pub use ast::{Node, Score};
pub use config::Config;
pub use error::*;
pub use generator::generate;
pub use midi::{decode_smf, encode_smf, PerformanceSequence};
pub use transcribe::{quantize, QuantizeOptions, Transcription};

/// Interpret a score tree into performance events.
/// This is the main entry point for the library.
pub fn compile(score: &Score) -> PerformanceSequence {
    generate(score)
}

/// Compile a score tree straight to Standard MIDI File bytes
pub fn render_smf(score: &Score) -> Vec<u8> {
    encode_smf(&generate(score))
}

/// Compile a score tree to SMF bytes at the configured resolution
pub fn render_smf_with(score: &Score, config: &Config) -> Vec<u8> {
    let mut sequence = generate(score);
    sequence.ticks_per_beat = config.ticks_per_beat;
    encode_smf(&sequence)
}

/// Decode SMF bytes and rebuild a score tree from them
pub fn import_smf(bytes: &[u8]) -> Result<Score, AldaError> {
    let sequence = decode_smf(bytes)?;
    Ok(midi::sequence_to_score(&sequence, &midi::ImportOptions::default()))
}
