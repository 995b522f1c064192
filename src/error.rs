//! # Error Types
//!
//! This module defines all error types for the aldakit core.
//!
//! Only a few operations can fail. Score interpretation and transcription are
//! total: unknown attributes, unmapped instruments or odd timing degrade to
//! defaults instead of producing errors. What remains is malformed MIDI files,
//! filesystem access, configuration, and the recording-session boundary.
//!
//! ## Error Types
//! - `MidiParse` - Standard MIDI File decoding failures with a byte offset
//! - `Io` - Reading or writing files
//! - `Config` - Unusable configuration values
//! - `Yaml` - Malformed YAML for configuration files or score trees
//! - `Session` - Recording session used outside its start/stop lifecycle
//!
//! ## Usage
//! ```rust
//! use aldakit::{midi::decode_smf, AldaError};
//!
//! match decode_smf(b"not a midi file") {
//!     Ok(sequence) => println!("{} notes", sequence.notes.len()),
//!     Err(AldaError::MidiParse { offset, message }) => {
//!         eprintln!("Bad MIDI data at byte {}: {}", offset, message);
//!     }
//!     Err(e) => eprintln!("Error: {}", e),
//! }
//! ```

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AldaError {
    /// Malformed Standard MIDI File.
    ///
    /// Raised by the decoder when the header magic is missing, the data is
    /// truncated, or a chunk claims more bytes than remain in the buffer.
    ///
    /// # Example
    /// ```
    /// # use aldakit::AldaError;
    /// let err = AldaError::MidiParse {
    ///     offset: 0,
    ///     message: "missing MThd header".to_string(),
    /// };
    /// assert_eq!(err.to_string(), "MIDI parse error at byte 0: missing MThd header");
    /// ```
    #[error("MIDI parse error at byte {offset}: {message}")]
    MidiParse { offset: usize, message: String },

    /// Filesystem failure while reading or writing a file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration value that cannot be used even after clamping.
    ///
    /// # Example
    /// ```
    /// # use aldakit::AldaError;
    /// let err = AldaError::Config("ticks-per-beat must be between 1 and 32767".to_string());
    /// assert_eq!(err.to_string(), "Invalid configuration: ticks-per-beat must be between 1 and 32767");
    /// ```
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// YAML that does not describe a configuration or score tree.
    #[error("Invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Recording session misuse (for example feeding a session that was stopped).
    #[error("Recording session error: {0}")]
    Session(String),
}

impl AldaError {
    pub(crate) fn midi_parse(offset: usize, message: impl Into<String>) -> Self {
        AldaError::MidiParse {
            offset,
            message: message.into(),
        }
    }
}
