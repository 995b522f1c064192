//! Recording session: message queue, note pairing and the polling loop
//!
//! An input callback (on any thread) pushes raw messages through a
//! [`MessageSender`]. The owner of the [`RecordingSession`] polls it, which
//! drains the queue and pairs note-ons with note-offs. Stopping drains what
//! is left, closes notes that are still held, and quantizes everything once.

use std::collections::HashMap;
use std::io::{ErrorKind, Read};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam::channel::{Receiver, Sender};
use tracing::{debug, info};

use super::quantizer::quantize;
use super::types::{
    QuantizeOptions, RawMessage, RecordedNote, Transcription, MIN_HELD_NOTE_SECONDS,
    MIN_NOTE_SECONDS,
};
use crate::error::AldaError;

/// Observer for paired notes: `(pitch, velocity, is_note_on)`
pub type NoteCallback = Box<dyn FnMut(u8, u8, bool) + Send>;

/// Default interval between polls of [`record`]
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Cloneable handle input sources use to feed a session
#[derive(Debug, Clone)]
pub struct MessageSender {
    inner: Sender<RawMessage>,
}

impl MessageSender {
    pub fn send(&self, message: RawMessage) -> Result<(), AldaError> {
        self.inner
            .send(message)
            .map_err(|_| AldaError::Session("recording session no longer exists".to_string()))
    }

    /// Send raw port bytes, ignoring anything too short to be a message
    pub fn send_bytes(&self, bytes: &[u8]) -> Result<(), AldaError> {
        match RawMessage::from_bytes(bytes) {
            Some(message) => self.send(message),
            None => Ok(()),
        }
    }
}

/// Splits a raw MIDI byte stream (a device file, a pipe) into channel messages.
///
/// Running status is honoured. Realtime bytes may appear anywhere and are
/// dropped; system exclusive and system common messages are skipped.
#[derive(Debug, Clone, Default)]
pub struct StreamFramer {
    status: Option<u8>,
    data: [u8; 2],
    len: usize,
}

impl StreamFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one byte; returns a message once its last data byte arrives
    pub fn push(&mut self, byte: u8) -> Option<RawMessage> {
        if byte >= 0xF8 {
            return None;
        }
        if byte >= 0xF0 {
            self.status = None;
            self.len = 0;
            return None;
        }
        if byte & 0x80 != 0 {
            self.status = Some(byte);
            self.len = 0;
            return None;
        }

        let status = self.status?;
        self.data[self.len] = byte;
        self.len += 1;

        let needed = match status & 0xF0 {
            0xC0 | 0xD0 => 1,
            _ => 2,
        };
        if self.len < needed {
            return None;
        }
        self.len = 0;
        Some(RawMessage {
            status,
            data1: self.data[0],
            data2: if needed == 2 { self.data[1] } else { 0 },
        })
    }
}

/// Read a raw MIDI byte stream until end of input, forwarding every channel
/// message to `sender`. Returns how many messages were sent.
pub fn forward_stream(mut reader: impl Read, sender: &MessageSender) -> Result<usize, AldaError> {
    let mut framer = StreamFramer::new();
    let mut buffer = [0u8; 256];
    let mut sent = 0;

    loop {
        let read = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(read) => read,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        for &byte in &buffer[..read] {
            if let Some(message) = framer.push(byte) {
                sender.send(message)?;
                sent += 1;
            }
        }
    }

    debug!(sent, "input stream ended");
    Ok(sent)
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct HeldNote {
    velocity: u8,
    start_time: f64,
}

/// Pairs note-ons with note-offs per pitch
#[derive(Debug, Default)]
pub struct NotePairer {
    held: HashMap<u8, HeldNote>,
    recorded: Vec<RecordedNote>,
}

impl NotePairer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a note. A note already held at this pitch is released first and returned.
    pub fn note_on(&mut self, pitch: u8, velocity: u8, time: f64) -> Option<RecordedNote> {
        let released = self.note_off(pitch, time);
        self.held.insert(
            pitch,
            HeldNote {
                velocity,
                start_time: time,
            },
        );
        released
    }

    /// Release the note held at this pitch, if any
    pub fn note_off(&mut self, pitch: u8, time: f64) -> Option<RecordedNote> {
        let held = self.held.remove(&pitch)?;
        let note = RecordedNote {
            pitch,
            velocity: held.velocity,
            start_time: held.start_time,
            duration: (time - held.start_time).max(MIN_NOTE_SECONDS),
        };
        self.recorded.push(note);
        Some(note)
    }

    /// Apply one raw message at `time`, reporting each started or released
    /// note to `notify`. Only note-on and note-off messages are interpreted.
    pub fn process(&mut self, message: RawMessage, time: f64, mut notify: impl FnMut(u8, u8, bool)) {
        match message.status & 0xF0 {
            0x90 if message.data2 > 0 => {
                if let Some(released) = self.note_on(message.data1, message.data2, time) {
                    notify(released.pitch, 0, false);
                }
                notify(message.data1, message.data2, true);
            }
            // note-on with velocity 0 releases too
            0x80 | 0x90 => {
                if self.note_off(message.data1, time).is_some() {
                    notify(message.data1, 0, false);
                }
            }
            _ => {}
        }
    }

    /// Release every held note at `time`, in start order
    pub fn close_all(&mut self, time: f64) {
        let mut held: Vec<(u8, HeldNote)> = self.held.drain().collect();
        held.sort_by(|a, b| a.1.start_time.total_cmp(&b.1.start_time).then(a.0.cmp(&b.0)));

        for (pitch, note) in held {
            self.recorded.push(RecordedNote {
                pitch,
                velocity: note.velocity,
                start_time: note.start_time,
                duration: (time - note.start_time).max(MIN_HELD_NOTE_SECONDS),
            });
        }
    }

    pub fn held_count(&self) -> usize {
        self.held.len()
    }

    pub fn recorded(&self) -> &[RecordedNote] {
        &self.recorded
    }

    pub fn take_recorded(&mut self) -> Vec<RecordedNote> {
        std::mem::take(&mut self.recorded)
    }

    pub fn clear(&mut self) {
        self.held.clear();
        self.recorded.clear();
    }
}

/// A live transcription session.
///
/// # Example
/// ```rust
/// use aldakit::transcribe::{QuantizeOptions, RawMessage, RecordingSession};
///
/// let mut session = RecordingSession::new(QuantizeOptions::default());
/// let input = session.sender();
///
/// session.start();
/// input.send(RawMessage::note_on(0, 60, 100)).unwrap();
/// session.poll_at(0.0);
/// input.send(RawMessage::note_off(0, 60)).unwrap();
/// session.poll_at(0.5);
///
/// let transcription = session.stop_at(1.0);
/// assert_eq!(transcription.elements.len(), 1);
/// ```
pub struct RecordingSession {
    options: QuantizeOptions,
    sender: Sender<RawMessage>,
    receiver: Receiver<RawMessage>,
    pairer: NotePairer,
    started: Option<Instant>,
    on_note: Option<NoteCallback>,
}

impl RecordingSession {
    pub fn new(options: QuantizeOptions) -> Self {
        let (sender, receiver) = crossbeam::channel::unbounded();
        Self {
            options,
            sender,
            receiver,
            pairer: NotePairer::new(),
            started: None,
            on_note: None,
        }
    }

    pub fn options(&self) -> &QuantizeOptions {
        &self.options
    }

    /// Handle for input sources; may be cloned and moved to other threads
    pub fn sender(&self) -> MessageSender {
        MessageSender {
            inner: self.sender.clone(),
        }
    }

    pub fn on_note(&mut self, callback: impl FnMut(u8, u8, bool) + Send + 'static) {
        self.on_note = Some(Box::new(callback));
    }

    /// Begin recording. Resets all recorded state and discards messages
    /// queued while the session was not running. Starting a running session
    /// does nothing.
    pub fn start(&mut self) {
        if self.is_running() {
            return;
        }
        let stale = self.receiver.try_iter().count();
        if stale > 0 {
            debug!(stale, "discarding messages queued before start");
        }
        self.pairer.clear();
        self.started = Some(Instant::now());
        info!(feel = %self.options.feel, tempo = self.options.tempo, "recording started");
    }

    pub fn is_running(&self) -> bool {
        self.started.is_some()
    }

    /// Seconds since the session started (0 when not running)
    pub fn elapsed(&self) -> f64 {
        self.started.map_or(0.0, |started| started.elapsed().as_secs_f64())
    }

    pub fn recorded(&self) -> &[RecordedNote] {
        self.pairer.recorded()
    }

    /// Drain queued messages, timestamping them with the current session time
    pub fn poll(&mut self) -> usize {
        let now = self.elapsed();
        self.poll_at(now)
    }

    /// Drain queued messages, timestamping them with `time` (seconds since
    /// start). Returns how many messages were processed.
    pub fn poll_at(&mut self, time: f64) -> usize {
        if !self.is_running() {
            return 0;
        }

        let mut processed = 0;
        while let Ok(message) = self.receiver.try_recv() {
            self.handle(message, time);
            processed += 1;
        }
        processed
    }

    /// Stop at the current session time and quantize the recording
    pub fn stop(&mut self) -> Transcription {
        let now = self.elapsed();
        self.stop_at(now)
    }

    /// Stop at `time` (seconds since start): drain the queue, release held
    /// notes at `time`, and quantize everything recorded. Stopping a session
    /// that is not running yields an empty transcription.
    pub fn stop_at(&mut self, time: f64) -> Transcription {
        if !self.is_running() {
            return Transcription::empty(&self.options);
        }

        self.poll_at(time);
        let held = self.pairer.held_count();
        self.pairer.close_all(time);
        self.started = None;

        let notes = self.pairer.take_recorded();
        info!(notes = notes.len(), held, "recording stopped");
        quantize(&notes, &self.options)
    }

    fn handle(&mut self, message: RawMessage, time: f64) {
        let on_note = &mut self.on_note;
        self.pairer.process(message, time, |pitch, velocity, is_note_on| {
            if let Some(callback) = on_note.as_mut() {
                callback(pitch, velocity, is_note_on);
            }
        });
    }
}

/// Record for `duration`, polling every `poll_interval`, then stop and
/// quantize. Blocks the calling thread.
pub fn record(
    session: &mut RecordingSession,
    duration: Duration,
    poll_interval: Duration,
) -> Transcription {
    session.start();

    let deadline = Instant::now() + duration;
    loop {
        session.poll();
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        thread::sleep(poll_interval.min(remaining));
    }

    session.stop()
}

/// Pair and quantize a complete stream of `(time, message)` pairs.
///
/// Notes still held after the last message are released at `end_time`.
pub fn transcribe_messages(
    messages: &[(f64, RawMessage)],
    end_time: f64,
    options: &QuantizeOptions,
) -> Transcription {
    let mut pairer = NotePairer::new();
    for &(time, message) in messages {
        pairer.process(message, time, |_, _, _| {});
    }
    pairer.close_all(end_time);
    quantize(pairer.recorded(), options)
}
