//! Standard MIDI File writer and reader.
//!
//! Output is always a format 1 file: track 0 carries only tempo meta events,
//! then one track per channel in ascending channel order. The reader accepts
//! format 0, 1 and 2 files and folds every track back into one
//! [`PerformanceSequence`].

use std::collections::HashMap;
use std::path::Path;

use byteorder::{BigEndian, ByteOrder};
use tracing::{debug, warn};

use super::tempo_map::TempoMap;
use super::types::{
    ControlChange, PerformanceNote, PerformanceSequence, ProgramChange, TempoChange,
    DEFAULT_TICKS_PER_BEAT,
};
use crate::error::AldaError;
use crate::time::{bpm_to_us_per_beat, us_per_beat_to_bpm, DEFAULT_TEMPO_US};

const NOTE_OFF: u8 = 0x80;
const NOTE_ON: u8 = 0x90;
const CONTROL_CHANGE: u8 = 0xB0;
const PROGRAM_CHANGE: u8 = 0xC0;
const META: u8 = 0xFF;
const META_TEMPO: u8 = 0x51;
const META_END_OF_TRACK: u8 = 0x2F;

/// One event at an absolute tick, already serialized
#[derive(Debug, Clone)]
struct TrackEvent {
    tick: u64,
    bytes: Vec<u8>,
}

impl TrackEvent {
    fn is_note_off(&self) -> bool {
        self.bytes.first().is_some_and(|status| status & 0xF0 == NOTE_OFF)
    }
}

// ---------------------------------------------------------------------------
// Writing
// ---------------------------------------------------------------------------

/// Serialize a sequence as a format 1 Standard MIDI File.
///
/// Times are converted to ticks through a [`TempoMap`] built from the
/// sequence's own tempo changes. Every note becomes an explicit note-on and
/// note-off pair; at equal ticks note-offs are written first.
pub fn encode_smf(sequence: &PerformanceSequence) -> Vec<u8> {
    let tempo_map = TempoMap::from_sequence(sequence);

    let mut tracks = vec![tempo_track(sequence, &tempo_map)];
    for channel in sequence.channels() {
        tracks.push(channel_track(sequence, channel, &tempo_map));
    }

    let mut out = Vec::with_capacity(14 + tracks.iter().map(|t| t.len() + 8).sum::<usize>());
    out.extend_from_slice(b"MThd");
    push_u32(&mut out, 6);
    push_u16(&mut out, 1);
    push_u16(&mut out, tracks.len() as u16);
    push_u16(&mut out, sequence.ticks_per_beat);

    for track in &tracks {
        out.extend_from_slice(b"MTrk");
        push_u32(&mut out, track.len() as u32);
        out.extend_from_slice(track);
    }
    out
}

/// Encode a sequence and write it to `path`
pub fn write_midi_file(sequence: &PerformanceSequence, path: impl AsRef<Path>) -> Result<(), AldaError> {
    std::fs::write(path, encode_smf(sequence))?;
    Ok(())
}

fn tempo_track(sequence: &PerformanceSequence, tempo_map: &TempoMap) -> Vec<u8> {
    let mut changes: Vec<&TempoChange> = sequence
        .tempo_changes
        .iter()
        .filter(|change| change.bpm.is_finite() && change.bpm > 0.0)
        .collect();
    changes.sort_by(|a, b| a.time.total_cmp(&b.time));

    let mut events: Vec<TrackEvent> = changes
        .into_iter()
        .map(|change| tempo_event(tempo_map.seconds_to_ticks(change.time), bpm_to_us_per_beat(change.bpm)))
        .collect();
    if events.is_empty() {
        events.push(tempo_event(0, DEFAULT_TEMPO_US));
    }

    encode_track(events)
}

fn tempo_event(tick: u64, us_per_beat: u32) -> TrackEvent {
    let mut bytes = vec![META, META_TEMPO, 0x03, 0, 0, 0];
    BigEndian::write_u24(&mut bytes[3..], us_per_beat.min(0xFF_FFFF));
    TrackEvent { tick, bytes }
}

fn channel_track(sequence: &PerformanceSequence, channel: u8, tempo_map: &TempoMap) -> Vec<u8> {
    let nibble = channel & 0x0F;
    let mut events = Vec::new();

    for pc in sequence.program_changes.iter().filter(|pc| pc.channel == channel) {
        events.push(TrackEvent {
            tick: tempo_map.seconds_to_ticks(pc.time),
            bytes: vec![PROGRAM_CHANGE | nibble, pc.program & 0x7F],
        });
    }
    for cc in sequence.control_changes.iter().filter(|cc| cc.channel == channel) {
        events.push(TrackEvent {
            tick: tempo_map.seconds_to_ticks(cc.time),
            bytes: vec![CONTROL_CHANGE | nibble, cc.control & 0x7F, cc.value & 0x7F],
        });
    }
    for note in sequence.notes.iter().filter(|n| n.channel == channel) {
        let pitch = note.pitch & 0x7F;
        events.push(TrackEvent {
            tick: tempo_map.seconds_to_ticks(note.start_time),
            bytes: vec![NOTE_ON | nibble, pitch, note.velocity & 0x7F],
        });
        events.push(TrackEvent {
            tick: tempo_map.seconds_to_ticks(note.end_time()),
            bytes: vec![NOTE_OFF | nibble, pitch, 0],
        });
    }

    // stable: equal-tick events of the same kind keep insertion order
    events.sort_by_key(|event| (event.tick, !event.is_note_off()));
    encode_track(events)
}

/// Delta-encode events and terminate the track
fn encode_track(mut events: Vec<TrackEvent>) -> Vec<u8> {
    let last_tick = events.iter().map(|e| e.tick).max().unwrap_or(0);
    events.push(TrackEvent {
        tick: last_tick,
        bytes: vec![META, META_END_OF_TRACK, 0x00],
    });

    let mut data = Vec::new();
    let mut previous = 0u64;
    for event in events {
        let delta = event.tick.saturating_sub(previous);
        write_vlq(&mut data, delta.min(0x0FFF_FFFF) as u32);
        data.extend_from_slice(&event.bytes);
        previous = event.tick;
    }
    data
}

/// Append a MIDI variable-length quantity (7 bits per byte, most significant first)
pub fn write_vlq(out: &mut Vec<u8>, value: u32) {
    let mut groups = [0u8; 5];
    let mut count = 0;
    let mut rest = value;
    loop {
        groups[count] = (rest & 0x7F) as u8;
        count += 1;
        rest >>= 7;
        if rest == 0 {
            break;
        }
    }
    for i in (0..count).rev() {
        let continuation = if i > 0 { 0x80 } else { 0 };
        out.push(groups[i] | continuation);
    }
}

fn push_u16(out: &mut Vec<u8>, value: u16) {
    let mut buf = [0u8; 2];
    BigEndian::write_u16(&mut buf, value);
    out.extend_from_slice(&buf);
}

fn push_u32(out: &mut Vec<u8>, value: u32) {
    let mut buf = [0u8; 4];
    BigEndian::write_u32(&mut buf, value);
    out.extend_from_slice(&buf);
}

// ---------------------------------------------------------------------------
// Reading
// ---------------------------------------------------------------------------

/// Bounds-checked cursor over the file bytes
struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
    end: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            end: data.len(),
        }
    }

    /// Reader over the next `len` bytes; the parent skips past them
    fn chunk(&mut self, len: usize) -> Result<Reader<'a>, AldaError> {
        let start = self.pos;
        self.take(len)?;
        Ok(Reader {
            data: self.data,
            pos: start,
            end: start + len,
        })
    }

    fn remaining(&self) -> usize {
        self.end - self.pos
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.end
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], AldaError> {
        if len > self.remaining() {
            return Err(AldaError::midi_parse(
                self.pos,
                format!("unexpected end of data: needed {} bytes, {} left", len, self.remaining()),
            ));
        }
        let bytes = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    fn u8(&mut self) -> Result<u8, AldaError> {
        Ok(self.take(1)?[0])
    }

    fn peek(&self) -> Option<u8> {
        (self.pos < self.end).then(|| self.data[self.pos])
    }

    fn u16(&mut self) -> Result<u16, AldaError> {
        Ok(BigEndian::read_u16(self.take(2)?))
    }

    fn u32(&mut self) -> Result<u32, AldaError> {
        Ok(BigEndian::read_u32(self.take(4)?))
    }

    fn vlq(&mut self) -> Result<u32, AldaError> {
        let start = self.pos;
        let mut value = 0u32;
        for _ in 0..4 {
            let byte = self.u8()?;
            value = (value << 7) | u32::from(byte & 0x7F);
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(AldaError::midi_parse(start, "variable-length quantity longer than 4 bytes"))
    }
}

/// Events of one track chunk and the tick at which the track ends
#[derive(Debug, Default)]
struct Track {
    events: Vec<(u64, RawEvent)>,
    end_tick: u64,
}

/// Channel and meta events the decoder keeps, at an absolute tick
#[derive(Debug, Clone, Copy)]
enum RawEvent {
    Tempo(u32),
    NoteOn { channel: u8, key: u8, velocity: u8 },
    NoteOff { channel: u8, key: u8 },
    Program { channel: u8, program: u8 },
    Control { channel: u8, control: u8, value: u8 },
}

/// Decode a Standard MIDI File into a performance sequence.
///
/// Fails with [`AldaError::MidiParse`] when the `MThd` magic is missing, the
/// data is truncated, or a chunk claims more bytes than remain. Unknown chunk
/// types, system exclusive messages and meta events other than tempo are
/// skipped. Running status and note-on with velocity 0 are understood.
pub fn decode_smf(bytes: &[u8]) -> Result<PerformanceSequence, AldaError> {
    let mut reader = Reader::new(bytes);

    if reader.remaining() < 4 || &bytes[..4] != b"MThd" {
        return Err(AldaError::midi_parse(0, "missing MThd header"));
    }
    reader.take(4)?;
    let header_len = reader.u32()? as usize;
    if header_len < 6 {
        return Err(AldaError::midi_parse(4, format!("header length {} is shorter than 6", header_len)));
    }
    let mut header = chunk_reader(&mut reader, header_len, 4)?;
    let format = header.u16()?;
    let declared_tracks = header.u16()?;
    let division = header.u16()?;

    let ticks_per_beat = if division & 0x8000 != 0 {
        warn!(division, "SMPTE time division is not supported; assuming {} ticks per beat", DEFAULT_TICKS_PER_BEAT);
        DEFAULT_TICKS_PER_BEAT
    } else if division == 0 {
        warn!("zero time division; assuming {} ticks per beat", DEFAULT_TICKS_PER_BEAT);
        DEFAULT_TICKS_PER_BEAT
    } else {
        division
    };
    debug!(format, declared_tracks, ticks_per_beat, "decoding MIDI file");

    let mut tracks: Vec<Track> = Vec::new();
    while !reader.is_empty() {
        let chunk_start = reader.pos;
        let id = reader.take(4)?;
        let len = reader.u32()? as usize;
        let mut chunk = chunk_reader(&mut reader, len, chunk_start)?;
        if id == b"MTrk" {
            tracks.push(read_track(&mut chunk)?);
        } else {
            debug!(offset = chunk_start, len, "skipping unknown chunk");
        }
    }
    if tracks.len() != declared_tracks as usize {
        debug!(declared_tracks, found = tracks.len(), "track count differs from header");
    }

    Ok(assemble(&tracks, ticks_per_beat))
}

/// Read and decode a Standard MIDI File from disk
pub fn read_midi_file(path: impl AsRef<Path>) -> Result<PerformanceSequence, AldaError> {
    let bytes = std::fs::read(path)?;
    decode_smf(&bytes)
}

fn chunk_reader<'a>(reader: &mut Reader<'a>, len: usize, chunk_start: usize) -> Result<Reader<'a>, AldaError> {
    if len > reader.remaining() {
        return Err(AldaError::midi_parse(
            chunk_start,
            format!("chunk length {} exceeds the {} bytes remaining", len, reader.remaining()),
        ));
    }
    reader.chunk(len)
}

fn read_track(reader: &mut Reader<'_>) -> Result<Track, AldaError> {
    let mut events = Vec::new();
    let mut tick = 0u64;
    let mut running_status: Option<u8> = None;

    while !reader.is_empty() {
        tick += u64::from(reader.vlq()?);
        let offset = reader.pos;

        let status = match reader.peek() {
            Some(byte) if byte & 0x80 != 0 => {
                reader.u8()?;
                byte
            }
            Some(_) => running_status
                .ok_or_else(|| AldaError::midi_parse(offset, "data byte without running status"))?,
            None => return Err(AldaError::midi_parse(offset, "missing event after delta time")),
        };

        match status {
            META => {
                running_status = None;
                let kind = reader.u8()?;
                let len = reader.vlq()? as usize;
                let data = reader.take(len)?;
                match kind {
                    META_TEMPO if len == 3 => {
                        events.push((tick, RawEvent::Tempo(BigEndian::read_u24(data))));
                    }
                    META_END_OF_TRACK => break,
                    _ => {}
                }
            }
            0xF0 | 0xF7 => {
                running_status = None;
                let len = reader.vlq()? as usize;
                reader.take(len)?;
            }
            0xF1..=0xFE => {
                return Err(AldaError::midi_parse(
                    offset,
                    format!("unexpected system message 0x{:02X} in track", status),
                ));
            }
            _ => {
                running_status = Some(status);
                let channel = status & 0x0F;
                match status & 0xF0 {
                    NOTE_OFF => {
                        let key = reader.u8()? & 0x7F;
                        reader.u8()?;
                        events.push((tick, RawEvent::NoteOff { channel, key }));
                    }
                    NOTE_ON => {
                        let key = reader.u8()? & 0x7F;
                        let velocity = reader.u8()? & 0x7F;
                        let event = if velocity == 0 {
                            RawEvent::NoteOff { channel, key }
                        } else {
                            RawEvent::NoteOn { channel, key, velocity }
                        };
                        events.push((tick, event));
                    }
                    CONTROL_CHANGE => {
                        let control = reader.u8()? & 0x7F;
                        let value = reader.u8()? & 0x7F;
                        events.push((tick, RawEvent::Control { channel, control, value }));
                    }
                    PROGRAM_CHANGE => {
                        let program = reader.u8()? & 0x7F;
                        events.push((tick, RawEvent::Program { channel, program }));
                    }
                    // channel pressure
                    0xD0 => {
                        reader.u8()?;
                    }
                    // polyphonic pressure and pitch bend
                    _ => {
                        reader.take(2)?;
                    }
                }
            }
        }
    }

    Ok(Track { events, end_tick: tick })
}

/// Convert per-track tick events into a time-sorted sequence
fn assemble(tracks: &[Track], ticks_per_beat: u16) -> PerformanceSequence {
    let mut schedule: Vec<(u64, u32)> = tracks
        .iter()
        .flat_map(|track| track.events.iter())
        .filter_map(|&(tick, event)| match event {
            RawEvent::Tempo(us) => Some((tick, us)),
            _ => None,
        })
        .collect();
    schedule.sort_by_key(|&(tick, _)| tick);
    let tempo_map = TempoMap::from_tick_schedule(&schedule, ticks_per_beat);

    let mut sequence = PerformanceSequence {
        ticks_per_beat,
        ..PerformanceSequence::default()
    };
    sequence.tempo_changes = schedule
        .iter()
        .filter(|&&(_, us)| us > 0)
        .map(|&(tick, us)| TempoChange {
            bpm: us_per_beat_to_bpm(us),
            time: tempo_map.ticks_to_seconds(tick),
        })
        .collect();

    for track in tracks {
        let mut open: HashMap<(u8, u8), Vec<(u64, u8)>> = HashMap::new();

        for &(tick, event) in &track.events {
            match event {
                RawEvent::NoteOn { channel, key, velocity } => {
                    open.entry((channel, key)).or_default().push((tick, velocity));
                }
                RawEvent::NoteOff { channel, key } => {
                    let started = open.get_mut(&(channel, key)).filter(|starts| !starts.is_empty());
                    match started {
                        Some(starts) => {
                            let (start, velocity) = starts.remove(0);
                            sequence.notes.push(note_between(&tempo_map, channel, key, velocity, start, tick));
                        }
                        None => debug!(channel, key, tick, "note-off without a sounding note"),
                    }
                }
                RawEvent::Program { channel, program } => sequence.program_changes.push(ProgramChange {
                    program,
                    time: tempo_map.ticks_to_seconds(tick),
                    channel,
                }),
                RawEvent::Control { channel, control, value } => sequence.control_changes.push(ControlChange {
                    control,
                    value,
                    time: tempo_map.ticks_to_seconds(tick),
                    channel,
                }),
                RawEvent::Tempo(_) => {}
            }
        }

        let mut dangling: Vec<((u8, u8), (u64, u8))> = open
            .into_iter()
            .flat_map(|(key, starts)| starts.into_iter().map(move |start| (key, start)))
            .collect();
        dangling.sort_by_key(|&((channel, key), (start, _))| (start, channel, key));
        for ((channel, key), (start, velocity)) in dangling {
            warn!(channel, key, "closing note left sounding at end of track");
            sequence.notes.push(note_between(&tempo_map, channel, key, velocity, start, track.end_tick));
        }
    }

    sequence.sort_by_time();
    sequence
}

fn note_between(tempo_map: &TempoMap, channel: u8, pitch: u8, velocity: u8, start: u64, end: u64) -> PerformanceNote {
    let start_time = tempo_map.ticks_to_seconds(start);
    let end_time = tempo_map.ticks_to_seconds(end.max(start));
    PerformanceNote {
        pitch,
        velocity,
        start_time,
        duration: end_time - start_time,
        channel,
    }
}
