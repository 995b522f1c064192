//! Seconds to ticks conversion under a tempo schedule.
//!
//! The map is a sorted list of breakpoints `(time, µs per beat, tick)`. Ticks
//! for each segment are computed at constant tempo and truncated before being
//! added to the running total, so encoder and decoder agree on every
//! breakpoint tick exactly.

use tracing::warn;

use super::types::{PerformanceSequence, TempoChange};
use crate::time::{bpm_to_us_per_beat, DEFAULT_TEMPO_US};

/// One tempo breakpoint
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TempoPoint {
    /// Breakpoint position in seconds, exactly as the tick was computed from
    seconds: f64,
    pub us_per_beat: u32,
    pub tick: u64,
}

impl TempoPoint {
    /// Breakpoint position in seconds
    pub fn time(&self) -> f64 {
        self.seconds
    }
}

/// Read-only seconds/ticks mapping over a tempo schedule
#[derive(Debug, Clone, PartialEq)]
pub struct TempoMap {
    ticks_per_beat: u16,
    points: Vec<TempoPoint>,
}

impl TempoMap {
    /// Build the map from tempo changes (any order).
    ///
    /// Without tempo changes the whole timeline runs at 120 BPM. If the first
    /// change is later than time 0, a 120 BPM segment covers the lead-in.
    /// Changes with a non-positive or non-finite tempo are skipped.
    pub fn build(tempo_changes: &[TempoChange], ticks_per_beat: u16) -> Self {
        let mut changes: Vec<&TempoChange> = tempo_changes
            .iter()
            .filter(|change| {
                let usable = change.bpm.is_finite() && change.bpm > 0.0;
                if !usable {
                    warn!(bpm = change.bpm, time = change.time, "ignoring unusable tempo change");
                }
                usable
            })
            .collect();
        changes.sort_by(|a, b| a.time.total_cmp(&b.time));

        let mut points = vec![TempoPoint {
            seconds: 0.0,
            us_per_beat: DEFAULT_TEMPO_US,
            tick: 0,
        }];
        let mut tick = 0u64;
        let mut time = 0.0f64;
        let mut us_per_beat = DEFAULT_TEMPO_US;

        for change in changes {
            let at = change.time.max(0.0);
            if at > time {
                tick += segment_ticks(at - time, us_per_beat, ticks_per_beat);
            }
            us_per_beat = bpm_to_us_per_beat(change.bpm).max(1);
            time = time.max(at);
            points.push(TempoPoint {
                seconds: time,
                us_per_beat,
                tick,
            });
        }

        // a change at time 0 replaces the implicit lead-in
        if points.len() > 1 && points[1].seconds == 0.0 {
            points.remove(0);
        }

        Self {
            ticks_per_beat,
            points,
        }
    }

    /// Map for the tempo changes of a sequence, at its resolution
    pub fn from_sequence(sequence: &PerformanceSequence) -> Self {
        Self::build(&sequence.tempo_changes, sequence.ticks_per_beat)
    }

    /// Map for a schedule already expressed in ticks, as read from a MIDI file.
    ///
    /// `schedule` holds `(tick, µs per beat)` pairs in ascending tick order.
    /// Breakpoint times are reconstructed by integrating each segment.
    pub fn from_tick_schedule(schedule: &[(u64, u32)], ticks_per_beat: u16) -> Self {
        let tpb = f64::from(ticks_per_beat.max(1));
        let mut points = vec![TempoPoint {
            seconds: 0.0,
            us_per_beat: DEFAULT_TEMPO_US,
            tick: 0,
        }];

        for &(tick, us_per_beat) in schedule {
            let last = points[points.len() - 1];
            if tick == last.tick {
                let slot = points.len() - 1;
                points[slot].us_per_beat = us_per_beat.max(1);
                continue;
            }
            let elapsed = (tick - last.tick) as f64 * f64::from(last.us_per_beat) / tpb / 1_000_000.0;
            points.push(TempoPoint {
                seconds: last.seconds + elapsed,
                us_per_beat: us_per_beat.max(1),
                tick,
            });
        }

        Self {
            ticks_per_beat,
            points,
        }
    }

    pub fn ticks_per_beat(&self) -> u16 {
        self.ticks_per_beat
    }

    pub fn points(&self) -> &[TempoPoint] {
        &self.points
    }

    /// Tempo breakpoints as (seconds, BPM) pairs
    pub fn breakpoints(&self) -> Vec<(f64, f64)> {
        self.points
            .iter()
            .map(|p| (p.time(), crate::time::us_per_beat_to_bpm(p.us_per_beat)))
            .collect()
    }

    /// Absolute tick for a time in seconds. Negative times map to tick 0.
    ///
    /// # Example
    /// ```
    /// use aldakit::midi::TempoMap;
    ///
    /// let map = TempoMap::build(&[], 480);
    /// assert_eq!(map.seconds_to_ticks(1.0), 960);
    /// ```
    pub fn seconds_to_ticks(&self, seconds: f64) -> u64 {
        if seconds.is_nan() || seconds <= 0.0 {
            return 0;
        }
        let point = self.point_at_time(seconds);
        point.tick + segment_ticks(seconds - point.time(), point.us_per_beat, self.ticks_per_beat)
    }

    /// Position in beats for a time in seconds, without truncating the final segment
    pub fn seconds_to_beats(&self, seconds: f64) -> f64 {
        if seconds.is_nan() || seconds <= 0.0 {
            return 0.0;
        }
        let point = self.point_at_time(seconds);
        let tpb = f64::from(self.ticks_per_beat.max(1));
        point.tick as f64 / tpb + (seconds - point.time()) * 1_000_000.0 / f64::from(point.us_per_beat)
    }

    /// Time in seconds for an absolute tick (reverse segment integration)
    pub fn ticks_to_seconds(&self, tick: u64) -> f64 {
        let point = self
            .points
            .iter()
            .rev()
            .find(|p| p.tick <= tick)
            .copied()
            .unwrap_or(self.points[0]);
        let tpb = f64::from(self.ticks_per_beat.max(1));
        point.time() + (tick - point.tick) as f64 * f64::from(point.us_per_beat) / tpb / 1_000_000.0
    }

    /// Latest breakpoint at or before `seconds`
    fn point_at_time(&self, seconds: f64) -> TempoPoint {
        self.points
            .iter()
            .take_while(|p| p.time() <= seconds)
            .last()
            .copied()
            .unwrap_or(self.points[0])
    }
}

/// Ticks elapsed over `seconds` at a constant tempo, truncated
fn segment_ticks(seconds: f64, us_per_beat: u32, ticks_per_beat: u16) -> u64 {
    let beats = seconds * 1_000_000.0 / f64::from(us_per_beat);
    (beats * f64::from(ticks_per_beat)) as u64
}
