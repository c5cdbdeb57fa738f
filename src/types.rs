use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;

// ─── Audio data ─────────────────────────────────────────────────────────────

/// A chunk of audio samples from the capture device (or simulator).
#[derive(Debug, Clone)]
pub struct AudioChunk {
    /// Microseconds since session start (timestamp of first sample)
    pub timestamp_us: u64,
    /// Mono f32 samples, normalized -1.0 to 1.0
    pub samples: Vec<f32>,
    /// Sample rate in Hz
    pub sample_rate: u32,
}

// ─── MIDI data ──────────────────────────────────────────────────────────────

/// A note event as delivered by the MIDI collaborator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NoteEvent {
    /// Key pressed. Velocity 1-127.
    On { note: u8, velocity: u8 },
    /// Key released.
    Off { note: u8 },
}

impl fmt::Display for NoteEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NoteEvent::On { note, velocity } => {
                write!(f, "on  {} vel={}", note_name(*note), velocity)
            }
            NoteEvent::Off { note } => write!(f, "off {}", note_name(*note)),
        }
    }
}

// ─── Inter-thread messages ──────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub enum InputEvent {
    Audio(AudioChunk),
    Note(NoteEvent),
}

// ─── Colors ─────────────────────────────────────────────────────────────────

/// 8-bit RGBA color used by every drawing command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub fn with_alpha(self, a: u8) -> Self {
        Self { a, ..self }
    }

    /// Add a flat offset to each channel, saturating at 255.
    pub fn brightened(self, amount: u8) -> Self {
        Self {
            r: self.r.saturating_add(amount),
            g: self.g.saturating_add(amount),
            b: self.b.saturating_add(amount),
            a: self.a,
        }
    }

    /// Multiply each channel by `factor`, saturating at 255.
    pub fn scaled(self, factor: f32) -> Self {
        let mul = |c: u8| (c as f32 * factor).round().clamp(0.0, 255.0) as u8;
        Self {
            r: mul(self.r),
            g: mul(self.g),
            b: mul(self.b),
            a: self.a,
        }
    }
}

// ─── Display snapshot ───────────────────────────────────────────────────────

/// Immutable engine snapshot fanned out to consumers (console display,
/// tests). Produced by the coordinator once per tick.
#[derive(Debug, Clone)]
pub struct DisplayFrame {
    pub timestamp_us: u64,
    /// Smoothed spectrum bars, each in [0,1]
    pub bars: Vec<f32>,
    /// Peak-hold values, each in [0,1]
    pub peaks: Vec<f32>,
    pub active_notes: usize,
    pub archived_notes: usize,
    pub live_particles: usize,
    pub playing: bool,
}

// ─── Session clock ──────────────────────────────────────────────────────────

/// Monotonic wall clock for the session.
#[derive(Clone)]
pub struct SessionClock {
    start: Instant,
}

impl SessionClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn now_us(&self) -> u64 {
        self.start.elapsed().as_micros() as u64
    }

    pub fn now_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

impl Default for SessionClock {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Transport clock ────────────────────────────────────────────────────────

/// Pause-aware logical clock. All timeline math (note positions, particle
/// spawn gating) runs on logical time = wall time minus accumulated pause
/// duration, so pausing freezes motion without losing elapsed-time
/// bookkeeping. Pause and resume are idempotent.
#[derive(Debug, Clone, Copy)]
pub struct TransportClock {
    paused: bool,
    /// Wall time at which the current pause began (valid while paused)
    pause_start: f64,
    /// Total seconds spent paused so far
    total_pause: f64,
}

impl TransportClock {
    pub fn new() -> Self {
        Self {
            paused: false,
            pause_start: 0.0,
            total_pause: 0.0,
        }
    }

    pub fn is_playing(&self) -> bool {
        !self.paused
    }

    pub fn pause(&mut self, now: f64) {
        if !self.paused {
            self.paused = true;
            self.pause_start = now;
        }
    }

    pub fn resume(&mut self, now: f64) {
        if self.paused {
            self.total_pause += now - self.pause_start;
            self.paused = false;
        }
    }

    pub fn toggle(&mut self, now: f64) {
        if self.paused {
            self.resume(now);
        } else {
            self.pause(now);
        }
    }

    /// Logical time in seconds. Frozen while paused; monotonically
    /// non-decreasing across pause/resume cycles.
    pub fn logical(&self, now: f64) -> f64 {
        if self.paused {
            self.pause_start - self.total_pause
        } else {
            now - self.total_pause
        }
    }
}

impl Default for TransportClock {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Piano constants ────────────────────────────────────────────────────────

/// Keys on a standard piano.
pub const NUM_KEYS: usize = 88;
/// A0, the lowest piano key.
pub const LOWEST_NOTE: u8 = 21;
/// C8, the highest piano key.
pub const HIGHEST_NOTE: u8 = 108;

pub const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Human-readable name for a MIDI note, e.g. 60 → "C4".
pub fn note_name(note: u8) -> String {
    let n = note as i32 - 12;
    format!(
        "{}{}",
        NOTE_NAMES[n.rem_euclid(12) as usize],
        n.div_euclid(12)
    )
}
