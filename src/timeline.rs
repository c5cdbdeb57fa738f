//! MIDI note timeline: active notes, archived history, and the pause-aware
//! transport.
//!
//! Times are logical seconds (wall clock minus accumulated pause). A note's
//! visual length is frozen at note-off so later scroll-speed changes or
//! pauses never alter bars that have already been released.

use log::trace;
use crate::types::{note_name, TransportClock};

pub const SCROLL_SPEED_MIN: f32 = 10.0;
pub const SCROLL_SPEED_MAX: f32 = 500.0;
pub const DEFAULT_SCROLL_SPEED: f32 = 100.0;

/// A currently-sounding note.
#[derive(Debug, Clone, Copy)]
pub struct ActiveNote {
    /// Logical start time (seconds)
    pub start: f64,
    pub velocity: u8,
}

/// A released note, with its bar height frozen at release time.
#[derive(Debug, Clone, Copy)]
pub struct CompletedNote {
    pub note: u8,
    pub start: f64,
    pub end: f64,
    pub velocity: u8,
    /// Bar height in pixels, `(end - start) * scroll_speed` at release
    pub visual_length: f32,
}

pub struct NoteTimeline {
    /// At most one active entry per MIDI note number; re-trigger replaces.
    active: [Option<ActiveNote>; 128],
    active_count: usize,
    history: Vec<CompletedNote>,
    scroll_speed: f32,
    clock: TransportClock,
}

impl NoteTimeline {
    pub fn new() -> Self {
        Self {
            active: [None; 128],
            active_count: 0,
            history: Vec::new(),
            scroll_speed: DEFAULT_SCROLL_SPEED,
            clock: TransportClock::new(),
        }
    }

    // ── Transport ───────────────────────────────────────────────────────

    pub fn pause(&mut self, now: f64) {
        self.clock.pause(now);
    }

    pub fn play(&mut self, now: f64) {
        self.clock.resume(now);
    }

    pub fn toggle_pause(&mut self, now: f64) {
        self.clock.toggle(now);
    }

    pub fn is_playing(&self) -> bool {
        self.clock.is_playing()
    }

    /// Logical time for the given wall time.
    pub fn logical(&self, now: f64) -> f64 {
        self.clock.logical(now)
    }

    // ── Configuration ───────────────────────────────────────────────────

    /// Scroll speed in pixels per second, clamped to the supported range.
    /// Only affects active notes and future releases.
    pub fn set_scroll_speed(&mut self, pixels_per_second: f32) {
        self.scroll_speed = pixels_per_second.clamp(SCROLL_SPEED_MIN, SCROLL_SPEED_MAX);
    }

    pub fn scroll_speed(&self) -> f32 {
        self.scroll_speed
    }

    // ── Note events ─────────────────────────────────────────────────────

    /// Note-on from the MIDI collaborator. Out-of-range notes are ignored;
    /// a re-trigger while already sounding replaces the stale entry.
    pub fn note_on(&mut self, note: u8, velocity: u8, now: f64) {
        if note > 127 {
            return;
        }
        let start = self.logical(now);
        let slot = &mut self.active[note as usize];
        if slot.is_none() {
            self.active_count += 1;
        }
        *slot = Some(ActiveNote { start, velocity });
        trace!("timeline: {} on at {:.3}s vel={}", note_name(note), start, velocity);
    }

    /// Note-off: archive the note with its frozen visual length. An off
    /// without a matching on is a no-op.
    pub fn note_off(&mut self, note: u8, now: f64) {
        if note > 127 {
            return;
        }
        if let Some(active) = self.active[note as usize].take() {
            self.active_count -= 1;
            let end = self.logical(now).max(active.start);
            self.history.push(CompletedNote {
                note,
                start: active.start,
                end,
                velocity: active.velocity,
                visual_length: ((end - active.start) * self.scroll_speed as f64) as f32,
            });
        }
    }

    pub fn clear(&mut self) {
        self.active = [None; 128];
        self.active_count = 0;
        self.history.clear();
    }

    // ── Queries ─────────────────────────────────────────────────────────

    pub fn active_count(&self) -> usize {
        self.active_count
    }

    pub fn history(&self) -> &[CompletedNote] {
        &self.history
    }

    pub fn iter_active(&self) -> impl Iterator<Item = (u8, &ActiveNote)> {
        self.active
            .iter()
            .enumerate()
            .filter_map(|(n, slot)| slot.as_ref().map(|a| (n as u8, a)))
    }

    /// Drop archived notes whose bars have scrolled fully above the canvas.
    /// The bottom edge of an archived bar sits at
    /// `canvas_height - (logical_now - end) * scroll_speed`.
    pub fn prune(&mut self, canvas_height: f32, now: f64) {
        let logical_now = self.logical(now);
        let speed = self.scroll_speed;
        self.history.retain(|n| {
            let y_bottom = canvas_height - ((logical_now - n.end) as f32 * speed);
            y_bottom >= 0.0
        });
    }
}

impl Default for NoteTimeline {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_note_lifecycle() {
        let mut t = NoteTimeline::new();
        t.note_on(60, 80, 1.0);
        assert_eq!(t.active_count(), 1);
        t.note_off(60, 1.5);
        assert_eq!(t.active_count(), 0);
        assert_eq!(t.history().len(), 1);
        let n = t.history()[0];
        assert_eq!(n.note, 60);
        assert_eq!(n.velocity, 80);
        assert!(n.start <= n.end);
        assert!(n.visual_length >= 0.0);
        // Duplicate off is a no-op
        t.note_off(60, 2.0);
        assert_eq!(t.history().len(), 1);
    }

    #[test]
    fn test_off_without_on_is_noop() {
        let mut t = NoteTimeline::new();
        t.note_off(60, 1.0);
        assert_eq!(t.history().len(), 0);
        assert_eq!(t.active_count(), 0);
    }

    #[test]
    fn test_retrigger_replaces() {
        let mut t = NoteTimeline::new();
        t.note_on(60, 50, 1.0);
        t.note_on(60, 100, 2.0);
        assert_eq!(t.active_count(), 1);
        t.note_off(60, 3.0);
        assert_eq!(t.history().len(), 1, "re-trigger replaces, never stacks");
        let n = t.history()[0];
        assert_eq!(n.velocity, 100);
        assert_eq!(n.start, 2.0);
    }

    #[test]
    fn test_visual_length_frozen_at_release() {
        let mut t = NoteTimeline::new();
        t.set_scroll_speed(100.0);
        t.note_on(69, 100, 0.0);
        t.note_off(69, 0.5);
        let len = t.history()[0].visual_length;
        assert!((len - 50.0).abs() < 1e-3, "0.5s at 100px/s = 50px, got {}", len);

        // Changing speed afterwards must not touch the archived bar
        t.set_scroll_speed(400.0);
        assert_eq!(t.history()[0].visual_length, len);

        // But a new note archived at the new speed uses it
        t.note_on(70, 100, 1.0);
        t.note_off(70, 1.5);
        assert!((t.history()[1].visual_length - 200.0).abs() < 1e-3);
    }

    #[test]
    fn test_scroll_speed_clamped() {
        let mut t = NoteTimeline::new();
        t.set_scroll_speed(1.0);
        assert_eq!(t.scroll_speed(), SCROLL_SPEED_MIN);
        t.set_scroll_speed(9999.0);
        assert_eq!(t.scroll_speed(), SCROLL_SPEED_MAX);
    }

    #[test]
    fn test_pause_freezes_durations() {
        let mut t = NoteTimeline::new();
        t.set_scroll_speed(100.0);
        t.note_on(60, 80, 0.0);
        t.pause(1.0);
        t.pause(5.0); // idempotent
        assert!(!t.is_playing());
        // 9 wall seconds pass while paused
        t.play(10.0);
        t.note_off(60, 10.5);
        // Logical duration: 1s before pause + 0.5s after = 1.5s
        let n = t.history()[0];
        assert!((n.visual_length - 150.0).abs() < 1e-3, "{}", n.visual_length);
    }

    #[test]
    fn test_prune_drops_offscreen_bars() {
        let mut t = NoteTimeline::new();
        t.set_scroll_speed(100.0);
        t.note_on(60, 80, 0.0);
        t.note_off(60, 1.0);
        // Bar bottom at h - (now-1)*100; with h=400 it leaves at now=5
        t.prune(400.0, 4.0);
        assert_eq!(t.history().len(), 1);
        t.prune(400.0, 6.0);
        assert_eq!(t.history().len(), 0);
    }

    #[test]
    fn test_clear_empties_all() {
        let mut t = NoteTimeline::new();
        t.note_on(60, 80, 0.0);
        t.note_on(64, 80, 0.0);
        t.note_off(60, 1.0);
        t.clear();
        assert_eq!(t.active_count(), 0);
        assert_eq!(t.history().len(), 0);
        assert_eq!(t.iter_active().count(), 0);
    }
}
