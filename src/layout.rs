//! Piano key geometry: mapping MIDI notes to key columns on the canvas.

use crate::types::{HIGHEST_NOTE, LOWEST_NOTE, NUM_KEYS};

/// Minimum key column width in pixels, so narrow windows stay legible.
pub const KEY_WIDTH_MIN: f32 = 5.0;

/// Key index (0-87) for a MIDI note, clamped to the piano range.
pub fn key_index(note: u8) -> usize {
    (note.clamp(LOWEST_NOTE, HIGHEST_NOTE) - LOWEST_NOTE) as usize
}

/// True if the note falls on the 88-key piano.
pub fn on_keyboard(note: u8) -> bool {
    (LOWEST_NOTE..=HIGHEST_NOTE).contains(&note)
}

/// Width of one key column for a canvas of the given width.
pub fn key_width(canvas_width: f32) -> f32 {
    (canvas_width / NUM_KEYS as f32).max(KEY_WIDTH_MIN)
}

/// Left edge of a key column.
pub fn key_x(index: usize, canvas_width: f32) -> f32 {
    index as f32 * key_width(canvas_width)
}

/// Horizontal center of a note's key column.
pub fn note_center_x(note: u8, canvas_width: f32) -> f32 {
    key_x(key_index(note), canvas_width) + key_width(canvas_width) / 2.0
}

/// True for the sharps/flats: C#, D#, F#, G#, A#.
pub fn is_black_key(note: u8) -> bool {
    matches!(note % 12, 1 | 3 | 6 | 8 | 10)
}
