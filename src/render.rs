//! Drawing passes for the piano roll and the spectrum display.
//!
//! The core never touches a GUI toolkit; it emits commands into the
//! [`Canvas`] trait and the host maps them onto its painter. A
//! [`RecordingCanvas`] is provided for tests and headless hosts.

use crate::gradient::{velocity_color, Gradient};
use crate::layout;
use crate::particle::{ParticleSystem, SPARK_CROSS_MIN_SIZE};
use crate::timeline::NoteTimeline;
use crate::types::{note_name, Color, LOWEST_NOTE, NUM_KEYS};

/// Axis-aligned rectangle in canvas pixels, origin top-left.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self { x, y, w, h }
    }
}

/// Host drawing seam. All methods are infallible command emission; the
/// host owns clipping, batching, and its paint context lifecycle.
pub trait Canvas {
    fn fill_rect(&mut self, rect: Rect, color: Color);
    fn fill_rounded_rect(&mut self, rect: Rect, radius: f32, color: Color);
    /// Vertical gradient fill; stops are (offset in [0,1] from the rect
    /// top, color), ascending.
    fn fill_vertical_gradient(&mut self, rect: Rect, radius: f32, stops: &[(f32, Color)]);
    fn draw_line(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, color: Color, width: f32);
    /// Radial gradient disc: bright center fading to transparent at `radius`.
    fn fill_glow(&mut self, cx: f32, cy: f32, radius: f32, color: Color);
    fn draw_text_centered(&mut self, rect: Rect, text: &str, size: f32, color: Color);
}

// ─── Visual config ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct VisualConfig {
    /// Draw note-name labels (e.g. "C4") on bars large enough to fit them
    pub show_note_labels: bool,
}

impl Default for VisualConfig {
    fn default() -> Self {
        Self {
            show_note_labels: true,
        }
    }
}

// ─── Palette ────────────────────────────────────────────────────────────────

const BG_COLOR: Color = Color::rgb(20, 20, 20);
const WHITE_KEY_COLOR: Color = Color::rgb(40, 40, 40);
const BLACK_KEY_COLOR: Color = Color::rgb(20, 20, 20);
const OCTAVE_LINE_COLOR: Color = Color::rgba(100, 100, 100, 255);
const LABEL_COLOR: Color = Color::rgb(255, 255, 255);

const NOTE_CORNER_RADIUS: f32 = 3.0;
/// Bars narrower/shorter than this skip their label.
const LABEL_MIN_SIZE: f32 = 14.0;
/// Archived bars are drawn at least this tall so brief taps stay visible.
const MIN_BAR_HEIGHT: f32 = 5.0;
/// Active bars within this distance of the canvas bottom get the eruption glow.
const ERUPTION_PROXIMITY: f32 = 4.0;

// ─── Piano roll pass ────────────────────────────────────────────────────────

/// Draw one frame of the piano roll: key background, archived bars, active
/// bars, particles, sparks.
pub fn render_piano_roll(
    canvas: &mut dyn Canvas,
    timeline: &NoteTimeline,
    particles: &ParticleSystem,
    gradient: &Gradient,
    visual: &VisualConfig,
    logical_now: f64,
    width: f32,
    height: f32,
) {
    if width <= 0.0 || height <= 0.0 {
        return;
    }
    draw_key_background(canvas, width, height);

    let speed = timeline.scroll_speed();

    for note in timeline.history() {
        draw_archived_note(canvas, gradient, visual, note, logical_now, speed, width, height);
    }
    for (note, active) in timeline.iter_active() {
        draw_active_note(
            canvas,
            gradient,
            visual,
            note,
            active.start,
            active.velocity,
            logical_now,
            speed,
            width,
            height,
        );
    }
    draw_particles(canvas, particles);
}

fn draw_key_background(canvas: &mut dyn Canvas, width: f32, height: f32) {
    canvas.fill_rect(Rect::new(0.0, 0.0, width, height), BG_COLOR);

    let kw = layout::key_width(width);
    // White key columns first, black overlaid
    for i in 0..NUM_KEYS {
        let note = LOWEST_NOTE + i as u8;
        if !layout::is_black_key(note) {
            canvas.fill_rect(
                Rect::new(layout::key_x(i, width), 0.0, kw, height),
                WHITE_KEY_COLOR,
            );
        }
    }
    for i in 0..NUM_KEYS {
        let note = LOWEST_NOTE + i as u8;
        if layout::is_black_key(note) {
            canvas.fill_rect(
                Rect::new(layout::key_x(i, width), 0.0, kw, height),
                BLACK_KEY_COLOR,
            );
        }
    }
    // Octave separators at each C
    for i in 0..NUM_KEYS {
        let note = LOWEST_NOTE + i as u8;
        if note % 12 == 0 {
            let x = layout::key_x(i, width);
            canvas.draw_line(x, 0.0, x, height, OCTAVE_LINE_COLOR, 1.0);
        }
    }
}

/// Bar rect for a note column: slightly inset within the key width.
fn bar_rect(note: u8, y_top: f32, h: f32, canvas_width: f32) -> Rect {
    let kw = layout::key_width(canvas_width);
    let w = (kw * 0.9).max(4.0);
    let cx = layout::note_center_x(note, canvas_width);
    Rect::new(cx - w / 2.0, y_top, w, h)
}

/// Multi-sample vertical gradient stops spanning a bar's height, so tall
/// bars pick up the full color sweep instead of a flat fill.
fn bar_gradient_stops(
    gradient: &Gradient,
    velocity: u8,
    rect: &Rect,
    canvas_height: f32,
    brighten: u8,
    alpha: u8,
) -> Vec<(f32, Color)> {
    const SAMPLES: usize = 4;
    (0..SAMPLES)
        .map(|i| {
            let frac = i as f32 / (SAMPLES - 1) as f32;
            let y = rect.y + rect.h * frac;
            let base = if gradient.enabled() {
                gradient.color_at(y, canvas_height)
            } else {
                velocity_color(velocity)
            };
            (frac, base.brightened(brighten).with_alpha(alpha))
        })
        .collect()
}

#[allow(clippy::too_many_arguments)]
fn draw_active_note(
    canvas: &mut dyn Canvas,
    gradient: &Gradient,
    visual: &VisualConfig,
    note: u8,
    start: f64,
    velocity: u8,
    logical_now: f64,
    speed: f32,
    width: f32,
    height: f32,
) {
    if !layout::on_keyboard(note) {
        return;
    }
    let elapsed = (logical_now - start).max(0.0) as f32;
    let bar_height = (elapsed * speed).min(height);
    if bar_height <= 0.0 {
        return;
    }
    let y_top = height - bar_height;
    let rect = bar_rect(note, y_top, bar_height, width);

    // Expanding, fading glow layers beneath the bar
    let glow_base = if gradient.enabled() {
        gradient.color_at(height, height)
    } else {
        velocity_color(velocity)
    };
    for layer in 1..=3u8 {
        let grow = layer as f32 * 2.0;
        let alpha = 60 / layer;
        canvas.fill_rounded_rect(
            Rect::new(
                rect.x - grow,
                rect.y - grow,
                rect.w + grow * 2.0,
                rect.h + grow * 2.0,
            ),
            NOTE_CORNER_RADIUS + grow,
            glow_base.with_alpha(alpha),
        );
    }

    let stops = bar_gradient_stops(gradient, velocity, &rect, height, 50, 220);
    canvas.fill_vertical_gradient(rect, NOTE_CORNER_RADIUS, &stops);

    // Eruption glow where the bar meets the canvas bottom
    if height - (rect.y + rect.h) <= ERUPTION_PROXIMITY {
        canvas.fill_glow(
            rect.x + rect.w / 2.0,
            height,
            rect.w * 2.0,
            glow_base.with_alpha(120),
        );
    }

    maybe_label(canvas, visual, note, &rect);
}

#[allow(clippy::too_many_arguments)]
fn draw_archived_note(
    canvas: &mut dyn Canvas,
    gradient: &Gradient,
    visual: &VisualConfig,
    note: &crate::timeline::CompletedNote,
    logical_now: f64,
    speed: f32,
    width: f32,
    height: f32,
) {
    if !layout::on_keyboard(note.note) {
        return;
    }
    let since_end = (logical_now - note.end).max(0.0) as f32;
    let y_bottom = height - since_end * speed;
    let y_top = y_bottom - note.visual_length.max(MIN_BAR_HEIGHT);

    // Fully scrolled off (prune handles deletion; render just skips)
    if y_bottom < 0.0 || y_top > height {
        return;
    }
    let y0 = y_top.max(0.0);
    let y1 = y_bottom.min(height);
    if y1 <= y0 {
        return;
    }
    let rect = bar_rect(note.note, y0, y1 - y0, width);

    // Softer single-layer glow than active bars
    let glow_base = if gradient.enabled() {
        gradient.color_at(rect.y + rect.h / 2.0, height)
    } else {
        velocity_color(note.velocity)
    };
    canvas.fill_rounded_rect(
        Rect::new(rect.x - 2.0, rect.y - 2.0, rect.w + 4.0, rect.h + 4.0),
        NOTE_CORNER_RADIUS + 2.0,
        glow_base.with_alpha(30),
    );

    let stops = bar_gradient_stops(gradient, note.velocity, &rect, height, 30, 240);
    canvas.fill_vertical_gradient(rect, NOTE_CORNER_RADIUS, &stops);

    maybe_label(canvas, visual, note.note, &rect);
}

fn maybe_label(canvas: &mut dyn Canvas, visual: &VisualConfig, note: u8, rect: &Rect) {
    if visual.show_note_labels && rect.h > LABEL_MIN_SIZE && rect.w > LABEL_MIN_SIZE {
        canvas.draw_text_centered(*rect, &note_name(note), 8.0, LABEL_COLOR);
    }
}

fn draw_particles(canvas: &mut dyn Canvas, particles: &ParticleSystem) {
    for p in particles.iter_regular() {
        canvas.fill_glow(p.x, p.y, p.size, p.color.with_alpha(p.alpha()));
    }
    for p in particles.iter_sparks() {
        let alpha = p.alpha();
        canvas.fill_glow(p.x, p.y, p.size, p.color.with_alpha(alpha));
        // Twinkle cross on the larger sparks
        if p.size > SPARK_CROSS_MIN_SIZE {
            let arm = p.size * 2.0;
            let c = p.color.with_alpha(alpha);
            canvas.draw_line(p.x - arm, p.y, p.x + arm, p.y, c, 1.0);
            canvas.draw_line(p.x, p.y - arm, p.x, p.y + arm, c, 1.0);
        }
    }
}

// ─── Spectrum pass ──────────────────────────────────────────────────────────

const SPECTRUM_BG: Color = Color::rgb(25, 25, 25);
const SPECTRUM_MARGIN: f32 = 8.0;
const BAR_WIDTH_RATIO: f32 = 0.8;
const PEAK_COLOR: Color = Color::rgba(255, 255, 255, 200);
/// Peaks below this are noise, not worth a line.
const PEAK_DRAW_THRESHOLD: f32 = 0.01;

/// Blue → green → yellow → red sweep used for the spectrum bars, matching
/// the classic analyzer look. `frac` is 0 at the bottom, 1 at the top.
fn spectrum_color(frac: f32) -> Color {
    let stops: [(f32, Color); 4] = [
        (0.0, Color::rgb(50, 100, 255)),
        (0.6, Color::rgb(50, 255, 50)),
        (0.8, Color::rgb(255, 255, 50)),
        (1.0, Color::rgb(255, 50, 50)),
    ];
    let f = frac.clamp(0.0, 1.0);
    let mut lo = stops[0];
    for &hi in &stops[1..] {
        if f <= hi.0 {
            let span = hi.0 - lo.0;
            let t = if span > 0.0 { (f - lo.0) / span } else { 0.0 };
            let lerp = |a: u8, b: u8| (a as f32 + (b as f32 - a as f32) * t).round() as u8;
            return Color::rgb(
                lerp(lo.1.r, hi.1.r),
                lerp(lo.1.g, hi.1.g),
                lerp(lo.1.b, hi.1.b),
            );
        }
        lo = hi;
    }
    stops[3].1
}

/// Draw the spectrum display: rounded background, per-band bars bottom-up,
/// peak-hold lines.
pub fn render_spectrum(
    canvas: &mut dyn Canvas,
    bars: &[f32],
    peaks: &[f32],
    width: f32,
    height: f32,
) {
    if width <= 0.0 || height <= 0.0 {
        return;
    }
    canvas.fill_rounded_rect(Rect::new(1.0, 1.0, width - 2.0, height - 2.0), 8.0, SPECTRUM_BG);
    if bars.is_empty() {
        return;
    }

    let inner_w = width - SPECTRUM_MARGIN * 2.0;
    let inner_h = height - SPECTRUM_MARGIN * 2.0;
    let spacing = inner_w / bars.len() as f32;
    let bar_w = spacing * BAR_WIDTH_RATIO;

    for (i, &value) in bars.iter().enumerate() {
        let bar_h = value.clamp(0.0, 1.0) * inner_h;
        if bar_h <= 0.0 {
            continue;
        }
        let x = SPECTRUM_MARGIN + i as f32 * spacing + (spacing - bar_w) / 2.0;
        let y = SPECTRUM_MARGIN + inner_h - bar_h;
        let rect = Rect::new(x, y, bar_w, bar_h);

        // Color the bar by its vertical extent within the full sweep
        let top_frac = value.clamp(0.0, 1.0);
        let stops = [
            (0.0, spectrum_color(top_frac)),
            (1.0, spectrum_color(0.0)),
        ];
        canvas.fill_vertical_gradient(rect, 2.0, &stops);

        if let Some(&peak) = peaks.get(i) {
            if peak > PEAK_DRAW_THRESHOLD {
                let peak_y = SPECTRUM_MARGIN + inner_h - peak.clamp(0.0, 1.0) * inner_h;
                canvas.draw_line(x, peak_y, x + bar_w, peak_y, PEAK_COLOR, 1.0);
            }
        }
    }
}

// ─── Recording canvas ───────────────────────────────────────────────────────

/// Records draw commands instead of rasterizing. Used by the test suite
/// and useful for headless hosts that batch commands themselves.
#[derive(Debug, Default)]
pub struct RecordingCanvas {
    pub commands: Vec<DrawCmd>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DrawCmd {
    Rect(Rect, Color),
    RoundedRect(Rect, f32, Color),
    VerticalGradient(Rect, f32, Vec<(f32, Color)>),
    Line(f32, f32, f32, f32, Color, f32),
    Glow(f32, f32, f32, Color),
    Text(Rect, String, f32, Color),
}

impl RecordingCanvas {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.commands.clear();
    }
}

impl Canvas for RecordingCanvas {
    fn fill_rect(&mut self, rect: Rect, color: Color) {
        self.commands.push(DrawCmd::Rect(rect, color));
    }

    fn fill_rounded_rect(&mut self, rect: Rect, radius: f32, color: Color) {
        self.commands.push(DrawCmd::RoundedRect(rect, radius, color));
    }

    fn fill_vertical_gradient(&mut self, rect: Rect, radius: f32, stops: &[(f32, Color)]) {
        self.commands
            .push(DrawCmd::VerticalGradient(rect, radius, stops.to_vec()));
    }

    fn draw_line(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, color: Color, width: f32) {
        self.commands.push(DrawCmd::Line(x1, y1, x2, y2, color, width));
    }

    fn fill_glow(&mut self, cx: f32, cy: f32, radius: f32, color: Color) {
        self.commands.push(DrawCmd::Glow(cx, cy, radius, color));
    }

    fn draw_text_centered(&mut self, rect: Rect, text: &str, size: f32, color: Color) {
        self.commands
            .push(DrawCmd::Text(rect, text.to_string(), size, color));
    }
}
