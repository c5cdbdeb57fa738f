//! Engine facade: the single object a host embeds.
//!
//! Owns the spectrum analyzer, note timeline, particle system, and gradient,
//! and exposes the full host API: event ingestion, transport, configuration
//! updates as JSON objects, the per-frame tick, and the two render passes.
//!
//! Public methods that depend on time read the session clock themselves;
//! each has an `_at` twin taking explicit wall seconds so behavior is
//! deterministic under test.

use log::{debug, warn};

use crate::gradient::{preset, velocity_color, Gradient, GradientConfig};
use crate::layout;
use crate::particle::{ParticleConfig, ParticleSystem};
use crate::render::{self, Canvas, VisualConfig};
use crate::spectrum::SpectrumAnalyzer;
use crate::timeline::NoteTimeline;
use crate::types::{AudioChunk, DisplayFrame, InputEvent, NoteEvent, SessionClock};

pub const DEFAULT_CANVAS_WIDTH: f32 = 800.0;
pub const DEFAULT_CANVAS_HEIGHT: f32 = 400.0;
/// Assumed until the first audio chunk reports its own rate.
pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;

pub struct VisualizerEngine {
    clock: SessionClock,
    analyzer: SpectrumAnalyzer,
    timeline: NoteTimeline,
    particles: ParticleSystem,
    gradient: Gradient,
    visual: VisualConfig,
    canvas_w: f32,
    canvas_h: f32,
    /// Wall time of the previous tick, for dt integration
    last_tick: Option<f64>,
    /// Logical time of the last particle burst
    last_spawn: f64,
}

impl VisualizerEngine {
    pub fn new() -> Self {
        Self::with_canvas_size(DEFAULT_CANVAS_WIDTH, DEFAULT_CANVAS_HEIGHT)
    }

    pub fn with_canvas_size(width: f32, height: f32) -> Self {
        Self {
            clock: SessionClock::new(),
            analyzer: SpectrumAnalyzer::new(DEFAULT_SAMPLE_RATE),
            timeline: NoteTimeline::new(),
            particles: ParticleSystem::new(ParticleConfig::default()),
            gradient: Gradient::default(),
            visual: VisualConfig::default(),
            canvas_w: width.max(1.0),
            canvas_h: height.max(1.0),
            last_tick: None,
            last_spawn: 0.0,
        }
    }

    /// Deterministic particle RNG for tests.
    #[cfg(test)]
    pub fn with_seed(seed: u64) -> Self {
        let mut e = Self::new();
        e.particles = ParticleSystem::with_seed(ParticleConfig::default(), seed);
        e
    }

    /// The host calls this on resize; geometry and spawn scaling follow.
    pub fn set_canvas_size(&mut self, width: f32, height: f32) {
        self.canvas_w = width.max(1.0);
        self.canvas_h = height.max(1.0);
    }

    // ── Event ingestion ─────────────────────────────────────────────────

    pub fn handle_event(&mut self, event: InputEvent) {
        match event {
            InputEvent::Audio(chunk) => self.push_audio(chunk),
            InputEvent::Note(NoteEvent::On { note, velocity }) => self.note_on(note, velocity),
            InputEvent::Note(NoteEvent::Off { note }) => self.note_off(note),
        }
    }

    pub fn push_audio(&mut self, chunk: AudioChunk) {
        self.analyzer.push_chunk(&chunk);
    }

    pub fn note_on(&mut self, note: u8, velocity: u8) {
        self.note_on_at(note, velocity, self.clock.now_secs());
    }

    pub fn note_on_at(&mut self, note: u8, velocity: u8, now: f64) {
        self.timeline.note_on(note, velocity, now);
    }

    pub fn note_off(&mut self, note: u8) {
        self.note_off_at(note, self.clock.now_secs());
    }

    pub fn note_off_at(&mut self, note: u8, now: f64) {
        self.timeline.note_off(note, now);
    }

    /// Drop all notes and particles. Spectrum state is untouched; it decays
    /// on its own.
    pub fn clear_notes(&mut self) {
        self.timeline.clear();
        self.particles.clear();
    }

    /// Zero the spectrum, peaks, and any buffered audio.
    pub fn clear_spectrum(&mut self) {
        self.analyzer.clear();
    }

    // ── Transport ───────────────────────────────────────────────────────

    pub fn pause(&mut self) {
        self.timeline.pause(self.clock.now_secs());
    }

    pub fn play(&mut self) {
        self.timeline.play(self.clock.now_secs());
    }

    pub fn toggle_pause(&mut self) {
        self.timeline.toggle_pause(self.clock.now_secs());
    }

    pub fn is_playing(&self) -> bool {
        self.timeline.is_playing()
    }

    pub fn set_scroll_speed(&mut self, pixels_per_second: f32) {
        self.timeline.set_scroll_speed(pixels_per_second);
    }

    // ── Configuration ───────────────────────────────────────────────────

    /// Partial particle config update from a JSON object. Unknown keys and
    /// malformed values warn and are skipped; valid keys in the same object
    /// still apply. Returns the number of parameters applied.
    pub fn update_particle_config(&mut self, params: &serde_json::Value) -> usize {
        let Some(map) = params.as_object() else {
            warn!("particle config update must be a JSON object, got {}", params);
            return 0;
        };
        let mut applied = 0;
        for (key, value) in map {
            if self.particles.apply_config(key, value) {
                applied += 1;
            }
        }
        debug!("particle config: applied {}/{} parameters", applied, map.len());
        applied
    }

    pub fn particle_config(&self) -> &ParticleConfig {
        self.particles.config()
    }

    /// Gradient update from a JSON object. Recognized keys: `enabled`
    /// (bool), `preset` (name), `colors` (list of [r,g,b]), `positions`
    /// (list of floats, optional alongside `colors`).
    pub fn update_gradient_config(&mut self, params: &serde_json::Value) -> bool {
        let Some(map) = params.as_object() else {
            warn!("gradient config update must be a JSON object, got {}", params);
            return false;
        };
        let mut ok = true;

        if let Some(v) = map.get("enabled") {
            match v.as_bool() {
                Some(e) => self.gradient.set_enabled(e),
                None => {
                    warn!("gradient config: bad value for enabled: {}", v);
                    ok = false;
                }
            }
        }
        if let Some(v) = map.get("preset") {
            match v.as_str().and_then(preset) {
                Some((colors, positions)) => {
                    self.gradient.set_colors(&colors, Some(&positions));
                }
                None => {
                    warn!("gradient config: unknown preset {}", v);
                    ok = false;
                }
            }
        }
        if let Some(v) = map.get("colors") {
            let colors = parse_color_list(v);
            let positions = map.get("positions").and_then(parse_position_list);
            match colors {
                Some(colors) => {
                    if !self.gradient.set_colors(&colors, positions.as_deref()) {
                        ok = false;
                    }
                }
                None => {
                    warn!("gradient config: colors must be a list of [r,g,b] triples");
                    ok = false;
                }
            }
        }
        ok
    }

    pub fn set_gradient_colors(&mut self, colors: &[(u8, u8, u8)], positions: Option<&[f32]>) -> bool {
        self.gradient.set_colors(colors, positions)
    }

    pub fn gradient_config(&self) -> &GradientConfig {
        self.gradient.config()
    }

    pub fn update_visual_config(&mut self, params: &serde_json::Value) -> bool {
        let Some(map) = params.as_object() else {
            warn!("visual config update must be a JSON object, got {}", params);
            return false;
        };
        let mut ok = true;
        for (key, value) in map {
            match key.as_str() {
                "show_note_labels" => match value.as_bool() {
                    Some(b) => self.visual.show_note_labels = b,
                    None => {
                        warn!("visual config: bad value for {}: {}", key, value);
                        ok = false;
                    }
                },
                _ => {
                    warn!("visual config: unknown parameter '{}'", key);
                    ok = false;
                }
            }
        }
        ok
    }

    // ── Frame advance ───────────────────────────────────────────────────

    pub fn tick(&mut self) {
        self.tick_at(self.clock.now_secs());
    }

    /// Advance one frame at the given wall time: integrate particles, emit
    /// spawn bursts for held notes, prune scrolled-off history. Paused
    /// transport freezes all of it.
    pub fn tick_at(&mut self, now: f64) {
        let dt = match self.last_tick {
            Some(prev) => (now - prev).max(0.0) as f32,
            None => 0.0,
        };
        self.last_tick = Some(now);

        if !self.timeline.is_playing() {
            return;
        }
        self.particles.update(dt);

        let logical = self.timeline.logical(now);
        if self.timeline.active_count() > 0
            && logical - self.last_spawn >= self.particles.config().spawn_rate
        {
            self.spawn_bursts();
            self.last_spawn = logical;
        }
        self.timeline.prune(self.canvas_h, now);
    }

    fn spawn_bursts(&mut self) {
        let key_width = layout::key_width(self.canvas_w);
        let bottom_color = if self.gradient.enabled() {
            Some(self.gradient.color_at(self.canvas_h, self.canvas_h))
        } else {
            None
        };
        let notes: Vec<(u8, u8)> = self
            .timeline
            .iter_active()
            .map(|(n, a)| (n, a.velocity))
            .collect();
        for (note, velocity) in notes {
            if !layout::on_keyboard(note) {
                continue;
            }
            let color = bottom_color.unwrap_or_else(|| velocity_color(velocity));
            self.particles.spawn_for_note(
                layout::note_center_x(note, self.canvas_w),
                key_width,
                self.canvas_w,
                self.canvas_h,
                velocity,
                color,
            );
        }
    }

    // ── Output ──────────────────────────────────────────────────────────

    /// Smoothed spectrum bars. Analysis runs on audio ingest, so this is a
    /// plain read.
    pub fn spectrum_bars(&self) -> &[f32] {
        self.analyzer.bars()
    }

    pub fn spectrum_peaks(&self) -> &[f32] {
        self.analyzer.peaks()
    }

    /// Snapshot for out-of-process consumers (console display, tests).
    pub fn frame(&self) -> DisplayFrame {
        DisplayFrame {
            timestamp_us: self.clock.now_us(),
            bars: self.analyzer.bars().to_vec(),
            peaks: self.analyzer.peaks().to_vec(),
            active_notes: self.timeline.active_count(),
            archived_notes: self.timeline.history().len(),
            live_particles: self.particles.live_count(),
            playing: self.timeline.is_playing(),
        }
    }

    /// Piano roll pass at the given size. `set_canvas_size` still governs
    /// tick-side geometry (spawn positions, prune height); hosts pass the
    /// same dimensions to both.
    pub fn render(&self, canvas: &mut dyn Canvas, width: f32, height: f32) {
        self.render_at(canvas, self.clock.now_secs(), width, height);
    }

    pub fn render_at(&self, canvas: &mut dyn Canvas, now: f64, width: f32, height: f32) {
        render::render_piano_roll(
            canvas,
            &self.timeline,
            &self.particles,
            &self.gradient,
            &self.visual,
            self.timeline.logical(now),
            width,
            height,
        );
    }

    /// Spectrum pass, sized independently of the piano roll canvas.
    pub fn render_spectrum(&self, canvas: &mut dyn Canvas, width: f32, height: f32) {
        render::render_spectrum(canvas, self.analyzer.bars(), self.analyzer.peaks(), width, height);
    }

    pub fn live_particles(&self) -> usize {
        self.particles.live_count()
    }

    pub fn active_notes(&self) -> usize {
        self.timeline.active_count()
    }
}

impl Default for VisualizerEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_color_list(v: &serde_json::Value) -> Option<Vec<(u8, u8, u8)>> {
    let arr = v.as_array()?;
    arr.iter()
        .map(|c| {
            let t = c.as_array()?;
            if t.len() != 3 {
                return None;
            }
            let ch = |i: usize| t[i].as_f64().map(|x| x.clamp(0.0, 255.0) as u8);
            Some((ch(0)?, ch(1)?, ch(2)?))
        })
        .collect()
}

fn parse_position_list(v: &serde_json::Value) -> Option<Vec<f32>> {
    let arr = v.as_array()?;
    arr.iter().map(|p| p.as_f64().map(|x| x as f32)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::RecordingCanvas;
    use serde_json::json;

    #[test]
    fn test_held_note_spawns_particles() {
        let mut e = VisualizerEngine::with_seed(3);
        e.note_on_at(60, 100, 0.0);
        e.tick_at(0.0);
        e.tick_at(0.016);
        assert!(e.live_particles() > 0, "held note should emit particles");
        assert_eq!(e.active_notes(), 1);
    }

    #[test]
    fn test_pause_freezes_particles_and_spawning() {
        let mut e = VisualizerEngine::with_seed(3);
        e.note_on_at(60, 100, 0.0);
        e.tick_at(0.0);
        e.tick_at(0.016);
        let count = e.live_particles();
        assert!(count > 0);
        e.pause();
        for i in 0..100 {
            e.tick_at(1.0 + i as f64 * 0.016);
        }
        assert_eq!(e.live_particles(), count, "paused sim must not advance");
    }

    #[test]
    fn test_clear_notes_drops_everything() {
        let mut e = VisualizerEngine::with_seed(3);
        e.note_on_at(60, 100, 0.0);
        e.note_on_at(64, 100, 0.0);
        e.tick_at(0.0);
        e.tick_at(0.016);
        e.note_off_at(60, 0.5);
        e.clear_notes();
        assert_eq!(e.active_notes(), 0);
        assert_eq!(e.live_particles(), 0);
        let f = e.frame();
        assert_eq!(f.archived_notes, 0);
    }

    #[test]
    fn test_particle_config_partial_update() {
        let mut e = VisualizerEngine::new();
        let applied = e.update_particle_config(&json!({
            "turbulence_strength": 1.2,
            "max_particles": 100,
            "bogus_key": 7
        }));
        assert_eq!(applied, 2, "valid keys apply even next to unknown ones");
        assert_eq!(e.particle_config().turbulence_strength, 1.2);
        assert_eq!(e.particle_config().max_particles, 100);
        assert_eq!(e.update_particle_config(&json!("not an object")), 0);
    }

    #[test]
    fn test_gradient_config_update() {
        let mut e = VisualizerEngine::new();
        assert!(e.update_gradient_config(&json!({"preset": "ocean"})));
        assert_eq!(e.gradient_config().colors[0], (100, 200, 255));
        assert!(e.update_gradient_config(&json!({
            "colors": [[0, 0, 0], [255, 255, 255]],
            "positions": [0.0, 1.0]
        })));
        assert_eq!(e.gradient_config().colors.len(), 2);
        assert!(!e.update_gradient_config(&json!({"preset": "nope"})));
        assert!(e.update_gradient_config(&json!({"enabled": false})));
        assert!(!e.gradient_config().enabled);
    }

    #[test]
    fn test_visual_config_update() {
        let mut e = VisualizerEngine::new();
        assert!(e.update_visual_config(&json!({"show_note_labels": false})));
        assert!(!e.update_visual_config(&json!({"show_note_labels": "yes"})));
        assert!(!e.update_visual_config(&json!({"mystery": 1})));
    }

    #[test]
    fn test_event_dispatch_and_frame() {
        let mut e = VisualizerEngine::new();
        e.handle_event(InputEvent::Note(NoteEvent::On {
            note: 69,
            velocity: 90,
        }));
        let f = e.frame();
        assert_eq!(f.active_notes, 1);
        assert!(f.playing);
        e.handle_event(InputEvent::Note(NoteEvent::Off { note: 69 }));
        let f = e.frame();
        assert_eq!(f.active_notes, 0);
        assert_eq!(f.archived_notes, 1);
    }

    #[test]
    fn test_audio_reaches_spectrum() {
        let mut e = VisualizerEngine::new();
        // 200ms fills the 4096-sample analysis window
        let samples = crate::dsp::test_helpers::sine_wave(440.0, 0.8, 44_100, 200);
        e.push_audio(AudioChunk {
            timestamp_us: 0,
            samples,
            sample_rate: 44_100,
        });
        assert!(
            e.spectrum_bars().iter().any(|&b| b > 0.0),
            "sine should light up a band"
        );
    }

    #[test]
    fn test_render_produces_commands() {
        let mut e = VisualizerEngine::with_seed(3);
        e.note_on_at(60, 100, 0.0);
        let mut canvas = RecordingCanvas::new();
        e.render_at(&mut canvas, 1.0, 800.0, 400.0);
        assert!(!canvas.commands.is_empty());
    }

    #[test]
    fn test_render_uses_passed_dimensions() {
        let e = VisualizerEngine::new();
        // Stored canvas size is the 800x400 default; render at a resized
        // window must cover the new extent
        let mut canvas = RecordingCanvas::new();
        e.render_at(&mut canvas, 0.0, 1600.0, 900.0);
        let bg = canvas.commands.iter().find_map(|c| match c {
            crate::render::DrawCmd::Rect(r, _) => Some(*r),
            _ => None,
        });
        let bg = bg.expect("background rect drawn");
        assert_eq!((bg.w, bg.h), (1600.0, 900.0));
    }

    #[test]
    fn test_first_tick_has_no_dt_jump() {
        let mut e = VisualizerEngine::with_seed(3);
        e.note_on_at(60, 100, 0.0);
        // First tick arrives late; dt must be 0 so nothing integrates wildly
        e.tick_at(100.0);
        assert!(e.is_playing());
        // Freshly spawned particles must still be at full life
        assert!(e.live_particles() > 0);
    }
}
