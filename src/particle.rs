//! Note-driven particle simulation.
//!
//! Two fixed-capacity pools (regular particles and bright "spark"
//! particles) recycle slots through a free list so sustained chords never
//! allocate past the configured bounds. Physics per tick: ballistic motion
//! plus two-layer sinusoidal turbulence, velocity damping, life-based
//! quadratic fade and linear shrink.

use log::warn;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::types::Color;

/// Canvas area against which spawn velocity/size are normalized; visuals
/// tuned at 800×400 stay proportionate at other window sizes.
const REFERENCE_AREA: f32 = 800.0 * 400.0;

/// Sparks render their cross highlight only above this size.
pub const SPARK_CROSS_MIN_SIZE: f32 = 0.8;

/// Canvas-size scale factor for spawn parameters, clamped so tiny or huge
/// windows do not produce degenerate particles.
pub fn widget_scale(canvas_w: f32, canvas_h: f32) -> f32 {
    let area = (canvas_w * canvas_h).max(1.0);
    (area / REFERENCE_AREA).sqrt().clamp(0.5, 3.0)
}

// ─── Configuration ──────────────────────────────────────────────────────────

/// Full particle tuning surface. Field names double as the recognized keys
/// for partial updates (`apply`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticleConfig {
    /// Seconds between spawn bursts per active note
    pub spawn_rate: f64,
    pub initial_velocity_x_min: f32,
    pub initial_velocity_x_max: f32,
    pub initial_velocity_y_min: f32,
    pub initial_velocity_y_max: f32,
    pub initial_size_min: f32,
    pub initial_size_max: f32,
    pub initial_opacity_min: u8,
    pub initial_opacity_max: u8,
    pub turbulence_strength: f32,
    pub damping_factor: f32,
    pub life_min: f32,
    pub life_max: f32,
    /// Fraction of the key width used as the spawn X span
    pub spawn_x_spread: f32,
    pub particles_per_note_base: u32,
    /// Extra particles at full velocity (scaled by velocity/127)
    pub particles_per_velocity: u32,
    pub max_particles_per_note: u32,
    pub max_particles: usize,
    pub max_spark_particles: usize,
    pub spark_enabled: bool,
    pub spark_size_min: f32,
    pub spark_size_max: f32,
    pub spark_opacity_min: u8,
    pub spark_opacity_max: u8,
    pub spark_life_min: f32,
    pub spark_life_max: f32,
    /// Sparks spawned per regular particle
    pub spark_count_ratio: f32,
}

impl Default for ParticleConfig {
    fn default() -> Self {
        Self {
            spawn_rate: 0.01,
            initial_velocity_x_min: -5.0,
            initial_velocity_x_max: 5.0,
            initial_velocity_y_min: -80.0,
            initial_velocity_y_max: -30.0,
            initial_size_min: 0.4,
            initial_size_max: 0.8,
            initial_opacity_min: 40,
            initial_opacity_max: 80,
            turbulence_strength: 0.8,
            damping_factor: 0.995,
            life_min: 0.5,
            life_max: 3.0,
            spawn_x_spread: 0.9,
            particles_per_note_base: 2,
            particles_per_velocity: 20,
            max_particles_per_note: 15,
            max_particles: 500,
            max_spark_particles: 300,
            spark_enabled: true,
            spark_size_min: 0.3,
            spark_size_max: 0.5,
            spark_opacity_min: 150,
            spark_opacity_max: 255,
            spark_life_min: 0.5,
            spark_life_max: 2.0,
            spark_count_ratio: 0.8,
        }
    }
}

impl ParticleConfig {
    /// Apply one named parameter. Returns false (and warns) on an unknown
    /// key or a value of the wrong shape; the config is left untouched in
    /// that case.
    pub fn apply(&mut self, key: &str, value: &serde_json::Value) -> bool {
        fn f32_of(v: &serde_json::Value) -> Option<f32> {
            v.as_f64().map(|x| x as f32)
        }
        fn u8_of(v: &serde_json::Value) -> Option<u8> {
            v.as_f64().map(|x| x.clamp(0.0, 255.0) as u8)
        }
        fn u32_of(v: &serde_json::Value) -> Option<u32> {
            v.as_f64().map(|x| x.max(0.0) as u32)
        }
        fn usize_of(v: &serde_json::Value) -> Option<usize> {
            v.as_f64().map(|x| x.max(0.0) as usize)
        }
        fn bool_of(v: &serde_json::Value) -> Option<bool> {
            v.as_bool().or_else(|| v.as_f64().map(|x| x != 0.0))
        }

        macro_rules! set {
            ($field:ident, $conv:ident) => {
                match $conv(value) {
                    Some(x) => {
                        self.$field = x;
                        true
                    }
                    None => {
                        warn!("particle config: bad value for {}: {}", key, value);
                        false
                    }
                }
            };
        }

        match key {
            "spawn_rate" => match value.as_f64() {
                Some(x) => {
                    self.spawn_rate = x;
                    true
                }
                None => {
                    warn!("particle config: bad value for spawn_rate: {}", value);
                    false
                }
            },
            "initial_velocity_x_min" => set!(initial_velocity_x_min, f32_of),
            "initial_velocity_x_max" => set!(initial_velocity_x_max, f32_of),
            "initial_velocity_y_min" => set!(initial_velocity_y_min, f32_of),
            "initial_velocity_y_max" => set!(initial_velocity_y_max, f32_of),
            "initial_size_min" => set!(initial_size_min, f32_of),
            "initial_size_max" => set!(initial_size_max, f32_of),
            "initial_opacity_min" => set!(initial_opacity_min, u8_of),
            "initial_opacity_max" => set!(initial_opacity_max, u8_of),
            "turbulence_strength" => set!(turbulence_strength, f32_of),
            "damping_factor" => set!(damping_factor, f32_of),
            "life_min" => set!(life_min, f32_of),
            "life_max" => set!(life_max, f32_of),
            "spawn_x_spread" => set!(spawn_x_spread, f32_of),
            "particles_per_note_base" => set!(particles_per_note_base, u32_of),
            "particles_per_velocity" => set!(particles_per_velocity, u32_of),
            "max_particles_per_note" => set!(max_particles_per_note, u32_of),
            "max_particles" => set!(max_particles, usize_of),
            "max_spark_particles" => set!(max_spark_particles, usize_of),
            "spark_enabled" => set!(spark_enabled, bool_of),
            "spark_size_min" => set!(spark_size_min, f32_of),
            "spark_size_max" => set!(spark_size_max, f32_of),
            "spark_opacity_min" => set!(spark_opacity_min, u8_of),
            "spark_opacity_max" => set!(spark_opacity_max, u8_of),
            "spark_life_min" => set!(spark_life_min, f32_of),
            "spark_life_max" => set!(spark_life_max, f32_of),
            "spark_count_ratio" => set!(spark_count_ratio, f32_of),
            _ => {
                warn!("particle config: unknown parameter '{}'", key);
                false
            }
        }
    }
}

// ─── Particle state ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct Particle {
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    pub life: f32,
    pub max_life: f32,
    pub size: f32,
    pub initial_size: f32,
    /// Base color; alpha is the full-scale opacity drawn at spawn
    pub color: Color,
    pub is_spark: bool,

    // Per-particle turbulence terms
    turb_phase: f32,
    turb_freq_x: f32,
    turb_freq_y: f32,
    turb_amp_x: f32,
    turb_amp_y: f32,
    turb_off_x: f32,
    turb_off_y: f32,
    damping: f32,
}

impl Particle {
    /// Fraction of life remaining, in [0,1].
    fn life_frac(&self) -> f32 {
        if self.max_life > 0.0 {
            (self.life / self.max_life).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }

    /// Current alpha: spawn opacity scaled by a quadratic life fade.
    pub fn alpha(&self) -> u8 {
        let f = self.life_frac();
        (self.color.a as f32 * f * f).round() as u8
    }

    pub fn is_alive(&self) -> bool {
        self.life > 0.0
    }

    /// One physics step. Turbulence phase advances at twice real time; the
    /// sin/cos pair gives each particle an independent drift loop.
    fn step(&mut self, dt: f32, turbulence_strength: f32) {
        self.turb_phase += dt * 2.0;
        let tx = (self.turb_phase * self.turb_freq_x + self.turb_off_x).sin()
            * self.turb_amp_x
            * turbulence_strength;
        let ty = (self.turb_phase * self.turb_freq_y + self.turb_off_y).cos()
            * self.turb_amp_y
            * turbulence_strength;

        self.x += (self.vx + tx) * dt;
        self.y += (self.vy + ty) * dt;
        self.vx *= self.damping;
        self.vy *= self.damping;
        self.life -= dt;
        self.size = (self.initial_size * self.life_frac()).max(0.1);
    }
}

// ─── Free-list pool ─────────────────────────────────────────────────────────

/// Fixed-capacity arena with an index free list. Slots are reused rather
/// than freed; `live` holds the indices currently in flight.
struct Pool {
    slots: Vec<Particle>,
    free: Vec<usize>,
    live: Vec<usize>,
    capacity: usize,
}

impl Pool {
    fn new(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity.min(1024)),
            free: Vec::new(),
            live: Vec::new(),
            capacity,
        }
    }

    fn len(&self) -> usize {
        self.live.len()
    }

    /// Place a particle into a recycled or fresh slot. Returns false when
    /// the pool is saturated.
    fn spawn(&mut self, p: Particle) -> bool {
        if self.live.len() >= self.capacity {
            return false;
        }
        let idx = match self.free.pop() {
            Some(i) => {
                self.slots[i] = p;
                i
            }
            None => {
                self.slots.push(p);
                self.slots.len() - 1
            }
        };
        self.live.push(idx);
        true
    }

    fn update(&mut self, dt: f32, turbulence_strength: f32) {
        let mut i = 0;
        while i < self.live.len() {
            let idx = self.live[i];
            self.slots[idx].step(dt, turbulence_strength);
            if self.slots[idx].is_alive() {
                i += 1;
            } else {
                self.free.push(idx);
                self.live.swap_remove(i);
            }
        }
    }

    fn clear(&mut self) {
        self.free.extend(self.live.drain(..));
    }

    fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity;
        // Shed overflow immediately so the bound holds after shrinking
        while self.live.len() > capacity {
            let idx = self.live.pop().unwrap();
            self.free.push(idx);
        }
    }

    fn iter(&self) -> impl Iterator<Item = &Particle> {
        self.live.iter().map(move |&i| &self.slots[i])
    }
}

// ─── Particle system ────────────────────────────────────────────────────────

pub struct ParticleSystem {
    config: ParticleConfig,
    regular: Pool,
    sparks: Pool,
    rng: StdRng,
}

impl ParticleSystem {
    pub fn new(config: ParticleConfig) -> Self {
        let regular = Pool::new(config.max_particles);
        let sparks = Pool::new(config.max_spark_particles);
        Self {
            config,
            regular,
            sparks,
            rng: StdRng::from_entropy(),
        }
    }

    /// Deterministic RNG for tests.
    pub fn with_seed(config: ParticleConfig, seed: u64) -> Self {
        let mut s = Self::new(config);
        s.rng = StdRng::seed_from_u64(seed);
        s
    }

    pub fn config(&self) -> &ParticleConfig {
        &self.config
    }

    /// Apply one named parameter, resizing pools when a capacity changes.
    pub fn apply_config(&mut self, key: &str, value: &serde_json::Value) -> bool {
        let ok = self.config.apply(key, value);
        if ok {
            self.regular.set_capacity(self.config.max_particles);
            self.sparks.set_capacity(self.config.max_spark_particles);
        }
        ok
    }

    pub fn live_count(&self) -> usize {
        self.regular.len() + self.sparks.len()
    }

    pub fn regular_count(&self) -> usize {
        self.regular.len()
    }

    pub fn spark_count(&self) -> usize {
        self.sparks.len()
    }

    /// One spawn burst for an active note. `x_center`/`key_width` give the
    /// note's key column; particles erupt from the canvas bottom edge.
    /// `base_color` is the gradient sample at the bottom of the canvas.
    pub fn spawn_for_note(
        &mut self,
        x_center: f32,
        key_width: f32,
        canvas_w: f32,
        canvas_h: f32,
        velocity: u8,
        base_color: Color,
    ) {
        let c = &self.config;
        let scale = widget_scale(canvas_w, canvas_h);

        let count = (c.particles_per_note_base
            + (velocity as f32 / 127.0 * c.particles_per_velocity as f32) as u32)
            .min(c.max_particles_per_note);
        let spark_count = if c.spark_enabled {
            (count as f32 * c.spark_count_ratio).round() as u32
        } else {
            0
        };

        for _ in 0..count {
            let p = self.make_particle(x_center, key_width, canvas_h, scale, base_color, false);
            if !self.regular.spawn(p) {
                break;
            }
        }
        for _ in 0..spark_count {
            let p = self.make_particle(x_center, key_width, canvas_h, scale, base_color, true);
            if !self.sparks.spawn(p) {
                break;
            }
        }
    }

    fn make_particle(
        &mut self,
        x_center: f32,
        key_width: f32,
        canvas_h: f32,
        scale: f32,
        base_color: Color,
        spark: bool,
    ) -> Particle {
        let c = self.config.clone();
        let rng = &mut self.rng;

        let uniform = |rng: &mut StdRng, lo: f32, hi: f32| -> f32 {
            if hi > lo {
                rng.gen_range(lo..hi)
            } else {
                lo
            }
        };

        let spread = key_width * c.spawn_x_spread;
        let x = x_center + uniform(rng, -0.5, 0.5) * spread;
        let jitter = uniform(rng, 0.9, 1.1);

        let (life_lo, life_hi, size_lo, size_hi, op_lo, op_hi) = if spark {
            (
                c.spark_life_min,
                c.spark_life_max,
                c.spark_size_min,
                c.spark_size_max,
                c.spark_opacity_min,
                c.spark_opacity_max,
            )
        } else {
            (
                c.life_min,
                c.life_max,
                c.initial_size_min,
                c.initial_size_max,
                c.initial_opacity_min,
                c.initial_opacity_max,
            )
        };

        let life = uniform(rng, life_lo, life_hi) * jitter;
        let size = (uniform(rng, size_lo, size_hi) * jitter * scale).clamp(0.1, 20.0);
        let alpha = if op_hi > op_lo {
            rng.gen_range(op_lo..=op_hi)
        } else {
            op_lo
        };

        let color = if spark {
            // Near-white twinkle
            Color::rgba(255, 255, 240, alpha)
        } else {
            let boost = uniform(rng, 1.0, 1.5);
            base_color.scaled(boost).with_alpha(alpha)
        };

        Particle {
            x,
            y: canvas_h,
            vx: uniform(rng, c.initial_velocity_x_min, c.initial_velocity_x_max) * scale,
            vy: uniform(rng, c.initial_velocity_y_min, c.initial_velocity_y_max) * scale,
            life,
            max_life: life,
            size,
            initial_size: size,
            color,
            is_spark: spark,
            turb_phase: 0.0,
            turb_freq_x: uniform(rng, 0.5, 2.5),
            turb_freq_y: uniform(rng, 0.5, 2.5),
            turb_amp_x: uniform(rng, 4.0, 12.0),
            turb_amp_y: uniform(rng, 4.0, 12.0),
            turb_off_x: uniform(rng, 0.0, std::f32::consts::TAU),
            turb_off_y: uniform(rng, 0.0, std::f32::consts::TAU),
            damping: c.damping_factor,
        }
    }

    /// Advance the simulation by `dt` seconds.
    pub fn update(&mut self, dt: f32) {
        if dt <= 0.0 {
            return;
        }
        let strength = self.config.turbulence_strength;
        self.regular.update(dt, strength);
        self.sparks.update(dt, strength);
    }

    pub fn clear(&mut self) {
        self.regular.clear();
        self.sparks.clear();
    }

    pub fn iter_regular(&self) -> impl Iterator<Item = &Particle> {
        self.regular.iter()
    }

    pub fn iter_sparks(&self) -> impl Iterator<Item = &Particle> {
        self.sparks.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn system() -> ParticleSystem {
        ParticleSystem::with_seed(ParticleConfig::default(), 42)
    }

    fn burst(s: &mut ParticleSystem, velocity: u8) {
        s.spawn_for_note(400.0, 9.0, 800.0, 400.0, velocity, Color::rgb(255, 150, 0));
    }

    #[test]
    fn test_spawn_count_follows_velocity() {
        let mut s = system();
        burst(&mut s, 1);
        let soft = s.regular_count();
        s.clear();
        burst(&mut s, 127);
        let loud = s.regular_count();
        assert!(soft < loud, "soft {} vs loud {}", soft, loud);
        assert!(loud as u32 <= s.config().max_particles_per_note);
    }

    #[test]
    fn test_pool_bound_holds() {
        let mut s = system();
        for _ in 0..1000 {
            burst(&mut s, 127);
        }
        assert!(s.regular_count() <= s.config().max_particles);
        assert!(s.spark_count() <= s.config().max_spark_particles);
        assert_eq!(s.regular_count(), s.config().max_particles);
    }

    #[test]
    fn test_shrinking_capacity_sheds_overflow() {
        let mut s = system();
        for _ in 0..1000 {
            burst(&mut s, 127);
        }
        assert!(s.apply_config("max_particles", &json!(50)));
        assert!(s.regular_count() <= 50);
    }

    #[test]
    fn test_particles_die_and_recycle() {
        let mut s = system();
        burst(&mut s, 100);
        let before = s.live_count();
        assert!(before > 0);
        // Longest possible life is life_max * 1.1 jitter
        let max_life = s.config().life_max.max(s.config().spark_life_max) * 1.1;
        let steps = (max_life / 0.016) as usize + 2;
        for _ in 0..steps {
            s.update(0.016);
        }
        assert_eq!(s.live_count(), 0, "all particles should expire");
        // Recycled slots accept a fresh burst
        burst(&mut s, 100);
        assert!(s.live_count() > 0);
    }

    #[test]
    fn test_quadratic_fade_and_shrink() {
        let mut s = system();
        burst(&mut s, 100);
        let initial: Vec<(u8, f32)> = s.iter_regular().map(|p| (p.alpha(), p.size)).collect();
        for _ in 0..20 {
            s.update(0.016);
        }
        for (p, (a0, s0)) in s.iter_regular().zip(initial.iter()) {
            assert!(p.alpha() <= *a0, "alpha should only fade");
            assert!(p.size <= *s0, "size should only shrink");
            let f = p.life / p.max_life;
            let expected = (p.color.a as f32 * f * f).round() as u8;
            assert_eq!(p.alpha(), expected);
        }
    }

    #[test]
    fn test_damping_slows_particles() {
        let mut s = system();
        burst(&mut s, 100);
        let speed0: Vec<f32> = s.iter_regular().map(|p| p.vx.hypot(p.vy)).collect();
        // Short enough that no particle expires and reorders the pool
        for _ in 0..20 {
            s.update(0.016);
        }
        for (p, &v0) in s.iter_regular().zip(speed0.iter()) {
            assert!(p.vx.hypot(p.vy) <= v0 + 1e-3);
        }
    }

    #[test]
    fn test_particles_rise_from_bottom() {
        let mut s = system();
        burst(&mut s, 100);
        assert!(s.iter_regular().all(|p| p.y == 400.0), "spawn at bottom edge");
        for _ in 0..10 {
            s.update(0.016);
        }
        // Upward velocity range is strictly negative
        assert!(s.iter_regular().all(|p| p.y < 400.0), "particles move up");
    }

    #[test]
    fn test_sparks_disabled() {
        let mut s = system();
        assert!(s.apply_config("spark_enabled", &json!(false)));
        burst(&mut s, 127);
        assert_eq!(s.spark_count(), 0);
        assert!(s.regular_count() > 0);
    }

    #[test]
    fn test_spark_color_near_white() {
        let mut s = system();
        burst(&mut s, 127);
        for p in s.iter_sparks() {
            assert!(p.is_spark);
            assert!(p.color.r == 255 && p.color.g == 255 && p.color.b >= 230);
            assert!(p.color.a >= s.config().spark_opacity_min);
        }
    }

    #[test]
    fn test_unknown_config_key_ignored() {
        let mut s = system();
        let before = s.config().clone();
        assert!(!s.apply_config("warp_factor", &json!(9.0)));
        assert_eq!(
            serde_json::to_value(s.config()).unwrap(),
            serde_json::to_value(&before).unwrap()
        );
    }

    #[test]
    fn test_config_round_trip_through_json() {
        let mut s = system();
        assert!(s.apply_config("turbulence_strength", &json!(1.5)));
        assert!(s.apply_config("spawn_rate", &json!(0.02)));
        let v = serde_json::to_value(s.config()).unwrap();
        assert_eq!(v["turbulence_strength"].as_f64().unwrap(), 1.5);
        assert_eq!(v["spawn_rate"].as_f64().unwrap(), 0.02);
    }

    #[test]
    fn test_widget_scale_clamped() {
        assert_eq!(widget_scale(800.0, 400.0), 1.0);
        assert_eq!(widget_scale(10.0, 10.0), 0.5);
        assert_eq!(widget_scale(10000.0, 10000.0), 3.0);
    }
}
