//! Vertical color gradient engine.
//!
//! Maps a normalized vertical position to an interpolated RGB color from a
//! multi-stop gradient. `color_at` is called per render, per vertical
//! sample, so lookups go through a small precomputed table rebuilt only
//! when the stops change.

use log::warn;
use serde::{Deserialize, Serialize};

use crate::types::Color;

/// Lookup table resolution. 100 entries is indistinguishable on screen and
/// keeps per-pixel sampling to an index operation.
const LUT_SIZE: usize = 100;

/// Gradient stops: parallel `colors` / `positions` lists, positions
/// ascending in [0,1]. First and last stops clamp out-of-range lookups.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientConfig {
    pub enabled: bool,
    pub colors: Vec<(u8, u8, u8)>,
    pub positions: Vec<f32>,
}

impl Default for GradientConfig {
    fn default() -> Self {
        let (colors, positions) = preset("fire").unwrap();
        Self {
            enabled: true,
            colors,
            positions,
        }
    }
}

/// Named color schemes from the original configuration surface.
pub fn preset(name: &str) -> Option<(Vec<(u8, u8, u8)>, Vec<f32>)> {
    match name {
        "fire" => Some((
            vec![(255, 100, 150), (255, 150, 0), (255, 50, 50)],
            vec![0.0, 0.5, 1.0],
        )),
        "ocean" => Some((
            vec![(100, 200, 255), (0, 150, 255), (0, 100, 200)],
            vec![0.0, 0.5, 1.0],
        )),
        "sunset" => Some((
            vec![(255, 200, 100), (255, 120, 50), (150, 50, 100)],
            vec![0.0, 0.5, 1.0],
        )),
        "rainbow" => Some((
            vec![
                (255, 50, 50),
                (255, 255, 50),
                (50, 255, 50),
                (50, 150, 255),
                (150, 50, 255),
            ],
            vec![0.0, 0.25, 0.5, 0.75, 1.0],
        )),
        _ => None,
    }
}

/// Fallback palette when the gradient is disabled: velocity-indexed colors,
/// soft blue for quiet notes through red for the loudest.
const VELOCITY_COLORS: [Color; 10] = [
    Color::rgb(100, 170, 255),
    Color::rgb(80, 140, 255),
    Color::rgb(50, 170, 255),
    Color::rgb(0, 210, 255),
    Color::rgb(0, 255, 255),
    Color::rgb(50, 255, 50),
    Color::rgb(255, 255, 0),
    Color::rgb(255, 180, 0),
    Color::rgb(255, 100, 0),
    Color::rgb(255, 50, 50),
];

pub fn velocity_color(velocity: u8) -> Color {
    VELOCITY_COLORS[((velocity / 13) as usize).min(9)]
}

pub struct Gradient {
    config: GradientConfig,
    lut: Vec<Color>,
}

impl Gradient {
    pub fn new(config: GradientConfig) -> Self {
        let mut g = Self {
            config,
            lut: Vec::new(),
        };
        g.rebuild_lut();
        g
    }

    pub fn config(&self) -> &GradientConfig {
        &self.config
    }

    pub fn enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.config.enabled = enabled;
    }

    /// Replace the stop list. Positions default to evenly spaced when not
    /// given. Invalid stop sets (fewer than 2 colors, count mismatch,
    /// non-ascending positions) are rejected with a warning and the
    /// previous gradient stays in effect.
    pub fn set_colors(&mut self, colors: &[(u8, u8, u8)], positions: Option<&[f32]>) -> bool {
        if colors.len() < 2 {
            warn!("gradient: need at least 2 stops, got {}", colors.len());
            return false;
        }
        let positions: Vec<f32> = match positions {
            Some(p) => {
                if p.len() != colors.len() {
                    warn!(
                        "gradient: {} colors but {} positions",
                        colors.len(),
                        p.len()
                    );
                    return false;
                }
                if p.windows(2).any(|w| w[1] <= w[0])
                    || p.iter().any(|&v| !(0.0..=1.0).contains(&v))
                {
                    warn!("gradient: positions must be ascending within [0,1]");
                    return false;
                }
                p.to_vec()
            }
            None => {
                let n = colors.len();
                (0..n).map(|i| i as f32 / (n - 1) as f32).collect()
            }
        };
        self.config.colors = colors.to_vec();
        self.config.positions = positions;
        self.rebuild_lut();
        true
    }

    /// Exact interpolation at a normalized position, independent of the LUT.
    pub fn sample(&self, t: f32) -> Color {
        let t = t.clamp(0.0, 1.0);
        let colors = &self.config.colors;
        let positions = &self.config.positions;

        if t <= positions[0] {
            let (r, g, b) = colors[0];
            return Color::rgb(r, g, b);
        }
        if t >= *positions.last().unwrap() {
            let (r, g, b) = *colors.last().unwrap();
            return Color::rgb(r, g, b);
        }
        // Locate the bracketing stop pair
        let hi = positions.partition_point(|&p| p < t).min(positions.len() - 1);
        let lo = hi - 1;
        let span = positions[hi] - positions[lo];
        let frac = if span > 0.0 {
            (t - positions[lo]) / span
        } else {
            0.0
        };
        let (r0, g0, b0) = colors[lo];
        let (r1, g1, b1) = colors[hi];
        let lerp = |a: u8, b: u8| (a as f32 + (b as f32 - a as f32) * frac).round() as u8;
        Color::rgb(lerp(r0, r1), lerp(g0, g1), lerp(b0, b1))
    }

    fn rebuild_lut(&mut self) {
        self.lut = (0..LUT_SIZE)
            .map(|i| self.sample(i as f32 / (LUT_SIZE - 1) as f32))
            .collect();
    }

    /// Color at a normalized vertical position via the lookup table.
    pub fn color_at_norm(&self, t: f32) -> Color {
        let t = if t.is_finite() { t.clamp(0.0, 1.0) } else { 0.0 };
        let idx = (t * (LUT_SIZE - 1) as f32).round() as usize;
        self.lut[idx.min(LUT_SIZE - 1)]
    }

    /// Color for a pixel `y` on a canvas of the given height.
    pub fn color_at(&self, y: f32, canvas_height: f32) -> Color {
        if canvas_height <= 0.0 {
            return self.lut[0];
        }
        self.color_at_norm(y / canvas_height)
    }
}

impl Default for Gradient {
    fn default() -> Self {
        Self::new(GradientConfig::default())
    }
}
