//! Shared DSP primitives: windowing, dB conversion, pitch math, and test
//! signal generators.

/// Floor added before every log10 to avoid -inf on silent bins.
pub const DB_EPSILON: f32 = 1e-12;

/// Hann window coefficients for a block of `n` samples.
pub fn hann_window(n: usize) -> Vec<f32> {
    if n <= 1 {
        return vec![1.0; n];
    }
    let denom = (n - 1) as f32;
    (0..n)
        .map(|i| {
            let x = std::f32::consts::PI * i as f32 / denom;
            x.sin() * x.sin()
        })
        .collect()
}

/// Linear magnitude → dBFS.
pub fn amplitude_to_db(m: f32) -> f32 {
    20.0 * (m + DB_EPSILON).log10()
}

/// dBFS → linear magnitude.
pub fn db_to_amplitude(db: f32) -> f32 {
    10f32.powf(db / 20.0)
}

/// Equal-tempered pitch for a (possibly fractional) MIDI note number.
pub fn midi_to_hz(note: f64) -> f64 {
    440.0 * 2f64.powf((note - 69.0) / 12.0)
}


#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_hann_window_shape() {
        let w = hann_window(1024);
        assert_eq!(w.len(), 1024);
        // Endpoints at zero, peak of 1.0 in the middle
        assert_abs_diff_eq!(w[0], 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(w[1023], 0.0, epsilon = 1e-6);
        let max = w.iter().cloned().fold(0.0f32, f32::max);
        assert_abs_diff_eq!(max, 1.0, epsilon = 1e-4);
        // Hann mean is 0.5
        let mean: f32 = w.iter().sum::<f32>() / w.len() as f32;
        assert_abs_diff_eq!(mean, 0.5, epsilon = 1e-2);
    }

    #[test]
    fn test_db_round_trip() {
        for &m in &[1.0f32, 0.5, 0.1, 0.001] {
            let db = amplitude_to_db(m);
            assert_abs_diff_eq!(db_to_amplitude(db), m, epsilon = 1e-4);
        }
        // Silence maps to a deep but finite floor
        assert!(amplitude_to_db(0.0).is_finite());
    }

    #[test]
    fn test_midi_to_hz() {
        assert_abs_diff_eq!(midi_to_hz(69.0), 440.0, epsilon = 1e-9);
        assert_abs_diff_eq!(midi_to_hz(57.0), 220.0, epsilon = 1e-9);
        assert_abs_diff_eq!(midi_to_hz(60.0), 261.6256, epsilon = 1e-3);
    }
}
