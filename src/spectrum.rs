//! Real-time spectrum analysis: FFT → logarithmic frequency banding →
//! smoothing and peak-hold.
//!
//! Samples accumulate in a ring buffer of `fft_size`; once full, every new
//! chunk triggers a full analysis pass over the most recent window. The
//! output is `num_bars` normalized band values in [0,1] plus decaying
//! peak-hold values, read by the renderer each frame.

use log::debug;
use num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::collections::VecDeque;
use std::sync::Arc;

use crate::dsp::{amplitude_to_db, db_to_amplitude, hann_window, DB_EPSILON};
use crate::types::AudioChunk;

pub const DEFAULT_FFT_SIZE: usize = 4096;
pub const DEFAULT_NUM_BARS: usize = 64;

/// Analyzed frequency span in Hz.
const FREQ_RANGE: (f32, f32) = (20.0, 20_000.0);
/// Exponential smoothing factor applied to new band values.
const SMOOTHING: f32 = 0.08;
/// Analysis passes a peak is held before it starts decaying.
const PEAK_HOLD_TICKS: u32 = 25;
/// Per-pass multiplicative peak decay once the hold expires.
const PEAK_DECAY: f32 = 0.92;

pub struct SpectrumAnalyzer {
    sample_rate: u32,
    fft_size: usize,
    num_bars: usize,

    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    /// sum(window) / fft_size, used for amplitude normalization
    window_correction: f32,

    /// Rolling mono sample buffer, capped at `fft_size`
    buffer: VecDeque<f32>,
    /// Per-band (low_bin, high_bin) ranges into the magnitude spectrum
    band_bins: Vec<(usize, usize)>,

    spectrum: Vec<f32>,
    peaks: Vec<f32>,
    hold_counters: Vec<u32>,

    // Scratch space reused across passes
    fft_buf: Vec<Complex<f32>>,
    fft_scratch: Vec<Complex<f32>>,
    magnitude_db: Vec<f32>,
}

impl SpectrumAnalyzer {
    pub fn new(sample_rate: u32) -> Self {
        Self::with_size(sample_rate, DEFAULT_FFT_SIZE, DEFAULT_NUM_BARS)
    }

    pub fn with_size(sample_rate: u32, fft_size: usize, num_bars: usize) -> Self {
        let fft = FftPlanner::<f32>::new().plan_fft_forward(fft_size);
        let scratch_len = fft.get_inplace_scratch_len();
        let window = hann_window(fft_size);
        let window_correction = window.iter().sum::<f32>() / fft_size as f32;

        let mut analyzer = Self {
            sample_rate,
            fft_size,
            num_bars,
            fft,
            window,
            window_correction,
            buffer: VecDeque::with_capacity(fft_size),
            band_bins: Vec::new(),
            spectrum: vec![0.0; num_bars],
            peaks: vec![0.0; num_bars],
            hold_counters: vec![0; num_bars],
            fft_buf: vec![Complex::new(0.0, 0.0); fft_size],
            fft_scratch: vec![Complex::new(0.0, 0.0); scratch_len],
            magnitude_db: vec![0.0; fft_size / 2],
        };
        analyzer.setup_bands();
        analyzer
    }

    /// Compute per-band FFT bin ranges for a logarithmic frequency scale.
    /// Degenerate bands are forced to at least one bin; the last band always
    /// extends to Nyquist.
    fn setup_bands(&mut self) {
        let half = self.fft_size / 2;
        let bin_hz = self.sample_rate as f32 / self.fft_size as f32;
        let nyquist = (half.saturating_sub(1)) as f32 * bin_hz;

        let log_min = FREQ_RANGE.0.log10();
        let log_max = FREQ_RANGE.1.log10();
        let edge = |i: usize| -> f32 {
            10f32.powf(log_min + (log_max - log_min) * i as f32 / self.num_bars as f32)
        };

        self.band_bins.clear();
        for i in 0..self.num_bars {
            let low_freq = edge(i);
            let high_freq = edge(i + 1).min(nyquist);

            let mut low_bin = (low_freq / bin_hz).ceil() as usize;
            let mut high_bin = (high_freq / bin_hz).ceil() as usize;
            low_bin = low_bin.min(half);
            high_bin = high_bin.min(half);

            if high_bin <= low_bin {
                high_bin = (low_bin + 1).min(half);
                low_bin = high_bin.saturating_sub(1);
            }
            if i == self.num_bars - 1 {
                high_bin = half;
            }
            self.band_bins.push((low_bin, high_bin));
        }
        debug!(
            "spectrum: {} bands over {}-{} Hz, {} Hz/bin",
            self.num_bars, FREQ_RANGE.0, FREQ_RANGE.1, bin_hz
        );
    }

    pub fn num_bars(&self) -> usize {
        self.num_bars
    }

    /// Ingest a chunk of mono samples. Short chunks simply accumulate;
    /// analysis runs once the ring buffer holds a full FFT window.
    pub fn push_chunk(&mut self, chunk: &AudioChunk) {
        if chunk.sample_rate != self.sample_rate && chunk.sample_rate > 0 {
            self.sample_rate = chunk.sample_rate;
            self.setup_bands();
        }
        self.add_samples(&chunk.samples, 1);
    }

    /// Ingest interleaved samples, averaging `channels` down to mono.
    pub fn add_samples(&mut self, samples: &[f32], channels: usize) {
        if samples.is_empty() {
            return;
        }
        if channels <= 1 {
            self.buffer.extend(samples.iter().copied());
        } else {
            for frame in samples.chunks(channels) {
                let mono = frame.iter().sum::<f32>() / frame.len() as f32;
                self.buffer.push_back(mono);
            }
        }
        while self.buffer.len() > self.fft_size {
            self.buffer.pop_front();
        }
        if self.buffer.len() >= self.fft_size {
            self.process_spectrum();
        }
    }

    /// One full analysis pass over the buffered window.
    fn process_spectrum(&mut self) {
        debug_assert_eq!(self.buffer.len(), self.fft_size);

        for (i, (&s, &w)) in self.buffer.iter().zip(self.window.iter()).enumerate() {
            self.fft_buf[i] = Complex::new(s * w, 0.0);
        }
        self.fft
            .process_with_scratch(&mut self.fft_buf, &mut self.fft_scratch);

        // Magnitude of the positive-frequency half, normalized and in dBFS
        let half = self.fft_size / 2;
        let norm = self.fft_size as f32 * self.window_correction;
        for i in 0..half {
            self.magnitude_db[i] = amplitude_to_db(self.fft_buf[i].norm() / norm);
        }

        let bin_hz = self.sample_rate as f32 / self.fft_size as f32;
        for i in 0..self.num_bars {
            let (low, high) = self.band_bins[i];
            if high > half || low >= high {
                continue;
            }
            let band = &self.magnitude_db[low..high];

            // RMS over linear magnitudes weights the strong bins in the band
            let mean_sq = band
                .iter()
                .map(|&db| {
                    let m = db_to_amplitude(db);
                    m * m
                })
                .sum::<f32>()
                / band.len() as f32;
            let mut band_db = 20.0 * (mean_sq.sqrt() + DB_EPSILON).log10();

            // Gentle boost above 2 kHz so high bands stay visible
            let freq_center = ((low as f32 * bin_hz) * (high as f32 * bin_hz)).sqrt();
            if freq_center > 2000.0 {
                band_db += ((freq_center / 2000.0).log10() * 3.0).min(6.0);
            }

            // Map the -80..-20 dB range onto [0,1]
            let normalized = ((band_db + 80.0) / 60.0).clamp(0.0, 1.0);
            self.spectrum[i] = SMOOTHING * normalized + (1.0 - SMOOTHING) * self.spectrum[i];
        }

        for i in 0..self.num_bars {
            if self.spectrum[i] > self.peaks[i] {
                self.peaks[i] = self.spectrum[i];
                self.hold_counters[i] = PEAK_HOLD_TICKS;
            } else if self.hold_counters[i] > 0 {
                self.hold_counters[i] -= 1;
            } else {
                self.peaks[i] *= PEAK_DECAY;
            }
        }
    }

    /// Smoothed band values, each in [0,1].
    pub fn bars(&self) -> &[f32] {
        &self.spectrum
    }

    /// Peak-hold values, each in [0,1].
    pub fn peaks(&self) -> &[f32] {
        &self.peaks
    }

    /// Snapshot of (bars, peaks) for handing across threads.
    pub fn frame(&self) -> (Vec<f32>, Vec<f32>) {
        (self.spectrum.clone(), self.peaks.clone())
    }

    /// Reset all spectral state and drop buffered audio.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.spectrum.iter_mut().for_each(|v| *v = 0.0);
        self.peaks.iter_mut().for_each(|v| *v = 0.0);
        self.hold_counters.iter_mut().for_each(|v| *v = 0);
    }
}
