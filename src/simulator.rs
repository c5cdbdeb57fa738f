use crate::dsp::midi_to_hz;
use crate::types::{AudioChunk, InputEvent, NoteEvent, SessionClock};
use crossbeam_channel::Sender;
use log::info;
use std::thread;
use std::time::Duration;

/// Generates a scripted piano performance with matching synthetic audio,
/// exercising the full visualization pipeline without a keyboard or mic.
pub struct Simulator {
    clock: SessionClock,
    tx: Sender<InputEvent>,
    sample_rate: u32,
    tick_rate_hz: u32,
    /// Monotonic sample counter for phase-continuous audio generation.
    /// Uses sample count instead of wall-clock time to avoid phase
    /// discontinuities from OS scheduling jitter.
    sample_counter: u64,
    /// Currently held (note, velocity) pairs, mirrored into the audio
    held: Vec<(u8, u8)>,
}

impl Simulator {
    pub fn new(clock: SessionClock, tx: Sender<InputEvent>, tick_rate_hz: u32) -> Self {
        Self {
            clock,
            tx,
            sample_rate: 44_100,
            tick_rate_hz,
            sample_counter: 0,
            held: Vec::new(),
        }
    }

    /// Run the demo performance in a loop. Blocks the calling thread.
    pub fn run(&mut self) {
        info!("Simulator starting demo performance...");
        let tick_us = 1_000_000 / self.tick_rate_hz as u64;

        loop {
            for gesture in demo_sequence() {
                self.execute(&gesture, tick_us);
            }
            self.release_all();
            info!("Demo performance complete, looping");
        }
    }

    fn execute(&mut self, gesture: &Gesture, tick_us: u64) {
        match gesture {
            Gesture::Hold { ms } => {
                let ticks = (*ms as u64 * 1000) / tick_us;
                for _ in 0..ticks {
                    self.emit_tick(tick_us);
                }
            }

            Gesture::Press { note, velocity } => {
                self.press(*note, *velocity);
            }

            Gesture::Release { note } => {
                self.release(*note);
            }

            Gesture::Chord { notes, velocity } => {
                info!("  chord {:?} vel={}", notes, velocity);
                for &n in notes {
                    self.press(n, *velocity);
                }
            }

            Gesture::Arpeggio {
                notes,
                velocity,
                step_ms,
            } => {
                info!("  arpeggio {:?} step={}ms", notes, step_ms);
                let ticks = (*step_ms as u64 * 1000) / tick_us;
                for &n in notes {
                    self.press(n, *velocity);
                    for _ in 0..ticks {
                        self.emit_tick(tick_us);
                    }
                    self.release(n);
                }
            }

            Gesture::ReleaseAll => {
                self.release_all();
            }
        }
    }

    fn press(&mut self, note: u8, velocity: u8) {
        self.held.retain(|&(n, _)| n != note);
        self.held.push((note, velocity));
        let _ = self.tx.send(InputEvent::Note(NoteEvent::On { note, velocity }));
    }

    fn release(&mut self, note: u8) {
        self.held.retain(|&(n, _)| n != note);
        let _ = self.tx.send(InputEvent::Note(NoteEvent::Off { note }));
    }

    fn release_all(&mut self) {
        for (note, _) in std::mem::take(&mut self.held) {
            let _ = self.tx.send(InputEvent::Note(NoteEvent::Off { note }));
        }
    }

    /// Emit one tick's worth of synthetic audio, then sleep the tick.
    fn emit_tick(&mut self, tick_us: u64) {
        if !self.held.is_empty() {
            let chunk = self.generate_audio();
            let _ = self.tx.send(InputEvent::Audio(chunk));
        }
        thread::sleep(Duration::from_micros(tick_us));
    }

    /// One tick of sine waves at the held notes' pitches, amplitude scaled
    /// by velocity. Uses sample_counter for phase continuity across chunks.
    fn generate_audio(&mut self) -> AudioChunk {
        let samples_per_tick = (self.sample_rate / self.tick_rate_hz) as usize;
        let mut samples = vec![0.0f32; samples_per_tick];

        let amp_per_voice = 0.6 / self.held.len() as f32;
        for &(note, velocity) in &self.held {
            let freq = midi_to_hz(note as f64);
            let amp = amp_per_voice * velocity as f32 / 127.0;
            for (j, sample) in samples.iter_mut().enumerate() {
                let t = (self.sample_counter + j as u64) as f64 / self.sample_rate as f64;
                *sample += amp * (2.0 * std::f64::consts::PI * freq * t).sin() as f32;
            }
        }
        self.sample_counter += samples_per_tick as u64;

        AudioChunk {
            timestamp_us: self.clock.now_us(),
            samples,
            sample_rate: self.sample_rate,
        }
    }
}

// ─── Gesture types ──────────────────────────────────────────────────────────

enum Gesture {
    Hold { ms: u32 },
    Press { note: u8, velocity: u8 },
    Release { note: u8 },
    Chord { notes: Vec<u8>, velocity: u8 },
    Arpeggio { notes: Vec<u8>, velocity: u8, step_ms: u32 },
    ReleaseAll,
}

/// Roughly 15 seconds of playing: chords, an arpeggiated run up the
/// keyboard, sustained bass under melody, and a quiet ending.
fn demo_sequence() -> Vec<Gesture> {
    vec![
        Gesture::Hold { ms: 300 },
        // C major chord, medium touch
        Gesture::Chord {
            notes: vec![48, 60, 64, 67],
            velocity: 80,
        },
        Gesture::Hold { ms: 1200 },
        Gesture::ReleaseAll,
        Gesture::Hold { ms: 200 },
        // A minor
        Gesture::Chord {
            notes: vec![45, 57, 60, 64],
            velocity: 70,
        },
        Gesture::Hold { ms: 1200 },
        Gesture::ReleaseAll,
        Gesture::Hold { ms: 200 },
        // Arpeggiated run up two octaves of C major
        Gesture::Arpeggio {
            notes: vec![60, 64, 67, 72, 76, 79, 84],
            velocity: 95,
            step_ms: 180,
        },
        Gesture::Hold { ms: 300 },
        // Sustained bass octave under a short melody
        Gesture::Chord {
            notes: vec![36, 43],
            velocity: 110,
        },
        Gesture::Arpeggio {
            notes: vec![72, 71, 67, 64],
            velocity: 85,
            step_ms: 350,
        },
        Gesture::Hold { ms: 800 },
        Gesture::ReleaseAll,
        Gesture::Hold { ms: 300 },
        // Fortissimo low cluster for a particle burst
        Gesture::Chord {
            notes: vec![24, 28, 31, 36],
            velocity: 127,
        },
        Gesture::Hold { ms: 900 },
        Gesture::ReleaseAll,
        // Quiet single-note ending
        Gesture::Press {
            note: 60,
            velocity: 25,
        },
        Gesture::Hold { ms: 1500 },
        Gesture::Release { note: 60 },
        Gesture::Hold { ms: 700 },
    ]
}
