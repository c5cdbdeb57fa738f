//! End-to-end integration tests for the visualization pipeline.
//!
//! These tests exercise the full data flow:
//!   events → InputEvent channel → Coordinator → DisplayFrame channel → assertions
//! plus direct engine scenarios covering the host-facing API: audio analysis,
//! note lifecycle, particles, transport, and the render passes.

use crossbeam_channel::bounded;
use std::thread;
use std::time::Duration;

use notefall::coordinator::Coordinator;
use notefall::dsp::midi_to_hz;
use notefall::engine::VisualizerEngine;
use notefall::render::{DrawCmd, RecordingCanvas};
use notefall::types::*;

// ─── Helpers ───────────────────────────────────────────────────────────────

/// Generate a sine wave at the given frequency.
fn sine(freq: f64, sr: u32, duration_ms: u32) -> Vec<f32> {
    let n = (sr as u64 * duration_ms as u64 / 1000) as usize;
    (0..n)
        .map(|i| (0.7 * (2.0 * std::f64::consts::PI * freq * i as f64 / sr as f64).sin()) as f32)
        .collect()
}

fn audio_event(samples: Vec<f32>) -> InputEvent {
    InputEvent::Audio(AudioChunk {
        timestamp_us: 0,
        samples,
        sample_rate: 44_100,
    })
}

/// Run a coordinator in a background thread, feed it events, let it tick
/// for `settle_ms`, then close the input and collect the emitted frames.
fn run_pipeline(events: Vec<InputEvent>, settle_ms: u64) -> Vec<DisplayFrame> {
    let (input_tx, input_rx) = bounded::<InputEvent>(4096);
    let (frame_tx, frame_rx) = bounded::<DisplayFrame>(4096);

    let coord_handle = thread::Builder::new()
        .name("test-coordinator".into())
        .spawn(move || {
            Coordinator::new(input_rx, vec![frame_tx]).run();
        })
        .unwrap();

    for event in events {
        input_tx.send(event).unwrap();
    }
    thread::sleep(Duration::from_millis(settle_ms));
    drop(input_tx);

    let mut frames = Vec::new();
    while let Ok(f) = frame_rx.recv_timeout(Duration::from_millis(500)) {
        frames.push(f);
    }

    let _ = coord_handle.join();
    frames
}

// ─── Pipeline tests ────────────────────────────────────────────────────────

#[test]
fn test_pipeline_note_lifecycle() {
    let events = vec![
        InputEvent::Note(NoteEvent::On {
            note: 60,
            velocity: 100,
        }),
        InputEvent::Note(NoteEvent::On {
            note: 64,
            velocity: 90,
        }),
    ];
    let frames = run_pipeline(events, 120);
    assert!(!frames.is_empty(), "ticker should emit frames");

    let last = frames.last().unwrap();
    assert_eq!(last.active_notes, 2);
    assert!(last.playing);
    assert!(
        last.live_particles > 0,
        "held notes should be emitting particles"
    );
}

#[test]
fn test_pipeline_audio_lights_spectrum() {
    // 300ms of A4 fills the 4096-sample analysis window several times over
    let events: Vec<InputEvent> = sine(440.0, 44_100, 300)
        .chunks(1024)
        .map(|c| audio_event(c.to_vec()))
        .collect();
    let frames = run_pipeline(events, 120);

    let last = frames.last().unwrap();
    assert_eq!(last.bars.len(), 64);
    assert!(
        last.bars.iter().any(|&b| b > 0.0),
        "sine should light at least one band"
    );
    assert!(last
        .bars
        .iter()
        .chain(last.peaks.iter())
        .all(|&v| (0.0..=1.0).contains(&v)));
}

#[test]
fn test_pipeline_shuts_down_cleanly() {
    let frames = run_pipeline(Vec::new(), 60);
    // Even with no input the ticker produces frames until shutdown
    assert!(!frames.is_empty());
    assert!(frames.iter().all(|f| f.active_notes == 0));
}

// ─── Engine scenarios ──────────────────────────────────────────────────────

#[test]
fn test_engine_full_performance_scenario() {
    let mut e = VisualizerEngine::new();

    // Audio arrives and the spectrum lights up
    for block in sine(midi_to_hz(69.0), 44_100, 300).chunks(1024) {
        e.push_audio(AudioChunk {
            timestamp_us: 0,
            samples: block.to_vec(),
            sample_rate: 44_100,
        });
    }
    assert!(e.spectrum_bars().iter().any(|&b| b > 0.0));

    // A chord is held; ticks spawn particles
    e.note_on_at(60, 100, 0.0);
    e.note_on_at(64, 95, 0.0);
    e.note_on_at(67, 90, 0.0);
    e.tick_at(0.0);
    e.tick_at(0.1);
    assert_eq!(e.active_notes(), 3);
    let particles_before_pause = e.live_particles();
    assert!(particles_before_pause > 0);

    // Pause freezes everything
    e.pause();
    for i in 0..50 {
        e.tick_at(0.2 + i as f64 * 0.016);
    }
    assert!(!e.is_playing());
    assert_eq!(e.live_particles(), particles_before_pause);

    // Resume, release the chord, and the notes archive
    e.play();
    e.note_off_at(60, 2.0);
    e.note_off_at(64, 2.0);
    e.note_off_at(67, 2.0);
    let f = e.frame();
    assert_eq!(f.active_notes, 0);
    assert_eq!(f.archived_notes, 3);

    // Rendering the scene produces draw commands for the archived bars
    let mut canvas = RecordingCanvas::new();
    e.render_at(&mut canvas, 2.1, 800.0, 400.0);
    let bars = canvas
        .commands
        .iter()
        .filter(|c| matches!(c, DrawCmd::VerticalGradient(..)))
        .count();
    assert_eq!(bars, 3, "three archived note bars drawn");
}

#[test]
fn test_engine_particle_bound_under_sustained_load() {
    let mut e = VisualizerEngine::new();
    // A full two-octave cluster held for many spawn cycles
    for note in 48..72 {
        e.note_on_at(note, 127, 0.0);
    }
    for i in 0..600 {
        e.tick_at(i as f64 * 0.016);
    }
    let cfg = e.particle_config();
    let bound = cfg.max_particles + cfg.max_spark_particles;
    assert!(
        e.live_particles() <= bound,
        "{} particles exceeds pool bound {}",
        e.live_particles(),
        bound
    );
    assert!(e.live_particles() > 0);
}

#[test]
fn test_engine_config_surface() {
    let mut e = VisualizerEngine::new();

    // Particle updates apply partially and survive bad keys
    let applied = e.update_particle_config(&serde_json::json!({
        "damping_factor": 0.99,
        "nonsense": true
    }));
    assert_eq!(applied, 1);
    assert_eq!(e.particle_config().damping_factor, 0.99);

    // Gradient preset switch then explicit stops
    assert!(e.update_gradient_config(&serde_json::json!({"preset": "rainbow"})));
    assert_eq!(e.gradient_config().colors.len(), 5);
    assert!(e.set_gradient_colors(
        &[(10, 20, 30), (200, 210, 220)],
        Some(&[0.0, 1.0])
    ));
    assert_eq!(e.gradient_config().positions, vec![0.0, 1.0]);

    // Scroll speed clamps to the supported range
    e.set_scroll_speed(10_000.0);
    let mut canvas = RecordingCanvas::new();
    e.note_on_at(60, 100, 0.0);
    e.render_at(&mut canvas, 0.1, 800.0, 400.0);
    // 0.1s at the 500px/s cap cannot exceed 50px
    let bar = canvas.commands.iter().find_map(|c| match c {
        DrawCmd::VerticalGradient(r, _, _) => Some(*r),
        _ => None,
    });
    assert!(bar.unwrap().h <= 51.0);
}

#[test]
fn test_engine_spectrum_decays_after_silence() {
    let mut e = VisualizerEngine::new();
    for block in sine(440.0, 44_100, 300).chunks(1024) {
        e.push_audio(AudioChunk {
            timestamp_us: 0,
            samples: block.to_vec(),
            sample_rate: 44_100,
        });
    }
    let lit: f32 = e.spectrum_bars().iter().cloned().fold(0.0, f32::max);
    assert!(lit > 0.0);

    for _ in 0..150 {
        e.push_audio(AudioChunk {
            timestamp_us: 0,
            samples: vec![0.0; 4096],
            sample_rate: 44_100,
        });
    }
    let after: f32 = e.spectrum_bars().iter().cloned().fold(0.0, f32::max);
    assert!(after < lit * 0.01, "spectrum should decay: {} -> {}", lit, after);
}

#[test]
fn test_engine_spectrum_render_pass() {
    let mut e = VisualizerEngine::new();
    for block in sine(440.0, 44_100, 300).chunks(1024) {
        e.push_audio(AudioChunk {
            timestamp_us: 0,
            samples: block.to_vec(),
            sample_rate: 44_100,
        });
    }
    let mut canvas = RecordingCanvas::new();
    e.render_spectrum(&mut canvas, 640.0, 200.0);
    assert!(canvas
        .commands
        .iter()
        .any(|c| matches!(c, DrawCmd::VerticalGradient(..))));
}
