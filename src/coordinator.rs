use crate::engine::VisualizerEngine;
use crate::types::{DisplayFrame, InputEvent};
use crossbeam_channel::{select, tick, Receiver, Sender};
use log::{debug, info};
use std::time::Duration;

/// Frame period for the engine tick (~60 fps).
const TICK_INTERVAL: Duration = Duration::from_millis(16);

/// The coordinator receives InputEvents (note events and audio chunks),
/// feeds them into the visualizer engine, advances the engine on a fixed
/// tick, and fans out DisplayFrames to downstream consumers.
///
/// It owns the engine for its whole lifetime; hosts that render directly
/// (rather than consuming frames) embed [`VisualizerEngine`] themselves and
/// skip the coordinator entirely.
pub struct Coordinator {
    input_rx: Receiver<InputEvent>,
    frame_txs: Vec<Sender<DisplayFrame>>,
    engine: VisualizerEngine,
}

impl Coordinator {
    pub fn new(input_rx: Receiver<InputEvent>, frame_txs: Vec<Sender<DisplayFrame>>) -> Self {
        Self {
            input_rx,
            frame_txs,
            engine: VisualizerEngine::new(),
        }
    }

    pub fn engine_mut(&mut self) -> &mut VisualizerEngine {
        &mut self.engine
    }

    /// Run until the input channel closes. Events apply immediately; frames
    /// go out on the tick so consumers see a steady rate regardless of
    /// input burstiness.
    pub fn run(&mut self) {
        info!("Coordinator running ({}ms tick)", TICK_INTERVAL.as_millis());

        let ticker = tick(TICK_INTERVAL);
        let mut frame_count: u64 = 0;

        loop {
            select! {
                recv(self.input_rx) -> event => {
                    match event {
                        Ok(event) => self.engine.handle_event(event),
                        Err(_) => break,
                    }
                }
                recv(ticker) -> _ => {
                    self.engine.tick();
                    let frame = self.engine.frame();
                    for tx in &self.frame_txs {
                        let _ = tx.send(frame.clone());
                    }
                    frame_count += 1;
                    if frame_count % 1000 == 0 {
                        debug!(
                            "Coordinator: {} frames, {} notes active, {} particles",
                            frame_count, frame.active_notes, frame.live_particles
                        );
                    }
                }
            }
        }

        info!("Coordinator shutting down after {} frames", frame_count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NoteEvent;
    use crossbeam_channel::unbounded;

    #[test]
    fn test_coordinator_fans_out_frames() {
        let (input_tx, input_rx) = unbounded();
        let (frame_tx, frame_rx) = unbounded();
        let mut coord = Coordinator::new(input_rx, vec![frame_tx]);

        let handle = std::thread::spawn(move || coord.run());

        input_tx
            .send(InputEvent::Note(NoteEvent::On {
                note: 60,
                velocity: 100,
            }))
            .unwrap();

        // Wait for a frame that reflects the note
        let frame = frame_rx
            .iter()
            .find(|f| f.active_notes == 1)
            .expect("frame with the note arrives");
        assert!(frame.playing);

        drop(input_tx);
        handle.join().unwrap();
    }
}
