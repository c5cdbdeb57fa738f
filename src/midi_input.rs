use crossbeam_channel::{Receiver, Sender};
use log::{info, warn};
use midir::{MidiInput, MidiInputConnection};
use std::thread;
use std::time::{Duration, Instant};

use crate::types::{InputEvent, NoteEvent};

/// Live MIDI capture via midir.
///
/// Holds the connection alive; drop to disconnect. Note-on with velocity 0
/// is treated as note-off per the MIDI spec. An optional fixed delay shifts
/// events later, compensating hosts whose audio path lags the keyboard.
pub struct MidiCapture {
    _connection: MidiInputConnection<()>,
}

impl MidiCapture {
    /// List available input port names.
    pub fn list_ports() -> Result<Vec<String>, String> {
        let midi_in = MidiInput::new("notefall").map_err(|e| e.to_string())?;
        Ok(midi_in
            .ports()
            .iter()
            .map(|p| {
                midi_in
                    .port_name(p)
                    .unwrap_or_else(|_| "unknown".to_string())
            })
            .collect())
    }

    /// Connect to the first port whose name contains `port_match` (or the
    /// first port when empty) and start forwarding note events.
    pub fn start(tx: Sender<InputEvent>, port_match: &str, delay_ms: u64) -> Result<Self, String> {
        let midi_in = MidiInput::new("notefall").map_err(|e| e.to_string())?;
        let ports = midi_in.ports();
        if ports.is_empty() {
            return Err("No MIDI input ports found".to_string());
        }

        let port = ports
            .iter()
            .find(|p| {
                port_match.is_empty()
                    || midi_in
                        .port_name(p)
                        .map(|n| n.contains(port_match))
                        .unwrap_or(false)
            })
            .ok_or_else(|| format!("No MIDI port matching '{port_match}'"))?;

        let name = midi_in
            .port_name(port)
            .unwrap_or_else(|_| "unknown".to_string());
        info!("MIDI input: {} (delay {}ms)", name, delay_ms);

        // Delay worker: each event carries its own release deadline, stamped
        // at arrival, so simultaneous events stay simultaneous instead of
        // queuing behind one another. Zero delay forwards directly.
        let forward_tx = if delay_ms > 0 {
            let (delay_tx, delay_rx) = crossbeam_channel::unbounded::<(Instant, NoteEvent)>();
            let out = tx.clone();
            thread::Builder::new()
                .name("midi-delay".into())
                .spawn(move || run_delay_worker(delay_rx, out))
                .map_err(|e| e.to_string())?;
            DelayPath::Delayed(delay_tx, Duration::from_millis(delay_ms))
        } else {
            DelayPath::Direct(tx)
        };

        let connection = midi_in
            .connect(
                port,
                "notefall-in",
                move |_timestamp, message, _| {
                    if let Some(event) = parse_note_event(message) {
                        forward_tx.send(event);
                    }
                },
                (),
            )
            .map_err(|e| e.to_string())?;

        Ok(Self {
            _connection: connection,
        })
    }
}

enum DelayPath {
    Direct(Sender<InputEvent>),
    Delayed(Sender<(Instant, NoteEvent)>, Duration),
}

impl DelayPath {
    fn send(&self, event: NoteEvent) {
        let dropped = match self {
            DelayPath::Direct(tx) => tx.send(InputEvent::Note(event)).is_err(),
            DelayPath::Delayed(tx, delay) => tx.send((Instant::now() + *delay, event)).is_err(),
        };
        if dropped {
            warn!("MIDI event dropped: downstream closed");
        }
    }
}

/// Forward each event once its deadline passes. Deadlines arrive in FIFO
/// order, so sleeping to each in turn preserves relative timing: a chord
/// stamped with one deadline is released together.
fn run_delay_worker(rx: Receiver<(Instant, NoteEvent)>, out: Sender<InputEvent>) {
    for (deadline, event) in rx {
        let now = Instant::now();
        if deadline > now {
            thread::sleep(deadline - now);
        }
        if out.send(InputEvent::Note(event)).is_err() {
            return;
        }
    }
}

/// Decode a raw MIDI message into a note event. Channel is ignored;
/// non-note messages return None.
fn parse_note_event(message: &[u8]) -> Option<NoteEvent> {
    if message.len() < 3 {
        return None;
    }
    let status = message[0] & 0xF0;
    let note = message[1] & 0x7F;
    let velocity = message[2] & 0x7F;
    match status {
        0x90 if velocity > 0 => Some(NoteEvent::On { note, velocity }),
        0x90 | 0x80 => Some(NoteEvent::Off { note }),
        _ => None,
    }
}
