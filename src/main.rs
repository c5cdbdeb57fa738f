use notefall::console_display;
use notefall::coordinator;
use notefall::simulator;
use notefall::types::*;

#[cfg(feature = "audio")]
use notefall::audio_input;
#[cfg(feature = "midi")]
use notefall::midi_input;

use clap::Parser;
use crossbeam_channel::bounded;
use log::info;
use std::thread;

#[derive(Parser)]
#[command(name = "notefall")]
#[command(about = "Real-time MIDI and audio visualization engine")]
struct Cli {
    /// Run in simulator mode (no keyboard or microphone required)
    #[arg(long, default_value_t = true)]
    simulate: bool,

    /// Simulator event rate (Hz)
    #[arg(long, default_value_t = 60)]
    sim_rate: u32,

    /// Enable console display (terminal dashboard)
    #[arg(long)]
    console: bool,

    /// Console display refresh rate (Hz)
    #[arg(long, default_value_t = 20)]
    display_hz: u32,

    /// Capture live audio from the default input device
    #[arg(long)]
    audio: bool,

    /// Connect to a MIDI input port (substring match, empty = first port)
    #[arg(long)]
    midi: bool,

    /// MIDI port name filter
    #[arg(long, default_value = "")]
    midi_port: String,

    /// Delay applied to incoming MIDI events (ms), for hosts whose audio
    /// path lags the keyboard
    #[arg(long, default_value_t = 0)]
    midi_delay: u64,

    /// List MIDI input ports and exit
    #[arg(long)]
    list_midi: bool,

    /// Load engine configuration from a JSON file with optional
    /// "particle", "gradient", and "visual" sections
    #[arg(long)]
    config: Option<std::path::PathBuf>,
}

/// Read and apply a JSON config file. Unknown keys inside each section
/// warn and are skipped; a missing or unparsable file is an error.
fn load_config(
    engine: &mut notefall::engine::VisualizerEngine,
    path: &std::path::Path,
) -> Result<(), String> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("cannot read {}: {e}", path.display()))?;
    let value: serde_json::Value =
        serde_json::from_str(&text).map_err(|e| format!("bad JSON in {}: {e}", path.display()))?;

    if let Some(particle) = value.get("particle") {
        engine.update_particle_config(particle);
    }
    if let Some(gradient) = value.get("gradient") {
        engine.update_gradient_config(gradient);
    }
    if let Some(visual) = value.get("visual") {
        engine.update_visual_config(visual);
    }
    info!("Loaded config from {}", path.display());
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();
    let clock = SessionClock::new();

    if cli.list_midi {
        list_midi_ports();
        return;
    }

    let live_input = cli.audio || cli.midi;
    let simulate = cli.simulate && !live_input;

    info!("═══════════════════════════════════════════════");
    info!("  NOTEFALL v{}", env!("CARGO_PKG_VERSION"));
    info!("  Mode: {}", if simulate { "SIMULATOR" } else { "LIVE" });
    if cli.console {
        info!("  UI: Console dashboard");
    }
    info!("═══════════════════════════════════════════════");

    // Channel: inputs → coordinator
    let (input_tx, input_rx) = bounded::<InputEvent>(4096);

    // Channels: coordinator → consumers
    let mut frame_txs: Vec<crossbeam_channel::Sender<DisplayFrame>> = Vec::new();

    let mut handles = Vec::new();

    // ─── Console display ────────────────────────────────────────────
    if cli.console {
        let (tx, rx) = bounded::<DisplayFrame>(256);
        frame_txs.push(tx);
        let hz = cli.display_hz;
        handles.push(
            thread::Builder::new()
                .name("display".into())
                .spawn(move || {
                    console_display::ConsoleDisplay::new(rx, hz).run();
                })
                .unwrap(),
        );
    }

    // ─── Coordinator ────────────────────────────────────────────────
    let config_path = cli.config.clone();
    handles.push(
        thread::Builder::new()
            .name("coordinator".into())
            .spawn(move || {
                let mut coord = coordinator::Coordinator::new(input_rx, frame_txs);
                if let Some(path) = config_path {
                    if let Err(e) = load_config(coord.engine_mut(), &path) {
                        log::error!("{}", e);
                    }
                }
                coord.run();
            })
            .unwrap(),
    );

    // ─── Input sources ──────────────────────────────────────────────
    // Captures must outlive the session; dropping them stops the stream.
    #[cfg(feature = "audio")]
    let mut _audio_capture = None;
    #[cfg(feature = "midi")]
    let mut _midi_capture = None;

    if simulate {
        info!("Starting simulator...");
        let sim_clock = clock.clone();
        let sim_tx = input_tx.clone();
        let rate = cli.sim_rate;
        handles.push(
            thread::Builder::new()
                .name("simulator".into())
                .spawn(move || {
                    simulator::Simulator::new(sim_clock, sim_tx, rate).run();
                })
                .unwrap(),
        );
    } else {
        if cli.audio {
            #[cfg(feature = "audio")]
            match audio_input::AudioCapture::start(input_tx.clone(), clock.clone()) {
                Ok(capture) => _audio_capture = Some(capture),
                Err(e) => log::error!("Audio capture failed: {}", e),
            }
            #[cfg(not(feature = "audio"))]
            log::error!("--audio requires the 'audio' feature");
        }
        if cli.midi {
            #[cfg(feature = "midi")]
            match midi_input::MidiCapture::start(input_tx.clone(), &cli.midi_port, cli.midi_delay)
            {
                Ok(capture) => _midi_capture = Some(capture),
                Err(e) => log::error!("MIDI capture failed: {}", e),
            }
            #[cfg(not(feature = "midi"))]
            log::error!("--midi requires the 'midi' feature");
        }
    }

    info!("Running. Press Ctrl+C to stop.");
    for h in handles {
        let _ = h.join();
    }
}

fn list_midi_ports() {
    #[cfg(feature = "midi")]
    match midi_input::MidiCapture::list_ports() {
        Ok(ports) if ports.is_empty() => println!("No MIDI input ports found."),
        Ok(ports) => {
            println!("MIDI input ports:");
            for (i, name) in ports.iter().enumerate() {
                println!("  {}: {}", i, name);
            }
        }
        Err(e) => eprintln!("Failed to enumerate MIDI ports: {}", e),
    }
    #[cfg(not(feature = "midi"))]
    eprintln!("--list-midi requires the 'midi' feature");
}
