pub mod console_display;
pub mod coordinator;
pub mod dsp;
pub mod engine;
pub mod gradient;
pub mod layout;
pub mod particle;
pub mod render;
pub mod simulator;
pub mod spectrum;
pub mod timeline;
pub mod types;

#[cfg(feature = "audio")]
pub mod audio_input;

#[cfg(feature = "midi")]
pub mod midi_input;
