//! Domain entities and business rules

pub mod audio;
pub mod chain;
pub mod gain;
pub mod settings;
pub mod waveform;

// Re-export specific items to avoid ambiguous glob imports
pub use audio::{
    AudioError, DeviceCatalog, DeviceClass, DeviceDescriptor, DeviceDirection, DeviceId, Result,
    SampleFormat, StreamConfig, CHANNEL_COUNT, SAMPLE_RATE,
};
pub use chain::{EqualizerBank, NoiseSuppressor, SignalChain, FULL_SCALE};
pub use gain::{EqPreset, GainSnapshot, GainState, BAND_COUNT, MAX_AMPLIFICATION, MIN_AMPLIFICATION};
pub use settings::{GainSettings, SettingsError};
pub use waveform::{WaveFrame, WaveformBuffer, FRAME_SLOTS, HISTORY_FRAMES};
