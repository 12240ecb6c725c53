//! Audio device abstractions and domain models
//!
//! This module defines the core audio interfaces that are platform-agnostic.
//! Implementations for specific platforms (WASAPI, ALSA, CoreAudio) live in
//! the `infra` crate.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur in the audio subsystem
#[derive(Debug, Error)]
pub enum AudioError {
    /// Selected device is no longer present; callers fall back to the
    /// system default instead of failing start
    #[error("device unavailable: {0}")]
    DeviceUnavailable(String),

    /// Native stream construction failed; start() fails and the session
    /// returns to Idle
    #[error("stream setup failed: {0}")]
    StreamSetup(String),

    /// Equalizer or noise suppressor could not attach; processing
    /// continues without that stage
    #[error("effect unavailable: {0}")]
    EffectUnavailable(String),

    /// The platform refused audio capture
    #[error("permission denied: {0}")]
    PermissionDenied(String),
}

pub type Result<T> = std::result::Result<T, AudioError>;

/// Sample rate of the mono processing path
pub const SAMPLE_RATE: u32 = 44_100;

/// Channel count of the processing path (devices with other layouts are
/// mediated at the stream boundary)
pub const CHANNEL_COUNT: u16 = 1;

/// Unique identifier for an audio device
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(id: String) -> Self {
        Self(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Direction a device operates in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceDirection {
    Input,
    Output,
}

/// Capability classification of an audio device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceClass {
    BuiltinMic,
    BuiltinSpeaker,
    WiredHeadset,
    Usb,
    BluetoothSco,
    BluetoothA2dp,
    Other,
}

impl DeviceClass {
    /// Whether this classification is relevant for speech capture or
    /// playback in the given direction
    pub fn relevant_for(&self, direction: DeviceDirection) -> bool {
        match direction {
            DeviceDirection::Input => matches!(
                self,
                DeviceClass::BuiltinMic
                    | DeviceClass::WiredHeadset
                    | DeviceClass::Usb
                    | DeviceClass::BluetoothSco
            ),
            DeviceDirection::Output => matches!(
                self,
                DeviceClass::BuiltinSpeaker
                    | DeviceClass::WiredHeadset
                    | DeviceClass::Usb
                    | DeviceClass::BluetoothA2dp
            ),
        }
    }
}

/// Immutable snapshot of a device from the platform registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    pub id: DeviceId,
    pub display_name: String,
    pub direction: DeviceDirection,
    pub class: DeviceClass,
}

/// Supported audio sample formats
///
/// The pipeline processes f32; I16 marks the 16-bit software-capture
/// fallback shape mediated at the device boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SampleFormat {
    F32,
    I16,
}

/// Configuration for the capture/render stream pair
///
/// Owned exclusively by the stream session and rebuilt on every device
/// change or restart. `None` for a device means "follow system default".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    pub sample_rate: u32,
    pub channels: u16,
    pub format: SampleFormat,
    pub input_device: Option<DeviceDescriptor>,
    pub output_device: Option<DeviceDescriptor>,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            sample_rate: SAMPLE_RATE,
            channels: CHANNEL_COUNT,
            format: SampleFormat::F32,
            input_device: None,
            output_device: None,
        }
    }
}

/// Trait for enumerating available audio devices
///
/// Implementations query the platform registry on every call so results
/// reflect hot-plug changes; an empty list is the only failure mode.
pub trait DeviceCatalog: Send + Sync {
    /// List input devices relevant to speech capture
    fn list_input_devices(&self) -> Vec<DeviceDescriptor>;

    /// List output devices relevant to speech playback
    fn list_output_devices(&self) -> Vec<DeviceDescriptor>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_id() {
        let id = DeviceId::new("test-device".to_string());
        assert_eq!(id.as_str(), "test-device");
    }

    #[test]
    fn test_stream_config_default() {
        let config = StreamConfig::default();
        assert_eq!(config.sample_rate, 44_100);
        assert_eq!(config.channels, 1);
        assert_eq!(config.format, SampleFormat::F32);
        assert!(config.input_device.is_none());
        assert!(config.output_device.is_none());
    }

    #[test]
    fn test_class_relevance_per_direction() {
        use DeviceDirection::{Input, Output};

        assert!(DeviceClass::BuiltinMic.relevant_for(Input));
        assert!(!DeviceClass::BuiltinMic.relevant_for(Output));
        assert!(DeviceClass::BuiltinSpeaker.relevant_for(Output));
        assert!(!DeviceClass::BuiltinSpeaker.relevant_for(Input));

        // Wired and USB work both ways, Bluetooth profiles are one-way
        assert!(DeviceClass::WiredHeadset.relevant_for(Input));
        assert!(DeviceClass::WiredHeadset.relevant_for(Output));
        assert!(DeviceClass::Usb.relevant_for(Input));
        assert!(DeviceClass::Usb.relevant_for(Output));
        assert!(DeviceClass::BluetoothSco.relevant_for(Input));
        assert!(!DeviceClass::BluetoothSco.relevant_for(Output));
        assert!(DeviceClass::BluetoothA2dp.relevant_for(Output));
        assert!(!DeviceClass::BluetoothA2dp.relevant_for(Input));

        assert!(!DeviceClass::Other.relevant_for(Input));
        assert!(!DeviceClass::Other.relevant_for(Output));
    }
}
