//! CPAL-based device catalog
//!
//! Enumerates and classifies the audio devices relevant to speech
//! capture and playback. The platform registry is queried on every call
//! so results reflect hot-plug changes; there is no caching layer.

use cpal::traits::{DeviceTrait, HostTrait};
use std::fmt;
use tracing::{debug, info, warn};
use clarion_core::domain::audio::{
    DeviceCatalog, DeviceClass, DeviceDescriptor, DeviceDirection, DeviceId,
};

/// Catalog backed by the default CPAL host
pub struct CpalCatalog {
    host: cpal::Host,
}

impl Default for CpalCatalog {
    fn default() -> Self {
        info!("Initializing CPAL device catalog");
        Self::new()
    }
}

impl CpalCatalog {
    pub fn new() -> Self {
        let host = cpal::default_host();
        debug!("Using audio host: {:?}", host.id());
        Self { host }
    }

    /// Classify a device by its name and default-device identity
    ///
    /// CPAL exposes no transport type, so classification is a name
    /// heuristic: transport keywords first, then the host default maps
    /// to the builtin transducer for its direction.
    fn classify(name: &str, direction: DeviceDirection, is_default: bool) -> DeviceClass {
        let lower = name.to_lowercase();

        if lower.contains("bluetooth") || lower.contains("bluez") {
            return match direction {
                DeviceDirection::Input => DeviceClass::BluetoothSco,
                DeviceDirection::Output => DeviceClass::BluetoothA2dp,
            };
        }
        if lower.contains("usb") {
            return DeviceClass::Usb;
        }
        if lower.contains("headset") || lower.contains("headphone") {
            return DeviceClass::WiredHeadset;
        }
        if is_default || lower.contains("default") || lower.contains("built-in") {
            return match direction {
                DeviceDirection::Input => DeviceClass::BuiltinMic,
                DeviceDirection::Output => DeviceClass::BuiltinSpeaker,
            };
        }

        DeviceClass::Other
    }

    fn describe(
        device: &cpal::Device,
        direction: DeviceDirection,
        default_name: Option<&str>,
    ) -> Option<DeviceDescriptor> {
        #[allow(deprecated)]
        let name = device.name().ok()?;
        let is_default = default_name == Some(name.as_str());
        let class = Self::classify(&name, direction, is_default);

        Some(DeviceDescriptor {
            id: DeviceId::new(name.clone()),
            display_name: name,
            direction,
            class,
        })
    }

    fn default_name(&self, direction: DeviceDirection) -> Option<String> {
        let device = match direction {
            DeviceDirection::Input => self.host.default_input_device(),
            DeviceDirection::Output => self.host.default_output_device(),
        }?;
        #[allow(deprecated)]
        device.name().ok()
    }
}

impl DeviceCatalog for CpalCatalog {
    fn list_input_devices(&self) -> Vec<DeviceDescriptor> {
        let default_name = self.default_name(DeviceDirection::Input);

        let devices = match self.host.input_devices() {
            Ok(devices) => devices,
            Err(e) => {
                warn!("Input device enumeration failed: {}", e);
                return Vec::new();
            }
        };

        let listed: Vec<DeviceDescriptor> = devices
            .filter_map(|d| Self::describe(&d, DeviceDirection::Input, default_name.as_deref()))
            .filter(|d| d.class.relevant_for(DeviceDirection::Input))
            .collect();

        debug!("Found {} speech-capture devices", listed.len());
        listed
    }

    fn list_output_devices(&self) -> Vec<DeviceDescriptor> {
        let default_name = self.default_name(DeviceDirection::Output);

        let devices = match self.host.output_devices() {
            Ok(devices) => devices,
            Err(e) => {
                warn!("Output device enumeration failed: {}", e);
                return Vec::new();
            }
        };

        let listed: Vec<DeviceDescriptor> = devices
            .filter_map(|d| Self::describe(&d, DeviceDirection::Output, default_name.as_deref()))
            .filter(|d| d.class.relevant_for(DeviceDirection::Output))
            .collect();

        debug!("Found {} speech-playback devices", listed.len());
        listed
    }
}

impl fmt::Debug for CpalCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CpalCatalog")
            .field("host", &self.host.id())
            .finish()
    }
}
