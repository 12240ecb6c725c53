//! Settings persistence for the gain state
//!
//! The full GainState shape — volumes, amplification, noise flag,
//! active preset, and the 8 band values — as a flat record with TOML
//! serialization. The settings collaborator reads and writes this exact
//! shape; loading applies bands before the preset so a Custom preset
//! preserves the stored bands while a named preset overwrites them.

use crate::domain::gain::{EqPreset, GainState, BAND_COUNT};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, info};

pub type Result<T> = std::result::Result<T, SettingsError>;

/// Errors that can occur during settings persistence
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

/// Flat on-disk record of the gain state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GainSettings {
    pub input_volume: u32,
    pub output_volume: u32,
    pub amplification: f32,
    pub noise_reduction: bool,
    pub preset: EqPreset,
    pub bands: [i16; BAND_COUNT],
}

impl Default for GainSettings {
    fn default() -> Self {
        Self {
            input_volume: 80,
            output_volume: 80,
            amplification: 1.0,
            noise_reduction: false,
            preset: EqPreset::Flat,
            bands: [0; BAND_COUNT],
        }
    }
}

impl GainSettings {
    /// Capture the live gain state into a persistable record
    pub fn capture(gain: &GainState) -> Self {
        Self {
            input_volume: gain.input_volume(),
            output_volume: gain.output_volume(),
            amplification: gain.amplification_factor(),
            noise_reduction: gain.noise_reduction(),
            preset: gain.active_preset(),
            bands: gain.equalizer_bands(),
        }
    }

    /// Apply this record to the live gain state
    ///
    /// Bands are applied before the preset and the preset last: a
    /// Custom preset then keeps the loaded bands, while a named preset
    /// correctly overwrites them with its fixed vector.
    pub fn apply(&self, gain: &GainState) {
        gain.set_input_volume(self.input_volume as i32);
        gain.set_output_volume(self.output_volume as i32);
        gain.set_amplification_factor(self.amplification);
        gain.set_noise_reduction(self.noise_reduction);

        for (index, &band) in self.bands.iter().enumerate() {
            gain.set_equalizer_band(index, band);
        }
        gain.apply_preset(self.preset);
    }

    /// Load settings from a TOML file
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading settings");

        let contents = fs::read_to_string(path).await?;
        let settings: Self = toml::from_str(&contents)?;

        debug!("Settings loaded successfully");
        Ok(settings)
    }

    /// Save settings to a TOML file
    pub async fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        info!(path = %path.display(), "Saving settings");

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let toml_str = toml::to_string_pretty(self)?;
        fs::write(path, toml_str).await?;

        debug!("Settings saved successfully");
        Ok(())
    }

    /// Default settings location under the user config directory
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("clarion")
            .join("settings.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_round_trip() {
        let gain = GainState::new();
        gain.set_input_volume(65);
        gain.set_output_volume(90);
        gain.set_amplification_factor(12.5);
        gain.set_noise_reduction(true);
        gain.apply_preset(EqPreset::VocalBoost);

        let settings = GainSettings::capture(&gain);

        let restored = GainState::new();
        settings.apply(&restored);

        assert_eq!(restored.input_volume(), 65);
        assert_eq!(restored.output_volume(), 90);
        assert_eq!(restored.amplification_factor(), 12.5);
        assert!(restored.noise_reduction());
        assert_eq!(restored.active_preset(), EqPreset::VocalBoost);
        assert_eq!(restored.equalizer_bands(), [-5, -2, 0, 4, 8, 4, 0, -2]);
    }

    #[test]
    fn test_apply_custom_preserves_loaded_bands() {
        let settings = GainSettings {
            preset: EqPreset::Custom,
            bands: [1, -2, 3, -4, 5, -6, 7, -8],
            ..Default::default()
        };

        let gain = GainState::new();
        settings.apply(&gain);

        // Applying the bands moves the state to Custom; applying the
        // Custom preset afterwards keeps them
        assert_eq!(gain.equalizer_bands(), [1, -2, 3, -4, 5, -6, 7, -8]);
        assert_eq!(gain.active_preset(), EqPreset::Custom);
    }

    #[test]
    fn test_apply_named_preset_overwrites_stored_bands() {
        // Stale custom bands stored alongside a named preset
        let settings = GainSettings {
            preset: EqPreset::BassBoost,
            bands: [1, 1, 1, 1, 1, 1, 1, 1],
            ..Default::default()
        };

        let gain = GainState::new();
        settings.apply(&gain);

        assert_eq!(gain.equalizer_bands(), [12, 8, 4, 0, 0, 0, 0, 0]);
        assert_eq!(gain.active_preset(), EqPreset::BassBoost);
    }

    #[tokio::test]
    async fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");

        let settings = GainSettings {
            input_volume: 42,
            output_volume: 77,
            amplification: 33.0,
            noise_reduction: true,
            preset: EqPreset::Custom,
            bands: [-15, -8, 0, 3, 6, 9, 12, 15],
        };

        settings.save_to_file(&path).await.unwrap();
        let loaded = GainSettings::load_from_file(&path).await.unwrap();

        assert_eq!(loaded, settings);
    }

    #[tokio::test]
    async fn test_load_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");

        assert!(matches!(
            GainSettings::load_from_file(&path).await,
            Err(SettingsError::Io(_))
        ));
    }
}
