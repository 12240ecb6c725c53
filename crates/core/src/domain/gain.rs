//! Shared gain state and the equalizer preset engine
//!
//! All numeric settings of the pipeline live here: volumes, the
//! amplification factor, the noise-reduction flag, and the 8-band
//! equalizer with its named presets. Scalar fields are individually
//! atomic so UI-thread setters never contend with the audio thread;
//! the band vector and active preset share one short-lived exclusive
//! section guarded by a version counter, so the audio thread can never
//! observe a half-applied preset.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;
use tracing::debug;

/// Number of equalizer bands
pub const BAND_COUNT: usize = 8;

/// Band gain range in dB
pub const MIN_BAND_GAIN: i16 = -15;
pub const MAX_BAND_GAIN: i16 = 15;

/// Amplification factor range; hearing assistance needs very large
/// boosts, so the upper bound is deliberately high
pub const MIN_AMPLIFICATION: f32 = 0.1;
pub const MAX_AMPLIFICATION: f32 = 100.0;

/// Volume range for both input and output sides
pub const MAX_VOLUME: u32 = 100;

/// Default volume applied to both sides on first run
pub const DEFAULT_VOLUME: u32 = 80;

/// Named equalizer configurations
///
/// Custom marks manual per-band editing; every other preset maps to a
/// fixed 8-band gain vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EqPreset {
    Custom,
    Flat,
    BassBoost,
    TrebleBoost,
    VocalBoost,
    BassReduction,
}

impl EqPreset {
    /// Fixed band vector for a named preset, `None` for Custom
    pub fn band_gains(self) -> Option<[i16; BAND_COUNT]> {
        match self {
            EqPreset::Custom => None,
            EqPreset::Flat => Some([0, 0, 0, 0, 0, 0, 0, 0]),
            EqPreset::BassBoost => Some([12, 8, 4, 0, 0, 0, 0, 0]),
            EqPreset::TrebleBoost => Some([0, 0, 0, 0, 4, 8, 12, 15]),
            EqPreset::VocalBoost => Some([-5, -2, 0, 4, 8, 4, 0, -2]),
            EqPreset::BassReduction => Some([-12, -8, -4, 0, 0, 0, 0, 0]),
        }
    }
}

/// Band vector and active preset, updated together
#[derive(Debug, Clone, Copy)]
struct EqSection {
    bands: [i16; BAND_COUNT],
    preset: EqPreset,
}

/// Validated numeric settings shared between UI-facing setters and the
/// audio thread
///
/// Setters may be invoked from any thread. The audio thread reads the
/// state through [`GainState::refresh`], which only takes the band lock
/// when the version counter says the vector actually changed.
pub struct GainState {
    input_volume: AtomicU32,
    output_volume: AtomicU32,
    amplification_bits: AtomicU32,
    noise_reduction: AtomicBool,
    eq: Mutex<EqSection>,
    eq_version: AtomicU64,
}

impl Default for GainState {
    fn default() -> Self {
        Self {
            input_volume: AtomicU32::new(DEFAULT_VOLUME),
            output_volume: AtomicU32::new(DEFAULT_VOLUME),
            amplification_bits: AtomicU32::new(1.0_f32.to_bits()),
            noise_reduction: AtomicBool::new(false),
            eq: Mutex::new(EqSection {
                bands: [0; BAND_COUNT],
                preset: EqPreset::Flat,
            }),
            eq_version: AtomicU64::new(1),
        }
    }
}

impl GainState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the input-side volume, clamped to [0, 100]
    pub fn set_input_volume(&self, volume: i32) {
        let clamped = volume.clamp(0, MAX_VOLUME as i32) as u32;
        self.input_volume.store(clamped, Ordering::Relaxed);
    }

    /// Set the output-side volume, clamped to [0, 100]
    pub fn set_output_volume(&self, volume: i32) {
        let clamped = volume.clamp(0, MAX_VOLUME as i32) as u32;
        self.output_volume.store(clamped, Ordering::Relaxed);
    }

    /// Set the amplification factor, clamped to [0.1, 100.0]
    ///
    /// Non-finite values are ignored.
    pub fn set_amplification_factor(&self, factor: f32) {
        if !factor.is_finite() {
            debug!(factor, "ignoring non-finite amplification factor");
            return;
        }
        let clamped = factor.clamp(MIN_AMPLIFICATION, MAX_AMPLIFICATION);
        self.amplification_bits
            .store(clamped.to_bits(), Ordering::Relaxed);
    }

    pub fn set_noise_reduction(&self, enabled: bool) {
        self.noise_reduction.store(enabled, Ordering::Relaxed);
    }

    /// Set one equalizer band, forcing the active preset to Custom
    ///
    /// Out-of-range indices are ignored; gains are clamped to [-15, 15].
    pub fn set_equalizer_band(&self, index: usize, gain: i16) {
        if index >= BAND_COUNT {
            debug!(index, "ignoring out-of-range equalizer band");
            return;
        }
        let gain = gain.clamp(MIN_BAND_GAIN, MAX_BAND_GAIN);
        let mut eq = self.lock_eq();
        eq.bands[index] = gain;
        eq.preset = EqPreset::Custom;
        drop(eq);
        self.bump_eq_version();
    }

    /// Apply a named preset, overwriting all bands atomically
    ///
    /// Applying Custom leaves the current band values untouched and only
    /// marks the state as manually editable.
    pub fn apply_preset(&self, preset: EqPreset) {
        let mut eq = self.lock_eq();
        if let Some(bands) = preset.band_gains() {
            eq.bands = bands;
        }
        eq.preset = preset;
        drop(eq);
        self.bump_eq_version();
        debug!(?preset, "equalizer preset applied");
    }

    pub fn input_volume(&self) -> u32 {
        self.input_volume.load(Ordering::Relaxed)
    }

    pub fn output_volume(&self) -> u32 {
        self.output_volume.load(Ordering::Relaxed)
    }

    pub fn amplification_factor(&self) -> f32 {
        f32::from_bits(self.amplification_bits.load(Ordering::Relaxed))
    }

    pub fn noise_reduction(&self) -> bool {
        self.noise_reduction.load(Ordering::Relaxed)
    }

    pub fn equalizer_bands(&self) -> [i16; BAND_COUNT] {
        self.lock_eq().bands
    }

    pub fn active_preset(&self) -> EqPreset {
        self.lock_eq().preset
    }

    /// Refresh an audio-thread snapshot from the shared state
    ///
    /// Scalar fields are plain atomic loads; the band vector is copied
    /// under the lock only when the version counter moved since the
    /// snapshot was last refreshed.
    pub fn refresh(&self, snapshot: &mut GainSnapshot) {
        snapshot.input_volume = self.input_volume();
        snapshot.output_volume = self.output_volume();
        snapshot.amplification = self.amplification_factor();
        snapshot.noise_reduction = self.noise_reduction();

        let version = self.eq_version.load(Ordering::Acquire);
        if version != snapshot.eq_version {
            snapshot.bands = self.lock_eq().bands;
            snapshot.eq_version = version;
        }
    }

    fn lock_eq(&self) -> std::sync::MutexGuard<'_, EqSection> {
        match self.eq.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn bump_eq_version(&self) {
        self.eq_version.fetch_add(1, Ordering::Release);
    }
}

/// Per-frame view of the gain state held by the audio thread
///
/// `eq_version` tracks which band vector the snapshot carries so the
/// signal chain can rebuild filter coefficients only when it changed.
#[derive(Debug, Clone, Copy)]
pub struct GainSnapshot {
    pub input_volume: u32,
    pub output_volume: u32,
    pub amplification: f32,
    pub noise_reduction: bool,
    pub bands: [i16; BAND_COUNT],
    pub eq_version: u64,
}

impl Default for GainSnapshot {
    fn default() -> Self {
        Self {
            input_volume: DEFAULT_VOLUME,
            output_volume: DEFAULT_VOLUME,
            amplification: 1.0,
            noise_reduction: false,
            bands: [0; BAND_COUNT],
            // Behind any live GainState version, so the first refresh
            // always copies the band vector
            eq_version: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_defaults() {
        let gain = GainState::new();
        assert_eq!(gain.input_volume(), 80);
        assert_eq!(gain.output_volume(), 80);
        assert_eq!(gain.amplification_factor(), 1.0);
        assert!(!gain.noise_reduction());
        assert_eq!(gain.active_preset(), EqPreset::Flat);
        assert_eq!(gain.equalizer_bands(), [0; BAND_COUNT]);
    }

    #[test]
    fn test_volume_clamping() {
        let gain = GainState::new();

        gain.set_input_volume(150);
        assert_eq!(gain.input_volume(), 100);

        gain.set_input_volume(-20);
        assert_eq!(gain.input_volume(), 0);

        gain.set_output_volume(55);
        assert_eq!(gain.output_volume(), 55);
    }

    #[test]
    fn test_amplification_clamping() {
        let gain = GainState::new();

        gain.set_amplification_factor(500.0);
        assert_eq!(gain.amplification_factor(), MAX_AMPLIFICATION);

        gain.set_amplification_factor(0.0);
        assert_eq!(gain.amplification_factor(), MIN_AMPLIFICATION);

        gain.set_amplification_factor(f32::NAN);
        assert_eq!(gain.amplification_factor(), MIN_AMPLIFICATION);
    }

    #[test]
    fn test_preset_overwrites_bands() {
        let gain = GainState::new();

        gain.apply_preset(EqPreset::BassBoost);
        assert_eq!(gain.equalizer_bands(), [12, 8, 4, 0, 0, 0, 0, 0]);
        assert_eq!(gain.active_preset(), EqPreset::BassBoost);
    }

    #[test]
    fn test_band_edit_forces_custom() {
        let gain = GainState::new();
        gain.apply_preset(EqPreset::BassBoost);

        gain.set_equalizer_band(3, 7);

        let bands = gain.equalizer_bands();
        assert_eq!(bands[3], 7);
        // Other bands keep their preset values
        assert_eq!(bands[0], 12);
        assert_eq!(bands[1], 8);
        assert_eq!(gain.active_preset(), EqPreset::Custom);
    }

    #[test]
    fn test_custom_preset_keeps_bands() {
        let gain = GainState::new();
        gain.set_equalizer_band(0, -9);
        gain.set_equalizer_band(7, 11);

        gain.apply_preset(EqPreset::Custom);

        let bands = gain.equalizer_bands();
        assert_eq!(bands[0], -9);
        assert_eq!(bands[7], 11);
        assert_eq!(gain.active_preset(), EqPreset::Custom);
    }

    #[test]
    fn test_band_gain_clamping() {
        let gain = GainState::new();

        gain.set_equalizer_band(2, 40);
        assert_eq!(gain.equalizer_bands()[2], MAX_BAND_GAIN);

        gain.set_equalizer_band(2, -40);
        assert_eq!(gain.equalizer_bands()[2], MIN_BAND_GAIN);

        // Out of range index is ignored
        gain.set_equalizer_band(8, 5);
        assert_eq!(gain.active_preset(), EqPreset::Custom);
    }

    #[test]
    fn test_refresh_tracks_band_version() {
        let gain = GainState::new();
        let mut snapshot = GainSnapshot::default();

        gain.refresh(&mut snapshot);
        let first_version = snapshot.eq_version;
        assert_eq!(snapshot.bands, [0; BAND_COUNT]);

        gain.refresh(&mut snapshot);
        assert_eq!(snapshot.eq_version, first_version);

        gain.apply_preset(EqPreset::TrebleBoost);
        gain.refresh(&mut snapshot);
        assert_ne!(snapshot.eq_version, first_version);
        assert_eq!(snapshot.bands, [0, 0, 0, 0, 4, 8, 12, 15]);
    }

    #[test]
    fn test_refresh_scalar_fields() {
        let gain = GainState::new();
        let mut snapshot = GainSnapshot::default();

        gain.set_input_volume(25);
        gain.set_amplification_factor(4.5);
        gain.set_noise_reduction(true);
        gain.refresh(&mut snapshot);

        assert_eq!(snapshot.input_volume, 25);
        assert_eq!(snapshot.amplification, 4.5);
        assert!(snapshot.noise_reduction);
    }

    proptest! {
        #[test]
        fn prop_volume_always_clamped(v in i32::MIN..i32::MAX) {
            let gain = GainState::new();
            gain.set_input_volume(v);
            prop_assert_eq!(gain.input_volume(), v.clamp(0, 100) as u32);
        }

        #[test]
        fn prop_amplification_always_in_range(f in -1000.0_f32..1000.0) {
            let gain = GainState::new();
            gain.set_amplification_factor(f);
            let stored = gain.amplification_factor();
            prop_assert!(stored >= MIN_AMPLIFICATION && stored <= MAX_AMPLIFICATION);
            prop_assert_eq!(stored, f.clamp(MIN_AMPLIFICATION, MAX_AMPLIFICATION));
        }

        #[test]
        fn prop_band_gain_always_in_range(idx in 0_usize..8, g in i16::MIN..i16::MAX) {
            let gain = GainState::new();
            gain.set_equalizer_band(idx, g);
            let stored = gain.equalizer_bands()[idx];
            prop_assert!(stored >= MIN_BAND_GAIN && stored <= MAX_BAND_GAIN);
        }
    }
}
