//! Pipeline controller facade
//!
//! The single object UI collaborators hold: gain setters and getters,
//! device selection, session lifecycle, waveform access, and settings
//! persistence. Gain setters write the shared state the audio thread
//! reads every frame, so live changes need no restart; device changes
//! restart the session through [`StreamSession`].

use crossbeam::channel::Receiver;
use std::path::Path;
use std::sync::Arc;
use tracing::info;
use clarion_core::domain::audio::{
    DeviceCatalog, DeviceDescriptor, DeviceDirection, Result, StreamConfig,
};
use clarion_core::domain::gain::{EqPreset, GainState, BAND_COUNT};
use clarion_core::domain::settings::{self, GainSettings};
use clarion_core::domain::waveform::WaveFrame;

use super::cpal_backend::CpalCatalog;
use super::session::{ProcessingListener, SessionState, StreamSession};
use super::stream::{CpalBackend, StreamBackend};

/// Facade over the gain state, device catalog, and stream session
pub struct PipelineController {
    catalog: Arc<dyn DeviceCatalog>,
    gain: Arc<GainState>,
    session: Arc<StreamSession>,
}

impl Default for PipelineController {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineController {
    /// Controller over the hardware backend and CPAL device catalog
    pub fn new() -> Self {
        Self::with_backend(Arc::new(CpalBackend::new()), Arc::new(CpalCatalog::new()))
    }

    /// Controller over an explicit backend/catalog pair
    ///
    /// This is how the synthetic software path is selected.
    pub fn with_backend(
        backend: Arc<dyn StreamBackend>,
        catalog: Arc<dyn DeviceCatalog>,
    ) -> Self {
        info!(backend = backend.name(), "Creating pipeline controller");
        let gain = Arc::new(GainState::new());
        let session = Arc::new(StreamSession::new(backend, Arc::clone(&gain)));
        Self {
            catalog,
            gain,
            session,
        }
    }

    // --- Gain state -------------------------------------------------------

    pub fn set_input_volume(&self, volume: i32) {
        self.gain.set_input_volume(volume);
    }

    pub fn set_output_volume(&self, volume: i32) {
        self.gain.set_output_volume(volume);
    }

    pub fn set_amplification_factor(&self, factor: f32) {
        self.gain.set_amplification_factor(factor);
    }

    pub fn set_noise_reduction(&self, enabled: bool) {
        self.gain.set_noise_reduction(enabled);
    }

    pub fn set_equalizer_band(&self, index: usize, gain: i16) {
        self.gain.set_equalizer_band(index, gain);
    }

    pub fn apply_preset(&self, preset: EqPreset) {
        self.gain.apply_preset(preset);
    }

    pub fn input_volume(&self) -> u32 {
        self.gain.input_volume()
    }

    pub fn output_volume(&self) -> u32 {
        self.gain.output_volume()
    }

    pub fn amplification_factor(&self) -> f32 {
        self.gain.amplification_factor()
    }

    pub fn noise_reduction(&self) -> bool {
        self.gain.noise_reduction()
    }

    pub fn equalizer_bands(&self) -> [i16; BAND_COUNT] {
        self.gain.equalizer_bands()
    }

    pub fn active_preset(&self) -> EqPreset {
        self.gain.active_preset()
    }

    // --- Devices ----------------------------------------------------------

    pub fn list_input_devices(&self) -> Vec<DeviceDescriptor> {
        self.catalog.list_input_devices()
    }

    pub fn list_output_devices(&self) -> Vec<DeviceDescriptor> {
        self.catalog.list_output_devices()
    }

    pub fn set_input_device(&self, descriptor: DeviceDescriptor) -> Result<()> {
        self.session
            .set_device(DeviceDirection::Input, Some(descriptor))
    }

    pub fn set_output_device(&self, descriptor: DeviceDescriptor) -> Result<()> {
        self.session
            .set_device(DeviceDirection::Output, Some(descriptor))
    }

    /// Return to the system default input device
    pub fn clear_input_device(&self) -> Result<()> {
        self.session.set_device(DeviceDirection::Input, None)
    }

    /// Return to the system default output device
    pub fn clear_output_device(&self) -> Result<()> {
        self.session.set_device(DeviceDirection::Output, None)
    }

    pub fn current_config(&self) -> StreamConfig {
        self.session.current_config()
    }

    // --- Lifecycle --------------------------------------------------------

    pub fn start_audio(&self) -> Result<()> {
        self.session.start()
    }

    pub fn stop_audio(&self) {
        self.session.stop();
    }

    pub fn is_running(&self) -> bool {
        self.session.is_running()
    }

    pub fn session_state(&self) -> SessionState {
        self.session.state()
    }

    pub fn prepare_for_lock(&self) {
        self.session.prepare_for_lock();
    }

    pub fn resume_from_lock(&self) -> Result<()> {
        self.session.resume_from_lock()
    }

    pub fn set_processing_listener(&self, listener: Option<ProcessingListener>) {
        self.session.set_processing_listener(listener);
    }

    /// Lock/unlock glue bound to this controller's session
    pub fn lifecycle(&self) -> LifecycleCoordinator {
        LifecycleCoordinator {
            session: Arc::clone(&self.session),
        }
    }

    // --- Waveforms --------------------------------------------------------

    /// Subscribe to pre-chain amplitude frames, values in [0, 1]
    pub fn input_frames(&self) -> Receiver<WaveFrame> {
        self.session.input_frames()
    }

    /// Subscribe to post-chain amplitude frames, values in [0, 1]
    pub fn output_frames(&self) -> Receiver<WaveFrame> {
        self.session.output_frames()
    }

    pub fn input_waveform(&self) -> Vec<WaveFrame> {
        self.session.input_waveform()
    }

    pub fn output_waveform(&self) -> Vec<WaveFrame> {
        self.session.output_waveform()
    }

    pub fn clear_waveforms(&self) {
        self.session.clear_waveforms();
    }

    // --- Settings ---------------------------------------------------------

    /// Persist the current gain state
    pub async fn save_settings<P: AsRef<Path>>(&self, path: P) -> settings::Result<()> {
        GainSettings::capture(&self.gain).save_to_file(path).await
    }

    /// Load and apply persisted gain state
    ///
    /// A running session picks the values up immediately through the
    /// shared state; no restart happens.
    pub async fn load_settings<P: AsRef<Path>>(&self, path: P) -> settings::Result<()> {
        let loaded = GainSettings::load_from_file(path).await?;
        loaded.apply(&self.gain);
        Ok(())
    }
}

/// Glue from external lock/unlock signals into the stream session
///
/// Holds no stream state of its own; a screen lock only records whether
/// audio was running, and an unlock restarts it when the platform
/// suspended the stream in between.
pub struct LifecycleCoordinator {
    session: Arc<StreamSession>,
}

impl LifecycleCoordinator {
    pub fn screen_locked(&self) {
        self.session.prepare_for_lock();
    }

    pub fn screen_unlocked(&self) -> Result<()> {
        self.session.resume_from_lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::loopback::SyntheticBackend;

    fn synthetic_controller() -> PipelineController {
        let backend = Arc::new(SyntheticBackend::default());
        PipelineController::with_backend(backend.clone(), backend)
    }

    #[test]
    fn test_controller_mirrors_gain_state() {
        let controller = synthetic_controller();

        controller.set_input_volume(30);
        controller.set_output_volume(110);
        controller.set_amplification_factor(2.5);
        controller.set_noise_reduction(true);

        assert_eq!(controller.input_volume(), 30);
        assert_eq!(controller.output_volume(), 100);
        assert_eq!(controller.amplification_factor(), 2.5);
        assert!(controller.noise_reduction());
    }

    #[test]
    fn test_controller_preset_flow() {
        let controller = synthetic_controller();

        controller.apply_preset(EqPreset::BassBoost);
        assert_eq!(controller.equalizer_bands(), [12, 8, 4, 0, 0, 0, 0, 0]);

        controller.set_equalizer_band(3, 7);
        assert_eq!(controller.active_preset(), EqPreset::Custom);
        assert_eq!(controller.equalizer_bands()[3], 7);
    }

    #[test]
    fn test_lifecycle_coordinator_roundtrip() {
        let controller = synthetic_controller();
        let lifecycle = controller.lifecycle();

        controller.start_audio().unwrap();
        lifecycle.screen_locked();
        assert!(controller.is_running());

        controller.stop_audio();
        lifecycle.screen_unlocked().unwrap();
        assert!(controller.is_running());

        controller.stop_audio();
    }
}
