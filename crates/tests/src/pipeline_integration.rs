//! End-to-end session tests over the synthetic backend
//!
//! These verify the complete pipeline: session lifecycle, device
//! hot-swap restarts, lock/unlock behavior, live gain changes reaching
//! the audio thread, waveform delivery, and settings round-trips.

use std::sync::Arc;
use std::time::Duration;
use clarion_core::domain::audio::{AudioError, DeviceCatalog, Result, StreamConfig};
use clarion_core::domain::gain::EqPreset;
use clarion_infra::audio::{ActiveStreams, PipelineController, StreamBackend, SyntheticBackend};

const FRAME_TIMEOUT: Duration = Duration::from_secs(2);

fn synthetic_pair() -> (Arc<SyntheticBackend>, PipelineController) {
    let backend = Arc::new(SyntheticBackend::default());
    let controller = PipelineController::with_backend(backend.clone(), backend.clone());
    (backend, controller)
}

/// Backend whose setup always fails, for start-failure paths
struct BrokenBackend;

impl StreamBackend for BrokenBackend {
    fn name(&self) -> &str {
        "broken"
    }

    fn open(&self, _config: &StreamConfig) -> Result<ActiveStreams> {
        Err(AudioError::StreamSetup("no transducers here".to_string()))
    }
}

// ============================================================================
// SESSION LIFECYCLE
// ============================================================================

#[test]
fn test_start_stop_cycle() {
    let (backend, controller) = synthetic_pair();

    assert!(!controller.is_running());
    controller.start_audio().unwrap();
    assert!(controller.is_running());

    // Idempotent start leaves the stream pair alone
    controller.start_audio().unwrap();
    assert_eq!(backend.open_count(), 1);

    controller.stop_audio();
    assert!(!controller.is_running());
    controller.stop_audio();
    assert!(!controller.is_running());
}

#[test]
fn test_failed_start_leaves_session_idle() {
    let backend = Arc::new(SyntheticBackend::default());
    let controller =
        PipelineController::with_backend(Arc::new(BrokenBackend), backend);

    let result = controller.start_audio();
    assert!(matches!(result, Err(AudioError::StreamSetup(_))));
    assert!(!controller.is_running());

    // Stop after a failed start is safe
    controller.stop_audio();
    assert!(!controller.is_running());
}

#[test]
fn test_device_swap_while_running_is_one_restart() {
    let (backend, controller) = synthetic_pair();
    controller.start_audio().unwrap();
    assert_eq!(backend.open_count(), 1);

    let device = backend.list_input_devices().remove(0);
    controller.set_input_device(device.clone()).unwrap();

    assert!(controller.is_running());
    assert_eq!(backend.open_count(), 2);
    assert_eq!(
        controller.current_config().input_device,
        Some(device)
    );

    controller.clear_input_device().unwrap();
    assert_eq!(backend.open_count(), 3);
    assert!(controller.current_config().input_device.is_none());

    controller.stop_audio();
}

#[test]
fn test_device_swap_while_idle_waits_for_start() {
    let (backend, controller) = synthetic_pair();

    let device = backend.list_output_devices().remove(0);
    controller.set_output_device(device.clone()).unwrap();

    assert!(!controller.is_running());
    assert_eq!(backend.open_count(), 0);
    assert_eq!(controller.current_config().output_device, Some(device));
}

#[test]
fn test_lock_cycle_restores_running_state() {
    let (_backend, controller) = synthetic_pair();
    controller.start_audio().unwrap();

    controller.prepare_for_lock();
    assert!(controller.is_running(), "lock must not stop audio");

    // Platform suspends the stream while locked
    controller.stop_audio();
    controller.resume_from_lock().unwrap();
    assert!(controller.is_running());

    controller.stop_audio();

    // Without a running session before the lock, resume is a no-op
    controller.prepare_for_lock();
    controller.resume_from_lock().unwrap();
    assert!(!controller.is_running());
}

// ============================================================================
// AUDIO FLOW
// ============================================================================

#[test]
fn test_waveform_frames_flow_both_sides() {
    let (_backend, controller) = synthetic_pair();
    let input_rx = controller.input_frames();
    let output_rx = controller.output_frames();

    controller.start_audio().unwrap();

    let input_frame = input_rx.recv_timeout(FRAME_TIMEOUT).expect("input frame");
    let output_frame = output_rx.recv_timeout(FRAME_TIMEOUT).expect("output frame");

    for frame in [&input_frame, &output_frame] {
        assert!(frame.iter().all(|&v| (0.0..=1.0).contains(&v)));
    }
    // The 0.5-amplitude tone registers on the input side
    assert!(input_frame.iter().cloned().fold(0.0_f32, f32::max) > 0.05);

    controller.stop_audio();
}

#[test]
fn test_live_output_volume_change_reaches_chain() {
    let (_backend, controller) = synthetic_pair();
    let output_rx = controller.output_frames();

    controller.start_audio().unwrap();

    // Let the meter settle, then mute the output side live
    for _ in 0..10 {
        let _ = output_rx.recv_timeout(FRAME_TIMEOUT).expect("warmup frame");
    }
    controller.set_output_volume(0);

    // Smoothing decays 0.3x per frame; after a couple dozen frames the
    // output history must sit at silence while input still shows signal
    let mut last_peak = f32::MAX;
    for _ in 0..30 {
        if let Ok(frame) = output_rx.recv_timeout(FRAME_TIMEOUT) {
            last_peak = frame.iter().cloned().fold(0.0_f32, f32::max);
        }
    }
    assert!(last_peak < 0.01, "output peak {last_peak} after mute");

    let input_peak = controller
        .input_waveform()
        .last()
        .map(|f| f.iter().cloned().fold(0.0_f32, f32::max))
        .unwrap_or(0.0);
    assert!(input_peak > 0.05, "input side must keep seeing the tone");

    controller.stop_audio();
}

#[test]
fn test_waveform_snapshot_accumulates_history() {
    let (_backend, controller) = synthetic_pair();
    let output_rx = controller.output_frames();

    controller.start_audio().unwrap();
    for _ in 0..5 {
        let _ = output_rx.recv_timeout(FRAME_TIMEOUT).expect("frame");
    }
    controller.stop_audio();

    let history = controller.output_waveform();
    assert!(history.len() >= 5);

    controller.clear_waveforms();
    assert!(controller.output_waveform().is_empty());
}

// ============================================================================
// SETTINGS
// ============================================================================

#[tokio::test]
async fn test_settings_round_trip_through_controller() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("settings.toml");

    let (_backend, controller) = synthetic_pair();
    controller.set_input_volume(61);
    controller.set_output_volume(93);
    controller.set_amplification_factor(17.0);
    controller.set_noise_reduction(true);
    controller.apply_preset(EqPreset::TrebleBoost);
    controller.set_equalizer_band(0, -4); // now Custom

    controller.save_settings(&path).await.unwrap();

    let (_backend2, restored) = synthetic_pair();
    restored.load_settings(&path).await.unwrap();

    assert_eq!(restored.input_volume(), 61);
    assert_eq!(restored.output_volume(), 93);
    assert_eq!(restored.amplification_factor(), 17.0);
    assert!(restored.noise_reduction());
    assert_eq!(restored.active_preset(), EqPreset::Custom);
    assert_eq!(restored.equalizer_bands(), [-4, 0, 0, 0, 4, 8, 12, 15]);
}

#[tokio::test]
async fn test_settings_apply_while_running() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("settings.toml");

    let (_backend, donor) = synthetic_pair();
    donor.set_amplification_factor(9.0);
    donor.apply_preset(EqPreset::BassReduction);
    donor.save_settings(&path).await.unwrap();

    let (backend, controller) = synthetic_pair();
    controller.start_audio().unwrap();

    controller.load_settings(&path).await.unwrap();

    // Load is a live update, not a restart
    assert!(controller.is_running());
    assert_eq!(backend.open_count(), 1);
    assert_eq!(controller.amplification_factor(), 9.0);
    assert_eq!(controller.equalizer_bands(), [-12, -8, -4, 0, 0, 0, 0, 0]);

    controller.stop_audio();
}
