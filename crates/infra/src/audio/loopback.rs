//! Synthetic software backend
//!
//! Implements the stream contract without hardware: capture frames are
//! a generated test tone delivered at real-frame cadence, rendered audio
//! is drained and discarded. Used by `clarion run --synthetic` on
//! machines without usable devices and by the integration tests, which
//! also read the open-counter diagnostic.

use crossbeam::channel::{bounded, RecvTimeoutError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info};
use clarion_core::domain::audio::{
    DeviceCatalog, DeviceClass, DeviceDescriptor, DeviceDirection, DeviceId, Result, StreamConfig,
};

use super::stream::{ActiveStreams, StreamBackend, CHANNEL_DEPTH};

/// Samples per generated frame (10ms at the pipeline rate)
const FRAME_LEN: usize = 441;

const FRAME_PERIOD: Duration = Duration::from_millis(10);

/// Tone generator backend for hardware-free operation
pub struct SyntheticBackend {
    tone_hz: f32,
    amplitude: f32,
    opens: Arc<AtomicUsize>,
}

impl Default for SyntheticBackend {
    fn default() -> Self {
        Self::new(440.0, 0.5)
    }
}

impl SyntheticBackend {
    pub fn new(tone_hz: f32, amplitude: f32) -> Self {
        Self {
            tone_hz,
            amplitude,
            opens: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of times a stream pair has been opened
    ///
    /// Each full session restart opens exactly one new pair, so this
    /// counter observes restart behavior from the outside.
    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

impl StreamBackend for SyntheticBackend {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn open(&self, config: &StreamConfig) -> Result<ActiveStreams> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        info!(tone_hz = self.tone_hz, "Opening synthetic stream pair");

        let (capture_tx, capture_rx) = bounded(CHANNEL_DEPTH);
        let (render_tx, render_rx) = bounded(CHANNEL_DEPTH);
        let (stop_tx, stop_rx) = bounded::<()>(1);

        let sample_rate = config.sample_rate as f32;
        let tone_hz = self.tone_hz;
        let amplitude = self.amplitude;

        let owner = thread::Builder::new()
            .name("clarion-synthetic".to_string())
            .spawn(move || {
                let mut phase = 0.0_f32;
                let step = 2.0 * std::f32::consts::PI * tone_hz / sample_rate;

                loop {
                    match stop_rx.recv_timeout(FRAME_PERIOD) {
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                        Err(RecvTimeoutError::Timeout) => {}
                    }

                    let frame: Vec<f32> = (0..FRAME_LEN)
                        .map(|_| {
                            let sample = phase.sin() * amplitude;
                            phase = (phase + step) % (2.0 * std::f32::consts::PI);
                            sample
                        })
                        .collect();
                    let _ = capture_tx.try_send(frame);

                    // Discard whatever the pipeline rendered
                    while render_rx.try_recv().is_ok() {}
                }
                debug!("synthetic stream pair released");
            })
            .map_err(|e| {
                clarion_core::domain::audio::AudioError::StreamSetup(format!(
                    "failed to spawn synthetic owner: {e}"
                ))
            })?;

        Ok(ActiveStreams::new(capture_rx, render_tx, stop_tx, owner))
    }
}

impl DeviceCatalog for SyntheticBackend {
    fn list_input_devices(&self) -> Vec<DeviceDescriptor> {
        vec![DeviceDescriptor {
            id: DeviceId::new("synthetic-tone".to_string()),
            display_name: "Synthetic Tone".to_string(),
            direction: DeviceDirection::Input,
            class: DeviceClass::BuiltinMic,
        }]
    }

    fn list_output_devices(&self) -> Vec<DeviceDescriptor> {
        vec![DeviceDescriptor {
            id: DeviceId::new("synthetic-sink".to_string()),
            display_name: "Synthetic Sink".to_string(),
            direction: DeviceDirection::Output,
            class: DeviceClass::BuiltinSpeaker,
        }]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synthetic_delivers_tone_frames() {
        let backend = SyntheticBackend::default();
        let streams = backend.open(&StreamConfig::default()).unwrap();

        let frame = streams
            .capture
            .recv_timeout(Duration::from_secs(1))
            .expect("tone frame");
        assert_eq!(frame.len(), FRAME_LEN);
        let peak = frame.iter().fold(0.0_f32, |acc, s| acc.max(s.abs()));
        assert!(peak > 0.4 && peak <= 0.5);

        assert_eq!(backend.open_count(), 1);
        streams.close();
    }

    #[test]
    fn test_synthetic_drains_render_side() {
        let backend = SyntheticBackend::default();
        let streams = backend.open(&StreamConfig::default()).unwrap();

        for _ in 0..32 {
            streams.render.try_send(vec![0.0; FRAME_LEN]).ok();
            thread::sleep(Duration::from_millis(2));
        }

        // The drain keeps the bounded channel from staying full
        assert!(streams.render.try_send(vec![0.0; FRAME_LEN]).is_ok());
        streams.close();
    }

    #[test]
    fn test_synthetic_catalog_lists_both_directions() {
        let backend = SyntheticBackend::default();
        assert_eq!(backend.list_input_devices().len(), 1);
        assert_eq!(backend.list_output_devices().len(), 1);
    }
}
