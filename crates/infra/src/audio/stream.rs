//! Duplex stream plumbing between the platform and the processing thread
//!
//! A [`StreamBackend`] turns the session's stream configuration into an
//! [`ActiveStreams`] pair: a capture receiver and a render sender joined
//! by bounded channels. The CPAL implementation owns its stream handles
//! on a dedicated thread (CPAL streams cannot move between threads) and
//! mediates devices that reject the pipeline's mono/44.1kHz/f32 shape by
//! downmixing and linear resampling at the boundary.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam::channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::collections::VecDeque;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};
use clarion_core::domain::audio::{
    AudioError, DeviceDescriptor, DeviceDirection, Result, StreamConfig, CHANNEL_COUNT,
};

/// Audio buffer exchanged between stream callbacks and the processor
pub type AudioBuffer = Vec<f32>;

/// Depth of the capture and render channels
pub const CHANNEL_DEPTH: usize = 8;

const SETUP_TIMEOUT: Duration = Duration::from_secs(5);

/// Contract between the stream session and a platform backend
///
/// The session owns exactly one implementation at a time; the hardware
/// path and the synthetic software path are two implementations of the
/// same contract selected at configuration time.
pub trait StreamBackend: Send + Sync {
    /// Backend name for logs
    fn name(&self) -> &str;

    /// Build and start the capture/render pair for the given config
    ///
    /// Setup is all-or-nothing: on any partial failure every resource
    /// built so far is released before the error is returned.
    fn open(&self, config: &StreamConfig) -> Result<ActiveStreams>;
}

/// Live capture/render pair produced by a backend
///
/// Dropping (or explicitly closing) the pair signals the owning thread
/// to release its native handles and waits for it to finish.
pub struct ActiveStreams {
    pub capture: Receiver<AudioBuffer>,
    pub render: Sender<AudioBuffer>,
    stop: Sender<()>,
    owner: Option<JoinHandle<()>>,
}

impl ActiveStreams {
    pub fn new(
        capture: Receiver<AudioBuffer>,
        render: Sender<AudioBuffer>,
        stop: Sender<()>,
        owner: JoinHandle<()>,
    ) -> Self {
        Self {
            capture,
            render,
            stop,
            owner: Some(owner),
        }
    }

    /// Release the native streams and wait for the owner thread
    pub fn close(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(owner) = self.owner.take() {
            let _ = self.stop.try_send(());
            if owner.join().is_err() {
                error!("stream owner thread panicked during shutdown");
            }
        }
    }
}

impl Drop for ActiveStreams {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Mono linear-interpolation resampler for boundary mediation
pub struct LinearResampler {
    ratio: f64,
    position: f64,
}

impl LinearResampler {
    pub fn new(source_rate: u32, target_rate: u32) -> Self {
        if source_rate == target_rate {
            debug!(
                "Source and target rates match ({}Hz), bypassing resampling",
                source_rate
            );
            return Self {
                ratio: 1.0,
                position: 0.0,
            };
        }

        info!("Creating resampler: {}Hz -> {}Hz", source_rate, target_rate);
        Self {
            ratio: target_rate as f64 / source_rate as f64,
            position: 0.0,
        }
    }

    pub fn is_bypass(&self) -> bool {
        self.ratio == 1.0
    }

    pub fn ratio(&self) -> f64 {
        self.ratio
    }

    /// Append the resampled input to `out`
    pub fn process_into(&mut self, input: &[f32], out: &mut Vec<f32>) {
        if self.is_bypass() {
            out.extend_from_slice(input);
            return;
        }

        let frames = input.len();
        if frames == 0 {
            return;
        }

        while self.position < frames as f64 {
            let i0 = self.position as usize;
            let i1 = (i0 + 1).min(frames - 1);
            let frac = (self.position - i0 as f64) as f32;
            out.push(input[i0] + frac * (input[i1] - input[i0]));
            self.position += self.ratio.recip();
        }

        self.position -= frames as f64;
    }
}

/// Hardware backend over the default CPAL host
#[derive(Debug, Default)]
pub struct CpalBackend;

impl CpalBackend {
    pub fn new() -> Self {
        Self
    }
}

impl StreamBackend for CpalBackend {
    fn name(&self) -> &str {
        "cpal"
    }

    fn open(&self, config: &StreamConfig) -> Result<ActiveStreams> {
        info!(
            input = config
                .input_device
                .as_ref()
                .map(|d| d.display_name.as_str())
                .unwrap_or("system default"),
            output = config
                .output_device
                .as_ref()
                .map(|d| d.display_name.as_str())
                .unwrap_or("system default"),
            "Opening duplex streams"
        );

        let (capture_tx, capture_rx) = bounded(CHANNEL_DEPTH);
        let (render_tx, render_rx) = bounded(CHANNEL_DEPTH);
        let (setup_tx, setup_rx) = bounded(1);
        let (stop_tx, stop_rx) = bounded(1);

        let owner_config = config.clone();
        let owner = thread::Builder::new()
            .name("clarion-streams".to_string())
            .spawn(move || stream_owner(owner_config, capture_tx, render_rx, setup_tx, stop_rx))
            .map_err(|e| AudioError::StreamSetup(format!("failed to spawn stream owner: {e}")))?;

        match setup_rx.recv_timeout(SETUP_TIMEOUT) {
            Ok(Ok(())) => Ok(ActiveStreams::new(capture_rx, render_tx, stop_tx, owner)),
            Ok(Err(e)) => {
                let _ = owner.join();
                Err(e)
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                // The owner cleans itself up once the stop sender is gone
                drop(stop_tx);
                Err(AudioError::StreamSetup(
                    "stream setup timed out".to_string(),
                ))
            }
        }
    }
}

/// Thread body owning the CPAL stream handles for one session
///
/// Streams are built, started, and eventually dropped here; the thread
/// parks on the stop channel while audio flows through the callbacks.
fn stream_owner(
    config: StreamConfig,
    capture_tx: Sender<AudioBuffer>,
    render_rx: Receiver<AudioBuffer>,
    setup_tx: Sender<Result<()>>,
    stop_rx: Receiver<()>,
) {
    match open_pair(&config, capture_tx, render_rx) {
        Ok(streams) => {
            let _ = setup_tx.send(Ok(()));
            let _ = stop_rx.recv();
            drop(streams);
            debug!("stream pair released");
        }
        Err(e) => {
            let _ = setup_tx.send(Err(e));
        }
    }
}

fn open_pair(
    config: &StreamConfig,
    capture_tx: Sender<AudioBuffer>,
    render_rx: Receiver<AudioBuffer>,
) -> Result<(cpal::Stream, cpal::Stream)> {
    let host = cpal::default_host();

    let input_device = resolve_device(&host, config.input_device.as_ref(), DeviceDirection::Input)?;
    let output_device =
        resolve_device(&host, config.output_device.as_ref(), DeviceDirection::Output)?;

    // Any early return below drops the streams built so far, so a
    // partial failure never leaves a handle attached
    let capture = open_capture(&input_device, config.sample_rate, capture_tx)?;
    let render = open_render(&output_device, config.sample_rate, render_rx)?;

    capture
        .play()
        .map_err(|e| AudioError::StreamSetup(format!("failed to start capture stream: {e}")))?;
    render
        .play()
        .map_err(|e| AudioError::StreamSetup(format!("failed to start render stream: {e}")))?;

    Ok((capture, render))
}

/// Find the configured device, falling back to the system default when
/// it is no longer present
fn resolve_device(
    host: &cpal::Host,
    selection: Option<&DeviceDescriptor>,
    direction: DeviceDirection,
) -> Result<cpal::Device> {
    if let Some(want) = selection {
        match find_named(host, want, direction) {
            Ok(device) => return Ok(device),
            Err(e @ AudioError::DeviceUnavailable(_)) => {
                warn!(device = %want.display_name, error = %e, "falling back to system default");
            }
            Err(e) => return Err(e),
        }
    }

    match direction {
        DeviceDirection::Input => host
            .default_input_device()
            .ok_or_else(|| AudioError::StreamSetup("no default input device".to_string())),
        DeviceDirection::Output => host
            .default_output_device()
            .ok_or_else(|| AudioError::StreamSetup("no default output device".to_string())),
    }
}

fn find_named(
    host: &cpal::Host,
    want: &DeviceDescriptor,
    direction: DeviceDirection,
) -> Result<cpal::Device> {
    let devices: Vec<cpal::Device> = match direction {
        DeviceDirection::Input => host.input_devices().map(|d| d.collect()),
        DeviceDirection::Output => host.output_devices().map(|d| d.collect()),
    }
    .map_err(|e| AudioError::StreamSetup(e.to_string()))?;

    devices
        .into_iter()
        .find(|d| {
            #[allow(deprecated)]
            let name = d.name().ok();
            name.as_deref() == Some(want.id.as_str())
        })
        .ok_or_else(|| AudioError::DeviceUnavailable(want.display_name.clone()))
}

fn open_capture(
    device: &cpal::Device,
    pipeline_rate: u32,
    tx: Sender<AudioBuffer>,
) -> Result<cpal::Stream> {
    let native = cpal::StreamConfig {
        channels: CHANNEL_COUNT,
        sample_rate: pipeline_rate,
        buffer_size: cpal::BufferSize::Default,
    };

    match build_capture(device, &native, pipeline_rate, tx.clone()) {
        Ok(stream) => Ok(stream),
        Err(first) => {
            debug!("native capture shape rejected ({first}), mediating device default");
            let supported = device
                .default_input_config()
                .map_err(|e| AudioError::StreamSetup(format!("no default input config: {e}")))?;
            let fallback = cpal::StreamConfig {
                channels: supported.channels(),
                sample_rate: supported.sample_rate(),
                buffer_size: cpal::BufferSize::Default,
            };
            build_capture(device, &fallback, pipeline_rate, tx)
                .map_err(|e| AudioError::StreamSetup(format!("failed to build capture stream: {e}")))
        }
    }
}

fn build_capture(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    pipeline_rate: u32,
    tx: Sender<AudioBuffer>,
) -> std::result::Result<cpal::Stream, cpal::BuildStreamError> {
    let channels = config.channels as usize;
    let mut resampler = LinearResampler::new(config.sample_rate, pipeline_rate);

    device.build_input_stream(
        config,
        move |data: &[f32], _: &cpal::InputCallbackInfo| {
            let mono: Vec<f32> = if channels == 1 {
                data.to_vec()
            } else {
                data.chunks(channels)
                    .map(|frame| frame.iter().sum::<f32>() / channels as f32)
                    .collect()
            };

            let frame = if resampler.is_bypass() {
                mono
            } else {
                let mut resampled = Vec::with_capacity(
                    (mono.len() as f64 * resampler.ratio()) as usize + 1,
                );
                resampler.process_into(&mono, &mut resampled);
                resampled
            };

            if !frame.is_empty() && tx.try_send(frame).is_err() {
                trace!("capture queue full, frame dropped");
            }
        },
        |err| error!("Capture stream error: {}", err),
        None,
    )
}

fn open_render(
    device: &cpal::Device,
    pipeline_rate: u32,
    rx: Receiver<AudioBuffer>,
) -> Result<cpal::Stream> {
    let native = cpal::StreamConfig {
        channels: CHANNEL_COUNT,
        sample_rate: pipeline_rate,
        buffer_size: cpal::BufferSize::Default,
    };

    match build_render(device, &native, pipeline_rate, rx.clone()) {
        Ok(stream) => Ok(stream),
        Err(first) => {
            debug!("native render shape rejected ({first}), mediating device default");
            let supported = device
                .default_output_config()
                .map_err(|e| AudioError::StreamSetup(format!("no default output config: {e}")))?;
            let fallback = cpal::StreamConfig {
                channels: supported.channels(),
                sample_rate: supported.sample_rate(),
                buffer_size: cpal::BufferSize::Default,
            };
            build_render(device, &fallback, pipeline_rate, rx)
                .map_err(|e| AudioError::StreamSetup(format!("failed to build render stream: {e}")))
        }
    }
}

fn build_render(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    pipeline_rate: u32,
    rx: Receiver<AudioBuffer>,
) -> std::result::Result<cpal::Stream, cpal::BuildStreamError> {
    let channels = config.channels as usize;
    let mut resampler = LinearResampler::new(pipeline_rate, config.sample_rate);
    let mut queue: VecDeque<f32> = VecDeque::new();
    let mut scratch: Vec<f32> = Vec::new();

    device.build_output_stream(
        config,
        move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
            let frames_needed = data.len() / channels;

            // Pull processed buffers until this callback is covered or
            // the processor has nothing queued
            while queue.len() < frames_needed {
                match rx.try_recv() {
                    Ok(buffer) => {
                        if resampler.is_bypass() {
                            queue.extend(buffer);
                        } else {
                            scratch.clear();
                            resampler.process_into(&buffer, &mut scratch);
                            queue.extend(scratch.iter().copied());
                        }
                    }
                    Err(_) => break,
                }
            }

            // Mono path fanned out to every device channel; shortfall
            // becomes silence rather than stale data
            for frame in data.chunks_mut(channels) {
                let sample = queue.pop_front().unwrap_or(0.0);
                for slot in frame.iter_mut() {
                    *slot = sample;
                }
            }
        },
        |err| error!("Render stream error: {}", err),
        None,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resampler_bypass() {
        let mut resampler = LinearResampler::new(44_100, 44_100);
        assert!(resampler.is_bypass());

        let input = vec![1.0, 2.0, 3.0, 4.0];
        let mut output = Vec::new();
        resampler.process_into(&input, &mut output);
        assert_eq!(output, input);
    }

    #[test]
    fn test_resampler_upsamples() {
        let mut resampler = LinearResampler::new(44_100, 48_000);
        assert!(resampler.ratio() > 1.0);

        let input = vec![0.0, 0.5, 1.0, 0.5, 0.0, -0.5, -1.0, -0.5];
        let mut output = Vec::new();
        resampler.process_into(&input, &mut output);

        assert!(output.len() > input.len());
        assert!(output.iter().all(|s| s.abs() <= 1.0));
    }

    #[test]
    fn test_resampler_downsamples() {
        let mut resampler = LinearResampler::new(48_000, 44_100);

        let input = vec![0.25; 480];
        let mut output = Vec::new();
        resampler.process_into(&input, &mut output);

        // 480 samples at 48kHz cover 10ms, which is ~441 at 44.1kHz
        assert!((output.len() as i64 - 441).abs() <= 1);
        assert!(output.iter().all(|&s| (s - 0.25).abs() < 1e-6));
    }

    #[test]
    fn test_resampler_position_carries_between_buffers() {
        let mut resampler = LinearResampler::new(48_000, 44_100);

        let mut total = 0;
        for _ in 0..100 {
            let mut out = Vec::new();
            resampler.process_into(&[0.1; 480], &mut out);
            total += out.len();
        }

        // Long-run output count tracks the ratio without drift
        assert!((total as i64 - 44_100).abs() <= 2);
    }

    #[test]
    fn test_active_streams_close_joins_owner() {
        let (_capture_tx, capture_rx) = bounded::<AudioBuffer>(1);
        let (render_tx, _render_rx) = bounded::<AudioBuffer>(1);
        let (stop_tx, stop_rx) = bounded::<()>(1);

        let owner = thread::spawn(move || {
            let _ = stop_rx.recv();
        });

        let streams = ActiveStreams::new(capture_rx, render_tx, stop_tx, owner);
        streams.close();
    }
}
