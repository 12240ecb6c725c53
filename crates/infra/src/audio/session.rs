//! Stream session lifecycle management
//!
//! Owns the live capture/render pair, the dedicated processing thread,
//! and the Idle → Configuring → Running → Stopping state machine.
//! Device changes restart the whole session (stop completes before
//! start begins, concurrent requests are coalesced); live gain changes
//! reach the processing thread through the shared gain state without a
//! restart. A screen lock never stops audio: the session only records
//! whether it was running so an unlock can restart it if the platform
//! itself suspended the stream.

use crossbeam::atomic::AtomicCell;
use crossbeam::channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, trace};
use clarion_core::domain::audio::{
    AudioError, DeviceDescriptor, DeviceDirection, Result, StreamConfig,
};
use clarion_core::domain::chain::SignalChain;
use clarion_core::domain::gain::{GainSnapshot, GainState};
use clarion_core::domain::waveform::{WaveFrame, WaveformBuffer};

use super::stream::{ActiveStreams, StreamBackend};

/// How long the processing thread waits for a capture frame before
/// re-checking the shutdown flag
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Depth of the waveform frame channels
const FRAME_CHANNEL_DEPTH: usize = 8;

/// Lifecycle states of a stream session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Configuring,
    Running,
    Stopping,
}

/// Observer of Running/Idle transitions, e.g. the foreground-service
/// collaborator mirroring running state into notification text
///
/// Invoked on the thread driving the transition; it must not call back
/// into the session.
pub type ProcessingListener = Arc<dyn Fn(bool) + Send + Sync>;

/// One side's waveform publication point
///
/// The audio thread folds frames into the history buffer and forwards
/// the latest smoothed frame over a bounded channel; consumers either
/// subscribe to the channel or pull ring snapshots.
struct WaveformTap {
    buffer: Mutex<WaveformBuffer>,
    frames_tx: Sender<WaveFrame>,
    frames_rx: Receiver<WaveFrame>,
}

impl WaveformTap {
    fn new() -> Self {
        let (frames_tx, frames_rx) = bounded(FRAME_CHANNEL_DEPTH);
        Self {
            buffer: Mutex::new(WaveformBuffer::new()),
            frames_tx,
            frames_rx,
        }
    }

    /// Publish one processed buffer; never blocks the audio thread
    ///
    /// A consumer holding the lock for a snapshot makes this push skip
    /// rather than wait.
    fn publish(&self, samples: &[f32]) {
        if let Ok(mut buffer) = self.buffer.try_lock() {
            buffer.push_frame(samples);
            let latest = buffer.latest();
            drop(buffer);
            let _ = self.frames_tx.try_send(latest);
        }
    }

    fn snapshot(&self) -> Vec<WaveFrame> {
        self.lock_buffer().snapshot()
    }

    fn clear(&self) {
        self.lock_buffer().clear();
    }

    fn subscribe(&self) -> Receiver<WaveFrame> {
        self.frames_rx.clone()
    }

    fn lock_buffer(&self) -> MutexGuard<'_, WaveformBuffer> {
        match self.buffer.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Worker-thread handle and its shutdown flag, guarded by the control
/// lock that serializes start/stop/restart
struct ControlBlock {
    worker: Option<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
}

impl Default for ControlBlock {
    fn default() -> Self {
        Self {
            worker: None,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }
}

/// The live capture/process/render session
pub struct StreamSession {
    backend: Arc<dyn StreamBackend>,
    gain: Arc<GainState>,
    config: Mutex<StreamConfig>,
    state: AtomicCell<SessionState>,
    control: Mutex<ControlBlock>,
    restart_queued: AtomicBool,
    /// Monotonic session id; the join point between effect handles and
    /// the live stream. This session is its sole writer.
    epoch: AtomicU64,
    was_running_before_lock: AtomicBool,
    input_tap: Arc<WaveformTap>,
    output_tap: Arc<WaveformTap>,
    listener: Mutex<Option<ProcessingListener>>,
}

impl StreamSession {
    pub fn new(backend: Arc<dyn StreamBackend>, gain: Arc<GainState>) -> Self {
        Self {
            backend,
            gain,
            config: Mutex::new(StreamConfig::default()),
            state: AtomicCell::new(SessionState::Idle),
            control: Mutex::new(ControlBlock::default()),
            restart_queued: AtomicBool::new(false),
            epoch: AtomicU64::new(0),
            was_running_before_lock: AtomicBool::new(false),
            input_tap: Arc::new(WaveformTap::new()),
            output_tap: Arc::new(WaveformTap::new()),
            listener: Mutex::new(None),
        }
    }

    /// Start the session; a no-op success when already Running
    ///
    /// May block briefly on native resource acquisition. Must not be
    /// called from the audio thread.
    pub fn start(&self) -> Result<()> {
        let mut ctl = self.lock_control();
        self.start_locked(&mut ctl)
    }

    /// Stop the session and release all stream resources. Idempotent.
    pub fn stop(&self) {
        let mut ctl = self.lock_control();
        self.stop_locked(&mut ctl);
    }

    /// Bind a device selection (None follows the system default)
    ///
    /// While Running this performs one full stop-then-start restart; a
    /// failure to come back up leaves the session Idle and returns the
    /// error.
    pub fn set_device(
        &self,
        direction: DeviceDirection,
        descriptor: Option<DeviceDescriptor>,
    ) -> Result<()> {
        {
            let mut config = self.lock_config();
            match direction {
                DeviceDirection::Input => config.input_device = descriptor,
                DeviceDirection::Output => config.output_device = descriptor,
            }
        }
        self.restart_if_running()
    }

    /// Record running state on a screen-lock signal without stopping
    /// audio
    pub fn prepare_for_lock(&self) {
        let running = self.is_running();
        self.was_running_before_lock.store(running, Ordering::SeqCst);
        debug!(running, "prepared for screen lock; audio keeps running");
    }

    /// Restart after unlock if the session was running before the lock
    /// and the platform suspended it in between
    pub fn resume_from_lock(&self) -> Result<()> {
        if self.was_running_before_lock.load(Ordering::SeqCst) && !self.is_running() {
            info!("restarting audio after platform suspension");
            self.start()
        } else {
            Ok(())
        }
    }

    pub fn is_running(&self) -> bool {
        self.state.load() == SessionState::Running
    }

    pub fn state(&self) -> SessionState {
        self.state.load()
    }

    /// Copy of the current stream configuration
    pub fn current_config(&self) -> StreamConfig {
        self.lock_config().clone()
    }

    /// Id of the most recently started processing session
    pub fn session_id(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    pub fn set_processing_listener(&self, listener: Option<ProcessingListener>) {
        *self.lock_listener() = listener;
    }

    /// Subscribe to input-side waveform frames (pre-chain)
    pub fn input_frames(&self) -> Receiver<WaveFrame> {
        self.input_tap.subscribe()
    }

    /// Subscribe to output-side waveform frames (post-chain)
    pub fn output_frames(&self) -> Receiver<WaveFrame> {
        self.output_tap.subscribe()
    }

    /// Snapshot of the input-side amplitude history, oldest first
    pub fn input_waveform(&self) -> Vec<WaveFrame> {
        self.input_tap.snapshot()
    }

    /// Snapshot of the output-side amplitude history, oldest first
    pub fn output_waveform(&self) -> Vec<WaveFrame> {
        self.output_tap.snapshot()
    }

    /// Zero both waveform histories
    pub fn clear_waveforms(&self) {
        self.input_tap.clear();
        self.output_tap.clear();
    }

    fn start_locked(&self, ctl: &mut ControlBlock) -> Result<()> {
        if self.state.load() == SessionState::Running {
            debug!("start ignored, session already running");
            return Ok(());
        }
        self.state.store(SessionState::Configuring);

        let config = self.lock_config().clone();
        let streams = match self.backend.open(&config) {
            Ok(streams) => streams,
            Err(e) => {
                error!(backend = self.backend.name(), error = %e, "stream setup failed");
                self.state.store(SessionState::Idle);
                return Err(e);
            }
        };

        let session_id = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        let shutdown = Arc::new(AtomicBool::new(false));

        let worker = {
            let gain = Arc::clone(&self.gain);
            let input_tap = Arc::clone(&self.input_tap);
            let output_tap = Arc::clone(&self.output_tap);
            let shutdown = Arc::clone(&shutdown);
            let sample_rate = config.sample_rate;
            thread::Builder::new()
                .name("clarion-audio".to_string())
                .spawn(move || {
                    process_loop(
                        streams, gain, input_tap, output_tap, shutdown, session_id, sample_rate,
                    )
                })
        };
        let worker = match worker {
            Ok(handle) => handle,
            // The unspawned closure drops here, releasing the streams
            Err(e) => {
                error!(error = %e, "failed to spawn audio worker");
                self.state.store(SessionState::Idle);
                return Err(AudioError::StreamSetup(format!(
                    "failed to spawn audio worker: {e}"
                )));
            }
        };

        ctl.worker = Some(worker);
        ctl.shutdown = shutdown;
        self.state.store(SessionState::Running);
        info!(
            session_id,
            backend = self.backend.name(),
            "audio session running"
        );
        self.notify_listener(true);
        Ok(())
    }

    fn stop_locked(&self, ctl: &mut ControlBlock) {
        let worker = match ctl.worker.take() {
            Some(worker) => worker,
            // Covers both plain idempotent stop and cleanup after a
            // failed start
            None => {
                self.state.store(SessionState::Idle);
                return;
            }
        };

        self.state.store(SessionState::Stopping);
        ctl.shutdown.store(true, Ordering::Release);
        if worker.join().is_err() {
            error!("audio worker panicked");
        }
        self.state.store(SessionState::Idle);
        info!("audio session stopped");
        self.notify_listener(false);
    }

    /// Restart while Running, coalescing concurrent requests
    ///
    /// The queued flag is set before taking the control lock, so a
    /// request arriving mid-restart is folded into the holder's loop
    /// instead of stacking a second stop/start cycle.
    fn restart_if_running(&self) -> Result<()> {
        self.restart_queued.store(true, Ordering::SeqCst);
        let mut ctl = self.lock_control();
        let mut result = Ok(());
        while self.restart_queued.swap(false, Ordering::SeqCst) {
            if self.state.load() != SessionState::Running {
                // Not running: the new config applies on the next start
                continue;
            }
            self.stop_locked(&mut ctl);
            result = self.start_locked(&mut ctl);
        }
        result
    }

    fn notify_listener(&self, running: bool) {
        let listener = self.lock_listener().clone();
        if let Some(listener) = listener {
            listener(running);
        }
    }

    fn lock_control(&self) -> MutexGuard<'_, ControlBlock> {
        match self.control.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn lock_config(&self) -> MutexGuard<'_, StreamConfig> {
        match self.config.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn lock_listener(&self) -> MutexGuard<'_, Option<ProcessingListener>> {
        match self.listener.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Audio-thread body: pull, process, push until shutdown
///
/// The full gain state is applied to the chain before the first frame
/// is emitted. Per-frame failures (render queue full) are logged and
/// skipped; only capture-side disconnection ends the loop early.
fn process_loop(
    streams: ActiveStreams,
    gain: Arc<GainState>,
    input_tap: Arc<WaveformTap>,
    output_tap: Arc<WaveformTap>,
    shutdown: Arc<AtomicBool>,
    session_id: u64,
    sample_rate: u32,
) {
    let mut chain = SignalChain::new(sample_rate);
    chain.attach(session_id);

    let mut snapshot = GainSnapshot::default();
    gain.refresh(&mut snapshot);

    debug!(session_id, "audio worker started");
    while !shutdown.load(Ordering::Acquire) {
        match streams.capture.recv_timeout(POLL_INTERVAL) {
            Ok(mut frame) => {
                gain.refresh(&mut snapshot);
                input_tap.publish(&frame);
                chain.process(&mut frame, &snapshot);
                output_tap.publish(&frame);
                if streams.render.try_send(frame).is_err() {
                    trace!("render queue full, frame dropped");
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                error!(session_id, "capture stream disconnected");
                break;
            }
        }
    }

    chain.detach();
    streams.close();
    debug!(session_id, "audio worker exited");
}
