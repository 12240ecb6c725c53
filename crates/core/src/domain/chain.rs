//! Per-frame signal chain of the hearing-assist pipeline
//!
//! One call per captured frame, inside the audio thread. The chain
//! applies the gain stages in a fixed order — input volume,
//! amplification, 8-band equalizer, optional noise suppression, output
//! volume — and hard-clips once at the end. Processing is in-place on
//! f32 buffers normalized to [-1.0, 1.0], with no allocation on the
//! steady-state path.
//!
//! The equalizer and suppressor are adaptive effect handles bound to a
//! processing session id; they are rebuilt on every stream restart.

use crate::domain::audio::{AudioError, Result};
use crate::domain::gain::{GainSnapshot, BAND_COUNT, MAX_BAND_GAIN, MIN_BAND_GAIN};
use tracing::{debug, warn};

/// Saturation bound of the processing path; samples are clipped to
/// ±FULL_SCALE once after all gain stages
pub const FULL_SCALE: f32 = 1.0;

/// Equalizer band center frequencies in Hz
///
/// The lowest band is a shelf below its corner, the highest a shelf
/// above it, the rest are peaking filters.
pub const BAND_FREQS: [f32; BAND_COUNT] = [
    60.0, 230.0, 910.0, 1_800.0, 3_600.0, 7_200.0, 14_000.0, 20_000.0,
];

// ============================================================================
// BIQUAD FILTER (Low-level IIR filter for EQ)
// ============================================================================

/// Biquad filter coefficients
///
/// Direct Form I implementation for numerical stability. Coefficients
/// are pre-computed to avoid per-sample calculations.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BiquadCoeffs {
    pub b0: f32,
    pub b1: f32,
    pub b2: f32,
    /// Denominator coefficients (a0 is normalized to 1.0)
    pub a1: f32,
    pub a2: f32,
}

impl Default for BiquadCoeffs {
    fn default() -> Self {
        // Unity gain (no filtering)
        Self {
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
        }
    }
}

impl BiquadCoeffs {
    /// Low shelf: boosts or cuts frequencies below the corner frequency
    #[must_use]
    pub fn low_shelf(sample_rate: f32, freq: f32, gain_db: f32, q: f32) -> Self {
        let gain_db = gain_db.clamp(MIN_BAND_GAIN as f32, MAX_BAND_GAIN as f32);
        let a = 10.0_f32.powf(gain_db / 40.0);
        let w0 = 2.0 * std::f32::consts::PI * freq / sample_rate;
        let cos_w0 = w0.cos();
        let sin_w0 = w0.sin();
        let alpha = sin_w0 / (2.0 * q);

        let b0 = a * ((a + 1.0) - (a - 1.0) * cos_w0 + 2.0 * a.sqrt() * alpha);
        let b1 = 2.0 * a * ((a - 1.0) - (a + 1.0) * cos_w0);
        let b2 = a * ((a + 1.0) - (a - 1.0) * cos_w0 - 2.0 * a.sqrt() * alpha);

        let a0 = (a + 1.0) + (a - 1.0) * cos_w0 + 2.0 * a.sqrt() * alpha;
        let a1 = -2.0 * ((a - 1.0) + (a + 1.0) * cos_w0);
        let a2 = (a + 1.0) + (a - 1.0) * cos_w0 - 2.0 * a.sqrt() * alpha;

        Self {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
        }
    }

    /// High shelf: boosts or cuts frequencies above the corner frequency
    #[must_use]
    pub fn high_shelf(sample_rate: f32, freq: f32, gain_db: f32, q: f32) -> Self {
        let gain_db = gain_db.clamp(MIN_BAND_GAIN as f32, MAX_BAND_GAIN as f32);
        let a = 10.0_f32.powf(gain_db / 40.0);
        let w0 = 2.0 * std::f32::consts::PI * freq / sample_rate;
        let cos_w0 = w0.cos();
        let sin_w0 = w0.sin();
        let alpha = sin_w0 / (2.0 * q);

        let b0 = a * ((a + 1.0) + (a - 1.0) * cos_w0 + 2.0 * a.sqrt() * alpha);
        let b1 = -2.0 * a * ((a - 1.0) + (a + 1.0) * cos_w0);
        let b2 = a * ((a + 1.0) + (a - 1.0) * cos_w0 - 2.0 * a.sqrt() * alpha);

        let a0 = (a + 1.0) - (a - 1.0) * cos_w0 + 2.0 * a.sqrt() * alpha;
        let a1 = 2.0 * ((a - 1.0) - (a + 1.0) * cos_w0);
        let a2 = (a + 1.0) - (a - 1.0) * cos_w0 - 2.0 * a.sqrt() * alpha;

        Self {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
        }
    }

    /// Peaking EQ: boosts or cuts frequencies around a center frequency
    #[must_use]
    pub fn peaking(sample_rate: f32, freq: f32, gain_db: f32, q: f32) -> Self {
        let gain_db = gain_db.clamp(MIN_BAND_GAIN as f32, MAX_BAND_GAIN as f32);
        let a = 10.0_f32.powf(gain_db / 40.0);
        let w0 = 2.0 * std::f32::consts::PI * freq / sample_rate;
        let cos_w0 = w0.cos();
        let sin_w0 = w0.sin();
        let alpha = sin_w0 / (2.0 * q);

        let b0 = 1.0 + alpha * a;
        let b1 = -2.0 * cos_w0;
        let b2 = 1.0 - alpha * a;

        let a0 = 1.0 + alpha / a;
        let a1 = -2.0 * cos_w0;
        let a2 = 1.0 - alpha / a;

        Self {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
        }
    }
}

/// Stateful mono biquad filter using Direct Form I
#[derive(Debug, Clone)]
pub struct BiquadFilter {
    coeffs: BiquadCoeffs,
    // Previous input samples (x[n-1], x[n-2])
    x1: f32,
    x2: f32,
    // Previous output samples (y[n-1], y[n-2])
    y1: f32,
    y2: f32,
}

impl BiquadFilter {
    pub fn new(coeffs: BiquadCoeffs) -> Self {
        Self {
            coeffs,
            x1: 0.0,
            x2: 0.0,
            y1: 0.0,
            y2: 0.0,
        }
    }

    /// Update filter coefficients; safe to call between frames
    pub fn set_coeffs(&mut self, coeffs: BiquadCoeffs) {
        self.coeffs = coeffs;
    }

    #[inline]
    fn process_sample(&mut self, x: f32) -> f32 {
        // Direct Form I: y[n] = b0*x[n] + b1*x[n-1] + b2*x[n-2]
        //                        - a1*y[n-1] - a2*y[n-2]
        let y = self.coeffs.b0 * x
            + self.coeffs.b1 * self.x1
            + self.coeffs.b2 * self.x2
            - self.coeffs.a1 * self.y1
            - self.coeffs.a2 * self.y2;

        self.x2 = self.x1;
        self.x1 = x;
        self.y2 = self.y1;
        self.y1 = y;

        y
    }

    pub fn process(&mut self, buffer: &mut [f32]) {
        for sample in buffer.iter_mut() {
            *sample = self.process_sample(*sample);
        }
    }

    pub fn reset(&mut self) {
        self.x1 = 0.0;
        self.x2 = 0.0;
        self.y1 = 0.0;
        self.y2 = 0.0;
    }
}

// ============================================================================
// 8-BAND EQUALIZER BANK
// ============================================================================

/// Cascade of 8 per-band IIR filters over the mono path
///
/// Band 0 is a low shelf, band 7 a high shelf, bands 1-6 peaking
/// filters at the centers in [`BAND_FREQS`].
#[derive(Debug, Clone)]
pub struct EqualizerBank {
    sample_rate: f32,
    filters: [BiquadFilter; BAND_COUNT],
    gains: [i16; BAND_COUNT],
}

impl EqualizerBank {
    const SHELF_Q: f32 = 0.707;
    const PEAK_Q: f32 = 1.1;

    /// Build a neutral bank for the given sample rate
    ///
    /// Fails with `EffectUnavailable` when the rate cannot host all band
    /// frequencies (every center must sit below Nyquist).
    pub fn new(sample_rate: u32) -> Result<Self> {
        let nyquist = sample_rate as f32 / 2.0;
        if sample_rate == 0 || BAND_FREQS[BAND_COUNT - 1] >= nyquist {
            return Err(AudioError::EffectUnavailable(format!(
                "equalizer bands exceed Nyquist at {} Hz",
                sample_rate
            )));
        }

        Ok(Self {
            sample_rate: sample_rate as f32,
            filters: std::array::from_fn(|_| BiquadFilter::new(BiquadCoeffs::default())),
            gains: [0; BAND_COUNT],
        })
    }

    /// Apply a full band vector, recomputing all coefficients
    pub fn set_band_gains(&mut self, gains: &[i16; BAND_COUNT]) {
        self.gains = *gains;
        for (band, filter) in self.filters.iter_mut().enumerate() {
            let gain_db = gains[band] as f32;
            let freq = BAND_FREQS[band];
            let coeffs = if band == 0 {
                BiquadCoeffs::low_shelf(self.sample_rate, freq, gain_db, Self::SHELF_Q)
            } else if band == BAND_COUNT - 1 {
                BiquadCoeffs::high_shelf(self.sample_rate, freq, gain_db, Self::SHELF_Q)
            } else {
                BiquadCoeffs::peaking(self.sample_rate, freq, gain_db, Self::PEAK_Q)
            };
            filter.set_coeffs(coeffs);
        }
    }

    pub fn band_gains(&self) -> [i16; BAND_COUNT] {
        self.gains
    }

    pub fn process(&mut self, buffer: &mut [f32]) {
        for filter in self.filters.iter_mut() {
            filter.process(buffer);
        }
    }

    pub fn reset(&mut self) {
        for filter in self.filters.iter_mut() {
            filter.reset();
        }
    }
}

// ============================================================================
// NOISE SUPPRESSOR
// ============================================================================

/// Adaptive noise suppressor for the mono path
///
/// An envelope follower opens the gate for signal above the noise
/// threshold and attenuates what falls below it; the gain transition is
/// smoothed with separate attack and release time constants to avoid
/// audible pumping.
#[derive(Debug, Clone)]
pub struct NoiseSuppressor {
    threshold: f32,
    attenuation: f32,
    attack_coeff: f32,
    release_coeff: f32,
    envelope: f32,
    gain: f32,
}

impl NoiseSuppressor {
    /// Amplitude below which the signal is treated as noise
    const DEFAULT_THRESHOLD: f32 = 0.02;
    /// Gain applied to sub-threshold signal
    const DEFAULT_ATTENUATION: f32 = 0.5;
    const ATTACK_SEC: f32 = 0.001;
    const RELEASE_SEC: f32 = 0.05;

    pub fn new(sample_rate: u32) -> Self {
        let sr = sample_rate as f32;
        Self {
            threshold: Self::DEFAULT_THRESHOLD,
            attenuation: Self::DEFAULT_ATTENUATION,
            attack_coeff: (-1.0 / (Self::ATTACK_SEC * sr)).exp(),
            release_coeff: (-1.0 / (Self::RELEASE_SEC * sr)).exp(),
            envelope: 0.0,
            gain: 1.0,
        }
    }

    pub fn process(&mut self, buffer: &mut [f32]) {
        for sample in buffer.iter_mut() {
            let level = sample.abs();

            // Envelope rises with the attack constant, falls with release
            let env_coeff = if level > self.envelope {
                self.attack_coeff
            } else {
                self.release_coeff
            };
            self.envelope = env_coeff * self.envelope + (1.0 - env_coeff) * level;

            let target = if self.envelope > self.threshold {
                1.0
            } else {
                self.attenuation
            };
            let gain_coeff = if target > self.gain {
                self.attack_coeff
            } else {
                self.release_coeff
            };
            self.gain = gain_coeff * self.gain + (1.0 - gain_coeff) * target;

            *sample *= self.gain;
        }
    }

    pub fn reset(&mut self) {
        self.envelope = 0.0;
        self.gain = 1.0;
    }
}

// ============================================================================
// SIGNAL CHAIN
// ============================================================================

/// The fixed-order transform applied to every captured frame
///
/// Owns the adaptive effect handles (equalizer bank, noise suppressor)
/// bound to the processing session they were attached against. Handles
/// are rebuilt whenever the session id changes, i.e. on every stream
/// restart.
pub struct SignalChain {
    sample_rate: u32,
    session: Option<u64>,
    equalizer: Option<EqualizerBank>,
    suppressor: Option<NoiseSuppressor>,
    eq_version: u64,
}

impl SignalChain {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            session: None,
            equalizer: None,
            suppressor: None,
            eq_version: 0,
        }
    }

    /// Bind the effect handles to a processing session
    ///
    /// Replaces any handles from a previous session. A failed equalizer
    /// build is logged and the chain runs without that stage.
    pub fn attach(&mut self, session_id: u64) {
        self.detach();
        self.session = Some(session_id);
        self.eq_version = 0;
        match EqualizerBank::new(self.sample_rate) {
            Ok(bank) => self.equalizer = Some(bank),
            Err(e) => warn!(session_id, error = %e, "running without equalizer stage"),
        }
        debug!(session_id, "signal chain attached");
    }

    /// Release the effect handles
    pub fn detach(&mut self) {
        if let Some(session_id) = self.session.take() {
            debug!(session_id, "signal chain detached");
        }
        self.equalizer = None;
        self.suppressor = None;
    }

    pub fn session(&self) -> Option<u64> {
        self.session
    }

    /// Process one frame in-place
    ///
    /// Stage order: input volume, amplification, equalizer, noise
    /// suppression, output volume, then a single hard clip to
    /// ±[`FULL_SCALE`].
    pub fn process(&mut self, buffer: &mut [f32], gain: &GainSnapshot) {
        let input_scale = gain.input_volume as f32 / 100.0;
        for sample in buffer.iter_mut() {
            *sample *= input_scale;
        }

        for sample in buffer.iter_mut() {
            *sample *= gain.amplification;
        }

        if let Some(eq) = self.equalizer.as_mut() {
            if gain.eq_version != self.eq_version {
                eq.set_band_gains(&gain.bands);
                self.eq_version = gain.eq_version;
            }
            eq.process(buffer);
        }

        // The suppressor instance follows the flag lazily; toggling is
        // idempotent and only allocates state on the enabling edge
        if gain.noise_reduction {
            if self.suppressor.is_none() {
                self.suppressor = Some(NoiseSuppressor::new(self.sample_rate));
                debug!("noise suppressor engaged");
            }
            if let Some(suppressor) = self.suppressor.as_mut() {
                suppressor.process(buffer);
            }
        } else if self.suppressor.take().is_some() {
            debug!("noise suppressor released");
        }

        let output_scale = gain.output_volume as f32 / 100.0;
        for sample in buffer.iter_mut() {
            *sample *= output_scale;
        }

        for sample in buffer.iter_mut() {
            *sample = sample.clamp(-FULL_SCALE, FULL_SCALE);
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
