//! # Pitch Detection Module
//!
//! Estimates the fundamental frequency of one analysis window using the
//! normalized square difference function (NSDF) of the McLeod pitch method.
//!
//! ## Pipeline
//! - Energy gate: windows quieter than `min_rms` are silence
//! - FFT autocorrelation, normalized per lag into `[-1, 1]`
//! - Key-maximum peak picking to avoid octave errors
//! - Parabolic interpolation for sub-sample lag accuracy
//! - Clarity gate: weakly periodic windows are rejected
//!
//! The estimator keeps no signal state between windows.

use serde::{Deserialize, Serialize};

use crate::fft::{self, Autocorrelator};

/// Default RMS below which a window counts as silence.
pub const DEFAULT_MIN_RMS: f32 = 0.01;

/// Default NSDF peak height below which a window counts as unpitched.
pub const DEFAULT_MIN_CLARITY: f32 = 0.3;

/// Key maxima at least this fraction of the highest one are candidates.
const PEAK_CUTOFF: f32 = 0.9;

/// A frequency estimate for one analysis window.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PitchSample {
    /// Detected frequency in Hz, `None` when a gate rejected the window.
    pub frequency_hz: Option<f32>,
    /// How periodic the window looked, `0.0..=1.0`.
    pub clarity: f32,
}

impl PitchSample {
    /// The result for silence, noise or an unusable window.
    pub const SILENT: PitchSample = PitchSample {
        frequency_hz: None,
        clarity: 0.0,
    };

    pub fn is_pitched(&self) -> bool {
        self.frequency_hz.is_some()
    }
}

/// Gate thresholds of the estimator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorGates {
    pub min_rms: f32,
    pub min_clarity: f32,
}

impl Default for EstimatorGates {
    fn default() -> Self {
        Self {
            min_rms: DEFAULT_MIN_RMS,
            min_clarity: DEFAULT_MIN_CLARITY,
        }
    }
}

/// McLeod-style pitch estimator.
///
/// Holds only reusable scratch memory and cached FFT plans; every call to
/// [`PitchEstimator::estimate`] depends on nothing but its arguments.
#[derive(Debug, Default)]
pub struct PitchEstimator {
    gates: EstimatorGates,
    autocorrelator: Autocorrelator,
    centered: Vec<f32>,
    nsdf: Vec<f32>,
}

impl PitchEstimator {
    pub fn new(gates: EstimatorGates) -> Self {
        Self {
            gates,
            ..Self::default()
        }
    }

    /// Estimates the pitch of `signal` sampled at `sample_rate` Hz.
    ///
    /// # Returns
    /// * `frequency_hz: Some(_)` - both gates passed
    /// * `frequency_hz: None` - too short, non-finite, too quiet or not
    ///   periodic enough; `clarity` still reports the best peak found
    pub fn estimate(&mut self, signal: &[f32], sample_rate: u32) -> PitchSample {
        let n = signal.len();
        if n < 2 || sample_rate == 0 {
            return PitchSample::SILENT;
        }
        if signal.iter().any(|s| !s.is_finite()) {
            tracing::trace!("Rejecting window with non-finite samples");
            return PitchSample::SILENT;
        }

        // --- Noise Gate ---
        let rms = (signal.iter().map(|&s| s * s).sum::<f32>() / n as f32).sqrt();
        if rms < self.gates.min_rms {
            return PitchSample::SILENT;
        }

        self.centered.clear();
        self.centered.extend_from_slice(signal);
        fft::remove_dc_offset(&mut self.centered);

        let max_lag = n / 2;
        self.nsdf.resize(max_lag, 0.0);
        self.autocorrelator
            .autocorrelate(&self.centered, &mut self.nsdf);
        normalize(&self.centered, &mut self.nsdf);

        let Some((lag, clarity)) = pick_peak(&self.nsdf) else {
            return PitchSample::SILENT;
        };
        let clarity = clarity.clamp(0.0, 1.0);

        if clarity < self.gates.min_clarity {
            return PitchSample {
                frequency_hz: None,
                clarity,
            };
        }

        let frequency = sample_rate as f32 / lag;
        if frequency.is_finite() && frequency > 0.0 {
            PitchSample {
                frequency_hz: Some(frequency),
                clarity,
            }
        } else {
            PitchSample::SILENT
        }
    }
}

/// Turns autocorrelation values into the NSDF in place.
///
/// `m(τ) = Σ_{j<n-τ} x[j]² + x[j+τ]²` is updated incrementally from
/// `m(0) = 2·Σx²`.
fn normalize(signal: &[f32], values: &mut [f32]) {
    let n = signal.len();
    let mut m: f32 = 2.0 * signal.iter().map(|s| s * s).sum::<f32>();
    for (lag, value) in values.iter_mut().enumerate() {
        if lag > 0 {
            let head = signal[lag - 1];
            let tail = signal[n - lag];
            m -= head * head + tail * tail;
        }
        *value = if m > f32::EPSILON { 2.0 * *value / m } else { 0.0 };
    }
}

/// Finds the lag of the chosen key maximum.
///
/// A key maximum is the highest point between a positive-going zero
/// crossing and the next negative-going one. The first key maximum that
/// reaches [`PEAK_CUTOFF`] of the highest is chosen.
///
/// Returns the interpolated lag and peak height.
fn pick_peak(nsdf: &[f32]) -> Option<(f32, f32)> {
    let len = nsdf.len();
    if len < 3 {
        return None;
    }

    // Skip the lag-zero lobe.
    let mut lag = 1;
    while lag < len && nsdf[lag] > 0.0 {
        lag += 1;
    }

    let mut key_maxima: Vec<usize> = Vec::new();
    let mut current: Option<usize> = None;
    while lag < len {
        let value = nsdf[lag];
        if value > 0.0 {
            match current {
                Some(best) if nsdf[best] >= value => {}
                _ => current = Some(lag),
            }
        } else if let Some(best) = current.take() {
            key_maxima.push(best);
        }
        lag += 1;
    }
    // A lobe still open at the end of the window only counts if it peaked
    // before the last lag.
    if let Some(best) = current {
        if best < len - 1 {
            key_maxima.push(best);
        }
    }

    let highest = key_maxima
        .iter()
        .map(|&i| nsdf[i])
        .fold(f32::NEG_INFINITY, f32::max);
    if !highest.is_finite() || highest <= 0.0 {
        return None;
    }

    let chosen = *key_maxima
        .iter()
        .find(|&&i| nsdf[i] >= PEAK_CUTOFF * highest)?;
    Some(interpolate(nsdf, chosen))
}

/// Parabolic interpolation around index `i`.
fn interpolate(values: &[f32], i: usize) -> (f32, f32) {
    if i == 0 || i + 1 >= values.len() {
        return (i as f32, values[i]);
    }
    let (y1, y2, y3) = (values[i - 1], values[i], values[i + 1]);
    let denominator = y1 - 2.0 * y2 + y3;
    if denominator.abs() < f32::EPSILON {
        return (i as f32, y2);
    }
    let shift = 0.5 * (y1 - y3) / denominator;
    let height = y2 - 0.25 * (y1 - y3) * shift;
    (i as f32 + shift, height)
}
