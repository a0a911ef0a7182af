//! # Fast Fourier Transform (FFT) Module
//!
//! FFT-backed autocorrelation for the pitch estimator, computed through the
//! power spectrum (Wiener–Khinchin) in O(N log N).

use rustfft::{FftPlanner, num_complex::Complex};

/// Removes the DC offset from a signal by making its average value zero.
///
/// A constant offset would otherwise dominate every lag of the
/// autocorrelation.
pub fn remove_dc_offset(signal: &mut [f32]) {
    let len = signal.len();
    if len == 0 {
        return;
    }
    let avg = signal.iter().sum::<f32>() / len as f32;
    if avg.abs() > 1e-6 {
        for sample in signal.iter_mut() {
            *sample -= avg;
        }
    }
}

/// Computes linear (non-circular) autocorrelations with a cached planner.
///
/// Plans are cached inside [`FftPlanner`], so repeated calls with the same
/// window size only pay for the transforms themselves.
pub struct Autocorrelator {
    planner: FftPlanner<f32>,
    scratch: Vec<Complex<f32>>,
}

impl Default for Autocorrelator {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Autocorrelator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Autocorrelator").finish_non_exhaustive()
    }
}

impl Autocorrelator {
    pub fn new() -> Self {
        Self {
            planner: FftPlanner::new(),
            scratch: Vec::new(),
        }
    }

    /// Writes `r(τ) = Σ x[j]·x[j+τ]` for `τ in 0..out.len()` into `out`.
    ///
    /// The input is zero-padded to at least twice its length so the
    /// circular correlation of the FFT does not wrap around.
    pub fn autocorrelate(&mut self, signal: &[f32], out: &mut [f32]) {
        let n = signal.len();
        if n == 0 {
            out.fill(0.0);
            return;
        }

        let fft_len = (2 * n).next_power_of_two();
        let forward = self.planner.plan_fft_forward(fft_len);
        let inverse = self.planner.plan_fft_inverse(fft_len);

        self.scratch.clear();
        self.scratch
            .extend(signal.iter().map(|&sample| Complex { re: sample, im: 0.0 }));
        self.scratch.resize(fft_len, Complex { re: 0.0, im: 0.0 });

        forward.process(&mut self.scratch);
        for bin in self.scratch.iter_mut() {
            *bin = Complex { re: bin.norm_sqr(), im: 0.0 };
        }
        inverse.process(&mut self.scratch);

        // rustfft does not normalize the inverse transform.
        let scale = 1.0 / fft_len as f32;
        for (lag, value) in out.iter_mut().enumerate() {
            *value = if lag < n { self.scratch[lag].re * scale } else { 0.0 };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn direct(signal: &[f32], lag: usize) -> f32 {
        signal
            .iter()
            .zip(signal.iter().skip(lag))
            .map(|(a, b)| a * b)
            .sum()
    }

    #[test]
    fn matches_the_direct_sum() {
        let signal: Vec<f32> = (0..300).map(|i| ((i * 7 % 13) as f32 - 6.0) / 6.0).collect();
        let mut out = vec![0.0; 150];
        Autocorrelator::new().autocorrelate(&signal, &mut out);

        for lag in [0, 1, 5, 42, 149] {
            let expected = direct(&signal, lag);
            assert!(
                (out[lag] - expected).abs() < 1e-2 * expected.abs().max(1.0),
                "lag {lag}: {} vs {expected}",
                out[lag]
            );
        }
    }

    #[test]
    fn dc_offset_is_removed() {
        let mut signal = vec![1.5, 2.5, 1.5, 2.5];
        remove_dc_offset(&mut signal);
        assert_eq!(signal, vec![-0.5, 0.5, -0.5, 0.5]);
    }

    #[test]
    fn empty_signal_yields_zeros() {
        let mut out = vec![1.0; 4];
        Autocorrelator::new().autocorrelate(&[], &mut out);
        assert_eq!(out, vec![0.0; 4]);
    }
}
