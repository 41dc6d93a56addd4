use rustfft::num_complex::Complex64;
use rustfft::FftPlanner;

use crate::constants::SECONDS_PER_WEEK;

/// GPS-week wrap helper (§9): normalizes a difference of two time-of-week values into
/// `(-SECONDS_PER_WEEK/2, SECONDS_PER_WEEK/2]`. Must be applied to every subtraction of
/// two TOW-derived values before any further arithmetic.
pub fn wrap_week_seconds(x: f64) -> f64 {
    if x > SECONDS_PER_WEEK / 2.0 {
        x - SECONDS_PER_WEEK
    } else if x < -SECONDS_PER_WEEK / 2.0 {
        x + SECONDS_PER_WEEK
    } else {
        x
    }
}

/// In-place forward FFT.
pub fn fft(planner: &mut FftPlanner<f64>, data: &mut [Complex64]) {
    let fft = planner.plan_fft_forward(data.len());
    fft.process(data);
}

/// In-place inverse FFT. rustfft's inverse is unnormalized; divides by `len` to match
/// the usual IFFT convention.
pub fn ifft(planner: &mut FftPlanner<f64>, data: &mut [Complex64]) {
    let fft = planner.plan_fft_inverse(data.len());
    fft.process(data);
    let n = data.len() as f64;
    for v in data.iter_mut() {
        *v /= n;
    }
}

/// Cross-correlates `signal` against `replica_fft` (the replica's FFT, precomputed once)
/// via `IFFT(FFT(signal) * conj(FFT(replica)))`. Used by the acquisition search (§4.1).
pub fn cross_correlate(
    planner: &mut FftPlanner<f64>,
    signal: &[Complex64],
    replica_fft: &[Complex64],
) -> Vec<Complex64> {
    assert_eq!(signal.len(), replica_fft.len());
    let mut signal_fft = signal.to_vec();
    fft(planner, &mut signal_fft);
    let mut product: Vec<Complex64> = signal_fft
        .iter()
        .zip(replica_fft.iter())
        .map(|(s, r)| s * r.conj())
        .collect();
    ifft(planner, &mut product);
    product
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn wrap_is_idempotent_on_full_week_shift() {
        for x in [-700000.0, -302400.0, -1.0, 0.0, 1.0, 302400.0, 700000.0] {
            assert_relative_eq!(
                wrap_week_seconds(x + SECONDS_PER_WEEK),
                wrap_week_seconds(x),
                epsilon = 1e-9
            );
        }
    }

    #[test]
    fn wrap_leaves_small_values_unchanged() {
        assert_relative_eq!(wrap_week_seconds(100.0), 100.0);
        assert_relative_eq!(wrap_week_seconds(-100.0), -100.0);
    }
}
