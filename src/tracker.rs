//! Per-satellite code (DLL) and carrier (Costas) tracking loop (§4.2).

use rustfft::num_complex::Complex64;

use crate::constants::{
    COSTAS_FREQUENCY_GAIN, COSTAS_PHASE_GAIN, DLL_CODE_GAIN, L1_FREQUENCY_HZ, PI,
    SAMPLES_PER_MS, SAMPLE_RATE_HZ, TRACKER_DT_SECONDS, TRACKER_HISTORY_LEN,
};
use crate::gold_code::PRN_CODES;
use crate::ring::RingBuffer;
use crate::types::{Acquisition, Pseudosymbol, SampleBlock, SatelliteId, Side};

/// What the Tracker reports to World after each 1 ms step (§4.2 step 3).
pub struct PrnEdgeReport {
    pub satellite_id: SatelliteId,
    /// How much to add to `prn_count` this ms: `0`, `1`, or `2` (§4.2).
    pub prn_count_delta: i64,
    pub side: Side,
    pub trailing_edge_timestamp: chrono::DateTime<chrono::Utc>,
}

/// Output of one Tracker step.
pub struct TrackerStep {
    pub pseudosymbol: Pseudosymbol,
    pub edge: PrnEdgeReport,
}

pub struct Tracker {
    satellite_id: SatelliteId,

    carrier_frequency_shift: f64,
    carrier_phase_shift: f64,
    prn_code_phase_shift: f64,

    /// Latched only on wraps (§3, §9): an ms with no wrap must not change this. Seeded
    /// from the acquisition's starting code phase rather than an arbitrary default.
    side: Side,

    pub carrier_frequency_history: RingBuffer<f64>,
    pub carrier_phase_history: RingBuffer<f64>,
    pub prn_code_phase_history: RingBuffer<f64>,
    pub correlation_history: RingBuffer<Complex64>,
}

impl Tracker {
    pub fn new(acquisition: &Acquisition) -> Self {
        Self {
            satellite_id: acquisition.satellite_id,
            carrier_frequency_shift: acquisition.carrier_frequency_shift,
            carrier_phase_shift: acquisition.carrier_phase_shift,
            prn_code_phase_shift: acquisition.prn_code_phase_shift,
            // Derived from the acquisition's starting code phase, not defaulted: getting
            // this wrong before the first wrap introduces a 1 ms (~300 km) error in the
            // prn_count World promotes with (§4.6).
            side: initial_side(acquisition.prn_code_phase_shift),
            carrier_frequency_history: RingBuffer::new(TRACKER_HISTORY_LEN),
            carrier_phase_history: RingBuffer::new(TRACKER_HISTORY_LEN),
            prn_code_phase_history: RingBuffer::new(TRACKER_HISTORY_LEN),
            correlation_history: RingBuffer::new(TRACKER_HISTORY_LEN),
        }
    }

    pub fn satellite_id(&self) -> SatelliteId {
        self.satellite_id
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn carrier_frequency_shift(&self) -> f64 {
        self.carrier_frequency_shift
    }

    pub fn prn_code_phase_shift(&self) -> f64 {
        self.prn_code_phase_shift
    }

    /// Runs one 1 ms step. Order within the step matters and mirrors §4.2 exactly:
    /// carrier wipeoff, then DLL (which determines the pseudosymbol-producing prompt
    /// correlation), then the Costas loop update (frequency before phase, §9).
    pub fn step(&mut self, block: &SampleBlock) -> TrackerStep {
        let prn = &PRN_CODES[&self.satellite_id];
        let n = SAMPLES_PER_MS;

        // 1. Carrier wipeoff.
        let mut wiped = vec![Complex64::new(0.0, 0.0); n];
        for (k, s) in block.samples.iter().enumerate() {
            let t_k = k as f64 / SAMPLE_RATE_HZ;
            let rot = Complex64::new(
                0.0,
                -(2.0 * PI * self.carrier_frequency_shift * t_k + self.carrier_phase_shift),
            )
            .exp();
            wiped[k] = s * rot;
        }

        // 2. DLL.
        let floor_phase = self.prn_code_phase_shift.floor() as i64;
        let early_shift = floor_phase - 1;
        let late_shift = floor_phase + 1;

        let e = correlate_shifted(&wiped, &prn.upsampled_bipolar, early_shift);
        let l = correlate_shifted(&wiped, &prn.upsampled_bipolar, late_shift);
        let p = correlate_shifted(&wiped, &prn.upsampled_bipolar, floor_phase);

        let discriminator = (e.norm_sqr() - l.norm_sqr()) / 2.0;
        let doppler_code_stretch = n as f64 * self.carrier_frequency_shift / L1_FREQUENCY_HZ;

        self.prn_code_phase_shift -=
            discriminator * DLL_CODE_GAIN + doppler_code_stretch;

        let (wrapped_phase, wrap_side) = wrap_code_phase(self.prn_code_phase_shift, n as f64);
        self.prn_code_phase_shift = wrapped_phase;

        let prn_count_delta = match wrap_side {
            None => 1,
            Some(Side::Left) => 2,
            Some(Side::Right) => 0,
        };
        if let Some(side) = wrap_side {
            self.side = side;
        }
        let reported_side = self.side;

        let trailing_edge_timestamp = block.start_timestamp
            + chrono::Duration::nanoseconds(
                (self.prn_code_phase_shift / (n as f64 * 1000.0) * 1e9) as i64,
            );

        // 3. Pseudosymbol.
        let pseudosymbol: Pseudosymbol = if p.re >= 0.0 { 1 } else { -1 };

        // 4. Costas loop. Order matters: frequency update uses the *old* phase error,
        // then the phase update uses the *already updated* frequency (§9).
        let p_norm = p / (p.norm() + 1e-8);
        let epsilon = if p_norm.re == 0.0 {
            0.0
        } else {
            (p_norm.im / p_norm.re).atan()
        };
        self.carrier_frequency_shift += COSTAS_FREQUENCY_GAIN * epsilon * TRACKER_DT_SECONDS;
        self.carrier_phase_shift = (self.carrier_phase_shift
            + (COSTAS_PHASE_GAIN * epsilon + 2.0 * PI * self.carrier_frequency_shift)
                * TRACKER_DT_SECONDS)
            .rem_euclid(2.0 * PI);

        self.carrier_frequency_history.push(self.carrier_frequency_shift);
        self.carrier_phase_history.push(self.carrier_phase_shift);
        self.prn_code_phase_history.push(self.prn_code_phase_shift);
        self.correlation_history.push(p);

        TrackerStep {
            pseudosymbol,
            edge: PrnEdgeReport {
                satellite_id: self.satellite_id,
                prn_count_delta,
                side: reported_side,
                trailing_edge_timestamp,
            },
        }
    }
}

/// Dot-products `wiped` with a circular shift of `replica` by `shift` (half-chips).
/// Unnormalized (§4.2: `E = Σ x · r_early`, a raw sum) — `DLL_CODE_GAIN` is tuned
/// against this magnitude.
fn correlate_shifted(wiped: &[Complex64], replica: &[Complex64], shift: i64) -> Complex64 {
    let n = replica.len() as i64;
    let mut sum = Complex64::new(0.0, 0.0);
    for (i, w) in wiped.iter().enumerate() {
        let idx = (((i as i64 + shift) % n) + n) % n;
        sum += w * replica[idx as usize];
    }
    sum
}

/// Side implied by an acquisition's starting code phase, before any wrap has been
/// observed: LEFT if the phase sits past the midpoint of the window, RIGHT otherwise.
fn initial_side(prn_code_phase_shift: f64) -> Side {
    if prn_code_phase_shift > SAMPLES_PER_MS as f64 / 2.0 {
        Side::Left
    } else {
        Side::Right
    }
}

/// Wraps `phase` into `[0, n)`, returning the side the wrap went through, if any.
fn wrap_code_phase(phase: f64, n: f64) -> (f64, Option<Side>) {
    if phase < 0.0 {
        (phase.rem_euclid(n), Some(Side::Left))
    } else if phase >= n {
        (phase.rem_euclid(n), Some(Side::Right))
    } else {
        (phase, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_below_zero_is_left_and_stays_in_range() {
        let (p, side) = wrap_code_phase(-0.5, 2046.0);
        assert!((0.0..2046.0).contains(&p));
        assert_eq!(side, Some(Side::Left));
    }

    #[test]
    fn wrap_above_range_is_right_and_stays_in_range() {
        let (p, side) = wrap_code_phase(2046.5, 2046.0);
        assert!((0.0..2046.0).contains(&p));
        assert_eq!(side, Some(Side::Right));
    }

    #[test]
    fn no_wrap_mid_range_reports_none() {
        let (p, side) = wrap_code_phase(1023.4, 2046.0);
        assert_eq!(p, 1023.4);
        assert_eq!(side, None);
    }

    #[test]
    fn initial_side_splits_on_window_midpoint() {
        assert_eq!(initial_side(1500.0), Side::Left);
        assert_eq!(initial_side(500.0), Side::Right);
    }
}
