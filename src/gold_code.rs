//! Generates the GPS satellites' C/A PRN codes from a pair of 10-stage LFSRs (§3,
//! §4, §8's Gold-code-balance property) and builds the upsampled bipolar replica each
//! Tracker/Acquirer correlates against.

use once_cell::sync::Lazy;
use rustfft::num_complex::Complex64;
use rustfft::FftPlanner;
use std::collections::HashMap;

use crate::constants::{NUM_GPS_SATS, PRN_CODE_LEN, SAMPLES_PER_MS};
use crate::types::SatelliteId;

const G1_TAPS: [usize; 2] = [3, 10];
const G2_TAPS: [usize; 6] = [2, 3, 6, 8, 9, 10];

/// One-based output-tap indices per satellite, indexed by `satellite_id - 1`. Taken from
/// Table 3-Ia of IS-GPS-200.
const G2_OUTPUT_TAPS: [(usize, usize); NUM_GPS_SATS] = [
    (2, 6),
    (3, 7),
    (4, 8),
    (5, 9),
    (1, 9),
    (2, 10),
    (1, 8),
    (2, 9),
    (3, 10),
    (2, 3),
    (3, 4),
    (5, 6),
    (6, 7),
    (7, 8),
    (8, 9),
    (9, 10),
    (1, 4),
    (2, 5),
    (3, 6),
    (4, 7),
    (5, 8),
    (6, 9),
    (1, 3),
    (4, 6),
    (5, 7),
    (6, 8),
    (7, 9),
    (8, 10),
    (1, 6),
    (2, 7),
    (3, 8),
    (4, 9),
];

/// Generates one step of a 10-stage LFSR seeded with all-ones. `outputs` and `taps` are
/// one-based stage indices (to match the GPS spec's own numbering): `outputs` selects the
/// bits XORed together to produce this step's output bit, `taps` selects the bits XORed
/// together to produce the new bit shifted into stage 1.
struct Lfsr {
    bits: [u8; 10],
}

impl Lfsr {
    fn new() -> Self {
        Self { bits: [1; 10] }
    }

    fn step(&mut self, outputs: &[usize], taps: &[usize]) -> u8 {
        let output = outputs.iter().map(|&i| self.bits[i - 1]).sum::<u8>() % 2;
        let feedback = taps.iter().map(|&i| self.bits[i - 1]).sum::<u8>() % 2;
        for i in (1..10).rev() {
            self.bits[i] = self.bits[i - 1];
        }
        self.bits[0] = feedback;
        output
    }
}

/// The 1023-chip `0/1` C/A code, the 2046-sample upsampled bipolar (`±1`) replica, and
/// its cached FFT (the acquisition correlator always needs the replica's FFT, so it's
/// computed once rather than per acquisition attempt).
pub struct PrnCode {
    pub chips: [u8; PRN_CODE_LEN],
    pub upsampled_bipolar: Vec<Complex64>,
    pub upsampled_bipolar_fft: Vec<Complex64>,
}

fn generate_chips(satellite_id: SatelliteId) -> [u8; PRN_CODE_LEN] {
    let output_taps = G2_OUTPUT_TAPS[(satellite_id - 1) as usize];
    let g2_outputs = [output_taps.0, output_taps.1];

    let mut g1 = Lfsr::new();
    let mut g2 = Lfsr::new();
    let mut chips = [0u8; PRN_CODE_LEN];
    for chip in chips.iter_mut() {
        let g1_out = g1.step(&[10], &G1_TAPS);
        let g2_out = g2.step(&g2_outputs, &G2_TAPS);
        *chip = g1_out ^ g2_out;
    }
    chips
}

fn upsample_bipolar(chips: &[u8; PRN_CODE_LEN]) -> Vec<Complex64> {
    assert_eq!(
        SAMPLES_PER_MS % PRN_CODE_LEN,
        0,
        "SAMPLES_PER_MS must be an integer multiple of the C/A code length"
    );
    let repeat_count = SAMPLES_PER_MS / PRN_CODE_LEN;
    let mut out = Vec::with_capacity(SAMPLES_PER_MS);
    for &chip in chips {
        // Polar non-return-to-zero: 0 -> +1, 1 -> -1. Makes XOR-as-correlation become
        // multiplication, which is what the tracker/acquirer actually does.
        let bipolar = if chip == 1 { -1.0 } else { 1.0 };
        for _ in 0..repeat_count {
            out.push(Complex64::new(bipolar, 0.0));
        }
    }
    out
}

fn build_table() -> HashMap<SatelliteId, PrnCode> {
    let mut planner = FftPlanner::<f64>::new();
    let mut table = HashMap::with_capacity(NUM_GPS_SATS);
    for satellite_id in 1..=NUM_GPS_SATS as SatelliteId {
        let chips = generate_chips(satellite_id);
        let upsampled_bipolar = upsample_bipolar(&chips);
        let mut upsampled_bipolar_fft = upsampled_bipolar.clone();
        let fft = planner.plan_fft_forward(upsampled_bipolar_fft.len());
        fft.process(&mut upsampled_bipolar_fft);
        table.insert(
            satellite_id,
            PrnCode {
                chips,
                upsampled_bipolar,
                upsampled_bipolar_fft,
            },
        );
    }
    table
}

/// The PRN code table: process-wide, immutable, built once on first access (§3).
pub static PRN_CODES: Lazy<HashMap<SatelliteId, PrnCode>> = Lazy::new(build_table);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn satellite_1_code_matches_known_prefix() {
        let code = &PRN_CODES[&1];
        assert_eq!(&code.chips[0..10], &[1, 1, 0, 0, 1, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn satellite_1_code_is_gold_code_balanced() {
        let code = &PRN_CODES[&1];
        let ones = code.chips.iter().filter(|&&c| c == 1).count();
        assert!(ones == 511 || ones == 512);
    }

    #[test]
    fn every_satellite_code_upsamples_to_2046_samples() {
        for id in 1..=NUM_GPS_SATS as SatelliteId {
            assert_eq!(PRN_CODES[&id].upsampled_bipolar.len(), SAMPLES_PER_MS);
        }
    }
}
