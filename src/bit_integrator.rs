//! Finds subframe alignment via the TLM preamble and resolves bit phase (§4.4).

use crate::constants::{BITS_PER_SUBFRAME, BIT_INTEGRATOR_MIN_BUFFERED, TLM_PREAMBLE_BIPOLAR};
use crate::error::PipelineError;
use crate::types::{Bit, BitPhase, SatelliteId, UnresolvedBit};

enum State {
    FindingAlignment {
        buffered: Vec<UnresolvedBit>,
    },
    Aligned {
        bit_phase: BitPhase,
        buffered: Vec<UnresolvedBit>,
    },
}

pub struct BitIntegrator {
    satellite_id: SatelliteId,
    state: State,
}

impl BitIntegrator {
    pub fn new(satellite_id: SatelliteId) -> Self {
        Self {
            satellite_id,
            state: State::FindingAlignment {
                buffered: Vec::new(),
            },
        }
    }

    pub fn bit_phase(&self) -> Option<BitPhase> {
        match &self.state {
            State::FindingAlignment { .. } => None,
            State::Aligned { bit_phase, .. } => Some(*bit_phase),
        }
    }

    /// Feeds one UnresolvedBit. Returns any complete 300-bit subframe candidates ready
    /// for the SubframeDecoder. Fails with `UnknownBitPhase` if alignment search has
    /// exhausted all 300 offsets without success (§4.4).
    pub fn handle_unresolved_bit(
        &mut self,
        u: UnresolvedBit,
    ) -> Result<Vec<Vec<Bit>>, PipelineError> {
        match &mut self.state {
            State::FindingAlignment { buffered } => {
                buffered.push(u);
                if buffered.len() < BIT_INTEGRATOR_MIN_BUFFERED {
                    return Ok(Vec::new());
                }
                match find_alignment(buffered) {
                    Some((offset, bit_phase)) => {
                        let remaining: Vec<UnresolvedBit> = buffered[offset..].to_vec();
                        self.state = State::Aligned {
                            bit_phase,
                            buffered: remaining,
                        };
                        Ok(drain_complete_subframes(&mut self.state))
                    }
                    None => Err(PipelineError::UnknownBitPhase {
                        satellite_id: self.satellite_id,
                    }),
                }
            }
            State::Aligned { .. } => {
                if let State::Aligned { buffered, .. } = &mut self.state {
                    buffered.push(u);
                }
                Ok(drain_complete_subframes(&mut self.state))
            }
        }
    }
}

fn drain_complete_subframes(state: &mut State) -> Vec<Vec<Bit>> {
    let State::Aligned { bit_phase, buffered } = state else {
        return Vec::new();
    };
    let mut out = Vec::new();
    while buffered.len() >= BITS_PER_SUBFRAME {
        let chunk: Vec<UnresolvedBit> = buffered.drain(0..BITS_PER_SUBFRAME).collect();
        out.push(chunk.into_iter().map(|u| bit_phase.resolve(u)).collect());
    }
    out
}

/// Whether `window` (8 UnresolvedBits) matches the TLM preamble under the given
/// polarity (`1` for direct, `-1` for the bitwise-inverted stream).
fn preamble_matches(window: &[UnresolvedBit], polarity: i8) -> bool {
    window
        .iter()
        .zip(TLM_PREAMBLE_BIPOLAR.iter())
        .all(|(&w, &p)| w == polarity * p)
}

/// Scans every offset in `[0, 300)` for a subframe boundary: an offset aligns iff the
/// first 8 bits of *every* subframe-spaced chunk that fully fits in the buffer match the
/// TLM preamble, in either polarity (§4.4).
fn find_alignment(buffered: &[UnresolvedBit]) -> Option<(usize, BitPhase)> {
    for offset in 0..BITS_PER_SUBFRAME {
        let mut checked_any = false;
        let mut all_positive = true;
        let mut all_negative = true;
        let mut k = 0;
        loop {
            let start = offset + k * BITS_PER_SUBFRAME;
            if start + 8 > buffered.len() {
                break;
            }
            checked_any = true;
            let window = &buffered[start..start + 8];
            all_positive &= preamble_matches(window, 1);
            all_negative &= preamble_matches(window, -1);
            if !all_positive && !all_negative {
                break;
            }
            k += 1;
        }
        if !checked_any {
            continue;
        }
        if all_positive {
            return Some((offset, BitPhase::Positive));
        }
        if all_negative {
            return Some((offset, BitPhase::Negative));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn synthetic_subframe_unresolved(bit_phase: BitPhase) -> Vec<UnresolvedBit> {
        let mut out = Vec::with_capacity(BITS_PER_SUBFRAME);
        out.extend(TLM_PREAMBLE_BIPOLAR);
        out.resize(BITS_PER_SUBFRAME, 1);
        if bit_phase == BitPhase::Negative {
            for b in out.iter_mut() {
                *b = -*b;
            }
        }
        out
    }

    #[test]
    fn detects_positive_bit_phase_on_repeated_preamble() {
        let mut stream = Vec::new();
        for _ in 0..5 {
            stream.extend(synthetic_subframe_unresolved(BitPhase::Positive));
        }
        let (offset, phase) = find_alignment(&stream).expect("alignment should be found");
        assert_eq!(offset, 0);
        assert_eq!(phase, BitPhase::Positive);
    }

    #[test]
    fn inverted_stream_is_detected_as_negative_bit_phase_with_same_decoded_bits() {
        let mut positive_stream = Vec::new();
        let mut negative_stream = Vec::new();
        for _ in 0..5 {
            positive_stream.extend(synthetic_subframe_unresolved(BitPhase::Positive));
            negative_stream.extend(synthetic_subframe_unresolved(BitPhase::Negative));
        }

        let mut pos_integrator = BitIntegrator::new(1);
        let mut neg_integrator = BitIntegrator::new(1);

        let mut pos_subframes = Vec::new();
        for &u in &positive_stream {
            pos_subframes.extend(pos_integrator.handle_unresolved_bit(u).unwrap());
        }
        let mut neg_subframes = Vec::new();
        for &u in &negative_stream {
            neg_subframes.extend(neg_integrator.handle_unresolved_bit(u).unwrap());
        }

        assert!(!pos_subframes.is_empty());
        assert_eq!(pos_subframes, neg_subframes);
    }

    #[test]
    fn unknown_bit_phase_when_no_offset_ever_matches() {
        let mut integrator = BitIntegrator::new(1);
        let mut result = Ok(Vec::new());
        for i in 0..BIT_INTEGRATOR_MIN_BUFFERED {
            let u: UnresolvedBit = if i % 2 == 0 { 1 } else { -1 };
            result = integrator.handle_unresolved_bit(u);
            if result.is_err() {
                break;
            }
        }
        assert!(result.is_err());
    }
}
