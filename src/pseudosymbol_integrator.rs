//! Finds the 20:1 symbol-to-bit boundary and majority-votes UnresolvedBits (§4.3).

use crate::constants::{PSEUDOSYMBOLS_PER_BIT, PSEUDOSYMBOL_BOUNDARY_MIN_PER_PHASE};
use crate::types::{Pseudosymbol, UnresolvedBit};

enum State {
    FindingBoundary { buffered: Vec<Pseudosymbol> },
    Aligned { buffered: Vec<Pseudosymbol> },
}

pub struct PseudosymbolIntegrator {
    state: State,
}

impl Default for PseudosymbolIntegrator {
    fn default() -> Self {
        Self::new()
    }
}

impl PseudosymbolIntegrator {
    pub fn new() -> Self {
        Self {
            state: State::FindingBoundary {
                buffered: Vec::new(),
            },
        }
    }

    /// Feeds one pseudosymbol; returns any UnresolvedBits completed as a result (usually
    /// zero or one, never more than one in steady state since one pseudosymbol arrives
    /// per ms and a bit needs 20).
    pub fn handle_pseudosymbol(&mut self, ps: Pseudosymbol) -> Vec<UnresolvedBit> {
        match &mut self.state {
            State::FindingBoundary { buffered } => {
                buffered.push(ps);
                let positive = buffered.iter().filter(|&&p| p == 1).count();
                let negative = buffered.len() - positive;
                if positive >= PSEUDOSYMBOL_BOUNDARY_MIN_PER_PHASE
                    && negative >= PSEUDOSYMBOL_BOUNDARY_MIN_PER_PHASE
                {
                    let offset = find_boundary_offset(buffered);
                    let remaining: Vec<Pseudosymbol> = buffered[offset..].to_vec();
                    self.state = State::Aligned {
                        buffered: remaining,
                    };
                }
                Vec::new()
            }
            State::Aligned { buffered } => {
                buffered.push(ps);
                let mut emitted = Vec::new();
                while buffered.len() >= PSEUDOSYMBOLS_PER_BIT {
                    let chunk: Vec<Pseudosymbol> =
                        buffered.drain(0..PSEUDOSYMBOLS_PER_BIT).collect();
                    let sum: i32 = chunk.iter().map(|&p| p as i32).sum();
                    emitted.push(if sum >= 0 { 1 } else { -1 });
                }
                emitted
            }
        }
    }
}

/// For each candidate offset, chunks `ps[offset:]` into groups of 20 and scores by the
/// mean absolute value of each group's sum; picks the offset with the highest score
/// (§4.3). Groups smaller than 20 at the tail are excluded from scoring.
fn find_boundary_offset(ps: &[Pseudosymbol]) -> usize {
    let mut best_offset = 0;
    let mut best_score = f64::MIN;
    for offset in 0..PSEUDOSYMBOLS_PER_BIT {
        let chunks: Vec<&[Pseudosymbol]> = ps[offset..].chunks(PSEUDOSYMBOLS_PER_BIT).collect();
        let full_chunks: Vec<&&[Pseudosymbol]> = chunks
            .iter()
            .filter(|c| c.len() == PSEUDOSYMBOLS_PER_BIT)
            .collect();
        if full_chunks.is_empty() {
            continue;
        }
        let total: f64 = full_chunks
            .iter()
            .map(|c| (c.iter().map(|&p| p as i32).sum::<i32>()).unsigned_abs() as f64)
            .sum();
        let score = total / full_chunks.len() as f64;
        if score > best_score {
            best_score = score;
            best_offset = offset;
        }
    }
    best_offset
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_clean_stream(bit_count: usize) -> Vec<Pseudosymbol> {
        let mut out = Vec::new();
        for i in 0..bit_count {
            let value: Pseudosymbol = if i % 2 == 0 { 1 } else { -1 };
            out.extend(std::iter::repeat(value).take(PSEUDOSYMBOLS_PER_BIT));
        }
        out
    }

    #[test]
    fn emits_one_unresolved_bit_per_twenty_pseudosymbols_after_boundary() {
        let mut integrator = PseudosymbolIntegrator::new();
        let stream = make_clean_stream(40);
        let mut emitted = Vec::new();
        for ps in stream {
            emitted.extend(integrator.handle_pseudosymbol(ps));
        }
        for bit in &emitted {
            assert!(*bit == 1 || *bit == -1);
        }
        assert!(!emitted.is_empty());
    }

    #[test]
    fn finds_boundary_offset_on_shifted_clean_stream() {
        let mut stream = vec![1i8; 5];
        stream.extend(make_clean_stream(30));
        let offset = find_boundary_offset(&stream);
        assert_eq!(offset, 5);
    }
}
