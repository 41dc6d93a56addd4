//! Wires one satellite's Tracker, PseudosymbolIntegrator, BitIntegrator, and
//! SubframeDecoder into a single per-ms step (§4 overview, §4.7 step 2).

use crate::bit_integrator::BitIntegrator;
use crate::error::PipelineError;
use crate::pseudosymbol_integrator::PseudosymbolIntegrator;
use crate::subframe::Subframe;
use crate::subframe_decoder::SubframeDecoder;
use crate::tracker::{PrnEdgeReport, Tracker};
use crate::types::{Acquisition, SampleBlock, SatelliteId};

/// Everything a single successfully acquired satellite needs, run strictly once per
/// ms (§5: sequential-per-ms is load-bearing, never parallelized across satellites).
pub struct Pipeline {
    tracker: Tracker,
    pseudosymbol_integrator: PseudosymbolIntegrator,
    bit_integrator: BitIntegrator,
    subframe_decoder: SubframeDecoder,
    acquired_at: chrono::DateTime<chrono::Utc>,
}

/// What one ms step of a Pipeline produces for the Receiver to forward to World.
pub struct PipelineStep {
    pub edge: PrnEdgeReport,
    pub subframes: Vec<Subframe>,
}

impl Pipeline {
    pub fn new(acquisition: &Acquisition) -> Self {
        Self {
            tracker: Tracker::new(acquisition),
            pseudosymbol_integrator: PseudosymbolIntegrator::new(),
            bit_integrator: BitIntegrator::new(acquisition.satellite_id),
            subframe_decoder: SubframeDecoder::new(acquisition.satellite_id),
            acquired_at: acquisition.timestamp,
        }
    }

    pub fn acquired_at(&self) -> chrono::DateTime<chrono::Utc> {
        self.acquired_at
    }

    pub fn satellite_id(&self) -> SatelliteId {
        self.tracker.satellite_id()
    }

    pub fn tracker(&self) -> &Tracker {
        &self.tracker
    }

    pub fn bit_phase(&self) -> Option<crate::types::BitPhase> {
        self.bit_integrator.bit_phase()
    }

    pub fn subframe_count(&self) -> usize {
        self.subframe_decoder.count()
    }

    /// Runs one 1 ms step. A `PipelineError` means this satellite's pipeline (and any
    /// World parameters for it) must be torn down by the caller (§4.5 failure mode).
    pub fn step(&mut self, block: &SampleBlock) -> Result<PipelineStep, PipelineError> {
        let tracker_step = self.tracker.step(block);

        let unresolved_bits = self
            .pseudosymbol_integrator
            .handle_pseudosymbol(tracker_step.pseudosymbol);

        let mut subframes = Vec::new();
        for unresolved_bit in unresolved_bits {
            let candidates = self.bit_integrator.handle_unresolved_bit(unresolved_bit)?;
            for bits in candidates {
                subframes.push(self.subframe_decoder.decode(&bits)?);
            }
        }

        Ok(PipelineStep {
            edge: tracker_step.edge,
            subframes,
        })
    }
}
