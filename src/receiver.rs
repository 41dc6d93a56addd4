//! Top-level orchestration (§4.7): feeds the antenna into the Acquirer and every
//! installed Pipeline, invokes World's solver, and periodically snapshots telemetry.

use std::collections::{HashMap, HashSet};

use crate::acquirer::Acquirer;
use crate::antenna::Antenna;
use crate::constants::{HTTP_UPDATE_INTERVAL_MS, SOLUTION_HISTORY_LEN};
use crate::error::ReceiverError;
use crate::pipeline::Pipeline;
use crate::ring::RingBuffer;
use crate::telemetry::{
    PositionSnapshot, Snapshot, SnapshotSender, SolutionSnapshot, TrackedSatelliteSnapshot,
    UntrackedSatelliteSnapshot,
};
use crate::types::SatelliteId;
use crate::world::{ecef_to_geodetic, Fix, GeodeticPosition, World};

pub struct Receiver {
    acquirer: Acquirer,
    pipelines: HashMap<SatelliteId, Pipeline>,
    world: World,
    solutions: RingBuffer<(Fix, GeodeticPosition)>,
    telemetry: SnapshotSender,
    steps_since_snapshot: u64,
}

impl Receiver {
    pub fn new(acquirer: Acquirer, telemetry: SnapshotSender) -> Self {
        Self {
            acquirer,
            pipelines: HashMap::new(),
            world: World::new(),
            solutions: RingBuffer::new(SOLUTION_HISTORY_LEN),
            telemetry,
            steps_since_snapshot: 0,
        }
    }

    /// Runs the receiver until the antenna signals `EndOfStream` or a fatal
    /// `InvariantViolation` occurs. Drives `step_with` once per 1 ms block.
    pub fn run(&mut self, antenna: &mut dyn Antenna) -> Result<(), ReceiverError> {
        loop {
            let block = match antenna.next_1ms_of_samples() {
                Ok(block) => block,
                Err(ReceiverError::EndOfStream) => {
                    log::info!("antenna exhausted; shutting down cleanly");
                    return Ok(());
                }
                Err(e) => return Err(e),
            };
            self.step_with(block)?;
        }
    }

    /// Runs exactly one 1 ms step given an already-read sample block. Per-ms step order
    /// (§4.7, §5): Acquirer, then every Pipeline, then the solver, then telemetry — never
    /// parallelized across satellites. Split out from `run` so callers (and tests) can
    /// drive a bounded number of milliseconds without an antenna's EOF deciding when to
    /// stop.
    pub fn step_with(&mut self, block: crate::types::SampleBlock) -> Result<(), ReceiverError> {
        // 1. Acquirer.
        let tracked: HashSet<SatelliteId> = self.pipelines.keys().copied().collect();
        if let Some(acquisition) = self.acquirer.handle_1ms_of_samples(block.clone(), &tracked) {
            crate::invariant!(
                !self.pipelines.contains_key(&acquisition.satellite_id),
                "acquirer reacquired an already-tracked satellite {}",
                acquisition.satellite_id
            );
            log::info!("installing pipeline for satellite {}", acquisition.satellite_id);
            self.pipelines
                .insert(acquisition.satellite_id, Pipeline::new(&acquisition));
        }

        // 2. Pipelines.
        let mut failed: Vec<SatelliteId> = Vec::new();
        for (&satellite_id, pipeline) in self.pipelines.iter_mut() {
            match pipeline.step(&block) {
                Ok(step) => {
                    self.world.handle_edge(&step.edge);
                    for subframe in &step.subframes {
                        self.world.handle_subframe(satellite_id, subframe);
                    }
                }
                Err(e) => {
                    log::warn!("satellite {satellite_id}: dropping pipeline ({e})");
                    failed.push(satellite_id);
                }
            }
        }
        for satellite_id in failed {
            self.pipelines.remove(&satellite_id);
            self.world.remove(satellite_id);
        }

        // 3. Solver.
        if let Some(fix) = self.world.solve() {
            let geodetic = ecef_to_geodetic(fix.x, fix.y, fix.z);
            log::info!(
                "fix: lat={:.6} lon={:.6} alt={:.1}m bias={:.3e}s",
                geodetic.latitude_radians,
                geodetic.longitude_radians,
                geodetic.altitude_meters,
                fix.clock_bias_seconds
            );
            self.solutions.push((fix, geodetic));
        }

        // 4. Telemetry.
        self.steps_since_snapshot += 1;
        if self.steps_since_snapshot >= HTTP_UPDATE_INTERVAL_MS {
            self.steps_since_snapshot = 0;
            self.telemetry.send(self.snapshot());
        }

        Ok(())
    }

    /// Ids of currently tracked (Pipeline-installed) satellites.
    pub fn tracked_satellite_ids(&self) -> Vec<SatelliteId> {
        self.pipelines.keys().copied().collect()
    }

    /// The most recent position fix, if the solver has produced one yet.
    pub fn last_fix(&self) -> Option<(Fix, GeodeticPosition)> {
        self.solutions.last().copied()
    }

    fn snapshot(&self) -> Snapshot {
        let solutions = self
            .solutions
            .iter()
            .map(|(fix, geodetic)| SolutionSnapshot {
                clock_bias: fix.clock_bias_seconds,
                position: PositionSnapshot {
                    latitude: geodetic.latitude_radians,
                    longitude: geodetic.longitude_radians,
                    height: geodetic.altitude_meters,
                },
            })
            .collect();

        let tracked_satellites = self
            .pipelines
            .values()
            .map(|pipeline| {
                let tracker = pipeline.tracker();
                let bit_phase = pipeline.bit_phase();
                TrackedSatelliteSnapshot {
                    satellite_id: tracker.satellite_id(),
                    bit_boundary_found: bit_phase.is_some(),
                    bit_phase: bit_phase.map(|p| match p {
                        crate::types::BitPhase::Positive => "positive",
                        crate::types::BitPhase::Negative => "negative",
                    }),
                    carrier_frequency_shifts: tracker.carrier_frequency_history.to_vec(),
                    correlations: tracker
                        .correlation_history
                        .iter()
                        .map(|c| [c.re, c.im])
                        .collect(),
                    prn_code_phase_shifts: tracker.prn_code_phase_history.to_vec(),
                    required_subframes_received: self.world.is_promoted(tracker.satellite_id()),
                    subframe_count: pipeline.subframe_count(),
                    acquired_at: pipeline.acquired_at(),
                }
            })
            .collect();

        let tracked_ids: HashSet<SatelliteId> = self.pipelines.keys().copied().collect();
        let untracked_satellites = (1..=crate::constants::NUM_GPS_SATS as SatelliteId)
            .filter(|id| !tracked_ids.contains(id))
            .map(|satellite_id| UntrackedSatelliteSnapshot {
                satellite_id,
                next_acquisition_at: self.acquirer.next_attempt_at(satellite_id),
            })
            .collect();

        Snapshot {
            solutions,
            tracked_satellites,
            untracked_satellites,
        }
    }
}
