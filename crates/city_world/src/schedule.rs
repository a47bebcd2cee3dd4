//! Cycle scheduling: earthquake start/stop, queue refill, repopulation.

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::kernel::WorldKernel;
use crate::types::{FacilityKind, WorldClock};

/// Last-triggered clock value for each autonomous cycle. Every timestamp is
/// independent and only moves when its own cycle fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CycleState {
    pub last_earthquake: WorldClock,
    pub last_refill: WorldClock,
    pub last_repopulate: WorldClock,
}

/// What a single scheduler pass did, for the runtime's logs.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CycleReport {
    pub clock: WorldClock,
    pub earthquake_started: bool,
    pub earthquake_stopped: bool,
    pub store_refilled: usize,
    pub hospital_refilled: usize,
    pub ecu_refilled: usize,
    pub repopulated: usize,
}

impl CycleReport {
    fn at(clock: WorldClock) -> Self {
        Self {
            clock,
            ..Self::default()
        }
    }

    pub fn fired_anything(&self) -> bool {
        self.earthquake_started
            || self.earthquake_stopped
            || self.store_refilled > 0
            || self.hospital_refilled > 0
            || self.ecu_refilled > 0
            || self.repopulated > 0
    }
}

impl WorldKernel {
    /// Evaluate every due cycle against the current virtual clock. Called by
    /// the runtime once per poll tick; a pass that finds nothing due is a
    /// no-op.
    pub fn run_cycles(&mut self, rng: &mut impl Rng) -> CycleReport {
        let clock = self.clock.value();
        self.run_cycles_at(clock, rng)
    }

    pub(crate) fn run_cycles_at(&mut self, clock: WorldClock, rng: &mut impl Rng) -> CycleReport {
        let mut report = CycleReport::at(clock);

        // Earthquake start and stop share one trigger timestamp: a new quake
        // waits for the full interval measured from the previous trigger,
        // not from the moment the previous quake ended.
        if self.earthquake_active() {
            if clock.saturating_sub(self.cycles.last_earthquake) >= self.config.earthquake_duration
            {
                self.stop_earthquake();
                report.earthquake_stopped = true;
                info!(clock, "earthquake ended");
            }
        } else if clock.saturating_sub(self.cycles.last_earthquake)
            >= self.config.earthquake_interval
        {
            self.start_earthquake();
            self.cycles.last_earthquake = clock;
            report.earthquake_started = true;
            info!(clock, "earthquake started");
        }

        if clock.saturating_sub(self.cycles.last_refill) >= self.config.refill_interval {
            report.store_refilled = self
                .enqueue_idle(FacilityKind::Store, self.config.store_refill_count, rng)
                .len();
            report.hospital_refilled = self
                .enqueue_idle(FacilityKind::Hospital, self.config.hospital_refill_count, rng)
                .len();
            report.ecu_refilled = self
                .enqueue_idle(FacilityKind::Ecu, self.config.ecu_refill_count, rng)
                .len();
            self.cycles.last_refill = clock;
            info!(
                clock,
                store = report.store_refilled,
                hospital = report.hospital_refilled,
                ecu = report.ecu_refilled,
                "queues refilled"
            );
        }

        if clock.saturating_sub(self.cycles.last_repopulate) >= self.config.repopulate_interval {
            report.repopulated = self.repopulate(self.config.repopulate_count, rng).len();
            self.cycles.last_repopulate = clock;
            info!(clock, count = report.repopulated, "world repopulated");
        }

        report
    }
}
