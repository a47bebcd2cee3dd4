//! World initialization: seed the population and the initial queues.

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::WorldConfig;
use crate::kernel::WorldKernel;
use crate::types::FacilityKind;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitReport {
    pub persons_created: usize,
    pub store_queued: usize,
    pub hospital_queued: usize,
    pub ecu_queued: usize,
}

/// Build a kernel from the config: generate the initial population, then
/// send the configured number of idle residents to each facility kind's
/// line. Queue fills are capped by however many residents exist.
pub fn initialize_world(config: &WorldConfig, rng: &mut impl Rng) -> (WorldKernel, InitReport) {
    let config = config.clone().sanitized();
    let mut kernel = WorldKernel::new(config.clone());
    info!(time_rate = config.time_rate, "world created");

    let persons_created = kernel.repopulate(config.initial_population, rng).len();
    info!(count = persons_created, "world populated");

    let store_queued = kernel
        .enqueue_idle(FacilityKind::Store, config.initial_store_line, rng)
        .len();
    info!(count = store_queued, "store line filled");

    let hospital_queued = kernel
        .enqueue_idle(FacilityKind::Hospital, config.initial_hospital_line, rng)
        .len();
    info!(count = hospital_queued, "hospital line filled");

    let ecu_queued = kernel
        .enqueue_idle(FacilityKind::Ecu, config.initial_ecu_line, rng)
        .len();
    info!(count = ecu_queued, "emergency care line filled");

    let report = InitReport {
        persons_created,
        store_queued,
        hospital_queued,
        ecu_queued,
    };
    (kernel, report)
}
