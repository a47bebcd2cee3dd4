//! In-memory world-state engine for a closed population moving between a
//! fixed set of service facilities.
//!
//! The engine tracks facilities (store, hospital, emergency-care unit) and
//! persons, enforces the queue/service state machine and capacity
//! bookkeeping, and exposes the cycle evaluation an autonomous scheduler
//! drives against the virtual clock: repopulation, queue refill, and
//! earthquake start/stop.
//!
//! Module layout:
//! - `types`: IDs, enums, the id allocator, time helpers
//! - `world_model`: Facility, AttributeRecord, Person, Snapshot, WorldModel
//! - `kernel`: WorldKernel and the operation surface
//! - `clock`: the virtual clock
//! - `schedule`: cycle bookkeeping and due-cycle evaluation
//! - `populate`: random person generation
//! - `config`: world configuration and TOML loading
//! - `init`: initial population and queue seeding

pub mod clock;
pub mod config;
pub mod init;
pub mod kernel;
pub mod populate;
pub mod schedule;
pub mod types;
pub mod world_model;

pub use clock::VirtualClock;
pub use config::{ConfigError, WorldConfig};
pub use init::{initialize_world, InitReport};
pub use kernel::{
    RegisterOutcome, RejectReason, TransitionOutcome, WorldError, WorldKernel,
};
pub use populate::generate_person;
pub use schedule::{CycleReport, CycleState};
pub use types::{
    now_unix_ms, FacilityId, FacilityKind, Gender, IdAllocator, PersonId, PersonStatus,
    QueueState, RecordId, UnixMillis, WorldClock,
};
pub use world_model::{AttributeRecord, Facility, Person, Snapshot, WorldModel};
