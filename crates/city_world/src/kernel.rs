//! WorldKernel: the operation surface over the shared world state.

use std::collections::BTreeMap;
use std::fmt;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::clock::VirtualClock;
use crate::config::WorldConfig;
use crate::populate::generate_person;
use crate::schedule::CycleState;
use crate::types::{
    now_unix_ms, FacilityId, FacilityKind, IdAllocator, PersonId, QueueState, UnixMillis,
    WorldClock,
};
use crate::world_model::{AttributeRecord, Facility, Person, Snapshot, WorldModel};

// ============================================================================
// Errors
// ============================================================================

/// Failures surfaced directly to a caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorldError {
    FacilityNotFound { facility_id: FacilityId },
    UnknownKind { kind: String },
    KindNotRegistrable { kind: FacilityKind },
    InvalidCapacity { max_capacity: i64 },
}

impl fmt::Display for WorldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorldError::FacilityNotFound { facility_id } => {
                write!(f, "facility not found: {}", facility_id)
            }
            WorldError::UnknownKind { kind } => write!(f, "unknown facility kind: {}", kind),
            WorldError::KindNotRegistrable { kind } => {
                write!(f, "facility kind cannot be registered: {}", kind)
            }
            WorldError::InvalidCapacity { max_capacity } => {
                write!(f, "invalid max capacity: {}", max_capacity)
            }
        }
    }
}

impl std::error::Error for WorldError {}

/// Why one person in a batch was not transitioned. Rejections are data, not
/// errors: the caller receives the ids back and reconciles partial success.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    PersonNotFound { person_id: PersonId },
    PersonDead { person_id: PersonId },
    WrongFacilityKind {
        person_id: PersonId,
        expected: FacilityKind,
        actual: FacilityKind,
    },
    NotQueued { person_id: PersonId },
    NotInService { person_id: PersonId },
    AtCapacity { facility_id: FacilityId },
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::PersonNotFound { person_id } => {
                write!(f, "person not found: {}", person_id)
            }
            RejectReason::PersonDead { person_id } => write!(f, "person is dead: {}", person_id),
            RejectReason::WrongFacilityKind {
                person_id,
                expected,
                actual,
            } => write!(
                f,
                "person {} is at {}, not {}",
                person_id, actual, expected
            ),
            RejectReason::NotQueued { person_id } => {
                write!(f, "person not waiting in line: {}", person_id)
            }
            RejectReason::NotInService { person_id } => {
                write!(f, "person not in service: {}", person_id)
            }
            RejectReason::AtCapacity { facility_id } => {
                write!(f, "facility at capacity: {}", facility_id)
            }
        }
    }
}

// ============================================================================
// Operation Outcomes
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterOutcome {
    pub facility_id: FacilityId,
    pub time_rate: u64,
    pub start_unix_ms: UnixMillis,
    pub clock: WorldClock,
}

/// Per-person result of a batch transition, in processed order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TransitionOutcome {
    pub accepted: Vec<PersonId>,
    pub rejected: Vec<PersonId>,
}

impl TransitionOutcome {
    pub fn rejected_all(person_ids: &[PersonId]) -> Self {
        Self {
            accepted: Vec::new(),
            rejected: person_ids.to_vec(),
        }
    }
}

// ============================================================================
// WorldKernel
// ============================================================================

/// The single explicitly-owned world-state object: facility and person
/// registries, the earthquake flag, the virtual clock, and the cycle
/// bookkeeping. All operations validate against current state and apply a
/// bounded set of transitions; nothing is retried internally.
#[derive(Debug)]
pub struct WorldKernel {
    pub(crate) config: WorldConfig,
    pub(crate) clock: VirtualClock,
    pub(crate) ids: IdAllocator,
    pub(crate) cycles: CycleState,
    pub(crate) model: WorldModel,
}

impl WorldKernel {
    pub fn new(config: WorldConfig) -> Self {
        let config = config.sanitized();
        let clock = VirtualClock::new(config.time_rate);
        Self {
            config,
            clock,
            ids: IdAllocator::new(),
            cycles: CycleState::default(),
            model: WorldModel::default(),
        }
    }

    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    pub fn model(&self) -> &WorldModel {
        &self.model
    }

    pub fn clock(&self) -> WorldClock {
        self.clock.value()
    }

    pub fn earthquake_active(&self) -> bool {
        self.model.earthquake_active
    }

    pub fn start_earthquake(&mut self) {
        self.model.earthquake_active = true;
    }

    pub fn stop_earthquake(&mut self) {
        self.model.earthquake_active = false;
    }

    // ------------------------------------------------------------------------
    // Registration and facility updates
    // ------------------------------------------------------------------------

    /// Create a facility with zero used capacity and one attribute record
    /// per entry. The city is the implicit holding area and cannot be
    /// registered.
    pub fn register(
        &mut self,
        kind: FacilityKind,
        max_capacity: i64,
        attributes: BTreeMap<String, Value>,
    ) -> Result<RegisterOutcome, WorldError> {
        if kind == FacilityKind::City {
            return Err(WorldError::KindNotRegistrable { kind });
        }
        if max_capacity < 0 {
            return Err(WorldError::InvalidCapacity { max_capacity });
        }

        let now = now_unix_ms();
        let facility_id = self.ids.next_id();
        self.model
            .facilities
            .insert(facility_id, Facility::new(facility_id, kind, max_capacity, now));

        let records: Vec<AttributeRecord> = attributes
            .into_iter()
            .map(|(name, value)| {
                AttributeRecord::new(self.ids.next_id(), facility_id, &name, value, now)
            })
            .collect();
        self.model.attributes.insert(facility_id, records);

        debug!(facility_id, kind = %kind, max_capacity, "facility registered");
        Ok(RegisterOutcome {
            facility_id,
            time_rate: self.clock.time_rate(),
            start_unix_ms: self.clock.start_unix_ms(),
            clock: self.clock.value(),
        })
    }

    /// Replace a facility's capacity limit and its whole attribute set.
    /// Returns `false` when the facility is missing, the capacity is
    /// negative, or the facility currently owns no attribute records.
    pub fn update_self(
        &mut self,
        facility_id: FacilityId,
        max_capacity: i64,
        attributes: BTreeMap<String, Value>,
    ) -> bool {
        if max_capacity < 0 {
            return false;
        }
        let has_records = self
            .model
            .attributes
            .get(&facility_id)
            .map_or(false, |records| !records.is_empty());
        if !has_records {
            return false;
        }
        let now = now_unix_ms();
        let Some(facility) = self.model.facilities.get_mut(&facility_id) else {
            return false;
        };
        facility.set_max_capacity(max_capacity, now);

        let records: Vec<AttributeRecord> = attributes
            .into_iter()
            .map(|(name, value)| {
                AttributeRecord::new(self.ids.next_id(), facility_id, &name, value, now)
            })
            .collect();
        self.model.attributes.insert(facility_id, records);
        true
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    /// Point-in-time view of everyone waiting at the facility's kind, plus
    /// the earthquake flag.
    pub fn snapshot(&self, facility_id: FacilityId) -> Result<Snapshot, WorldError> {
        let facility = self
            .model
            .facilities
            .get(&facility_id)
            .ok_or(WorldError::FacilityNotFound { facility_id })?;
        Ok(Snapshot {
            facility_id,
            persons: self.model.queued_persons(facility.kind),
            earthquake_active: self.model.earthquake_active,
            clock: self.clock.value(),
        })
    }

    // ------------------------------------------------------------------------
    // Person transitions
    // ------------------------------------------------------------------------

    /// Take queued persons into service, occupying one capacity slot each.
    pub fn accept(&mut self, facility_id: FacilityId, person_ids: &[PersonId]) -> TransitionOutcome {
        let Some(kind) = self.facility_kind(facility_id) else {
            debug!(facility_id, "accept: facility not found, rejecting all");
            return TransitionOutcome::rejected_all(person_ids);
        };
        let now = now_unix_ms();
        let mut outcome = TransitionOutcome::default();
        for &person_id in person_ids {
            match self.accept_one(facility_id, kind, person_id, now) {
                Ok(()) => outcome.accepted.push(person_id),
                Err(reason) => {
                    debug!(person_id, %reason, "accept rejected");
                    outcome.rejected.push(person_id);
                }
            }
        }
        outcome
    }

    /// Finish serving persons and route them onward: the emergency-care unit
    /// escalates to the hospital queue, everything else discharges to the
    /// city.
    pub fn service_done(
        &mut self,
        facility_id: FacilityId,
        person_ids: &[PersonId],
    ) -> TransitionOutcome {
        let Some(kind) = self.facility_kind(facility_id) else {
            debug!(facility_id, "service_done: facility not found, rejecting all");
            return TransitionOutcome::rejected_all(person_ids);
        };
        let now = now_unix_ms();
        let mut outcome = TransitionOutcome::default();
        for &person_id in person_ids {
            match self.service_done_one(facility_id, kind, person_id, now) {
                Ok(()) => outcome.accepted.push(person_id),
                Err(reason) => {
                    debug!(person_id, %reason, "service_done rejected");
                    outcome.rejected.push(person_id);
                }
            }
        }
        outcome
    }

    /// Mark persons in service as injured and auto-queue them for emergency
    /// care. The reporting facility frees their slots.
    pub fn person_injury(
        &mut self,
        facility_id: FacilityId,
        person_ids: &[PersonId],
    ) -> TransitionOutcome {
        let Some(kind) = self.facility_kind(facility_id) else {
            debug!(facility_id, "person_injury: facility not found, rejecting all");
            return TransitionOutcome::rejected_all(person_ids);
        };
        let now = now_unix_ms();
        let mut outcome = TransitionOutcome::default();
        for &person_id in person_ids {
            match self.injury_one(facility_id, kind, person_id, now) {
                Ok(()) => outcome.accepted.push(person_id),
                Err(reason) => {
                    debug!(person_id, %reason, "person_injury rejected");
                    outcome.rejected.push(person_id);
                }
            }
        }
        outcome
    }

    /// Mark persons dead. Terminal: once dead, every later transition on the
    /// person is rejected.
    pub fn person_death(
        &mut self,
        facility_id: FacilityId,
        person_ids: &[PersonId],
    ) -> TransitionOutcome {
        let Some(kind) = self.facility_kind(facility_id) else {
            debug!(facility_id, "person_death: facility not found, rejecting all");
            return TransitionOutcome::rejected_all(person_ids);
        };
        let now = now_unix_ms();
        let mut outcome = TransitionOutcome::default();
        for &person_id in person_ids {
            match self.death_one(facility_id, kind, person_id, now) {
                Ok(()) => outcome.accepted.push(person_id),
                Err(reason) => {
                    debug!(person_id, %reason, "person_death rejected");
                    outcome.rejected.push(person_id);
                }
            }
        }
        outcome
    }

    // ------------------------------------------------------------------------
    // Population primitives (shared with the cycle scheduler)
    // ------------------------------------------------------------------------

    /// Create `count` randomly generated persons in the city.
    pub fn repopulate(&mut self, count: usize, rng: &mut impl Rng) -> Vec<PersonId> {
        let now = now_unix_ms();
        let mut created = Vec::with_capacity(count);
        for _ in 0..count {
            let person_id = self.ids.next_id();
            let person = generate_person(person_id, now, rng);
            self.model.persons.insert(person_id, person);
            created.push(person_id);
        }
        created
    }

    /// Move up to `count` idle city residents into `kind`'s queue, chosen
    /// uniformly at random without replacement and capped at however many
    /// are actually available.
    pub fn enqueue_idle(
        &mut self,
        kind: FacilityKind,
        count: usize,
        rng: &mut impl Rng,
    ) -> Vec<PersonId> {
        if kind == FacilityKind::City || count == 0 {
            return Vec::new();
        }
        let pool = self.model.idle_city_person_ids();
        let selected: Vec<PersonId> = pool.choose_multiple(rng, count).copied().collect();
        let now = now_unix_ms();
        for &person_id in &selected {
            if let Some(person) = self.model.persons.get_mut(&person_id) {
                person.move_to(kind, now);
                person.set_queue_state(QueueState::Inline, now);
            }
        }
        selected
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    fn facility_kind(&self, facility_id: FacilityId) -> Option<FacilityKind> {
        self.model.facilities.get(&facility_id).map(|f| f.kind)
    }

    fn accept_one(
        &mut self,
        facility_id: FacilityId,
        kind: FacilityKind,
        person_id: PersonId,
        now: UnixMillis,
    ) -> Result<(), RejectReason> {
        {
            let person = self
                .model
                .persons
                .get(&person_id)
                .ok_or(RejectReason::PersonNotFound { person_id })?;
            check_person(person, kind, Some(QueueState::Inline))?;
        }
        let has_capacity = self
            .model
            .facilities
            .get(&facility_id)
            .map_or(false, Facility::has_free_capacity);
        if !has_capacity {
            return Err(RejectReason::AtCapacity { facility_id });
        }
        if let Some(person) = self.model.persons.get_mut(&person_id) {
            person.set_queue_state(QueueState::Service, now);
        }
        if let Some(facility) = self.model.facilities.get_mut(&facility_id) {
            facility.occupy(1, now);
        }
        Ok(())
    }

    fn service_done_one(
        &mut self,
        facility_id: FacilityId,
        kind: FacilityKind,
        person_id: PersonId,
        now: UnixMillis,
    ) -> Result<(), RejectReason> {
        {
            let person = self
                .model
                .persons
                .get(&person_id)
                .ok_or(RejectReason::PersonNotFound { person_id })?;
            check_person(person, kind, Some(QueueState::Service))?;
        }
        let (destination, queue_state) = route_after_service(kind);
        if let Some(person) = self.model.persons.get_mut(&person_id) {
            person.move_to(destination, now);
            person.set_queue_state(queue_state, now);
        }
        if let Some(facility) = self.model.facilities.get_mut(&facility_id) {
            facility.release(1, now);
        }
        Ok(())
    }

    fn injury_one(
        &mut self,
        facility_id: FacilityId,
        kind: FacilityKind,
        person_id: PersonId,
        now: UnixMillis,
    ) -> Result<(), RejectReason> {
        {
            let person = self
                .model
                .persons
                .get(&person_id)
                .ok_or(RejectReason::PersonNotFound { person_id })?;
            check_person(person, kind, Some(QueueState::Service))?;
        }
        if let Some(person) = self.model.persons.get_mut(&person_id) {
            person.injure(now);
            person.move_to(FacilityKind::Ecu, now);
            person.set_queue_state(QueueState::Inline, now);
        }
        if let Some(facility) = self.model.facilities.get_mut(&facility_id) {
            facility.release(1, now);
        }
        Ok(())
    }

    fn death_one(
        &mut self,
        facility_id: FacilityId,
        kind: FacilityKind,
        person_id: PersonId,
        now: UnixMillis,
    ) -> Result<(), RejectReason> {
        {
            let person = self
                .model
                .persons
                .get(&person_id)
                .ok_or(RejectReason::PersonNotFound { person_id })?;
            check_person(person, kind, None)?;
        }
        if let Some(person) = self.model.persons.get_mut(&person_id) {
            person.die(now);
        }
        if let Some(facility) = self.model.facilities.get_mut(&facility_id) {
            facility.release(1, now);
        }
        Ok(())
    }
}

/// Shared per-person preconditions: alive, located at the facility's kind,
/// and (when required) in the expected queue state.
fn check_person(
    person: &Person,
    kind: FacilityKind,
    required_queue: Option<QueueState>,
) -> Result<(), RejectReason> {
    if person.is_dead() {
        return Err(RejectReason::PersonDead {
            person_id: person.id,
        });
    }
    if person.facility_kind != kind {
        return Err(RejectReason::WrongFacilityKind {
            person_id: person.id,
            expected: kind,
            actual: person.facility_kind,
        });
    }
    match required_queue {
        Some(QueueState::Inline) if person.queue_state != QueueState::Inline => {
            Err(RejectReason::NotQueued {
                person_id: person.id,
            })
        }
        Some(QueueState::Service) if person.queue_state != QueueState::Service => {
            Err(RejectReason::NotInService {
                person_id: person.id,
            })
        }
        _ => Ok(()),
    }
}

/// Where a person goes once a facility finishes serving them.
fn route_after_service(kind: FacilityKind) -> (FacilityKind, QueueState) {
    match kind {
        FacilityKind::Ecu => (FacilityKind::Hospital, QueueState::Inline),
        FacilityKind::Hospital | FacilityKind::Store => (FacilityKind::City, QueueState::Idle),
        // The city is never registered, so nobody is ever in service there.
        FacilityKind::City => (FacilityKind::City, QueueState::Idle),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use serde_json::json;

    fn kernel() -> WorldKernel {
        WorldKernel::new(WorldConfig::default())
    }

    fn rng() -> StdRng {
        StdRng::seed_from_u64(1)
    }

    fn attrs(entries: &[(&str, Value)]) -> BTreeMap<String, Value> {
        entries
            .iter()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect()
    }

    /// Create a person and place them at `kind` in `queue_state`.
    fn place_person(kernel: &mut WorldKernel, kind: FacilityKind, queue_state: QueueState) -> PersonId {
        let mut rng = StdRng::seed_from_u64(kernel.model.persons.len() as u64 + 99);
        let person_id = kernel.repopulate(1, &mut rng)[0];
        let person = kernel.model.persons.get_mut(&person_id).unwrap();
        person.move_to(kind, 0);
        person.set_queue_state(queue_state, 0);
        person_id
    }

    #[test]
    fn register_returns_world_metadata() {
        let mut kernel = kernel();
        let outcome = kernel
            .register(FacilityKind::Store, 10, attrs(&[("Owner", json!("ACME"))]))
            .unwrap();

        assert_eq!(outcome.time_rate, 1);
        assert!(outcome.start_unix_ms > 0);

        let facility = &kernel.model.facilities[&outcome.facility_id];
        assert_eq!(facility.kind, FacilityKind::Store);
        assert_eq!(facility.max_capacity, 10);
        assert_eq!(facility.used_capacity, 0);

        let records = &kernel.model.attributes[&outcome.facility_id];
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "owner");
        assert_eq!(records[0].value, json!("ACME"));
    }

    #[test]
    fn register_rejects_the_city_kind() {
        let mut kernel = kernel();
        let err = kernel
            .register(FacilityKind::City, 10, BTreeMap::new())
            .unwrap_err();
        assert!(matches!(err, WorldError::KindNotRegistrable { .. }));
        assert!(kernel.model.facilities.is_empty());
    }

    #[test]
    fn register_rejects_negative_capacity() {
        let mut kernel = kernel();
        let err = kernel
            .register(FacilityKind::Store, -1, BTreeMap::new())
            .unwrap_err();
        assert_eq!(err, WorldError::InvalidCapacity { max_capacity: -1 });
    }

    #[test]
    fn snapshot_of_unknown_facility_is_not_found() {
        let kernel = kernel();
        let err = kernel.snapshot(404).unwrap_err();
        assert_eq!(err, WorldError::FacilityNotFound { facility_id: 404 });
    }

    #[test]
    fn snapshot_selects_exactly_the_queued_living() {
        let mut kernel = kernel();
        let store = kernel
            .register(FacilityKind::Store, 10, BTreeMap::new())
            .unwrap()
            .facility_id;

        let queued = place_person(&mut kernel, FacilityKind::Store, QueueState::Inline);
        place_person(&mut kernel, FacilityKind::Store, QueueState::Service);
        place_person(&mut kernel, FacilityKind::Hospital, QueueState::Inline);
        let dead = place_person(&mut kernel, FacilityKind::Store, QueueState::Inline);
        kernel.model.persons.get_mut(&dead).unwrap().die(1);

        let snapshot = kernel.snapshot(store).unwrap();
        let ids: Vec<PersonId> = snapshot.persons.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![queued]);
        assert!(!snapshot.earthquake_active);

        kernel.start_earthquake();
        assert!(kernel.snapshot(store).unwrap().earthquake_active);
    }

    #[test]
    fn accept_then_service_done_round_trip() {
        let mut kernel = kernel();
        let store = kernel
            .register(FacilityKind::Store, 10, BTreeMap::new())
            .unwrap()
            .facility_id;
        let person = place_person(&mut kernel, FacilityKind::Store, QueueState::Inline);

        let outcome = kernel.accept(store, &[person]);
        assert_eq!(outcome.accepted, vec![person]);
        assert!(outcome.rejected.is_empty());
        assert_eq!(kernel.model.facilities[&store].used_capacity, 1);
        assert_eq!(
            kernel.model.persons[&person].queue_state,
            QueueState::Service
        );

        let outcome = kernel.service_done(store, &[person]);
        assert_eq!(outcome.accepted, vec![person]);
        assert_eq!(kernel.model.facilities[&store].used_capacity, 0);
        assert_eq!(kernel.model.persons[&person].facility_kind, FacilityKind::City);
        assert_eq!(kernel.model.persons[&person].queue_state, QueueState::Idle);
    }

    #[test]
    fn accept_on_missing_facility_rejects_everyone() {
        let mut kernel = kernel();
        let person = place_person(&mut kernel, FacilityKind::Store, QueueState::Inline);
        let outcome = kernel.accept(404, &[person, 17]);
        assert!(outcome.accepted.is_empty());
        assert_eq!(outcome.rejected, vec![person, 17]);
    }

    #[test]
    fn accept_rejects_ineligible_persons_individually() {
        let mut kernel = kernel();
        let store = kernel
            .register(FacilityKind::Store, 10, BTreeMap::new())
            .unwrap()
            .facility_id;

        let eligible = place_person(&mut kernel, FacilityKind::Store, QueueState::Inline);
        let elsewhere = place_person(&mut kernel, FacilityKind::Hospital, QueueState::Inline);
        let serving = place_person(&mut kernel, FacilityKind::Store, QueueState::Service);
        let dead = place_person(&mut kernel, FacilityKind::Store, QueueState::Inline);
        kernel.model.persons.get_mut(&dead).unwrap().die(1);

        let outcome = kernel.accept(store, &[eligible, elsewhere, serving, dead, 999]);
        assert_eq!(outcome.accepted, vec![eligible]);
        assert_eq!(outcome.rejected, vec![elsewhere, serving, dead, 999]);
        assert_eq!(kernel.model.facilities[&store].used_capacity, 1);
    }

    #[test]
    fn accept_refuses_once_capacity_is_reached() {
        let mut kernel = kernel();
        let store = kernel
            .register(FacilityKind::Store, 1, BTreeMap::new())
            .unwrap()
            .facility_id;
        let first = place_person(&mut kernel, FacilityKind::Store, QueueState::Inline);
        let second = place_person(&mut kernel, FacilityKind::Store, QueueState::Inline);

        let outcome = kernel.accept(store, &[first, second]);
        assert_eq!(outcome.accepted, vec![first]);
        assert_eq!(outcome.rejected, vec![second]);
        assert_eq!(kernel.model.facilities[&store].used_capacity, 1);

        // Completing the first frees the slot for the second.
        kernel.service_done(store, &[first]);
        let outcome = kernel.accept(store, &[second]);
        assert_eq!(outcome.accepted, vec![second]);
    }

    #[test]
    fn duplicate_ids_only_transition_once() {
        let mut kernel = kernel();
        let store = kernel
            .register(FacilityKind::Store, 10, BTreeMap::new())
            .unwrap()
            .facility_id;
        let person = place_person(&mut kernel, FacilityKind::Store, QueueState::Inline);

        let outcome = kernel.accept(store, &[person, person]);
        assert_eq!(outcome.accepted, vec![person]);
        assert_eq!(outcome.rejected, vec![person]);
        assert_eq!(kernel.model.facilities[&store].used_capacity, 1);
    }

    #[test]
    fn ecu_service_escalates_to_hospital_queue() {
        let mut kernel = kernel();
        let ecu = kernel
            .register(FacilityKind::Ecu, 5, BTreeMap::new())
            .unwrap()
            .facility_id;
        let person = place_person(&mut kernel, FacilityKind::Ecu, QueueState::Service);
        kernel.model.facilities.get_mut(&ecu).unwrap().occupy(1, 0);

        let outcome = kernel.service_done(ecu, &[person]);
        assert_eq!(outcome.accepted, vec![person]);
        assert_eq!(
            kernel.model.persons[&person].facility_kind,
            FacilityKind::Hospital
        );
        assert_eq!(kernel.model.persons[&person].queue_state, QueueState::Inline);
        assert_eq!(kernel.model.facilities[&ecu].used_capacity, 0);
    }

    #[test]
    fn hospital_service_discharges_to_city() {
        let mut kernel = kernel();
        let hospital = kernel
            .register(FacilityKind::Hospital, 5, BTreeMap::new())
            .unwrap()
            .facility_id;
        let person = place_person(&mut kernel, FacilityKind::Hospital, QueueState::Service);

        let outcome = kernel.service_done(hospital, &[person]);
        assert_eq!(outcome.accepted, vec![person]);
        assert_eq!(kernel.model.persons[&person].facility_kind, FacilityKind::City);
        assert_eq!(kernel.model.persons[&person].queue_state, QueueState::Idle);
    }

    #[test]
    fn service_done_requires_the_service_state() {
        let mut kernel = kernel();
        let store = kernel
            .register(FacilityKind::Store, 5, BTreeMap::new())
            .unwrap()
            .facility_id;
        let queued = place_person(&mut kernel, FacilityKind::Store, QueueState::Inline);

        let outcome = kernel.service_done(store, &[queued]);
        assert!(outcome.accepted.is_empty());
        assert_eq!(outcome.rejected, vec![queued]);
    }

    #[test]
    fn injury_reroutes_into_emergency_care() {
        let mut kernel = kernel();
        let store = kernel
            .register(FacilityKind::Store, 5, BTreeMap::new())
            .unwrap()
            .facility_id;
        let person = place_person(&mut kernel, FacilityKind::Store, QueueState::Inline);
        kernel.accept(store, &[person]);

        let outcome = kernel.person_injury(store, &[person]);
        assert_eq!(outcome.accepted, vec![person]);
        let injured = &kernel.model.persons[&person];
        assert_eq!(injured.status, crate::types::PersonStatus::Injured);
        assert_eq!(injured.facility_kind, FacilityKind::Ecu);
        assert_eq!(injured.queue_state, QueueState::Inline);
        assert_eq!(kernel.model.facilities[&store].used_capacity, 0);
    }

    #[test]
    fn injury_requires_the_person_in_service() {
        let mut kernel = kernel();
        let store = kernel
            .register(FacilityKind::Store, 5, BTreeMap::new())
            .unwrap()
            .facility_id;
        let queued = place_person(&mut kernel, FacilityKind::Store, QueueState::Inline);

        let outcome = kernel.person_injury(store, &[queued]);
        assert_eq!(outcome.rejected, vec![queued]);
    }

    #[test]
    fn death_is_terminal() {
        let mut kernel = kernel();
        let store = kernel
            .register(FacilityKind::Store, 5, BTreeMap::new())
            .unwrap()
            .facility_id;
        let person = place_person(&mut kernel, FacilityKind::Store, QueueState::Inline);

        let outcome = kernel.person_death(store, &[person]);
        assert_eq!(outcome.accepted, vec![person]);
        assert!(kernel.model.persons[&person].is_dead());
        assert!(kernel.model.persons[&person].death_date_ms.is_some());

        // Already dead: every later transition rejects the id.
        assert_eq!(kernel.person_death(store, &[person]).rejected, vec![person]);
        assert_eq!(kernel.accept(store, &[person]).rejected, vec![person]);
        assert_eq!(kernel.service_done(store, &[person]).rejected, vec![person]);
        assert_eq!(kernel.person_injury(store, &[person]).rejected, vec![person]);
        assert_eq!(
            kernel.model.persons[&person].queue_state,
            QueueState::Inline
        );
    }

    #[test]
    fn death_ignores_queue_state_and_floors_capacity() {
        let mut kernel = kernel();
        let store = kernel
            .register(FacilityKind::Store, 5, BTreeMap::new())
            .unwrap()
            .facility_id;
        let queued = place_person(&mut kernel, FacilityKind::Store, QueueState::Inline);

        assert_eq!(kernel.model.facilities[&store].used_capacity, 0);
        let outcome = kernel.person_death(store, &[queued]);
        assert_eq!(outcome.accepted, vec![queued]);
        // The person never held a slot; the decrement floors at zero.
        assert_eq!(kernel.model.facilities[&store].used_capacity, 0);
    }

    #[test]
    fn update_self_replaces_the_whole_attribute_set() {
        let mut kernel = kernel();
        let store = kernel
            .register(
                FacilityKind::Store,
                10,
                attrs(&[("Owner", json!("ACME")), ("Floors", json!(2))]),
            )
            .unwrap()
            .facility_id;

        let updated = kernel.update_self(store, 25, attrs(&[("District", json!("north"))]));
        assert!(updated);
        assert_eq!(kernel.model.facilities[&store].max_capacity, 25);

        let records = &kernel.model.attributes[&store];
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "district");
        assert_eq!(records[0].value, json!("north"));
    }

    #[test]
    fn update_self_fails_without_existing_attributes() {
        let mut kernel = kernel();
        let store = kernel
            .register(FacilityKind::Store, 10, BTreeMap::new())
            .unwrap()
            .facility_id;

        let updated = kernel.update_self(store, 25, attrs(&[("Owner", json!("ACME"))]));
        assert!(!updated);
        assert_eq!(kernel.model.facilities[&store].max_capacity, 10);
        assert!(kernel.model.attributes[&store].is_empty());
    }

    #[test]
    fn update_self_fails_for_missing_facility_or_bad_capacity() {
        let mut kernel = kernel();
        assert!(!kernel.update_self(404, 25, attrs(&[("Owner", json!("ACME"))])));

        let store = kernel
            .register(FacilityKind::Store, 10, attrs(&[("Owner", json!("ACME"))]))
            .unwrap()
            .facility_id;
        assert!(!kernel.update_self(store, -5, attrs(&[("Owner", json!("ACME"))])));
        assert_eq!(kernel.model.facilities[&store].max_capacity, 10);
    }

    #[test]
    fn earthquake_flag_is_idempotent() {
        let mut kernel = kernel();
        assert!(!kernel.earthquake_active());
        kernel.start_earthquake();
        kernel.start_earthquake();
        assert!(kernel.earthquake_active());
        kernel.stop_earthquake();
        kernel.stop_earthquake();
        assert!(!kernel.earthquake_active());
    }

    #[test]
    fn repopulate_creates_persons_in_the_city() {
        let mut kernel = kernel();
        let mut rng = rng();
        let created = kernel.repopulate(5, &mut rng);
        assert_eq!(created.len(), 5);
        assert_eq!(kernel.model.persons.len(), 5);
        for person_id in created {
            let person = &kernel.model.persons[&person_id];
            assert_eq!(person.facility_kind, FacilityKind::City);
            assert_eq!(person.queue_state, QueueState::Idle);
        }
    }

    #[test]
    fn enqueue_idle_caps_at_the_available_pool() {
        let mut kernel = kernel();
        let mut rng = rng();
        kernel.repopulate(3, &mut rng);

        let moved = kernel.enqueue_idle(FacilityKind::Store, 5, &mut rng);
        assert_eq!(moved.len(), 3);
        for person_id in &moved {
            let person = &kernel.model.persons[person_id];
            assert_eq!(person.facility_kind, FacilityKind::Store);
            assert_eq!(person.queue_state, QueueState::Inline);
        }

        // Pool drained: nothing left to move.
        assert!(kernel.enqueue_idle(FacilityKind::Hospital, 2, &mut rng).is_empty());
    }

    #[test]
    fn enqueue_idle_selects_without_replacement() {
        let mut kernel = kernel();
        let mut rng = rng();
        kernel.repopulate(10, &mut rng);

        let moved = kernel.enqueue_idle(FacilityKind::Ecu, 6, &mut rng);
        let unique: std::collections::BTreeSet<_> = moved.iter().collect();
        assert_eq!(unique.len(), moved.len());
    }

    #[test]
    fn enqueue_idle_never_targets_the_city() {
        let mut kernel = kernel();
        let mut rng = rng();
        kernel.repopulate(4, &mut rng);
        assert!(kernel.enqueue_idle(FacilityKind::City, 2, &mut rng).is_empty());
    }
}
