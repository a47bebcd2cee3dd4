//! World entities: Facility, AttributeRecord, Person, Snapshot, WorldModel.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{
    FacilityId, FacilityKind, Gender, PersonId, PersonStatus, QueueState, RecordId, UnixMillis,
    WorldClock,
};

// ============================================================================
// Facility
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Facility {
    pub id: FacilityId,
    pub kind: FacilityKind,
    pub max_capacity: i64,
    pub used_capacity: i64,
    pub created_at_ms: UnixMillis,
    pub modified_at_ms: UnixMillis,
}

impl Facility {
    pub fn new(id: FacilityId, kind: FacilityKind, max_capacity: i64, now_ms: UnixMillis) -> Self {
        Self {
            id,
            kind,
            max_capacity,
            used_capacity: 0,
            created_at_ms: now_ms,
            modified_at_ms: now_ms,
        }
    }

    pub fn has_free_capacity(&self) -> bool {
        self.used_capacity < self.max_capacity
    }

    /// Take `count` service slots.
    pub fn occupy(&mut self, count: i64, now_ms: UnixMillis) {
        self.used_capacity = self.used_capacity.saturating_add(count);
        self.modified_at_ms = now_ms;
    }

    /// Free `count` service slots, never dropping below zero.
    pub fn release(&mut self, count: i64, now_ms: UnixMillis) {
        self.used_capacity = self.used_capacity.saturating_sub(count).max(0);
        self.modified_at_ms = now_ms;
    }

    pub fn set_max_capacity(&mut self, max_capacity: i64, now_ms: UnixMillis) {
        self.max_capacity = max_capacity;
        self.modified_at_ms = now_ms;
    }
}

// ============================================================================
// Attribute Record
// ============================================================================

/// Free-form facility metadata. Names are stored lower-cased; values carry
/// whatever the caller supplied (string, integer, list, or mapping).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeRecord {
    pub id: RecordId,
    pub facility_id: FacilityId,
    pub name: String,
    pub value: Value,
    pub created_at_ms: UnixMillis,
    pub modified_at_ms: UnixMillis,
}

impl AttributeRecord {
    pub fn new(
        id: RecordId,
        facility_id: FacilityId,
        name: &str,
        value: Value,
        now_ms: UnixMillis,
    ) -> Self {
        Self {
            id,
            facility_id,
            name: name.to_lowercase(),
            value,
            created_at_ms: now_ms,
            modified_at_ms: now_ms,
        }
    }
}

// ============================================================================
// Person
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Person {
    pub id: PersonId,
    pub name: String,
    pub gender: Gender,
    pub birth_date_ms: UnixMillis,
    pub national_code: String,
    pub status: PersonStatus,
    pub facility_kind: FacilityKind,
    pub queue_state: QueueState,
    pub created_at_ms: UnixMillis,
    pub modified_at_ms: UnixMillis,
    pub death_date_ms: Option<UnixMillis>,
}

impl Person {
    /// A freshly created person: alive, in the city, unassigned.
    pub fn new(
        id: PersonId,
        name: String,
        gender: Gender,
        birth_date_ms: UnixMillis,
        national_code: String,
        now_ms: UnixMillis,
    ) -> Self {
        Self {
            id,
            name,
            gender,
            birth_date_ms,
            national_code,
            status: PersonStatus::Alive,
            facility_kind: FacilityKind::City,
            queue_state: QueueState::Idle,
            created_at_ms: now_ms,
            modified_at_ms: now_ms,
            death_date_ms: None,
        }
    }

    pub fn is_dead(&self) -> bool {
        self.status == PersonStatus::Dead
    }

    pub fn injure(&mut self, now_ms: UnixMillis) {
        self.status = PersonStatus::Injured;
        self.modified_at_ms = now_ms;
    }

    pub fn die(&mut self, now_ms: UnixMillis) {
        self.status = PersonStatus::Dead;
        self.death_date_ms = Some(now_ms);
        self.modified_at_ms = now_ms;
    }

    pub fn move_to(&mut self, kind: FacilityKind, now_ms: UnixMillis) {
        self.facility_kind = kind;
        self.modified_at_ms = now_ms;
    }

    pub fn set_queue_state(&mut self, queue_state: QueueState, now_ms: UnixMillis) {
        self.queue_state = queue_state;
        self.modified_at_ms = now_ms;
    }
}

// ============================================================================
// Snapshot
// ============================================================================

/// Point-in-time view of one facility's queue and the world earthquake flag.
/// Built fresh on every query, never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub facility_id: FacilityId,
    pub persons: Vec<Person>,
    pub earthquake_active: bool,
    pub clock: WorldClock,
}

// ============================================================================
// World Model (aggregate)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct WorldModel {
    pub facilities: BTreeMap<FacilityId, Facility>,
    pub attributes: BTreeMap<FacilityId, Vec<AttributeRecord>>,
    pub persons: BTreeMap<PersonId, Person>,
    pub earthquake_active: bool,
}

impl WorldModel {
    /// Everyone waiting in line at facilities of `kind`, excluding the dead.
    pub fn queued_persons(&self, kind: FacilityKind) -> Vec<Person> {
        self.persons
            .values()
            .filter(|person| {
                person.facility_kind == kind
                    && person.queue_state == QueueState::Inline
                    && !person.is_dead()
            })
            .cloned()
            .collect()
    }

    /// The pool the queue-refill cycle draws from: unassigned city residents
    /// who are still alive (or injured, but not dead).
    pub fn idle_city_person_ids(&self) -> Vec<PersonId> {
        self.persons
            .values()
            .filter(|person| {
                person.facility_kind == FacilityKind::City
                    && person.queue_state == QueueState::Idle
                    && !person.is_dead()
            })
            .map(|person| person.id)
            .collect()
    }
}
