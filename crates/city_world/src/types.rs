//! Core type definitions: IDs, enums, the id allocator, and time helpers.

use std::fmt;
use std::str::FromStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::kernel::WorldError;

// ============================================================================
// Type Aliases
// ============================================================================

pub type FacilityId = u64;
pub type PersonId = u64;
pub type RecordId = u64;
pub type WorldClock = u64;
pub type UnixMillis = i64;

// ============================================================================
// Facility Kind
// ============================================================================

/// The kind of a service facility. `City` is the implicit holding area every
/// person starts in; it is never registered as a facility of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FacilityKind {
    City,
    Store,
    Hospital,
    Ecu,
}

impl FacilityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FacilityKind::City => "city",
            FacilityKind::Store => "store",
            FacilityKind::Hospital => "hospital",
            FacilityKind::Ecu => "ecu",
        }
    }
}

impl fmt::Display for FacilityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FacilityKind {
    type Err = WorldError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "city" => Ok(FacilityKind::City),
            "store" => Ok(FacilityKind::Store),
            "hospital" => Ok(FacilityKind::Hospital),
            "ecu" => Ok(FacilityKind::Ecu),
            _ => Err(WorldError::UnknownKind {
                kind: raw.to_string(),
            }),
        }
    }
}

// ============================================================================
// Person Enums
// ============================================================================

/// Health status. `Dead` is terminal: no later transition may touch the
/// person again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersonStatus {
    Alive,
    Injured,
    Dead,
}

impl PersonStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PersonStatus::Alive => "alive",
            PersonStatus::Injured => "injured",
            PersonStatus::Dead => "dead",
        }
    }
}

impl fmt::Display for PersonStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a person stands relative to their current facility. `Idle` is only
/// meaningful while the person is in the city.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueState {
    Idle,
    Inline,
    Service,
}

impl QueueState {
    pub fn as_str(self) -> &'static str {
        match self {
            QueueState::Idle => "idle",
            QueueState::Inline => "inline",
            QueueState::Service => "service",
        }
    }
}

impl fmt::Display for QueueState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
}

// ============================================================================
// Id Allocator
// ============================================================================

/// Monotonic counter handing out collision-free integer ids for facilities,
/// persons, and attribute records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdAllocator {
    next: u64,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self { next: 1 }
    }

    pub fn next_id(&mut self) -> u64 {
        let id = self.next;
        self.next = self.next.saturating_add(1);
        id
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Time Helpers
// ============================================================================

pub fn now_unix_ms() -> UnixMillis {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(saturating_duration_ms)
        .unwrap_or(0)
}

fn saturating_duration_ms(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}
