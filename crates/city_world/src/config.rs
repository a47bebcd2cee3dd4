//! World configuration: simulation rate, seeding, and cycle intervals.

use std::fmt;
use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::types::FacilityKind;

/// Tunable parameters for a world. Every field has a default, so a config
/// file only needs to name the values it overrides. Intervals and durations
/// are measured in world-clock units, not wall seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// World-clock units per elapsed wall second. Fixed at creation.
    pub time_rate: u64,
    /// Seed for the runtime's random source. Zero means "derive from the
    /// current time" so unconfigured worlds differ between runs.
    pub seed: u64,
    pub initial_population: usize,
    pub initial_store_line: usize,
    pub initial_hospital_line: usize,
    pub initial_ecu_line: usize,
    pub repopulate_interval: u64,
    pub repopulate_count: usize,
    pub refill_interval: u64,
    pub store_refill_count: usize,
    pub hospital_refill_count: usize,
    pub ecu_refill_count: usize,
    pub earthquake_interval: u64,
    pub earthquake_duration: u64,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            time_rate: 1,
            seed: 0,
            initial_population: 20,
            initial_store_line: 3,
            initial_hospital_line: 3,
            initial_ecu_line: 3,
            repopulate_interval: 50,
            repopulate_count: 5,
            refill_interval: 25,
            store_refill_count: 2,
            hospital_refill_count: 2,
            ecu_refill_count: 2,
            earthquake_interval: 300,
            earthquake_duration: 15,
        }
    }
}

impl WorldConfig {
    pub fn sanitized(mut self) -> Self {
        if self.time_rate == 0 {
            self.time_rate = 1;
        }
        self
    }

    /// How many idle city residents each refill cycle moves into this kind's
    /// queue. The city itself has no queue.
    pub fn refill_count(&self, kind: FacilityKind) -> usize {
        match kind {
            FacilityKind::City => 0,
            FacilityKind::Store => self.store_refill_count,
            FacilityKind::Hospital => self.hospital_refill_count,
            FacilityKind::Ecu => self.ecu_refill_count,
        }
    }

    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path.as_ref())?;
        let config: Self = toml::from_str(&raw)?;
        Ok(config.sanitized())
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Io(String),
    Parse(String),
}

impl From<io::Error> for ConfigError {
    fn from(err: io::Error) -> Self {
        ConfigError::Io(err.to_string())
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        ConfigError::Parse(err.to_string())
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(reason) => write!(f, "failed to read config file: {}", reason),
            ConfigError::Parse(reason) => write!(f, "failed to parse config file: {}", reason),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_every_field() {
        let config = WorldConfig::default();
        assert_eq!(config.time_rate, 1);
        assert_eq!(config.initial_population, 20);
        assert_eq!(config.repopulate_interval, 50);
        assert_eq!(config.repopulate_count, 5);
        assert_eq!(config.refill_interval, 25);
        assert_eq!(config.earthquake_interval, 300);
        assert_eq!(config.earthquake_duration, 15);
    }

    #[test]
    fn sanitized_bumps_zero_time_rate() {
        let config = WorldConfig {
            time_rate: 0,
            ..WorldConfig::default()
        };
        assert_eq!(config.sanitized().time_rate, 1);
    }

    #[test]
    fn partial_toml_falls_back_to_defaults() {
        let config: WorldConfig =
            toml::from_str("time_rate = 60\ninitial_population = 5\n").unwrap();
        assert_eq!(config.time_rate, 60);
        assert_eq!(config.initial_population, 5);
        assert_eq!(config.refill_interval, 25);
        assert_eq!(config.store_refill_count, 2);
    }

    #[test]
    fn refill_count_is_zero_for_the_city() {
        let config = WorldConfig::default();
        assert_eq!(config.refill_count(FacilityKind::City), 0);
        assert_eq!(config.refill_count(FacilityKind::Store), 2);
        assert_eq!(config.refill_count(FacilityKind::Hospital), 2);
        assert_eq!(config.refill_count(FacilityKind::Ecu), 2);
    }

    #[test]
    fn load_from_path_reads_and_sanitizes() {
        let path = std::env::temp_dir().join("city_world_config_test.toml");
        fs::write(&path, "time_rate = 0\nseed = 42\n").unwrap();
        let config = WorldConfig::load_from_path(&path).unwrap();
        fs::remove_file(&path).ok();
        assert_eq!(config.time_rate, 1);
        assert_eq!(config.seed, 42);
    }

    #[test]
    fn load_from_path_surfaces_parse_errors() {
        let path = std::env::temp_dir().join("city_world_config_bad.toml");
        fs::write(&path, "time_rate = \"fast\"\n").unwrap();
        let err = WorldConfig::load_from_path(&path).unwrap_err();
        fs::remove_file(&path).ok();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
