//! Error taxonomy: config errors (fail fast at scenario construction) and
//! domain-violation errors (scheduler/model bugs that must not be silently clamped).

use std::fmt;

/// A single configuration problem, named by the offending field.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigError {
    pub field: String,
    pub message: String,
}

impl ConfigError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "config error [{}]: {}", self.field, self.message)
    }
}

impl std::error::Error for ConfigError {}

/// Domain-violation errors: these indicate a scheduler or model bug, never an
/// expected runtime condition. They must surface directly to the caller and
/// halt the run (no retries, no silent clamping).
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DomainError {
    #[error("soc {soc} out of bounds [{min}, 1] for battery")]
    SocOutOfBounds { soc: f64, min: f64 },

    #[error("storage discharge of {requested} kW exceeds max discharge of {max} kW at current soc")]
    StorageOverdischarge { requested: f64, max: f64 },

    #[error("assigned power {power} kW for cp {cp_id} is negative")]
    NegativeAssignedPower { cp_id: u64, power: f64 },

    #[error("station {station_id} assignment {assigned} kW exceeds max {max} kW")]
    StationOverflow {
        station_id: u64,
        assigned: f64,
        max: f64,
    },

    #[error("invalid distribution: {0}")]
    InvalidDistribution(String),

    #[error("infrastructure tree malformed: {0}")]
    MalformedTree(String),
}
