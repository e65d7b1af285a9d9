//! Shared primitive types used across the engine.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A simulation tick, supplied by the host clock.
pub type Tick = u64;

/// Catalog identifier of a contract template.
pub type ContractId = String;

/// A specific accepted instance of a contract.
/// The same template may be accepted more than once, so this is
/// assigned by the engine and never derived from the contract id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActivationId(pub u64);

impl fmt::Display for ActivationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "act-{}", self.0)
    }
}

/// Roster-assigned handle for a hired specialist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpecialistId(pub u64);

impl fmt::Display for SpecialistId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "specialist-{}", self.0)
    }
}
