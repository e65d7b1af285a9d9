//! Engine state snapshot: the single persisted unit.
//!
//! `ContractEngine::get_state()` produces it and `load_state()` consumes it.
//! How and where it is written is up to the host's save-game writer;
//! `to_json`/`from_json` are provided for convenience.

use crate::{
    capacity::CapacitySnapshot,
    error::SimResult,
    sla::ActiveContract,
    types::{ActivationId, ContractId, Tick},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineCounters {
    pub total_accepted:  u64,
    pub total_breached:  u64,
    pub total_completed: u64,
    #[serde(default)]
    pub total_cancelled: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineState {
    /// Clock reading when the snapshot was taken.
    pub tick:               Tick,
    /// Sequence number of the next activation id to issue.
    pub next_activation:    u64,
    pub active_contracts:   Vec<ActiveContract>,
    pub capacity:           CapacitySnapshot,
    pub counters:           EngineCounters,
    /// Tick at which the capacity warning last fired, if any.
    #[serde(default)]
    pub capacity_warned_at: Option<Tick>,
}

impl EngineState {
    pub fn to_json(&self) -> SimResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> SimResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// A restored activation whose contract is no longer in the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DanglingReference {
    pub activation_id: ActivationId,
    pub contract_id:   ContractId,
}

/// What `load_state` kept and what it dropped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RestoreReport {
    pub restored:   usize,
    pub dangling:   Vec<DanglingReference>,
    /// Activation ids that appeared more than once; only the first was kept.
    pub duplicates: Vec<ActivationId>,
    /// Kept activations whose saved load or SLA limit disagreed with the catalog.
    pub corrected:  Vec<ActivationId>,
}

impl RestoreReport {
    pub fn is_clean(&self) -> bool {
        self.dangling.is_empty() && self.duplicates.is_empty() && self.corrected.is_empty()
    }
}
