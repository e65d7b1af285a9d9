//! SLA tracker: owns every accepted contract activation.
//!
//! Lifecycle (one-directional):
//!   active → breached | completed | cancelled
//!
//! RULES:
//!   - incident_count never decreases and is frozen once status leaves `active`.
//!   - Calls against a settled or unknown activation return StaleReference
//!     and change nothing.
//!   - Iteration order is insertion order.

use crate::{
    error::StaleReference,
    types::{ActivationId, ContractId, Tick},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractStatus {
    Active,
    Breached,
    Completed,
    Cancelled,
}

impl ContractStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Active)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveContract {
    pub activation_id:         ActivationId,
    pub contract_id:           ContractId,
    pub accepted_at_tick:      Tick,
    pub incident_count:        u32,
    pub status:                ContractStatus,
    /// Copied from the catalog at admission.
    pub estimated_load:        f64,
    /// Copied from the catalog at admission.
    pub max_allowed_incidents: u32,
}

impl ActiveContract {
    pub fn new(
        activation_id: ActivationId,
        contract_id: ContractId,
        accepted_at_tick: Tick,
        estimated_load: f64,
        max_allowed_incidents: u32,
    ) -> Self {
        Self {
            activation_id,
            contract_id,
            accepted_at_tick,
            incident_count: 0,
            status: ContractStatus::Active,
            estimated_load,
            max_allowed_incidents,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncidentOutcome {
    Recorded { incident_count: u32 },
    /// The incident pushed the count past the SLA limit. Reported once per activation.
    Breached { incident_count: u32, max_allowed: u32 },
}

#[derive(Debug, Clone, Default)]
pub struct SlaTracker {
    contracts: Vec<ActiveContract>,
    index:     HashMap<ActivationId, usize>,
}

impl SlaTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a tracker from restored activations. Later duplicates of an
    /// activation id are returned instead of tracked.
    pub fn from_contracts(contracts: Vec<ActiveContract>) -> (Self, Vec<ActiveContract>) {
        let mut tracker = Self::new();
        let mut duplicates = Vec::new();
        for contract in contracts {
            if tracker.index.contains_key(&contract.activation_id) {
                duplicates.push(contract);
            } else {
                tracker.register(contract);
            }
        }
        (tracker, duplicates)
    }

    pub fn register(&mut self, contract: ActiveContract) {
        debug_assert!(!self.index.contains_key(&contract.activation_id));
        self.index.insert(contract.activation_id, self.contracts.len());
        self.contracts.push(contract);
    }

    pub fn record_incident(&mut self, id: ActivationId) -> Result<IncidentOutcome, StaleReference> {
        let contract = self.active_mut(id)?;
        contract.incident_count = contract.incident_count.saturating_add(1);
        if contract.incident_count > contract.max_allowed_incidents {
            contract.status = ContractStatus::Breached;
            return Ok(IncidentOutcome::Breached {
                incident_count: contract.incident_count,
                max_allowed:    contract.max_allowed_incidents,
            });
        }
        Ok(IncidentOutcome::Recorded { incident_count: contract.incident_count })
    }

    pub fn complete(&mut self, id: ActivationId) -> Result<ContractStatus, StaleReference> {
        self.settle(id, ContractStatus::Completed)
    }

    pub fn cancel(&mut self, id: ActivationId) -> Result<ContractStatus, StaleReference> {
        self.settle(id, ContractStatus::Cancelled)
    }

    pub fn get(&self, id: ActivationId) -> Option<&ActiveContract> {
        self.index.get(&id).map(|&i| &self.contracts[i])
    }

    /// Activations with status `active`, in insertion order.
    pub fn get_active(&self) -> impl Iterator<Item = &ActiveContract> {
        self.contracts.iter().filter(|c| c.status == ContractStatus::Active)
    }

    /// Every tracked activation, settled ones included, in insertion order.
    pub fn contracts(&self) -> &[ActiveContract] {
        &self.contracts
    }

    pub fn len(&self) -> usize {
        self.contracts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contracts.is_empty()
    }

    /// Drop settled activations. Returns how many were removed.
    pub fn prune_settled(&mut self) -> usize {
        let before = self.contracts.len();
        self.contracts.retain(|c| !c.status.is_terminal());
        self.index = self
            .contracts
            .iter()
            .enumerate()
            .map(|(i, c)| (c.activation_id, i))
            .collect();
        before - self.contracts.len()
    }

    fn settle(&mut self, id: ActivationId, status: ContractStatus) -> Result<ContractStatus, StaleReference> {
        let contract = self.active_mut(id)?;
        contract.status = status;
        Ok(status)
    }

    fn active_mut(&mut self, id: ActivationId) -> Result<&mut ActiveContract, StaleReference> {
        let &i = self
            .index
            .get(&id)
            .ok_or(StaleReference::Unknown { activation_id: id })?;
        let contract = &mut self.contracts[i];
        if contract.status.is_terminal() {
            return Err(StaleReference::Settled { activation_id: id, status: contract.status });
        }
        Ok(contract)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker_with(max_allowed: u32) -> SlaTracker {
        let mut tracker = SlaTracker::new();
        tracker.register(ActiveContract::new(ActivationId(1), "c".into(), 0, 1.0, max_allowed));
        tracker
    }

    #[test]
    fn zero_tolerance_breaches_on_first_incident() {
        let mut tracker = tracker_with(0);
        assert_eq!(
            tracker.record_incident(ActivationId(1)),
            Ok(IncidentOutcome::Breached { incident_count: 1, max_allowed: 0 })
        );
    }

    #[test]
    fn settled_contract_rejects_further_transitions() {
        let mut tracker = tracker_with(3);
        assert_eq!(tracker.cancel(ActivationId(1)), Ok(ContractStatus::Cancelled));
        assert_eq!(
            tracker.complete(ActivationId(1)),
            Err(StaleReference::Settled {
                activation_id: ActivationId(1),
                status: ContractStatus::Cancelled,
            })
        );
        assert!(tracker.record_incident(ActivationId(1)).is_err());
        assert_eq!(tracker.get(ActivationId(1)).unwrap().incident_count, 0);
    }

    #[test]
    fn prune_keeps_index_consistent() {
        let mut tracker = SlaTracker::new();
        for n in 1..=3 {
            tracker.register(ActiveContract::new(ActivationId(n), "c".into(), 0, 1.0, 1));
        }
        tracker.complete(ActivationId(1)).unwrap();
        assert_eq!(tracker.prune_settled(), 1);
        assert!(tracker.get(ActivationId(1)).is_none());
        assert_eq!(tracker.get(ActivationId(3)).unwrap().activation_id, ActivationId(3));
        assert!(tracker.record_incident(ActivationId(2)).is_ok());
    }

    #[test]
    fn duplicates_are_split_out_on_restore() {
        let a = ActiveContract::new(ActivationId(7), "c".into(), 0, 1.0, 1);
        let (tracker, dupes) = SlaTracker::from_contracts(vec![a.clone(), a]);
        assert_eq!(tracker.len(), 1);
        assert_eq!(dupes.len(), 1);
    }

    #[test]
    fn incident_count_saturates_instead_of_overflowing() {
        let mut tracker = SlaTracker::new();
        let mut worn = ActiveContract::new(ActivationId(7), "c".into(), 0, 1.0, u32::MAX - 1);
        worn.incident_count = u32::MAX;
        tracker.register(worn);

        assert_eq!(
            tracker.record_incident(ActivationId(7)),
            Ok(IncidentOutcome::Breached { incident_count: u32::MAX, max_allowed: u32::MAX - 1 })
        );
    }
}
