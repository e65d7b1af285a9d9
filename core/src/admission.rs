//! Admission control: may this contract be accepted right now?
//!
//! Checks run in a fixed order and the first failure wins:
//!   1. the contract exists in the catalog       → NotFound
//!   2. used + load ≤ total × overload_factor    → CapacityExceeded
//!   3. average defense ≥ risk threshold         → RiskMismatch
//!   4. the economy can fund it                  → BudgetInsufficient
//!
//! Rejections are ordinary values, never errors.

use crate::{
    capacity::{estimated_load, CapacitySnapshot},
    catalog::{Contract, ContractCatalog},
    config::EngineConfig,
    types::ActivationId,
};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    NotFound,
    CapacityExceeded,
    RiskMismatch,
    BudgetInsufficient,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::NotFound           => "not_found",
            Self::CapacityExceeded   => "capacity_exceeded",
            Self::RiskMismatch       => "risk_mismatch",
            Self::BudgetInsufficient => "budget_insufficient",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub accepted:      bool,
    pub reason:        Option<RejectReason>,
    /// Set when the contract was actually admitted.
    pub activation_id: Option<ActivationId>,
}

impl Decision {
    pub fn accepted(activation_id: Option<ActivationId>) -> Self {
        Self { accepted: true, reason: None, activation_id }
    }

    pub fn rejected(reason: RejectReason) -> Self {
        Self { accepted: false, reason: Some(reason), activation_id: None }
    }
}

/// Budget feasibility, owned by the economy collaborator.
pub trait BudgetCheck {
    fn can_afford(&self, contract: &Contract) -> bool;
}

impl<F: Fn(&Contract) -> bool> BudgetCheck for F {
    fn can_afford(&self, contract: &Contract) -> bool {
        self(contract)
    }
}

/// Budget check for hosts without an economy model.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysAffordable;

impl BudgetCheck for AlwaysAffordable {
    fn can_afford(&self, _contract: &Contract) -> bool {
        true
    }
}

/// A contract that passed every check, with the load it will add.
#[derive(Debug, Clone, Copy)]
pub struct Admissible<'a> {
    pub contract:       &'a Contract,
    pub estimated_load: f64,
}

/// Run the admission checks against the current snapshot. Pure.
pub fn evaluate<'a>(
    contract_id: &str,
    catalog: &'a ContractCatalog,
    capacity: &CapacitySnapshot,
    config: &EngineConfig,
    budget: &dyn BudgetCheck,
) -> Result<Admissible<'a>, RejectReason> {
    let contract = catalog.get(contract_id).map_err(|_| RejectReason::NotFound)?;

    let load = estimated_load(contract, config);
    if capacity.used_capacity + load > capacity.total_capacity * config.overload_factor {
        return Err(RejectReason::CapacityExceeded);
    }

    let threshold = config.risk.thresholds.get(contract.risk_level);
    if capacity.average_defense < threshold {
        return Err(RejectReason::RiskMismatch);
    }

    if !budget.can_afford(contract) {
        return Err(RejectReason::BudgetInsufficient);
    }

    Ok(Admissible { contract, estimated_load: load })
}
