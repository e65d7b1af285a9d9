//! Capacity model: how much contract load the roster can carry.
//!
//! total_capacity = Σ available (efficiency × speed_weight(tier))
//! used_capacity  = Σ estimated_load over active contracts
//!
//! The tier weight has diminishing returns so stacking high-tier staff
//! grows capacity sub-linearly. The snapshot is always a pure function
//! of the roster and the active set; the engine recomputes it on every
//! state change and never mutates it in place.

use crate::{
    catalog::Contract,
    config::{EngineConfig, TierCurve},
    roster::SpecialistRoster,
    sla::{ActiveContract, ContractStatus},
    types::Tick,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CapacitySnapshot {
    pub total_capacity:        f64,
    pub used_capacity:         f64,
    pub average_efficiency:    f64,
    pub average_defense:       f64,
    pub available_specialists: usize,
    pub computed_at_tick:      Tick,
}

impl CapacitySnapshot {
    /// used / total, guarded against an empty roster.
    pub fn load_ratio(&self, epsilon: f64) -> f64 {
        self.used_capacity / self.total_capacity.max(epsilon)
    }

    /// Capacity still available before `overload_factor` is reached.
    pub fn headroom(&self, overload_factor: f64) -> f64 {
        (self.total_capacity * overload_factor - self.used_capacity).max(0.0)
    }
}

/// Monotonic non-decreasing and bounded in tier.
pub fn speed_weight(curve: &TierCurve, tier: u32) -> f64 {
    let bonus_tiers = tier.saturating_sub(1).min(curve.max_bonus_tiers);
    1.0 + curve.step * bonus_tiers as f64
}

/// risk_weight(risk) × duration midpoint / time_unit
pub fn estimated_load(contract: &Contract, config: &EngineConfig) -> f64 {
    let weight = config.risk.weights.get(contract.risk_level);
    weight * contract.duration_range.midpoint() / config.time_unit.max(config.epsilon)
}

pub fn calculate_workload_capacity<'a>(
    roster: &SpecialistRoster,
    contracts: impl IntoIterator<Item = &'a ActiveContract>,
    config: &EngineConfig,
    tick: Tick,
) -> CapacitySnapshot {
    let agg = roster.aggregate(&config.tier_curve);
    let divisor = agg.available_count.max(1) as f64;

    let used_capacity = contracts
        .into_iter()
        .filter(|c| c.status == ContractStatus::Active)
        .map(|c| c.estimated_load)
        .sum();

    CapacitySnapshot {
        total_capacity: agg.total_speed_weighted_efficiency,
        used_capacity,
        average_efficiency: agg.total_efficiency / divisor,
        average_defense: agg.total_defense / divisor,
        available_specialists: agg.available_count,
        computed_at_tick: tick,
    }
}
