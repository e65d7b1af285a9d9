use crate::{
    catalog::{ContractCatalog, RiskLevel},
    error::{SimError, SimResult},
    roster::SpecialistRoster,
};
use serde::{Deserialize, Serialize};

// ── Capacity curve ─────────────────────────────────────────────────

/// Diminishing-returns weight applied per specialist tier.
/// weight(tier) = 1 + step × min(tier - 1, max_bonus_tiers)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierCurve {
    pub step:            f64,
    pub max_bonus_tiers: u32,
}

impl Default for TierCurve {
    fn default() -> Self {
        Self { step: 0.15, max_bonus_tiers: 5 }
    }
}

// ── Risk table ─────────────────────────────────────────────────────

/// One value per risk level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskValues {
    pub low:      f64,
    pub medium:   f64,
    pub high:     f64,
    pub critical: f64,
}

impl RiskValues {
    pub fn get(&self, level: RiskLevel) -> f64 {
        match level {
            RiskLevel::Low      => self.low,
            RiskLevel::Medium   => self.medium,
            RiskLevel::High     => self.high,
            RiskLevel::Critical => self.critical,
        }
    }

    fn values(&self) -> [f64; 4] {
        [self.low, self.medium, self.high, self.critical]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskTable {
    /// Load multiplier per risk level.
    pub weights:    RiskValues,
    /// Minimum average roster defense required to accept a contract.
    pub thresholds: RiskValues,
}

impl Default for RiskTable {
    fn default() -> Self {
        Self {
            weights: RiskValues { low: 1.0, medium: 1.5, high: 2.25, critical: 3.0 },
            thresholds: RiskValues { low: 0.0, medium: 1.0, high: 2.0, critical: 3.0 },
        }
    }
}

// ── Performance curve ──────────────────────────────────────────────

/// multiplier = clamp(base - slope × load_ratio, floor, ceiling)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceCurve {
    pub base:    f64,
    pub slope:   f64,
    pub floor:   f64,
    pub ceiling: f64,
}

impl Default for PerformanceCurve {
    fn default() -> Self {
        Self { base: 1.2, slope: 0.4, floor: 0.5, ceiling: 1.2 }
    }
}

// ── Engine config ──────────────────────────────────────────────────

/// Tunables for admission, capacity and performance.
/// Missing keys in `sla_config.json` fall back to the defaults below.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// used ≤ total × overload_factor after every admission. Must be ≥ 1.0.
    pub overload_factor: f64,
    /// Load ratio above which `contract_capacity_changed` fires.
    pub warn_threshold:  f64,
    /// Ticks per unit of contract load.
    pub time_unit:       f64,
    /// Floor for divisions by total capacity.
    pub epsilon:         f64,
    pub tier_curve:      TierCurve,
    pub risk:            RiskTable,
    pub performance:     PerformanceCurve,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            overload_factor: 1.0,
            warn_threshold:  0.85,
            time_unit:       1.0,
            epsilon:         1e-9,
            tier_curve:      TierCurve::default(),
            risk:            RiskTable::default(),
            performance:     PerformanceCurve::default(),
        }
    }
}

impl EngineConfig {
    /// Load `sla_config.json` from the data/ directory.
    /// In tests, use EngineConfig::default_test().
    pub fn load(data_dir: &str) -> anyhow::Result<Self> {
        let path = format!("{data_dir}/sla_config.json");
        let content = std::fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let config: EngineConfig = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Cannot parse {path}: {e}"))?;
        config.validate()?;
        Ok(config)
    }

    /// Config with the reference constants, for use in tests.
    pub fn default_test() -> Self {
        Self::default()
    }

    /// Reject values that would break the capacity or performance model.
    pub fn validate(&self) -> SimResult<()> {
        let fail = |reason: String| Err(SimError::InvalidConfig { reason });

        if !self.overload_factor.is_finite() || self.overload_factor < 1.0 {
            return fail(format!("overload_factor must be >= 1.0, got {}", self.overload_factor));
        }
        if !(self.warn_threshold > 0.0 && self.warn_threshold <= self.overload_factor) {
            return fail(format!(
                "warn_threshold must be in (0, overload_factor], got {}",
                self.warn_threshold
            ));
        }
        if !self.time_unit.is_finite() || self.time_unit <= 0.0 {
            return fail(format!("time_unit must be > 0, got {}", self.time_unit));
        }
        if !self.epsilon.is_finite() || self.epsilon <= 0.0 {
            return fail(format!("epsilon must be > 0, got {}", self.epsilon));
        }
        if !self.tier_curve.step.is_finite() || self.tier_curve.step < 0.0 {
            return fail(format!("tier_curve.step must be >= 0, got {}", self.tier_curve.step));
        }
        if self.risk.weights.values().iter().any(|w| !w.is_finite() || *w <= 0.0) {
            return fail("risk weights must be > 0".into());
        }
        if self.risk.thresholds.values().iter().any(|t| !t.is_finite() || *t < 0.0) {
            return fail("risk thresholds must be >= 0".into());
        }
        let perf = &self.performance;
        let finite = [perf.base, perf.slope, perf.floor, perf.ceiling].iter().all(|v| v.is_finite());
        if !finite || !(perf.slope >= 0.0 && perf.floor <= perf.ceiling) {
            return fail(format!(
                "performance curve invalid: slope={} floor={} ceiling={}",
                perf.slope, perf.floor, perf.ceiling
            ));
        }
        Ok(())
    }
}

// ── Data bundle ────────────────────────────────────────────────────

/// Everything the engine needs from the data/ directory.
#[derive(Debug, Clone)]
pub struct DeskData {
    pub config:  EngineConfig,
    pub catalog: ContractCatalog,
    pub roster:  SpecialistRoster,
}

impl DeskData {
    pub fn load(data_dir: &str) -> anyhow::Result<Self> {
        let config = EngineConfig::load(data_dir)?;

        let contracts_path = format!("{data_dir}/contracts.json");
        let contracts_content = std::fs::read_to_string(&contracts_path)
            .map_err(|e| anyhow::anyhow!("Cannot read {contracts_path}: {e}"))?;
        let catalog = ContractCatalog::from_json(&contracts_content)?;

        let roster_path = format!("{data_dir}/specialists.json");
        let roster_content = std::fs::read_to_string(&roster_path)
            .map_err(|e| anyhow::anyhow!("Cannot read {roster_path}: {e}"))?;
        let roster = SpecialistRoster::from_json(&roster_content)?;

        log::info!(
            "Loaded {} contracts and {} specialists from {data_dir}",
            catalog.len(),
            roster.len()
        );
        Ok(Self { config, catalog, roster })
    }
}
