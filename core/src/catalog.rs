//! Contract catalog: validated, immutable contract definitions.
//!
//! Definitions arrive from the admin layer as loosely typed JSON.
//! They are validated into tagged `Contract` records here, at load time,
//! so admission logic never meets a missing SLA threshold.
//!
//! A batch is all-or-nothing: one bad entry rejects the whole catalog,
//! and the error names every offending contract.

use crate::{
    error::{CatalogError, ValidationIssue},
    types::ContractId,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// Case-insensitive parse of the closed risk enum.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "low"      => Some(Self::Low),
            "medium"   => Some(Self::Medium),
            "high"     => Some(Self::High),
            "critical" => Some(Self::Critical),
            _          => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low      => "low",
            Self::Medium   => "medium",
            Self::High     => "high",
            Self::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Range {
    pub min: f64,
    pub max: f64,
}

impl Range {
    pub fn midpoint(&self) -> f64 {
        (self.min + self.max) / 2.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlaRequirements {
    pub max_allowed_incidents: u32,
    /// Additional numeric terms, carried verbatim.
    #[serde(flatten)]
    pub thresholds: BTreeMap<String, f64>,
}

/// An offerable contract. Created at catalog load, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contract {
    pub id:                ContractId,
    pub budget_range:      Range,
    pub duration_range:    Range,
    pub reputation_reward: f64,
    pub risk_level:        RiskLevel,
    pub description:       String,
    #[serde(rename = "slaRequirements")]
    pub sla:               SlaRequirements,
}

// ── Load boundary ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RangeRecord {
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlaRecord {
    #[serde(default)]
    pub max_allowed_incidents: Option<Value>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// A contract definition as written by the admin layer.
/// Every field is optional here; `ContractCatalog::load` decides what is missing.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractRecord {
    #[serde(default)]
    pub id:                Option<String>,
    #[serde(default)]
    pub budget_range:      Option<RangeRecord>,
    #[serde(default)]
    pub duration_range:    Option<RangeRecord>,
    #[serde(default)]
    pub reputation_reward: Option<f64>,
    #[serde(default)]
    pub risk_level:        Option<String>,
    #[serde(default)]
    pub description:       Option<String>,
    #[serde(default)]
    pub sla_requirements:  Option<SlaRecord>,
}

#[derive(Debug, Clone, Default)]
pub struct ContractCatalog {
    contracts: BTreeMap<ContractId, Contract>,
}

impl ContractCatalog {
    /// Validate a batch of records. Rejects the whole batch on any invalid entry.
    pub fn load(records: Vec<ContractRecord>) -> Result<Self, CatalogError> {
        Self::validate_batch(records.into_iter().map(Ok).collect())
    }

    /// Parse a JSON array of contract definitions and validate it.
    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        let values: Vec<Value> = serde_json::from_str(json)?;
        Self::from_values(values)
    }

    /// Validate already-parsed JSON values. Entries whose shape cannot be read
    /// as a contract record are reported like any other invalid entry.
    pub fn from_values(values: Vec<Value>) -> Result<Self, CatalogError> {
        let entries = values
            .into_iter()
            .enumerate()
            .map(|(index, value)| {
                let subject = value
                    .get("id")
                    .and_then(Value::as_str)
                    .filter(|id| !id.trim().is_empty())
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("#{index}"));
                serde_json::from_value::<ContractRecord>(value)
                    .map_err(|e| ValidationIssue { subject, problem: format!("malformed entry: {e}") })
            })
            .collect();
        Self::validate_batch(entries)
    }

    fn validate_batch(
        entries: Vec<Result<ContractRecord, ValidationIssue>>,
    ) -> Result<Self, CatalogError> {
        let mut contracts = BTreeMap::new();
        let mut issues = Vec::new();
        let mut seen = HashSet::new();

        for (index, entry) in entries.into_iter().enumerate() {
            let record = match entry {
                Ok(record) => record,
                Err(issue) => {
                    issues.push(issue);
                    continue;
                }
            };
            match validate_record(index, record, &mut seen) {
                Ok(contract) => {
                    contracts.insert(contract.id.clone(), contract);
                }
                Err(mut problems) => issues.append(&mut problems),
            }
        }

        if !issues.is_empty() {
            let mut offending: Vec<ContractId> = Vec::new();
            for issue in &issues {
                if !offending.contains(&issue.subject) {
                    offending.push(issue.subject.clone());
                }
            }
            log::warn!("Contract catalog rejected: {} issue(s) across {:?}", issues.len(), offending);
            return Err(CatalogError::Invalid { offending, issues });
        }

        Ok(Self { contracts })
    }

    pub fn get(&self, id: &str) -> Result<&Contract, CatalogError> {
        self.contracts
            .get(id)
            .ok_or_else(|| CatalogError::NotFound { id: id.to_string() })
    }

    pub fn contains(&self, id: &str) -> bool {
        self.contracts.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.contracts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contracts.is_empty()
    }

    /// Contracts in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Contract> {
        self.contracts.values()
    }
}

fn validate_record(
    index: usize,
    record: ContractRecord,
    seen: &mut HashSet<ContractId>,
) -> Result<Contract, Vec<ValidationIssue>> {
    let id = record.id.as_deref().map(str::trim).unwrap_or_default().to_string();
    let subject = if id.is_empty() { format!("#{index}") } else { id.clone() };
    let mut problems = Vec::new();
    let mut problem = |text: String| problems.push(ValidationIssue { subject: subject.clone(), problem: text });

    if id.is_empty() {
        problem("missing id".into());
    } else if !seen.insert(id.clone()) {
        problem("duplicate id".into());
    }

    let risk_level = match record.risk_level.as_deref() {
        None => {
            problem("missing riskLevel".into());
            None
        }
        Some(raw) => {
            let parsed = RiskLevel::parse(raw);
            if parsed.is_none() {
                problem(format!("riskLevel '{raw}' is not one of low/medium/high/critical"));
            }
            parsed
        }
    };

    let budget_range = check_range("budgetRange", record.budget_range, &mut problem);
    let duration_range = check_range("durationRange", record.duration_range, &mut problem);
    if let Some(duration) = duration_range {
        if duration.midpoint() <= 0.0 {
            problem("durationRange must be longer than zero ticks".into());
        }
    }

    let reputation_reward = record.reputation_reward.unwrap_or(0.0);
    if !reputation_reward.is_finite() {
        problem("reputationReward must be finite".into());
    }

    let sla = match record.sla_requirements {
        None => {
            problem("missing slaRequirements".into());
            None
        }
        Some(sla) => check_sla(sla, &mut problem),
    };

    match (problems.is_empty(), risk_level, budget_range, duration_range, sla) {
        (true, Some(risk_level), Some(budget_range), Some(duration_range), Some(sla)) => Ok(Contract {
            id,
            budget_range,
            duration_range,
            reputation_reward,
            risk_level,
            description: record.description.unwrap_or_default(),
            sla,
        }),
        _ => Err(problems),
    }
}

fn check_range(
    field: &str,
    range: Option<RangeRecord>,
    problem: &mut impl FnMut(String),
) -> Option<Range> {
    let Some(range) = range else {
        problem(format!("missing {field}"));
        return None;
    };
    if !range.min.is_finite() || !range.max.is_finite() || range.min < 0.0 {
        problem(format!("{field} must be finite and non-negative"));
        return None;
    }
    if range.min > range.max {
        problem(format!("{field} min {} exceeds max {}", range.min, range.max));
        return None;
    }
    Some(Range { min: range.min, max: range.max })
}

/// Upper bound for an SLA incident limit. Keeps one count value above
/// every limit so a saturated incident counter still breaches.
pub const MAX_ALLOWED_INCIDENTS: u32 = u32::MAX - 1;

fn check_sla(sla: SlaRecord, problem: &mut impl FnMut(String)) -> Option<SlaRequirements> {
    let max_allowed_incidents = match sla.max_allowed_incidents {
        None => {
            problem("missing slaRequirements.maxAllowedIncidents".into());
            None
        }
        Some(raw) => {
            let parsed = raw
                .as_u64()
                .and_then(|n| u32::try_from(n).ok())
                .filter(|&n| n <= MAX_ALLOWED_INCIDENTS);
            if parsed.is_none() {
                problem(format!(
                    "slaRequirements.maxAllowedIncidents must be an integer in 0..={MAX_ALLOWED_INCIDENTS}, got {raw}"
                ));
            }
            parsed
        }
    };

    let mut thresholds = BTreeMap::new();
    let mut valid = true;
    for (key, value) in sla.extra {
        match value.as_f64() {
            Some(number) => {
                thresholds.insert(key, number);
            }
            None => {
                problem(format!("slaRequirements.{key} must be numeric"));
                valid = false;
            }
        }
    }

    match (max_allowed_incidents, valid) {
        (Some(max_allowed_incidents), true) => Some(SlaRequirements { max_allowed_incidents, thresholds }),
        _ => None,
    }
}
