//! Specialist roster: the staff that produces workload capacity.
//!
//! Hiring, dismissal and availability are decided by the game loop;
//! the roster only enforces attribute bounds and answers aggregate queries.

use crate::{
    capacity::speed_weight,
    config::TierCurve,
    error::{RosterError, ValidationIssue},
    types::SpecialistId,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Specialist {
    pub id:              SpecialistId,
    pub specialist_type: String,
    pub name:            String,
    pub efficiency:      f64,
    pub speed:           f64,
    pub trace:           f64,
    pub defense:         f64,
    pub tier:            u32,
    pub available:       bool,
}

fn default_tier() -> u32 {
    1
}

fn default_available() -> bool {
    true
}

/// A specialist definition as supplied by the game loop or `specialists.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpecialistRecord {
    pub specialist_type: String,
    pub name:            String,
    pub efficiency:      f64,
    pub speed:           f64,
    pub trace:           f64,
    pub defense:         f64,
    #[serde(default = "default_tier")]
    pub tier:            u32,
    #[serde(default = "default_available")]
    pub available:       bool,
}

/// Pure read of the roster used by the capacity model.
/// Only available specialists contribute to the totals.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RosterAggregate {
    pub total_efficiency:                f64,
    pub total_speed_weighted_efficiency: f64,
    pub total_defense:                   f64,
    pub available_count:                 usize,
    pub count:                           usize,
}

#[derive(Debug, Clone, Default)]
pub struct SpecialistRoster {
    specialists: Vec<Specialist>,
    next_id:     u64,
}

impl SpecialistRoster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and hire a whole batch. Rejects the batch on any invalid entry.
    pub fn load(records: Vec<SpecialistRecord>) -> Result<Self, RosterError> {
        Self::load_batch(records.into_iter().map(Ok).collect())
    }

    pub fn from_json(json: &str) -> Result<Self, RosterError> {
        let values: Vec<Value> = serde_json::from_str(json)?;
        let entries = values
            .into_iter()
            .enumerate()
            .map(|(index, value)| {
                let subject = value
                    .get("name")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("#{index}"));
                serde_json::from_value::<SpecialistRecord>(value)
                    .map_err(|e| ValidationIssue { subject, problem: format!("malformed entry: {e}") })
            })
            .collect();
        Self::load_batch(entries)
    }

    fn load_batch(entries: Vec<Result<SpecialistRecord, ValidationIssue>>) -> Result<Self, RosterError> {
        let mut issues = Vec::new();
        let mut valid = Vec::new();
        for (index, entry) in entries.into_iter().enumerate() {
            match entry.map(|record| (check_bounds(index, &record), record)) {
                Ok((problems, record)) if problems.is_empty() => valid.push(record),
                Ok((mut problems, _)) => issues.append(&mut problems),
                Err(issue) => issues.push(issue),
            }
        }
        if !issues.is_empty() {
            return Err(invalid(issues));
        }

        let mut roster = Self::new();
        for record in valid {
            roster.push(record);
        }
        Ok(roster)
    }

    /// Add a specialist. Attributes must be positive and tier at least 1.
    pub fn hire(&mut self, record: SpecialistRecord) -> Result<SpecialistId, RosterError> {
        let problems = check_bounds(self.specialists.len(), &record);
        if !problems.is_empty() {
            return Err(invalid(problems));
        }
        Ok(self.push(record))
    }

    pub fn dismiss(&mut self, id: SpecialistId) -> Result<Specialist, RosterError> {
        let index = self
            .specialists
            .iter()
            .position(|s| s.id == id)
            .ok_or(RosterError::UnknownSpecialist { id })?;
        Ok(self.specialists.remove(index))
    }

    /// Returns the previous availability.
    pub fn set_availability(&mut self, id: SpecialistId, available: bool) -> Result<bool, RosterError> {
        let specialist = self
            .specialists
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or(RosterError::UnknownSpecialist { id })?;
        let previous = specialist.available;
        specialist.available = available;
        Ok(previous)
    }

    pub fn get(&self, id: SpecialistId) -> Option<&Specialist> {
        self.specialists.iter().find(|s| s.id == id)
    }

    /// Specialists in hire order.
    pub fn iter(&self) -> impl Iterator<Item = &Specialist> {
        self.specialists.iter()
    }

    pub fn len(&self) -> usize {
        self.specialists.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specialists.is_empty()
    }

    pub fn aggregate(&self, curve: &TierCurve) -> RosterAggregate {
        let mut agg = RosterAggregate { count: self.specialists.len(), ..RosterAggregate::default() };
        for s in self.specialists.iter().filter(|s| s.available) {
            agg.total_efficiency += s.efficiency;
            agg.total_speed_weighted_efficiency += s.efficiency * speed_weight(curve, s.tier);
            agg.total_defense += s.defense;
            agg.available_count += 1;
        }
        agg
    }

    fn push(&mut self, record: SpecialistRecord) -> SpecialistId {
        self.next_id += 1;
        let id = SpecialistId(self.next_id);
        self.specialists.push(Specialist {
            id,
            specialist_type: record.specialist_type,
            name:            record.name,
            efficiency:      record.efficiency,
            speed:           record.speed,
            trace:           record.trace,
            defense:         record.defense,
            tier:            record.tier,
            available:       record.available,
        });
        id
    }
}

fn check_bounds(index: usize, record: &SpecialistRecord) -> Vec<ValidationIssue> {
    let subject = if record.name.trim().is_empty() {
        format!("#{index}")
    } else {
        record.name.clone()
    };
    let mut problems = Vec::new();
    for (field, value) in [
        ("efficiency", record.efficiency),
        ("speed", record.speed),
        ("trace", record.trace),
        ("defense", record.defense),
    ] {
        if !value.is_finite() || value <= 0.0 {
            problems.push(ValidationIssue {
                subject: subject.clone(),
                problem: format!("{field} must be > 0, got {value}"),
            });
        }
    }
    if record.tier == 0 {
        problems.push(ValidationIssue { subject, problem: "tier must be >= 1".into() });
    }
    problems
}

fn invalid(issues: Vec<ValidationIssue>) -> RosterError {
    let mut offending: Vec<String> = Vec::new();
    for issue in &issues {
        if !offending.contains(&issue.subject) {
            offending.push(issue.subject.clone());
        }
    }
    RosterError::Invalid { offending, issues }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyst(name: &str, efficiency: f64, tier: u32) -> SpecialistRecord {
        SpecialistRecord {
            specialist_type: "analyst".into(),
            name: name.into(),
            efficiency,
            speed: 1.0,
            trace: 1.0,
            defense: 1.0,
            tier,
            available: true,
        }
    }

    #[test]
    fn aggregate_skips_unavailable_specialists() {
        let mut roster = SpecialistRoster::new();
        let a = roster.hire(analyst("a", 2.0, 1)).unwrap();
        roster.hire(analyst("b", 3.0, 1)).unwrap();
        roster.set_availability(a, false).unwrap();

        let agg = roster.aggregate(&TierCurve::default());
        assert_eq!(agg.count, 2);
        assert_eq!(agg.available_count, 1);
        assert_eq!(agg.total_efficiency, 3.0);
        assert_eq!(agg.total_speed_weighted_efficiency, 3.0);
    }

    #[test]
    fn hire_rejects_non_positive_attributes() {
        let mut roster = SpecialistRoster::new();
        let mut bad = analyst("bad", 0.0, 1);
        bad.defense = -1.0;
        match roster.hire(bad) {
            Err(RosterError::Invalid { offending, issues }) => {
                assert_eq!(offending, vec!["bad".to_string()]);
                assert_eq!(issues.len(), 2);
            }
            other => panic!("expected invalid roster entry, got {other:?}"),
        }
        assert!(roster.is_empty());
    }

    #[test]
    fn dismiss_unknown_specialist_is_an_error() {
        let mut roster = SpecialistRoster::new();
        assert!(matches!(
            roster.dismiss(SpecialistId(99)),
            Err(RosterError::UnknownSpecialist { .. })
        ));
    }
}
