//! State snapshot tests.
//!
//! Tests cover: lossless get_state/load_state round trips (in memory
//! and through JSON), dangling catalog references on restore, duplicate
//! activations, and activation id continuity after a restore.

use desk_core::{
    catalog::ContractCatalog,
    config::EngineConfig,
    engine::ContractEngine,
    event::EventLog,
    roster::{SpecialistRecord, SpecialistRoster},
    sla::ContractStatus,
    snapshot::{DanglingReference, EngineState},
};
use serde_json::{json, Value};

fn contract(id: &str, max_allowed: u32) -> Value {
    json!({
        "id": id,
        "budgetRange": { "min": 1000, "max": 4000 },
        "durationRange": { "min": 1, "max": 3 },
        "reputationReward": 10,
        "riskLevel": "medium",
        "description": "Managed detection retainer",
        "slaRequirements": { "maxAllowedIncidents": max_allowed }
    })
}

fn full_catalog() -> ContractCatalog {
    ContractCatalog::from_values(vec![contract("ALPHA", 1), contract("BETA", 3)]).expect("valid catalog")
}

fn roster() -> SpecialistRoster {
    SpecialistRoster::load(vec![
        SpecialistRecord {
            specialist_type: "hunter".into(),
            name: "kit".into(),
            efficiency: 6.0,
            speed: 1.2,
            trace: 2.0,
            defense: 1.5,
            tier: 2,
            available: true,
        },
        SpecialistRecord {
            specialist_type: "analyst".into(),
            name: "lou".into(),
            efficiency: 4.0,
            speed: 1.0,
            trace: 1.0,
            defense: 1.0,
            tier: 1,
            available: true,
        },
    ])
    .expect("valid roster")
}

fn build(catalog: ContractCatalog) -> ContractEngine<EventLog> {
    let _ = env_logger::builder().is_test(true).try_init();
    ContractEngine::new(EngineConfig::default_test(), catalog, roster(), EventLog::new()).expect("build engine")
}

/// Drive an engine through every lifecycle state.
fn populated() -> ContractEngine<EventLog> {
    let mut engine = build(full_catalog());
    engine.advance_to(3);
    let a = engine.can_accept_contract("ALPHA").activation_id.unwrap();
    let b = engine.can_accept_contract("BETA").activation_id.unwrap();
    let c = engine.can_accept_contract("BETA").activation_id.unwrap();
    engine.record_incident(a).unwrap();
    engine.record_incident(a).unwrap(); // breach
    engine.record_incident(b).unwrap();
    engine.complete(c).unwrap();
    engine.advance_to(7);
    let d = engine.can_accept_contract("ALPHA").activation_id.unwrap();
    engine.advance_to(9);
    engine.cancel(d).unwrap();
    assert!(engine.can_accept_contract("BETA").accepted);
    engine
}

#[test]
fn get_then_load_state_is_lossless() {
    let mut engine = populated();
    let before = engine.get_state();

    let report = engine.load_state(before.clone());

    assert!(report.is_clean());
    assert_eq!(report.restored, before.active_contracts.len());
    assert_eq!(engine.get_state(), before);
}

#[test]
fn state_restores_into_a_fresh_engine() {
    let original = populated();
    let state = original.get_state();

    let mut restored = build(full_catalog());
    restored.load_state(state.clone());

    assert_eq!(restored.get_state(), state);
    assert_eq!(restored.current_tick(), 9);
    assert_eq!(restored.capacity(), original.capacity());
    assert_eq!(restored.get_performance_multiplier(), original.get_performance_multiplier());

    let statuses: Vec<_> = restored.contracts().iter().map(|c| c.status).collect();
    assert_eq!(
        statuses,
        vec![
            ContractStatus::Breached,
            ContractStatus::Active,
            ContractStatus::Completed,
            ContractStatus::Cancelled,
            ContractStatus::Active,
        ]
    );
}

#[test]
fn state_survives_json() {
    let original = populated();
    let json = original.get_state().to_json().unwrap();

    let decoded = EngineState::from_json(&json).unwrap();
    let mut restored = build(full_catalog());
    restored.load_state(decoded);

    let a = original.get_state();
    let b = restored.get_state();
    assert_eq!(a.active_contracts, b.active_contracts);
    assert_eq!(a.counters, b.counters);
    assert_eq!(a.tick, b.tick);
    assert!((a.capacity.used_capacity - b.capacity.used_capacity).abs() < 1e-9);
    assert!((a.capacity.total_capacity - b.capacity.total_capacity).abs() < 1e-9);
}

#[test]
fn restore_drops_contracts_missing_from_catalog() {
    let state = populated().get_state();

    let catalog = ContractCatalog::from_values(vec![contract("BETA", 3)]).unwrap();
    let mut restored = build(catalog);
    let report = restored.load_state(state.clone());

    let alpha_ids: Vec<_> = state
        .active_contracts
        .iter()
        .filter(|c| c.contract_id == "ALPHA")
        .map(|c| DanglingReference { activation_id: c.activation_id, contract_id: c.contract_id.clone() })
        .collect();
    assert_eq!(report.dangling, alpha_ids);
    assert_eq!(report.restored, 3);
    assert!(restored.contracts().iter().all(|c| c.contract_id == "BETA"));
    assert_eq!(restored.counters(), &state.counters, "counters are restored as saved");
}

#[test]
fn restore_keeps_first_of_duplicate_activations() {
    let mut state = populated().get_state();
    let first = state.active_contracts[1].clone();
    let mut dup = first.clone();
    dup.incident_count = 99;
    state.active_contracts.push(dup);

    let mut restored = build(full_catalog());
    let report = restored.load_state(state);

    assert_eq!(report.duplicates, vec![first.activation_id]);
    assert_eq!(restored.activation(first.activation_id), Some(&first));
}

#[test]
fn activation_ids_continue_after_restore() {
    let state = populated().get_state();
    let highest = state.active_contracts.iter().map(|c| c.activation_id).max().unwrap();

    let mut restored = build(full_catalog());
    restored.load_state(state);
    restored.advance_to(10);
    let next = restored.can_accept_contract("BETA").activation_id.unwrap();

    assert!(next > highest, "{next} reissued an id at or below {highest}");
}

#[test]
fn restore_recomputes_capacity_against_live_roster() {
    let state = populated().get_state();
    let mut restored = build(full_catalog());
    let lou = restored.roster().iter().find(|s| s.name == "lou").map(|s| s.id).unwrap();
    restored.set_availability(lou, false).unwrap();

    restored.load_state(state.clone());

    assert_eq!(restored.capacity().used_capacity, state.capacity.used_capacity);
    assert!(restored.capacity().total_capacity < state.capacity.total_capacity);
    assert_eq!(restored.capacity().computed_at_tick, state.tick);
}

#[test]
fn restore_rederives_load_and_sla_limit_from_catalog() {
    let mut state = populated().get_state();
    let tampered = state
        .active_contracts
        .iter()
        .position(|c| c.status == ContractStatus::Active)
        .unwrap();
    let honest_load = state.active_contracts[tampered].estimated_load;
    state.active_contracts[tampered].estimated_load = -100.0;
    state.active_contracts[tampered].max_allowed_incidents = 1_000;
    let tampered_id = state.active_contracts[tampered].activation_id;

    let mut restored = build(full_catalog());
    let report = restored.load_state(state);

    assert_eq!(report.corrected, vec![tampered_id]);
    assert!(!report.is_clean());
    let fixed = restored.activation(tampered_id).unwrap();
    assert_eq!(fixed.estimated_load, honest_load);
    assert_eq!(fixed.max_allowed_incidents, 3, "BETA allows 3 incidents");
    assert_eq!(restored.capacity().used_capacity, 6.0);

    // The gate still holds: 6 used of 10.9, one more BETA (load 3) fits, a second does not.
    assert!(restored.can_accept_contract("BETA").accepted);
    assert!(!restored.can_accept_contract("BETA").accepted);
    let snap = restored.capacity();
    assert!(snap.used_capacity <= snap.total_capacity);
}

#[test]
fn restore_replaces_non_finite_saved_load() {
    let mut state = populated().get_state();
    for contract in &mut state.active_contracts {
        contract.estimated_load = f64::NAN;
    }
    let mut restored = build(full_catalog());
    let report = restored.load_state(state.clone());

    assert_eq!(report.corrected.len(), state.active_contracts.len());
    assert!(restored.contracts().iter().all(|c| c.estimated_load.is_finite() && c.estimated_load > 0.0));
    assert_eq!(restored.capacity().used_capacity, 6.0);
}
