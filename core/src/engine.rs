//! The contract engine: owns every piece of admission and SLA state.
//!
//! DATA FLOW:
//!   roster / catalog change → capacity recompute
//!   admission → SLA tracker → capacity recompute → events
//!   incident / complete / cancel → SLA tracker → capacity recompute → events
//!   get_state / load_state → whole-engine snapshot
//!
//! RULES:
//!   - Single writer. Every mutating call takes &mut self and finishes
//!     inside the calling tick.
//!   - The capacity snapshot is recomputed on every state change and on
//!     every clock advance; nothing reads a stale copy across ticks.
//!   - Events are published inline, in transition order.
//!   - Contract duration is informational; the host clock decides when
//!     to call complete() or cancel().

use crate::{
    admission::{self, AlwaysAffordable, BudgetCheck, Decision},
    capacity::{self, CapacitySnapshot},
    catalog::ContractCatalog,
    config::{DeskData, EngineConfig},
    error::{RosterError, SimResult, StaleReference},
    event::{ContractEvent, EventBus, EventLog, OverloadCause},
    performance,
    roster::{SpecialistRecord, SpecialistRoster},
    sla::{ActiveContract, ContractStatus, IncidentOutcome, SlaTracker},
    snapshot::{DanglingReference, EngineCounters, EngineState, RestoreReport},
    types::{ActivationId, SpecialistId, Tick},
};

pub struct ContractEngine<B: EventBus = EventLog> {
    config:          EngineConfig,
    catalog:         ContractCatalog,
    roster:          SpecialistRoster,
    tracker:         SlaTracker,
    capacity:        CapacitySnapshot,
    counters:        EngineCounters,
    budget:          Box<dyn BudgetCheck>,
    bus:             B,
    current_tick:    Tick,
    next_activation: u64,
    /// Tick at which `contract_capacity_changed` last fired.
    warned_at_tick:  Option<Tick>,
}

impl<B: EventBus> ContractEngine<B> {
    pub fn new(
        config: EngineConfig,
        catalog: ContractCatalog,
        roster: SpecialistRoster,
        bus: B,
    ) -> SimResult<Self> {
        config.validate()?;
        let mut engine = Self {
            config,
            catalog,
            roster,
            tracker:         SlaTracker::new(),
            capacity:        CapacitySnapshot::default(),
            counters:        EngineCounters::default(),
            budget:          Box::new(AlwaysAffordable),
            bus,
            current_tick:    0,
            next_activation: 0,
            warned_at_tick:  None,
        };
        engine.recompute();
        Ok(engine)
    }

    /// Build from a loaded data/ directory.
    pub fn from_data(data: DeskData, bus: B) -> SimResult<Self> {
        Self::new(data.config, data.catalog, data.roster, bus)
    }

    /// Install the economy's budget predicate.
    pub fn with_budget_check(mut self, budget: impl BudgetCheck + 'static) -> Self {
        self.budget = Box::new(budget);
        self
    }

    pub fn set_budget_check(&mut self, budget: impl BudgetCheck + 'static) {
        self.budget = Box::new(budget);
    }

    // ── Clock ──────────────────────────────────────────────────

    pub fn current_tick(&self) -> Tick {
        self.current_tick
    }

    /// Move the engine's clock reading forward. Ticks never go backwards.
    pub fn advance_to(&mut self, tick: Tick) {
        if tick < self.current_tick {
            log::warn!("advance_to({tick}) ignored: clock already at tick {}", self.current_tick);
            return;
        }
        self.current_tick = tick;
        self.recompute();
    }

    // ── Admission ──────────────────────────────────────────────

    /// Decide on a contract and, if every check passes, admit it.
    pub fn can_accept_contract(&mut self, contract_id: &str) -> Decision {
        let tick = self.current_tick;
        let (contract_id, load, max_allowed) = match admission::evaluate(
            contract_id,
            &self.catalog,
            &self.capacity,
            &self.config,
            &*self.budget,
        ) {
            Ok(ok) => (ok.contract.id.clone(), ok.estimated_load, ok.contract.sla.max_allowed_incidents),
            Err(reason) => {
                log::info!("tick={tick} contract {contract_id} rejected: {reason}");
                return Decision::rejected(reason);
            }
        };

        let previous_ratio = self.capacity.load_ratio(self.config.epsilon);

        self.next_activation += 1;
        let activation_id = ActivationId(self.next_activation);
        self.tracker.register(ActiveContract::new(
            activation_id,
            contract_id.clone(),
            tick,
            load,
            max_allowed,
        ));
        self.counters.total_accepted += 1;
        self.recompute();

        let new_ratio = self.capacity.load_ratio(self.config.epsilon);
        log::info!(
            "tick={tick} contract {contract_id} accepted as {activation_id} (load {load:.2}, ratio {previous_ratio:.2} -> {new_ratio:.2})"
        );

        let warn = self.config.warn_threshold;
        if previous_ratio <= warn && new_ratio > warn && self.warned_at_tick != Some(tick) {
            self.warned_at_tick = Some(tick);
            self.bus.publish(&ContractEvent::ContractCapacityChanged {
                tick,
                previous_ratio,
                new_ratio,
            });
        }

        let overload_line = self.capacity.total_capacity * self.config.overload_factor;
        if self.capacity.used_capacity >= overload_line {
            log::warn!(
                "tick={tick} capacity overloaded: used {:.2} of {:.2}",
                self.capacity.used_capacity, self.capacity.total_capacity
            );
            self.bus.publish(&ContractEvent::ContractOverloaded {
                tick,
                cause:          OverloadCause::Capacity,
                activation_id:  Some(activation_id),
                used_capacity:  self.capacity.used_capacity,
                total_capacity: self.capacity.total_capacity,
            });
        }

        Decision::accepted(Some(activation_id))
    }

    /// Same checks as `can_accept_contract`, without admitting anything.
    pub fn preview_admission(&self, contract_id: &str) -> Decision {
        match admission::evaluate(
            contract_id,
            &self.catalog,
            &self.capacity,
            &self.config,
            &*self.budget,
        ) {
            Ok(_) => Decision::accepted(None),
            Err(reason) => Decision::rejected(reason),
        }
    }

    // ── SLA lifecycle ──────────────────────────────────────────

    pub fn record_incident(&mut self, activation_id: ActivationId) -> Result<IncidentOutcome, StaleReference> {
        let tick = self.current_tick;
        let outcome = self.tracker.record_incident(activation_id).map_err(|stale| {
            log::warn!("tick={tick} incident ignored: {stale}");
            stale
        })?;

        match outcome {
            IncidentOutcome::Recorded { incident_count } => {
                log::debug!("tick={tick} incident #{incident_count} on {activation_id}");
            }
            IncidentOutcome::Breached { incident_count, max_allowed } => {
                self.counters.total_breached += 1;
                self.recompute();
                log::warn!(
                    "tick={tick} SLA BREACH: {activation_id} has {incident_count} incidents (max {max_allowed})"
                );
                self.bus.publish(&ContractEvent::ContractOverloaded {
                    tick,
                    cause: OverloadCause::SlaBreach {
                        incident_count,
                        max_allowed_incidents: max_allowed,
                    },
                    activation_id:  Some(activation_id),
                    used_capacity:  self.capacity.used_capacity,
                    total_capacity: self.capacity.total_capacity,
                });
            }
        }
        Ok(outcome)
    }

    pub fn complete(&mut self, activation_id: ActivationId) -> Result<ContractStatus, StaleReference> {
        let result = self.tracker.complete(activation_id);
        self.after_settle(activation_id, result)
    }

    pub fn cancel(&mut self, activation_id: ActivationId) -> Result<ContractStatus, StaleReference> {
        let result = self.tracker.cancel(activation_id);
        self.after_settle(activation_id, result)
    }

    fn after_settle(
        &mut self,
        activation_id: ActivationId,
        result: Result<ContractStatus, StaleReference>,
    ) -> Result<ContractStatus, StaleReference> {
        let tick = self.current_tick;
        match result {
            Ok(status) => {
                match status {
                    ContractStatus::Completed => self.counters.total_completed += 1,
                    ContractStatus::Cancelled => self.counters.total_cancelled += 1,
                    _ => {}
                }
                self.recompute();
                log::info!("tick={tick} {activation_id} settled as {status:?}");
                Ok(status)
            }
            Err(stale) => {
                log::warn!("tick={tick} settle ignored: {stale}");
                Err(stale)
            }
        }
    }

    /// Active activations in acceptance order.
    pub fn get_active(&self) -> Vec<&ActiveContract> {
        self.tracker.get_active().collect()
    }

    pub fn activation(&self, activation_id: ActivationId) -> Option<&ActiveContract> {
        self.tracker.get(activation_id)
    }

    /// Every tracked activation, settled ones included.
    pub fn contracts(&self) -> &[ActiveContract] {
        self.tracker.contracts()
    }

    /// Forget settled activations. Counters keep their history.
    pub fn prune_settled(&mut self) -> usize {
        let removed = self.tracker.prune_settled();
        if removed > 0 {
            log::debug!("tick={} pruned {removed} settled activations", self.current_tick);
        }
        removed
    }

    // ── Capacity & performance ─────────────────────────────────

    /// Recompute and return the capacity snapshot.
    pub fn calculate_workload_capacity(&mut self) -> CapacitySnapshot {
        self.recompute();
        self.capacity
    }

    pub fn capacity(&self) -> &CapacitySnapshot {
        &self.capacity
    }

    pub fn get_performance_multiplier(&self) -> f64 {
        performance::performance_multiplier(&self.capacity, &self.config.performance, self.config.epsilon)
    }

    pub fn get_average_specialist_efficiency(&self) -> f64 {
        self.capacity.average_efficiency
    }

    fn recompute(&mut self) {
        self.capacity = capacity::calculate_workload_capacity(
            &self.roster,
            self.tracker.contracts(),
            &self.config,
            self.current_tick,
        );
        log::debug!(
            "tick={} capacity: used {:.2} / total {:.2} ({} specialists available)",
            self.current_tick,
            self.capacity.used_capacity,
            self.capacity.total_capacity,
            self.capacity.available_specialists
        );
    }

    // ── Roster ─────────────────────────────────────────────────

    pub fn roster(&self) -> &SpecialistRoster {
        &self.roster
    }

    pub fn hire(&mut self, record: SpecialistRecord) -> Result<SpecialistId, RosterError> {
        let id = self.roster.hire(record)?;
        self.after_roster_change();
        Ok(id)
    }

    pub fn dismiss(&mut self, id: SpecialistId) -> Result<(), RosterError> {
        self.roster.dismiss(id)?;
        self.after_roster_change();
        Ok(())
    }

    pub fn set_availability(&mut self, id: SpecialistId, available: bool) -> Result<(), RosterError> {
        self.roster.set_availability(id, available)?;
        self.after_roster_change();
        Ok(())
    }

    fn after_roster_change(&mut self) {
        self.recompute();
        let line = self.capacity.total_capacity * self.config.overload_factor;
        if self.capacity.used_capacity > line {
            log::warn!(
                "tick={} roster change left capacity oversubscribed: used {:.2} > {:.2}",
                self.current_tick, self.capacity.used_capacity, line
            );
        }
    }

    // ── Catalog & config ───────────────────────────────────────

    pub fn catalog(&self) -> &ContractCatalog {
        &self.catalog
    }

    /// Swap in a freshly validated catalog. Running activations keep the
    /// load and SLA limit they were admitted with.
    pub fn replace_catalog(&mut self, catalog: ContractCatalog) {
        for contract in self.tracker.get_active() {
            if !catalog.contains(&contract.contract_id) {
                log::warn!(
                    "{} references contract '{}' which the new catalog no longer defines",
                    contract.activation_id, contract.contract_id
                );
            }
        }
        self.catalog = catalog;
        self.recompute();
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Apply a config change. Existing activations keep their admitted load.
    pub fn apply_config(&mut self, config: EngineConfig) -> SimResult<()> {
        config.validate()?;
        self.config = config;
        self.recompute();
        Ok(())
    }

    pub fn counters(&self) -> &EngineCounters {
        &self.counters
    }

    // ── Event bus ──────────────────────────────────────────────

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    // ── State ──────────────────────────────────────────────────

    pub fn get_state(&self) -> EngineState {
        EngineState {
            tick:               self.current_tick,
            next_activation:    self.next_activation,
            active_contracts:   self.tracker.contracts().to_vec(),
            capacity:           self.capacity,
            counters:           self.counters,
            capacity_warned_at: self.warned_at_tick,
        }
    }

    /// Replace activations, counters and clock reading with a snapshot.
    /// Entries whose contract is no longer in the catalog are dropped with
    /// a warning rather than failing the restore. Estimated load and SLA
    /// limit are re-derived from the catalog and the current config.
    pub fn load_state(&mut self, state: EngineState) -> RestoreReport {
        let mut report = RestoreReport::default();
        let highest_id = state
            .active_contracts
            .iter()
            .map(|c| c.activation_id.0)
            .max()
            .unwrap_or(0);

        let mut kept = Vec::with_capacity(state.active_contracts.len());
        for mut contract in state.active_contracts {
            let Ok(template) = self.catalog.get(&contract.contract_id) else {
                log::warn!(
                    "restore: dropping {} - contract '{}' not in catalog",
                    contract.activation_id, contract.contract_id
                );
                report.dangling.push(DanglingReference {
                    activation_id: contract.activation_id,
                    contract_id:   contract.contract_id,
                });
                continue;
            };

            // Load and SLA limit come from the live catalog and config.
            let load = capacity::estimated_load(template, &self.config);
            let max_allowed = template.sla.max_allowed_incidents;
            let load_matches = (contract.estimated_load - load).abs() <= self.config.epsilon;
            if !load_matches || contract.max_allowed_incidents != max_allowed {
                log::warn!(
                    "restore: {} saved load {} / max {} replaced by catalog values {load} / {max_allowed}",
                    contract.activation_id, contract.estimated_load, contract.max_allowed_incidents
                );
                contract.estimated_load = load;
                contract.max_allowed_incidents = max_allowed;
                report.corrected.push(contract.activation_id);
            }
            kept.push(contract);
        }

        let (tracker, duplicates) = SlaTracker::from_contracts(kept);
        for dup in duplicates {
            log::warn!("restore: dropping duplicate activation {}", dup.activation_id);
            report.duplicates.push(dup.activation_id);
        }

        self.tracker = tracker;
        self.counters = state.counters;
        self.current_tick = state.tick;
        self.next_activation = state.next_activation.max(highest_id);
        self.warned_at_tick = state.capacity_warned_at;
        self.recompute();

        report.restored = self.tracker.len();
        log::info!(
            "tick={} state restored: {} activations, {} dangling, {} duplicate, {} corrected",
            self.current_tick,
            report.restored,
            report.dangling.len(),
            report.duplicates.len(),
            report.corrected.len()
        );
        report
    }
}
