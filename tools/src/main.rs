//! desk-runner: headless driver for the contract desk.
//!
//! Plays the host game around the engine: owns the clock, the cash
//! balance behind the budget predicate, incident rolls and the save file.
//!
//! Usage:
//!   desk-runner --seed 12345 --ticks 365 --db run.db
//!   desk-runner --db run.db --restore run-12345-<uuid> --ticks 90

mod rng;
mod save_store;

use anyhow::{bail, Context, Result};
use desk_core::{
    catalog::Contract,
    config::DeskData,
    engine::ContractEngine,
    event::EventLog,
    snapshot::EngineState,
    types::{ActivationId, Tick},
};
use rng::{Stream, StreamRng};
use save_store::SaveStore;
use std::{cell::Cell, env, rc::Rc};

/// Ticks between snapshots.
const SNAPSHOT_EVERY: Tick = 30;
/// Chance per tick that a client offers a contract.
const OFFER_CHANCE: f64 = 0.6;
/// Base chance per tick of an incident on an active contract, scaled by risk weight.
const INCIDENT_CHANCE: f64 = 0.02;
/// Share of the minimum budget spent up front on acceptance.
const SETUP_COST_SHARE: f64 = 0.1;

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let seed = parse_arg(&args, "--seed", 42u64);
    let ticks = parse_arg(&args, "--ticks", 365u64);
    let starting_cash = parse_arg(&args, "--budget", 50_000.0f64);
    let db = string_arg(&args, "--db").unwrap_or(":memory:");
    let data_dir = string_arg(&args, "--data-dir").unwrap_or("./data");
    let restore = string_arg(&args, "--restore");

    println!("The Desk: contract runner");
    println!("  seed:      {seed}");
    println!("  ticks:     {ticks}");
    println!("  db:        {db}");
    println!("  data_dir:  {data_dir}");
    if let Some(run_id) = restore {
        println!("  restore:   {run_id}");
    }
    println!();

    let store = SaveStore::open(db)?;
    store.migrate()?;

    let data = DeskData::load(data_dir)?;
    let mut engine = ContractEngine::from_data(data, EventLog::new())?;

    let (run_id, seed, start_tick, cash) = match restore {
        Some(run_id) => {
            let seed = store
                .run_seed(run_id)?
                .with_context(|| format!("No run {run_id} in {db}"))?;
            let Some(saved) = store.latest_snapshot(run_id)? else {
                bail!("Run {run_id} has no snapshot to restore from");
            };
            let state = EngineState::from_json(&saved.state_json)?;
            let report = engine.load_state(state);
            log::info!(
                "Restored {run_id} at tick {}: {} activations, {} dangling, {} duplicate, {} corrected",
                saved.tick,
                report.restored,
                report.dangling.len(),
                report.duplicates.len(),
                report.corrected.len()
            );
            (run_id.to_string(), seed, saved.tick, saved.cash)
        }
        None => {
            let run_id = format!("run-{seed}-{}", uuid::Uuid::new_v4().simple());
            store.insert_run(&run_id, seed, env!("CARGO_PKG_VERSION"))?;
            (run_id, seed, 0, starting_cash)
        }
    };

    let cash = Rc::new(Cell::new(cash));
    let wallet = Rc::clone(&cash);
    engine.set_budget_check(move |contract: &Contract| wallet.get() >= contract.budget_range.min);

    let mut desk = Desk {
        engine,
        store,
        run_id,
        cash,
        offers: StreamRng::new(seed, Stream::Offers, start_tick),
        incidents: StreamRng::new(seed, Stream::Incidents, start_tick),
        rejected: 0,
    };

    for tick in start_tick + 1..=start_tick + ticks {
        desk.run_tick(tick)?;
        if tick % SNAPSHOT_EVERY == 0 {
            desk.save_snapshot()?;
        }
    }
    desk.save_snapshot()?;

    print_summary(&desk, ticks)
}

/// Everything the host keeps between ticks.
struct Desk {
    engine:    ContractEngine<EventLog>,
    store:     SaveStore,
    run_id:    String,
    cash:      Rc<Cell<f64>>,
    offers:    StreamRng,
    incidents: StreamRng,
    rejected:  u64,
}

impl Desk {
    fn run_tick(&mut self, tick: Tick) -> Result<()> {
        self.engine.advance_to(tick);

        self.settle_due_contracts(tick);
        self.roll_incidents();
        self.offer_contract();

        for event in self.engine.bus_mut().drain() {
            self.store.append_event(&self.run_id, &event)?;
        }
        Ok(())
    }

    /// Complete every activation whose expected duration has elapsed.
    fn settle_due_contracts(&mut self, tick: Tick) {
        let due: Vec<(ActivationId, f64)> = self
            .engine
            .get_active()
            .iter()
            .filter_map(|active| {
                let contract = self.engine.catalog().get(&active.contract_id).ok()?;
                let length = contract.duration_range.midpoint().ceil() as Tick;
                let payout = contract.budget_range.midpoint();
                (tick >= active.accepted_at_tick + length).then_some((active.activation_id, payout))
            })
            .collect();

        for (activation_id, payout) in due {
            let multiplier = self.engine.get_performance_multiplier();
            match self.engine.complete(activation_id) {
                Ok(_) => self.cash.set(self.cash.get() + payout * multiplier),
                Err(e) => log::warn!("Could not complete {activation_id}: {e}"),
            }
        }
    }

    fn roll_incidents(&mut self) {
        let candidates: Vec<(ActivationId, f64)> = self
            .engine
            .get_active()
            .iter()
            .filter_map(|active| {
                let contract = self.engine.catalog().get(&active.contract_id).ok()?;
                Some((active.activation_id, self.engine.config().risk.weights.get(contract.risk_level)))
            })
            .collect();

        for (activation_id, weight) in candidates {
            if self.incidents.chance(INCIDENT_CHANCE * weight) {
                if let Err(e) = self.engine.record_incident(activation_id) {
                    log::warn!("Incident on {activation_id} dropped: {e}");
                }
            }
        }
    }

    fn offer_contract(&mut self) {
        if !self.offers.chance(OFFER_CHANCE) {
            return;
        }
        let ids: Vec<String> = self.engine.catalog().iter().map(|c| c.id.clone()).collect();
        let Some(index) = self.offers.pick(ids.len()) else {
            return;
        };
        let contract_id = &ids[index];

        let decision = self.engine.can_accept_contract(contract_id);
        match decision.reason {
            None => {
                if let Ok(contract) = self.engine.catalog().get(contract_id) {
                    let setup = contract.budget_range.min * SETUP_COST_SHARE;
                    self.cash.set(self.cash.get() - setup);
                }
            }
            Some(reason) => {
                self.rejected += 1;
                log::debug!("Offer {contract_id} declined: {reason}");
            }
        }
    }

    fn save_snapshot(&mut self) -> Result<()> {
        let tick = self.engine.current_tick();
        let json = self.engine.get_state().to_json()?;
        self.store.save_snapshot(&self.run_id, tick, self.cash.get(), &json)?;
        let pruned = self.engine.prune_settled();
        log::info!("Snapshot saved at tick {tick} ({pruned} settled activations pruned)");
        Ok(())
    }
}

fn print_summary(desk: &Desk, ticks: u64) -> Result<()> {
    let engine = &desk.engine;
    let counters = engine.counters();
    let capacity = engine.capacity();
    let overloads = desk.store.event_count(&desk.run_id, "contract_overloaded")?;
    let warnings = desk.store.event_count(&desk.run_id, "contract_capacity_changed")?;

    println!("=== RUN SUMMARY ===");
    println!("  run_id:         {}", desk.run_id);
    println!("  ticks run:      {ticks}");
    println!("  final tick:     {}", engine.current_tick());
    println!("  accepted:       {}", counters.total_accepted);
    println!("  rejected:       {}", desk.rejected);
    println!("  completed:      {}", counters.total_completed);
    println!("  breached:       {}", counters.total_breached);
    println!("  cancelled:      {}", counters.total_cancelled);
    println!("  active now:     {}", engine.get_active().len());
    println!(
        "  load:           {:.1} / {:.1} ({:.0}%)",
        capacity.used_capacity,
        capacity.total_capacity,
        capacity.load_ratio(engine.config().epsilon) * 100.0
    );
    println!("  headroom:       {:.1}", capacity.headroom(engine.config().overload_factor));
    println!("  multiplier:     {:.3}", engine.get_performance_multiplier());
    println!("  cash:           ${:.0}", desk.cash.get());
    println!("  overload evts:  {overloads}");
    println!("  capacity warns: {warnings}");
    Ok(())
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}

fn string_arg<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2).find(|w| w[0] == flag).map(|w| w[1].as_str())
}
