//! Contract admission and SLA tracking core.
//!
//! Decides whether a contract can be taken on with the current specialist
//! roster, tracks incidents against each accepted contract's SLA, derives
//! the performance multiplier the economy model scales output by, and
//! snapshots/restores its own state for save games.
//!
//! Entry point: [`engine::ContractEngine`].

pub mod admission;
pub mod capacity;
pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod performance;
pub mod roster;
pub mod sla;
pub mod snapshot;
pub mod types;
