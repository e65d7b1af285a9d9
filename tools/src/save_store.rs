//! SQLite save-game writer.
//!
//! RULE: Only save_store.rs talks to the database.
//! The engine hands over an `EngineState` and drained events; this file
//! decides how they are laid out on disk.

use anyhow::{Context, Result};
use desk_core::{event::ContractEvent, types::Tick};
use rusqlite::{params, Connection, OptionalExtension};

/// A saved snapshot row.
#[derive(Debug, Clone, PartialEq)]
pub struct SavedSnapshot {
    pub tick:       Tick,
    pub cash:       f64,
    pub state_json: String,
}

pub struct SaveStore {
    conn: Connection,
}

impl SaveStore {
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        )
        .with_context(|| format!("Cannot open save database {path}"))?;
        // WAL only applies to real files; shared-memory URIs ignore it.
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    pub fn migrate(&self) -> Result<()> {
        self.conn.execute_batch(include_str!("../../migrations/001_save.sql"))?;
        Ok(())
    }

    // ── Run ────────────────────────────────────────────────────

    pub fn insert_run(&self, run_id: &str, seed: u64, version: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO run (run_id, seed, version, started_at) VALUES (?1, ?2, ?3, ?4)",
            params![run_id, seed as i64, version, chrono::Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn run_seed(&self, run_id: &str) -> Result<Option<u64>> {
        let seed = self
            .conn
            .query_row("SELECT seed FROM run WHERE run_id = ?1", params![run_id], |row| {
                row.get::<_, i64>(0)
            })
            .optional()?;
        Ok(seed.map(|s| s as u64))
    }

    // ── Event log ──────────────────────────────────────────────

    pub fn append_event(&self, run_id: &str, event: &ContractEvent) -> Result<()> {
        let payload = serde_json::to_string(event)?;
        self.conn.execute(
            "INSERT INTO event_log (run_id, tick, event_type, payload, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                run_id,
                event.tick() as i64,
                event.event_type(),
                payload,
                chrono::Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn event_count(&self, run_id: &str, event_type: &str) -> Result<i64> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM event_log WHERE run_id = ?1 AND event_type = ?2",
            params![run_id, event_type],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    // ── Snapshot ───────────────────────────────────────────────

    pub fn save_snapshot(&self, run_id: &str, tick: Tick, cash: f64, state_json: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO snapshot (run_id, tick, cash, state_json) VALUES (?1, ?2, ?3, ?4)",
            params![run_id, tick as i64, cash, state_json],
        )?;
        Ok(())
    }

    pub fn latest_snapshot(&self, run_id: &str) -> Result<Option<SavedSnapshot>> {
        let snapshot = self
            .conn
            .query_row(
                "SELECT tick, cash, state_json FROM snapshot
                 WHERE run_id = ?1
                 ORDER BY tick DESC, id DESC LIMIT 1",
                params![run_id],
                |row| {
                    Ok(SavedSnapshot {
                        tick:       row.get::<_, i64>(0)? as u64,
                        cash:       row.get(1)?,
                        state_json: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use desk_core::event::OverloadCause;

    fn store() -> SaveStore {
        let store = SaveStore::in_memory().unwrap();
        store.migrate().unwrap();
        store.insert_run("run-1", 42, "test").unwrap();
        store
    }

    #[test]
    fn run_seed_round_trips() {
        let store = store();
        assert_eq!(store.run_seed("run-1").unwrap(), Some(42));
        assert_eq!(store.run_seed("missing").unwrap(), None);
    }

    #[test]
    fn events_are_counted_per_run_and_type() {
        let store = store();
        let breach = ContractEvent::ContractOverloaded {
            tick:           5,
            cause:          OverloadCause::SlaBreach { incident_count: 3, max_allowed_incidents: 2 },
            activation_id:  None,
            used_capacity:  4.0,
            total_capacity: 10.0,
        };
        let warn = ContractEvent::ContractCapacityChanged { tick: 5, previous_ratio: 0.5, new_ratio: 0.875 };
        store.append_event("run-1", &warn).unwrap();
        store.append_event("run-1", &breach).unwrap();

        assert_eq!(store.event_count("run-1", "contract_overloaded").unwrap(), 1);
        assert_eq!(store.event_count("run-1", "contract_capacity_changed").unwrap(), 1);
        assert_eq!(store.event_count("other-run", "contract_overloaded").unwrap(), 0);
    }

    #[test]
    fn latest_snapshot_wins() {
        let store = store();
        assert!(store.latest_snapshot("run-1").unwrap().is_none());

        store.save_snapshot("run-1", 30, 100.0, "{\"a\":1}").unwrap();
        store.save_snapshot("run-1", 60, 250.0, "{\"a\":2}").unwrap();

        let latest = store.latest_snapshot("run-1").unwrap().unwrap();
        assert_eq!(latest.tick, 60);
        assert_eq!(latest.cash, 250.0);
        assert_eq!(latest.state_json, "{\"a\":2}");
    }

    #[test]
    fn snapshot_requires_known_run() {
        let store = store();
        assert!(store.save_snapshot("ghost", 1, 0.0, "{}").is_err());
    }
}
