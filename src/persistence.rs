//! SQLite persistence (C9): opportunities and trades tables, plus a forward-compatible migration
//! step so older database files pick up new columns without a manual schema bump.
//!
//! Grounded on `scanner/db.py` (`init_db`, `_migrate`, `_create_tables`, `log_opportunity`,
//! `mark_opportunity_executed`, `log_trade`), translated onto `rusqlite` (already bundled in the
//! teacher's dependency set).

use crate::error::ArbError;
use crate::market::{ExecutionResult, ExecutionStatus, Opportunity};
use rusqlite::{params, Connection};

pub struct Store {
    conn: Connection,
}

const OPPORTUNITIES_COLUMNS: &[(&str, &str)] = &[
    ("id", "INTEGER PRIMARY KEY AUTOINCREMENT"),
    ("venue_a_id", "TEXT NOT NULL"),
    ("venue_b_id", "TEXT NOT NULL"),
    ("venue_a_side", "TEXT NOT NULL"),
    ("venue_b_side", "TEXT NOT NULL"),
    ("combined_cost_cents", "REAL NOT NULL"),
    ("spread_cents", "REAL NOT NULL"),
    ("tier", "TEXT NOT NULL"),
    ("detected_at", "TEXT NOT NULL"),
    ("executed", "INTEGER NOT NULL DEFAULT 0"),
];

const TRADES_COLUMNS: &[(&str, &str)] = &[
    ("id", "INTEGER PRIMARY KEY AUTOINCREMENT"),
    ("venue_a_id", "TEXT NOT NULL"),
    ("venue_b_id", "TEXT NOT NULL"),
    ("status", "TEXT NOT NULL"),
    ("reason", "TEXT"),
    ("units", "INTEGER NOT NULL"),
    ("venue_a_order_id", "TEXT"),
    ("venue_b_order_id", "TEXT"),
    ("total_cost_usd", "REAL NOT NULL"),
    ("guaranteed_profit_usd", "REAL NOT NULL"),
    ("unwind_recovered_usd", "REAL NOT NULL DEFAULT 0"),
    ("executed_at", "TEXT NOT NULL"),
];

impl Store {
    pub fn open(path: &str) -> Result<Self, ArbError> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        let store = Self { conn };
        store.create_tables()?;
        store.migrate()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, ArbError> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        let store = Self { conn };
        store.create_tables()?;
        store.migrate()?;
        Ok(store)
    }

    fn create_tables(&self) -> Result<(), ArbError> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS opportunities (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                venue_a_id TEXT NOT NULL,
                venue_b_id TEXT NOT NULL,
                venue_a_side TEXT NOT NULL,
                venue_b_side TEXT NOT NULL,
                combined_cost_cents REAL NOT NULL,
                spread_cents REAL NOT NULL,
                tier TEXT NOT NULL,
                detected_at TEXT NOT NULL,
                executed INTEGER NOT NULL DEFAULT 0
            )",
            [],
        )?;
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS trades (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                venue_a_id TEXT NOT NULL,
                venue_b_id TEXT NOT NULL,
                status TEXT NOT NULL,
                reason TEXT,
                units INTEGER NOT NULL,
                venue_a_order_id TEXT,
                venue_b_order_id TEXT,
                total_cost_usd REAL NOT NULL,
                guaranteed_profit_usd REAL NOT NULL,
                unwind_recovered_usd REAL NOT NULL DEFAULT 0,
                executed_at TEXT NOT NULL
            )",
            [],
        )?;
        Ok(())
    }

    /// Inspects `PRAGMA table_info` for each known table and `ALTER TABLE ... ADD COLUMN`s in any
    /// column this binary knows about but an older database file doesn't, backfilling nothing
    /// (SQLite fills new columns with their declared default) so existing rows stay valid.
    fn migrate(&self) -> Result<(), ArbError> {
        self.migrate_table("opportunities", OPPORTUNITIES_COLUMNS)?;
        self.migrate_table("trades", TRADES_COLUMNS)?;
        Ok(())
    }

    fn migrate_table(&self, table: &str, columns: &[(&str, &str)]) -> Result<(), ArbError> {
        let mut stmt = self.conn.prepare(&format!("PRAGMA table_info({})", table))?;
        let existing: Vec<String> = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<Result<_, _>>()?;

        for (name, decl) in columns {
            if !existing.iter().any(|c| c == name) {
                self.conn.execute(
                    &format!("ALTER TABLE {} ADD COLUMN {} {}", table, name, decl),
                    [],
                )?;
            }
        }
        Ok(())
    }

    pub fn log_opportunity(&self, opp: &Opportunity) -> Result<i64, ArbError> {
        self.conn.execute(
            "INSERT INTO opportunities
                (venue_a_id, venue_b_id, venue_a_side, venue_b_side, combined_cost_cents,
                 spread_cents, tier, detected_at, executed)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0)",
            params![
                opp.pair.venue_a.platform_id,
                opp.pair.venue_b.platform_id,
                opp.venue_a_side.as_str(),
                opp.venue_b_side.as_str(),
                opp.combined_cost_cents,
                opp.spread_cents,
                opp.tier.as_str(),
                opp.detected_at.to_rfc3339(),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn mark_opportunity_executed(&self, opportunity_id: i64) -> Result<(), ArbError> {
        self.conn.execute(
            "UPDATE opportunities SET executed = 1 WHERE id = ?1",
            params![opportunity_id],
        )?;
        Ok(())
    }

    pub fn log_trade(&self, opp: &Opportunity, result: &ExecutionResult) -> Result<i64, ArbError> {
        self.conn.execute(
            "INSERT INTO trades
                (venue_a_id, venue_b_id, status, reason, units, venue_a_order_id, venue_b_order_id,
                 total_cost_usd, guaranteed_profit_usd, unwind_recovered_usd, executed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                opp.pair.venue_a.platform_id,
                opp.pair.venue_b.platform_id,
                result.status.as_str(),
                result.reason,
                result.units as i64,
                result.venue_a_order_id,
                result.venue_b_order_id,
                result.total_cost_usd,
                result.guaranteed_profit_usd,
                result.unwind_recovered_usd,
                chrono::Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn count_filled_trades(&self) -> Result<u64, ArbError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM trades WHERE status = ?1",
            params![ExecutionStatus::Filled.as_str()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}
