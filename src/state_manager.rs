//! SQLite-backed persistence for positions and the trade audit trail
//!
//! Open positions survive restarts so the bot can recover in-flight state,
//! and every executed (or simulated) trade lands in an append-only table
//! for later review.

use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use tracing::{debug, info};

use crate::types::{Position, TradeRecord};

/// Aggregate stats over the recorded trades
#[derive(Debug, Clone, Default)]
pub struct PerformanceSummary {
    pub total_trades: i64,
    pub wins: i64,
    pub losses: i64,
    pub total_pnl: f64,
}

impl PerformanceSummary {
    pub fn win_rate(&self) -> f64 {
        let closed = self.wins + self.losses;
        if closed == 0 {
            return 0.0;
        }
        self.wins as f64 / closed as f64 * 100.0
    }
}

pub struct SqliteStateManager {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStateManager {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = db_path.as_ref();

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open database: {}", db_path.display()))?;

        // WAL mode for better concurrency
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        let manager = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        manager.create_tables()?;
        info!(path = %db_path.display(), "SQLite state manager initialized");

        Ok(manager)
    }

    fn create_tables(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();

        conn.execute(
            "CREATE TABLE IF NOT EXISTS trades (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                symbol TEXT NOT NULL,
                side TEXT NOT NULL,
                amount REAL NOT NULL,
                price REAL NOT NULL,
                total REAL NOT NULL,
                pnl REAL DEFAULT 0,
                status TEXT DEFAULT 'executed',
                strategy_signal TEXT,
                rsi_value REAL DEFAULT 0,
                macd_value REAL DEFAULT 0,
                notes TEXT DEFAULT '',
                created_at TEXT DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS positions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                symbol TEXT NOT NULL,
                side TEXT NOT NULL,
                amount REAL NOT NULL,
                entry_price REAL NOT NULL,
                current_price REAL NOT NULL,
                stop_loss REAL NOT NULL,
                take_profit REAL NOT NULL,
                status TEXT NOT NULL DEFAULT 'open',
                entry_time TEXT NOT NULL,
                updated_at TEXT DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_positions_status ON positions(status)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_trades_symbol ON trades(symbol)",
            [],
        )?;

        debug!("Database schema created/verified");
        Ok(())
    }

    /// Append a trade to the audit trail and return its row id
    pub fn record_trade(&self, trade: &TradeRecord) -> Result<i64> {
        let conn = self.conn.lock().unwrap();

        conn.execute(
            "INSERT INTO trades
             (timestamp, symbol, side, amount, price, total, pnl, status,
              strategy_signal, rsi_value, macd_value, notes)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                trade.timestamp.to_rfc3339(),
                trade.symbol,
                trade.side,
                trade.amount,
                trade.price,
                trade.total,
                trade.pnl,
                trade.status,
                trade.strategy_signal,
                trade.rsi_value,
                trade.macd_value,
                trade.notes,
            ],
        )?;

        let id = conn.last_insert_rowid();
        info!(
            "Trade recorded: {} {} {:.6} @ {:.2} | total {:.2} | pnl {:+.2}",
            trade.side.to_uppercase(),
            trade.symbol,
            trade.amount,
            trade.price,
            trade.total,
            trade.pnl,
        );

        Ok(id)
    }

    /// Insert a new position and return it with its row id set
    pub fn save_position(&self, pos: &Position) -> Result<Position> {
        let conn = self.conn.lock().unwrap();

        conn.execute(
            "INSERT INTO positions
             (symbol, side, amount, entry_price, current_price, stop_loss,
              take_profit, status, entry_time)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                pos.symbol,
                pos.side,
                pos.amount,
                pos.entry_price,
                pos.current_price,
                pos.stop_loss,
                pos.take_profit,
                pos.status,
                pos.entry_time.to_rfc3339(),
            ],
        )?;

        let mut saved = pos.clone();
        saved.id = Some(conn.last_insert_rowid());

        debug!(
            "Position saved: {} [{}] amount={:.6} @ {:.2}",
            saved.symbol, saved.status, saved.amount, saved.entry_price
        );
        Ok(saved)
    }

    /// Refresh the mark price on an open position
    pub fn update_position_price(&self, id: i64, current_price: f64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE positions
             SET current_price = ?1, updated_at = CURRENT_TIMESTAMP
             WHERE id = ?2",
            params![current_price, id],
        )?;
        Ok(())
    }

    /// Mark a position closed
    pub fn close_position(&self, id: i64, exit_price: f64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE positions
             SET status = 'closed', current_price = ?1, updated_at = CURRENT_TIMESTAMP
             WHERE id = ?2",
            params![exit_price, id],
        )?;
        debug!(position_id = id, exit_price, "Position closed");
        Ok(())
    }

    /// Load all open positions, used for crash recovery at startup
    pub fn open_positions(&self) -> Result<Vec<Position>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, symbol, side, amount, entry_price, current_price,
                    stop_loss, take_profit, status, entry_time
             FROM positions WHERE status = 'open'",
        )?;

        let positions = stmt
            .query_map([], |row| {
                let entry_time: String = row.get(9)?;
                Ok(Position {
                    id: Some(row.get(0)?),
                    symbol: row.get(1)?,
                    side: row.get(2)?,
                    amount: row.get(3)?,
                    entry_price: row.get(4)?,
                    current_price: row.get(5)?,
                    stop_loss: row.get(6)?,
                    take_profit: row.get(7)?,
                    status: row.get(8)?,
                    entry_time: entry_time
                        .parse::<DateTime<Utc>>()
                        .unwrap_or_else(|_| Utc::now()),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        debug!("Loaded {} open positions", positions.len());
        Ok(positions)
    }

    /// Aggregate win/loss stats over the trade audit trail
    pub fn performance_summary(&self) -> Result<PerformanceSummary> {
        let conn = self.conn.lock().unwrap();
        let summary = conn.query_row(
            "SELECT COUNT(*),
                    COALESCE(SUM(CASE WHEN pnl > 0 THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN pnl < 0 THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(pnl), 0)
             FROM trades",
            [],
            |row| {
                Ok(PerformanceSummary {
                    total_trades: row.get(0)?,
                    wins: row.get(1)?,
                    losses: row.get(2)?,
                    total_pnl: row.get(3)?,
                })
            },
        )?;
        Ok(summary)
    }
}
