//! SQLite implementation of the engine's persistence contracts.
//!
//! Single-connection store behind an async mutex, the same shape the rest
//! of the platform uses for local data. The daily-run idempotency key
//! lives here as schema: `signals` is `UNIQUE(symbol, date)` with
//! conflict-ignoring inserts, and `analysis_runs.run_date` is `UNIQUE` so
//! the run claim survives process restarts and concurrent triggers.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{PortfolioStore, SignalStore};
use crate::error::{EngineError, Result};
use crate::portfolio::{Holding, TradeHistory, Transaction, TransactionKind};
use crate::signal::Signal;

// ============================================================================
// Database Schema
// ============================================================================

const CREATE_TABLES_SQL: &str = r#"
-- Market-wide daily analysis output
CREATE TABLE IF NOT EXISTS signals (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    symbol TEXT NOT NULL,
    date TEXT NOT NULL,
    close REAL NOT NULL,
    high_20d REAL,
    sma_50d REAL,
    sma_200d REAL,
    high_52w REAL,
    atr REAL,
    signal_triggered INTEGER NOT NULL DEFAULT 0,
    created_at TEXT DEFAULT CURRENT_TIMESTAMP,
    UNIQUE(symbol, date)
);

CREATE INDEX IF NOT EXISTS idx_signals_date
ON signals(date, signal_triggered DESC, symbol);

-- Daily run claim and completion stamp
CREATE TABLE IF NOT EXISTS analysis_runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_date TEXT NOT NULL UNIQUE,
    started_at TEXT DEFAULT CURRENT_TIMESTAMP,
    completed_at TEXT
);

-- User holdings
CREATE TABLE IF NOT EXISTS holdings (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    symbol TEXT NOT NULL,
    total_shares REAL NOT NULL,
    average_price REAL NOT NULL,
    stop_loss_price REAL NOT NULL DEFAULT 0,
    is_added_up INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    UNIQUE(user_id, symbol)
);

CREATE INDEX IF NOT EXISTS idx_holdings_user
ON holdings(user_id, symbol);

-- Append-only transaction log per holding
CREATE TABLE IF NOT EXISTS transactions (
    id TEXT PRIMARY KEY,
    holding_id TEXT NOT NULL,
    kind TEXT NOT NULL,
    shares REAL NOT NULL,
    price_per_share REAL NOT NULL,
    total_amount REAL NOT NULL,
    date TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_transactions_holding
ON transactions(holding_id, date);

-- Realized trades
CREATE TABLE IF NOT EXISTS trade_history (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    symbol TEXT NOT NULL,
    shares REAL NOT NULL,
    buy_price REAL NOT NULL,
    sell_price REAL NOT NULL,
    initial_value REAL NOT NULL,
    end_value REAL NOT NULL,
    net_value REAL NOT NULL,
    buy_date TEXT NOT NULL,
    sell_date TEXT NOT NULL,
    created_at TEXT DEFAULT CURRENT_TIMESTAMP
);

CREATE INDEX IF NOT EXISTS idx_trade_history_user
ON trade_history(user_id, sell_date DESC);
"#;

// ============================================================================
// Value Encoding
// ============================================================================

const DATE_FMT: &str = "%Y-%m-%d";

fn encode_date(date: NaiveDate) -> String {
    date.format(DATE_FMT).to_string()
}

fn decode_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, DATE_FMT)
        .map_err(|e| EngineError::Storage(format!("Bad date '{}': {}", s, e)))
}

fn encode_datetime(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn decode_datetime(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| EngineError::Storage(format!("Bad timestamp '{}': {}", s, e)))
}

// ============================================================================
// SQLite Store
// ============================================================================

/// SQLite-backed store implementing both persistence contracts.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and run migrations.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref())?;
        Self::init(conn, Some(path.as_ref()))
    }

    /// Open an in-memory database (used by tests).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn, None)
    }

    fn init(conn: Connection, path: Option<&Path>) -> Result<Self> {
        conn.execute_batch(CREATE_TABLES_SQL)?;
        match path {
            Some(path) => info!(path = %path.display(), "Opened SQLite store"),
            None => debug!("Opened in-memory SQLite store"),
        }
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn row_to_signal(row: &Row<'_>) -> rusqlite::Result<(Signal, String)> {
        let date_str: String = row.get("date")?;
        Ok((
            Signal {
                symbol: row.get("symbol")?,
                date: NaiveDate::MIN, // replaced after date decoding
                close: row.get("close")?,
                high_20d: row.get("high_20d")?,
                sma_50d: row.get("sma_50d")?,
                sma_200d: row.get("sma_200d")?,
                high_52w: row.get("high_52w")?,
                atr: row.get("atr")?,
                signal_triggered: row.get::<_, i64>("signal_triggered")? != 0,
            },
            date_str,
        ))
    }

    fn row_to_holding(row: &Row<'_>) -> rusqlite::Result<(Holding, String)> {
        let created_at: String = row.get("created_at")?;
        Ok((
            Holding {
                id: row.get("id")?,
                user_id: row.get("user_id")?,
                symbol: row.get("symbol")?,
                total_shares: row.get("total_shares")?,
                average_price: row.get("average_price")?,
                stop_loss_price: row.get("stop_loss_price")?,
                is_added_up: row.get::<_, i64>("is_added_up")? != 0,
                created_at: Utc::now(), // replaced after timestamp decoding
            },
            created_at,
        ))
    }
}

// ============================================================================
// SignalStore Implementation
// ============================================================================

#[async_trait]
impl SignalStore for SqliteStore {
    async fn claim_run(&self, date: NaiveDate) -> Result<bool> {
        let conn = self.conn.lock().await;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO analysis_runs (run_date) VALUES (?1)",
            params![encode_date(date)],
        )?;
        Ok(inserted == 1)
    }

    async fn complete_run(&self, date: NaiveDate, as_of: DateTime<Utc>) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "UPDATE analysis_runs SET completed_at = ?1 WHERE run_date = ?2",
            params![encode_datetime(as_of), encode_date(date)],
        )?;
        Ok(())
    }

    async fn last_completed_run(&self) -> Result<Option<DateTime<Utc>>> {
        let conn = self.conn.lock().await;
        let stamp: Option<String> = conn
            .query_row(
                "SELECT completed_at FROM analysis_runs
                 WHERE completed_at IS NOT NULL
                 ORDER BY run_date DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;

        stamp.map(|s| decode_datetime(&s)).transpose()
    }

    async fn insert_signal(&self, signal: &Signal) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT OR IGNORE INTO signals
             (symbol, date, close, high_20d, sma_50d, sma_200d, high_52w, atr, signal_triggered)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                signal.symbol,
                encode_date(signal.date),
                signal.close,
                signal.high_20d,
                signal.sma_50d,
                signal.sma_200d,
                signal.high_52w,
                signal.atr,
                signal.signal_triggered as i64,
            ],
        )?;
        Ok(())
    }

    async fn signals_for_date(&self, date: NaiveDate) -> Result<Vec<Signal>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT symbol, date, close, high_20d, sma_50d, sma_200d, high_52w, atr,
                    signal_triggered
             FROM signals WHERE date = ?1
             ORDER BY signal_triggered DESC, symbol",
        )?;

        let rows = stmt.query_map(params![encode_date(date)], Self::row_to_signal)?;

        let mut signals = Vec::new();
        for row in rows {
            let (mut signal, date_str) = row?;
            signal.date = decode_date(&date_str)?;
            signals.push(signal);
        }
        Ok(signals)
    }

    async fn has_signals_for(&self, date: NaiveDate) -> Result<bool> {
        let conn = self.conn.lock().await;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM signals WHERE date = ?1",
            params![encode_date(date)],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }
}

// ============================================================================
// PortfolioStore Implementation
// ============================================================================

#[async_trait]
impl PortfolioStore for SqliteStore {
    async fn holding(&self, user_id: &str, symbol: &str) -> Result<Option<Holding>> {
        let conn = self.conn.lock().await;
        let row = conn
            .query_row(
                "SELECT id, user_id, symbol, total_shares, average_price, stop_loss_price,
                        is_added_up, created_at
                 FROM holdings WHERE user_id = ?1 AND symbol = ?2",
                params![user_id, symbol.to_uppercase()],
                Self::row_to_holding,
            )
            .optional()?;

        row.map(|(mut holding, created_at)| {
            holding.created_at = decode_datetime(&created_at)?;
            Ok(holding)
        })
        .transpose()
    }

    async fn holdings(&self, user_id: &str) -> Result<Vec<Holding>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, user_id, symbol, total_shares, average_price, stop_loss_price,
                    is_added_up, created_at
             FROM holdings WHERE user_id = ?1 ORDER BY symbol",
        )?;

        let rows = stmt.query_map(params![user_id], Self::row_to_holding)?;

        let mut holdings = Vec::new();
        for row in rows {
            let (mut holding, created_at) = row?;
            holding.created_at = decode_datetime(&created_at)?;
            holdings.push(holding);
        }
        Ok(holdings)
    }

    async fn insert_holding(&self, holding: &Holding) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO holdings
             (id, user_id, symbol, total_shares, average_price, stop_loss_price,
              is_added_up, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                holding.id,
                holding.user_id,
                holding.symbol,
                holding.total_shares,
                holding.average_price,
                holding.stop_loss_price,
                holding.is_added_up as i64,
                encode_datetime(holding.created_at),
            ],
        )?;
        Ok(())
    }

    async fn update_holding(&self, holding: &Holding) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "UPDATE holdings
             SET total_shares = ?1, average_price = ?2, stop_loss_price = ?3,
                 is_added_up = ?4
             WHERE id = ?5",
            params![
                holding.total_shares,
                holding.average_price,
                holding.stop_loss_price,
                holding.is_added_up as i64,
                holding.id,
            ],
        )?;
        Ok(())
    }

    async fn delete_holding(&self, holding_id: &str) -> Result<()> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM transactions WHERE holding_id = ?1",
            params![holding_id],
        )?;
        tx.execute("DELETE FROM holdings WHERE id = ?1", params![holding_id])?;
        tx.commit()?;
        Ok(())
    }

    async fn record_transaction(&self, record: &Transaction) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO transactions
             (id, holding_id, kind, shares, price_per_share, total_amount, date)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                record.id,
                record.holding_id,
                record.kind.as_str(),
                record.shares,
                record.price_per_share,
                record.total_amount,
                encode_datetime(record.date),
            ],
        )?;
        Ok(())
    }

    async fn transactions(&self, holding_id: &str) -> Result<Vec<Transaction>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, holding_id, kind, shares, price_per_share, total_amount, date
             FROM transactions WHERE holding_id = ?1 ORDER BY date",
        )?;

        let rows = stmt.query_map(params![holding_id], |row| {
            let kind: String = row.get("kind")?;
            let date: String = row.get("date")?;
            Ok((
                Transaction {
                    id: row.get("id")?,
                    holding_id: row.get("holding_id")?,
                    kind: TransactionKind::parse(&kind).unwrap_or(TransactionKind::Buy),
                    shares: row.get("shares")?,
                    price_per_share: row.get("price_per_share")?,
                    total_amount: row.get("total_amount")?,
                    date: Utc::now(),
                },
                date,
            ))
        })?;

        let mut transactions = Vec::new();
        for row in rows {
            let (mut record, date) = row?;
            record.date = decode_datetime(&date)?;
            transactions.push(record);
        }
        Ok(transactions)
    }

    async fn update_stop_losses(&self, user_id: &str, stops: &[(String, f64)]) -> Result<()> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        for (holding_id, stop) in stops {
            tx.execute(
                "UPDATE holdings SET stop_loss_price = ?1 WHERE id = ?2 AND user_id = ?3",
                params![stop, holding_id, user_id],
            )?;
        }
        tx.commit()?;
        debug!(user_id, count = stops.len(), "Applied stop-loss batch");
        Ok(())
    }

    async fn insert_trade_history(&self, record: &TradeHistory) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO trade_history
             (id, user_id, symbol, shares, buy_price, sell_price, initial_value,
              end_value, net_value, buy_date, sell_date)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                record.id,
                record.user_id,
                record.symbol,
                record.shares,
                record.buy_price,
                record.sell_price,
                record.initial_value,
                record.end_value,
                record.net_value,
                encode_datetime(record.buy_date),
                encode_datetime(record.sell_date),
            ],
        )?;
        Ok(())
    }

    async fn trade_history(&self, user_id: &str) -> Result<Vec<TradeHistory>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, user_id, symbol, shares, buy_price, sell_price, initial_value,
                    end_value, net_value, buy_date, sell_date
             FROM trade_history WHERE user_id = ?1 ORDER BY sell_date DESC",
        )?;

        let rows = stmt.query_map(params![user_id], |row| {
            let buy_date: String = row.get("buy_date")?;
            let sell_date: String = row.get("sell_date")?;
            Ok((
                TradeHistory {
                    id: row.get("id")?,
                    user_id: row.get("user_id")?,
                    symbol: row.get("symbol")?,
                    shares: row.get("shares")?,
                    buy_price: row.get("buy_price")?,
                    sell_price: row.get("sell_price")?,
                    initial_value: row.get("initial_value")?,
                    end_value: row.get("end_value")?,
                    net_value: row.get("net_value")?,
                    buy_date: Utc::now(),
                    sell_date: Utc::now(),
                },
                (buy_date, sell_date),
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (mut record, (buy_date, sell_date)) = row?;
            record.buy_date = decode_datetime(&buy_date)?;
            record.sell_date = decode_datetime(&sell_date)?;
            records.push(record);
        }
        Ok(records)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::IndicatorSnapshot;

    fn signal(symbol: &str, date: NaiveDate, triggered: bool) -> Signal {
        let snapshot = IndicatorSnapshot {
            high_20d: Some(100.0),
            sma_50d: Some(95.0),
            sma_200d: Some(90.0),
            high_52w: Some(if triggered { 102.0 } else { 200.0 }),
            atr_14d: Some(2.0),
        };
        Signal::from_snapshot(symbol, date, 100.0, &snapshot)
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 3).unwrap()
    }

    #[tokio::test]
    async fn test_claim_run_single_winner() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(store.claim_run(date()).await.unwrap());
        assert!(!store.claim_run(date()).await.unwrap());
        // A different date is a fresh claim
        assert!(store
            .claim_run(date() + chrono::Duration::days(1))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_duplicate_signal_insert_ignored() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.insert_signal(&signal("AAPL", date(), true)).await.unwrap();
        store.insert_signal(&signal("AAPL", date(), false)).await.unwrap();

        let signals = store.signals_for_date(date()).await.unwrap();
        assert_eq!(signals.len(), 1);
        // The first write wins; the duplicate did not overwrite
        assert!(signals[0].signal_triggered);
    }

    #[tokio::test]
    async fn test_signals_ordered_triggered_first() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.insert_signal(&signal("ZM", date(), true)).await.unwrap();
        store.insert_signal(&signal("AAPL", date(), false)).await.unwrap();
        store.insert_signal(&signal("MSFT", date(), true)).await.unwrap();

        let signals = store.signals_for_date(date()).await.unwrap();
        let names: Vec<&str> = signals.iter().map(|s| s.symbol.as_str()).collect();
        assert_eq!(names, vec!["MSFT", "ZM", "AAPL"]);
        assert!(store.has_signals_for(date()).await.unwrap());
        assert!(!store
            .has_signals_for(date() + chrono::Duration::days(1))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_run_completion_roundtrip() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(store.last_completed_run().await.unwrap().is_none());

        store.claim_run(date()).await.unwrap();
        let as_of = Utc::now();
        store.complete_run(date(), as_of).await.unwrap();

        let stamp = store.last_completed_run().await.unwrap().unwrap();
        assert_eq!(stamp.timestamp(), as_of.timestamp());
    }

    #[tokio::test]
    async fn test_holding_roundtrip_and_stop_batch() {
        let store = SqliteStore::open_in_memory().unwrap();
        let a = Holding::open("u1", "AAPL", 10.0, 100.0, Utc::now());
        let b = Holding::open("u1", "MSFT", 5.0, 200.0, Utc::now());
        store.insert_holding(&a).await.unwrap();
        store.insert_holding(&b).await.unwrap();

        store
            .update_stop_losses("u1", &[(a.id.clone(), 96.0), (b.id.clone(), 190.0)])
            .await
            .unwrap();

        let found = store.holding("u1", "AAPL").await.unwrap().unwrap();
        assert!((found.stop_loss_price - 96.0).abs() < 1e-9);
        let all = store.holdings("u1").await.unwrap();
        assert_eq!(all.len(), 2);

        store.delete_holding(&a.id).await.unwrap();
        assert!(store.holding("u1", "AAPL").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_transaction_log_roundtrip() {
        let store = SqliteStore::open_in_memory().unwrap();
        let holding = Holding::open("u1", "AAPL", 10.0, 100.0, Utc::now());
        store.insert_holding(&holding).await.unwrap();

        let tx = Transaction::new(&holding.id, TransactionKind::Buy, 10.0, 100.0, Utc::now());
        store.record_transaction(&tx).await.unwrap();

        let log = store.transactions(&holding.id).await.unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].kind, TransactionKind::Buy);
        assert!((log[0].total_amount - 1000.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_trade_history_roundtrip() {
        let store = SqliteStore::open_in_memory().unwrap();
        let holding = Holding::open("u1", "AAPL", 10.0, 100.0, Utc::now());
        let record = TradeHistory::from_sale(&holding, 10.0, 110.0, Utc::now());
        store.insert_trade_history(&record).await.unwrap();

        let history = store.trade_history("u1").await.unwrap();
        assert_eq!(history.len(), 1);
        assert!((history[0].net_value - 100.0).abs() < 1e-9);
    }
}
