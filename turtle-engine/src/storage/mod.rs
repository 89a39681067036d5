//! Persistence boundary for engine records.
//!
//! The engine does not pick a storage engine; it programs against the two
//! trait contracts below. `SqliteStore` is the bundled implementation and
//! doubles as the test store via in-memory connections.
//!
//! Contract notes:
//! - signal rows are keyed `UNIQUE(symbol, date)`; inserting a duplicate
//!   is a no-op, which is what makes the daily job idempotent across
//!   process restarts
//! - `claim_run` is the run-lock: exactly one caller per date wins
//! - `update_stop_losses` applies a user's whole batch atomically — a
//!   reader never observes a half-updated risk pool

pub mod sqlite;

pub use sqlite::SqliteStore;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::error::Result;
use crate::portfolio::{Holding, TradeHistory, Transaction};
use crate::signal::Signal;

// ============================================================================
// Signal Store
// ============================================================================

/// Persistence contract for daily analysis output.
#[async_trait]
pub trait SignalStore: Send + Sync {
    /// Claim the analysis run for a date. Returns `true` for the single
    /// caller that wins the claim; everyone else gets `false` and should
    /// serve the existing day instead of sweeping again.
    async fn claim_run(&self, date: NaiveDate) -> Result<bool>;

    /// Record the run's completion, stamped with the as-of market close.
    async fn complete_run(&self, date: NaiveDate, as_of: DateTime<Utc>) -> Result<()>;

    /// The as-of timestamp of the most recent completed run.
    async fn last_completed_run(&self) -> Result<Option<DateTime<Utc>>>;

    /// Insert one signal row; duplicate (symbol, date) pairs are ignored.
    async fn insert_signal(&self, signal: &Signal) -> Result<()>;

    /// All signal rows for a date, triggered first, then by symbol.
    async fn signals_for_date(&self, date: NaiveDate) -> Result<Vec<Signal>>;

    /// Whether any signal row exists for a date.
    async fn has_signals_for(&self, date: NaiveDate) -> Result<bool>;
}

// ============================================================================
// Portfolio Store
// ============================================================================

/// Persistence contract for holdings, their transaction logs, and
/// realized trade history.
#[async_trait]
pub trait PortfolioStore: Send + Sync {
    /// A user's holding in one symbol, if any.
    async fn holding(&self, user_id: &str, symbol: &str) -> Result<Option<Holding>>;

    /// All of a user's holdings.
    async fn holdings(&self, user_id: &str) -> Result<Vec<Holding>>;

    /// Create a holding.
    async fn insert_holding(&self, holding: &Holding) -> Result<()>;

    /// Persist a holding's current aggregates, stop, and pool flag.
    async fn update_holding(&self, holding: &Holding) -> Result<()>;

    /// Remove a holding and its transaction log.
    async fn delete_holding(&self, holding_id: &str) -> Result<()>;

    /// Append to a holding's transaction log.
    async fn record_transaction(&self, tx: &Transaction) -> Result<()>;

    /// A holding's full transaction log, oldest first.
    async fn transactions(&self, holding_id: &str) -> Result<Vec<Transaction>>;

    /// Apply a batch of `(holding_id, stop_loss_price)` updates for one
    /// user in a single atomic step.
    async fn update_stop_losses(&self, user_id: &str, stops: &[(String, f64)]) -> Result<()>;

    /// Append a realized-trade record.
    async fn insert_trade_history(&self, record: &TradeHistory) -> Result<()>;

    /// A user's realized trades, most recent sale first.
    async fn trade_history(&self, user_id: &str) -> Result<Vec<TradeHistory>>;
}
