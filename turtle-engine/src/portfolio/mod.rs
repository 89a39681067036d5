//! Portfolio domain types: holdings, their transaction log, and the
//! realized trade history.
//!
//! A holding's share count and average price are never stored as an
//! independent source of truth — they are recomputed from the append-only
//! transaction log on every mutation, so the aggregates can always be
//! rebuilt and audited.

pub mod lifecycle;

pub use lifecycle::{LifecycleManager, PerformanceEntry, PortfolioPerformance};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Holding
// ============================================================================

/// One user's position in one symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Holding {
    /// Holding ID
    pub id: String,
    /// Owning user
    pub user_id: String,
    /// Symbol/ticker
    pub symbol: String,
    /// Shares currently held (buys minus sells)
    pub total_shares: f64,
    /// Cost-weighted average buy price
    pub average_price: f64,
    /// Current stop-loss price per share
    pub stop_loss_price: f64,
    /// Whether the holding has been pyramided. Once true, the holding is
    /// permanently outside the shared risk pool (until closed) and runs
    /// on its own trailing-stop rule.
    pub is_added_up: bool,
    /// When the position was opened
    pub created_at: DateTime<Utc>,
}

impl Holding {
    /// Open a new holding from its first buy.
    pub fn open(
        user_id: impl Into<String>,
        symbol: impl Into<String>,
        shares: f64,
        price: f64,
        opened_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            symbol: symbol.into(),
            total_shares: shares,
            average_price: price,
            stop_loss_price: 0.0,
            is_added_up: false,
            created_at: opened_at,
        }
    }

    /// Whether the holding participates in the shared risk pool.
    pub fn is_pool_eligible(&self) -> bool {
        !self.is_added_up
    }

    /// Capital invested at average cost.
    pub fn invested_value(&self) -> f64 {
        self.total_shares * self.average_price
    }

    /// Value at a given market price.
    pub fn market_value(&self, price: f64) -> f64 {
        self.total_shares * price
    }
}

// ============================================================================
// Transaction
// ============================================================================

/// Kind of a portfolio transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Buy,
    Sell,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "buy",
            Self::Sell => "sell",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "buy" => Some(Self::Buy),
            "sell" => Some(Self::Sell),
            _ => None,
        }
    }
}

/// One entry in a holding's append-only transaction log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    /// Transaction ID
    pub id: String,
    /// Holding this entry belongs to
    pub holding_id: String,
    /// Buy or sell
    pub kind: TransactionKind,
    /// Shares traded
    pub shares: f64,
    /// Price per share
    pub price_per_share: f64,
    /// `shares × price_per_share`
    pub total_amount: f64,
    /// When the trade happened
    pub date: DateTime<Utc>,
}

impl Transaction {
    pub fn new(
        holding_id: impl Into<String>,
        kind: TransactionKind,
        shares: f64,
        price_per_share: f64,
        date: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            holding_id: holding_id.into(),
            kind,
            shares,
            price_per_share,
            total_amount: shares * price_per_share,
            date,
        }
    }
}

// ============================================================================
// Aggregates
// ============================================================================

/// Derived aggregates over a holding's transaction log.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aggregates {
    /// Buys minus sells
    pub total_shares: f64,
    /// Cost-weighted average over buy transactions only; sells leave the
    /// average cost untouched
    pub average_price: f64,
}

/// Recompute a holding's aggregates from its full transaction log.
///
/// Order-independent: summing the log in any order yields the same
/// result.
pub fn recompute_aggregates(transactions: &[Transaction]) -> Aggregates {
    let mut bought = 0.0;
    let mut cost = 0.0;
    let mut sold = 0.0;

    for tx in transactions {
        match tx.kind {
            TransactionKind::Buy => {
                bought += tx.shares;
                cost += tx.shares * tx.price_per_share;
            }
            TransactionKind::Sell => sold += tx.shares,
        }
    }

    Aggregates {
        total_shares: bought - sold,
        average_price: if bought > 0.0 { cost / bought } else { 0.0 },
    }
}

// ============================================================================
// Trade History
// ============================================================================

/// Realized-trade record written whenever shares are sold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeHistory {
    /// Record ID
    pub id: String,
    /// Owning user
    pub user_id: String,
    /// Symbol/ticker
    pub symbol: String,
    /// Shares sold
    pub shares: f64,
    /// Per-share cost basis (the holding's average price)
    pub buy_price: f64,
    /// Per-share sale price
    pub sell_price: f64,
    /// `shares × buy_price`
    pub initial_value: f64,
    /// `shares × sell_price`
    pub end_value: f64,
    /// `end_value - initial_value`
    pub net_value: f64,
    /// When the position was opened
    pub buy_date: DateTime<Utc>,
    /// When the shares were sold
    pub sell_date: DateTime<Utc>,
}

impl TradeHistory {
    /// Build the realized record for selling `shares` out of `holding` at
    /// `sell_price`, valuing the buy side at the holding's average cost.
    pub fn from_sale(
        holding: &Holding,
        shares: f64,
        sell_price: f64,
        sell_date: DateTime<Utc>,
    ) -> Self {
        let initial_value = shares * holding.average_price;
        let end_value = shares * sell_price;
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: holding.user_id.clone(),
            symbol: holding.symbol.clone(),
            shares,
            buy_price: holding.average_price,
            sell_price,
            initial_value,
            end_value,
            net_value: end_value - initial_value,
            buy_date: holding.created_at,
            sell_date,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn buy(shares: f64, price: f64) -> Transaction {
        Transaction::new("h1", TransactionKind::Buy, shares, price, Utc::now())
    }

    fn sell(shares: f64, price: f64) -> Transaction {
        Transaction::new("h1", TransactionKind::Sell, shares, price, Utc::now())
    }

    #[test]
    fn test_average_price_recomputation() {
        let txs = vec![buy(10.0, 100.0), buy(10.0, 120.0)];
        let agg = recompute_aggregates(&txs);
        assert!((agg.total_shares - 20.0).abs() < 1e-9);
        assert!((agg.average_price - 110.0).abs() < 1e-9);

        // Order independence
        let reversed = vec![buy(10.0, 120.0), buy(10.0, 100.0)];
        assert_eq!(recompute_aggregates(&reversed), agg);
    }

    #[test]
    fn test_sells_reduce_shares_not_average() {
        let txs = vec![buy(10.0, 100.0), buy(10.0, 120.0), sell(5.0, 130.0)];
        let agg = recompute_aggregates(&txs);
        assert!((agg.total_shares - 15.0).abs() < 1e-9);
        assert!((agg.average_price - 110.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_log_is_zero() {
        let agg = recompute_aggregates(&[]);
        assert_eq!(agg.total_shares, 0.0);
        assert_eq!(agg.average_price, 0.0);
    }

    #[test]
    fn test_trade_history_from_sale() {
        let holding = Holding {
            average_price: 100.0,
            ..Holding::open("u1", "AAPL", 10.0, 100.0, Utc::now())
        };
        let record = TradeHistory::from_sale(&holding, 10.0, 110.0, Utc::now());

        assert!((record.initial_value - 1000.0).abs() < 1e-9);
        assert!((record.end_value - 1100.0).abs() < 1e-9);
        assert!((record.net_value - 100.0).abs() < 1e-9);
        assert!((record.buy_price - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_transaction_kind_roundtrip() {
        assert_eq!(TransactionKind::parse("buy"), Some(TransactionKind::Buy));
        assert_eq!(TransactionKind::parse("sell"), Some(TransactionKind::Sell));
        assert_eq!(TransactionKind::parse("short"), None);
        assert_eq!(TransactionKind::Buy.as_str(), "buy");
    }

    #[test]
    fn test_pool_eligibility() {
        let mut holding = Holding::open("u1", "AAPL", 10.0, 100.0, Utc::now());
        assert!(holding.is_pool_eligible());
        holding.is_added_up = true;
        assert!(!holding.is_pool_eligible());
    }
}
