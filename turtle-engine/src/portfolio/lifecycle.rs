//! Holding lifecycle state machine.
//!
//! States per holding: **Open** → **AddedUp** (after the first pyramid
//! buy) → **Closed** (shares reach zero, the record is deleted and a
//! trade-history row is written). Every transition validates its
//! preconditions before touching storage — a rejected operation leaves no
//! partial state — and ends by rebalancing the user's shared risk pool so
//! all eligible stop-losses move together.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{recompute_aggregates, Holding, TradeHistory, Transaction, TransactionKind};
use crate::data::{PriceBar, PriceRouter};
use crate::error::{EngineError, Result};
use crate::risk::{self, RiskBudget, RiskProfile};
use crate::storage::PortfolioStore;

/// Share-count comparisons tolerate accumulated float error up to this.
const SHARE_EPSILON: f64 = 1e-9;

/// Calendar days of history fetched for volatility estimates. Covers the
/// 15 trading days an ATR needs with generous slack for holidays.
const VOLATILITY_LOOKBACK_DAYS: i64 = 120;

// ============================================================================
// Lifecycle Manager
// ============================================================================

/// Executes holding transitions against the portfolio store, pricing
/// stops through the shared price router.
pub struct LifecycleManager {
    store: Arc<dyn PortfolioStore>,
    prices: Arc<PriceRouter>,
}

impl LifecycleManager {
    pub fn new(store: Arc<dyn PortfolioStore>, prices: Arc<PriceRouter>) -> Self {
        Self { store, prices }
    }

    /// Buy shares of a symbol, opening a holding on the first purchase.
    ///
    /// Pyramiding an added-up holding goes through [`Self::add_up`]; a
    /// plain buy against one is rejected so the pyramid constraint cannot
    /// be bypassed.
    pub async fn buy(
        &self,
        user_id: &str,
        profile: &RiskProfile,
        symbol: &str,
        shares: f64,
        price: f64,
        date: DateTime<Utc>,
    ) -> Result<Holding> {
        profile.validate()?;
        validate_order(shares, price)?;
        let symbol = symbol.to_uppercase();

        let holding = match self.store.holding(user_id, &symbol).await? {
            Some(existing) if existing.is_added_up => {
                return Err(EngineError::InvalidTransition(format!(
                    "{} is pyramided; additional buys must go through add-up",
                    symbol
                )));
            }
            Some(existing) => {
                // Existing pool holding: append the buy and rebuild the
                // aggregates from the full transaction log.
                let tx =
                    Transaction::new(&existing.id, TransactionKind::Buy, shares, price, date);
                self.store.record_transaction(&tx).await?;

                let log = self.store.transactions(&existing.id).await?;
                let agg = recompute_aggregates(&log);

                let mut updated = existing;
                updated.total_shares = agg.total_shares;
                updated.average_price = agg.average_price;
                updated.stop_loss_price = self
                    .pool_stop_for(&symbol, agg.average_price)
                    .await?;
                self.store.update_holding(&updated).await?;

                info!(
                    user_id,
                    symbol = %symbol,
                    shares,
                    total_shares = updated.total_shares,
                    "Added to existing holding"
                );
                updated
            }
            None => {
                let mut holding = Holding::open(user_id, &symbol, shares, price, date);
                holding.stop_loss_price = self.pool_stop_for(&symbol, price).await?;

                self.store.insert_holding(&holding).await?;
                let tx = Transaction::new(&holding.id, TransactionKind::Buy, shares, price, date);
                self.store.record_transaction(&tx).await?;

                info!(user_id, symbol = %symbol, shares, price, "Opened holding");
                holding
            }
        };

        // The eligible set changed size or weight; every pool stop moves.
        self.rebalance_risk_pool(user_id, profile).await?;

        // Return the holding as the rebalance left it
        Ok(self
            .store
            .holding(user_id, &symbol)
            .await?
            .unwrap_or(holding))
    }

    /// Pyramid an existing holding with a smaller layer.
    ///
    /// The new layer must be strictly smaller than the current position
    /// (`shares < total_shares`); violating this is a rejected operation,
    /// not a clamp. The first add-up permanently removes the holding from
    /// the shared pool and re-anchors its stop 5% below the live market
    /// price.
    pub async fn add_up(
        &self,
        user_id: &str,
        profile: &RiskProfile,
        symbol: &str,
        shares: f64,
        price: f64,
        date: DateTime<Utc>,
    ) -> Result<Holding> {
        profile.validate()?;
        validate_order(shares, price)?;
        let symbol = symbol.to_uppercase();

        let existing = self
            .store
            .holding(user_id, &symbol)
            .await?
            .ok_or_else(|| {
                EngineError::InvalidTransition(format!("no holding in {} to add up", symbol))
            })?;

        if shares >= existing.total_shares - SHARE_EPSILON {
            return Err(EngineError::InvalidTransition(format!(
                "add-up of {} shares must be smaller than the current {} shares",
                shares, existing.total_shares
            )));
        }

        // The trailing stop needs the live price; fetch it before any
        // mutation so a quote failure rejects the whole operation.
        let quote = self
            .prices
            .quote(&symbol)
            .await
            .map_err(|e| EngineError::from_provider(&symbol, e))?;

        let tx = Transaction::new(&existing.id, TransactionKind::Buy, shares, price, date);
        self.store.record_transaction(&tx).await?;

        let log = self.store.transactions(&existing.id).await?;
        let agg = recompute_aggregates(&log);

        let mut updated = existing;
        updated.total_shares = agg.total_shares;
        updated.average_price = agg.average_price;
        updated.is_added_up = true;
        updated.stop_loss_price = risk::add_up_stop_loss(quote.price);
        self.store.update_holding(&updated).await?;

        info!(
            user_id,
            symbol = %symbol,
            shares,
            stop = updated.stop_loss_price,
            "Pyramided holding; now outside the shared risk pool"
        );

        // The pool shrank by one member
        self.rebalance_risk_pool(user_id, profile).await?;

        Ok(updated)
    }

    /// Sell shares. Selling the entire position closes the holding,
    /// deletes it, and leaves only the trade-history record behind.
    /// Partial sells keep the average price unchanged.
    ///
    /// Returns the surviving holding, or `None` when the sale closed it.
    pub async fn sell(
        &self,
        user_id: &str,
        profile: &RiskProfile,
        symbol: &str,
        shares: f64,
        price: f64,
        date: DateTime<Utc>,
    ) -> Result<Option<Holding>> {
        profile.validate()?;
        validate_order(shares, price)?;
        let symbol = symbol.to_uppercase();

        let existing = self
            .store
            .holding(user_id, &symbol)
            .await?
            .ok_or_else(|| {
                EngineError::InvalidTransition(format!("no holding in {} to sell", symbol))
            })?;

        if shares > existing.total_shares + SHARE_EPSILON {
            return Err(EngineError::InvalidTransition(format!(
                "cannot sell {} shares, only {} held",
                shares, existing.total_shares
            )));
        }

        let tx = Transaction::new(&existing.id, TransactionKind::Sell, shares, price, date);
        self.store.record_transaction(&tx).await?;

        // Realized P&L is valued against the holding's average cost
        let record = TradeHistory::from_sale(&existing, shares, price, date);
        self.store.insert_trade_history(&record).await?;

        let log = self.store.transactions(&existing.id).await?;
        let agg = recompute_aggregates(&log);

        let survivor = if agg.total_shares <= SHARE_EPSILON {
            self.store.delete_holding(&existing.id).await?;
            info!(
                user_id,
                symbol = %symbol,
                net_value = record.net_value,
                "Closed holding"
            );
            None
        } else {
            let mut updated = existing;
            updated.total_shares = agg.total_shares;
            updated.average_price = agg.average_price;
            self.store.update_holding(&updated).await?;
            info!(
                user_id,
                symbol = %symbol,
                sold = shares,
                remaining = updated.total_shares,
                "Partial sell"
            );
            Some(updated)
        };

        self.rebalance_risk_pool(user_id, profile).await?;

        match survivor {
            Some(h) => Ok(self.store.holding(user_id, &h.symbol).await?),
            None => Ok(None),
        }
    }

    /// Close a holding outright: sell the full position at `price`.
    pub async fn close(
        &self,
        user_id: &str,
        profile: &RiskProfile,
        symbol: &str,
        price: f64,
        date: DateTime<Utc>,
    ) -> Result<TradeHistory> {
        let symbol = symbol.to_uppercase();
        let existing = self
            .store
            .holding(user_id, &symbol)
            .await?
            .ok_or_else(|| {
                EngineError::InvalidTransition(format!("no holding in {} to close", symbol))
            })?;

        self.sell(user_id, profile, &symbol, existing.total_shares, price, date)
            .await?;

        let mut history = self.store.trade_history(user_id).await?;
        history.retain(|r| r.symbol == symbol);
        history
            .into_iter()
            .next()
            .ok_or_else(|| EngineError::Storage("close wrote no trade-history row".into()))
    }

    /// Recompute and atomically apply the stop-loss of every holding in
    /// the user's shared risk pool.
    ///
    /// Invoked at the end of every lifecycle transition, because the
    /// per-symbol budget depends on the eligible count and that count
    /// changes whenever a position opens, closes, or is pyramided.
    /// Returns the freshly divided risk budget.
    pub async fn rebalance_risk_pool(
        &self,
        user_id: &str,
        profile: &RiskProfile,
    ) -> Result<RiskBudget> {
        profile.validate()?;

        let holdings = self.store.holdings(user_id).await?;
        let eligible: Vec<&Holding> = holdings
            .iter()
            .filter(|h| h.is_pool_eligible() && h.total_shares > SHARE_EPSILON)
            .collect();

        let symbols: Vec<String> = eligible.iter().map(|h| h.symbol.clone()).collect();
        let budget = risk::risk_budget(profile, &symbols, None)?;

        let mut stops = Vec::with_capacity(eligible.len());
        for holding in &eligible {
            let stop = self
                .pool_stop_for(&holding.symbol, holding.average_price)
                .await?;
            stops.push((holding.id.clone(), stop));
        }

        // All stops become visible together, or none do
        self.store.update_stop_losses(user_id, &stops).await?;

        debug!(
            user_id,
            pool_size = stops.len(),
            risk_per_symbol = budget.risk_per_symbol,
            "Rebalanced risk pool"
        );

        Ok(budget)
    }

    /// Preview sizing for a symbol the user does not hold yet: the pool
    /// is counted as if the candidate had joined it.
    pub async fn preview_position(
        &self,
        user_id: &str,
        profile: &RiskProfile,
        symbol: &str,
    ) -> Result<risk::PositionSizing> {
        profile.validate()?;
        let symbol = symbol.to_uppercase();

        let holdings = self.store.holdings(user_id).await?;
        let eligible: Vec<String> = holdings
            .iter()
            .filter(|h| h.is_pool_eligible() && h.total_shares > SHARE_EPSILON)
            .map(|h| h.symbol.clone())
            .collect();

        // The candidate always joins the count, so the pool is never empty
        let budget = risk::risk_budget(profile, &eligible, Some(&symbol))?;

        let quote = self
            .prices
            .quote(&symbol)
            .await
            .map_err(|e| EngineError::from_provider(&symbol, e))?;
        let bars = self.recent_bars(&symbol).await;

        risk::size_position(profile, budget.risk_per_symbol, quote.price, &bars)
    }

    /// Value the whole portfolio at live prices. Read-only; symbols whose
    /// quote fails are skipped.
    pub async fn portfolio_performance(&self, user_id: &str) -> Result<PortfolioPerformance> {
        let holdings = self.store.holdings(user_id).await?;

        let mut entries = Vec::with_capacity(holdings.len());
        let mut total_invested = 0.0;
        let mut total_current = 0.0;

        for holding in &holdings {
            let quote = match self.prices.quote(&holding.symbol).await {
                Ok(q) => q,
                Err(e) => {
                    warn!(symbol = %holding.symbol, error = %e, "Skipping unquotable holding");
                    continue;
                }
            };

            let invested_value = holding.invested_value();
            let current_value = holding.market_value(quote.price);
            let gain_loss = current_value - invested_value;

            entries.push(PerformanceEntry {
                symbol: holding.symbol.clone(),
                shares: holding.total_shares,
                average_price: holding.average_price,
                current_price: quote.price,
                invested_value,
                current_value,
                gain_loss,
                gain_loss_percent: if invested_value > 0.0 {
                    gain_loss / invested_value * 100.0
                } else {
                    0.0
                },
            });

            total_invested += invested_value;
            total_current += current_value;
        }

        let total_gain_loss = total_current - total_invested;
        Ok(PortfolioPerformance {
            holdings: entries,
            total_invested,
            total_current,
            total_gain_loss,
            total_gain_loss_percent: if total_invested > 0.0 {
                total_gain_loss / total_invested * 100.0
            } else {
                0.0
            },
        })
    }

    /// Stop price for a pool holding anchored at `entry`: two volatility
    /// units below, with volatility from recent history (or its fallback
    /// chain when history is thin).
    async fn pool_stop_for(&self, symbol: &str, entry: f64) -> Result<f64> {
        let bars = self.recent_bars(symbol).await;
        risk::pool_stop_loss(entry, &bars)
    }

    /// Best-effort recent history for volatility. A provider failure
    /// degrades to an empty series — the volatility fallback chain takes
    /// over from there.
    async fn recent_bars(&self, symbol: &str) -> Vec<PriceBar> {
        let end = Utc::now().date_naive();
        let start = end - chrono::Duration::days(VOLATILITY_LOOKBACK_DAYS);
        match self.prices.daily_bars(symbol, start, end).await {
            Ok(bars) => bars,
            Err(e) => {
                warn!(symbol, error = %e, "No recent history; volatility falls back");
                Vec::new()
            }
        }
    }
}

/// Reject non-positive share counts or prices before any mutation.
fn validate_order(shares: f64, price: f64) -> Result<()> {
    if !shares.is_finite() || shares <= 0.0 {
        return Err(EngineError::InvalidTransition(format!(
            "share count must be positive, got {}",
            shares
        )));
    }
    if !price.is_finite() || price <= 0.0 {
        return Err(EngineError::InvalidTransition(format!(
            "price must be positive, got {}",
            price
        )));
    }
    Ok(())
}

// ============================================================================
// Performance Valuation
// ============================================================================

/// Live valuation of one holding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceEntry {
    pub symbol: String,
    pub shares: f64,
    pub average_price: f64,
    pub current_price: f64,
    pub invested_value: f64,
    pub current_value: f64,
    pub gain_loss: f64,
    pub gain_loss_percent: f64,
}

/// Live valuation of a user's whole portfolio.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioPerformance {
    pub holdings: Vec<PerformanceEntry>,
    pub total_invested: f64,
    pub total_current: f64,
    pub total_gain_loss: f64,
    pub total_gain_loss_percent: f64,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{PriceProvider, ProviderError, Quote};
    use crate::storage::SqliteStore;
    use async_trait::async_trait;
    use chrono::NaiveDate;

    /// Provider serving a flat synthetic series and a fixed quote.
    struct FixedProvider {
        price: f64,
        range: f64,
    }

    #[async_trait]
    impl PriceProvider for FixedProvider {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn history_priority(&self) -> u8 {
            1
        }

        fn quote_priority(&self) -> u8 {
            1
        }

        async fn daily_bars(
            &self,
            symbol: &str,
            start: NaiveDate,
            end: NaiveDate,
        ) -> std::result::Result<Vec<PriceBar>, ProviderError> {
            let days = (end - start).num_days().max(0) as usize;
            Ok((0..days.min(60))
                .map(|i| PriceBar {
                    symbol: symbol.to_string(),
                    date: start + chrono::Duration::days(i as i64),
                    open: self.price,
                    high: self.price + self.range / 2.0,
                    low: self.price - self.range / 2.0,
                    close: self.price,
                    volume: 1000.0,
                })
                .collect())
        }

        async fn quote(&self, symbol: &str) -> std::result::Result<Quote, ProviderError> {
            Ok(Quote {
                symbol: symbol.to_string(),
                price: self.price,
                change: 0.0,
                change_percent: 0.0,
                prev_close: self.price,
                timestamp: Utc::now(),
            })
        }
    }

    fn manager(price: f64, range: f64) -> (LifecycleManager, Arc<SqliteStore>) {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let router = Arc::new(PriceRouter::new(vec![Arc::new(FixedProvider {
            price,
            range,
        })]));
        (
            LifecycleManager::new(store.clone(), router),
            store,
        )
    }

    fn profile() -> RiskProfile {
        RiskProfile {
            capital: 10_000.0,
            risk_tolerance_percent: 2.0,
        }
    }

    #[tokio::test]
    async fn test_buy_opens_holding_with_stop() {
        let (manager, _store) = manager(100.0, 2.0);
        let holding = manager
            .buy("u1", &profile(), "aapl", 10.0, 100.0, Utc::now())
            .await
            .unwrap();

        assert_eq!(holding.symbol, "AAPL");
        assert!((holding.total_shares - 10.0).abs() < 1e-9);
        // Flat series → ATR = 2 → stop = 100 - 4
        assert!((holding.stop_loss_price - 96.0).abs() < 1e-9);
        assert!(!holding.is_added_up);
    }

    #[tokio::test]
    async fn test_second_buy_reaverages() {
        let (manager, _store) = manager(100.0, 2.0);
        let p = profile();
        manager.buy("u1", &p, "AAPL", 10.0, 100.0, Utc::now()).await.unwrap();
        let holding = manager
            .buy("u1", &p, "AAPL", 10.0, 120.0, Utc::now())
            .await
            .unwrap();

        assert!((holding.total_shares - 20.0).abs() < 1e-9);
        assert!((holding.average_price - 110.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_add_up_rejects_oversized_layer() {
        let (manager, store) = manager(100.0, 2.0);
        let p = profile();
        manager.buy("u1", &p, "AAPL", 10.0, 100.0, Utc::now()).await.unwrap();

        let err = manager
            .add_up("u1", &p, "AAPL", 15.0, 105.0, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidTransition(_)));

        // Rejection left no partial state: one transaction, pool flag off
        let holding = store.holding("u1", "AAPL").await.unwrap().unwrap();
        assert!(!holding.is_added_up);
        assert_eq!(store.transactions(&holding.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_add_up_flips_flag_and_trails_stop() {
        let (manager, _store) = manager(100.0, 2.0);
        let p = profile();
        manager.buy("u1", &p, "AAPL", 10.0, 100.0, Utc::now()).await.unwrap();

        let holding = manager
            .add_up("u1", &p, "AAPL", 5.0, 105.0, Utc::now())
            .await
            .unwrap();

        assert!(holding.is_added_up);
        assert!((holding.total_shares - 15.0).abs() < 1e-9);
        // Stop is 5% below the live quote (100), not ATR-derived
        assert!((holding.stop_loss_price - 95.0).abs() < 1e-9);

        // Plain buys are now rejected
        let err = manager
            .buy("u1", &p, "AAPL", 1.0, 100.0, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidTransition(_)));
    }

    #[tokio::test]
    async fn test_sell_more_than_held_rejected() {
        let (manager, store) = manager(100.0, 2.0);
        let p = profile();
        manager.buy("u1", &p, "AAPL", 10.0, 100.0, Utc::now()).await.unwrap();

        let err = manager
            .sell("u1", &p, "AAPL", 11.0, 110.0, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidTransition(_)));
        assert!(store.trade_history("u1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sell_to_zero_closes_and_records_trade() {
        let (manager, store) = manager(100.0, 2.0);
        let p = profile();
        manager.buy("u1", &p, "AAPL", 10.0, 100.0, Utc::now()).await.unwrap();

        let survivor = manager
            .sell("u1", &p, "AAPL", 10.0, 110.0, Utc::now())
            .await
            .unwrap();
        assert!(survivor.is_none());
        assert!(store.holding("u1", "AAPL").await.unwrap().is_none());

        let history = store.trade_history("u1").await.unwrap();
        assert_eq!(history.len(), 1);
        // net = (110 - 100) * 10
        assert!((history[0].net_value - 100.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_partial_sell_keeps_average() {
        let (manager, _store) = manager(100.0, 2.0);
        let p = profile();
        manager.buy("u1", &p, "AAPL", 10.0, 100.0, Utc::now()).await.unwrap();
        manager.buy("u1", &p, "AAPL", 10.0, 120.0, Utc::now()).await.unwrap();

        let survivor = manager
            .sell("u1", &p, "AAPL", 5.0, 130.0, Utc::now())
            .await
            .unwrap()
            .unwrap();

        assert!((survivor.total_shares - 15.0).abs() < 1e-9);
        assert!((survivor.average_price - 110.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_rebalance_touches_every_eligible_stop() {
        let (manager, store) = manager(100.0, 2.0);
        let p = profile();
        manager.buy("u1", &p, "AAPL", 10.0, 100.0, Utc::now()).await.unwrap();
        manager.buy("u1", &p, "MSFT", 5.0, 100.0, Utc::now()).await.unwrap();

        // Zero out stops behind the manager's back, then rebalance
        let holdings = store.holdings("u1").await.unwrap();
        let zeroed: Vec<(String, f64)> =
            holdings.iter().map(|h| (h.id.clone(), 0.0)).collect();
        store.update_stop_losses("u1", &zeroed).await.unwrap();

        let budget = manager.rebalance_risk_pool("u1", &p).await.unwrap();
        assert!((budget.risk_per_symbol - 100.0).abs() < 1e-9);

        for holding in store.holdings("u1").await.unwrap() {
            assert!((holding.stop_loss_price - 96.0).abs() < 1e-9);
        }
    }

    #[tokio::test]
    async fn test_added_up_holding_leaves_pool_budget() {
        let (manager, _store) = manager(100.0, 2.0);
        let p = profile();
        manager.buy("u1", &p, "AAPL", 10.0, 100.0, Utc::now()).await.unwrap();
        manager.buy("u1", &p, "MSFT", 10.0, 100.0, Utc::now()).await.unwrap();

        let budget = manager.rebalance_risk_pool("u1", &p).await.unwrap();
        assert_eq!(budget.allocations.len(), 2);

        manager.add_up("u1", &p, "AAPL", 5.0, 105.0, Utc::now()).await.unwrap();

        let budget = manager.rebalance_risk_pool("u1", &p).await.unwrap();
        assert_eq!(budget.allocations.len(), 1);
        assert!(budget.allocations.contains_key("MSFT"));
        assert!((budget.risk_per_symbol - 200.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_preview_counts_candidate() {
        let (manager, _store) = manager(100.0, 2.0);
        let p = profile();
        manager.buy("u1", &p, "AAPL", 10.0, 100.0, Utc::now()).await.unwrap();

        let sizing = manager.preview_position("u1", &p, "MSFT").await.unwrap();
        // Pool of 2 → $100 each; stop distance 4 → 25 shares
        assert!((sizing.risk_amount - 100.0).abs() < 1e-9);
        assert!((sizing.recommended_shares - 25.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_missing_risk_profile_rejected_before_mutation() {
        let (manager, store) = manager(100.0, 2.0);
        let broke = RiskProfile {
            capital: 0.0,
            risk_tolerance_percent: 2.0,
        };

        let err = manager
            .buy("u1", &broke, "AAPL", 10.0, 100.0, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InsufficientRiskProfile(_)));
        assert!(store.holding("u1", "AAPL").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_portfolio_performance_totals() {
        let (manager, _store) = manager(110.0, 2.0);
        let p = profile();
        manager.buy("u1", &p, "AAPL", 10.0, 100.0, Utc::now()).await.unwrap();

        let perf = manager.portfolio_performance("u1").await.unwrap();
        assert_eq!(perf.holdings.len(), 1);
        assert!((perf.total_invested - 1000.0).abs() < 1e-9);
        assert!((perf.total_current - 1100.0).abs() < 1e-9);
        assert!((perf.total_gain_loss - 100.0).abs() < 1e-9);
        assert!((perf.total_gain_loss_percent - 10.0).abs() < 1e-9);
    }
}
