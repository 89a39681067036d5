//! End-to-end flow: daily analysis over a universe, then acting on a
//! triggered signal through the full holding lifecycle.
//!
//! Uses a synthetic provider and an in-memory store; the flow is the same
//! one the production wiring runs.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};

use turtle_engine::analysis::{DailyAnalysisJob, JobConfig};
use turtle_engine::data::{
    PriceBar, PriceProvider, PriceRouter, ProviderError, Quote, StaticUniverse,
};
use turtle_engine::error::EngineError;
use turtle_engine::risk::RiskProfile;
use turtle_engine::portfolio::LifecycleManager;
use turtle_engine::storage::{PortfolioStore, SignalStore, SqliteStore};

// ============================================================================
// Synthetic Market
// ============================================================================

/// Provider with a deterministic series per symbol. "UP" trends into a
/// breakout, "FLAT" drifts sideways under its old high, "NEW" has only a
/// few weeks of history.
struct SyntheticMarket {
    bar_calls: AtomicU32,
}

impl SyntheticMarket {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            bar_calls: AtomicU32::new(0),
        })
    }

    fn series(symbol: &str, end: NaiveDate) -> Option<Vec<PriceBar>> {
        let closes: Vec<f64> = match symbol {
            // Steady uptrend closing on its high
            "UP" => (0..260).map(|i| 50.0 + i as f64 * 0.25).collect(),
            // An early spike to 120, then a long drift around 80
            "FLAT" => (0..260)
                .map(|i| if i == 10 { 120.0 } else { 80.0 + (i % 5) as f64 * 0.1 })
                .collect(),
            // Recently listed
            "NEW" => (0..40).map(|i| 30.0 + i as f64 * 0.1).collect(),
            _ => return None,
        };

        let n = closes.len();
        Some(
            closes
                .into_iter()
                .enumerate()
                .map(|(i, close)| PriceBar {
                    symbol: symbol.to_string(),
                    date: end - chrono::Duration::days((n - 1 - i) as i64),
                    open: close,
                    high: close + 0.5,
                    low: close - 0.5,
                    close,
                    volume: 1_000_000.0,
                })
                .collect(),
        )
    }
}

#[async_trait]
impl PriceProvider for SyntheticMarket {
    fn name(&self) -> &'static str {
        "synthetic"
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
        _start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceBar>, ProviderError> {
        self.bar_calls.fetch_add(1, Ordering::Relaxed);
        Self::series(symbol, end).ok_or_else(|| ProviderError::SymbolNotFound(symbol.to_string()))
    }

    async fn quote(&self, symbol: &str) -> Result<Quote, ProviderError> {
        let end = Utc::now().date_naive();
        let last = Self::series(symbol, end)
            .and_then(|bars| bars.last().map(|b| b.close))
            .ok_or_else(|| ProviderError::SymbolNotFound(symbol.to_string()))?;
        Ok(Quote {
            symbol: symbol.to_string(),
            price: last,
            change: 0.0,
            change_percent: 0.0,
            prev_close: last,
            timestamp: Utc::now(),
        })
    }
}

struct Harness {
    market: Arc<SyntheticMarket>,
    store: Arc<SqliteStore>,
    job: DailyAnalysisJob,
    lifecycle: LifecycleManager,
}

fn harness() -> Harness {
    let market = SyntheticMarket::new();
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let router = Arc::new(PriceRouter::new(vec![
        market.clone() as Arc<dyn PriceProvider>
    ]));
    let universe = Arc::new(StaticUniverse::new(["UP", "FLAT", "NEW", "GONE"]));

    Harness {
        market,
        store: store.clone(),
        job: DailyAnalysisJob::new(
            Arc::clone(&router),
            universe,
            store.clone(),
            JobConfig::default(),
        ),
        lifecycle: LifecycleManager::new(store, router),
    }
}

fn run_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 3).unwrap()
}

fn profile() -> RiskProfile {
    RiskProfile {
        capital: 50_000.0,
        risk_tolerance_percent: 2.0,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn daily_sweep_separates_breakouts_from_the_rest() {
    let h = harness();
    let signals = h.job.run_for_date(run_date()).await.unwrap();

    // GONE is skipped (unknown), NEW is under the sufficiency floor
    assert_eq!(signals.len(), 2);

    let up = signals.iter().find(|s| s.symbol == "UP").unwrap();
    assert!(up.signal_triggered);
    assert!(up.high_52w.is_some());
    assert!(up.atr.is_some());

    // FLAT trades far under its 52-week high; no breakout
    let flat = signals.iter().find(|s| s.symbol == "FLAT").unwrap();
    assert!(!flat.signal_triggered);

    // Triggered rows sort first
    assert_eq!(signals[0].symbol, "UP");
}

#[tokio::test]
async fn rerun_and_concurrent_trigger_cannot_double_sweep() {
    let h = harness();
    let first = h.job.run_for_date(run_date()).await.unwrap();
    let calls_after_first = h.market.bar_calls.load(Ordering::Relaxed);

    // A manual re-trigger the same day is absorbed without provider work
    let second = h.job.run_for_date(run_date()).await.unwrap();
    assert_eq!(first.len(), second.len());
    assert_eq!(h.market.bar_calls.load(Ordering::Relaxed), calls_after_first);

    // Storage-level claim: a racing claim for the same date loses
    assert!(!h.store.claim_run(run_date()).await.unwrap());
}

#[tokio::test]
async fn crash_resume_serves_the_claimed_day() {
    let h = harness();

    // Simulate a sweep that claimed the day and died before any rows
    assert!(h.store.claim_run(run_date()).await.unwrap());

    let signals = h.job.run_for_date(run_date()).await.unwrap();
    assert!(signals.is_empty());
    assert_eq!(h.market.bar_calls.load(Ordering::Relaxed), 0);
}

#[tokio::test]
async fn signal_to_position_lifecycle() {
    let h = harness();
    let p = profile();
    let signals = h.job.run_for_date(run_date()).await.unwrap();
    let up = signals.iter().find(|s| s.signal_triggered).unwrap();

    // Size the position off the signal, then take it
    let sizing = h.lifecycle.preview_position("u1", &p, &up.symbol).await.unwrap();
    assert!(sizing.recommended_shares > 0.0);
    assert!(sizing.stop_loss_price < sizing.entry_price);

    let holding = h
        .lifecycle
        .buy("u1", &p, &up.symbol, 20.0, up.close, Utc::now())
        .await
        .unwrap();
    assert!(holding.stop_loss_price > 0.0);
    assert!(holding.stop_loss_price < up.close);

    // Pyramid with a smaller layer: flag flips, stop trails the market
    let holding = h
        .lifecycle
        .add_up("u1", &p, &up.symbol, 10.0, up.close + 1.0, Utc::now())
        .await
        .unwrap();
    assert!(holding.is_added_up);
    assert!((holding.total_shares - 30.0).abs() < 1e-9);

    // A second user's pool is untouched by u1's transitions
    h.lifecycle
        .buy("u2", &p, "FLAT", 10.0, 80.0, Utc::now())
        .await
        .unwrap();
    let u2 = h.store.holding("u2", "FLAT").await.unwrap().unwrap();
    assert!(!u2.is_added_up);

    // Close out and check the realized record
    let avg = holding.average_price;
    let record = h
        .lifecycle
        .close("u1", &p, &up.symbol, avg + 5.0, Utc::now())
        .await
        .unwrap();
    assert!((record.shares - 30.0).abs() < 1e-9);
    assert!((record.net_value - 150.0).abs() < 1e-6); // 30 shares × $5

    assert!(h.store.holding("u1", &up.symbol).await.unwrap().is_none());
    let history = h.store.trade_history("u1").await.unwrap();
    assert_eq!(history.len(), 1);
}

#[tokio::test]
async fn oversized_operations_leave_no_trace() {
    let h = harness();
    let p = profile();
    h.lifecycle
        .buy("u1", &p, "UP", 10.0, 100.0, Utc::now())
        .await
        .unwrap();

    let err = h
        .lifecycle
        .add_up("u1", &p, "UP", 15.0, 105.0, Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidTransition(_)));

    let err = h
        .lifecycle
        .sell("u1", &p, "UP", 10.5, 105.0, Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidTransition(_)));

    let holding = h.store.holding("u1", "UP").await.unwrap().unwrap();
    assert!((holding.total_shares - 10.0).abs() < 1e-9);
    assert!(!holding.is_added_up);
    assert_eq!(h.store.transactions(&holding.id).await.unwrap().len(), 1);
    assert!(h.store.trade_history("u1").await.unwrap().is_empty());
}
