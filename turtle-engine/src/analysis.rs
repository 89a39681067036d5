//! Daily market analysis job.
//!
//! Runs at most once per trading day: for every symbol in the universe it
//! fetches trailing price history, computes indicators, evaluates the
//! breakout rule, and persists one signal row. The run claim lives in the
//! store (`UNIQUE` on the run date), so idempotency survives process
//! restarts, multiple instances, and a manual trigger racing the
//! scheduled one — the loser simply gets the existing day back.
//!
//! The sweep is a single sequential loop. Pacing against upstream quotas
//! comes from the providers' token buckets and the router's bounded
//! backoff, never from parallel fan-out. One symbol's failure is logged
//! and skipped; it cannot abort the sweep.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc, Weekday};
use std::sync::Arc;
use tracing::{info, warn};

use crate::data::{PriceRouter, UniverseSource};
use crate::error::{EngineError, Result};
use crate::indicators::{has_sufficient_data, IndicatorSnapshot};
use crate::signal::Signal;
use crate::storage::SignalStore;

/// US cash session close, 16:00 New York, expressed in UTC with the
/// fixed standard-time offset. The hour of DST drift does not matter for
/// a freshness marker.
const MARKET_CLOSE_UTC_HOUR: u32 = 21;

// ============================================================================
// Job Configuration
// ============================================================================

/// Tuning for the daily sweep.
#[derive(Debug, Clone)]
pub struct JobConfig {
    /// Nominal trailing window, in trading days.
    pub required_days: usize,
    /// Minimum bars a series must cover to be analyzed.
    pub min_required_days: usize,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            required_days: 252,
            min_required_days: 170,
        }
    }
}

impl JobConfig {
    /// Calendar days to request so the window holds `required_days`
    /// trading days (markets trade roughly 5 of every 7 days).
    fn lookback_calendar_days(&self) -> i64 {
        (self.required_days as i64) * 3 / 2
    }
}

// ============================================================================
// Daily Analysis Job
// ============================================================================

/// Orchestrates provider → indicators → signal rule across the universe.
pub struct DailyAnalysisJob {
    router: Arc<PriceRouter>,
    universe: Arc<dyn UniverseSource>,
    store: Arc<dyn SignalStore>,
    config: JobConfig,
}

impl DailyAnalysisJob {
    pub fn new(
        router: Arc<PriceRouter>,
        universe: Arc<dyn UniverseSource>,
        store: Arc<dyn SignalStore>,
        config: JobConfig,
    ) -> Self {
        Self {
            router,
            universe,
            store,
            config,
        }
    }

    /// Run the analysis for today (UTC calendar date).
    pub async fn run(&self) -> Result<Vec<Signal>> {
        self.run_for_date(Utc::now().date_naive()).await
    }

    /// Run the analysis for an explicit date.
    ///
    /// If the date is already claimed — by an earlier run, a concurrent
    /// trigger, or a crashed sweep — the existing rows are returned and
    /// nothing is recomputed.
    pub async fn run_for_date(&self, date: NaiveDate) -> Result<Vec<Signal>> {
        if !self.store.claim_run(date).await? {
            info!(%date, "Analysis already claimed for this date, serving existing rows");
            return self.store.signals_for_date(date).await;
        }

        let symbols = self.universe.symbols()?;
        info!(%date, universe = symbols.len(), "Starting daily market analysis");

        let start = date - Duration::days(self.config.lookback_calendar_days());
        let mut analyzed = 0usize;
        let mut skipped = 0usize;
        let mut triggered = 0usize;

        for symbol in &symbols {
            match self.analyze_symbol(symbol, start, date).await {
                Ok(signal) => {
                    if signal.signal_triggered {
                        triggered += 1;
                    }
                    self.store.insert_signal(&signal).await?;
                    analyzed += 1;
                }
                Err(err) => {
                    // Contained: a bad symbol never aborts the sweep
                    warn!(symbol = %symbol, error = %err, "Skipping symbol for this run");
                    skipped += 1;
                }
            }
        }

        // Freshness is judged against trading sessions, not wall clocks
        let as_of = prior_market_close(Utc::now());
        self.store.complete_run(date, as_of).await?;

        info!(
            %date,
            analyzed,
            skipped,
            triggered,
            as_of = %as_of,
            "Completed daily market analysis"
        );

        self.store.signals_for_date(date).await
    }

    /// Fetch, gate, and evaluate one symbol.
    async fn analyze_symbol(
        &self,
        symbol: &str,
        start: NaiveDate,
        date: NaiveDate,
    ) -> Result<Signal> {
        let mut bars = self
            .router
            .daily_bars(symbol, start, date)
            .await
            .map_err(|e| EngineError::from_provider(symbol, e))?;

        // Indicators read the tail; cap the series at the nominal window
        if bars.len() > self.config.required_days {
            bars.drain(..bars.len() - self.config.required_days);
        }

        if !has_sufficient_data(&bars, self.config.min_required_days) {
            return Err(EngineError::DataUnavailable {
                symbol: symbol.to_string(),
                reason: format!(
                    "insufficient history: {} of {} required bars",
                    bars.len(),
                    self.config.min_required_days
                ),
            });
        }

        let close = bars.last().map(|b| b.close).ok_or_else(|| {
            EngineError::DataUnavailable {
                symbol: symbol.to_string(),
                reason: "empty series".into(),
            }
        })?;

        let snapshot = IndicatorSnapshot::compute(&bars);
        Ok(Signal::from_snapshot(symbol, date, close, &snapshot))
    }

    /// As-of timestamp of the most recent completed run.
    pub async fn last_run(&self) -> Result<Option<DateTime<Utc>>> {
        self.store.last_completed_run().await
    }
}

// ============================================================================
// Market Clock
// ============================================================================

/// The most recent market close at or before `now`, weekends rolled back
/// to Friday.
pub fn prior_market_close(now: DateTime<Utc>) -> DateTime<Utc> {
    let mut close = now
        .date_naive()
        .and_hms_opt(MARKET_CLOSE_UTC_HOUR, 0, 0)
        .unwrap()
        .and_utc();

    if close > now {
        close -= Duration::days(1);
    }

    while matches!(close.weekday(), Weekday::Sat | Weekday::Sun) {
        close -= Duration::days(1);
    }

    close
}

// ============================================================================
// Tests
// ============================================================================
