//! Market data module for US equities.
//!
//! Provides daily price history and live quotes from multiple providers
//! with automatic failover.
//!
//! # Data Sources
//! - **Finnhub** (primary for quotes): authenticated REST API, low
//!   per-minute ceiling on the free tier
//! - **Yahoo** (primary for history): keyless chart API, strict about
//!   symbol validity, subject to unannounced format changes

mod provider;
mod rate_limiter;
mod router;
pub mod finnhub;
pub mod universe;
pub mod yahoo;

pub use provider::{PriceProvider, ProviderError};
pub use rate_limiter::{shared_limiter, RateLimiter, SharedRateLimiter};
pub use router::{PriceRouter, RouterConfig};
pub use universe::{FileUniverse, StaticUniverse, UniverseSource};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Core Data Types
// ============================================================================

/// A single daily OHLCV bar.
///
/// Bars for a symbol form an ascending-by-date sequence with no duplicate
/// dates, and are immutable once fetched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceBar {
    /// Symbol/ticker
    pub symbol: String,
    /// Trading day
    pub date: NaiveDate,
    /// Open price
    pub open: f64,
    /// High price
    pub high: f64,
    /// Low price
    pub low: f64,
    /// Close price
    pub close: f64,
    /// Volume
    pub volume: f64,
}

impl PriceBar {
    /// Full range (high - low) of the bar.
    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    /// Basic OHLC sanity check: high bounds the other prices from above,
    /// low from below, and prices are positive.
    pub fn is_sane(&self) -> bool {
        self.high >= self.low
            && self.high >= self.open
            && self.high >= self.close
            && self.low <= self.open
            && self.low <= self.close
            && self.open > 0.0
            && self.close > 0.0
    }
}

/// Real-time quote data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quote {
    /// Symbol/ticker
    pub symbol: String,
    /// Last trade price
    pub price: f64,
    /// Change from previous close
    pub change: f64,
    /// Change percentage from previous close
    pub change_percent: f64,
    /// Previous session close
    pub prev_close: f64,
    /// Timestamp the quote was observed
    pub timestamp: DateTime<Utc>,
}

/// Sort bars ascending by date and drop exact-date duplicates, keeping the
/// first occurrence. Providers occasionally return the live session twice.
pub fn normalize_bars(mut bars: Vec<PriceBar>) -> Vec<PriceBar> {
    bars.sort_by_key(|b| b.date);
    bars.dedup_by_key(|b| b.date);
    bars
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(date: NaiveDate, close: f64) -> PriceBar {
        PriceBar {
            symbol: "AAPL".into(),
            date,
            open: close - 1.0,
            high: close + 1.0,
            low: close - 2.0,
            close,
            volume: 1000.0,
        }
    }

    #[test]
    fn test_bar_sanity() {
        let d = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        assert!(bar(d, 100.0).is_sane());

        let mut bad = bar(d, 100.0);
        bad.high = bad.low - 1.0;
        assert!(!bad.is_sane());
    }

    #[test]
    fn test_normalize_bars_sorts_and_dedups() {
        let d1 = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let d2 = NaiveDate::from_ymd_opt(2024, 1, 3).unwrap();
        let bars = normalize_bars(vec![bar(d2, 101.0), bar(d1, 100.0), bar(d2, 999.0)]);

        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].date, d1);
        assert_eq!(bars[1].date, d2);
        assert!((bars[1].close - 101.0).abs() < f64::EPSILON);
    }
}
