//! Breakout signal rule and the persisted daily signal record.
//!
//! The rule is a Darvas/turtle-style breakout filter: buy only symbols
//! making a new short-term high while both trend-strength and
//! trend-direction conditions hold. All four conditions are AND-ed, which
//! keeps the filter deliberately conservative.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::indicators::IndicatorSnapshot;

/// Fraction of the 52-week high the close must reach.
pub const HIGH_52W_PROXIMITY: f64 = 0.97;

// ============================================================================
// Signal Record
// ============================================================================

/// One market-wide analysis row per (symbol, date).
///
/// Created once per trading day by the daily analysis job and immutable
/// afterwards; the job checks for existing rows before computing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    /// Symbol/ticker
    pub symbol: String,
    /// Trading day the analysis covers
    pub date: NaiveDate,
    /// Close price on `date`
    pub close: f64,
    /// Highest close of the last 20 bars
    pub high_20d: Option<f64>,
    /// Mean close of the last 50 bars
    pub sma_50d: Option<f64>,
    /// Mean close of the last 200 bars
    pub sma_200d: Option<f64>,
    /// Highest close of the last 252 bars
    pub high_52w: Option<f64>,
    /// 14-day average true range
    pub atr: Option<f64>,
    /// Whether all four breakout conditions held
    pub signal_triggered: bool,
}

impl Signal {
    /// Build the daily record for one symbol from its close and
    /// indicator snapshot, evaluating the breakout rule.
    pub fn from_snapshot(
        symbol: impl Into<String>,
        date: NaiveDate,
        close: f64,
        snapshot: &IndicatorSnapshot,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            date,
            close,
            high_20d: snapshot.high_20d,
            sma_50d: snapshot.sma_50d,
            sma_200d: snapshot.sma_200d,
            high_52w: snapshot.high_52w,
            atr: snapshot.atr_14d,
            signal_triggered: evaluate(close, snapshot),
        }
    }
}

// ============================================================================
// Breakout Rule
// ============================================================================

/// Evaluate the breakout rule for one close/snapshot pair.
///
/// All four must hold; an unavailable indicator makes its condition
/// false, not an error:
/// 1. `close >= high_20d` — new 20-day high or tie
/// 2. `close > sma_50d` — above the medium-term trend
/// 3. `sma_50d > sma_200d` — medium trend above long trend
/// 4. `close >= 0.97 * high_52w` — within 3% of the 52-week high
pub fn evaluate(close: f64, snapshot: &IndicatorSnapshot) -> bool {
    let new_high = snapshot.high_20d.is_some_and(|h| close >= h);
    let above_trend = snapshot.sma_50d.is_some_and(|s| close > s);
    let trend_aligned = match (snapshot.sma_50d, snapshot.sma_200d) {
        (Some(short), Some(long)) => short > long,
        _ => false,
    };
    let near_52w_high = snapshot
        .high_52w
        .is_some_and(|h| close >= HIGH_52W_PROXIMITY * h);

    new_high && above_trend && trend_aligned && near_52w_high
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> IndicatorSnapshot {
        IndicatorSnapshot {
            high_20d: Some(100.0),
            sma_50d: Some(95.0),
            sma_200d: Some(90.0),
            high_52w: Some(102.0),
            atr_14d: Some(2.0),
        }
    }

    #[test]
    fn test_all_conditions_met() {
        // 100 >= 100, 100 > 95, 95 > 90, 100 >= 0.97 * 102 = 98.94
        assert!(evaluate(100.0, &snapshot()));
    }

    #[test]
    fn test_each_condition_flips_result() {
        let mut s = snapshot();
        s.high_20d = Some(100.5); // close below the 20-day high
        assert!(!evaluate(100.0, &s));

        let mut s = snapshot();
        s.sma_50d = Some(100.0); // close not above trend (tie fails: strict >)
        assert!(!evaluate(100.0, &s));

        let mut s = snapshot();
        s.sma_50d = Some(89.0); // trend misaligned: 89 < 90
        assert!(!evaluate(100.0, &s));

        let mut s = snapshot();
        s.high_52w = Some(110.0); // 100 < 0.97 * 110 = 106.7
        assert!(!evaluate(100.0, &s));
    }

    #[test]
    fn test_missing_indicator_is_false_not_error() {
        let mut s = snapshot();
        s.high_52w = None;
        assert!(!evaluate(100.0, &s));

        let empty = IndicatorSnapshot {
            high_20d: None,
            sma_50d: None,
            sma_200d: None,
            high_52w: None,
            atr_14d: None,
        };
        assert!(!evaluate(100.0, &empty));
    }

    #[test]
    fn test_record_embeds_snapshot_and_verdict() {
        let date = NaiveDate::from_ymd_opt(2024, 6, 3).unwrap();
        let signal = Signal::from_snapshot("AAPL", date, 100.0, &snapshot());
        assert!(signal.signal_triggered);
        assert_eq!(signal.high_20d, Some(100.0));
        assert_eq!(signal.atr, Some(2.0));

        let mut weak = snapshot();
        weak.sma_50d = Some(89.0);
        let signal = Signal::from_snapshot("AAPL", date, 100.0, &weak);
        assert!(!signal.signal_triggered);
    }
}
