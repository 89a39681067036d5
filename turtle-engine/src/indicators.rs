//! Technical indicators over daily price series.
//!
//! All indicators are computed from the tail of an ascending-by-date bar
//! sequence. A window that is not fully covered yields `None` — zero is a
//! legitimate price-derived value and must never stand in for "not enough
//! history".

use serde::{Deserialize, Serialize};

use crate::data::PriceBar;

/// Bars in the 20-day breakout window.
pub const HIGH_20D_WINDOW: usize = 20;

/// Bars in the medium-term trend average.
pub const SMA_50D_WINDOW: usize = 50;

/// Bars in the long-term trend average.
pub const SMA_200D_WINDOW: usize = 200;

/// Trading days in a 52-week window.
pub const HIGH_52W_WINDOW: usize = 252;

/// True-range values averaged for the ATR.
pub const ATR_WINDOW: usize = 14;

// ============================================================================
// Indicator Snapshot
// ============================================================================

/// Point-in-time indicator values for one symbol.
///
/// Derived transiently from a price series; not persisted on its own but
/// embedded in the daily signal record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    /// Highest close of the last 20 bars
    pub high_20d: Option<f64>,
    /// Mean close of the last 50 bars
    pub sma_50d: Option<f64>,
    /// Mean close of the last 200 bars
    pub sma_200d: Option<f64>,
    /// Highest close of the last 252 bars
    pub high_52w: Option<f64>,
    /// Mean of the last 14 true-range values
    pub atr_14d: Option<f64>,
}

impl IndicatorSnapshot {
    /// Compute every indicator from a bar sequence (ascending by date).
    pub fn compute(bars: &[PriceBar]) -> Self {
        Self {
            high_20d: rolling_high(bars, HIGH_20D_WINDOW),
            sma_50d: sma(bars, SMA_50D_WINDOW),
            sma_200d: sma(bars, SMA_200D_WINDOW),
            high_52w: rolling_high(bars, HIGH_52W_WINDOW),
            atr_14d: atr(bars, ATR_WINDOW),
        }
    }
}

// ============================================================================
// Window Functions
// ============================================================================

/// Highest close over the trailing `window` bars; `None` below the count.
pub fn rolling_high(bars: &[PriceBar], window: usize) -> Option<f64> {
    if window == 0 || bars.len() < window {
        return None;
    }
    bars[bars.len() - window..]
        .iter()
        .map(|b| b.close)
        .fold(None, |acc: Option<f64>, c| {
            Some(acc.map_or(c, |a| a.max(c)))
        })
}

/// Arithmetic mean of close over the trailing `window` bars; `None` below
/// the count.
pub fn sma(bars: &[PriceBar], window: usize) -> Option<f64> {
    if window == 0 || bars.len() < window {
        return None;
    }
    let sum: f64 = bars[bars.len() - window..].iter().map(|b| b.close).sum();
    Some(sum / window as f64)
}

/// True range for bar `i` (i >= 1):
/// `max(high - low, |high - prev_close|, |low - prev_close|)`.
///
/// The first bar has no previous close and produces no true range, so a
/// series of `n` bars yields `n - 1` values.
pub fn true_ranges(bars: &[PriceBar]) -> Vec<f64> {
    bars.windows(2)
        .map(|pair| {
            let prev_close = pair[0].close;
            let bar = &pair[1];
            (bar.high - bar.low)
                .max((bar.high - prev_close).abs())
                .max((bar.low - prev_close).abs())
        })
        .collect()
}

/// Mean of the last `window` true-range values; `None` when fewer than
/// `window` values exist (i.e. fewer than `window + 1` bars).
pub fn atr(bars: &[PriceBar], window: usize) -> Option<f64> {
    if window == 0 {
        return None;
    }
    let tr = true_ranges(bars);
    if tr.len() < window {
        return None;
    }
    let sum: f64 = tr[tr.len() - window..].iter().sum();
    Some(sum / window as f64)
}

// ============================================================================
// Data Sufficiency
// ============================================================================

/// Minimum bars a 252-day series must cover to be analyzed (≈67%).
pub const MIN_REQUIRED_DAYS: usize = 170;

/// Whether a series covers enough of the nominal window to be analyzed.
///
/// Upstream providers leave gaps (holidays, partial listings, late
/// listings); a series with at least `min_days` bars is accepted so an
/// otherwise-valid symbol is not discarded. With the default floor of
/// 170, 169 bars fail and 170 pass.
pub fn has_sufficient_data(bars: &[PriceBar], min_days: usize) -> bool {
    bars.len() >= min_days
}

// ============================================================================
// Tests
// ============================================================================
