//! Portfolio risk budgeting and position sizing.
//!
//! A user's dollar risk budget (`capital × risk_tolerance%`) is split
//! equally across the holdings still governed by the shared pool — the
//! ones never pyramided. Equal split is intentional; volatility-weighted
//! allocation is out of scope. From the per-symbol budget and a
//! volatility estimate the allocator derives a stop-loss price and a
//! recommended share count.
//!
//! Volatility comes from an ordered fallback chain, and every result
//! carries a provenance tag so callers can tell a precise estimate from a
//! heuristic guess.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::data::PriceBar;
use crate::error::{EngineError, Result};
use crate::indicators::{atr, ATR_WINDOW};

/// Stop distance in ATR multiples.
pub const ATR_STOP_MULTIPLIER: f64 = 2.0;

/// Trailing stop below market for pyramided holdings.
pub const ADD_UP_TRAIL_FRACTION: f64 = 0.05;

/// Scale applied to the mean day-over-day change approximation.
const DAILY_CHANGE_SCALE: f64 = 1.5;

/// Minimum day-over-day changes for the approximation tier.
const DAILY_CHANGE_MIN_DAYS: usize = 3;

// ============================================================================
// Risk Profile
// ============================================================================

/// A user's risk settings, provided by the account layer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RiskProfile {
    /// Total capital in dollars
    pub capital: f64,
    /// Percent of capital the user is willing to lose across the pool
    pub risk_tolerance_percent: f64,
}

impl RiskProfile {
    /// Reject missing or non-positive settings. Sizing never assumes a
    /// default in their place.
    pub fn validate(&self) -> Result<()> {
        if !self.capital.is_finite() || self.capital <= 0.0 {
            return Err(EngineError::InsufficientRiskProfile(format!(
                "capital must be positive, got {}",
                self.capital
            )));
        }
        if !self.risk_tolerance_percent.is_finite()
            || self.risk_tolerance_percent <= 0.0
            || self.risk_tolerance_percent > 100.0
        {
            return Err(EngineError::InsufficientRiskProfile(format!(
                "risk tolerance must be in (0, 100], got {}",
                self.risk_tolerance_percent
            )));
        }
        Ok(())
    }

    /// Dollar risk across the whole shared pool.
    pub fn total_risk_amount(&self) -> f64 {
        self.capital * self.risk_tolerance_percent / 100.0
    }
}

// ============================================================================
// Volatility Estimation
// ============================================================================

/// Which tier of the fallback chain produced a volatility value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VolatilitySource {
    /// 14-day average true range from full OHLC history
    Atr14,
    /// Mean absolute day-over-day close change, scaled by 1.5
    DailyChange,
    /// Percent-of-price heuristic by price tier
    PriceTier,
}

/// A volatility value plus where it came from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VolatilityEstimate {
    pub value: f64,
    pub source: VolatilitySource,
}

/// Estimate daily volatility for a symbol, in dollars per share.
///
/// Ordered fallback chain:
/// 1. 14-day ATR when at least 15 bars exist
/// 2. mean |day-over-day close change| over the last available days
///    (at least 3 changes), scaled by 1.5
/// 3. price-tier heuristic: 2.5% of price above $100, 3% for $50–100,
///    4% below $50
///
/// No obtainable entry price is a hard error — there is nothing left to
/// anchor even the heuristic tier.
pub fn estimate_volatility(bars: &[PriceBar], entry_price: f64) -> Result<VolatilityEstimate> {
    if !entry_price.is_finite() || entry_price <= 0.0 {
        return Err(EngineError::VolatilityUnavailable(
            "no entry price obtainable".into(),
        ));
    }

    if let Some(value) = atr(bars, ATR_WINDOW) {
        return Ok(VolatilityEstimate {
            value,
            source: VolatilitySource::Atr14,
        });
    }

    let changes: Vec<f64> = bars
        .windows(2)
        .map(|pair| (pair[1].close - pair[0].close).abs())
        .collect();
    if changes.len() >= DAILY_CHANGE_MIN_DAYS {
        let mean = changes.iter().sum::<f64>() / changes.len() as f64;
        return Ok(VolatilityEstimate {
            value: mean * DAILY_CHANGE_SCALE,
            source: VolatilitySource::DailyChange,
        });
    }

    let fraction = if entry_price > 100.0 {
        0.025
    } else if entry_price >= 50.0 {
        0.03
    } else {
        0.04
    };

    Ok(VolatilityEstimate {
        value: entry_price * fraction,
        source: VolatilitySource::PriceTier,
    })
}

// ============================================================================
// Risk Budget
// ============================================================================

/// Ephemeral per-symbol dollar risk split. Computed on demand, never
/// persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskBudget {
    /// `capital × risk_tolerance%`
    pub total_risk_amount: f64,
    /// Equal share per eligible symbol (0 when the pool is empty)
    pub risk_per_symbol: f64,
    /// symbol → dollar risk over exactly the eligible set
    pub allocations: BTreeMap<String, f64>,
}

impl RiskBudget {
    /// Whether the pool has anyone to allocate to.
    pub fn is_empty(&self) -> bool {
        self.allocations.is_empty()
    }
}

/// Split the user's risk budget equally across the eligible pool.
///
/// `eligible` is the set of the user's not-added-up holdings; `candidate`
/// extends the pool by one when previewing a symbol not yet held. An
/// empty pool yields an empty allocation — the caller must treat that as
/// "cannot size a position", not as zero risk.
pub fn risk_budget(
    profile: &RiskProfile,
    eligible: &[String],
    candidate: Option<&str>,
) -> Result<RiskBudget> {
    profile.validate()?;

    let mut symbols: Vec<String> = eligible.to_vec();
    if let Some(candidate) = candidate {
        let candidate = candidate.to_uppercase();
        if !symbols.iter().any(|s| s == &candidate) {
            symbols.push(candidate);
        }
    }

    let total_risk_amount = profile.total_risk_amount();

    if symbols.is_empty() {
        return Ok(RiskBudget {
            total_risk_amount,
            risk_per_symbol: 0.0,
            allocations: BTreeMap::new(),
        });
    }

    let risk_per_symbol = total_risk_amount / symbols.len() as f64;
    let allocations = symbols
        .into_iter()
        .map(|s| (s, risk_per_symbol))
        .collect();

    Ok(RiskBudget {
        total_risk_amount,
        risk_per_symbol,
        allocations,
    })
}

// ============================================================================
// Position Sizing
// ============================================================================

/// Sizing recommendation for one symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionSizing {
    /// Entry price the sizing is anchored to
    pub entry_price: f64,
    /// Dollar gap between entry and stop (2 × volatility)
    pub stop_loss_distance: f64,
    /// Stop-loss price per share
    pub stop_loss_price: f64,
    /// Shares such that hitting the stop loses the per-symbol budget,
    /// capped by available capital
    pub recommended_shares: f64,
    /// Per-symbol dollar risk the sizing was derived from
    pub risk_amount: f64,
    /// Volatility estimate and its provenance
    pub volatility: VolatilityEstimate,
}

/// Derive stop-loss and share count from a per-symbol risk budget.
pub fn size_position(
    profile: &RiskProfile,
    risk_per_symbol: f64,
    entry_price: f64,
    bars: &[PriceBar],
) -> Result<PositionSizing> {
    profile.validate()?;

    let volatility = estimate_volatility(bars, entry_price)?;
    let stop_loss_distance = ATR_STOP_MULTIPLIER * volatility.value;
    let stop_loss_price = entry_price - stop_loss_distance;

    let uncapped = if stop_loss_distance > 0.0 {
        risk_per_symbol / stop_loss_distance
    } else {
        0.0
    };
    let max_affordable = profile.capital / entry_price;
    let recommended_shares = uncapped.min(max_affordable);

    Ok(PositionSizing {
        entry_price,
        stop_loss_distance,
        stop_loss_price,
        recommended_shares,
        risk_amount: risk_per_symbol,
        volatility,
    })
}

/// Stop-loss price for an existing pool holding: entry minus two
/// volatility units.
pub fn pool_stop_loss(entry_price: f64, bars: &[PriceBar]) -> Result<f64> {
    let volatility = estimate_volatility(bars, entry_price)?;
    Ok(entry_price - ATR_STOP_MULTIPLIER * volatility.value)
}

/// Trailing stop for a holding leaving the pool via add-up: a fixed
/// fraction below the market price at the moment of the add-up.
pub fn add_up_stop_loss(market_price: f64) -> f64 {
    market_price * (1.0 - ADD_UP_TRAIL_FRACTION)
}

// ============================================================================
// Tests
// ============================================================================
