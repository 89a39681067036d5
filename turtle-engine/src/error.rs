//! Error types for the Turtle engine.
//!
//! Propagation policy:
//! - per-symbol errors during the daily sweep are contained and logged,
//!   never escalated to abort the sweep
//! - per-holding errors during buy/sell/add-up are returned synchronously
//!   and the operation leaves no partial state behind
//! - duplicate daily runs are absorbed, not errors

use thiserror::Error;

use crate::data::ProviderError;

/// Result type alias using the engine error type.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Unified error type for engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Price history missing, insufficient, or symbol invalid. The symbol
    /// is skipped for the current run.
    #[error("Data unavailable for {symbol}: {reason}")]
    DataUnavailable { symbol: String, reason: String },

    /// Provider throttling outlasted the bounded retry budget.
    #[error("Rate limited while fetching {symbol}")]
    RateLimited { symbol: String },

    /// Missing or non-positive capital / risk tolerance. Position sizing
    /// refuses to proceed; callers surface "configure risk settings
    /// first" instead of assuming defaults.
    #[error("Risk profile incomplete: {0}")]
    InsufficientRiskProfile(String),

    /// A lifecycle precondition failed (sell exceeds held shares, add-up
    /// layer not smaller than the base). Nothing was mutated.
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    /// ATR and every fallback failed — no entry price is obtainable.
    #[error("Volatility unavailable: {0}")]
    VolatilityUnavailable(String),

    /// The symbol universe could not be loaded; the sweep has nothing to
    /// iterate and aborts.
    #[error("Universe error: {0}")]
    Universe(String),

    /// Persistence failure.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Provider error that is not better classified above.
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

impl EngineError {
    /// Classify a provider failure for one symbol into the sweep
    /// taxonomy: throttling keeps its identity (retryable next run),
    /// everything else collapses into "no data today".
    pub fn from_provider(symbol: &str, err: ProviderError) -> Self {
        match err {
            ProviderError::RateLimited { .. } => Self::RateLimited {
                symbol: symbol.to_string(),
            },
            other => Self::DataUnavailable {
                symbol: symbol.to_string(),
                reason: other.to_string(),
            },
        }
    }
}

impl From<rusqlite::Error> for EngineError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Storage(err.to_string())
    }
}
