//! Data provider abstraction for multi-source market data.
//!
//! Defines the `PriceProvider` trait that all data sources implement,
//! enabling automatic failover between a primary and a fallback source.
//! A response is always served by exactly one provider; results are never
//! merged across sources.

use async_trait::async_trait;
use chrono::NaiveDate;
use std::fmt;

use super::{PriceBar, Quote};

// ============================================================================
// Provider Error
// ============================================================================

/// Errors specific to data providers.
#[derive(Debug, Clone)]
pub enum ProviderError {
    /// Network error (connection failed, timeout)
    Network(String),
    /// Authentication error (invalid token, expired)
    Auth(String),
    /// Rate limit exceeded
    RateLimited { retry_after_secs: Option<u64> },
    /// The symbol is unknown to the provider (delisted, mistyped)
    SymbolNotFound(String),
    /// The symbol exists but no data covers the requested range
    DataNotAvailable(String),
    /// Invalid request parameters
    InvalidRequest(String),
    /// Internal provider error (unexpected payload, HTTP 5xx)
    Internal(String),
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network(msg) => write!(f, "Network error: {}", msg),
            Self::Auth(msg) => write!(f, "Authentication error: {}", msg),
            Self::RateLimited { retry_after_secs } => {
                write!(f, "Rate limited")?;
                if let Some(secs) = retry_after_secs {
                    write!(f, ", retry after {} seconds", secs)?;
                }
                Ok(())
            }
            Self::SymbolNotFound(symbol) => write!(f, "Symbol not found: {}", symbol),
            Self::DataNotAvailable(msg) => write!(f, "Data not available: {}", msg),
            Self::InvalidRequest(msg) => write!(f, "Invalid request: {}", msg),
            Self::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for ProviderError {}

impl ProviderError {
    /// Check if the error is worth retrying against the same provider.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::RateLimited { .. })
    }

    /// Check if this error should trigger a failover to another provider.
    ///
    /// Rate limits are not failover-worthy: the retry/backoff path owns
    /// them. Symbol-level misses fail over, since the fallback provider
    /// may know symbols the primary rejects.
    pub fn should_failover(&self) -> bool {
        matches!(
            self,
            Self::Network(_)
                | Self::Auth(_)
                | Self::Internal(_)
                | Self::SymbolNotFound(_)
                | Self::DataNotAvailable(_)
        )
    }
}

// ============================================================================
// Price Provider Trait
// ============================================================================

/// Trait for market data providers.
///
/// All sources (Finnhub, Yahoo) implement this trait to provide a unified
/// interface for the price router.
#[async_trait]
pub trait PriceProvider: Send + Sync {
    /// Provider name (e.g., "finnhub", "yahoo")
    fn name(&self) -> &'static str;

    /// Provider priority for historical series (lower = tried first)
    fn history_priority(&self) -> u8;

    /// Provider priority for live quotes (lower = tried first)
    fn quote_priority(&self) -> u8;

    /// Fetch daily OHLCV bars for a symbol over a date range (inclusive).
    ///
    /// Returns bars sorted ascending by date. An empty range is reported
    /// as `DataNotAvailable`, an unknown symbol as `SymbolNotFound` —
    /// callers rely on the distinction to decide whether to retry.
    async fn daily_bars(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceBar>, ProviderError>;

    /// Fetch the latest quote for a symbol.
    async fn quote(&self, symbol: &str) -> Result<Quote, ProviderError>;
}

// ============================================================================
// Tests
// ============================================================================
