//! Symbol universe sources.
//!
//! The daily analysis sweeps a universe of tickers (S&P 500 + Nasdaq-100
//! in the default deployment). The scraper that refreshes the list is an
//! external job; the engine only consumes its output — either a built-in
//! static list or a cached JSON file that may be up to ~30 days stale.
//! Symbols that later prove invalid (delisted, no data) are skipped by
//! the sweep, not rejected here.

use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::path::PathBuf;
use tracing::warn;

use crate::error::{EngineError, Result};

/// Source of the active ticker universe.
pub trait UniverseSource: Send + Sync {
    /// Deduplicated, uppercase ticker symbols.
    fn symbols(&self) -> Result<Vec<String>>;
}

/// Uppercase, deduplicate, and sort a raw ticker list.
fn canonicalize(raw: impl IntoIterator<Item = String>) -> Vec<String> {
    let set: BTreeSet<String> = raw
        .into_iter()
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .collect();
    set.into_iter().collect()
}

// ============================================================================
// Static Universe
// ============================================================================

/// Fixed in-memory universe, used as the default when no cached ticker
/// file is configured, and by tests.
pub struct StaticUniverse {
    symbols: Vec<String>,
}

impl StaticUniverse {
    /// Create from an explicit ticker list.
    pub fn new(symbols: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            symbols: canonicalize(symbols.into_iter().map(Into::into)),
        }
    }

    /// A small built-in large-cap list for deployments without a cached
    /// universe file.
    pub fn builtin() -> Self {
        Self::new([
            "AAPL", "MSFT", "GOOGL", "AMZN", "NVDA", "META", "TSLA", "NFLX", "ADBE", "AVGO",
            "COST", "JPM", "V", "MA", "UNH", "HD", "PG", "KO", "PEP", "AMD", "INTC", "QCOM",
            "TXN", "CRM", "ORCL", "CSCO", "ABBV", "LLY", "TMO", "ABT",
        ])
    }
}

impl UniverseSource for StaticUniverse {
    fn symbols(&self) -> Result<Vec<String>> {
        Ok(self.symbols.clone())
    }
}

// ============================================================================
// File Universe
// ============================================================================

/// Universe backed by a cached JSON file (a single array of tickers)
/// written by the external scraper job.
pub struct FileUniverse {
    path: PathBuf,
    /// Age beyond which the cache is flagged as stale (days)
    refresh_days: i64,
}

impl FileUniverse {
    pub fn new(path: PathBuf, refresh_days: i64) -> Self {
        Self { path, refresh_days }
    }

    fn file_age_days(&self) -> Option<i64> {
        let modified = std::fs::metadata(&self.path).ok()?.modified().ok()?;
        let modified: DateTime<Utc> = modified.into();
        Some((Utc::now() - modified).num_days())
    }
}

impl UniverseSource for FileUniverse {
    fn symbols(&self) -> Result<Vec<String>> {
        let content = std::fs::read_to_string(&self.path).map_err(|e| {
            EngineError::Universe(format!(
                "Failed to read universe file {}: {}",
                self.path.display(),
                e
            ))
        })?;
        let raw: Vec<String> = serde_json::from_str(&content).map_err(|e| {
            EngineError::Universe(format!(
                "Failed to parse universe file {}: {}",
                self.path.display(),
                e
            ))
        })?;

        // A stale cache is still usable; the scraper owns refreshing it
        if let Some(age) = self.file_age_days() {
            if age > self.refresh_days {
                warn!(
                    path = %self.path.display(),
                    age_days = age,
                    "Universe cache is stale"
                );
            }
        }

        Ok(canonicalize(raw))
    }
}

// ============================================================================
// Tests
// ============================================================================
