//! Turtle Engine Library
//!
//! Daily breakout-signal and position-sizing engine for US equities: the
//! algorithmic core of the Turtle stock platform. Account management,
//! HTTP routing, and scheduling live elsewhere; this crate computes.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                        turtle-engine                           │
//! ├────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐   ┌───────────────┐   ┌──────────────────┐   │
//! │  │ Price Router │──▶│  Indicators   │──▶│ Daily Analysis   │   │
//! │  │ finnhub/yahoo│   │  + Signal     │   │ (one run / day)  │   │
//! │  └──────────────┘   └───────────────┘   └──────────────────┘   │
//! │         │                                        │             │
//! │         ▼                                        ▼             │
//! │  ┌──────────────┐   ┌───────────────┐   ┌──────────────────┐   │
//! │  │ Risk Budget  │◀──│   Lifecycle   │──▶│  SQLite Store    │   │
//! │  │ equal split  │   │ buy/add/sell  │   │ signals+holdings │   │
//! │  └──────────────┘   └───────────────┘   └──────────────────┘   │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Key Concepts
//!
//! ## Breakout rule
//! A symbol triggers only when all four hold: new 20-day closing high,
//! close above the 50-day average, 50-day above 200-day, and close
//! within 3% of the 52-week high.
//!
//! ## Shared risk pool
//! `capital × risk_tolerance%` is split equally across the user's
//! never-pyramided holdings; stops sit two volatility units under entry.
//! Pyramided ("added-up") holdings leave the pool for good and trail 5%
//! under the market instead.

#![warn(clippy::all)]

pub mod analysis;
pub mod data;
pub mod error;
pub mod indicators;
pub mod portfolio;
pub mod risk;
pub mod signal;
pub mod storage;

use std::sync::Arc;
use std::time::Duration;

use turtle_common::config::Config;

use crate::analysis::{DailyAnalysisJob, JobConfig};
use crate::data::{
    finnhub::FinnhubProvider, yahoo::YahooProvider, FileUniverse, PriceProvider, PriceRouter,
    RouterConfig, StaticUniverse, UniverseSource,
};
use crate::portfolio::LifecycleManager;
use crate::storage::SqliteStore;

/// Fully wired engine: router, store, daily job, and lifecycle manager.
pub struct EngineState {
    /// Configuration
    pub config: Config,
    /// Multi-source price access
    pub prices: Arc<PriceRouter>,
    /// Persistence for signals and holdings
    pub store: Arc<SqliteStore>,
    /// The once-per-day analysis job
    pub analysis: Arc<DailyAnalysisJob>,
    /// Holding transitions and risk rebalancing
    pub lifecycle: Arc<LifecycleManager>,
}

impl EngineState {
    /// Wire the engine from configuration.
    pub fn new(config: Config) -> crate::error::Result<Self> {
        let timeout = Duration::from_secs(config.data.request_timeout_secs);

        let mut providers: Vec<Arc<dyn PriceProvider>> = vec![Arc::new(
            YahooProvider::with_rate_limit(config.data.yahoo_rate_limit_rpm, timeout),
        )];
        if let Some(key) = &config.data.finnhub_api_key {
            providers.push(Arc::new(FinnhubProvider::with_rate_limit(
                key.clone(),
                config.data.finnhub_rate_limit_rpm,
                timeout,
            )));
        } else {
            tracing::warn!("No Finnhub API key configured; quotes fall back to Yahoo");
        }

        let prices = Arc::new(PriceRouter::with_config(
            providers,
            RouterConfig {
                max_retries: config.data.max_retries,
                retry_base_delay: Duration::from_millis(config.data.retry_base_delay_ms),
            },
        ));

        let store = Arc::new(SqliteStore::open(&config.database.path)?);

        let universe: Arc<dyn UniverseSource> = match &config.analysis.universe_file {
            Some(path) => Arc::new(FileUniverse::new(
                path.clone(),
                config.analysis.universe_refresh_days,
            )),
            None => Arc::new(StaticUniverse::builtin()),
        };

        let analysis = Arc::new(DailyAnalysisJob::new(
            Arc::clone(&prices),
            universe,
            store.clone(),
            JobConfig {
                required_days: config.analysis.required_days,
                min_required_days: config.analysis.min_required_days,
            },
        ));

        let lifecycle = Arc::new(LifecycleManager::new(store.clone(), Arc::clone(&prices)));

        Ok(Self {
            config,
            prices,
            store,
            analysis,
            lifecycle,
        })
    }
}
