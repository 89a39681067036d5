//! Finnhub API adapter for US equity market data.
//!
//! # API Documentation
//! <https://finnhub.io/docs/api>
//!
//! # Features
//! - Real-time quotes (`/quote`)
//! - Daily candles (`/stock/candle`)
//! - Free tier: 60 requests/minute
//!
//! # Rate Limits
//! - Proactive token-bucket throttling to stay under the quota
//! - Preferred source for live quotes; the keyless fallback serves history

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::provider::{PriceProvider, ProviderError};
use super::rate_limiter::{shared_limiter, SharedRateLimiter};
use super::{normalize_bars, PriceBar, Quote};

// ============================================================================
// Constants
// ============================================================================

/// Finnhub API base URL
const FINNHUB_API_BASE: &str = "https://finnhub.io/api/v1";

/// Daily candle endpoint
const CANDLE_ENDPOINT: &str = "/stock/candle";

/// Quote endpoint
const QUOTE_ENDPOINT: &str = "/quote";

/// Default rate limit: free tier allows 60 requests/minute
const DEFAULT_RATE_LIMIT_RPM: u32 = 55;

/// Retry delay after a rate limit error (seconds)
const RATE_LIMIT_RETRY_SECS: u64 = 2;

// ============================================================================
// Response Types
// ============================================================================

/// Candle response: column-oriented arrays plus a status flag.
/// `s` is "ok" when data exists and "no_data" otherwise.
#[derive(Debug, Deserialize)]
struct CandleResponse {
    s: String,
    #[serde(default)]
    t: Vec<i64>,
    #[serde(default)]
    o: Vec<f64>,
    #[serde(default)]
    h: Vec<f64>,
    #[serde(default)]
    l: Vec<f64>,
    #[serde(default)]
    c: Vec<f64>,
    #[serde(default)]
    v: Vec<f64>,
}

/// Quote response. `c` is 0 with `t` = 0 for unknown symbols.
#[derive(Debug, Deserialize)]
struct QuoteResponse {
    c: f64,
    #[serde(default)]
    d: Option<f64>,
    #[serde(default)]
    dp: Option<f64>,
    #[serde(default)]
    pc: f64,
    #[serde(default)]
    t: i64,
}

// ============================================================================
// Finnhub Adapter
// ============================================================================

/// Finnhub adapter for quotes and daily candles.
///
/// Requires an API key. Rate limiting is applied proactively before every
/// request to avoid burning the free-tier quota on 429 responses.
pub struct FinnhubProvider {
    /// API key (token)
    api_key: String,
    /// HTTP client
    client: reqwest::Client,
    /// Rate limiter for proactive throttling
    rate_limiter: SharedRateLimiter,
}

impl FinnhubProvider {
    /// Create a new Finnhub adapter with an API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_rate_limit(api_key, DEFAULT_RATE_LIMIT_RPM, Duration::from_secs(30))
    }

    /// Create with a custom rate limit and request timeout.
    pub fn with_rate_limit(
        api_key: impl Into<String>,
        rate_limit_rpm: u32,
        timeout: Duration,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            api_key: api_key.into(),
            client,
            rate_limiter: shared_limiter("finnhub", rate_limit_rpm),
        }
    }

    /// Execute a GET request against a Finnhub endpoint and decode JSON.
    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        symbol: &str,
    ) -> Result<T, ProviderError> {
        self.rate_limiter.acquire().await;

        debug!(url = %url, symbol = symbol, "Fetching from Finnhub");

        let response = self
            .client
            .get(url)
            .header("accept", "application/json")
            .header("X-Finnhub-Token", &self.api_key)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Network("Request timeout".into())
                } else if e.is_connect() {
                    ProviderError::Network("Connection failed".into())
                } else {
                    ProviderError::Network(e.to_string())
                }
            })?;

        let status = response.status();

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(ProviderError::Auth("Invalid API token".into()));
        }

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ProviderError::RateLimited {
                retry_after_secs: Some(RATE_LIMIT_RETRY_SECS),
            });
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Internal(format!("HTTP {}: {}", status, body)));
        }

        response
            .json()
            .await
            .map_err(|e| ProviderError::Internal(format!("Failed to parse response: {}", e)))
    }

    /// Convert the column-oriented candle payload into bars.
    fn parse_candles(symbol: &str, resp: CandleResponse) -> Result<Vec<PriceBar>, ProviderError> {
        if resp.s == "no_data" {
            return Err(ProviderError::DataNotAvailable(format!(
                "No candle data for {}",
                symbol
            )));
        }
        if resp.s != "ok" {
            return Err(ProviderError::Internal(format!(
                "Unexpected candle status: {}",
                resp.s
            )));
        }

        let n = resp.t.len();
        if resp.o.len() != n || resp.h.len() != n || resp.l.len() != n || resp.c.len() != n {
            return Err(ProviderError::Internal(
                "Candle column lengths do not match".into(),
            ));
        }

        let mut bars = Vec::with_capacity(n);
        for i in 0..n {
            let date = chrono::DateTime::from_timestamp(resp.t[i], 0)
                .map(|dt| dt.naive_utc().date())
                .ok_or_else(|| {
                    ProviderError::Internal(format!("Invalid timestamp: {}", resp.t[i]))
                })?;

            bars.push(PriceBar {
                symbol: symbol.to_string(),
                date,
                open: resp.o[i],
                high: resp.h[i],
                low: resp.l[i],
                close: resp.c[i],
                volume: resp.v.get(i).copied().unwrap_or(0.0),
            });
        }

        Ok(normalize_bars(bars))
    }
}

// ============================================================================
// PriceProvider Implementation
// ============================================================================

#[async_trait]
impl PriceProvider for FinnhubProvider {
    fn name(&self) -> &'static str {
        "finnhub"
    }

    fn history_priority(&self) -> u8 {
        2
    }

    fn quote_priority(&self) -> u8 {
        1
    }

    async fn daily_bars(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceBar>, ProviderError> {
        if start > end {
            return Err(ProviderError::InvalidRequest(format!(
                "start {} after end {}",
                start, end
            )));
        }

        let from = start.and_hms_opt(0, 0, 0).unwrap().and_utc().timestamp();
        let to = end.and_hms_opt(23, 59, 59).unwrap().and_utc().timestamp();
        let url = format!(
            "{}{}?symbol={}&resolution=D&from={}&to={}",
            FINNHUB_API_BASE, CANDLE_ENDPOINT, symbol, from, to
        );

        let resp: CandleResponse = self.get_json(&url, symbol).await?;
        Self::parse_candles(symbol, resp)
    }

    async fn quote(&self, symbol: &str) -> Result<Quote, ProviderError> {
        let url = format!("{}{}?symbol={}", FINNHUB_API_BASE, QUOTE_ENDPOINT, symbol);
        let resp: QuoteResponse = self.get_json(&url, symbol).await?;

        // Finnhub answers unknown symbols with an all-zero quote
        if resp.c <= 0.0 && resp.t == 0 {
            return Err(ProviderError::SymbolNotFound(symbol.to_string()));
        }

        Ok(Quote {
            symbol: symbol.to_uppercase(),
            price: resp.c,
            change: resp.d.unwrap_or(resp.c - resp.pc),
            change_percent: resp.dp.unwrap_or(0.0),
            prev_close: resp.pc,
            timestamp: Utc::now(),
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
