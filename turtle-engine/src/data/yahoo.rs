//! Yahoo Finance chart API adapter.
//!
//! # Features
//! - Daily candles via the v8 chart API, no API key required
//! - Long history (decades), preferred source for 52-week analysis windows
//!
//! # Caveats
//! - No official API; the response format can change without notice, so
//!   parsing is strict and every missing field maps to a typed error
//! - Unknown symbols come back as an explicit "Not Found" error object,
//!   which is surfaced as `SymbolNotFound` rather than an empty series

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

/// Yahoo chart API base URL
const YAHOO_API_BASE: &str = "https://query2.finance.yahoo.com/v8/finance/chart";

/// Default rate limit (requests per minute, unofficial)
const DEFAULT_RATE_LIMIT_RPM: u32 = 100;

/// Retry delay after a rate limit error (seconds)
const RATE_LIMIT_RETRY_SECS: u64 = 60;

/// Browser user agent; Yahoo rejects the default reqwest UA
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartResult,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    result: Option<Vec<ChartData>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    meta: ChartMeta,
    timestamp: Option<Vec<i64>>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct ChartMeta {
    #[serde(rename = "regularMarketPrice")]
    regular_market_price: Option<f64>,
    #[serde(rename = "chartPreviousClose")]
    chart_previous_close: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<QuoteColumns>,
}

#[derive(Debug, Deserialize)]
struct QuoteColumns {
    open: Vec<Option<f64>>,
    high: Vec<Option<f64>>,
    low: Vec<Option<f64>>,
    close: Vec<Option<f64>>,
    volume: Vec<Option<f64>>,
}

// ============================================================================
// Yahoo Adapter
// ============================================================================

/// Yahoo Finance adapter for daily candles and delayed quotes.
pub struct YahooProvider {
    /// HTTP client
    client: reqwest::Client,
    /// Rate limiter for proactive throttling
    rate_limiter: SharedRateLimiter,
}

impl YahooProvider {
    /// Create a new Yahoo adapter with default limits.
    pub fn new() -> Self {
        Self::with_rate_limit(DEFAULT_RATE_LIMIT_RPM, Duration::from_secs(30))
    }

    /// Create with a custom rate limit and request timeout.
    pub fn with_rate_limit(rate_limit_rpm: u32, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            rate_limiter: shared_limiter("yahoo", rate_limit_rpm),
        }
    }

    /// Fetch and decode a chart API response for one symbol.
    async fn fetch_chart(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<ChartData, ProviderError> {
        let period1 = start.and_hms_opt(0, 0, 0).unwrap().and_utc().timestamp();
        let period2 = end.and_hms_opt(23, 59, 59).unwrap().and_utc().timestamp();
        let url = format!(
            "{}/{}?period1={}&period2={}&interval=1d",
            YAHOO_API_BASE, symbol, period1, period2
        );

        self.rate_limiter.acquire().await;

        debug!(url = %url, symbol = symbol, "Fetching from Yahoo");

        let response = self.client.get(&url).send().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Network("Request timeout".into())
            } else if e.is_connect() {
                ProviderError::Network("Connection failed".into())
            } else {
                ProviderError::Network(e.to_string())
            }
        })?;

        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ProviderError::RateLimited {
                retry_after_secs: Some(RATE_LIMIT_RETRY_SECS),
            });
        }

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ProviderError::SymbolNotFound(symbol.to_string()));
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Internal(format!("HTTP {}: {}", status, body)));
        }

        let chart: ChartResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Internal(format!("Failed to parse response: {}", e)))?;

        Self::unwrap_result(symbol, chart)
    }

    /// Pull the single chart result out of the response envelope,
    /// converting Yahoo's error object into a typed error.
    fn unwrap_result(symbol: &str, resp: ChartResponse) -> Result<ChartData, ProviderError> {
        match resp.chart.result {
            Some(results) => results.into_iter().next().ok_or_else(|| {
                ProviderError::Internal("Chart result array is empty".into())
            }),
            None => match resp.chart.error {
                Some(err) if err.code == "Not Found" => {
                    Err(ProviderError::SymbolNotFound(symbol.to_string()))
                }
                Some(err) => Err(ProviderError::Internal(format!(
                    "{}: {}",
                    err.code, err.description
                ))),
                None => Err(ProviderError::Internal(
                    "Empty chart result with no error".into(),
                )),
            },
        }
    }

    /// Convert chart columns into bars, dropping non-trading days where
    /// every column is null.
    fn parse_bars(symbol: &str, data: ChartData) -> Result<Vec<PriceBar>, ProviderError> {
        let timestamps = data
            .timestamp
            .ok_or_else(|| ProviderError::DataNotAvailable(format!("No timestamps for {}", symbol)))?;

        let quote = data
            .indicators
            .quote
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::Internal("No quote columns".into()))?;

        let mut bars = Vec::with_capacity(timestamps.len());
        for (i, &ts) in timestamps.iter().enumerate() {
            let date = chrono::DateTime::from_timestamp(ts, 0)
                .map(|dt| dt.naive_utc().date())
                .ok_or_else(|| ProviderError::Internal(format!("Invalid timestamp: {}", ts)))?;

            let open = quote.open.get(i).copied().flatten();
            let high = quote.high.get(i).copied().flatten();
            let low = quote.low.get(i).copied().flatten();
            let close = quote.close.get(i).copied().flatten();

            // Holiday rows carry nulls in every column
            let (Some(open), Some(high), Some(low), Some(close)) = (open, high, low, close) else {
                continue;
            };

            bars.push(PriceBar {
                symbol: symbol.to_string(),
                date,
                open,
                high,
                low,
                close,
                volume: quote.volume.get(i).copied().flatten().unwrap_or(0.0),
            });
        }

        if bars.is_empty() {
            return Err(ProviderError::DataNotAvailable(format!(
                "No usable bars for {}",
                symbol
            )));
        }

        Ok(normalize_bars(bars))
    }
}

impl Default for YahooProvider {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// PriceProvider Implementation
// ============================================================================

#[async_trait]
impl PriceProvider for YahooProvider {
    fn name(&self) -> &'static str {
        "yahoo"
    }

    fn history_priority(&self) -> u8 {
        1
    }

    fn quote_priority(&self) -> u8 {
        2
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

        let data = self.fetch_chart(symbol, start, end).await?;
        Self::parse_bars(symbol, data)
    }

    async fn quote(&self, symbol: &str) -> Result<Quote, ProviderError> {
        // The chart meta carries the regular market price; a one-day
        // window keeps the payload small.
        let today = Utc::now().date_naive();
        let data = self
            .fetch_chart(symbol, today - chrono::Duration::days(7), today)
            .await?;

        let price = data
            .meta
            .regular_market_price
            .ok_or_else(|| ProviderError::DataNotAvailable(format!("No market price for {}", symbol)))?;
        let prev_close = data.meta.chart_previous_close.unwrap_or(price);

        Ok(Quote {
            symbol: symbol.to_uppercase(),
            price,
            change: price - prev_close,
            change_percent: if prev_close > 0.0 {
                (price - prev_close) / prev_close * 100.0
            } else {
                0.0
            },
            prev_close,
            timestamp: Utc::now(),
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
