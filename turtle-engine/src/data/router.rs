//! Price data router for multi-source failover.
//!
//! Routes requests to providers in priority order and fails over to the
//! next source when a provider-level error makes that sensible. Rate
//! limits are handled in place with bounded exponential backoff — being
//! throttled is not a reason to abandon a provider mid-quota.
//!
//! A response is always served by exactly one provider; the router never
//! merges bars from different sources.

use chrono::NaiveDate;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::provider::{PriceProvider, ProviderError};
use super::{PriceBar, Quote};

// ============================================================================
// Router Configuration
// ============================================================================

/// Configuration for the price router.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Maximum retries per provider on recoverable errors
    pub max_retries: u32,
    /// Base delay for exponential backoff
    pub retry_base_delay: Duration,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_base_delay: Duration::from_millis(500),
        }
    }
}

// ============================================================================
// Price Router
// ============================================================================

/// Which priority ordering a request should use.
#[derive(Debug, Clone, Copy)]
enum Lane {
    History,
    Quotes,
}

/// Routes price requests across registered providers with failover.
pub struct PriceRouter {
    providers: Vec<Arc<dyn PriceProvider>>,
    config: RouterConfig,
}

impl PriceRouter {
    /// Create a router with default configuration.
    pub fn new(providers: Vec<Arc<dyn PriceProvider>>) -> Self {
        Self::with_config(providers, RouterConfig::default())
    }

    /// Create a router with custom configuration.
    pub fn with_config(providers: Vec<Arc<dyn PriceProvider>>, config: RouterConfig) -> Self {
        for p in &providers {
            info!(provider = p.name(), "Registered price provider");
        }
        Self { providers, config }
    }

    /// Registered provider names, for diagnostics.
    pub fn provider_names(&self) -> Vec<&'static str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    /// Fetch daily bars, preferring the history lane ordering.
    pub async fn daily_bars(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceBar>, ProviderError> {
        self.route(Lane::History, symbol, |p| {
            let symbol = symbol.to_string();
            async move { p.daily_bars(&symbol, start, end).await }
        })
        .await
    }

    /// Fetch a live quote, preferring the quote lane ordering.
    pub async fn quote(&self, symbol: &str) -> Result<Quote, ProviderError> {
        self.route(Lane::Quotes, symbol, |p| {
            let symbol = symbol.to_string();
            async move { p.quote(&symbol).await }
        })
        .await
    }

    /// Try each provider in lane order; retry recoverable errors in place
    /// with exponential backoff, fail over on provider-level errors.
    async fn route<T, F, Fut>(
        &self,
        lane: Lane,
        symbol: &str,
        call: F,
    ) -> Result<T, ProviderError>
    where
        F: Fn(Arc<dyn PriceProvider>) -> Fut,
        Fut: std::future::Future<Output = Result<T, ProviderError>>,
    {
        if self.providers.is_empty() {
            return Err(ProviderError::Internal("No providers registered".into()));
        }

        let mut ordered: Vec<Arc<dyn PriceProvider>> = self.providers.clone();
        ordered.sort_by_key(|p| match lane {
            Lane::History => p.history_priority(),
            Lane::Quotes => p.quote_priority(),
        });

        let mut last_error = None;

        'providers: for provider in ordered {
            let mut attempt = 0;
            loop {
                match call(Arc::clone(&provider)).await {
                    Ok(value) => {
                        debug!(provider = provider.name(), symbol, "Request served");
                        return Ok(value);
                    }
                    Err(err) if err.is_recoverable() && attempt < self.config.max_retries => {
                        let delay = self.backoff_delay(&err, attempt);
                        warn!(
                            provider = provider.name(),
                            symbol,
                            attempt = attempt + 1,
                            delay_ms = delay.as_millis() as u64,
                            error = %err,
                            "Recoverable provider error, backing off"
                        );
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    }
                    Err(err) if err.should_failover() => {
                        warn!(
                            provider = provider.name(),
                            symbol,
                            error = %err,
                            "Provider failed, trying next source"
                        );
                        last_error = Some(err);
                        continue 'providers;
                    }
                    Err(err) => {
                        // Retries exhausted or a non-failover error
                        // (rate limit that never cleared, bad request)
                        last_error = Some(err);
                        continue 'providers;
                    }
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| ProviderError::Internal("All providers exhausted".into())))
    }

    /// Exponential backoff, honoring a provider-advertised retry-after
    /// when it is longer than the computed delay.
    fn backoff_delay(&self, err: &ProviderError, attempt: u32) -> Duration {
        let exp = self.config.retry_base_delay * 2u32.saturating_pow(attempt);
        if let ProviderError::RateLimited {
            retry_after_secs: Some(secs),
        } = err
        {
            exp.max(Duration::from_secs(*secs))
        } else {
            exp
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
