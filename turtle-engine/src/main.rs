//! Turtle Engine - daily market analysis runner.
//!
//! Invoked once per trading day by an external scheduler (cron or the
//! platform's job runner). The run claim is persisted, so overlapping or
//! repeated invocations for the same date are harmless.

use anyhow::Result;
use turtle_common::config::Config;
use turtle_common::logging::init_logging;
use turtle_engine::EngineState;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;

    init_logging(
        &config.observability.log_level,
        &config.observability.log_format,
    );

    tracing::info!("Turtle Engine v{}", env!("CARGO_PKG_VERSION"));

    let engine = EngineState::new(config)?;

    let signals = engine.analysis.run().await?;
    let triggered = signals.iter().filter(|s| s.signal_triggered).count();

    tracing::info!(
        signals = signals.len(),
        triggered,
        "Daily analysis finished"
    );

    for signal in signals.iter().filter(|s| s.signal_triggered) {
        tracing::info!(
            symbol = %signal.symbol,
            close = signal.close,
            atr = signal.atr,
            "BUY signal"
        );
    }

    Ok(())
}
