use async_trait::async_trait;

use crate::{Audience, OhlcSeries, Result, Timeframe, TradeEvent};

/// Source of historical OHLC series.
///
/// Implementations return `Error::NoData`, `Error::Stale` or
/// `Error::Timeout` when a series cannot be served. Callers treat any error
/// as "timeframe unavailable for this cycle".
#[async_trait]
pub trait PriceSeriesProvider: Send + Sync {
    async fn fetch(&self, symbol: &str, timeframe: Timeframe) -> Result<OhlcSeries>;
}

/// Source of the latest traded price of a symbol.
#[async_trait]
pub trait CurrentPriceProvider: Send + Sync {
    async fn latest(&self, symbol: &str) -> Result<f64>;
}

/// Delivery channel for trade events.
///
/// The supervisor publishes fire-and-forget: an error is logged and never
/// retried or propagated.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn publish(&self, audience: &Audience, event: &TradeEvent) -> Result<()>;
}
