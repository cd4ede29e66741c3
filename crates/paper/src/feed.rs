use std::collections::{HashMap, HashSet};
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};

use common::{
    Candle, CurrentPriceProvider, Error, OhlcSeries, PriceSeriesProvider, Result, Timeframe,
};

/// Simulated market data.
///
/// Series and prices are whatever was last scripted. Symbols marked as
/// failing return `Error::PriceFetch` from both provider traits, unknown
/// symbols return `Error::NoData`.
#[derive(Default)]
pub struct PaperFeed {
    series: RwLock<HashMap<(String, Timeframe), Vec<Candle>>>,
    prices: RwLock<HashMap<String, f64>>,
    failing: RwLock<HashSet<String>>,
}

/// On-disk form of a paper feed.
///
/// ```json
/// {
///   "prices": { "XAUUSD": 2351.4 },
///   "series": [ { "symbol": "XAUUSD", "timeframe": "15m", "closes": [2340.1, 2341.0] } ]
/// }
/// ```
///
/// Candles are rebuilt from the closes so the last one always ends now.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PaperFeedFile {
    #[serde(default)]
    pub prices: HashMap<String, f64>,
    #[serde(default)]
    pub series: Vec<PaperSeries>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaperSeries {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub closes: Vec<f64>,
}

impl PaperFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await?;
        let file: PaperFeedFile = serde_json::from_str(&content)?;
        let feed = Self::from_script(file, Utc::now()).await;
        info!(path = %path.display(), "Paper feed loaded");
        Ok(feed)
    }

    pub async fn from_script(file: PaperFeedFile, now: DateTime<Utc>) -> Self {
        let feed = Self::new();
        for (symbol, price) in file.prices {
            feed.set_price(&symbol, price).await;
        }
        for s in file.series {
            let candles = synthetic_candles(&s.closes, s.timeframe, now);
            feed.set_series(&s.symbol, s.timeframe, candles).await;
        }
        feed
    }

    pub async fn set_series(&self, symbol: &str, timeframe: Timeframe, candles: Vec<Candle>) {
        self.series
            .write()
            .await
            .insert((symbol.to_string(), timeframe), candles);
    }

    pub async fn set_price(&self, symbol: &str, price: f64) {
        self.prices.write().await.insert(symbol.to_string(), price);
    }

    /// Make every request for `symbol` fail until `recover` is called.
    pub async fn fail_symbol(&self, symbol: &str) {
        self.failing.write().await.insert(symbol.to_string());
    }

    pub async fn recover(&self, symbol: &str) {
        self.failing.write().await.remove(symbol);
    }

    async fn check_available(&self, symbol: &str) -> Result<()> {
        if self.failing.read().await.contains(symbol) {
            return Err(Error::PriceFetch(format!("paper feed: {symbol} unavailable")));
        }
        Ok(())
    }
}

#[async_trait]
impl PriceSeriesProvider for PaperFeed {
    async fn fetch(&self, symbol: &str, timeframe: Timeframe) -> Result<OhlcSeries> {
        self.check_available(symbol).await?;
        let series = self.series.read().await;
        let candles = series
            .get(&(symbol.to_string(), timeframe))
            .filter(|c| !c.is_empty())
            .ok_or_else(|| Error::NoData(format!("{symbol} {timeframe}")))?;
        debug!(symbol, %timeframe, bars = candles.len(), "Paper series served");
        Ok(OhlcSeries::new(symbol, timeframe, candles.clone()))
    }
}

#[async_trait]
impl CurrentPriceProvider for PaperFeed {
    async fn latest(&self, symbol: &str) -> Result<f64> {
        self.check_available(symbol).await?;
        self.prices
            .read()
            .await
            .get(symbol)
            .copied()
            .ok_or_else(|| Error::NoData(symbol.to_string()))
    }
}

/// Candles whose closes follow `closes`, one period apart, the last one
/// opening at `end`. Each bar opens at the previous close.
pub fn synthetic_candles(closes: &[f64], timeframe: Timeframe, end: DateTime<Utc>) -> Vec<Candle> {
    let period = chrono::Duration::from_std(timeframe.duration()).unwrap_or_else(|_| chrono::Duration::zero());
    let n = closes.len() as i32;
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            Candle {
                open_time: end - period * (n - 1 - i as i32),
                open,
                high: open.max(close),
                low: open.min(close),
                close,
            }
        })
        .collect()
}
