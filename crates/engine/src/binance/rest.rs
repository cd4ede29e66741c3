use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use common::{
    Candle, CurrentPriceProvider, Error, OhlcSeries, PriceSeriesProvider, Result, Timeframe,
};

const BASE_URL: &str = "https://api.binance.com";

/// Candles requested per series; comfortably above the analyzer's minimum.
const KLINE_LIMIT: u32 = 100;

/// A series whose newest candle is older than this many periods is stale.
const STALE_PERIODS: u32 = 3;

/// Public market data from the Binance REST API. No credentials needed.
pub struct BinanceFeed {
    base_url: String,
    http: Client,
}

impl BinanceFeed {
    pub fn new(timeout: Duration) -> Result<Self> {
        Self::with_base_url(BASE_URL, timeout)
    }

    pub fn with_base_url(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .use_rustls_tls()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into(),
            http,
        })
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
        let url = format!("{}{path}", self.base_url);
        let resp = self
            .http
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::PriceFetch(format!("timeout calling {path}"))
                } else {
                    Error::Http(e.to_string())
                }
            })?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| Error::Http(e.to_string()))?;

        if !status.is_success() {
            return Err(Error::PriceFetch(format!("HTTP {status}: {body}")));
        }
        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl PriceSeriesProvider for BinanceFeed {
    async fn fetch(&self, symbol: &str, timeframe: Timeframe) -> Result<OhlcSeries> {
        debug!(symbol, %timeframe, "Fetching klines");
        let rows: Vec<KlineRow> = self
            .get(
                "/api/v3/klines",
                &[
                    ("symbol", symbol.to_ascii_uppercase()),
                    ("interval", timeframe.as_str().to_string()),
                    ("limit", KLINE_LIMIT.to_string()),
                ],
            )
            .await?;

        let candles = rows
            .into_iter()
            .map(KlineRow::into_candle)
            .collect::<Result<Vec<_>>>()?;
        let series = OhlcSeries::new(symbol, timeframe, candles);
        check_fresh(&series, Utc::now())?;
        Ok(series)
    }
}

#[async_trait]
impl CurrentPriceProvider for BinanceFeed {
    async fn latest(&self, symbol: &str) -> Result<f64> {
        let ticker: TickerPrice = self
            .get(
                "/api/v3/ticker/price",
                &[("symbol", symbol.to_ascii_uppercase())],
            )
            .await?;
        let price = parse_price(&ticker.price)?;
        if price <= 0.0 {
            return Err(Error::InvalidPrice(price));
        }
        Ok(price)
    }
}

/// Reject empty series and series whose last candle opened more than
/// `STALE_PERIODS` periods ago.
fn check_fresh(series: &OhlcSeries, now: DateTime<Utc>) -> Result<()> {
    let last = series.candles.last().ok_or_else(|| {
        Error::NoData(format!("{} {}", series.symbol, series.timeframe))
    })?;
    let max_age = chrono::Duration::from_std(series.timeframe.duration() * STALE_PERIODS)
        .map_err(|e| Error::Other(e.to_string()))?;
    if now - last.open_time > max_age {
        return Err(Error::Stale(format!(
            "{} {} last candle {}",
            series.symbol, series.timeframe, last.open_time
        )));
    }
    Ok(())
}

fn parse_price(raw: &str) -> Result<f64> {
    raw.parse::<f64>()
        .map_err(|_| Error::PriceFetch(format!("unparseable price '{raw}'")))
}

// Binance kline rows are heterogeneous JSON arrays:
// [open_time, open, high, low, close, volume, close_time, quote_volume,
//  trades, taker_base, taker_quote, ignore]
#[derive(Deserialize)]
struct KlineRow(
    i64,
    String,
    String,
    String,
    String,
    String,
    i64,
    String,
    u64,
    String,
    String,
    String,
);

impl KlineRow {
    fn into_candle(self) -> Result<Candle> {
        let open_time = Utc
            .timestamp_millis_opt(self.0)
            .single()
            .ok_or_else(|| Error::PriceFetch(format!("bad kline timestamp {}", self.0)))?;
        Ok(Candle {
            open_time,
            open: parse_price(&self.1)?,
            high: parse_price(&self.2)?,
            low: parse_price(&self.3)?,
            close: parse_price(&self.4)?,
        })
    }
}

#[derive(Deserialize)]
struct TickerPrice {
    price: String,
}
