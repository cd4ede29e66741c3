use common::{Error, IndicatorSnapshot, OhlcSeries, Result, TimeframeAnalysis, Trend};
use tracing::trace;

use crate::indicators::{sma, RsiIndicator};

/// Classifies the trend of a single timeframe from its close prices.
///
/// Trend is read from the ordering of price, a short SMA and a long SMA.
/// Strength is 30 for a directional trend, plus 20 when RSI still leaves
/// room to run in that direction.
#[derive(Debug, Clone)]
pub struct TimeframeAnalyzer {
    pub short_period: usize,
    pub long_period: usize,
    pub min_bars: usize,
    pub rsi: RsiIndicator,
}

impl Default for TimeframeAnalyzer {
    fn default() -> Self {
        Self {
            short_period: 10,
            long_period: 20,
            min_bars: 20,
            rsi: RsiIndicator::default(),
        }
    }
}

const TREND_STRENGTH: u8 = 30;
const MOMENTUM_STRENGTH: u8 = 20;

impl TimeframeAnalyzer {
    /// Bars needed before every indicator has a value.
    pub fn required_bars(&self) -> usize {
        self.min_bars
            .max(self.long_period)
            .max(self.short_period)
            .max(self.rsi.period + 1)
    }

    /// Analyse one series. Fails with `InsufficientData` when the series is
    /// shorter than `required_bars`.
    pub fn analyze(&self, series: &OhlcSeries) -> Result<TimeframeAnalysis> {
        let required = self.required_bars();
        if series.len() < required {
            return Err(Error::InsufficientData {
                required,
                available: series.len(),
            });
        }

        let closes = series.closes();
        let insufficient = || Error::InsufficientData {
            required,
            available: closes.len(),
        };

        let price = *closes.last().ok_or_else(insufficient)?;
        let ma_short = sma(&closes, self.short_period).ok_or_else(insufficient)?;
        let ma_long = sma(&closes, self.long_period).ok_or_else(insufficient)?;
        let rsi = self.rsi.compute(&closes).ok_or_else(insufficient)?;

        let trend = if price > ma_short && ma_short > ma_long {
            Trend::Up
        } else if price < ma_short && ma_short < ma_long {
            Trend::Down
        } else {
            Trend::Sideways
        };

        let strength = match trend {
            Trend::Up if rsi < self.rsi.overbought => TREND_STRENGTH + MOMENTUM_STRENGTH,
            Trend::Down if rsi > self.rsi.oversold => TREND_STRENGTH + MOMENTUM_STRENGTH,
            Trend::Up | Trend::Down => TREND_STRENGTH,
            Trend::Sideways => 0,
        };

        trace!(
            symbol = %series.symbol,
            timeframe = %series.timeframe,
            %trend,
            strength,
            rsi,
            "Timeframe analysed"
        );

        Ok(TimeframeAnalysis {
            timeframe: series.timeframe,
            trend,
            strength: strength.min(100),
            indicators: IndicatorSnapshot {
                rsi,
                ma_short,
                ma_long,
                price,
            },
        })
    }
}
