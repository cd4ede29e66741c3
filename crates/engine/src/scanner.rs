use std::collections::BTreeMap;
use std::sync::Arc;

use futures_util::future::join_all;
use tracing::{debug, info, warn};

use common::{
    ConsensusResult, CurrentPriceProvider, Error, PricePlan, PriceSeriesProvider, Result,
    Timeframe, TimeframeAnalysis,
};
use levels::{LevelCalculator, SymbolClass};
use strategy::{mean_strength, ConsensusEngine, TimeframeAnalyzer};

use crate::RetryPolicy;

/// A tradable consensus together with its price plan.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub symbol: String,
    pub consensus: ConsensusResult,
    pub plan: PricePlan,
}

/// Runs the analyze -> consensus -> levels pipeline for one symbol.
pub struct SignalScanner {
    series: Arc<dyn PriceSeriesProvider>,
    prices: Arc<dyn CurrentPriceProvider>,
    analyzer: TimeframeAnalyzer,
    consensus: ConsensusEngine,
    levels: LevelCalculator,
    timeframes: Vec<Timeframe>,
    min_confidence: f64,
    policy: RetryPolicy,
}

impl SignalScanner {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        series: Arc<dyn PriceSeriesProvider>,
        prices: Arc<dyn CurrentPriceProvider>,
        analyzer: TimeframeAnalyzer,
        consensus: ConsensusEngine,
        levels: LevelCalculator,
        timeframes: Vec<Timeframe>,
        min_confidence: f64,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            series,
            prices,
            analyzer,
            consensus,
            levels,
            timeframes,
            min_confidence,
            policy,
        }
    }

    /// Analyse every configured timeframe. Timeframes that cannot be
    /// fetched or do not have enough history are left out of the map.
    pub async fn analyze_timeframes(&self, symbol: &str) -> BTreeMap<Timeframe, TimeframeAnalysis> {
        let series = &self.series;
        let fetches = self.timeframes.iter().copied().map(|timeframe| async move {
            let result = self
                .policy
                .run("series", move || series.fetch(symbol, timeframe))
                .await
                .and_then(|ohlc| self.analyzer.analyze(&ohlc));
            (timeframe, result)
        });

        let mut analyses = BTreeMap::new();
        for (timeframe, result) in join_all(fetches).await {
            match result {
                Ok(analysis) => {
                    analyses.insert(timeframe, analysis);
                }
                Err(Error::InsufficientData { required, available }) => {
                    debug!(symbol, %timeframe, required, available, "Not enough history, timeframe skipped");
                }
                Err(e) => {
                    warn!(symbol, %timeframe, error = %e, "Timeframe unavailable, skipped");
                }
            }
        }
        analyses
    }

    /// Evaluate a symbol. `Ok(None)` means no tradable consensus.
    pub async fn scan(&self, symbol: &str) -> Result<Option<Candidate>> {
        let analyses = self.analyze_timeframes(symbol).await;
        let consensus = self.consensus.evaluate(&analyses);

        if !consensus.is_tradable(self.min_confidence) {
            debug!(
                symbol,
                signal = %consensus.signal,
                confidence = consensus.confidence,
                analyzed = consensus.timeframes_analyzed,
                "No tradable consensus"
            );
            return Ok(None);
        }

        let prices = &self.prices;
        let price = self
            .policy
            .run("latest price", move || prices.latest(symbol))
            .await?;
        let class = SymbolClass::classify(symbol);
        let plan = self
            .levels
            .calculate(price, consensus.signal, class, mean_strength(&analyses))?;

        info!(
            symbol,
            signal = %consensus.signal,
            confidence = consensus.confidence,
            buy_votes = consensus.buy_votes,
            sell_votes = consensus.sell_votes,
            timeframe = %consensus.recommended_timeframe,
            price,
            "Tradable consensus"
        );

        Ok(Some(Candidate {
            symbol: symbol.to_string(),
            consensus,
            plan,
        }))
    }
}
