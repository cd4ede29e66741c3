use std::collections::BTreeMap;

use common::{ConsensusResult, SignalType, Timeframe, TimeframeAnalysis, Trend};
use tracing::debug;

/// Aggregates per-timeframe analyses into one directional signal.
///
/// Only timeframes stronger than `vote_threshold` vote; `15m`, `30m` and
/// `1h` votes count double. A side wins when it out-votes the other and
/// collects at least `min_votes`, so a single strong timeframe can never
/// authorise a trade alone.
#[derive(Debug, Clone)]
pub struct ConsensusEngine {
    pub vote_threshold: u8,
    pub higher_weight: u32,
    pub lower_weight: u32,
    pub min_votes: u32,
    pub base_confidence: f64,
    pub confidence_step: f64,
    pub max_confidence: f64,
}

impl Default for ConsensusEngine {
    fn default() -> Self {
        Self {
            vote_threshold: 60,
            higher_weight: 2,
            lower_weight: 1,
            min_votes: 3,
            base_confidence: 85.0,
            confidence_step: 5.0,
            max_confidence: 95.0,
        }
    }
}

/// Timeframe reported when nothing has positive strength.
const FALLBACK_TIMEFRAME: Timeframe = Timeframe::M15;

impl ConsensusEngine {
    pub fn evaluate(&self, analyses: &BTreeMap<Timeframe, TimeframeAnalysis>) -> ConsensusResult {
        if analyses.is_empty() {
            return ConsensusResult {
                signal: SignalType::Neutral,
                confidence: 0.0,
                buy_votes: 0,
                sell_votes: 0,
                average_strength: 0.0,
                recommended_timeframe: FALLBACK_TIMEFRAME,
                timeframes_analyzed: 0,
            };
        }

        let mut buy_votes = 0u32;
        let mut sell_votes = 0u32;

        for (tf, analysis) in analyses {
            if analysis.strength <= self.vote_threshold {
                continue;
            }
            let weight = if tf.is_higher() {
                self.higher_weight
            } else {
                self.lower_weight
            };
            match analysis.trend {
                Trend::Up => buy_votes += weight,
                Trend::Down => sell_votes += weight,
                Trend::Sideways => {}
            }
        }

        let average_strength = mean_strength(analyses);

        let (signal, confidence) = if buy_votes > sell_votes && buy_votes >= self.min_votes {
            (SignalType::Buy, self.vote_confidence(buy_votes, sell_votes))
        } else if sell_votes > buy_votes && sell_votes >= self.min_votes {
            (SignalType::Sell, self.vote_confidence(sell_votes, buy_votes))
        } else {
            (SignalType::Neutral, average_strength)
        };

        debug!(%signal, buy_votes, sell_votes, average_strength, "Consensus evaluated");

        ConsensusResult {
            signal,
            confidence: round1(confidence),
            buy_votes,
            sell_votes,
            average_strength: round1(average_strength),
            recommended_timeframe: strongest_timeframe(analyses),
            timeframes_analyzed: analyses.len(),
        }
    }

    fn vote_confidence(&self, winning: u32, losing: u32) -> f64 {
        let margin = f64::from(winning - losing);
        (self.base_confidence + self.confidence_step * margin).min(self.max_confidence)
    }
}

/// Unrounded mean strength across every analysed timeframe, 0 when empty.
/// `ConsensusResult::average_strength` carries this rounded to one decimal.
pub fn mean_strength(analyses: &BTreeMap<Timeframe, TimeframeAnalysis>) -> f64 {
    if analyses.is_empty() {
        return 0.0;
    }
    let total: u32 = analyses.values().map(|a| u32::from(a.strength)).sum();
    f64::from(total) / analyses.len() as f64
}

/// First timeframe (in timeframe order) with the highest positive strength.
fn strongest_timeframe(analyses: &BTreeMap<Timeframe, TimeframeAnalysis>) -> Timeframe {
    analyses
        .values()
        .filter(|a| a.strength > 0)
        .fold(None::<&TimeframeAnalysis>, |best, a| match best {
            Some(b) if b.strength >= a.strength => Some(b),
            _ => Some(a),
        })
        .map(|a| a.timeframe)
        .unwrap_or(FALLBACK_TIMEFRAME)
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
