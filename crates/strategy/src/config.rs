use serde::{Deserialize, Serialize};

use common::Timeframe;

use crate::{ConsensusEngine, TimeframeAnalyzer};

/// Trading parameters file (TOML).
///
/// Example `config/signals.toml`:
/// ```toml
/// [supervisor]
/// tick_interval_secs = 300
/// auto_discovery = true
/// max_daily_trades = 3
/// min_confidence = 85.0
///
/// [scan]
/// timeframes = ["1m", "5m", "15m", "30m", "1h"]
/// symbols = ["BTCUSDT", "ETHUSDT"]
/// ```
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SignalFileConfig {
    #[serde(default)]
    pub supervisor: SupervisorSection,
    #[serde(default)]
    pub fetch: FetchSection,
    #[serde(default)]
    pub scan: ScanSection,
    #[serde(default)]
    pub consensus: ConsensusSection,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SupervisorSection {
    pub tick_interval_secs: u64,
    /// Scan candidate symbols for new trades on every tick.
    pub auto_discovery: bool,
    pub max_daily_trades: usize,
    pub min_confidence: f64,
    /// Move the stop to breakeven / half distance as targets are hit.
    pub trailing_stop: bool,
    /// Upper bound on provider calls in flight during one tick.
    pub max_concurrent_fetches: usize,
}

impl Default for SupervisorSection {
    fn default() -> Self {
        Self {
            tick_interval_secs: 300,
            auto_discovery: false,
            max_daily_trades: 3,
            min_confidence: 85.0,
            trailing_stop: true,
            max_concurrent_fetches: 4,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FetchSection {
    pub timeout_secs: u64,
    pub max_attempts: u32,
    pub backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for FetchSection {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            max_attempts: 3,
            backoff_ms: 500,
            max_backoff_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ScanSection {
    pub timeframes: Vec<Timeframe>,
    pub symbols: Vec<String>,
}

impl Default for ScanSection {
    fn default() -> Self {
        Self {
            timeframes: vec![
                Timeframe::M1,
                Timeframe::M5,
                Timeframe::M15,
                Timeframe::M30,
                Timeframe::H1,
            ],
            symbols: Vec::new(),
        }
    }
}

/// Overrides for the analyzer and consensus thresholds.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ConsensusSection {
    /// Timeframes must be strictly stronger than this to vote.
    pub vote_threshold: u8,
    pub min_votes: u32,
    pub short_period: usize,
    pub long_period: usize,
    pub rsi_period: usize,
}

impl Default for ConsensusSection {
    fn default() -> Self {
        let engine = ConsensusEngine::default();
        let analyzer = TimeframeAnalyzer::default();
        Self {
            vote_threshold: engine.vote_threshold,
            min_votes: engine.min_votes,
            short_period: analyzer.short_period,
            long_period: analyzer.long_period,
            rsi_period: analyzer.rsi.period,
        }
    }
}

impl ConsensusSection {
    pub fn analyzer(&self) -> TimeframeAnalyzer {
        let mut analyzer = TimeframeAnalyzer {
            short_period: self.short_period,
            long_period: self.long_period,
            ..TimeframeAnalyzer::default()
        };
        analyzer.rsi.period = self.rsi_period.max(2);
        analyzer
    }

    pub fn engine(&self) -> ConsensusEngine {
        ConsensusEngine {
            vote_threshold: self.vote_threshold,
            min_votes: self.min_votes,
            ..ConsensusEngine::default()
        }
    }
}

impl SignalFileConfig {
    /// Load from a TOML file. Exits process on error.
    pub fn load(path: &str) -> Self {
        let content = std::fs::read_to_string(path)
            .unwrap_or_else(|e| panic!("Failed to read signal config at '{path}': {e}"));
        Self::parse(&content)
            .unwrap_or_else(|e| panic!("Failed to parse signal config at '{path}': {e}"))
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }
}
