use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::Error;

/// Candle interval of a price series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "1m")]
    M1,
    #[serde(rename = "5m")]
    M5,
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "30m")]
    M30,
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "4h")]
    H4,
    #[serde(rename = "1d")]
    D1,
}

impl Timeframe {
    pub const ALL: [Timeframe; 7] = [
        Timeframe::M1,
        Timeframe::M5,
        Timeframe::M15,
        Timeframe::M30,
        Timeframe::H1,
        Timeframe::H4,
        Timeframe::D1,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::M1 => "1m",
            Timeframe::M5 => "5m",
            Timeframe::M15 => "15m",
            Timeframe::M30 => "30m",
            Timeframe::H1 => "1h",
            Timeframe::H4 => "4h",
            Timeframe::D1 => "1d",
        }
    }

    /// Timeframes whose votes count double in the consensus.
    pub fn is_higher(&self) -> bool {
        matches!(self, Timeframe::M15 | Timeframe::M30 | Timeframe::H1)
    }

    /// Length of one candle.
    pub fn duration(&self) -> Duration {
        let secs = match self {
            Timeframe::M1 => 60,
            Timeframe::M5 => 5 * 60,
            Timeframe::M15 => 15 * 60,
            Timeframe::M30 => 30 * 60,
            Timeframe::H1 => 60 * 60,
            Timeframe::H4 => 4 * 60 * 60,
            Timeframe::D1 => 24 * 60 * 60,
        };
        Duration::from_secs(secs)
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Timeframe {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Timeframe::ALL
            .into_iter()
            .find(|tf| tf.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::Config(format!("unknown timeframe '{s}'")))
    }
}

/// One OHLC bar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

/// Price history for one symbol and timeframe, ordered oldest to newest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OhlcSeries {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub candles: Vec<Candle>,
}

impl OhlcSeries {
    pub fn new(symbol: impl Into<String>, timeframe: Timeframe, candles: Vec<Candle>) -> Self {
        Self {
            symbol: symbol.into(),
            timeframe,
            candles,
        }
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.close).collect()
    }

    pub fn last_close(&self) -> Option<f64> {
        self.candles.last().map(|c| c.close)
    }
}

/// Trend classification of a single timeframe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Up,
    Down,
    Sideways,
}

impl std::fmt::Display for Trend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Trend::Up => write!(f, "up"),
            Trend::Down => write!(f, "down"),
            Trend::Sideways => write!(f, "sideways"),
        }
    }
}

/// Direction of a hypothetical position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(type_name = "TEXT", rename_all = "UPPERCASE")]
pub enum Direction {
    Buy,
    Sell,
}

impl Direction {
    /// +1 for Buy, -1 for Sell. Multiplying an offset by this flips it for
    /// short trades.
    pub fn sign(&self) -> f64 {
        match self {
            Direction::Buy => 1.0,
            Direction::Sell => -1.0,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Buy => write!(f, "BUY"),
            Direction::Sell => write!(f, "SELL"),
        }
    }
}

impl FromStr for Direction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "BUY" => Ok(Direction::Buy),
            "SELL" => Ok(Direction::Sell),
            other => Err(Error::Persistence(format!("unknown direction '{other}'"))),
        }
    }
}

/// Outcome of a consensus evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalType {
    Buy,
    Sell,
    Neutral,
}

impl SignalType {
    pub fn direction(&self) -> Option<Direction> {
        match self {
            SignalType::Buy => Some(Direction::Buy),
            SignalType::Sell => Some(Direction::Sell),
            SignalType::Neutral => None,
        }
    }
}

impl std::fmt::Display for SignalType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignalType::Buy => write!(f, "BUY"),
            SignalType::Sell => write!(f, "SELL"),
            SignalType::Neutral => write!(f, "NEUTRAL"),
        }
    }
}

/// Indicator values backing a timeframe analysis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    pub rsi: f64,
    pub ma_short: f64,
    pub ma_long: f64,
    pub price: f64,
}

/// Trend and strength of one timeframe.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeframeAnalysis {
    pub timeframe: Timeframe,
    pub trend: Trend,
    /// 0..=100
    pub strength: u8,
    pub indicators: IndicatorSnapshot,
}

/// Aggregated directional opinion across timeframes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusResult {
    pub signal: SignalType,
    /// 0..=100, one decimal.
    pub confidence: f64,
    pub buy_votes: u32,
    pub sell_votes: u32,
    pub average_strength: f64,
    /// Strongest analysed timeframe.
    pub recommended_timeframe: Timeframe,
    pub timeframes_analyzed: usize,
}

impl ConsensusResult {
    pub fn is_tradable(&self, min_confidence: f64) -> bool {
        self.signal != SignalType::Neutral && self.confidence >= min_confidence
    }
}

/// One of the three profit targets of a plan.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum TargetLevel {
    #[serde(rename = "target_1")]
    T1,
    #[serde(rename = "target_2")]
    T2,
    #[serde(rename = "target_3")]
    T3,
}

impl TargetLevel {
    pub const ALL: [TargetLevel; 3] = [TargetLevel::T1, TargetLevel::T2, TargetLevel::T3];

    /// 1-based target number.
    pub fn number(&self) -> u8 {
        match self {
            TargetLevel::T1 => 1,
            TargetLevel::T2 => 2,
            TargetLevel::T3 => 3,
        }
    }

    fn idx(&self) -> usize {
        self.number() as usize - 1
    }
}

impl std::fmt::Display for TargetLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "target_{}", self.number())
    }
}

impl FromStr for TargetLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TargetLevel::ALL
            .into_iter()
            .find(|t| t.to_string() == s)
            .ok_or_else(|| Error::Persistence(format!("unknown target '{s}'")))
    }
}

/// Entry zones, stop and targets computed once when a trade is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePlan {
    pub direction: Direction,
    /// Price the levels were derived from.
    pub reference_price: f64,
    pub entry_zone_1: f64,
    pub entry_zone_2: f64,
    pub stop_loss: f64,
    pub targets: [f64; 3],
    pub risk_reward: [f64; 3],
    /// Pip size of the instrument's symbol class.
    pub pip_size: f64,
}

impl PricePlan {
    /// Build a plan from raw levels, deriving the risk:reward ratios
    /// against entry zone 1.
    pub fn new(
        direction: Direction,
        reference_price: f64,
        entry_zones: [f64; 2],
        stop_loss: f64,
        targets: [f64; 3],
        pip_size: f64,
    ) -> Self {
        let risk_reward = risk_reward_ratios(entry_zones[0], &targets, stop_loss);
        Self {
            direction,
            reference_price,
            entry_zone_1: entry_zones[0],
            entry_zone_2: entry_zones[1],
            stop_loss,
            targets,
            risk_reward,
            pip_size,
        }
    }

    pub fn target(&self, level: TargetLevel) -> f64 {
        self.targets[level.idx()]
    }

    pub fn risk_reward_for(&self, level: TargetLevel) -> f64 {
        self.risk_reward[level.idx()]
    }

    /// Absolute distance between two prices in pips.
    pub fn pips_between(&self, a: f64, b: f64) -> f64 {
        if self.pip_size <= 0.0 {
            return 0.0;
        }
        (a - b).abs() / self.pip_size
    }

    /// Distance from entry zone 1 to the initial stop, in pips.
    pub fn risk_pips(&self) -> f64 {
        self.pips_between(self.entry_zone_1, self.stop_loss)
    }

    /// Distance from entry zone 1 to a target, in pips.
    pub fn reward_pips(&self, level: TargetLevel) -> f64 {
        self.pips_between(self.entry_zone_1, self.target(level))
    }
}

/// `|target - entry| / |entry - stop|` per target; all zero when the stop
/// sits on the entry.
pub fn risk_reward_ratios(entry: f64, targets: &[f64; 3], stop_loss: f64) -> [f64; 3] {
    let risk = (entry - stop_loss).abs();
    if risk == 0.0 {
        warn!(entry, stop_loss, "Degenerate levels: stop equals entry, risk:reward reported as 0");
        return [0.0; 3];
    }
    targets.map(|t| (t - entry).abs() / risk)
}

/// Lifecycle status of a tracked trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
pub enum TradeStatus {
    Pending,
    Active,
    Closed,
}

impl std::fmt::Display for TradeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradeStatus::Pending => write!(f, "pending"),
            TradeStatus::Active => write!(f, "active"),
            TradeStatus::Closed => write!(f, "closed"),
        }
    }
}

/// Why a trade was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
pub enum CloseReason {
    StopLoss,
    AllTargetsHit,
    Manual,
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CloseReason::StopLoss => write!(f, "stop-loss"),
            CloseReason::AllTargetsHit => write!(f, "all targets hit"),
            CloseReason::Manual => write!(f, "manual close"),
        }
    }
}

/// Something worth telling the audience about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TradeEvent {
    SignalGenerated {
        trade_id: String,
        symbol: String,
        consensus: ConsensusResult,
        plan: PricePlan,
    },
    TargetHit {
        trade_id: String,
        symbol: String,
        target: TargetLevel,
        price: f64,
    },
    TradeClosed {
        trade_id: String,
        symbol: String,
        reason: CloseReason,
        price: f64,
        /// Signed result from entry zone 1, positive when favourable.
        pips: f64,
    },
}

impl TradeEvent {
    pub fn trade_id(&self) -> &str {
        match self {
            TradeEvent::SignalGenerated { trade_id, .. }
            | TradeEvent::TargetHit { trade_id, .. }
            | TradeEvent::TradeClosed { trade_id, .. } => trade_id,
        }
    }

    pub fn symbol(&self) -> &str {
        match self {
            TradeEvent::SignalGenerated { symbol, .. }
            | TradeEvent::TargetHit { symbol, .. }
            | TradeEvent::TradeClosed { symbol, .. } => symbol,
        }
    }
}

/// Recipient of a published event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Audience {
    User(i64),
    Group(i64),
}

impl Audience {
    pub fn chat_id(&self) -> i64 {
        match self {
            Audience::User(id) | Audience::Group(id) => *id,
        }
    }
}
