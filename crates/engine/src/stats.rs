use serde::Serialize;

use crate::TradeLifecycle;

/// Aggregate results over a trade collection.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TradeStatistics {
    pub total_trades: usize,
    /// Pending or active.
    pub active_trades: usize,
    pub closed_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    /// Percentage of closed trades that ended in profit.
    pub win_rate: f64,
    pub total_pips: f64,
    pub average_pips: f64,
}

impl TradeStatistics {
    pub fn from_trades(trades: &[TradeLifecycle]) -> Self {
        let results: Vec<f64> = trades.iter().filter_map(|t| t.pips_result()).collect();
        let closed = results.len();
        let winning = results.iter().filter(|&&p| p > 0.0).count();
        let total_pips: f64 = results.iter().sum();

        let (win_rate, average_pips) = if closed == 0 {
            (0.0, 0.0)
        } else {
            (
                winning as f64 / closed as f64 * 100.0,
                total_pips / closed as f64,
            )
        };

        Self {
            total_trades: trades.len(),
            active_trades: trades.iter().filter(|t| t.is_open()).count(),
            closed_trades: closed,
            winning_trades: winning,
            losing_trades: closed - winning,
            win_rate: round1(win_rate),
            total_pips: round1(total_pips),
            average_pips: round1(average_pips),
        }
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
