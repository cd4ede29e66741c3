use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use common::{
    CloseReason, Direction, Error, PricePlan, Result, TargetLevel, TradeEvent, TradeStatus,
};

/// A hypothetical position and its progress through the plan.
///
/// Pending until the first price is seen, Active while targets accumulate,
/// Closed once the stop is crossed, target 3 is reached or an operator
/// closes it. A Closed trade ignores every further price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeLifecycle {
    pub id: String,
    pub symbol: String,
    pub direction: Direction,
    pub plan: PricePlan,
    /// Current stop. Starts at the plan's stop and only ever tightens.
    pub stop_loss: f64,
    pub triggered: BTreeSet<TargetLevel>,
    pub status: TradeStatus,
    pub close_reason: Option<CloseReason>,
    pub close_price: Option<f64>,
    /// Consensus confidence the trade was opened with.
    pub confidence: f64,
    pub created_at: DateTime<Utc>,
    pub activated_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
}

/// What a single price evaluation did to a trade.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transition {
    pub activated: bool,
    pub stop_moved: bool,
    pub events: Vec<TradeEvent>,
}

impl Transition {
    pub fn is_noop(&self) -> bool {
        !self.activated && !self.stop_moved && self.events.is_empty()
    }
}

impl TradeLifecycle {
    pub fn open(
        symbol: impl Into<String>,
        plan: PricePlan,
        confidence: f64,
        now: DateTime<Utc>,
    ) -> Self {
        let symbol = symbol.into();
        Self {
            id: Self::new_id(&symbol, now),
            direction: plan.direction,
            stop_loss: plan.stop_loss,
            symbol,
            plan,
            triggered: BTreeSet::new(),
            status: TradeStatus::Pending,
            close_reason: None,
            close_price: None,
            confidence,
            created_at: now,
            activated_at: None,
            closed_at: None,
        }
    }

    /// `SYMBOL_<unix millis>_<8 hex>`. The random suffix keeps ids apart
    /// when a symbol is closed and reopened within the same instant.
    pub fn new_id(symbol: &str, now: DateTime<Utc>) -> String {
        let suffix = Uuid::new_v4().simple().to_string();
        format!("{symbol}_{}_{}", now.timestamp_millis(), &suffix[..8])
    }

    pub fn is_open(&self) -> bool {
        self.status != TradeStatus::Closed
    }

    /// Evaluate one fresh price.
    ///
    /// The stop is checked first; otherwise targets are taken in order, each
    /// one tightening the stop (when `trailing` is set) before the next is
    /// considered. Target 3 closes the trade.
    pub fn on_price(&mut self, price: f64, trailing: bool, now: DateTime<Utc>) -> Transition {
        let mut transition = Transition::default();
        if !self.is_open() || !price.is_finite() {
            return transition;
        }

        if self.status == TradeStatus::Pending {
            self.status = TradeStatus::Active;
            self.activated_at = Some(now);
            transition.activated = true;
            debug!(trade_id = %self.id, price, "Trade active");
        }

        if self.stop_crossed(price) {
            info!(trade_id = %self.id, price, stop = self.stop_loss, "Stop-loss hit");
            transition
                .events
                .push(self.close(CloseReason::StopLoss, price, now));
            return transition;
        }

        for level in TargetLevel::ALL {
            if self.triggered.contains(&level) || !self.target_reached(level, price) {
                continue;
            }
            self.triggered.insert(level);
            info!(trade_id = %self.id, target = %level, price, "Target hit");
            transition.events.push(TradeEvent::TargetHit {
                trade_id: self.id.clone(),
                symbol: self.symbol.clone(),
                target: level,
                price,
            });

            if trailing && self.trail_stop(level) {
                transition.stop_moved = true;
            }

            if level == TargetLevel::T3 {
                transition
                    .events
                    .push(self.close(CloseReason::AllTargetsHit, price, now));
                break;
            }
        }

        transition
    }

    /// Close on operator request. Fails without touching the trade when it
    /// is already closed.
    pub fn close_manually(&mut self, price: f64, now: DateTime<Utc>) -> Result<TradeEvent> {
        if !self.is_open() {
            return Err(Error::TradeClosed(self.id.clone()));
        }
        if !price.is_finite() || price <= 0.0 {
            return Err(Error::InvalidPrice(price));
        }
        info!(trade_id = %self.id, price, "Trade closed manually");
        Ok(self.close(CloseReason::Manual, price, now))
    }

    /// Signed distance from entry zone 1 to the close price in pips,
    /// positive when the trade moved in its favour.
    pub fn pips_result(&self) -> Option<f64> {
        self.close_price.map(|close| self.signed_pips(close))
    }

    /// Time since creation, or the lifetime of a closed trade.
    pub fn duration(&self, now: DateTime<Utc>) -> Duration {
        self.closed_at.unwrap_or(now) - self.created_at
    }

    fn signed_pips(&self, price: f64) -> f64 {
        let pips = self.plan.pips_between(price, self.plan.entry_zone_1);
        let favourable = (price - self.plan.entry_zone_1) * self.direction.sign() > 0.0;
        if favourable {
            pips
        } else {
            -pips
        }
    }

    /// Touching the stop is not enough: price has to trade through it.
    fn stop_crossed(&self, price: f64) -> bool {
        match self.direction {
            Direction::Buy => price < self.stop_loss,
            Direction::Sell => price > self.stop_loss,
        }
    }

    fn target_reached(&self, level: TargetLevel, price: f64) -> bool {
        let target = self.plan.target(level);
        match self.direction {
            Direction::Buy => price >= target,
            Direction::Sell => price <= target,
        }
    }

    /// Target 1 moves the stop to breakeven (entry zone 1), target 2 to the
    /// midpoint between entry zone 1 and target 1. Returns whether it moved.
    fn trail_stop(&mut self, level: TargetLevel) -> bool {
        let candidate = match level {
            TargetLevel::T1 => self.plan.entry_zone_1,
            TargetLevel::T2 => (self.plan.entry_zone_1 + self.plan.target(TargetLevel::T1)) / 2.0,
            TargetLevel::T3 => return false,
        };
        let tightened = match self.direction {
            Direction::Buy => self.stop_loss.max(candidate),
            Direction::Sell => self.stop_loss.min(candidate),
        };
        if tightened == self.stop_loss {
            return false;
        }
        debug!(trade_id = %self.id, from = self.stop_loss, to = tightened, "Trailing stop moved");
        self.stop_loss = tightened;
        true
    }

    fn close(&mut self, reason: CloseReason, price: f64, now: DateTime<Utc>) -> TradeEvent {
        self.status = TradeStatus::Closed;
        self.close_reason = Some(reason);
        self.close_price = Some(price);
        self.closed_at = Some(now);
        TradeEvent::TradeClosed {
            trade_id: self.id.clone(),
            symbol: self.symbol.clone(),
            reason,
            price,
            pips: self.signed_pips(price),
        }
    }
}

/// Human readable duration such as `3h 05m` or `12m`.
pub fn format_duration(duration: Duration) -> String {
    let minutes = duration.num_minutes().max(0);
    let (hours, minutes) = (minutes / 60, minutes % 60);
    if hours > 0 {
        format!("{hours}h {minutes:02}m")
    } else {
        format!("{minutes}m")
    }
}
