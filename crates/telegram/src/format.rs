use common::{Direction, TargetLevel, TradeEvent};

/// Decimals worth showing for an instrument: one more than its pip.
pub fn price_decimals(pip_size: f64) -> usize {
    if pip_size.is_nan() || pip_size <= 0.0 {
        return 5;
    }
    (-pip_size.log10()).round().max(0.0) as usize + 1
}

/// Plain-text message for one event.
pub fn format_event(event: &TradeEvent) -> String {
    match event {
        TradeEvent::SignalGenerated {
            trade_id,
            symbol,
            consensus,
            plan,
        } => {
            let dp = price_decimals(plan.pip_size);
            let side = match plan.direction {
                Direction::Buy => "BUY",
                Direction::Sell => "SELL",
            };
            let mut text = format!(
                "{side} {symbol}\n\
                 Confidence: {:.1}% (buy votes {}, sell votes {})\n\
                 Timeframe: {}\n\
                 Price: {:.dp$}\n\
                 Entry zone 1: {:.dp$}\n\
                 Entry zone 2: {:.dp$}\n\
                 Stop loss: {:.dp$} ({:.1} pips)\n",
                consensus.confidence,
                consensus.buy_votes,
                consensus.sell_votes,
                consensus.recommended_timeframe,
                plan.reference_price,
                plan.entry_zone_1,
                plan.entry_zone_2,
                plan.stop_loss,
                plan.risk_pips(),
            );
            for level in TargetLevel::ALL {
                text.push_str(&format!(
                    "Target {}: {:.dp$} ({:.1} pips, R:R 1:{:.2})\n",
                    level.number(),
                    plan.target(level),
                    plan.reward_pips(level),
                    plan.risk_reward_for(level),
                ));
            }
            text.push_str(&format!("Trade: {trade_id}"));
            text
        }
        TradeEvent::TargetHit {
            trade_id,
            symbol,
            target,
            price,
        } => format!(
            "{symbol}: target {} hit at {price}\nTrade: {trade_id}",
            target.number()
        ),
        TradeEvent::TradeClosed {
            trade_id,
            symbol,
            reason,
            price,
            pips,
        } => format!("{symbol} closed ({reason}) at {price}\nResult: {pips:+.1} pips\nTrade: {trade_id}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{CloseReason, ConsensusResult, PricePlan, SignalType, Timeframe};

    #[test]
    fn decimals_follow_pip_size() {
        assert_eq!(price_decimals(0.0001), 5);
        assert_eq!(price_decimals(0.01), 3);
        assert_eq!(price_decimals(0.1), 2);
        assert_eq!(price_decimals(1.0), 1);
        assert_eq!(price_decimals(0.0), 5);
    }

    #[test]
    fn signal_message_lists_every_level() {
        let plan = PricePlan::new(
            Direction::Buy,
            1.1,
            [1.0995, 1.0987],
            1.0966,
            [1.102, 1.1037, 1.1062],
            0.0001,
        );
        let event = TradeEvent::SignalGenerated {
            trade_id: "EURUSD_1700000000".into(),
            symbol: "EURUSD".into(),
            consensus: ConsensusResult {
                signal: SignalType::Buy,
                confidence: 95.0,
                buy_votes: 4,
                sell_votes: 0,
                average_strength: 50.0,
                recommended_timeframe: Timeframe::M15,
                timeframes_analyzed: 5,
            },
            plan,
        };
        let text = format_event(&event);
        assert!(text.starts_with("BUY EURUSD\n"));
        assert!(text.contains("Confidence: 95.0%"));
        assert!(text.contains("Timeframe: 15m"));
        assert!(text.contains("Entry zone 1: 1.09950"));
        assert!(text.contains("Stop loss: 1.09660 (29.0 pips)"));
        assert!(text.contains("Target 3: 1.10620"));
        assert!(text.ends_with("Trade: EURUSD_1700000000"));
    }

    #[test]
    fn close_message_shows_signed_pips() {
        let text = format_event(&TradeEvent::TradeClosed {
            trade_id: "X_1".into(),
            symbol: "XAUUSD".into(),
            reason: CloseReason::StopLoss,
            price: 2301.5,
            pips: -34.0,
        });
        assert_eq!(
            text,
            "XAUUSD closed (stop-loss) at 2301.5\nResult: -34.0 pips\nTrade: X_1"
        );
    }
}
