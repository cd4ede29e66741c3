use chrono::Utc;
use proptest::prelude::*;

use common::{Direction, PricePlan, TradeEvent, TradeStatus};
use engine::TradeLifecycle;

fn plan(direction: Direction) -> PricePlan {
    match direction {
        Direction::Buy => {
            PricePlan::new(direction, 101.0, [100.0, 95.0], 90.0, [110.0, 120.0, 130.0], 1.0)
        }
        Direction::Sell => {
            PricePlan::new(direction, 99.0, [100.0, 105.0], 110.0, [90.0, 80.0, 70.0], 1.0)
        }
    }
}

fn direction() -> impl Strategy<Value = Direction> {
    prop_oneof![Just(Direction::Buy), Just(Direction::Sell)]
}

proptest! {
    /// The stop only ever moves in the trade's favour, targets are taken in
    /// order, and nothing happens after the close.
    #[test]
    fn stop_is_monotonic_and_closed_is_final(
        direction in direction(),
        prices in prop::collection::vec(60.0f64..140.0, 1..60),
        trailing in any::<bool>(),
    ) {
        let mut trade = TradeLifecycle::open("TEST", plan(direction), 90.0, Utc::now());
        let mut closed_seen = false;

        for price in prices {
            let before = trade.clone();
            let transition = trade.on_price(price, trailing, Utc::now());

            if closed_seen {
                prop_assert!(transition.is_noop());
                prop_assert_eq!(&trade, &before);
                continue;
            }

            match direction {
                Direction::Buy => prop_assert!(trade.stop_loss >= before.stop_loss),
                Direction::Sell => prop_assert!(trade.stop_loss <= before.stop_loss),
            }
            prop_assert!(trade.triggered.is_superset(&before.triggered));
            // T2 never without T1, T3 never without T2.
            let levels: Vec<u8> = trade.triggered.iter().map(|t| t.number()).collect();
            prop_assert_eq!(levels.clone(), (1..=levels.len() as u8).collect::<Vec<_>>());

            let closes = transition
                .events
                .iter()
                .filter(|e| matches!(e, TradeEvent::TradeClosed { .. }))
                .count();
            prop_assert!(closes <= 1);
            if trade.status == TradeStatus::Closed {
                prop_assert_eq!(closes, 1);
                closed_seen = true;
            }
        }
    }
}
