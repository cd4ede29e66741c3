use common::{Error, PricePlan, Result, SignalType};
use tracing::debug;

use crate::SymbolClass;

/// Derives entry zones, stop and targets from a base distance scaled by
/// symbol class and consensus strength.
///
/// All offsets are multiples of the base distance, measured from the
/// current price (entry zones) or from the zones (stop, targets). For a
/// Sell every offset is mirrored.
#[derive(Debug, Clone)]
pub struct LevelCalculator {
    pub zone_1_offset: f64,
    pub zone_2_offset: f64,
    /// Beyond entry zone 2.
    pub stop_offset: f64,
    /// Beyond entry zone 1.
    pub target_offsets: [f64; 3],
}

impl Default for LevelCalculator {
    fn default() -> Self {
        Self {
            zone_1_offset: 0.3,
            zone_2_offset: 0.8,
            stop_offset: 1.2,
            target_offsets: [1.5, 2.5, 4.0],
        }
    }
}

/// `0.8 + strength/100 * 0.4`, i.e. 0.8 at strength 0 and 1.2 at 100.
pub fn volatility_multiplier(average_strength: f64) -> f64 {
    let strength = if average_strength.is_finite() {
        average_strength.clamp(0.0, 100.0)
    } else {
        0.0
    };
    0.8 + (strength / 100.0) * 0.4
}

/// Base distance in price units for a symbol class.
pub fn base_distance(class: SymbolClass, average_strength: f64) -> f64 {
    class.base_pips() * class.pip_size() * volatility_multiplier(average_strength)
}

impl LevelCalculator {
    /// Compute a plan for a Buy or Sell signal. Neutral signals fail with
    /// `NotTradable`.
    pub fn calculate(
        &self,
        price: f64,
        signal: SignalType,
        class: SymbolClass,
        average_strength: f64,
    ) -> Result<PricePlan> {
        let direction = signal.direction().ok_or(Error::NotTradable)?;
        if !price.is_finite() || price <= 0.0 {
            return Err(Error::InvalidPrice(price));
        }

        let distance = base_distance(class, average_strength);
        // Positive offsets point in the trade's favour.
        let favour = direction.sign();

        let entry_zone_1 = price - favour * self.zone_1_offset * distance;
        let entry_zone_2 = price - favour * self.zone_2_offset * distance;
        let stop_loss = entry_zone_2 - favour * self.stop_offset * distance;
        let targets = self
            .target_offsets
            .map(|offset| entry_zone_1 + favour * offset * distance);

        debug!(
            price,
            %direction,
            %class,
            distance,
            entry_zone_1,
            stop_loss,
            "Levels calculated"
        );

        Ok(PricePlan::new(
            direction,
            price,
            [entry_zone_1, entry_zone_2],
            stop_loss,
            targets,
            class.pip_size(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{Direction, TargetLevel};

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn eurusd_buy_scenario() {
        let plan = LevelCalculator::default()
            .calculate(1.10000, SignalType::Buy, SymbolClass::Forex, 80.0)
            .unwrap();

        let d = 15.0 * 0.0001 * 1.12;
        assert!(close(d, 0.00168));
        assert_eq!(plan.direction, Direction::Buy);
        assert!(close(plan.entry_zone_1, 1.10000 - 0.3 * d));
        assert!(close(plan.entry_zone_2, 1.10000 - 0.8 * d));
        assert!(close(plan.stop_loss, plan.entry_zone_2 - 1.2 * d));
        assert!(close(plan.target(TargetLevel::T1), plan.entry_zone_1 + 1.5 * d));
        assert!(close(plan.target(TargetLevel::T2), plan.entry_zone_1 + 2.5 * d));
        assert!(close(plan.target(TargetLevel::T3), plan.entry_zone_1 + 4.0 * d));

        assert!((plan.entry_zone_1 - 1.09950).abs() < 1e-5);
        assert!((plan.entry_zone_2 - 1.09866).abs() < 1e-5);
        assert!((plan.stop_loss - 1.09664).abs() < 1e-5);
        assert!((plan.target(TargetLevel::T1) - 1.10202).abs() < 1e-5);
        assert!((plan.target(TargetLevel::T2) - 1.10370).abs() < 1e-5);
        assert!((plan.target(TargetLevel::T3) - 1.10622).abs() < 1e-5);
    }

    #[test]
    fn sell_mirrors_buy() {
        let calc = LevelCalculator::default();
        let buy = calc.calculate(150.0, SignalType::Buy, SymbolClass::JpyPair, 50.0).unwrap();
        let sell = calc.calculate(150.0, SignalType::Sell, SymbolClass::JpyPair, 50.0).unwrap();

        assert!(close(150.0 - buy.entry_zone_1, sell.entry_zone_1 - 150.0));
        assert!(close(150.0 - buy.stop_loss, sell.stop_loss - 150.0));
        for level in TargetLevel::ALL {
            assert!(close(buy.target(level) - 150.0, 150.0 - sell.target(level)));
        }
        for (b, s) in buy.risk_reward.iter().zip(sell.risk_reward.iter()) {
            assert!((b - s).abs() < 1e-9);
        }
        assert!(sell.stop_loss > sell.entry_zone_2 && sell.entry_zone_2 > sell.entry_zone_1);
        assert!(sell.target(TargetLevel::T3) < sell.target(TargetLevel::T1));
    }

    #[test]
    fn neutral_is_not_tradable() {
        let err = LevelCalculator::default()
            .calculate(1.0, SignalType::Neutral, SymbolClass::Forex, 50.0)
            .unwrap_err();
        assert!(matches!(err, Error::NotTradable));
    }

    #[test]
    fn rejects_non_positive_price() {
        let calc = LevelCalculator::default();
        assert!(matches!(
            calc.calculate(0.0, SignalType::Buy, SymbolClass::Forex, 50.0),
            Err(Error::InvalidPrice(_))
        ));
        assert!(matches!(
            calc.calculate(f64::NAN, SignalType::Sell, SymbolClass::Forex, 50.0),
            Err(Error::InvalidPrice(_))
        ));
    }

    #[test]
    fn risk_reward_uses_zone_1_to_stop() {
        let plan = LevelCalculator::default()
            .calculate(30_000.0, SignalType::Buy, SymbolClass::Bitcoin, 100.0)
            .unwrap();
        // risk = (0.8 - 0.3 + 1.2) d = 1.7 d
        assert!(close(plan.risk_reward[0], 1.5 / 1.7));
        assert!(close(plan.risk_reward[1], 2.5 / 1.7));
        assert!(close(plan.risk_reward[2], 4.0 / 1.7));
        // 500 pips * 1.2 at $1 per pip
        assert!(close(plan.risk_pips(), 1.7 * 600.0));
    }

    #[test]
    fn multiplier_is_clamped() {
        assert!(close(volatility_multiplier(-10.0), 0.8));
        assert!(close(volatility_multiplier(250.0), 1.2));
        assert!(close(volatility_multiplier(f64::NAN), 0.8));
    }

    #[test]
    fn degenerate_calculator_reports_zero_ratios() {
        let calc = LevelCalculator {
            zone_1_offset: 0.0,
            zone_2_offset: 0.0,
            stop_offset: 0.0,
            target_offsets: [1.0, 2.0, 3.0],
        };
        let plan = calc.calculate(1.0, SignalType::Buy, SymbolClass::Forex, 50.0).unwrap();
        assert_eq!(plan.risk_reward, [0.0; 3]);
    }
}
