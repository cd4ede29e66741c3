pub mod calculator;
pub mod symbol;

pub use calculator::{base_distance, volatility_multiplier, LevelCalculator};
pub use symbol::SymbolClass;
