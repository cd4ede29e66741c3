pub mod analyzer;
pub mod config;
pub mod consensus;
pub mod indicators;

pub use analyzer::TimeframeAnalyzer;
pub use config::SignalFileConfig;
pub use consensus::{mean_strength, ConsensusEngine};
