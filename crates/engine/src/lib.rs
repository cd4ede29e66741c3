pub mod binance;
pub mod notify;
pub mod retry;
pub mod scanner;
pub mod stats;
pub mod store;
pub mod supervisor;
pub mod trade;

pub use binance::BinanceFeed;
pub use notify::LogSink;
pub use retry::RetryPolicy;
pub use scanner::{Candidate, SignalScanner};
pub use stats::TradeStatistics;
pub use store::{MemoryTradeStore, TradeStore};
pub use supervisor::{
    Collaborators, Supervisor, SupervisorCommand, SupervisorConfig, SupervisorHandle, TickReport,
};
pub use trade::{format_duration, TradeLifecycle, Transition};
