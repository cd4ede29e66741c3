//! Durable `TradeStore` implementations.

mod json;
mod sqlite;

pub use json::JsonFileTradeStore;
pub use sqlite::SqliteTradeStore;
