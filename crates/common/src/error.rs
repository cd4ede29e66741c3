use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Insufficient data: need {required} bars, got {available}")]
    InsufficientData { required: usize, available: usize },

    #[error("Consensus is neutral, no levels can be computed")]
    NotTradable,

    #[error("Invalid price: {0}")]
    InvalidPrice(f64),

    #[error("No data for {0}")]
    NoData(String),

    #[error("Stale data for {0}")]
    Stale(String),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Price fetch failed: {0}")]
    PriceFetch(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Notification error: {0}")]
    Notification(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Trade not found: {0}")]
    TradeNotFound(String),

    #[error("Trade already closed: {0}")]
    TradeClosed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// True for failures of the data provider that should only skip the
    /// current tick for the affected symbol.
    pub fn is_fetch_failure(&self) -> bool {
        matches!(
            self,
            Error::NoData(_)
                | Error::Stale(_)
                | Error::Timeout(_)
                | Error::PriceFetch(_)
                | Error::Http(_)
        )
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
