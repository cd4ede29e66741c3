pub mod config;
pub mod error;
pub mod providers;
pub mod types;

pub use config::{Config, DataSource, StoreKind};
pub use error::{Error, Result};
pub use providers::{CurrentPriceProvider, NotificationSink, PriceSeriesProvider};
pub use types::*;
