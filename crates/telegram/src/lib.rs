mod format;
mod sink;

pub use format::{format_event, price_decimals};
pub use sink::TelegramSink;
