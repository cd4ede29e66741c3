//! Offline collaborators: a scripted price feed and a sink that records
//! what it is asked to publish. Used for paper runs and tests.

mod feed;
mod sink;

pub use feed::{synthetic_candles, PaperFeed, PaperFeedFile, PaperSeries};
pub use sink::RecordingSink;
