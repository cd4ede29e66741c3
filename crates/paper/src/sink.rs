use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use common::{Audience, Error, NotificationSink, Result, TradeEvent};

/// Keeps every published event in memory.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<(Audience, TradeEvent)>>,
    failing: AtomicBool,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every publish from now on (nothing is recorded).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub async fn events(&self) -> Vec<(Audience, TradeEvent)> {
        self.events.lock().await.clone()
    }

    /// Wait up to a second for at least `count` events to arrive.
    /// Publishing is fire-and-forget, so events land asynchronously.
    pub async fn wait_for(&self, count: usize) -> Vec<(Audience, TradeEvent)> {
        for _ in 0..100 {
            let events = self.events().await;
            if events.len() >= count {
                return events;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.events().await
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn publish(&self, audience: &Audience, event: &TradeEvent) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::Notification("recording sink set to fail".into()));
        }
        self.events.lock().await.push((*audience, event.clone()));
        Ok(())
    }
}
