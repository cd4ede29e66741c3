use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use common::{Error, Result};

use crate::TradeLifecycle;

/// Durable home of the trade collection. `save_all` replaces whatever was
/// stored before with the given collection.
#[async_trait]
pub trait TradeStore: Send + Sync {
    async fn save_all(&self, trades: &[TradeLifecycle]) -> Result<()>;
    async fn load_all(&self) -> Result<Vec<TradeLifecycle>>;
}

/// In-process store. Can be told to fail the next N saves or loads.
#[derive(Default)]
pub struct MemoryTradeStore {
    trades: RwLock<Vec<TradeLifecycle>>,
    fail_saves: AtomicU32,
    fail_loads: AtomicU32,
    saves: AtomicU32,
}

impl MemoryTradeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_trades(trades: Vec<TradeLifecycle>) -> Self {
        Self {
            trades: RwLock::new(trades),
            ..Self::default()
        }
    }

    pub fn fail_next_saves(&self, count: u32) {
        self.fail_saves.store(count, Ordering::SeqCst);
    }

    pub fn fail_next_loads(&self, count: u32) {
        self.fail_loads.store(count, Ordering::SeqCst);
    }

    /// Successful saves so far.
    pub fn save_count(&self) -> u32 {
        self.saves.load(Ordering::SeqCst)
    }

    pub async fn stored(&self) -> Vec<TradeLifecycle> {
        self.trades.read().await.clone()
    }
}

#[async_trait]
impl TradeStore for MemoryTradeStore {
    async fn save_all(&self, trades: &[TradeLifecycle]) -> Result<()> {
        if take_failure(&self.fail_saves) {
            return Err(Error::Persistence("injected save failure".into()));
        }
        *self.trades.write().await = trades.to_vec();
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn load_all(&self) -> Result<Vec<TradeLifecycle>> {
        if take_failure(&self.fail_loads) {
            return Err(Error::Persistence("injected load failure".into()));
        }
        Ok(self.trades.read().await.clone())
    }
}

fn take_failure(remaining: &AtomicU32) -> bool {
    remaining
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}
