use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info};

use common::Result;
use engine::{TradeLifecycle, TradeStore};

/// Trades as a pretty-printed JSON array in one file.
///
/// Saves go to a sibling temp file that is then renamed over the target,
/// so a crash mid-write leaves the previous collection intact.
pub struct JsonFileTradeStore {
    path: PathBuf,
}

impl JsonFileTradeStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl TradeStore for JsonFileTradeStore {
    async fn save_all(&self, trades: &[TradeLifecycle]) -> Result<()> {
        let body = serde_json::to_vec_pretty(trades)?;
        let temp = self.temp_path();
        tokio::fs::write(&temp, body).await?;
        tokio::fs::rename(&temp, &self.path).await?;
        debug!(path = %self.path.display(), trades = trades.len(), "Trades saved");
        Ok(())
    }

    async fn load_all(&self) -> Result<Vec<TradeLifecycle>> {
        if !tokio::fs::try_exists(&self.path).await? {
            info!(path = %self.path.display(), "No trade file yet, starting empty");
            return Ok(Vec::new());
        }
        let body = tokio::fs::read(&self.path).await?;
        Ok(serde_json::from_slice(&body)?)
    }
}
