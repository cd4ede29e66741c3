use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use common::{Audience, NotificationSink, Result, TradeEvent};

/// Sink that only writes events to the log. Used when no chat transport
/// is configured.
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn publish(&self, audience: &Audience, event: &TradeEvent) -> Result<()> {
        info!(
            audience = ?audience,
            trade_id = event.trade_id(),
            symbol = event.symbol(),
            event = ?event,
            "Notification"
        );
        Ok(())
    }
}

/// Fire-and-forget publish of one event to every audience. Failures are
/// logged and never reach the caller.
pub fn dispatch(sink: &Arc<dyn NotificationSink>, audiences: &[Audience], event: &TradeEvent) {
    for audience in audiences {
        let sink = sink.clone();
        let audience = *audience;
        let event = event.clone();
        tokio::spawn(async move {
            if let Err(e) = sink.publish(&audience, &event).await {
                warn!(
                    audience = ?audience,
                    trade_id = event.trade_id(),
                    error = %e,
                    "Failed to deliver notification"
                );
            }
        });
    }
}
