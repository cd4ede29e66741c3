use async_trait::async_trait;
use teloxide::prelude::*;
use tracing::{debug, info};

use common::{Audience, Error, NotificationSink, Result, TradeEvent};

use crate::format_event;

/// Delivers trade events as Telegram messages to users and groups.
pub struct TelegramSink {
    bot: Bot,
}

impl TelegramSink {
    pub fn new(token: impl Into<String>) -> Self {
        info!("Telegram notifications enabled");
        Self {
            bot: Bot::new(token),
        }
    }
}

#[async_trait]
impl NotificationSink for TelegramSink {
    async fn publish(&self, audience: &Audience, event: &TradeEvent) -> Result<()> {
        let chat_id = ChatId(audience.chat_id());
        self.bot
            .send_message(chat_id, format_event(event))
            .await
            .map_err(|e| Error::Notification(e.to_string()))?;
        debug!(chat_id = ?chat_id, trade_id = event.trade_id(), "Telegram message sent");
        Ok(())
    }
}
