use teloxide::prelude::*;
use teloxide::types::{MessageId, ParseMode};
use teloxide::{ApiError, RequestError};
use tokio::time::{Duration, sleep};

use super::{AlertRequest, AlertSink, DispatchError, format_power_alert};

const MAX_ATTEMPTS: u32 = 3;
const INITIAL_RETRY_DELAY: Duration = Duration::from_secs(1);

#[derive(Clone)]
pub struct TelegramAlertSink {
    bot: Bot,
}

impl TelegramAlertSink {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    async fn send_with_retry(&self, chat_id: ChatId, text: &str) -> Result<Message, DispatchError> {
        let mut delay = INITIAL_RETRY_DELAY;
        let mut attempt = 1;

        loop {
            match self
                .bot
                .send_message(chat_id, text.to_string())
                .parse_mode(ParseMode::Html)
                .await
            {
                Ok(message) => return Ok(message),
                Err(error) if attempt < MAX_ATTEMPTS => {
                    log::warn!(
                        "telegram_send_retry chat_id={} attempt={} delay_secs={} error={}",
                        chat_id.0,
                        attempt,
                        delay.as_secs(),
                        error
                    );
                    sleep(delay).await;
                    delay *= 2;
                    attempt += 1;
                }
                Err(error) => return Err(DispatchError::Telegram(error)),
            }
        }
    }
}

impl AlertSink for TelegramAlertSink {
    async fn send_alert(&self, request: &AlertRequest) -> Result<(), DispatchError> {
        if request.chat_id == 0 {
            return Err(DispatchError::Rejected(format!(
                "site {} has no chat configured",
                request.site_id
            )));
        }
        let message = format_power_alert(request);
        self.send_with_retry(ChatId(request.chat_id), &message).await?;
        Ok(())
    }

    async fn send_html(&self, chat_id: i64, text: &str) -> Result<(), DispatchError> {
        self.send_with_retry(ChatId(chat_id), text).await?;
        Ok(())
    }

    async fn post_pinned(&self, chat_id: i64, text: &str) -> Result<i32, DispatchError> {
        let message = self.send_with_retry(ChatId(chat_id), text).await?;
        self.bot
            .pin_chat_message(ChatId(chat_id), message.id)
            .disable_notification(true)
            .await?;
        Ok(message.id.0)
    }

    async fn edit_html(&self, chat_id: i64, message_id: i32, text: &str) -> Result<(), DispatchError> {
        match self
            .bot
            .edit_message_text(ChatId(chat_id), MessageId(message_id), text.to_string())
            .parse_mode(ParseMode::Html)
            .await
        {
            Ok(_) | Err(RequestError::Api(ApiError::MessageNotModified)) => Ok(()),
            Err(error) => Err(DispatchError::Telegram(error)),
        }
    }

    async fn unpin(&self, chat_id: i64, message_id: i32) -> Result<(), DispatchError> {
        self.bot
            .unpin_chat_message(ChatId(chat_id))
            .message_id(MessageId(message_id))
            .await?;
        Ok(())
    }
}
