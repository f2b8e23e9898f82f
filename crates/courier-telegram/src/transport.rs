use async_trait::async_trait;
use courier_common::ChatId;
use courier_engine::{ChatTransport, EditOutcome, MessageHandle, TextFormat, TransportError};
use teloxide::payloads::{EditMessageTextSetters, SendMessageSetters};
use teloxide::requests::Requester;
use teloxide::types::{ChatAction, ChatId as TgChatId, MessageId, ParseMode};
use teloxide::{ApiError, Bot, RequestError};

use crate::fmt::to_telegram_markdown;

/// Telegram implementation of the engine's transport capability.
///
/// Markdown payloads are converted to MarkdownV2 here; the engine decides
/// when to fall back to plain text.
pub struct TelegramTransport {
    bot: Bot,
}

impl TelegramTransport {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl ChatTransport for TelegramTransport {
    async fn send(
        &self,
        chat: ChatId,
        text: &str,
        format: TextFormat,
    ) -> Result<MessageHandle, TransportError> {
        let chat = TgChatId(chat.0);
        let sent = match format {
            TextFormat::Markdown => {
                self.bot
                    .send_message(chat, to_telegram_markdown(text))
                    .parse_mode(ParseMode::MarkdownV2)
                    .await
            }
            TextFormat::Plain => self.bot.send_message(chat, text).await,
        }
        .map_err(classify)?;
        Ok(MessageHandle(i64::from(sent.id.0)))
    }

    async fn edit(
        &self,
        chat: ChatId,
        handle: MessageHandle,
        text: &str,
        format: TextFormat,
    ) -> Result<EditOutcome, TransportError> {
        let chat = TgChatId(chat.0);
        let message = MessageId(handle.0 as i32);
        let result = match format {
            TextFormat::Markdown => {
                self.bot
                    .edit_message_text(chat, message, to_telegram_markdown(text))
                    .parse_mode(ParseMode::MarkdownV2)
                    .await
            }
            TextFormat::Plain => self.bot.edit_message_text(chat, message, text).await,
        };
        match result {
            Ok(_) => Ok(EditOutcome::Edited),
            Err(RequestError::Api(ApiError::MessageNotModified)) => Ok(EditOutcome::NotModified),
            Err(e) => Err(classify(e)),
        }
    }

    async fn notify_typing(&self, chat: ChatId) -> Result<(), TransportError> {
        self.bot
            .send_chat_action(TgChatId(chat.0), ChatAction::Typing)
            .await
            .map_err(classify)?;
        Ok(())
    }
}

/// API-level refusals are worth retrying with different formatting;
/// anything else is a hard failure.
fn classify(err: RequestError) -> TransportError {
    match err {
        RequestError::Api(api) => TransportError::Rejected(api.to_string()),
        other => TransportError::Failed(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_errors_classify_as_rejected() {
        let err = classify(RequestError::Api(ApiError::BotBlocked));
        assert!(matches!(err, TransportError::Rejected(_)));
    }
}
