use std::{future::Future, path::Path, time::Duration};

use {
    async_trait::async_trait,
    reelbot_store::NewForcedChannel,
    teloxide::{
        ApiError, RequestError,
        payloads::{
            EditMessageTextSetters, SendDocumentSetters, SendMessageSetters, SendPhotoSetters,
            SendVideoSetters,
        },
        prelude::*,
        types::{ChatId, InlineKeyboardMarkup, InputFile, MessageId, ParseMode, Recipient, UserId},
    },
    tracing::{debug, info, warn},
};

use crate::{Result, admin::ChannelSpec};

/// Outbound side of the chat platform, as seen by the pipeline.
///
/// Text is always sent in HTML parse mode; callers escape dynamic content.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send_text(
        &self,
        chat_id: ChatId,
        text: &str,
        menu: Option<InlineKeyboardMarkup>,
    ) -> Result<MessageId>;

    async fn edit_text(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        text: &str,
        menu: Option<InlineKeyboardMarkup>,
    ) -> Result<()>;

    async fn delete_message(&self, chat_id: ChatId, message_id: MessageId) -> Result<()>;

    /// Upload a local file as a document attachment.
    async fn send_document(&self, chat_id: ChatId, path: &Path, caption: &str) -> Result<()>;

    /// Re-send an already uploaded photo by its Telegram file id.
    async fn send_photo(&self, chat_id: ChatId, file_id: &str, caption: Option<&str>)
    -> Result<()>;

    /// Re-send an already uploaded video by its Telegram file id.
    async fn send_video(&self, chat_id: ChatId, file_id: &str, caption: Option<&str>)
    -> Result<()>;

    async fn answer_callback(&self, callback_id: &str) -> Result<()>;

    /// Whether the user is currently a member of the channel.
    async fn is_member(&self, channel_id: ChatId, user_id: UserId) -> Result<bool>;

    /// Look up a channel's numeric id, handle and title.
    async fn resolve_channel(&self, spec: &ChannelSpec) -> Result<NewForcedChannel>;
}

const TELEGRAM_RETRY_AFTER_MAX_RETRIES: usize = 4;

/// [`ChatTransport`] backed by the Telegram Bot API.
#[derive(Clone)]
pub struct TelegramOutbound {
    bot: Bot,
}

impl TelegramOutbound {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    async fn run_telegram_request_with_retry<T, F, Fut>(
        &self,
        chat_id: ChatId,
        operation: &'static str,
        mut request: F,
    ) -> std::result::Result<T, RequestError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, RequestError>>,
    {
        let mut retries = 0usize;

        loop {
            match request().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    let Some(wait) = retry_after_duration(&err) else {
                        return Err(err);
                    };

                    if retries >= TELEGRAM_RETRY_AFTER_MAX_RETRIES {
                        warn!(
                            chat_id = chat_id.0,
                            operation,
                            retries,
                            retry_after_secs = wait.as_secs(),
                            "telegram rate limit persisted after retries"
                        );
                        return Err(err);
                    }

                    retries += 1;
                    warn!(
                        chat_id = chat_id.0,
                        operation,
                        retries,
                        max_retries = TELEGRAM_RETRY_AFTER_MAX_RETRIES,
                        retry_after_secs = wait.as_secs(),
                        "telegram rate limited, waiting before retry"
                    );
                    tokio::time::sleep(wait).await;
                },
            }
        }
    }
}

fn retry_after_duration(error: &RequestError) -> Option<Duration> {
    match error {
        RequestError::RetryAfter(wait) => Some(wait.duration()),
        _ => None,
    }
}

fn is_message_not_modified_error(error: &RequestError) -> bool {
    matches!(error, RequestError::Api(ApiError::MessageNotModified))
}

#[async_trait]
impl ChatTransport for TelegramOutbound {
    async fn send_text(
        &self,
        chat_id: ChatId,
        text: &str,
        menu: Option<InlineKeyboardMarkup>,
    ) -> Result<MessageId> {
        let message = self
            .run_telegram_request_with_retry(chat_id, "send message", || {
                let mut req = self
                    .bot
                    .send_message(chat_id, text)
                    .parse_mode(ParseMode::Html);
                if let Some(ref menu) = menu {
                    req = req.reply_markup(menu.clone());
                }
                async move { req.await }
            })
            .await?;
        debug!(chat_id = chat_id.0, text_len = text.len(), "telegram text sent");
        Ok(message.id)
    }

    async fn edit_text(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        text: &str,
        menu: Option<InlineKeyboardMarkup>,
    ) -> Result<()> {
        let result = self
            .run_telegram_request_with_retry(chat_id, "edit message", || {
                let mut req = self
                    .bot
                    .edit_message_text(chat_id, message_id, text)
                    .parse_mode(ParseMode::Html);
                if let Some(ref menu) = menu {
                    req = req.reply_markup(menu.clone());
                }
                async move { req.await }
            })
            .await;
        match result {
            Ok(_) => Ok(()),
            Err(e) if is_message_not_modified_error(&e) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_message(&self, chat_id: ChatId, message_id: MessageId) -> Result<()> {
        self.run_telegram_request_with_retry(chat_id, "delete message", || {
            let req = self.bot.delete_message(chat_id, message_id);
            async move { req.await }
        })
        .await?;
        Ok(())
    }

    async fn send_document(&self, chat_id: ChatId, path: &Path, caption: &str) -> Result<()> {
        self.run_telegram_request_with_retry(chat_id, "send document", || {
            let req = self
                .bot
                .send_document(chat_id, InputFile::file(path))
                .caption(caption);
            async move { req.await }
        })
        .await?;
        info!(
            chat_id = chat_id.0,
            path = %path.display(),
            "telegram outbound file sent as document"
        );
        Ok(())
    }

    async fn send_photo(
        &self,
        chat_id: ChatId,
        file_id: &str,
        caption: Option<&str>,
    ) -> Result<()> {
        self.run_telegram_request_with_retry(chat_id, "send photo", || {
            let mut req = self.bot.send_photo(chat_id, InputFile::file_id(file_id));
            if let Some(caption) = caption {
                req = req.caption(caption);
            }
            async move { req.await }
        })
        .await?;
        Ok(())
    }

    async fn send_video(
        &self,
        chat_id: ChatId,
        file_id: &str,
        caption: Option<&str>,
    ) -> Result<()> {
        self.run_telegram_request_with_retry(chat_id, "send video", || {
            let mut req = self.bot.send_video(chat_id, InputFile::file_id(file_id));
            if let Some(caption) = caption {
                req = req.caption(caption);
            }
            async move { req.await }
        })
        .await?;
        Ok(())
    }

    async fn answer_callback(&self, callback_id: &str) -> Result<()> {
        self.bot.answer_callback_query(callback_id).await?;
        Ok(())
    }

    async fn is_member(&self, channel_id: ChatId, user_id: UserId) -> Result<bool> {
        let member = self.bot.get_chat_member(channel_id, user_id).await?;
        Ok(member.kind.is_present())
    }

    async fn resolve_channel(&self, spec: &ChannelSpec) -> Result<NewForcedChannel> {
        let recipient = match spec {
            ChannelSpec::Handle(handle) => Recipient::ChannelUsername(handle.clone()),
            ChannelSpec::Id(id) => Recipient::Id(ChatId(*id)),
        };
        let chat = self.bot.get_chat(recipient).await?;
        let channel_username = chat.username().map(|u| format!("@{u}"));
        let channel_title = chat
            .title()
            .map(str::to_string)
            .or_else(|| channel_username.clone())
            .unwrap_or_else(|| chat.id.0.to_string());
        Ok(NewForcedChannel {
            channel_id: chat.id.0,
            channel_username,
            channel_title,
        })
    }
}
