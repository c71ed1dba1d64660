//! Telegram adapter (teloxide).
//!
//! Implements the `pbt-core` MessagingPort over the Telegram Bot API and hosts
//! the command router.

use async_trait::async_trait;

use teloxide::{
    prelude::*,
    types::{InputFile, ParseMode},
};

use tokio::time::sleep;
use tracing::warn;

pub mod handlers;
pub mod router;

use pbt_core::{
    domain::{ChatId, MessageId, MessageRef},
    errors::Error,
    formatting::embed_to_html_within,
    messaging::{
        port::MessagingPort,
        types::{Embed, MessagingCapabilities},
    },
    Result,
};

const MAX_MESSAGE_LEN: usize = 4096;
const MAX_CAPTION_LEN: usize = 1024;

#[derive(Clone)]
pub struct TelegramMessenger {
    bot: Bot,
    safe_limit: usize,
}

impl TelegramMessenger {
    pub fn new(bot: Bot, safe_limit: usize) -> Self {
        Self {
            bot,
            safe_limit: safe_limit.clamp(1, MAX_MESSAGE_LEN),
        }
    }

    fn tg_chat(chat_id: ChatId) -> teloxide::types::ChatId {
        teloxide::types::ChatId(chat_id.0)
    }

    fn tg_msg_id(message_id: MessageId) -> teloxide::types::MessageId {
        teloxide::types::MessageId(message_id.0)
    }

    fn map_err(e: teloxide::RequestError) -> Error {
        Error::Dispatch(format!("telegram error: {e}"))
    }

    fn msg_ref(chat_id: ChatId, msg: &Message) -> MessageRef {
        MessageRef {
            chat_id,
            message_id: MessageId(msg.id.0),
        }
    }

    /// Retry once on Telegram's flood-control `RetryAfter`.
    async fn with_retry<T, Fut>(&self, mut op: impl FnMut() -> Fut) -> Result<T>
    where
        Fut: std::future::IntoFuture<Output = std::result::Result<T, teloxide::RequestError>>,
        Fut::IntoFuture: Send,
    {
        const MAX_RETRIES: usize = 1;
        let mut attempts = 0usize;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) => match e {
                    teloxide::RequestError::RetryAfter(d) if attempts < MAX_RETRIES => {
                        attempts += 1;
                        sleep(d).await;
                        continue;
                    }
                    other => return Err(Self::map_err(other)),
                },
            }
        }
    }

    async fn send_photo_embed(
        &self,
        chat_id: ChatId,
        thumbnail: &str,
        caption: &str,
    ) -> Result<MessageRef> {
        let url = reqwest::Url::parse(thumbnail)
            .map_err(|e| Error::Dispatch(format!("bad thumbnail url {thumbnail}: {e}")))?;
        let msg = self
            .with_retry(|| {
                self.bot
                    .send_photo(Self::tg_chat(chat_id), InputFile::url(url.clone()))
                    .caption(caption.to_string())
                    .parse_mode(ParseMode::Html)
            })
            .await?;
        Ok(Self::msg_ref(chat_id, &msg))
    }
}

#[async_trait]
impl MessagingPort for TelegramMessenger {
    fn capabilities(&self) -> MessagingCapabilities {
        MessagingCapabilities {
            // Bot API 7.0 reactions are not available in teloxide 0.12.
            supports_reactions: false,
            max_message_len: self.safe_limit,
        }
    }

    async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<MessageRef> {
        let msg = self
            .with_retry(|| {
                self.bot
                    .send_message(Self::tg_chat(chat_id), html.to_string())
                    .parse_mode(ParseMode::Html)
            })
            .await?;
        Ok(Self::msg_ref(chat_id, &msg))
    }

    async fn reply_html(&self, to: MessageRef, html: &str) -> Result<MessageRef> {
        let msg = self
            .with_retry(|| {
                self.bot
                    .send_message(Self::tg_chat(to.chat_id), html.to_string())
                    .parse_mode(ParseMode::Html)
                    .reply_to_message_id(Self::tg_msg_id(to.message_id))
            })
            .await?;
        Ok(Self::msg_ref(to.chat_id, &msg))
    }

    /// Thumbnail embeds go out as a photo with an HTML caption; if the caption
    /// is too long or the photo is rejected, as a plain message.
    async fn send_embed(&self, chat_id: ChatId, embed: &Embed) -> Result<MessageRef> {
        if let Some(thumb) = embed.thumbnail_url.as_deref() {
            if let Some(caption) = embed_to_html_within(embed, MAX_CAPTION_LEN) {
                match self.send_photo_embed(chat_id, thumb, &caption).await {
                    Ok(m) => return Ok(m),
                    Err(e) => {
                        warn!(chat_id = chat_id.0, error = %e, "Photo embed failed, sending as text")
                    }
                }
            }
        }

        let html = embed_to_html_within(embed, self.safe_limit)
            .ok_or_else(|| Error::Dispatch("embed too large for one message".to_string()))?;
        self.send_html(chat_id, &html).await
    }

    /// Answered as a reply carrying the emoji.
    async fn set_reaction(&self, msg: MessageRef, emoji: &str) -> Result<()> {
        self.with_retry(|| {
            self.bot
                .send_message(Self::tg_chat(msg.chat_id), emoji.to_string())
                .reply_to_message_id(Self::tg_msg_id(msg.message_id))
        })
        .await?;
        Ok(())
    }
}
