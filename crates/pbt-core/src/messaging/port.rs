use async_trait::async_trait;

use crate::{
    domain::{ChatId, MessageRef},
    messaging::types::{Embed, MessagingCapabilities},
    Result,
};

/// Outbound chat port used by the dispatcher and the command handlers.
///
/// Adapters declare what they can render through [`MessagingCapabilities`];
/// callers never branch on the concrete platform.
#[async_trait]
pub trait MessagingPort: Send + Sync {
    fn capabilities(&self) -> MessagingCapabilities;

    async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<MessageRef>;

    /// Reply to an existing message (command acknowledgements).
    async fn reply_html(&self, to: MessageRef, html: &str) -> Result<MessageRef>;

    /// Deliver a rich notification.
    async fn send_embed(&self, chat_id: ChatId, embed: &Embed) -> Result<MessageRef>;

    /// Mark a message with a single emoji (✅ / ❌).
    async fn set_reaction(&self, msg: MessageRef, emoji: &str) -> Result<()>;
}
