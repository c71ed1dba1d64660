use chrono::{DateTime, Utc};

use crate::mode::Rgb;

/// Platform-neutral rich message: the shape of a score notification.
///
/// `description` is a markdown subset (`**bold**`, `_italic_`, links); the
/// adapter renders it for its platform.
#[derive(Clone, Debug, PartialEq)]
pub struct Embed {
    pub title: String,
    pub url: Option<String>,
    pub description: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub color: Rgb,
    pub author: Option<EmbedAuthor>,
    pub thumbnail_url: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmbedAuthor {
    pub name: String,
    pub url: Option<String>,
    pub icon_url: Option<String>,
}

/// What a messenger can render; command replies adapt to it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MessagingCapabilities {
    /// Native reactions. Without them the acknowledgement emoji is folded
    /// into the reply text.
    pub supports_reactions: bool,
    /// Longest HTML body a single message may carry.
    pub max_message_len: usize,
}
