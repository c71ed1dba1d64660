use std::sync::Arc;

use teloxide::{prelude::*, types::Message};
use tracing::{info, warn};

use pbt_core::{
    commands::{self, Command, CommandError},
    context::TrackedPlayer,
    domain::{ChatId, MessageId, MessageRef, PlayerId},
    errors::{Error, ProviderError},
    formatting::{convert_markdown_to_html, escape_html},
    messaging::types::MessagingCapabilities,
    mode::{group_thousands, GameMode},
};

use crate::router::AppState;

const OK: &str = "✅";
const FAILED: &str = "❌";

/// What to answer with: the reaction and an optional HTML body.
#[derive(Debug, PartialEq)]
enum Reply {
    Done(Option<String>),
    Failed(String),
}

pub(super) async fn handle_command(msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(text) = msg.text() else {
        return Ok(());
    };
    let Some(parsed) = commands::parse(text) else {
        return Ok(());
    };

    let chat = ChatId(msg.chat.id.0);
    let origin = MessageRef {
        chat_id: chat,
        message_id: MessageId(msg.id.0),
    };

    let caps = state.messenger.capabilities();
    let reply = match parsed {
        Ok(cmd) => run(cmd, chat, &state, caps).await,
        Err(e) => Reply::Failed(command_error_reply(&e)),
    };

    let (reaction, body) = acknowledgement(reply, caps);
    if let Some(emoji) = reaction {
        if let Err(e) = state.messenger.set_reaction(origin, emoji).await {
            warn!(chat_id = chat.0, error = %e, "Failed to acknowledge command");
        }
    }
    if let Some(body) = body {
        if let Err(e) = state.messenger.reply_html(origin, &body).await {
            warn!(chat_id = chat.0, error = %e, "Failed to send command reply");
        }
    }
    Ok(())
}

/// Reaction to set and reply body to send. Platforms without reactions get
/// the emoji at the start of the reply instead.
fn acknowledgement(
    reply: Reply,
    caps: MessagingCapabilities,
) -> (Option<&'static str>, Option<String>) {
    let (emoji, body) = match reply {
        Reply::Done(body) => (OK, body),
        Reply::Failed(body) => (FAILED, Some(body)),
    };
    if caps.supports_reactions {
        return (Some(emoji), body);
    }
    let text = match body {
        Some(body) => format!("{emoji} {body}"),
        None => emoji.to_string(),
    };
    (None, Some(text))
}

async fn run(cmd: Command, chat: ChatId, state: &AppState, caps: MessagingCapabilities) -> Reply {
    let ctx = &state.ctx;
    match cmd {
        Command::Track { mode, username } => match ctx.track(chat, mode, &username).await {
            Ok(player) => Reply::Done(Some(player_reply("Now tracking", &player))),
            Err(e) => Reply::Failed(error_reply(&e)),
        },
        Command::TrackStop { mode, username } => match ctx.untrack(chat, mode, &username).await {
            Ok(player) => Reply::Done(Some(player_reply("Removed", &player))),
            Err(e) => Reply::Failed(error_reply(&e)),
        },
        Command::Embed(embed) => match state.messenger.send_embed(chat, &embed).await {
            Ok(_) => {
                info!(chat_id = chat.0, title = %embed.title, "Posted operator embed");
                Reply::Done(None)
            }
            Err(e) => Reply::Failed(error_reply(&e)),
        },
        Command::Tracked => {
            let entries = ctx.tracked_in(chat).await;
            // Leave room for the acknowledgement emoji.
            let budget = caps.max_message_len.saturating_sub(8);
            Reply::Done(Some(tracked_reply(&entries, budget)))
        }
        Command::Help => Reply::Done(Some(convert_markdown_to_html(&commands::help_text()))),
    }
}

fn player_reply(verb: &str, player: &TrackedPlayer) -> String {
    let name = escape_html(&player.username);
    match player.global_rank {
        Some(rank) => format!("{verb} {name} #{}.", group_thousands(rank as f64, 0)),
        None => format!("{verb} {name}."),
    }
}

/// Lines past `max_chars` are summarized as a count.
fn tracked_reply(entries: &[(PlayerId, GameMode)], max_chars: usize) -> String {
    if entries.is_empty() {
        return "Nothing is tracked in this chat.".to_string();
    }
    let mut text = format!("Tracked in this chat ({}):", entries.len());
    for (i, (player, mode)) in entries.iter().enumerate() {
        let line = format!("\n• {}: <code>{player}</code>", mode.display_name());
        let remaining = entries.len() - i;
        let tail = format!("\n… and {remaining} more");
        let tail_room = if remaining > 1 { tail.chars().count() } else { 0 };
        if text.chars().count() + line.chars().count() + tail_room > max_chars {
            text.push_str(&tail);
            break;
        }
        text.push_str(&line);
    }
    text
}

fn command_error_reply(e: &CommandError) -> String {
    match e {
        CommandError::Usage(usage) => convert_markdown_to_html(usage),
        CommandError::InvalidEmbed(_) => format!(
            "{}\n{}",
            escape_html(&e.to_string()),
            convert_markdown_to_html(&commands::embed_usage())
        ),
    }
}

fn error_reply(e: &Error) -> String {
    match e {
        Error::Provider(ProviderError::UserNotFound(_)) => {
            "This user could not be found.".to_string()
        }
        Error::Provider(ProviderError::UnsupportedMode(mode)) => {
            format!("{} is not available on this bot.", mode.display_name())
        }
        Error::NotSubscribed(name) => {
            format!("{} is not tracked in this chat.", escape_html(name))
        }
        other => escape_html(&other.to_string()),
    }
}
