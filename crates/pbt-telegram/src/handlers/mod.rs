//! Telegram update handlers.
//!
//! Only the operator's commands are acted on; everything else is ignored
//! without a reply so the bot stays quiet in shared chats.

use std::sync::Arc;

use teloxide::{prelude::*, types::Message};
use tracing::debug;

use pbt_core::domain::UserId;
use pbt_core::security::is_authorized;

use crate::router::AppState;

mod commands;

pub async fn handle_message(msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(text) = msg.text() else {
        return Ok(());
    };
    if !text.starts_with('/') && !text.starts_with('!') {
        return Ok(());
    }

    let user_id = msg.from().map(|u| UserId(u.id.0 as i64));
    if !is_authorized(user_id, state.ctx.cfg.admin_user_id) {
        debug!(chat_id = msg.chat.id.0, user_id = ?user_id.map(|u| u.0), "Ignoring command from non-operator");
        return Ok(());
    }

    commands::handle_command(msg, state).await
}
