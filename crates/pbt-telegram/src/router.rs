use std::sync::Arc;

use anyhow::Context;
use teloxide::{dispatching::Dispatcher, dptree, prelude::*};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use pbt_core::messaging::throttled::{ThrottleConfig, ThrottledMessenger};
use pbt_core::{
    context::AppContext, messaging::port::MessagingPort,
    notifier::Dispatcher as NotificationDispatcher, scheduler::Scheduler,
};

use crate::handlers;
use crate::TelegramMessenger;

#[derive(Clone)]
pub struct AppState {
    pub ctx: Arc<AppContext>,
    pub messenger: Arc<dyn MessagingPort>,
}

/// Connect, start the refresh loop and serve commands until Ctrl-C.
///
/// On shutdown the scheduler is cancelled and awaited, then subscriptions are
/// flushed to the config document.
pub async fn run_polling(ctx: Arc<AppContext>) -> anyhow::Result<()> {
    let bot = Bot::new(ctx.cfg.telegram_bot_token.clone());

    // Readiness: the scheduler only starts once Telegram answers.
    let me = bot.get_me().await.context("telegram is not reachable")?;
    info!(username = %me.username(), "Connected to Telegram");

    // Flood-control spacing on top of the adapter's RetryAfter retry.
    let raw_messenger: Arc<dyn MessagingPort> = Arc::new(TelegramMessenger::new(
        bot.clone(),
        ctx.cfg.telegram_safe_limit,
    ));
    let messenger: Arc<dyn MessagingPort> = Arc::new(ThrottledMessenger::new(
        raw_messenger,
        ThrottleConfig::default(),
    ));

    let notifications = Arc::new(NotificationDispatcher::new(
        ctx.providers().clone(),
        messenger.clone(),
    ));
    let cancel = CancellationToken::new();
    let scheduler = Scheduler::new(ctx.clone(), notifications).spawn(cancel.clone());

    let state = Arc::new(AppState {
        ctx: ctx.clone(),
        messenger,
    });

    let handler =
        dptree::entry().branch(Update::filter_message().endpoint(handlers::handle_message));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    info!("Dispatcher stopped, shutting down");
    cancel.cancel();
    if let Err(e) = scheduler.await {
        error!(error = %e, "Scheduler task ended abnormally");
    }
    ctx.flush().await.context("failed to flush config document")?;
    info!("Config flushed");
    Ok(())
}
