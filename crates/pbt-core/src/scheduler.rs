//! Periodic refresh loop: sleep, refresh every tracked pair, notify.

use std::{sync::Arc, time::Duration};

use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::{
    context::AppContext,
    notifier::{DispatchStats, Dispatcher},
    tracker::count_new,
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    pub new_scores: usize,
    pub dispatch: DispatchStats,
}

#[derive(Clone)]
pub struct Scheduler {
    ctx: Arc<AppContext>,
    dispatcher: Arc<Dispatcher>,
    interval: Duration,
}

impl Scheduler {
    pub fn new(ctx: Arc<AppContext>, dispatcher: Arc<Dispatcher>) -> Self {
        let interval = ctx.cfg.update_interval;
        Self {
            ctx,
            dispatcher,
            interval,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Run the loop on its own task until `cancel` fires.
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(cancel).await })
    }

    /// Cancellation is observed while sleeping; a tick that has started runs
    /// to completion.
    pub async fn run(&self, cancel: CancellationToken) {
        info!(interval_secs = self.interval.as_secs(), "Scheduler started");
        loop {
            tokio::select! {
              _ = cancel.cancelled() => break,
              _ = sleep(self.interval) => {
                self.run_tick().await;
              }
            }
        }
        info!("Scheduler stopped");
    }

    /// Run one tick on a separate task so a panic inside it is contained.
    /// Returns `None` if the tick panicked or was aborted.
    pub async fn run_tick(&self) -> Option<TickReport> {
        let this = self.clone();
        match tokio::spawn(async move { this.tick().await }).await {
            Ok(report) => Some(report),
            Err(e) => {
                error!(error = %e, "Refresh tick failed");
                None
            }
        }
    }

    /// Adopt pairs still missing a snapshot, then `update_all` followed by
    /// dispatch of whatever it reported. Adoption is silent.
    pub async fn tick(&self) -> TickReport {
        let adopted = self.ctx.reconcile().await;
        if adopted > 0 {
            info!(adopted, "Adopted baselines for pairs missing a snapshot");
        }

        let results = self.ctx.tracker().update_all().await;
        let new_scores = count_new(&results);
        if new_scores == 0 {
            debug!("No new top scores");
            return TickReport::default();
        }

        let subs = self.ctx.subscriptions().await;
        let dispatch = self.dispatcher.dispatch(&results, &subs).await;
        info!(
            new_scores,
            delivered = dispatch.delivered,
            failed = dispatch.failed,
            skipped = dispatch.skipped,
            "Refresh tick finished"
        );
        TickReport {
            new_scores,
            dispatch,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{Config, ConfigDocument, ConfigStore},
        domain::{ChatId, MessageId, MessageRef, PlayerId},
        messaging::{
            port::MessagingPort,
            types::{Embed, MessagingCapabilities},
        },
        mode::{GameMode, ServiceFamily},
        provider::{mock::MockProvider, ProviderRegistry},
        score::{MapInfo, UserProfile},
        Result,
    };
    use std::{
        path::PathBuf,
        sync::{
            atomic::{AtomicBool, AtomicUsize, Ordering},
            Mutex,
        },
    };

    const P: PlayerId = PlayerId(3);
    const CHAT: ChatId = ChatId(-10);

    #[derive(Default)]
    struct CountingMessenger {
        embeds: AtomicUsize,
        panic_next: AtomicBool,
        titles: Mutex<Vec<String>>,
    }

    #[async_trait::async_trait]
    impl MessagingPort for CountingMessenger {
        fn capabilities(&self) -> MessagingCapabilities {
            MessagingCapabilities {
                supports_reactions: false,
                max_message_len: 4096,
            }
        }

        async fn send_html(&self, chat_id: ChatId, _html: &str) -> Result<MessageRef> {
            Ok(MessageRef {
                chat_id,
                message_id: MessageId(1),
            })
        }

        async fn reply_html(&self, to: MessageRef, html: &str) -> Result<MessageRef> {
            self.send_html(to.chat_id, html).await
        }

        async fn send_embed(&self, chat_id: ChatId, embed: &Embed) -> Result<MessageRef> {
            if self.panic_next.swap(false, Ordering::SeqCst) {
                panic!("renderer exploded");
            }
            self.embeds.fetch_add(1, Ordering::SeqCst);
            self.titles.lock().unwrap().push(embed.title.clone());
            self.send_html(chat_id, "").await
        }

        async fn set_reaction(&self, _msg: MessageRef, _emoji: &str) -> Result<()> {
            Ok(())
        }
    }

    fn setup() -> (Scheduler, Arc<MockProvider>, Arc<CountingMessenger>) {
        let osu = Arc::new(MockProvider::new(ServiceFamily::Osu));
        osu.set_user(UserProfile {
            id: P,
            username: "mrekk".to_string(),
            total_rating: 20000.0,
            global_rank: Some(1),
            avatar_url: String::new(),
            profile_url: String::new(),
        });
        for id in [1001, 1002, 1003, 1004] {
            osu.set_map(MapInfo {
                id,
                mapset_id: 1,
                artist: "a".to_string(),
                title: format!("t{id}"),
                difficulty: "d".to_string(),
                url: String::new(),
                thumbnail_url: String::new(),
            });
        }
        osu.set_scores(GameMode::Osu, P, &[1]);

        let mut doc = ConfigDocument::default();
        doc.channels
            .entry(CHAT.to_string())
            .or_default()
            .insert(P.to_string(), vec!["osu".to_string()]);
        let cfg = Config {
            config_path: PathBuf::from("unused.toml"),
            telegram_bot_token: "t".to_string(),
            osu_api_key: None,
            admin_user_id: 1,
            update_interval: Duration::from_secs(60),
            top_scores_limit: 100,
            http_timeout: Duration::from_secs(10),
            telegram_safe_limit: 4000,
        };
        let providers = Arc::new(ProviderRegistry::new().with(osu.clone()));
        let ctx = Arc::new(AppContext::new(
            cfg,
            ConfigStore::in_memory("unused.toml", doc),
            providers.clone(),
        ));
        let messenger = Arc::new(CountingMessenger::default());
        let dispatcher = Arc::new(Dispatcher::new(providers, messenger.clone()));
        (Scheduler::new(ctx, dispatcher), osu, messenger)
    }

    #[tokio::test]
    async fn tick_notifies_new_scores_only() {
        let (scheduler, osu, messenger) = setup();
        assert_eq!(scheduler.ctx.bootstrap().await, 1);

        assert_eq!(scheduler.tick().await, TickReport::default());

        osu.set_scores(GameMode::Osu, P, &[2, 1]);
        let report = scheduler.tick().await;
        assert_eq!(report.new_scores, 1);
        assert_eq!(report.dispatch.delivered, 1);
        assert_eq!(messenger.titles.lock().unwrap().clone(), vec!["a - t1002 [d]"]);
    }

    #[tokio::test]
    async fn panicking_tick_is_contained() {
        let (scheduler, osu, messenger) = setup();
        scheduler.ctx.bootstrap().await;

        osu.set_scores(GameMode::Osu, P, &[2, 1]);
        messenger.panic_next.store(true, Ordering::SeqCst);
        assert_eq!(scheduler.run_tick().await, None);

        osu.set_scores(GameMode::Osu, P, &[3, 2, 1]);
        let report = scheduler.run_tick().await.unwrap();
        assert_eq!(report.dispatch.delivered, 1);
        assert_eq!(messenger.embeds.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn pair_failing_at_startup_is_adopted_silently_then_reported() {
        let (scheduler, osu, messenger) = setup();
        osu.fail(GameMode::Osu, P);
        assert_eq!(scheduler.ctx.bootstrap().await, 0);

        // Service recovers: the next tick adopts a baseline without notifying.
        osu.set_scores(GameMode::Osu, P, &[1]);
        assert_eq!(scheduler.tick().await, TickReport::default());
        assert!(scheduler.ctx.tracker().is_tracked(GameMode::Osu, P).await);
        assert_eq!(messenger.embeds.load(Ordering::SeqCst), 0);

        osu.set_scores(GameMode::Osu, P, &[2, 1]);
        let report = scheduler.tick().await;
        assert_eq!(report.new_scores, 1);
        assert_eq!(report.dispatch.delivered, 1);
        assert_eq!(messenger.titles.lock().unwrap().clone(), vec!["a - t1002 [d]"]);
    }

    #[tokio::test(start_paused = true)]
    async fn run_ticks_every_interval_and_survives_a_panicking_tick() {
        let (scheduler, osu, messenger) = setup();
        scheduler.ctx.bootstrap().await;
        let cancel = CancellationToken::new();
        let handle = scheduler
            .with_interval(Duration::from_secs(60))
            .spawn(cancel.clone());

        osu.set_scores(GameMode::Osu, P, &[2, 1]);
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(messenger.embeds.load(Ordering::SeqCst), 1);

        osu.set_scores(GameMode::Osu, P, &[3, 2, 1]);
        messenger.panic_next.store(true, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(messenger.embeds.load(Ordering::SeqCst), 1);

        osu.set_scores(GameMode::Osu, P, &[4, 3, 2, 1]);
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(messenger.embeds.load(Ordering::SeqCst), 2);
        assert_eq!(
            messenger.titles.lock().unwrap().clone(),
            vec!["a - t1002 [d]", "a - t1004 [d]"]
        );

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn stops_on_cancellation_while_sleeping() {
        let (scheduler, _osu, messenger) = setup();
        let cancel = CancellationToken::new();
        let handle = scheduler
            .with_interval(Duration::from_secs(3600))
            .spawn(cancel.clone());

        tokio::task::yield_now().await;
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("scheduler should stop promptly")
            .unwrap();
        assert_eq!(messenger.embeds.load(Ordering::SeqCst), 0);
    }
}
