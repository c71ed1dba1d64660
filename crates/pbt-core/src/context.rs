//! Startup-built application context: configuration, subscriptions, tracker.
//!
//! Command mutations are serialized so a `track` and a `track-stop` racing on
//! the same pair cannot leave a subscription without a snapshot (or the reverse).

use std::{collections::BTreeSet, sync::Arc};

use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::{
    config::{Config, ConfigStore},
    domain::{ChatId, PlayerId},
    errors::Error,
    mode::GameMode,
    provider::ProviderRegistry,
    subscriptions::Subscriptions,
    tracker::Tracker,
    Result,
};

/// Resolved player as shown in command replies.
#[derive(Clone, Debug, PartialEq)]
pub struct TrackedPlayer {
    pub id: PlayerId,
    pub username: String,
    pub global_rank: Option<u64>,
}

pub struct AppContext {
    pub cfg: Arc<Config>,
    providers: Arc<ProviderRegistry>,
    tracker: Arc<Tracker>,
    subscriptions: Mutex<Subscriptions>,
    store: Mutex<ConfigStore>,
    command_lock: Mutex<()>,
}

impl AppContext {
    pub fn new(cfg: Config, store: ConfigStore, providers: Arc<ProviderRegistry>) -> Self {
        let subscriptions = Subscriptions::from_doc(&store.document().channels);
        let tracker = Arc::new(Tracker::new(providers.clone(), cfg.top_scores_limit));
        Self {
            cfg: Arc::new(cfg),
            providers,
            tracker,
            subscriptions: Mutex::new(subscriptions),
            store: Mutex::new(store),
            command_lock: Mutex::new(()),
        }
    }

    pub fn tracker(&self) -> &Arc<Tracker> {
        &self.tracker
    }

    pub fn providers(&self) -> &Arc<ProviderRegistry> {
        &self.providers
    }

    /// Adopt a baseline for every persisted pair. Returns the number adopted.
    pub async fn bootstrap(&self) -> usize {
        let adopted = self.reconcile().await;
        info!(adopted, "Bootstrapped tracker from config");
        adopted
    }

    /// Adopt a silent baseline for every subscribed pair that has no snapshot,
    /// e.g. because its fetch failed at startup. Pairs that fail again are
    /// retried on the next call. Returns the number adopted.
    ///
    /// Holds the command lock so a concurrent `untrack` cannot leave a
    /// snapshot behind for a pair nobody follows.
    pub async fn reconcile(&self) -> usize {
        let _guard = self.command_lock.lock().await;
        let subscribed = self.subscriptions.lock().await.pairs();
        let tracked: BTreeSet<_> = self.tracker.tracked_pairs().await.into_iter().collect();
        let missing: Vec<_> = subscribed.difference(&tracked).copied().collect();
        if missing.is_empty() {
            return 0;
        }

        let adopted = self.tracker.bootstrap(missing.iter().copied()).await;
        if adopted < missing.len() {
            warn!(
                adopted,
                missing = missing.len(),
                "Some subscribed pairs still have no snapshot"
            );
        }
        adopted
    }

    /// Copy of the current routing table, for one dispatch pass.
    pub async fn subscriptions(&self) -> Subscriptions {
        self.subscriptions.lock().await.clone()
    }

    pub async fn tracked_in(&self, chat: ChatId) -> Vec<(PlayerId, GameMode)> {
        self.subscriptions.lock().await.for_channel(chat)
    }

    /// Follow `username` in `mode` from `chat`.
    ///
    /// The baseline snapshot is in place before this returns; if it cannot be
    /// fetched nothing is stored.
    pub async fn track(&self, chat: ChatId, mode: GameMode, username: &str) -> Result<TrackedPlayer> {
        let _guard = self.command_lock.lock().await;
        let player = self.resolve(mode, username).await?;

        self.tracker.add_user(mode, player.id).await?;

        let added = self.subscriptions.lock().await.add(chat, player.id, mode);
        if added {
            self.persist().await;
        }
        info!(
            chat_id = chat.0,
            player = %player.id,
            username = %player.username,
            rank = ?player.global_rank,
            %mode,
            "Added subscription"
        );
        Ok(player)
    }

    /// Stop following `username` in `mode` from `chat`. The snapshot is
    /// dropped only when no other chat still follows the pair.
    pub async fn untrack(
        &self,
        chat: ChatId,
        mode: GameMode,
        username: &str,
    ) -> Result<TrackedPlayer> {
        let _guard = self.command_lock.lock().await;
        let player = self.resolve(mode, username).await?;

        let still_followed = {
            let mut subs = self.subscriptions.lock().await;
            if !subs.remove(chat, player.id, mode) {
                return Err(Error::NotSubscribed(player.username));
            }
            subs.is_followed(mode, player.id)
        };
        self.persist().await;

        if !still_followed {
            self.tracker.remove_user(mode, player.id).await;
        }
        info!(
            chat_id = chat.0,
            player = %player.id,
            username = %player.username,
            %mode,
            still_followed,
            "Removed subscription"
        );
        Ok(player)
    }

    /// Write the current subscriptions back to the config document.
    pub async fn flush(&self) -> Result<()> {
        let doc = self.subscriptions.lock().await.to_doc();
        let mut store = self.store.lock().await;
        store.set_channels(doc);
        store.save()
    }

    /// Best-effort save after a mutation; the in-memory state stays authoritative.
    async fn persist(&self) {
        if let Err(e) = self.flush().await {
            warn!(error = %e, "Failed to save config document");
        }
    }

    async fn resolve(&self, mode: GameMode, username: &str) -> Result<TrackedPlayer> {
        let summary = self.providers.resolve_user(mode, username).await?;
        let (username, global_rank) = match self.providers.fetch_user(mode, summary.id).await {
            Ok(profile) => (profile.username, profile.global_rank),
            Err(e) => {
                warn!(player = %summary.id, %mode, error = %e, "Profile lookup failed");
                (summary.username, None)
            }
        };
        Ok(TrackedPlayer {
            id: summary.id,
            username,
            global_rank,
        })
    }
}
