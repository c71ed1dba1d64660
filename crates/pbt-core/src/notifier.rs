//! Turns refresh results into embeds and delivers them to subscribed chats.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::{
    messaging::{
        port::MessagingPort,
        types::{Embed, EmbedAuthor},
    },
    mode::{group_thousands, GameMode, ServiceFamily},
    provider::ProviderRegistry,
    score::{display_grade, MapInfo, UserProfile},
    subscriptions::Subscriptions,
    tracker::{NewScore, UpdateResults},
};

/// Build the notification for one new top-N entry.
pub fn build_embed(
    mode: GameMode,
    entry: &NewScore,
    user: &UserProfile,
    map: &MapInfo,
) -> Embed {
    let family = mode.family();
    let score = &entry.score;

    let mods = if score.mods.is_empty() {
        String::new()
    } else {
        format!(" _+{}_", score.mods)
    };
    // Only osu! reports SS grades as `X`/`XH`.
    let grade = match family {
        ServiceFamily::Osu => display_grade(&score.grade),
        ServiceFamily::Quaver => score.grade.clone(),
    };
    let description = format!(
        "**{}**\nPersonal Best **#{}**\n**{:.2}%** {}{}",
        family.format_score_rating(score.rating),
        entry.rank,
        score.accuracy,
        grade,
        mods
    );

    let rank = user
        .global_rank
        .map(|r| format!(" #{}", group_thousands(r as f64, 0)))
        .unwrap_or_default();
    let author = EmbedAuthor {
        name: format!(
            "{}: {}{}{}",
            user.username,
            family.format_total_rating(user.total_rating),
            rank,
            mode.name_suffix()
        ),
        url: Some(user.profile_url.clone()),
        icon_url: non_empty(&user.avatar_url),
    };

    Embed {
        title: map.full_title(),
        url: non_empty(&map.url),
        description,
        timestamp: Some(score.achieved_at),
        color: family.accent(),
        author: Some(author),
        thumbnail_url: non_empty(&map.thumbnail_url),
    }
}

fn non_empty(s: &str) -> Option<String> {
    (!s.trim().is_empty()).then(|| s.to_string())
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Messages accepted by the chat platform.
    pub delivered: usize,
    /// Sends that failed and were dropped.
    pub failed: usize,
    /// Entries dropped because enrichment failed.
    pub skipped: usize,
}

/// Delivers refresh results. Enrichment happens once per pair per tick, so a
/// pair followed by several chats costs one profile lookup.
pub struct Dispatcher {
    providers: Arc<ProviderRegistry>,
    messenger: Arc<dyn MessagingPort>,
}

impl Dispatcher {
    pub fn new(providers: Arc<ProviderRegistry>, messenger: Arc<dyn MessagingPort>) -> Self {
        Self {
            providers,
            messenger,
        }
    }

    pub async fn dispatch(&self, results: &UpdateResults, subs: &Subscriptions) -> DispatchStats {
        let mut stats = DispatchStats::default();

        for (&mode, players) in results {
            for (&player, entries) in players {
                let chats = subs.channels_for(mode, player);
                if chats.is_empty() {
                    debug!(%player, %mode, "No chat follows this pair anymore");
                    continue;
                }

                let user = match self.providers.fetch_user(mode, player).await {
                    Ok(u) => u,
                    Err(e) => {
                        warn!(%player, %mode, error = %e, "Profile lookup failed, skipping notifications");
                        stats.skipped += entries.len();
                        continue;
                    }
                };

                for entry in entries {
                    let score = &entry.score;
                    let map = match &score.map {
                        Some(m) => m.clone(),
                        None => match self.providers.fetch_map(mode, score.map_id).await {
                            Ok(m) => m,
                            Err(e) => {
                                warn!(
                                    %player,
                                    %mode,
                                    map_id = score.map_id,
                                    error = %e,
                                    "Map lookup failed, skipping notification"
                                );
                                stats.skipped += 1;
                                continue;
                            }
                        },
                    };

                    let embed = build_embed(mode, entry, &user, &map);
                    info!(
                        %player,
                        %mode,
                        score_id = score.id.0,
                        map_id = score.map_id,
                        rating = score.rating,
                        rank = entry.rank,
                        "Notifying about a new top score"
                    );

                    for &chat in &chats {
                        match self.messenger.send_embed(chat, &embed).await {
                            Ok(_) => stats.delivered += 1,
                            Err(e) => {
                                warn!(chat_id = chat.0, error = %e, "Failed to deliver notification");
                                stats.failed += 1;
                            }
                        }
                    }
                }
            }
        }

        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::{ChatId, MessageId, MessageRef, PlayerId},
        errors::Error,
        messaging::types::MessagingCapabilities,
        mode::Rgb,
        provider::mock::{score, MockProvider},
        Result,
    };
    use std::sync::Mutex;

    const P: PlayerId = PlayerId(124493);

    fn profile(global_rank: Option<u64>) -> UserProfile {
        UserProfile {
            id: P,
            username: "cookiezi".to_string(),
            total_rating: 12345.6,
            global_rank,
            avatar_url: "https://a.ppy.sh/124493".to_string(),
            profile_url: "https://osu.ppy.sh/users/124493/osu".to_string(),
        }
    }

    fn map(id: u64) -> MapInfo {
        MapInfo {
            id,
            mapset_id: 39804,
            artist: "xi".to_string(),
            title: "FREEDOM DiVE".to_string(),
            difficulty: "FOUR DIMENSIONS".to_string(),
            url: format!("https://osu.ppy.sh/b/{id}"),
            thumbnail_url: "https://b.ppy.sh/thumb/39804l.jpg".to_string(),
        }
    }

    #[derive(Default)]
    struct FakeMessenger {
        sent: Mutex<Vec<(ChatId, Embed)>>,
        broken: Vec<ChatId>,
    }

    #[async_trait::async_trait]
    impl MessagingPort for FakeMessenger {
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
            if self.broken.contains(&chat_id) {
                return Err(Error::Dispatch("chat not found".to_string()));
            }
            self.sent.lock().unwrap().push((chat_id, embed.clone()));
            Ok(MessageRef {
                chat_id,
                message_id: MessageId(2),
            })
        }

        async fn set_reaction(&self, _msg: MessageRef, _emoji: &str) -> Result<()> {
            Ok(())
        }
    }

    fn results(entries: Vec<NewScore>) -> UpdateResults {
        let mut r = UpdateResults::new();
        r.entry(GameMode::Osu).or_default().insert(P, entries);
        r
    }

    #[test]
    fn formats_osu_notification() {
        let mut s = score(7, P);
        s.rating = 727.4;
        s.accuracy = 99.834;
        s.grade = "XH".to_string();
        s.mods = "HDHR".to_string();
        let entry = NewScore { rank: 3, score: s };

        let embed = build_embed(GameMode::Osu, &entry, &profile(Some(1234)), &map(129891));
        assert_eq!(embed.title, "xi - FREEDOM DiVE [FOUR DIMENSIONS]");
        assert_eq!(embed.url.as_deref(), Some("https://osu.ppy.sh/b/129891"));
        assert_eq!(
            embed.description,
            "**727pp**\nPersonal Best **#3**\n**99.83%** SSH _+HDHR_"
        );
        assert_eq!(
            embed.author.as_ref().unwrap().name,
            "cookiezi: 12,346pp #1,234"
        );
        assert_eq!(embed.color, Rgb(255, 102, 170));
        assert_eq!(embed.timestamp, Some(entry.score.achieved_at));
    }

    #[test]
    fn formats_quaver_notification_without_rank_or_mods() {
        let entry = NewScore {
            rank: 1,
            score: score(1, P),
        };
        let embed = build_embed(GameMode::Quaver7K, &entry, &profile(None), &map(5));
        assert_eq!(
            embed.description,
            "**101.00 QR**\nPersonal Best **#1**\n**98.50%** S"
        );

        let mut perfect = entry.clone();
        perfect.score.grade = "X".to_string();
        let embed = build_embed(GameMode::Quaver7K, &perfect, &profile(None), &map(5));
        assert!(embed.description.ends_with("**98.50%** X"));
        assert_eq!(
            embed.author.as_ref().unwrap().name,
            "cookiezi: 12,345.60 QR 7K"
        );
        assert_eq!(embed.color, ServiceFamily::Quaver.accent());
    }

    #[tokio::test]
    async fn fans_out_and_tolerates_failures() {
        let osu = Arc::new(MockProvider::new(ServiceFamily::Osu));
        osu.set_user(profile(Some(1)));
        osu.set_map(map(1001));
        // No map 1002: that entry is skipped.
        let registry = Arc::new(ProviderRegistry::new().with(osu));

        let messenger = Arc::new(FakeMessenger {
            broken: vec![ChatId(-3)],
            ..Default::default()
        });
        let dispatcher = Dispatcher::new(registry, messenger.clone());

        let mut subs = Subscriptions::new();
        subs.add(ChatId(-1), P, GameMode::Osu);
        subs.add(ChatId(-2), P, GameMode::Osu);
        subs.add(ChatId(-3), P, GameMode::Osu);
        subs.add(ChatId(-4), P, GameMode::Taiko);

        let stats = dispatcher
            .dispatch(
                &results(vec![
                    NewScore {
                        rank: 1,
                        score: score(1, P),
                    },
                    NewScore {
                        rank: 4,
                        score: score(2, P),
                    },
                ]),
                &subs,
            )
            .await;

        assert_eq!(
            stats,
            DispatchStats {
                delivered: 2,
                failed: 1,
                skipped: 1
            }
        );
        let sent = messenger.sent.lock().unwrap();
        let chats: Vec<_> = sent.iter().map(|(c, _)| *c).collect();
        assert_eq!(chats, vec![ChatId(-2), ChatId(-1)]);
    }

    #[tokio::test]
    async fn inline_map_skips_lookup_and_missing_profile_skips_pair() {
        let osu = Arc::new(MockProvider::new(ServiceFamily::Osu));
        let registry = Arc::new(ProviderRegistry::new().with(osu.clone()));
        let messenger = Arc::new(FakeMessenger::default());
        let dispatcher = Dispatcher::new(registry, messenger.clone());

        let mut subs = Subscriptions::new();
        subs.add(ChatId(-1), P, GameMode::Osu);

        let mut s = score(9, P);
        s.map = Some(map(9));
        let res = results(vec![NewScore { rank: 2, score: s }]);

        let stats = dispatcher.dispatch(&res, &subs).await;
        assert_eq!(stats.skipped, 1);
        assert!(messenger.sent.lock().unwrap().is_empty());

        osu.set_user(profile(Some(1)));
        let stats = dispatcher.dispatch(&res, &subs).await;
        assert_eq!(stats.delivered, 1);
        let sent = messenger.sent.lock().unwrap();
        assert_eq!(sent[0].1.url.as_deref(), Some("https://osu.ppy.sh/b/9"));
    }
}
