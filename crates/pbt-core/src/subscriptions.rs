//! Channel → player → modes bindings.

use std::collections::{BTreeMap, BTreeSet};

use tracing::warn;

use crate::{
    domain::{ChatId, PlayerId},
    mode::GameMode,
};

/// Serialized shape: `{ "<chat id>": { "<player id>": ["osu", ...] } }`.
pub type ChannelsDoc = BTreeMap<String, BTreeMap<String, Vec<String>>>;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Subscriptions {
    channels: BTreeMap<ChatId, BTreeMap<PlayerId, BTreeSet<GameMode>>>,
}

impl Subscriptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the persisted map. Malformed ids and unknown mode keys are logged and skipped.
    pub fn from_doc(doc: &ChannelsDoc) -> Self {
        let mut subs = Self::new();
        for (chat_raw, players) in doc {
            let Ok(chat) = chat_raw.trim().parse::<i64>().map(ChatId) else {
                warn!(channel = %chat_raw, "Skipping channel with invalid id");
                continue;
            };
            for (player_raw, modes) in players {
                let Ok(player) = player_raw.trim().parse::<u64>().map(PlayerId) else {
                    warn!(player = %player_raw, "Skipping player with invalid id");
                    continue;
                };
                for key in modes {
                    match GameMode::from_key(key) {
                        Some(mode) => {
                            subs.add(chat, player, mode);
                        }
                        None => warn!(mode = %key, %player, "Skipping unknown mode key"),
                    }
                }
            }
        }
        subs
    }

    pub fn to_doc(&self) -> ChannelsDoc {
        self.channels
            .iter()
            .map(|(chat, players)| {
                let players = players
                    .iter()
                    .map(|(player, modes)| {
                        (
                            player.to_string(),
                            modes.iter().map(|m| m.key().to_string()).collect(),
                        )
                    })
                    .collect();
                (chat.to_string(), players)
            })
            .collect()
    }

    /// Returns `false` if the binding already existed.
    pub fn add(&mut self, chat: ChatId, player: PlayerId, mode: GameMode) -> bool {
        self.channels
            .entry(chat)
            .or_default()
            .entry(player)
            .or_default()
            .insert(mode)
    }

    /// Returns `false` if the binding did not exist. Empty entries are pruned.
    pub fn remove(&mut self, chat: ChatId, player: PlayerId, mode: GameMode) -> bool {
        let Some(players) = self.channels.get_mut(&chat) else {
            return false;
        };
        let Some(modes) = players.get_mut(&player) else {
            return false;
        };
        let removed = modes.remove(&mode);
        if modes.is_empty() {
            players.remove(&player);
        }
        if players.is_empty() {
            self.channels.remove(&chat);
        }
        removed
    }

    /// Whether any channel still follows this pair.
    pub fn is_followed(&self, mode: GameMode, player: PlayerId) -> bool {
        self.channels
            .values()
            .any(|players| players.get(&player).is_some_and(|m| m.contains(&mode)))
    }

    /// Channels that receive notifications for this pair.
    pub fn channels_for(&self, mode: GameMode, player: PlayerId) -> Vec<ChatId> {
        self.channels
            .iter()
            .filter(|(_, players)| players.get(&player).is_some_and(|m| m.contains(&mode)))
            .map(|(chat, _)| *chat)
            .collect()
    }

    /// Distinct tracked pairs across all channels.
    pub fn pairs(&self) -> BTreeSet<(GameMode, PlayerId)> {
        self.channels
            .values()
            .flat_map(|players| {
                players
                    .iter()
                    .flat_map(|(player, modes)| modes.iter().map(move |m| (*m, *player)))
            })
            .collect()
    }

    pub fn for_channel(&self, chat: ChatId) -> Vec<(PlayerId, GameMode)> {
        self.channels
            .get(&chat)
            .map(|players| {
                players
                    .iter()
                    .flat_map(|(player, modes)| modes.iter().map(move |m| (*player, *m)))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: ChatId = ChatId(-100);
    const B: ChatId = ChatId(-200);
    const P: PlayerId = PlayerId(3910006);

    #[test]
    fn many_to_many_bookkeeping() {
        let mut subs = Subscriptions::new();
        assert!(subs.add(A, P, GameMode::Osu));
        assert!(!subs.add(A, P, GameMode::Osu));
        assert!(subs.add(B, P, GameMode::Osu));
        assert!(subs.add(B, P, GameMode::Taiko));

        assert_eq!(subs.channels_for(GameMode::Osu, P), vec![B, A]);
        assert_eq!(subs.channels_for(GameMode::Taiko, P), vec![B]);

        assert!(subs.remove(A, P, GameMode::Osu));
        assert!(subs.is_followed(GameMode::Osu, P));
        assert!(subs.remove(B, P, GameMode::Osu));
        assert!(!subs.is_followed(GameMode::Osu, P));
        assert!(!subs.remove(B, P, GameMode::Osu));

        assert_eq!(subs.for_channel(B), vec![(P, GameMode::Taiko)]);
        assert!(subs.for_channel(A).is_empty());
    }

    #[test]
    fn prunes_empty_entries_in_doc() {
        let mut subs = Subscriptions::new();
        subs.add(A, P, GameMode::Mania);
        subs.remove(A, P, GameMode::Mania);
        assert!(subs.is_empty());
        assert!(subs.to_doc().is_empty());
    }

    #[test]
    fn doc_round_trip_skips_garbage() {
        let mut doc = ChannelsDoc::new();
        doc.entry("-100".to_string()).or_default().insert(
            "3910006".to_string(),
            vec!["osu".to_string(), "fruits".to_string(), "quaver_4k".to_string()],
        );
        doc.entry("not-a-chat".to_string())
            .or_default()
            .insert("1".to_string(), vec!["osu".to_string()]);

        let subs = Subscriptions::from_doc(&doc);
        let pairs: Vec<_> = subs.pairs().into_iter().collect();
        assert_eq!(pairs, vec![(GameMode::Osu, P), (GameMode::Quaver4K, P)]);

        let out = subs.to_doc();
        assert_eq!(out["-100"]["3910006"], vec!["osu", "quaver_4k"]);
        assert_eq!(out.len(), 1);
    }
}
