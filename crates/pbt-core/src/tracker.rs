//! Per-(mode, player) top-score snapshots and the diff engine.
//!
//! - `add_user` adopts the current top-N silently (baseline)
//! - `update_all` refetches every tracked pair and reports scores that were not
//!   in the previous snapshot, by id
//! - a refresh result is only written back if the pair is still tracked with
//!   the generation it had when the fetch started

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::Arc,
};

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::{
    domain::PlayerId,
    mode::GameMode,
    provider::{ProviderRegistry, ProviderResult},
    score::{Score, ScoreId},
};

pub const DEFAULT_TOP_LIMIT: usize = 100;

/// A score that entered the top-N since the previous snapshot.
#[derive(Clone, Debug, PartialEq)]
pub struct NewScore {
    /// 1-based position in the fresh top-N.
    pub rank: usize,
    pub score: Score,
}

/// mode → player → new scores (ascending rank). Pairs without news are omitted.
pub type UpdateResults = BTreeMap<GameMode, BTreeMap<PlayerId, Vec<NewScore>>>;

pub fn count_new(results: &UpdateResults) -> usize {
    results
        .values()
        .flat_map(|players| players.values())
        .map(Vec::len)
        .sum()
}

#[derive(Debug)]
struct Snapshot {
    generation: u64,
    scores: Vec<Score>,
}

#[derive(Debug, Default)]
struct TrackerState {
    snapshots: HashMap<(GameMode, PlayerId), Snapshot>,
    next_generation: u64,
}

impl TrackerState {
    fn adopt(&mut self, key: (GameMode, PlayerId), scores: Vec<Score>) {
        self.next_generation += 1;
        self.snapshots.insert(
            key,
            Snapshot {
                generation: self.next_generation,
                scores,
            },
        );
    }
}

pub struct Tracker {
    providers: Arc<ProviderRegistry>,
    limit: usize,
    state: Mutex<TrackerState>,
}

impl Tracker {
    pub fn new(providers: Arc<ProviderRegistry>, limit: usize) -> Self {
        Self {
            providers,
            limit: limit.max(1),
            state: Mutex::new(TrackerState::default()),
        }
    }

    /// Start tracking a pair. Returns `false` if it was already tracked.
    ///
    /// The baseline fetch is not reported; on failure nothing is stored.
    pub async fn add_user(&self, mode: GameMode, player: PlayerId) -> ProviderResult<bool> {
        if self.is_tracked(mode, player).await {
            return Ok(false);
        }

        let scores = self
            .providers
            .fetch_top_scores(mode, player, self.limit)
            .await?;

        let mut st = self.state.lock().await;
        if st.snapshots.contains_key(&(mode, player)) {
            return Ok(false);
        }
        info!(%player, %mode, scores = scores.len(), "Adopted baseline snapshot");
        st.adopt((mode, player), scores);
        Ok(true)
    }

    /// Stop tracking a pair. Returns `false` if it was not tracked.
    pub async fn remove_user(&self, mode: GameMode, player: PlayerId) -> bool {
        let removed = self
            .state
            .lock()
            .await
            .snapshots
            .remove(&(mode, player))
            .is_some();
        if removed {
            info!(%player, %mode, "Dropped snapshot");
        }
        removed
    }

    /// Adopt every pair; failures are logged and skipped. Returns the number adopted.
    pub async fn bootstrap(&self, pairs: impl IntoIterator<Item = (GameMode, PlayerId)>) -> usize {
        let mut adopted = 0usize;
        for (mode, player) in pairs {
            match self.add_user(mode, player).await {
                Ok(true) => adopted += 1,
                Ok(false) => {}
                Err(e) => warn!(%player, %mode, error = %e, "Failed to adopt baseline, will retry"),
            }
        }
        adopted
    }

    /// Refresh every tracked pair and report new top-N entries.
    ///
    /// Pairs are processed one at a time; the state lock is never held across a
    /// fetch. A failed fetch leaves that pair's snapshot untouched.
    pub async fn update_all(&self) -> UpdateResults {
        let pending: Vec<((GameMode, PlayerId), u64)> = {
            let st = self.state.lock().await;
            let mut keys: Vec<_> = st
                .snapshots
                .iter()
                .map(|(k, s)| (*k, s.generation))
                .collect();
            keys.sort();
            keys
        };

        let mut results = UpdateResults::new();
        for ((mode, player), generation) in pending {
            let fresh = match self
                .providers
                .fetch_top_scores(mode, player, self.limit)
                .await
            {
                Ok(v) => v,
                Err(e) => {
                    warn!(%player, %mode, error = %e, "Refresh failed, keeping previous snapshot");
                    continue;
                }
            };

            let new_scores = {
                let mut st = self.state.lock().await;
                let Some(snapshot) = st.snapshots.get_mut(&(mode, player)) else {
                    debug!(%player, %mode, "Pair removed during refresh, discarding result");
                    continue;
                };
                if snapshot.generation != generation {
                    debug!(%player, %mode, "Pair re-adopted during refresh, discarding result");
                    continue;
                }
                let new_scores = diff(&snapshot.scores, &fresh);
                snapshot.scores = fresh;
                new_scores
            };

            if !new_scores.is_empty() {
                info!(%player, %mode, count = new_scores.len(), "New top scores");
                results.entry(mode).or_default().insert(player, new_scores);
            }
        }

        results
    }

    pub async fn is_tracked(&self, mode: GameMode, player: PlayerId) -> bool {
        self.state
            .lock()
            .await
            .snapshots
            .contains_key(&(mode, player))
    }

    pub async fn snapshot(&self, mode: GameMode, player: PlayerId) -> Option<Vec<Score>> {
        self.state
            .lock()
            .await
            .snapshots
            .get(&(mode, player))
            .map(|s| s.scores.clone())
    }

    pub async fn tracked_pairs(&self) -> Vec<(GameMode, PlayerId)> {
        let mut keys: Vec<_> = self.state.lock().await.snapshots.keys().copied().collect();
        keys.sort();
        keys
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.snapshots.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// Entries of `fresh` whose id is absent from `old`, with 1-based ranks, in
/// ascending rank order. Scores that fell out of `fresh` are not reported.
pub fn diff(old: &[Score], fresh: &[Score]) -> Vec<NewScore> {
    let known: HashSet<ScoreId> = old.iter().map(|s| s.id).collect();
    fresh
        .iter()
        .enumerate()
        .filter(|(_, s)| !known.contains(&s.id))
        .map(|(i, s)| NewScore {
            rank: i + 1,
            score: s.clone(),
        })
        .collect()
}
