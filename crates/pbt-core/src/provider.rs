//! Score-service abstraction and the mode → client capability table.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;

use crate::{
    domain::PlayerId,
    errors::ProviderError,
    mode::{GameMode, ServiceFamily},
    score::{MapInfo, Score, UserProfile, UserSummary},
};

pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

/// Client for one score-service family.
///
/// Implementations are pure queries; timeouts belong to their HTTP transport.
#[async_trait]
pub trait ScoreProvider: Send + Sync {
    /// Family served by this client. Used as the registry key.
    fn family(&self) -> ServiceFamily;

    /// Best scores for a player, best first, at most `limit` entries.
    async fn fetch_top_scores(
        &self,
        mode: GameMode,
        player: PlayerId,
        limit: usize,
    ) -> ProviderResult<Vec<Score>>;

    async fn fetch_user(&self, mode: GameMode, player: PlayerId) -> ProviderResult<UserProfile>;

    async fn fetch_map(&self, mode: GameMode, map_id: u64) -> ProviderResult<MapInfo>;

    /// Candidates for a username, best match first.
    async fn search_user(&self, mode: GameMode, name: &str) -> ProviderResult<Vec<UserSummary>>;
}

/// Explicit capability table: service family → client.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    clients: HashMap<ServiceFamily, Arc<dyn ScoreProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a client for its family, replacing any previous one.
    pub fn register(&mut self, client: Arc<dyn ScoreProvider>) {
        self.clients.insert(client.family(), client);
    }

    pub fn with(mut self, client: Arc<dyn ScoreProvider>) -> Self {
        self.register(client);
        self
    }

    pub fn for_mode(&self, mode: GameMode) -> ProviderResult<&Arc<dyn ScoreProvider>> {
        self.clients
            .get(&mode.family())
            .ok_or(ProviderError::UnsupportedMode(mode))
    }

    pub async fn fetch_top_scores(
        &self,
        mode: GameMode,
        player: PlayerId,
        limit: usize,
    ) -> ProviderResult<Vec<Score>> {
        let mut scores = self
            .for_mode(mode)?
            .fetch_top_scores(mode, player, limit)
            .await?;
        scores.truncate(limit);
        Ok(scores)
    }

    pub async fn fetch_user(&self, mode: GameMode, player: PlayerId) -> ProviderResult<UserProfile> {
        self.for_mode(mode)?.fetch_user(mode, player).await
    }

    pub async fn fetch_map(&self, mode: GameMode, map_id: u64) -> ProviderResult<MapInfo> {
        self.for_mode(mode)?.fetch_map(mode, map_id).await
    }

    pub async fn search_user(&self, mode: GameMode, name: &str) -> ProviderResult<Vec<UserSummary>> {
        self.for_mode(mode)?.search_user(mode, name).await
    }

    /// First search candidate for `name`, or `UserNotFound`.
    pub async fn resolve_user(&self, mode: GameMode, name: &str) -> ProviderResult<UserSummary> {
        self.search_user(mode, name)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::UserNotFound(name.to_string()))
    }
}
