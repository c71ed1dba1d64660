use std::path::PathBuf;

use crate::mode::GameMode;

/// Core error type.
///
/// Adapter crates map their specific errors into this type so the bot core can
/// handle failures consistently (command reply vs. logged-and-dropped).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config document {path}: {source}")]
    TomlDecode {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("cannot serialize config document: {0}")]
    TomlEncode(#[from] toml::ser::Error),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("{0} is not tracked in this chat")]
    NotSubscribed(String),

    #[error("dispatch failed: {0}")]
    Dispatch(String),

    #[error("external error: {0}")]
    External(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by score-service clients.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    /// Service unreachable, non-success status or an undecodable payload.
    #[error("{service} request failed: {reason}")]
    Fetch {
        service: &'static str,
        reason: String,
    },

    /// Lookup came back empty.
    #[error("user not found: {0}")]
    UserNotFound(String),

    /// No client is registered for the mode's service family.
    #[error("no score service registered for {0}")]
    UnsupportedMode(GameMode),
}

impl ProviderError {
    pub fn fetch(service: &'static str, reason: impl Into<String>) -> Self {
        Self::Fetch {
            service,
            reason: reason.into(),
        }
    }
}
