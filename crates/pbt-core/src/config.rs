use std::{
    env, fs,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{errors::Error, subscriptions::ChannelsDoc, tracker::DEFAULT_TOP_LIMIT, Result};

const DEFAULT_CONFIG_PATH: &str = "config.toml";
const DEFAULT_UPDATE_INTERVAL_SECS: u64 = 60;

/// The persisted document (`config.toml`).
///
/// Scalars are declared before tables so the TOML encoder never has to emit a
/// value after a table header.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigDocument {
    /// Seconds between refresh ticks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_interval: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_user_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_scores_limit: Option<usize>,
    #[serde(default)]
    pub api_keys: ApiKeys,
    #[serde(default)]
    pub channels: ChannelsDoc,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiKeys {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub osu: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telegram: Option<String>,
}

/// Owns the on-disk document. Writes are whole-file and best-effort: a crash
/// between a subscription change and `save()` loses that change.
#[derive(Debug)]
pub struct ConfigStore {
    path: PathBuf,
    doc: ConfigDocument,
}

impl ConfigStore {
    /// Read the document; a missing file yields an empty document.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let doc = match fs::read_to_string(&path) {
            Ok(txt) => toml::from_str(&txt).map_err(|source| Error::TomlDecode {
                path: path.clone(),
                source,
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "Config file not found, starting empty");
                ConfigDocument::default()
            }
            Err(e) => return Err(e.into()),
        };
        Ok(Self { path, doc })
    }

    pub fn in_memory(path: impl Into<PathBuf>, doc: ConfigDocument) -> Self {
        Self {
            path: path.into(),
            doc,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn document(&self) -> &ConfigDocument {
        &self.doc
    }

    pub fn set_channels(&mut self, channels: ChannelsDoc) {
        self.doc.channels = channels;
    }

    pub fn save(&self) -> Result<()> {
        let txt = toml::to_string_pretty(&self.doc)?;
        fs::write(&self.path, txt)?;
        Ok(())
    }
}

/// Typed runtime configuration: the document plus environment overrides.
#[derive(Clone, Debug)]
pub struct Config {
    pub config_path: PathBuf,
    pub telegram_bot_token: String,
    pub osu_api_key: Option<String>,
    pub admin_user_id: i64,
    pub update_interval: Duration,
    pub top_scores_limit: usize,
    pub http_timeout: Duration,
    pub telegram_safe_limit: usize,
}

impl Config {
    /// Load `.env`, open the document at `PBT_CONFIG` (default `config.toml`)
    /// and resolve the runtime config from it.
    pub fn load() -> Result<(Self, ConfigStore)> {
        load_dotenv_if_present(Path::new(".env"));

        let path = env_path("PBT_CONFIG").unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
        let store = ConfigStore::open(&path)?;
        let cfg = Self::resolve(&path, store.document())?;

        info!(
            path = %path.display(),
            interval_secs = cfg.update_interval.as_secs(),
            "Configuration loaded"
        );
        Ok((cfg, store))
    }

    /// Env wins over the document.
    pub fn resolve(path: &Path, doc: &ConfigDocument) -> Result<Self> {
        Self::resolve_with(path, doc, &|key: &str| env::var(key).ok())
    }

    /// `resolve` with overrides looked up through `env`.
    fn resolve_with(
        path: &Path,
        doc: &ConfigDocument,
        env: &dyn Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let telegram_bot_token = env("TELEGRAM_BOT_TOKEN")
            .and_then(non_empty)
            .or_else(|| doc.api_keys.telegram.clone().and_then(non_empty))
            .unwrap_or_default();
        if telegram_bot_token.trim().is_empty() {
            return Err(Error::Config(
                "telegram bot token is required (TELEGRAM_BOT_TOKEN or api_keys.telegram)"
                    .to_string(),
            ));
        }

        let osu_api_key = env("OSU_API_KEY")
            .and_then(non_empty)
            .or_else(|| doc.api_keys.osu.clone().and_then(non_empty));

        let admin_user_id = env_parse::<i64>(env, "PBT_ADMIN_USER_ID")
            .or(doc.admin_user_id)
            .ok_or_else(|| {
                Error::Config(
                    "admin user id is required (PBT_ADMIN_USER_ID or admin_user_id)".to_string(),
                )
            })?;

        let interval_secs = env_parse::<u64>(env, "PBT_UPDATE_INTERVAL")
            .or(doc.update_interval)
            .unwrap_or(DEFAULT_UPDATE_INTERVAL_SECS);
        if interval_secs == 0 {
            return Err(Error::Config(
                "update_interval must be at least 1 second".to_string(),
            ));
        }

        let top_scores_limit = doc
            .top_scores_limit
            .unwrap_or(DEFAULT_TOP_LIMIT)
            .clamp(1, DEFAULT_TOP_LIMIT);

        let http_timeout =
            Duration::from_secs(env_parse::<u64>(env, "PBT_HTTP_TIMEOUT").unwrap_or(10));
        let telegram_safe_limit =
            env_parse::<usize>(env, "TELEGRAM_SAFE_LIMIT").unwrap_or(4000);

        Ok(Self {
            config_path: path.to_path_buf(),
            telegram_bot_token,
            osu_api_key,
            admin_user_id,
            update_interval: Duration::from_secs(interval_secs),
            top_scores_limit,
            http_timeout,
            telegram_safe_limit,
        })
    }
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        env::set_var(key, val);
    }
}

/// Unparseable values are ignored, so the document value applies.
fn env_parse<T: FromStr>(env: &dyn Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    env(key).and_then(|s| s.trim().parse::<T>().ok())
}

fn env_path(key: &str) -> Option<PathBuf> {
    env::var_os(key).map(PathBuf::from)
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
