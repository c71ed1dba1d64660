//! osu! API v1 adapter.
//!
//! The v1 API encodes every number as a string and reports hit counts rather
//! than accuracy, so decoding lives in small pure functions below.

use std::{str::FromStr, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize};
use tracing::debug;

use pbt_core::{
    domain::PlayerId,
    errors::ProviderError,
    mode::{GameMode, ServiceFamily},
    provider::{ProviderResult, ScoreProvider},
    score::{MapInfo, Score, ScoreId, UserProfile, UserSummary},
};

const SERVICE: &str = "osu!";
pub const OSU_API_URL: &str = "https://osu.ppy.sh/api";
/// `get_user_best` refuses larger limits.
const MAX_BEST_LIMIT: usize = 100;

#[derive(Clone, Debug)]
pub struct OsuClient {
    api_key: String,
    http: Client,
}

impl OsuClient {
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> ProviderResult<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::fetch(SERVICE, format!("http client: {e}")))?;
        Ok(Self {
            api_key: api_key.into(),
            http,
        })
    }

    async fn get<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &[(&str, String)],
    ) -> ProviderResult<T> {
        let url = format!("{OSU_API_URL}/{endpoint}");
        debug!(%endpoint, "osu! API request");

        let resp = self
            .http
            .get(&url)
            .query(&[("k", self.api_key.as_str())])
            .query(query)
            .send()
            .await
            .map_err(|e| ProviderError::fetch(SERVICE, format!("{endpoint}: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ProviderError::fetch(
                SERVICE,
                format!("{endpoint}: HTTP {status}"),
            ));
        }

        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| ProviderError::fetch(SERVICE, format!("{endpoint}: {e}")))?;
        decode(endpoint, body)
    }
}

/// The API answers `200 {"error": "..."}` for a bad key.
fn decode<T: DeserializeOwned>(endpoint: &str, body: serde_json::Value) -> ProviderResult<T> {
    if let Some(err) = body.get("error").and_then(|e| e.as_str()) {
        return Err(ProviderError::fetch(SERVICE, format!("{endpoint}: {err}")));
    }
    serde_json::from_value(body)
        .map_err(|e| ProviderError::fetch(SERVICE, format!("{endpoint}: invalid response: {e}")))
}

#[async_trait]
impl ScoreProvider for OsuClient {
    fn family(&self) -> ServiceFamily {
        ServiceFamily::Osu
    }

    async fn fetch_top_scores(
        &self,
        mode: GameMode,
        player: PlayerId,
        limit: usize,
    ) -> ProviderResult<Vec<Score>> {
        let limit = limit.clamp(1, MAX_BEST_LIMIT);
        let raw: Vec<RawScore> = self
            .get(
                "get_user_best",
                &[
                    ("u", player.to_string()),
                    ("m", mode.submode().to_string()),
                    ("type", "id".to_string()),
                    ("limit", limit.to_string()),
                ],
            )
            .await?;
        raw.into_iter()
            .map(|s| s.into_score(mode, player))
            .collect()
    }

    async fn fetch_user(&self, mode: GameMode, player: PlayerId) -> ProviderResult<UserProfile> {
        let raw: Vec<RawUser> = self
            .get(
                "get_user",
                &[
                    ("u", player.to_string()),
                    ("m", mode.submode().to_string()),
                    ("type", "id".to_string()),
                    ("event_days", "0".to_string()),
                ],
            )
            .await?;
        raw.into_iter()
            .next()
            .ok_or_else(|| ProviderError::UserNotFound(player.to_string()))?
            .into_profile(mode)
    }

    async fn fetch_map(&self, mode: GameMode, map_id: u64) -> ProviderResult<MapInfo> {
        let raw: Vec<RawBeatmap> = self
            .get(
                "get_beatmaps",
                &[
                    ("b", map_id.to_string()),
                    ("m", mode.submode().to_string()),
                    ("a", "1".to_string()),
                ],
            )
            .await?;
        raw.into_iter()
            .next()
            .ok_or_else(|| ProviderError::fetch(SERVICE, format!("beatmap {map_id} not found")))?
            .into_map()
    }

    async fn search_user(&self, mode: GameMode, name: &str) -> ProviderResult<Vec<UserSummary>> {
        let raw: Vec<RawUser> = self
            .get(
                "get_user",
                &[
                    ("u", name.to_string()),
                    ("m", mode.submode().to_string()),
                    ("type", "string".to_string()),
                    ("event_days", "0".to_string()),
                ],
            )
            .await?;
        raw.into_iter()
            .map(|u| {
                Ok(UserSummary {
                    id: PlayerId(num("user_id", &u.user_id)?),
                    username: u.username,
                })
            })
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct RawScore {
    score_id: String,
    beatmap_id: String,
    count50: String,
    count100: String,
    count300: String,
    countmiss: String,
    countkatu: String,
    countgeki: String,
    enabled_mods: String,
    date: String,
    rank: String,
    #[serde(default)]
    pp: Option<String>,
}

impl RawScore {
    fn into_score(self, mode: GameMode, player: PlayerId) -> ProviderResult<Score> {
        let counts = HitCounts {
            n50: num("count50", &self.count50)?,
            n100: num("count100", &self.count100)?,
            n300: num("count300", &self.count300)?,
            miss: num("countmiss", &self.countmiss)?,
            katu: num("countkatu", &self.countkatu)?,
            geki: num("countgeki", &self.countgeki)?,
        };
        Ok(Score {
            id: ScoreId(num("score_id", &self.score_id)?),
            player_id: player,
            rating: self
                .pp
                .as_deref()
                .map(|pp| num::<f64>("pp", pp))
                .transpose()?
                .unwrap_or(0.0),
            accuracy: accuracy(mode, &counts),
            grade: self.rank,
            mods: mods_short(num("enabled_mods", &self.enabled_mods)?),
            achieved_at: parse_date(&self.date)?,
            map_id: num("beatmap_id", &self.beatmap_id)?,
            map: None,
        })
    }
}

#[derive(Debug, Deserialize)]
struct RawUser {
    user_id: String,
    username: String,
    #[serde(default)]
    pp_raw: Option<String>,
    #[serde(default)]
    pp_rank: Option<String>,
}

impl RawUser {
    fn into_profile(self, mode: GameMode) -> ProviderResult<UserProfile> {
        let id: u64 = num("user_id", &self.user_id)?;
        let total_rating = self
            .pp_raw
            .as_deref()
            .map(|pp| num::<f64>("pp_raw", pp))
            .transpose()?
            .unwrap_or(0.0);
        // Inactive players come back with rank 0 or null.
        let global_rank = self
            .pp_rank
            .as_deref()
            .and_then(|r| r.parse::<u64>().ok())
            .filter(|r| *r > 0);
        Ok(UserProfile {
            id: PlayerId(id),
            username: self.username,
            total_rating,
            global_rank,
            avatar_url: format!("https://a.ppy.sh/{id}"),
            profile_url: format!("https://osu.ppy.sh/users/{id}/{}", mode.profile_suffix()),
        })
    }
}

#[derive(Debug, Deserialize)]
struct RawBeatmap {
    beatmap_id: String,
    beatmapset_id: String,
    artist: String,
    title: String,
    version: String,
}

impl RawBeatmap {
    fn into_map(self) -> ProviderResult<MapInfo> {
        let id: u64 = num("beatmap_id", &self.beatmap_id)?;
        let mapset_id: u64 = num("beatmapset_id", &self.beatmapset_id)?;
        Ok(MapInfo {
            id,
            mapset_id,
            artist: self.artist,
            title: self.title,
            difficulty: self.version,
            url: format!("https://osu.ppy.sh/b/{id}"),
            thumbnail_url: format!("https://b.ppy.sh/thumb/{mapset_id}l.jpg"),
        })
    }
}

fn num<T: FromStr>(field: &'static str, raw: &str) -> ProviderResult<T> {
    raw.trim()
        .parse()
        .map_err(|_| ProviderError::fetch(SERVICE, format!("bad {field}: {raw:?}")))
}

/// `YYYY-MM-DD HH:MM:SS`, UTC.
fn parse_date(raw: &str) -> ProviderResult<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(raw.trim(), "%Y-%m-%d %H:%M:%S")
        .map(|naive| naive.and_utc())
        .map_err(|_| ProviderError::fetch(SERVICE, format!("bad date: {raw:?}")))
}

/// Judgement counts as reported by the API.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HitCounts {
    pub n50: u64,
    pub n100: u64,
    pub n300: u64,
    pub miss: u64,
    pub katu: u64,
    pub geki: u64,
}

/// Accuracy in percent, using each mode's judgement weights.
pub fn accuracy(mode: GameMode, c: &HitCounts) -> f64 {
    let (n50, n100, n300, miss, katu, geki) = (
        c.n50 as f64,
        c.n100 as f64,
        c.n300 as f64,
        c.miss as f64,
        c.katu as f64,
        c.geki as f64,
    );
    let (hit, total) = match mode {
        GameMode::Taiko => (0.5 * n100 + n300, n100 + n300 + miss),
        // Droplet misses are reported as katu.
        GameMode::Catch => (n50 + n100 + n300, n50 + n100 + n300 + katu + miss),
        GameMode::Mania => (
            50.0 * n50 + 100.0 * n100 + 200.0 * katu + 300.0 * (n300 + geki),
            300.0 * (n50 + n100 + n300 + miss + katu + geki),
        ),
        _ => (
            50.0 * n50 + 100.0 * n100 + 300.0 * n300,
            300.0 * (n50 + n100 + n300 + miss),
        ),
    };
    if total <= 0.0 {
        0.0
    } else {
        hit / total * 100.0
    }
}

/// `enabled_mods` bit → acronym, in bit order.
const MODS: &[(u32, &str)] = &[
    (1 << 0, "NF"),
    (1 << 1, "EZ"),
    (1 << 2, "TD"),
    (1 << 3, "HD"),
    (1 << 4, "HR"),
    (1 << 5, "SD"),
    (1 << 6, "DT"),
    (1 << 7, "RX"),
    (1 << 8, "HT"),
    (1 << 9, "NC"),
    (1 << 10, "FL"),
    (1 << 11, "AT"),
    (1 << 12, "SO"),
    (1 << 13, "AP"),
    (1 << 14, "PF"),
    (1 << 15, "4K"),
    (1 << 16, "5K"),
    (1 << 17, "6K"),
    (1 << 18, "7K"),
    (1 << 19, "8K"),
    (1 << 20, "FI"),
    (1 << 21, "RD"),
    (1 << 22, "CN"),
    (1 << 23, "TP"),
    (1 << 24, "9K"),
    (1 << 25, "CO"),
    (1 << 26, "1K"),
    (1 << 27, "3K"),
    (1 << 28, "2K"),
    (1 << 29, "V2"),
    (1 << 30, "MR"),
];

const DT: u32 = 1 << 6;
const NC: u32 = 1 << 9;
const SD: u32 = 1 << 5;
const PF: u32 = 1 << 14;

/// Short mod string (`HDDT`); empty for nomod. NC hides DT and PF hides SD,
/// since the API sets both bits.
pub fn mods_short(bits: u32) -> String {
    let mut bits = bits;
    if bits & NC != 0 {
        bits &= !DT;
    }
    if bits & PF != 0 {
        bits &= !SD;
    }
    MODS.iter()
        .filter(|(bit, _)| bits & bit != 0)
        .map(|(_, name)| *name)
        .collect()
}
