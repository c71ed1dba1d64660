//! Quaver API v1 adapter.
//!
//! Best-score payloads embed the map, so notifications for Quaver never need a
//! separate map lookup.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::{Client, StatusCode, Url};
use serde::{de::DeserializeOwned, Deserialize};
use tracing::debug;

use pbt_core::{
    domain::PlayerId,
    errors::ProviderError,
    mode::{GameMode, ServiceFamily},
    provider::{ProviderResult, ScoreProvider},
    score::{MapInfo, Score, ScoreId, UserProfile, UserSummary},
};

const SERVICE: &str = "Quaver";
pub const QUAVER_API_URL: &str = "https://api.quavergame.com/v1";

#[derive(Clone, Debug)]
pub struct QuaverClient {
    http: Client,
}

impl QuaverClient {
    pub fn new(timeout: Duration) -> ProviderResult<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::fetch(SERVICE, format!("http client: {e}")))?;
        Ok(Self { http })
    }

    /// `segments` are percent-encoded individually, so usernames with spaces
    /// or slashes are safe.
    fn url(&self, segments: &[&str]) -> ProviderResult<Url> {
        let mut url = Url::parse(QUAVER_API_URL)
            .map_err(|e| ProviderError::fetch(SERVICE, format!("bad base url: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| ProviderError::fetch(SERVICE, "bad base url"))?
            .extend(segments);
        Ok(url)
    }

    /// `Ok(None)` on 404.
    async fn get<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        query: &[(&str, String)],
    ) -> ProviderResult<Option<T>> {
        let url = self.url(segments)?;
        let endpoint = segments.first().copied().unwrap_or_default();
        debug!(path = %url.path(), "Quaver API request");

        let resp = self
            .http
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| ProviderError::fetch(SERVICE, format!("{endpoint}: {e}")))?;

        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
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

/// Some endpoints answer `200 {"status": 404}` instead of a real 404.
fn decode<T: DeserializeOwned>(endpoint: &str, body: serde_json::Value) -> ProviderResult<Option<T>> {
    if body.get("status").and_then(|s| s.as_u64()) == Some(404) {
        return Ok(None);
    }
    serde_json::from_value(body)
        .map(Some)
        .map_err(|e| ProviderError::fetch(SERVICE, format!("{endpoint}: invalid response: {e}")))
}

#[async_trait]
impl ScoreProvider for QuaverClient {
    fn family(&self) -> ServiceFamily {
        ServiceFamily::Quaver
    }

    async fn fetch_top_scores(
        &self,
        mode: GameMode,
        player: PlayerId,
        limit: usize,
    ) -> ProviderResult<Vec<Score>> {
        let resp: BestScoresResponse = self
            .get(
                &["users", "scores", "best"],
                &[
                    ("id", player.to_string()),
                    ("mode", mode.submode().to_string()),
                    ("limit", limit.to_string()),
                ],
            )
            .await?
            .ok_or_else(|| ProviderError::UserNotFound(player.to_string()))?;
        resp.scores
            .into_iter()
            .take(limit)
            .map(|s| s.into_score(player))
            .collect()
    }

    async fn fetch_user(&self, mode: GameMode, player: PlayerId) -> ProviderResult<UserProfile> {
        let id = player.to_string();
        let resp: FullUserResponse = self
            .get(&["users", "full", id.as_str()], &[])
            .await?
            .ok_or_else(|| ProviderError::UserNotFound(id.clone()))?;
        resp.user.into_profile(mode, player)
    }

    async fn fetch_map(&self, _mode: GameMode, map_id: u64) -> ProviderResult<MapInfo> {
        let id = map_id.to_string();
        let resp: MapResponse = self
            .get(&["maps", id.as_str()], &[])
            .await?
            .ok_or_else(|| ProviderError::fetch(SERVICE, format!("map {map_id} not found")))?;
        Ok(resp.map.into_map())
    }

    async fn search_user(&self, _mode: GameMode, name: &str) -> ProviderResult<Vec<UserSummary>> {
        let resp: SearchResponse = match self.get(&["users", "search", name], &[]).await? {
            Some(r) => r,
            None => return Ok(Vec::new()),
        };
        Ok(resp
            .users
            .into_iter()
            .map(|u| UserSummary {
                id: PlayerId(u.id),
                username: u.username,
            })
            .collect())
    }
}

#[derive(Debug, Deserialize)]
struct BestScoresResponse {
    #[serde(default)]
    scores: Vec<RawScore>,
}

#[derive(Debug, Deserialize)]
struct RawScore {
    id: u64,
    performance_rating: f64,
    accuracy: f64,
    grade: String,
    #[serde(default)]
    mods_string: String,
    time: String,
    map: RawMap,
}

impl RawScore {
    fn into_score(self, player: PlayerId) -> ProviderResult<Score> {
        let mods = match self.mods_string.trim() {
            "None" => String::new(),
            m => m.to_string(),
        };
        let map = self.map.into_map();
        Ok(Score {
            id: ScoreId(self.id),
            player_id: player,
            rating: self.performance_rating,
            accuracy: self.accuracy,
            grade: self.grade,
            mods,
            achieved_at: parse_time(&self.time)?,
            map_id: map.id,
            map: Some(map),
        })
    }
}

#[derive(Debug, Deserialize)]
struct RawMap {
    id: u64,
    mapset_id: u64,
    artist: String,
    title: String,
    difficulty_name: String,
}

impl RawMap {
    fn into_map(self) -> MapInfo {
        MapInfo {
            id: self.id,
            mapset_id: self.mapset_id,
            url: format!("https://quavergame.com/mapset/map/{}", self.id),
            thumbnail_url: format!("https://cdn.quavergame.com/mapsets/{}.jpg", self.mapset_id),
            artist: self.artist,
            title: self.title,
            difficulty: self.difficulty_name,
        }
    }
}

#[derive(Debug, Deserialize)]
struct MapResponse {
    map: RawMap,
}

#[derive(Debug, Deserialize)]
struct FullUserResponse {
    user: RawFullUser,
}

#[derive(Debug, Deserialize)]
struct RawFullUser {
    info: RawUserInfo,
    #[serde(default)]
    keys4: Option<RawKeyStats>,
    #[serde(default)]
    keys7: Option<RawKeyStats>,
}

#[derive(Debug, Deserialize)]
struct RawUserInfo {
    username: String,
    #[serde(default)]
    avatar_url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawKeyStats {
    #[serde(default)]
    global_rank: Option<u64>,
    stats: RawStats,
}

#[derive(Debug, Deserialize)]
struct RawStats {
    #[serde(default)]
    overall_performance_rating: f64,
}

impl RawFullUser {
    fn into_profile(self, mode: GameMode, player: PlayerId) -> ProviderResult<UserProfile> {
        let keys = match mode {
            GameMode::Quaver4K => self.keys4,
            GameMode::Quaver7K => self.keys7,
            other => return Err(ProviderError::UnsupportedMode(other)),
        };
        let (total_rating, global_rank) = keys
            .map(|k| (k.stats.overall_performance_rating, k.global_rank.filter(|r| *r > 0)))
            .unwrap_or((0.0, None));
        Ok(UserProfile {
            id: player,
            username: self.info.username,
            total_rating,
            global_rank,
            avatar_url: self.info.avatar_url.unwrap_or_default(),
            profile_url: format!(
                "https://quavergame.com/user/{player}?mode={}",
                mode.submode()
            ),
        })
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    users: Vec<RawSearchUser>,
}

#[derive(Debug, Deserialize)]
struct RawSearchUser {
    id: u64,
    username: String,
}

/// ISO 8601 with or without an offset; a missing offset means UTC.
fn parse_time(raw: &str) -> ProviderResult<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|_| ProviderError::fetch(SERVICE, format!("bad time: {raw:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn best_scores_fixture() -> serde_json::Value {
        json!({
            "status": 200,
            "scores": [{
                "id": 7654321,
                "performance_rating": 41.237,
                "accuracy": 98.7711,
                "grade": "S",
                "mods_string": "None",
                "time": "2024-05-01T12:00:00.000Z",
                "map": {
                    "id": 2145,
                    "mapset_id": 733,
                    "artist": "Camellia",
                    "title": "Exit This Earth's Atomosphere",
                    "difficulty_name": "Atmospheric"
                }
            }, {
                "id": 7654000,
                "performance_rating": 40.0,
                "accuracy": 97.0,
                "grade": "A",
                "mods_string": "1.2x",
                "time": "2024-04-01T08:30:00",
                "map": {
                    "id": 2146,
                    "mapset_id": 734,
                    "artist": "a",
                    "title": "t",
                    "difficulty_name": "d"
                }
            }]
        })
    }

    #[test]
    fn decodes_best_scores_with_inline_maps() {
        let resp: BestScoresResponse = decode("users", best_scores_fixture()).unwrap().unwrap();
        let scores: Vec<Score> = resp
            .scores
            .into_iter()
            .map(|s| s.into_score(PlayerId(273)))
            .collect::<ProviderResult<_>>()
            .unwrap();

        assert_eq!(scores[0].id, ScoreId(7654321));
        assert_eq!(scores[0].mods, "");
        assert_eq!(scores[0].map_id, 2145);
        let map = scores[0].map.as_ref().unwrap();
        assert_eq!(map.url, "https://quavergame.com/mapset/map/2145");
        assert_eq!(map.thumbnail_url, "https://cdn.quavergame.com/mapsets/733.jpg");
        assert_eq!(
            scores[0].achieved_at,
            Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
        );

        assert_eq!(scores[1].mods, "1.2x");
        assert_eq!(
            scores[1].achieved_at,
            Utc.with_ymd_and_hms(2024, 4, 1, 8, 30, 0).unwrap()
        );
    }

    #[test]
    fn decodes_full_user_per_key_mode() {
        let body = json!({
            "status": 200,
            "user": {
                "info": {
                    "id": 273,
                    "username": "Swan",
                    "avatar_url": "https://cdn.quavergame.com/avatars/273.jpg"
                },
                "keys4": {
                    "globalRank": 1234,
                    "stats": { "overall_performance_rating": 1234.567 }
                },
                "keys7": {
                    "globalRank": 0,
                    "stats": { "overall_performance_rating": 0.0 }
                }
            }
        });
        let resp: FullUserResponse = decode("users", body.clone()).unwrap().unwrap();
        let p4 = resp.user.into_profile(GameMode::Quaver4K, PlayerId(273)).unwrap();
        assert_eq!(p4.username, "Swan");
        assert_eq!(p4.global_rank, Some(1234));
        assert!((p4.total_rating - 1234.567).abs() < 1e-9);
        assert_eq!(p4.profile_url, "https://quavergame.com/user/273?mode=1");

        let resp: FullUserResponse = decode("users", body).unwrap().unwrap();
        let p7 = resp.user.into_profile(GameMode::Quaver7K, PlayerId(273)).unwrap();
        assert_eq!(p7.global_rank, None);
        assert_eq!(p7.profile_url, "https://quavergame.com/user/273?mode=2");
    }

    #[test]
    fn soft_not_found_is_none() {
        let resp: Option<FullUserResponse> =
            decode("users", json!({"status": 404, "error": "User not found"})).unwrap();
        assert!(resp.is_none());
    }

    #[test]
    fn search_usernames_are_path_encoded() {
        let client = QuaverClient::new(Duration::from_secs(1)).unwrap();
        let url = client.url(&["users", "search", "a b/c"]).unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.quavergame.com/v1/users/search/a%20b%2Fc"
        );
    }
}
