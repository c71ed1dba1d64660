//! Normalized records returned by score services.

use chrono::{DateTime, Utc};

use crate::domain::PlayerId;

/// Service-side score identifier. The only field used for novelty checks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScoreId(pub u64);

#[derive(Clone, Debug, PartialEq)]
pub struct Score {
    pub id: ScoreId,
    pub player_id: PlayerId,
    /// pp on osu!, QR on Quaver.
    pub rating: f64,
    /// Percent, 0..=100.
    pub accuracy: f64,
    pub grade: String,
    /// Short modifier string (`HDDT`); empty when no mods are applied.
    pub mods: String,
    pub achieved_at: DateTime<Utc>,
    pub map_id: u64,
    /// Filled when the service embeds map metadata in score payloads.
    pub map: Option<MapInfo>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MapInfo {
    pub id: u64,
    pub mapset_id: u64,
    pub artist: String,
    pub title: String,
    pub difficulty: String,
    pub url: String,
    pub thumbnail_url: String,
}

impl MapInfo {
    /// `Artist - Title [Difficulty]`
    pub fn full_title(&self) -> String {
        format!("{} - {} [{}]", self.artist, self.title, self.difficulty)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct UserProfile {
    pub id: PlayerId,
    pub username: String,
    pub total_rating: f64,
    pub global_rank: Option<u64>,
    pub avatar_url: String,
    pub profile_url: String,
}

/// Candidate returned by a username search.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserSummary {
    pub id: PlayerId,
    pub username: String,
}

/// `X` / `XH` are the service labels for SS / silver SS.
pub fn display_grade(raw: &str) -> String {
    raw.replace('X', "SS")
}
