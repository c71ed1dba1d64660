//! Game modes and the service families that serve them.

use std::{fmt, str::FromStr};

/// Backing score service for a group of modes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ServiceFamily {
    Osu,
    Quaver,
}

impl ServiceFamily {
    /// Accent color used on notifications.
    pub fn accent(self) -> Rgb {
        match self {
            ServiceFamily::Osu => Rgb(255, 102, 170),
            ServiceFamily::Quaver => Rgb(69, 214, 245),
        }
    }

    /// Score rating as shown on a notification (`123pp`, `45.67 QR`).
    pub fn format_score_rating(self, rating: f64) -> String {
        match self {
            ServiceFamily::Osu => format!("{}pp", group_thousands(rating, 0)),
            ServiceFamily::Quaver => format!("{rating:.2} QR"),
        }
    }

    /// Player's overall rating (`12,345pp`, `1,234.56 QR`).
    pub fn format_total_rating(self, rating: f64) -> String {
        match self {
            ServiceFamily::Osu => format!("{}pp", group_thousands(rating, 0)),
            ServiceFamily::Quaver => format!("{} QR", group_thousands(rating, 2)),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Rgb(pub u8, pub u8, pub u8);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GameMode {
    Osu,
    Taiko,
    Catch,
    Mania,
    Quaver4K,
    Quaver7K,
}

struct ModeSpec {
    mode: GameMode,
    key: &'static str,
    display: &'static str,
    family: ServiceFamily,
    submode: u8,
    profile_suffix: &'static str,
}

static MODES: [ModeSpec; 6] = [
    ModeSpec {
        mode: GameMode::Osu,
        key: "osu",
        display: "osu!standard",
        family: ServiceFamily::Osu,
        submode: 0,
        profile_suffix: "osu",
    },
    ModeSpec {
        mode: GameMode::Taiko,
        key: "taiko",
        display: "osu!taiko",
        family: ServiceFamily::Osu,
        submode: 1,
        profile_suffix: "taiko",
    },
    ModeSpec {
        mode: GameMode::Catch,
        key: "ctb",
        display: "osu!catch",
        family: ServiceFamily::Osu,
        submode: 2,
        profile_suffix: "fruits",
    },
    ModeSpec {
        mode: GameMode::Mania,
        key: "mania",
        display: "osu!mania",
        family: ServiceFamily::Osu,
        submode: 3,
        profile_suffix: "mania",
    },
    ModeSpec {
        mode: GameMode::Quaver4K,
        key: "quaver_4k",
        display: "Quaver 4K",
        family: ServiceFamily::Quaver,
        submode: 1,
        profile_suffix: "keys4",
    },
    ModeSpec {
        mode: GameMode::Quaver7K,
        key: "quaver_7k",
        display: "Quaver 7K",
        family: ServiceFamily::Quaver,
        submode: 2,
        profile_suffix: "keys7",
    },
];

impl GameMode {
    pub const ALL: [GameMode; 6] = [
        GameMode::Osu,
        GameMode::Taiko,
        GameMode::Catch,
        GameMode::Mania,
        GameMode::Quaver4K,
        GameMode::Quaver7K,
    ];

    fn spec(self) -> &'static ModeSpec {
        // MODES is ordered like the enum declaration.
        &MODES[self as usize]
    }

    /// Stable key used in the config document and in commands.
    pub fn key(self) -> &'static str {
        self.spec().key
    }

    pub fn display_name(self) -> &'static str {
        self.spec().display
    }

    pub fn family(self) -> ServiceFamily {
        self.spec().family
    }

    /// Mode code understood by the owning service.
    pub fn submode(self) -> u8 {
        self.spec().submode
    }

    /// Per-mode path segment on the service (osu! profile tab, Quaver stats key).
    pub fn profile_suffix(self) -> &'static str {
        self.spec().profile_suffix
    }

    /// Appended to the author line of notifications.
    pub fn name_suffix(self) -> &'static str {
        match self {
            GameMode::Quaver4K => " 4K",
            GameMode::Quaver7K => " 7K",
            _ => "",
        }
    }

    pub fn from_key(key: &str) -> Option<GameMode> {
        MODES.iter().find(|m| m.key == key).map(|m| m.mode)
    }

    /// `osu|taiko|ctb|...` for usage strings.
    pub fn keys_joined() -> String {
        MODES.iter().map(|m| m.key).collect::<Vec<_>>().join("|")
    }
}

impl fmt::Display for GameMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("unknown mode: {0}")]
pub struct UnknownMode(pub String);

impl FromStr for GameMode {
    type Err = UnknownMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        GameMode::from_key(s.trim()).ok_or_else(|| UnknownMode(s.to_string()))
    }
}

/// Format with `,` thousands separators and a fixed number of decimals.
pub fn group_thousands(value: f64, decimals: usize) -> String {
    let raw = format!("{:.*}", decimals, value.abs());
    let (int_part, frac_part) = match raw.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (raw.as_str(), None),
    };

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let sign = if value < 0.0 && raw.chars().any(|c| c != '0' && c != '.') {
        "-"
    } else {
        ""
    };
    match frac_part {
        Some(f) => format!("{sign}{grouped}.{f}"),
        None => format!("{sign}{grouped}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_matches_enum_order() {
        for mode in GameMode::ALL {
            assert_eq!(mode.spec().mode, mode);
            assert_eq!(GameMode::from_key(mode.key()), Some(mode));
        }
    }

    #[test]
    fn families_are_disjoint() {
        let osu: Vec<_> = GameMode::ALL
            .into_iter()
            .filter(|m| m.family() == ServiceFamily::Osu)
            .collect();
        assert_eq!(
            osu,
            vec![
                GameMode::Osu,
                GameMode::Taiko,
                GameMode::Catch,
                GameMode::Mania
            ]
        );
        assert_eq!(GameMode::Quaver4K.submode(), 1);
        assert_eq!(GameMode::Quaver7K.submode(), 2);
        assert_eq!(GameMode::Catch.profile_suffix(), "fruits");
    }

    #[test]
    fn parses_keys() {
        assert_eq!("quaver_7k".parse::<GameMode>(), Ok(GameMode::Quaver7K));
        assert!("fruits".parse::<GameMode>().is_err());
        assert_eq!(
            GameMode::keys_joined(),
            "osu|taiko|ctb|mania|quaver_4k|quaver_7k"
        );
    }

    #[test]
    fn groups_thousands() {
        assert_eq!(group_thousands(0.0, 0), "0");
        assert_eq!(group_thousands(999.4, 0), "999");
        assert_eq!(group_thousands(12345.6, 0), "12,346");
        assert_eq!(group_thousands(1234567.891, 2), "1,234,567.89");
        assert_eq!(group_thousands(-4321.0, 0), "-4,321");
    }

    #[test]
    fn formats_ratings_per_family() {
        assert_eq!(ServiceFamily::Osu.format_score_rating(412.7), "413pp");
        assert_eq!(ServiceFamily::Quaver.format_score_rating(33.456), "33.46 QR");
        assert_eq!(
            ServiceFamily::Quaver.format_total_rating(1234.5),
            "1,234.50 QR"
        );
    }
}
