//! Operator command parsing.
//!
//! Commands start with `/` or `!`; Telegram's `/cmd@botname` form is accepted.

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::{
    messaging::types::{Embed, EmbedAuthor},
    mode::{GameMode, Rgb},
};

/// Lines after the `embed` line: eight fixed fields, then the description.
pub const EMBED_MIN_FIELDS: usize = 9;

#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    Track { mode: GameMode, username: String },
    TrackStop { mode: GameMode, username: String },
    Embed(Embed),
    Tracked,
    Help,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    /// Wrong arity or an unknown mode; carries the usage line to reply with.
    #[error("{0}")]
    Usage(String),

    #[error("invalid embed: {0}")]
    InvalidEmbed(String),
}

pub fn track_usage() -> String {
    format!("`!track <{}> <username>`", GameMode::keys_joined())
}

pub fn track_stop_usage() -> String {
    format!("`!track-stop <{}> <username>`", GameMode::keys_joined())
}

pub fn embed_usage() -> String {
    "`!embed` followed by one line each for: title, url, timestamp (RFC 3339), \
     color (`r g b`), author name, author url, author icon, thumbnail, description"
        .to_string()
}

pub fn help_text() -> String {
    [
        "Personal-best tracker commands:".to_string(),
        track_usage(),
        track_stop_usage(),
        "`!tracked`: players followed in this chat".to_string(),
        embed_usage(),
    ]
    .join("\n")
}

/// Split `!cmd@bot rest` into a lowercase command name and the trimmed rest.
fn split_command(text: &str) -> Option<(String, &str)> {
    let text = text.trim_start();
    let body = text.strip_prefix('/').or_else(|| text.strip_prefix('!'))?;

    let end = body.find(char::is_whitespace).unwrap_or(body.len());
    let (first, rest) = body.split_at(end);
    let name = first.split('@').next().unwrap_or("").to_lowercase();
    if name.is_empty() {
        return None;
    }
    Some((name, rest))
}

/// Parse a chat message. `None` means the message is not one of ours.
pub fn parse(text: &str) -> Option<Result<Command, CommandError>> {
    let (name, rest) = split_command(text)?;
    let parsed = match name.as_str() {
        "track" => parse_mode_and_user(rest, track_usage)
            .map(|(mode, username)| Command::Track { mode, username }),
        "track-stop" | "track_stop" | "untrack" => parse_mode_and_user(rest, track_stop_usage)
            .map(|(mode, username)| Command::TrackStop { mode, username }),
        "embed" => parse_embed(rest).map(Command::Embed),
        "tracked" => Ok(Command::Tracked),
        "help" | "start" => Ok(Command::Help),
        _ => return None,
    };
    Some(parsed)
}

fn parse_mode_and_user(
    rest: &str,
    usage: fn() -> String,
) -> Result<(GameMode, String), CommandError> {
    let rest = rest.trim();
    let (mode_raw, username) = rest
        .split_once(char::is_whitespace)
        .ok_or_else(|| CommandError::Usage(usage()))?;
    let username = username.trim();
    if username.is_empty() {
        return Err(CommandError::Usage(usage()));
    }
    let mode = mode_raw
        .parse::<GameMode>()
        .map_err(|_| CommandError::Usage(usage()))?;
    Ok((mode, username.to_string()))
}

/// `rest` is everything after the command word; fields start on the next line.
fn parse_embed(rest: &str) -> Result<Embed, CommandError> {
    let fields: Vec<&str> = rest.split('\n').skip(1).map(|l| l.trim_end_matches('\r')).collect();
    if fields.len() < EMBED_MIN_FIELDS {
        return Err(CommandError::Usage(embed_usage()));
    }

    let title = fields[0].trim().to_string();
    let url = optional(fields[1]);
    let timestamp = parse_timestamp(fields[2])?;
    let color = parse_color(fields[3])?;
    let author = optional(fields[4]).map(|name| EmbedAuthor {
        name,
        url: optional(fields[5]),
        icon_url: optional(fields[6]),
    });
    let thumbnail_url = optional(fields[7]);
    let description = fields[8..].join("\n");

    Ok(Embed {
        title,
        url,
        description,
        timestamp,
        color,
        author,
        thumbnail_url,
    })
}

fn optional(field: &str) -> Option<String> {
    let f = field.trim();
    (!f.is_empty()).then(|| f.to_string())
}

/// RFC 3339, or `YYYY-MM-DD HH:MM:SS` taken as UTC. Empty means no timestamp.
fn parse_timestamp(field: &str) -> Result<Option<DateTime<Utc>>, CommandError> {
    let f = field.trim();
    if f.is_empty() {
        return Ok(None);
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(f) {
        return Ok(Some(ts.with_timezone(&Utc)));
    }
    NaiveDateTime::parse_from_str(f, "%Y-%m-%d %H:%M:%S")
        .map(|naive| Some(naive.and_utc()))
        .map_err(|_| CommandError::InvalidEmbed(format!("bad timestamp `{f}`")))
}

fn parse_color(field: &str) -> Result<Rgb, CommandError> {
    let bad = || CommandError::InvalidEmbed(format!("bad color `{}`, expected `r g b`", field.trim()));
    let parts = field
        .split_whitespace()
        .map(|p| p.parse::<u8>().map_err(|_| bad()))
        .collect::<Result<Vec<_>, _>>()?;
    match parts.as_slice() {
        [r, g, b] => Ok(Rgb(*r, *g, *b)),
        _ => Err(bad()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn parses_track_with_either_prefix() {
        assert_eq!(
            parse("!track osu Cookiezi"),
            Some(Ok(Command::Track {
                mode: GameMode::Osu,
                username: "Cookiezi".to_string()
            }))
        );
        assert_eq!(
            parse("/track@pb_bot quaver_4k some player"),
            Some(Ok(Command::Track {
                mode: GameMode::Quaver4K,
                username: "some player".to_string()
            }))
        );
    }

    #[test]
    fn track_stop_aliases() {
        for text in [
            "!track-stop ctb rrtyui",
            "/track_stop ctb rrtyui",
            "/untrack ctb rrtyui",
        ] {
            assert_eq!(
                parse(text),
                Some(Ok(Command::TrackStop {
                    mode: GameMode::Catch,
                    username: "rrtyui".to_string()
                })),
                "{text}"
            );
        }
    }

    #[test]
    fn bad_arity_or_mode_yields_usage() {
        assert_eq!(
            parse("!track osu"),
            Some(Err(CommandError::Usage(track_usage())))
        );
        assert_eq!(
            parse("!track fruits someone"),
            Some(Err(CommandError::Usage(track_usage())))
        );
        assert_eq!(
            parse("!track-stop"),
            Some(Err(CommandError::Usage(track_stop_usage())))
        );
    }

    #[test]
    fn ignores_chatter_and_unknown_commands() {
        assert_eq!(parse("nice pass"), None);
        assert_eq!(parse("!roll 100"), None);
        assert_eq!(parse("!"), None);
    }

    #[test]
    fn composes_embed() {
        let text = "!embed\n\
                    Title\n\
                    https://example.com\n\
                    2024-05-01T12:00:00Z\n\
                    255 102 170\n\
                    Author\n\
                    https://example.com/a\n\
                    \n\
                    https://example.com/t.jpg\n\
                    line one\n\
                    line two";
        let Some(Ok(Command::Embed(embed))) = parse(text) else {
            panic!("expected an embed");
        };
        assert_eq!(embed.title, "Title");
        assert_eq!(embed.url.as_deref(), Some("https://example.com"));
        assert_eq!(
            embed.timestamp,
            Some(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap())
        );
        assert_eq!(embed.color, Rgb(255, 102, 170));
        let author = embed.author.unwrap();
        assert_eq!(author.name, "Author");
        assert_eq!(author.icon_url, None);
        assert_eq!(embed.thumbnail_url.as_deref(), Some("https://example.com/t.jpg"));
        assert_eq!(embed.description, "line one\nline two");
    }

    #[test]
    fn embed_needs_nine_fields_and_valid_values() {
        let short = "!embed\na\nb\nc\nd\ne\nf\ng\nh";
        assert_eq!(parse(short), Some(Err(CommandError::Usage(embed_usage()))));

        let bad_color = "!embed\nT\n\n2024-05-01 12:00:00\n255 102\nA\n\n\n\nd";
        assert!(matches!(
            parse(bad_color),
            Some(Err(CommandError::InvalidEmbed(_)))
        ));

        let bad_ts = "!embed\nT\n\nyesterday\n1 2 3\nA\n\n\n\nd";
        assert!(matches!(
            parse(bad_ts),
            Some(Err(CommandError::InvalidEmbed(_)))
        ));
    }
}
