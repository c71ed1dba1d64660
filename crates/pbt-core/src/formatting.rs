//! Rendering helpers: markdown subset → Telegram HTML, embeds → HTML.

use std::sync::OnceLock;

use regex::Regex;

use crate::messaging::types::Embed;

/// Escape HTML special characters for Telegram HTML parse mode.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn link_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[([^\]]+)\]\(([^)\s]+)\)").expect("valid regex"))
}

/// Convert the markdown subset used in notifications and operator embeds to
/// Telegram-compatible HTML.
///
/// Handles fenced and inline code, links, `**bold**`, `__bold__`, `_italic_`
/// and `*italic*`. Emphasis never spans lines.
pub fn convert_markdown_to_html(input: &str) -> String {
    let (text, code_blocks) = extract_code_blocks(input);
    let (text, inline_codes) = extract_inline_codes(&text);
    let (text, links) = extract_links(&text);

    let mut text = escape_html(&text);

    text = text
        .split('\n')
        .map(|line| {
            let l = replace_delimited(line, "**", "<b>", "</b>");
            let l = replace_delimited(&l, "__", "<b>", "</b>");
            let l = replace_single_delim(&l, '_', "<i>", "</i>");
            replace_single_delim(&l, '*', "<i>", "</i>")
        })
        .collect::<Vec<_>>()
        .join("\n");

    for (i, (label, url)) in links.iter().enumerate() {
        text = text.replace(
            &format!("\0LINK{i}\0"),
            &format!(
                r#"<a href="{}">{}</a>"#,
                escape_html(url),
                escape_html(label)
            ),
        );
    }
    for (i, code) in code_blocks.iter().enumerate() {
        text = text.replace(
            &format!("\0CODEBLOCK{i}\0"),
            &format!("<pre>{}</pre>", escape_html(code)),
        );
    }
    for (i, code) in inline_codes.iter().enumerate() {
        text = text.replace(
            &format!("\0INLINECODE{i}\0"),
            &format!("<code>{}</code>", escape_html(code)),
        );
    }

    text
}

/// Render an embed as one HTML message body.
///
/// Layout: author line, linked title, description, then the timestamp in
/// italics. Colour has no Telegram counterpart and is dropped.
pub fn embed_to_html(embed: &Embed) -> String {
    let mut parts = Vec::new();

    if let Some(author) = &embed.author {
        let name = escape_html(&author.name);
        parts.push(match &author.url {
            Some(url) => format!(r#"<a href="{}">{name}</a>"#, escape_html(url)),
            None => name,
        });
    }

    if !embed.title.is_empty() {
        let title = format!("<b>{}</b>", escape_html(&embed.title));
        parts.push(match &embed.url {
            Some(url) => format!(r#"<a href="{}">{title}</a>"#, escape_html(url)),
            None => title,
        });
    }

    if !embed.description.trim().is_empty() {
        parts.push(convert_markdown_to_html(embed.description.trim_end()));
    }

    if let Some(ts) = embed.timestamp {
        parts.push(format!("<i>{}</i>", ts.format("%Y-%m-%d %H:%M UTC")));
    }

    parts.join("\n")
}

/// Render within `max_chars`, shortening the description first. `None` if
/// the embed does not fit even without a description.
pub fn embed_to_html_within(embed: &Embed, max_chars: usize) -> Option<String> {
    let html = embed_to_html(embed);
    let len = html.chars().count();
    if len <= max_chars {
        return Some(html);
    }

    let desc_len = embed.description.chars().count();
    let overflow = len - max_chars;
    if overflow >= desc_len {
        return None;
    }
    let mut shorter = embed.clone();
    // Markup expands when converted; leave some slack.
    let keep = (desc_len - overflow).saturating_sub(16);
    shorter.description = truncate_chars(&embed.description, keep);
    let html = embed_to_html(&shorter);
    (html.chars().count() <= max_chars).then_some(html)
}

/// Cut `text` to at most `max_chars` characters, marking the cut with `…`.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars.saturating_sub(1)).collect();
    out.push('…');
    out
}

fn extract_code_blocks(input: &str) -> (String, Vec<String>) {
    let mut blocks = Vec::new();
    let mut out = String::new();

    let mut i = 0usize;
    while let Some(rel) = input[i..].find("```") {
        let start = i + rel;
        out.push_str(&input[i..start]);

        let mut p = start + 3;
        // Optional language tag.
        while p < input.len() {
            let b = input.as_bytes()[p];
            if b.is_ascii_alphanumeric() || b == b'_' {
                p += 1;
            } else {
                break;
            }
        }
        if p < input.len() && input.as_bytes()[p] == b'\n' {
            p += 1;
        }

        if let Some(end_rel) = input[p..].find("```") {
            let end = p + end_rel;
            out.push_str(&format!("\0CODEBLOCK{}\0", blocks.len()));
            blocks.push(input[p..end].to_string());
            i = end + 3;
            continue;
        }

        // Unclosed fence.
        out.push_str(&input[start..]);
        return (out, blocks);
    }

    out.push_str(&input[i..]);
    (out, blocks)
}

fn extract_inline_codes(input: &str) -> (String, Vec<String>) {
    let mut codes = Vec::new();
    let mut out = String::new();

    let mut i = 0usize;
    while let Some(rel) = input[i..].find('`') {
        let start = i + rel;
        out.push_str(&input[i..start]);

        let content_start = start + 1;
        if let Some(end_rel) = input[content_start..].find('`') {
            let end = content_start + end_rel;
            out.push_str(&format!("\0INLINECODE{}\0", codes.len()));
            codes.push(input[content_start..end].to_string());
            i = end + 1;
            continue;
        }

        out.push_str(&input[start..]);
        return (out, codes);
    }

    out.push_str(&input[i..]);
    (out, codes)
}

/// Pull `[label](url)` out before emphasis runs, so underscores in URLs survive.
fn extract_links(input: &str) -> (String, Vec<(String, String)>) {
    let mut links = Vec::new();
    let out = link_re()
        .replace_all(input, |caps: &regex::Captures<'_>| {
            let idx = links.len();
            links.push((caps[1].to_string(), caps[2].to_string()));
            format!("\0LINK{idx}\0")
        })
        .into_owned();
    (out, links)
}

fn replace_delimited(text: &str, delim: &str, open: &str, close: &str) -> String {
    let mut out = String::new();
    let mut i = 0usize;
    while let Some(rel) = text[i..].find(delim) {
        let start = i + rel;
        out.push_str(&text[i..start]);
        let content_start = start + delim.len();
        if let Some(end_rel) = text[content_start..].find(delim) {
            let end = content_start + end_rel;
            out.push_str(open);
            out.push_str(&text[content_start..end]);
            out.push_str(close);
            i = end + delim.len();
            continue;
        }
        out.push_str(&text[start..]);
        return out;
    }
    out.push_str(&text[i..]);
    out
}

fn replace_single_delim(text: &str, delim: char, open: &str, close: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let doubled = |k: usize| {
        (k > 0 && chars[k - 1] == delim) || (k + 1 < chars.len() && chars[k + 1] == delim)
    };

    let mut out = String::new();
    let mut i = 0usize;
    while i < chars.len() {
        if chars[i] != delim || doubled(i) {
            out.push(chars[i]);
            i += 1;
            continue;
        }

        match (i + 1..chars.len()).find(|&j| chars[j] == delim && !doubled(j)) {
            Some(j) if j > i + 1 => {
                out.push_str(open);
                out.extend(&chars[i + 1..j]);
                out.push_str(close);
                i = j + 1;
            }
            _ => {
                out.push(delim);
                i += 1;
            }
        }
    }
    out
}
