// Text cleanup shared by the platform parsers.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;

static WS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Wide enough that the renderer never breaks a word; lines are re-joined anyway.
const RENDER_WIDTH: usize = 4096;

/// Reduce an HTML fragment (or entity-encoded text) to a single line of
/// plain text.
pub fn strip_html(html: &str) -> String {
    let rendered = html2text::from_read(html.as_bytes(), RENDER_WIDTH).unwrap_or_default();
    collapse_whitespace(&rendered)
}

pub fn collapse_whitespace(text: &str) -> String {
    WS_RE.replace_all(text.trim(), " ").into_owned()
}

/// Unix seconds to UTC. Out-of-range values yield `None`.
pub fn epoch_to_utc(secs: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
}

pub fn parse_rfc3339(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
