//! Text helpers shared by the view models and markup

use std::sync::OnceLock;

use chrono::{DateTime, FixedOffset, Local, Offset, Utc};
use regex::Regex;

/// Escape HTML to prevent XSS
pub fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

fn bold_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\*\*(.*?)\*\*").expect("valid bold pattern"))
}

fn italic_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\*(.*?)\*").expect("valid italic pattern"))
}

fn code_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"`(.*?)`").expect("valid code pattern"))
}

fn tag_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"<[^>]*>").expect("valid tag pattern"))
}

/// Render turn text as HTML with the small inline markup set:
/// line breaks, `**bold**`, `*italic*` and `` `code` `` spans.
///
/// The text is escaped first, so markup inside a turn is shown literally.
pub fn format_inline(text: &str) -> String {
    let html = escape_html(text).replace('\n', "<br>");
    let html = bold_pattern().replace_all(&html, "<strong>$1</strong>");
    let html = italic_pattern().replace_all(&html, "<em>$1</em>");
    code_pattern().replace_all(&html, "<code>$1</code>").into_owned()
}

/// Plain text of an HTML fragment, for speech
pub fn strip_markup(html: &str) -> String {
    let text = html.replace("<br>", " ");
    tag_pattern()
        .replace_all(&text, "")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// First `max` characters of `text`, with `...` appended when cut
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

/// Clock reading and UTC offset used to label times
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderContext {
    pub now: DateTime<Utc>,
    pub offset: FixedOffset,
}

impl RenderContext {
    pub fn utc(now: DateTime<Utc>) -> Self {
        Self {
            now,
            offset: Utc.fix(),
        }
    }

    /// Labels in the host's local time zone
    pub fn local(now: DateTime<Utc>) -> Self {
        Self {
            now,
            offset: now.with_timezone(&Local).offset().fix(),
        }
    }

    /// `Today`, `Yesterday`, `N days ago` within a week, then the date
    pub fn date_label(&self, at: DateTime<Utc>) -> String {
        let days = (self.now - at).num_days();
        match days {
            i64::MIN..=0 => "Today".to_string(),
            1 => "Yesterday".to_string(),
            2..=6 => format!("{} days ago", days),
            _ => at.with_timezone(&self.offset).format("%Y-%m-%d").to_string(),
        }
    }

    /// Hours and minutes, e.g. `09:05`
    pub fn time_label(&self, at: DateTime<Utc>) -> String {
        at.with_timezone(&self.offset).format("%H:%M").to_string()
    }
}
