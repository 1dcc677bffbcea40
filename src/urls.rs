//! YouTube URL recognition and canonical normalization
//!
//! One canonical URL per logical video id: every supported URL shape
//! (watch, v, embed, shorts, youtu.be, mobile) normalizes to
//! `https://www.youtube.com/watch?v={id}`. Normalization is idempotent.

use regex::Regex;
use std::sync::OnceLock;
use url::Url;

/// Video ids are exactly 11 characters from the YouTube id alphabet.
const VIDEO_ID_PATTERN: &str =
    r"(?i)(?:https?://)?(?:(?:www\.|m\.)?youtube\.com/(?:watch\?v=|v/|embed/|shorts/)|youtu\.be/)([A-Za-z0-9_-]{11})";

#[allow(clippy::expect_used)]
fn video_id_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(VIDEO_ID_PATTERN).expect("video id pattern is valid"))
}

#[allow(clippy::expect_used)]
fn candidate_url_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r#"(?i)https?://[^\s<>"{}|\\^`\[\]]+|(?:www\.|m\.)?youtube\.com/[^\s<>"{}|\\^`\[\]]+|youtu\.be/[^\s<>"{}|\\^`\[\]]+"#,
        )
        .expect("candidate url pattern is valid")
    })
}

fn is_video_id(s: &str) -> bool {
    s.len() == 11
        && s.bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

/// Extract the video id from a YouTube URL, if present
///
/// Falls back to query-string parsing for watch URLs where `v=` is not the
/// first parameter (e.g. `watch?t=30&v=...`).
pub fn extract_video_id(url: &str) -> Option<String> {
    if let Some(caps) = video_id_regex().captures(url) {
        return caps.get(1).map(|m| m.as_str().to_string());
    }

    let with_scheme;
    let candidate = if url.starts_with("http://") || url.starts_with("https://") {
        url
    } else {
        with_scheme = format!("https://{}", url);
        &with_scheme
    };

    let parsed = Url::parse(candidate).ok()?;
    let host = parsed.host_str()?;
    if !matches!(host, "youtube.com" | "www.youtube.com" | "m.youtube.com") {
        return None;
    }
    if parsed.path() != "/watch" {
        return None;
    }
    parsed
        .query_pairs()
        .find(|(k, _)| k == "v")
        .map(|(_, v)| v.into_owned())
        .filter(|id| is_video_id(id))
}

/// Whether the string is a recognizable YouTube video URL
pub fn is_valid_url(url: &str) -> bool {
    extract_video_id(url).is_some()
}

/// Normalize a YouTube URL to canonical form
///
/// Returns `https://www.youtube.com/watch?v={id}`, or None if the input does
/// not reference a video. Normalizing an already-canonical URL yields the same
/// string.
pub fn normalize_url(url: &str) -> Option<String> {
    extract_video_id(url).map(|id| format!("https://www.youtube.com/watch?v={}", id))
}

/// Extract all YouTube video URLs from free text, in order of appearance
///
/// Scheme-less forms (`youtu.be/...`, `www.youtube.com/...`) are returned with
/// `https://` prepended. Non-video URLs in the text are skipped.
pub fn extract_urls(text: &str) -> Vec<String> {
    candidate_url_regex()
        .find_iter(text)
        .filter_map(|m| {
            let raw = m.as_str();
            let candidate = if raw.starts_with("http://") || raw.starts_with("https://") {
                raw.to_string()
            } else {
                format!("https://{}", raw)
            };
            is_valid_url(&candidate).then_some(candidate)
        })
        .collect()
}
