// src/notice/format.rs
use chrono::{DateTime, Duration, Utc};

use super::{Challenge, Notice};

/// Display offset for timestamps (UTC+8).
const DISPLAY_OFFSET_HOURS: i64 = 8;
const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Decode the raw `Values` column into display text.
///
/// `["name"]` unwraps to `name`; longer arrays are joined with ", ".
/// Empty arrays, malformed JSON and plain strings come back unchanged.
pub fn decode_payload(raw: &str) -> String {
    let trimmed = raw.trim();
    if !(trimmed.starts_with('[') && trimmed.ends_with(']')) {
        return raw.to_string();
    }
    let items: Vec<serde_json::Value> = match serde_json::from_str(trimmed) {
        Ok(v) => v,
        Err(e) => {
            tracing::debug!(target: "format", error = %e, "payload is not a JSON array, using raw text");
            return raw.to_string();
        }
    };
    if items.is_empty() {
        return raw.to_string();
    }
    items
        .iter()
        .map(|v| match v {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Challenge name carried by a payload: the first array element, or the
/// trimmed raw text when the payload is not a JSON array.
pub fn challenge_name(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.starts_with('[') && trimmed.ends_with(']') {
        if let Ok(items) = serde_json::from_str::<Vec<serde_json::Value>>(trimmed) {
            return match items.first() {
                Some(serde_json::Value::String(s)) => s.trim().to_string(),
                Some(other) => other.to_string(),
                None => String::new(),
            };
        }
    }
    trimmed.to_string()
}

/// Render a UTC instant as `YYYY-MM-DD HH:MM:SS` in UTC+8.
pub fn display_time(ts: DateTime<Utc>) -> String {
    (ts.naive_utc() + Duration::hours(DISPLAY_OFFSET_HOURS))
        .format(TIME_FORMAT)
        .to_string()
}

pub fn format_notice(notice: &Notice) -> String {
    format_notice_with(notice, None)
}

/// Format one notice as a chat message. Total: never fails, never empty.
pub fn format_notice_with(notice: &Notice, challenge: Option<&Challenge>) -> String {
    let mut out = format!("{} {}", notice.kind.icon(), notice.kind.label());

    let body = decode_payload(&notice.payload);
    if !body.trim().is_empty() {
        out.push('\n');
        out.push_str(&body);
    }
    if let Some(c) = challenge {
        out.push_str("\nCategory: ");
        out.push_str(c.category_label());
    }
    out.push_str("\nTime: ");
    out.push_str(&display_time(notice.published_at));
    out
}
