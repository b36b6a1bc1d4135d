use chrono::{DateTime, Utc};

/// Number of leading token characters kept visible by `mask_token`
const TOKEN_VISIBLE_CHARS: usize = 6;

/// Mask a bearer token for logging: keep a short prefix, hide the rest
pub fn mask_token(token: &str) -> String {
    let visible: String = token.chars().take(TOKEN_VISIBLE_CHARS).collect();
    if visible.len() == token.len() {
        "*".repeat(token.chars().count())
    } else {
        format!("{}…", visible)
    }
}

/// Format a timestamp for display, e.g. "Mar 04, 2025"
pub fn format_timestamp(ts: Option<&DateTime<Utc>>) -> String {
    match ts {
        Some(dt) => dt.format("%b %d, %Y").to_string(),
        None => "Unknown".to_string(),
    }
}
