mod handlers;
pub mod repo;

use crate::state::AppState;
use axum::Router;

const MAX_TAG_LEN: usize = 32;

pub fn router() -> Router<AppState> {
    handlers::routes()
}

/// Canonical form of a tag: trimmed, lowercase, no leading `#`.
pub fn normalize_tag(raw: &str) -> Option<String> {
    let name = raw.trim().trim_start_matches('#').trim().to_lowercase();
    if name.is_empty() || name.chars().count() > MAX_TAG_LEN {
        return None;
    }
    Some(name)
}

/// Normalises and de-duplicates, keeping first-seen order. Invalid entries are dropped.
pub fn normalize_tags<'a>(raw: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for name in raw.into_iter().filter_map(normalize_tag) {
        if !out.contains(&name) {
            out.push(name);
        }
    }
    out
}

/// Comma separated form, as sent by the upload form.
pub fn parse_tag_list(raw: &str) -> Vec<String> {
    normalize_tags(raw.split(','))
}
