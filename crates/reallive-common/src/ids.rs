//! Stream key normalization.
//!
//! Keys show up as bare names (`cam-1`), SRS stream names (`live/cam-1`),
//! or full URLs (`http://host/live/cam-1.flv?token=x`). They all collapse to
//! the last path segment without query, fragment, or `.flv` suffix.

/// Normalize a stream key. Returns an empty string when nothing is left.
pub fn normalize_stream_key(raw: &str) -> String {
    let trimmed = raw.trim();
    let no_query = trimmed.split(['?', '#']).next().unwrap_or_default();
    let last = no_query.rsplit('/').next().unwrap_or_default();

    let tail = last.len().checked_sub(4).and_then(|i| last.get(i..));
    match tail {
        Some(tail) if tail.eq_ignore_ascii_case(".flv") => last[..last.len() - 4].to_string(),
        _ => last.to_string(),
    }
}
