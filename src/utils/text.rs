use crate::constants::schema::MAX_TOOL_NAME_LEN;

pub fn truncate_utf8_prefix(value: &str, max_bytes: usize) -> String {
    if max_bytes == 0 {
        return String::new();
    }
    if value.len() <= max_bytes {
        return value.to_string();
    }
    let mut end = max_bytes;
    while end > 0 && !value.is_char_boundary(end) {
        end -= 1;
    }
    value[..end].to_string()
}

/// Restricts a name to `[A-Za-z0-9_-]`, collapsing runs of anything else into
/// one underscore.
pub fn sanitize_tool_name(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending_sep = false;
    for ch in raw.trim().chars() {
        if ch.is_ascii_alphanumeric() || ch == '_' || ch == '-' {
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            pending_sep = false;
            out.push(ch);
        } else {
            pending_sep = true;
        }
    }
    truncate_utf8_prefix(&out, MAX_TOOL_NAME_LEN)
}

/// Splits a `|`-delimited string into trimmed, non-empty segments.
pub fn split_segments(raw: Option<&str>) -> Vec<String> {
    raw.map(|text| {
        text.split('|')
            .map(str::trim)
            .filter(|segment| !segment.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}
