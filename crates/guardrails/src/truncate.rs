//! Tool-result truncation with an explicit marker, UTF-8 boundary safe.

/// Marker appended to truncated results so the model knows output was cut.
const TRUNCATION_MARKER: &str = "\n...[output truncated]";

/// Truncate `result` to at most `max_bytes` of content (marker excluded).
/// Returns the original string untouched when it fits.
pub fn truncate_result(result: &str, max_bytes: usize) -> String {
    if result.len() <= max_bytes {
        return result.to_string();
    }
    let mut end = max_bytes;
    while end > 0 && !result.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}{}", &result[..end], TRUNCATION_MARKER)
}

/// Truncate for log/preview display: hard cap with an ellipsis.
pub fn truncate_str(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let mut end = max;
        while !s.is_char_boundary(end) && end > 0 {
            end -= 1;
        }
        format!("{}...", &s[..end])
    }
}
