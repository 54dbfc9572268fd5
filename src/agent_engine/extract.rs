/// Pull a JSON object out of a model reply that may be wrapped in prose or a
/// fenced code block.
///
/// Tries the span from the first `{` to the last `}`, then the contents of the
/// first fenced block. Returns `None` if neither parses.
pub fn extract_json_object(raw: &str) -> Option<serde_json::Value> {
    if let (Some(start), Some(end)) = (raw.find('{'), raw.rfind('}')) {
        if start < end {
            if let Ok(value) = serde_json::from_str::<serde_json::Value>(&raw[start..=end]) {
                if value.is_object() {
                    return Some(value);
                }
            }
        }
    }

    let block = fenced_block(raw)?;
    serde_json::from_str::<serde_json::Value>(block.trim())
        .ok()
        .filter(serde_json::Value::is_object)
}

fn fenced_block(raw: &str) -> Option<&str> {
    let fence = "```";
    let start = raw.find(fence)?;
    let after_fence = &raw[start + fence.len()..];
    // Skip an info string such as `json`
    let body_start = after_fence.find('\n').map(|i| i + 1).unwrap_or(0);
    let body = &after_fence[body_start..];
    let end = body.find(fence)?;
    Some(&body[..end])
}
