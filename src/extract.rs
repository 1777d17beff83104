//! Isolates the JSON payload from raw model output.

const FENCE: &str = "```";

/// Strip markdown code fence wrappers from a model response.
///
/// A response that already starts with `{` is returned trimmed. Otherwise
/// takes whatever sits between the first fence marker and the last one,
/// dropping a language tag line such as `json` after the opening marker.
/// Text without a fence is only trimmed. This is textual cleanup, not
/// parsing: broken payloads are left for the validator to reject.
pub fn extract(raw: &str) -> &str {
    let trimmed = raw.trim();
    if trimmed.starts_with('{') {
        return trimmed;
    }

    let Some(start) = trimmed.find(FENCE) else {
        return trimmed;
    };
    let after_open = strip_language_tag(&trimmed[start + FENCE.len()..]);

    let inner = match after_open.rfind(FENCE) {
        Some(end) => &after_open[..end],
        None => after_open,
    };

    inner.trim()
}

/// Drop `json`, `JSON`, or any other bare word directly after an opening fence.
fn strip_language_tag(text: &str) -> &str {
    let (first_line, rest) = match text.find('\n') {
        Some(idx) => (&text[..idx], &text[idx + 1..]),
        None => (text, ""),
    };

    let tag = first_line.trim();
    if tag.is_empty() || tag.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
        rest
    } else if let Some(payload) = strip_json_tag(first_line.trim_start()) {
        // "```json {..." on one line
        let consumed = first_line.len() - payload.len();
        &text[consumed..]
    } else {
        text
    }
}

fn strip_json_tag(line: &str) -> Option<&str> {
    let tag = line.get(..4)?;
    tag.eq_ignore_ascii_case("json").then(|| &line[4..])
}
