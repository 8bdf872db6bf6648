//! Truncated-JSON repair shared by Stage 1 and Stage 2 (§4.6, §4.7).
//!
//! When a provider stops mid-object because it ran out of tokens, the tail
//! of the JSON is usually a well-formed prefix: an open string, then some
//! number of open arrays/objects. Closing those in the right order recovers
//! a parseable (if partial) document far more often than discarding the
//! whole response.

use serde_json::Value;

/// Attempt to parse `raw` as-is; on failure, close any open strings,
/// brackets, and braces (in the order they were opened) and retry.
/// Returns `None` if neither attempt parses.
pub fn repair_truncated_json(raw: &str) -> Option<Value> {
    if let Ok(value) = serde_json::from_str(raw) {
        return Some(value);
    }

    let trimmed = extract_json_like_prefix(raw)?;
    let closed = close_open_structures(&trimmed);
    serde_json::from_str(&closed).ok()
}

/// Find the first `{` or `[` and return the substring from there, since
/// providers sometimes prefix JSON with prose before the object starts.
fn extract_json_like_prefix(raw: &str) -> Option<String> {
    let start = raw.find(['{', '['])?;
    Some(raw[start..].to_string())
}

fn close_open_structures(s: &str) -> String {
    let mut stack = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for ch in s.chars() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => stack.push('}'),
            '[' => stack.push(']'),
            '}' | ']' => {
                stack.pop();
            }
            _ => {}
        }
    }

    let mut repaired = s.to_string();
    if in_string {
        repaired.push('"');
    }
    while let Some(closer) = stack.pop() {
        repaired.push(closer);
    }
    repaired
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn well_formed_json_parses_directly() {
        let value = repair_truncated_json(r#"{"a": 1}"#).unwrap();
        assert_eq!(value["a"], 1);
    }

    #[test]
    fn truncated_inside_open_string_is_repaired() {
        let raw = r#"{"entities": [{"name": "Juan Pe"#;
        let value = repair_truncated_json(raw).unwrap();
        assert_eq!(value["entities"][0]["name"], "Juan Pe");
    }

    #[test]
    fn truncated_after_closed_object_needs_only_outer_closers() {
        let raw = r#"{"entities": [{"name": "Juan"}, {"name": "Maria"#;
        let value = repair_truncated_json(raw).unwrap();
        assert_eq!(value["entities"][0]["name"], "Juan");
        assert_eq!(value["entities"][1]["name"], "Maria");
    }

    #[test]
    fn garbage_with_no_brace_returns_none() {
        assert!(repair_truncated_json("not json at all").is_none());
    }

    #[test]
    fn leading_prose_before_json_is_stripped() {
        let raw = r#"Here is the result: {"a": 1}"#;
        let value = repair_truncated_json(raw).unwrap();
        assert_eq!(value["a"], 1);
    }
}
