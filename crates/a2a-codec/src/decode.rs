use serde_json::Value;

use crate::types::{CodecOutput, Phase, StatePatch};

const OPEN_TAG: &str = "<collab_state>";
const CLOSE_TAG: &str = "</collab_state>";
const MAX_LIST_ITEMS: usize = 4;

/// Decode one agent response: strip a trailing `<collab_state>` block (if
/// any) and normalize its contents. Never fails — a malformed block just
/// leaves `has_state=false` with `parse_error` set, and the caller still
/// gets usable `clean_text`.
pub fn decode(text: &str) -> CodecOutput {
    let Some((clean_text, block)) = split_block(text) else {
        return CodecOutput {
            clean_text: text.to_string(),
            state_patch: None,
            has_state: false,
            parse_error: None,
        };
    };

    match serde_json::from_str::<Value>(block.trim()) {
        Ok(Value::Object(map)) => CodecOutput {
            clean_text,
            state_patch: Some(normalize(&map)),
            has_state: true,
            parse_error: None,
        },
        Ok(_) => CodecOutput {
            clean_text,
            state_patch: None,
            has_state: false,
            parse_error: Some("collab_state block must be a JSON object".to_string()),
        },
        Err(e) => CodecOutput {
            clean_text,
            state_patch: None,
            has_state: false,
            parse_error: Some(format!("invalid JSON in collab_state block: {e}")),
        },
    }
}

/// Find the block and return `(text_with_block_removed, block_contents)`.
fn split_block(text: &str) -> Option<(String, String)> {
    let open_at = text.rfind(OPEN_TAG)?;
    let close_at = text[open_at..].find(CLOSE_TAG)? + open_at;
    let block = text[open_at + OPEN_TAG.len()..close_at].to_string();
    let clean = format!("{}{}", &text[..open_at], &text[close_at + CLOSE_TAG.len()..]);
    Some((clean.trim().to_string(), block))
}

fn normalize(map: &serde_json::Map<String, Value>) -> StatePatch {
    StatePatch {
        phase: map
            .get("phase")
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse::<Phase>().ok()),
        overlap_score: map
            .get("overlap_score")
            .and_then(|v| v.as_f64())
            .map(|f| f.clamp(0.0, 1.0)),
        turn_count: map
            .get("turn_count")
            .and_then(|v| v.as_i64())
            .map(|n| n.max(0) as u32),
        active_threads: truncated_strings(map.get("active_threads")),
        candidate_collaborations: truncated_strings(map.get("candidate_collaborations")),
        open_questions: truncated_strings(map.get("open_questions")),
        close_signal: map.get("close_signal").and_then(|v| v.as_bool()),
        confidence: map
            .get("confidence")
            .and_then(|v| v.as_f64())
            .map(|f| f.clamp(0.0, 1.0)),
    }
}

fn truncated_strings(value: Option<&Value>) -> Vec<String> {
    let Some(Value::Array(items)) = value else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|v| v.as_str().map(str::to_string))
        .take(MAX_LIST_ITEMS)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_block_returns_text_unchanged() {
        let out = decode("just a plain reply");
        assert_eq!(out.clean_text, "just a plain reply");
        assert!(!out.has_state);
        assert!(out.parse_error.is_none());
    }

    #[test]
    fn well_formed_block_is_stripped_and_parsed() {
        let text = r#"Sure, let's sync up.<collab_state>{"phase":"explore","overlap_score":1.5,"turn_count":3,"close_signal":true}</collab_state>"#;
        let out = decode(text);
        assert_eq!(out.clean_text, "Sure, let's sync up.");
        assert!(out.has_state);
        let patch = out.state_patch.unwrap();
        assert_eq!(patch.phase, Some(Phase::Explore));
        assert_eq!(patch.overlap_score, Some(1.0)); // clamped
        assert_eq!(patch.turn_count, Some(3));
        assert_eq!(patch.close_signal, Some(true));
    }

    #[test]
    fn lists_are_truncated_to_four_items() {
        let text = r#"hi<collab_state>{"open_questions":["a","b","c","d","e","f"]}</collab_state>"#;
        let out = decode(text);
        let patch = out.state_patch.unwrap();
        assert_eq!(patch.open_questions.len(), 4);
    }

    #[test]
    fn array_instead_of_object_is_a_parse_error() {
        let text = r#"hi<collab_state>[1,2,3]</collab_state>"#;
        let out = decode(text);
        assert!(!out.has_state);
        assert!(out.parse_error.is_some());
        assert_eq!(out.clean_text, "hi");
    }

    #[test]
    fn malformed_json_is_a_parse_error_but_text_still_usable() {
        let text = r#"hi<collab_state>{not json}</collab_state>"#;
        let out = decode(text);
        assert!(!out.has_state);
        assert!(out.parse_error.is_some());
        assert_eq!(out.clean_text, "hi");
    }

    #[test]
    fn unknown_phase_string_is_dropped_not_fatal() {
        let text = r#"hi<collab_state>{"phase":"bogus"}</collab_state>"#;
        let out = decode(text);
        assert!(out.has_state);
        assert_eq!(out.state_patch.unwrap().phase, None);
    }
}
