//! Deterministic, templated responses synthesized when every real backend
//! has failed. These exist so the HTTP call in front of the adapter always
//! succeeds — the worst case is a plausible-but-canned reply plus an
//! error-level log entry upstream.

/// Synthesize a turn response from caller-facing facts alone.
pub fn turn(caller_name: &str, owner_name: &str, allowed_topics: &[String], message: &str) -> String {
    let topics = if allowed_topics.is_empty() {
        "general conversation".to_string()
    } else {
        allowed_topics.join(", ")
    };
    format!(
        "Hi {caller_name}, this is {owner_name}'s assistant. I can't reach the usual assistant \
         right now, but I've noted your message: \"{}\". Happy to talk about {topics} — mind if \
         I follow up once things are back online?",
        excerpt(message, 160)
    )
}

/// Synthesize a conversation summary from counts and the last inbound
/// message alone, when no summarizer produced a usable one.
pub fn summary(caller_name: &str, message_count: usize, last_inbound_excerpt: &str) -> String {
    format!(
        "Conversation with {caller_name} ({message_count} message{}). Last message: \"{}\".",
        if message_count == 1 { "" } else { "s" },
        excerpt(last_inbound_excerpt, 160)
    )
}

fn excerpt(s: &str, max_chars: usize) -> String {
    let trimmed = s.trim();
    let char_count = trimmed.chars().count();
    if char_count <= max_chars {
        trimmed.to_string()
    } else {
        let truncated: String = trimmed.chars().take(max_chars).collect();
        format!("{truncated}…")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn turn_mentions_caller_and_topics() {
        let text = turn("Alice", "Bob", &["scheduling".into()], "can we meet tuesday?");
        assert!(text.contains("Alice"));
        assert!(text.contains("Bob"));
        assert!(text.contains("scheduling"));
    }

    #[test]
    fn excerpt_truncates_long_messages() {
        let long = "x".repeat(500);
        let text = turn("Alice", "Bob", &[], &long);
        assert!(text.contains('…'));
    }
}
