//! Domain types shared across the chat subsystem.

use serde::{Deserialize, Serialize};

use super::ids::{MessageId, SessionId, UserId};

/// Sidebar preview: maximum characters kept from each side of the exchange.
const PREVIEW_SIDE_LEN: usize = 40;
/// Sidebar preview: maximum characters when only the prompt exists.
const PREVIEW_SINGLE_LEN: usize = 60;
/// Preview shown for a session without any messages.
pub const EMPTY_PREVIEW: &str = "No messages yet";

/// One persisted conversational exchange.
///
/// Messages are immutable once written. `owner` is denormalized from the
/// parent session for per-user queries; the store derives it from the
/// session row on insert so it can never disagree with the session's owner.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    /// Rowid assigned on insert.
    pub id: MessageId,
    /// Session this exchange belongs to.
    pub session_id: SessionId,
    /// Owner of the parent session.
    pub owner: UserId,
    /// The user's prompt text.
    pub prompt: String,
    /// The generated (or degraded diagnostic) reply text.
    pub reply: String,
    /// Milliseconds since the Unix epoch.
    pub created_at: i64,
}

/// Session metadata as shown in the session list, newest-updated first.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionSummary {
    /// Session identifier.
    pub id: SessionId,
    /// Display title.
    pub title: String,
    /// Creation timestamp in milliseconds since the Unix epoch.
    pub created_at: i64,
    /// Last activity timestamp in milliseconds since the Unix epoch.
    pub updated_at: i64,
    /// Number of messages recorded for the session.
    pub message_count: u64,
    /// Two-line preview derived from the most recent message.
    pub last_message: String,
}

/// One history entry as handed to the presentation layer, oldest first.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// The prompt as typed by the user.
    pub user_message: String,
    /// The reply returned by the gateway (possibly a degraded diagnostic).
    pub ai_response: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
}

impl From<Message> for HistoryEntry {
    fn from(message: Message) -> Self {
        Self {
            user_message: message.prompt,
            ai_response: message.reply,
            timestamp: message.created_at,
        }
    }
}

/// Truncate `text` to at most `max` characters, appending `"..."` when cut.
///
/// Operates on characters, not bytes, so multi-byte input never splits a
/// code point.
#[must_use]
pub fn truncate_with_ellipsis(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max).collect();
    out.push_str("...");
    out
}

/// Build the sidebar preview for a session's most recent exchange.
///
/// Both sides present yields a two-line `You:`/`AI:` preview; a prompt with
/// an empty reply yields a single longer line; `None` yields the fixed
/// placeholder.
#[must_use]
pub fn build_preview(last_exchange: Option<(&str, &str)>) -> String {
    match last_exchange {
        Some((prompt, reply)) if !reply.is_empty() => format!(
            "You: {}\nAI: {}",
            truncate_with_ellipsis(prompt, PREVIEW_SIDE_LEN),
            truncate_with_ellipsis(reply, PREVIEW_SIDE_LEN)
        ),
        Some((prompt, _)) => truncate_with_ellipsis(prompt, PREVIEW_SINGLE_LEN),
        None => EMPTY_PREVIEW.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_short_text_untouched() {
        assert_eq!(truncate_with_ellipsis("hello", 40), "hello");
    }

    #[test]
    fn test_truncate_long_text_gets_ellipsis() {
        let long = "x".repeat(45);
        let cut = truncate_with_ellipsis(&long, 40);
        assert_eq!(cut.chars().count(), 43);
        assert!(cut.ends_with("..."));
    }

    #[test]
    fn test_truncate_counts_chars_not_bytes() {
        let text = "héllo wörld";
        assert_eq!(truncate_with_ellipsis(text, 11), text);
    }

    #[test]
    fn test_preview_with_both_sides() {
        let preview = build_preview(Some(("How are you?", "Doing fine.")));
        assert_eq!(preview, "You: How are you?\nAI: Doing fine.");
    }

    #[test]
    fn test_preview_truncates_each_side_at_40() {
        let prompt = "p".repeat(50);
        let reply = "r".repeat(50);
        let preview = build_preview(Some((prompt.as_str(), reply.as_str())));
        let lines: Vec<&str> = preview.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("You: "));
        assert!(lines[0].ends_with("..."));
        assert_eq!(lines[0].chars().count(), 5 + 40 + 3);
        assert!(lines[1].starts_with("AI: "));
        assert_eq!(lines[1].chars().count(), 4 + 40 + 3);
    }

    #[test]
    fn test_preview_prompt_only_single_line() {
        let prompt = "q".repeat(70);
        let preview = build_preview(Some((prompt.as_str(), "")));
        assert!(!preview.contains('\n'));
        assert_eq!(preview.chars().count(), 63);
    }

    #[test]
    fn test_preview_empty_session_placeholder() {
        assert_eq!(build_preview(None), EMPTY_PREVIEW);
    }
}
