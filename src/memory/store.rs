//! Conversation history storage
//!
//! Stores completed user/agent exchanges, at most one open exchange at the
//! tail, and an optional priming text that is never evicted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// One user message and the agent response paired with it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversationTurn {
    pub user_message: String,
    /// `None` while the agent has not answered yet
    pub response: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ConversationTurn {
    pub fn open(user_message: impl Into<String>) -> Self {
        Self {
            user_message: user_message.into(),
            response: None,
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn completed(user_message: impl Into<String>, response: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            user_message: user_message.into(),
            response: Some(response.into()),
            started_at: now,
            completed_at: Some(now),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.response.is_some()
    }

    /// Characters contributed to the serialized conversation
    pub fn char_count(&self) -> usize {
        self.user_message.chars().count()
            + self.response.as_deref().map_or(0, |r| r.chars().count())
    }
}

/// Ordered turns owned by one session
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ConversationHistory {
    /// Context-priming text; survives every prune
    #[serde(default, skip_serializing_if = "Option::is_none")]
    primer: Option<String>,
    turns: Vec<ConversationTurn>,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_primer(primer: impl Into<String>) -> Self {
        Self {
            primer: Some(primer.into()),
            turns: Vec::new(),
        }
    }

    pub(crate) fn from_parts(primer: Option<String>, turns: Vec<ConversationTurn>) -> Self {
        Self { primer, turns }
    }

    pub fn primer(&self) -> Option<&str> {
        self.primer.as_deref()
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    /// Number of turns (the primer is not a turn)
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Append a completed exchange
    pub fn push_completed(&mut self, turn: ConversationTurn) {
        debug_assert!(turn.is_complete());
        self.turns.push(turn);
    }

    /// Open a new turn with the user's message
    ///
    /// A dangling open turn left by an earlier failure is dropped first so the
    /// history never holds two unanswered messages.
    pub fn open_turn(&mut self, user_message: impl Into<String>) {
        if self.discard_open_turn().is_some() {
            warn!("Dropped dangling open turn before opening a new one");
        }
        self.turns.push(ConversationTurn::open(user_message));
    }

    pub fn open_turn_ref(&self) -> Option<&ConversationTurn> {
        self.turns.last().filter(|t| !t.is_complete())
    }

    /// Attach the agent response to the open turn; returns false when no turn is open
    pub fn close_open_turn(&mut self, response: impl Into<String>) -> bool {
        match self.turns.last_mut() {
            Some(turn) if !turn.is_complete() => {
                turn.response = Some(response.into());
                turn.completed_at = Some(Utc::now());
                true
            }
            _ => false,
        }
    }

    /// Remove the open turn, if any, and return it
    pub fn discard_open_turn(&mut self) -> Option<ConversationTurn> {
        if self.open_turn_ref().is_some() {
            self.turns.pop()
        } else {
            None
        }
    }

    /// Total characters across primer and turns
    pub fn char_count(&self) -> usize {
        self.primer.as_deref().map_or(0, |p| p.chars().count())
            + self.turns.iter().map(ConversationTurn::char_count).sum::<usize>()
    }

    /// Render the conversation as plain text (useful for LLM prompts)
    pub fn serialized_text(&self) -> String {
        let mut text = String::new();

        if let Some(primer) = &self.primer {
            text.push_str("System: ");
            text.push_str(primer);
            text.push('\n');
        }

        for turn in &self.turns {
            text.push_str(&format!("User: {}\n", turn.user_message));
            if let Some(response) = &turn.response {
                text.push_str(&format!("Agent: {}\n", response));
            }
        }

        text
    }

    /// Clear all turns; the primer stays
    pub fn clear(&mut self) {
        self.turns.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_and_close_turn() {
        let mut history = ConversationHistory::new();
        history.open_turn("What is RSI?");

        assert_eq!(history.len(), 1);
        assert!(history.open_turn_ref().is_some());

        assert!(history.close_open_turn("RSI is a momentum oscillator..."));
        assert!(history.open_turn_ref().is_none());
        assert!(history.turns()[0].is_complete());
        assert!(history.turns()[0].completed_at.is_some());
    }

    #[test]
    fn test_close_without_open_turn() {
        let mut history = ConversationHistory::new();
        history.push_completed(ConversationTurn::completed("hi", "hello"));
        assert!(!history.close_open_turn("again"));
        assert_eq!(history.turns()[0].response.as_deref(), Some("hello"));
    }

    #[test]
    fn test_discard_only_touches_open_turn() {
        let mut history = ConversationHistory::new();
        history.push_completed(ConversationTurn::completed("q1", "a1"));
        assert!(history.discard_open_turn().is_none());
        assert_eq!(history.len(), 1);

        history.open_turn("q2");
        let dropped = history.discard_open_turn().unwrap();
        assert_eq!(dropped.user_message, "q2");
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn test_open_turn_replaces_dangling_turn() {
        let mut history = ConversationHistory::new();
        history.open_turn("first");
        history.open_turn("second");
        assert_eq!(history.len(), 1);
        assert_eq!(history.turns()[0].user_message, "second");
    }

    #[test]
    fn test_serialized_text_and_char_count() {
        let mut history = ConversationHistory::with_primer("You are a finance assistant");
        history.push_completed(ConversationTurn::completed("abcd", "efgh"));

        let text = history.serialized_text();
        assert!(text.starts_with("System: You are a finance assistant"));
        assert!(text.contains("User: abcd"));
        assert!(text.contains("Agent: efgh"));
        assert_eq!(history.char_count(), 27 + 8);
    }

    #[test]
    fn test_clear_keeps_primer() {
        let mut history = ConversationHistory::with_primer("primer");
        history.push_completed(ConversationTurn::completed("q", "a"));
        history.clear();
        assert!(history.is_empty());
        assert_eq!(history.primer(), Some("primer"));
    }
}
