//! History pruning
//!
//! Bounds a conversation to its most recent turns without ever splitting a
//! user message from its response.

use crate::memory::store::{ConversationHistory, ConversationTurn};

/// Keep at most `max_turns` most recent turns
///
/// Pure: the input is left untouched. An unanswered turn is only kept when it is
/// the newest one; an open turn at the retained boundary is dropped whole. The
/// primer is always preserved.
pub fn prune(history: &ConversationHistory, max_turns: usize) -> ConversationHistory {
    let turns = history.turns();

    if max_turns >= turns.len() {
        return history.clone();
    }

    let newest = turns.len() - 1;
    let start = turns.len() - max_turns;

    let kept: Vec<ConversationTurn> = turns[start..]
        .iter()
        .enumerate()
        .filter(|(offset, turn)| turn.is_complete() || start + offset == newest)
        .map(|(_, turn)| turn.clone())
        .collect();

    ConversationHistory::from_parts(history.primer().map(str::to_string), kept)
}

/// Note prepended to the runtime context once older turns have been evicted
pub fn context_notice(evicted_turns: usize, max_turns: usize) -> Option<String> {
    if evicted_turns == 0 {
        return None;
    }

    Some(format!(
        "[Context Management: Removed {} older turns to prevent context bloat.\nKeeping last {} conversation turns.]",
        evicted_turns, max_turns
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history_of(n: usize) -> ConversationHistory {
        let mut history = ConversationHistory::new();
        for i in 0..n {
            history.push_completed(ConversationTurn::completed(
                format!("Question {}", i),
                format!("Answer {}", i),
            ));
        }
        history
    }

    fn sample_histories() -> Vec<ConversationHistory> {
        let mut samples = Vec::new();
        for n in 0..8 {
            samples.push(history_of(n));

            let mut open_tail = history_of(n);
            open_tail.open_turn("pending question");
            samples.push(open_tail);

            let mut primed = ConversationHistory::with_primer("context");
            for turn in history_of(n).turns() {
                primed.push_completed(turn.clone());
            }
            samples.push(primed);
        }
        samples
    }

    #[test]
    fn test_prune_keeps_most_recent() {
        let pruned = prune(&history_of(7), 5);
        assert_eq!(pruned.len(), 5);
        assert_eq!(pruned.turns()[0].user_message, "Question 2");
        assert_eq!(pruned.turns()[4].user_message, "Question 6");
    }

    #[test]
    fn test_prune_noop_when_under_limit() {
        let history = history_of(3);
        assert_eq!(prune(&history, 3), history);
        assert_eq!(prune(&history, 10), history);
    }

    #[test]
    fn test_prune_zero_yields_empty() {
        let pruned = prune(&history_of(4), 0);
        assert!(pruned.is_empty());
    }

    #[test]
    fn test_prune_preserves_primer() {
        let mut history = ConversationHistory::with_primer("You manage a portfolio");
        for turn in history_of(6).turns() {
            history.push_completed(turn.clone());
        }
        let pruned = prune(&history, 2);
        assert_eq!(pruned.primer(), Some("You manage a portfolio"));
        assert_eq!(pruned.len(), 2);

        let emptied = prune(&history, 0);
        assert_eq!(emptied.primer(), Some("You manage a portfolio"));
    }

    #[test]
    fn test_prune_keeps_open_tail() {
        let mut history = history_of(6);
        history.open_turn("Buy 10 AAPL");
        let pruned = prune(&history, 3);
        assert_eq!(pruned.len(), 3);
        assert_eq!(pruned.turns()[2].user_message, "Buy 10 AAPL");
        assert!(pruned.open_turn_ref().is_some());
    }

    #[test]
    fn test_prune_drops_open_turn_at_boundary() {
        // Only reachable from deserialized state; the history API never builds it.
        let mut turns: Vec<ConversationTurn> = history_of(4).turns().to_vec();
        turns.insert(2, ConversationTurn::open("orphan"));
        let history = ConversationHistory::from_parts(None, turns);

        let pruned = prune(&history, 3);
        assert!(pruned.turns().iter().all(ConversationTurn::is_complete));
        assert_eq!(pruned.len(), 2);
    }

    #[test]
    fn test_prune_is_idempotent() {
        for history in sample_histories() {
            for limit in 0..9 {
                let once = prune(&history, limit);
                assert_eq!(prune(&once, limit), once, "limit {}", limit);
            }
        }
    }

    #[test]
    fn test_prune_respects_bound_and_pairing() {
        for history in sample_histories() {
            for limit in 0..9 {
                let pruned = prune(&history, limit);
                assert!(pruned.len() <= limit);

                let last = pruned.len().saturating_sub(1);
                for (i, turn) in pruned.turns().iter().enumerate() {
                    assert!(turn.is_complete() || i == last);
                }
            }
        }
    }

    #[test]
    fn test_context_notice() {
        assert!(context_notice(0, 5).is_none());
        let notice = context_notice(4, 5).unwrap();
        assert!(notice.contains("Removed 4 older turns"));
        assert!(notice.contains("Keeping last 5"));
    }
}
