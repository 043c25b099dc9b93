//! C6: bounds conversation size before dispatch and recovers from
//! "content too long" upstream errors by shrinking the budget and
//! retrying (§4.6, driven by the engine).

use kiro_protocol::Turn;

#[derive(Debug, Clone, Copy)]
pub struct HistoryBudget {
    pub max_chars: usize,
    pub max_turns: usize,
}

impl HistoryBudget {
    /// Halves both limits, used by the engine on a "content too long"
    /// upstream error before retrying (§4.6, §4.8 `content_too_long`).
    pub fn halved(&self) -> HistoryBudget {
        HistoryBudget {
            max_chars: (self.max_chars / 2).max(1),
            max_turns: (self.max_turns / 2).max(1),
        }
    }
}

impl Default for HistoryBudget {
    fn default() -> Self {
        HistoryBudget { max_chars: 200_000, max_turns: 200 }
    }
}

fn turn_chars(turn: &Turn) -> usize {
    match turn {
        Turn::UserText(text) => text.len(),
        Turn::AssistantText(text) => text.len(),
        Turn::UserToolResults(results) => results.iter().map(|r| r.content.len()).sum(),
        Turn::AssistantToolUse(uses) => uses.iter().map(|u| u.input.to_string().len() + u.name.len()).sum(),
    }
}

fn total_chars(history: &[Turn]) -> usize {
    history.iter().map(turn_chars).sum()
}

/// Drops the oldest turns in pairs until the budget is satisfied.
/// History is constructed in adjacent pairs by every decoder (a user-ish
/// turn followed by its assistant-ish reply, or a tool-use/tool-result
/// pair), so dropping from the front two at a time never splits one.
/// The final turn is never touched since trimming only ever removes from
/// the front.
pub fn enforce(history: &mut Vec<Turn>, budget: &HistoryBudget) {
    while history.len() > 1
        && (history.len() > budget.max_turns || total_chars(history) > budget.max_chars)
    {
        let drop = if history.len() >= 2 { 2 } else { 1 };
        history.drain(0..drop);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiro_protocol::ToolResultItem;

    fn user(text: &str) -> Turn {
        Turn::UserText(text.to_string())
    }
    fn assistant(text: &str) -> Turn {
        Turn::AssistantText(text.to_string())
    }

    #[test]
    fn under_budget_is_untouched() {
        let mut history = vec![user("hi"), assistant("hello")];
        enforce(&mut history, &HistoryBudget { max_chars: 1000, max_turns: 10 });
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn drops_oldest_pairs_first() {
        let mut history = vec![
            user("first"),
            assistant("first reply"),
            user("second"),
            assistant("second reply"),
        ];
        enforce(&mut history, &HistoryBudget { max_chars: 1000, max_turns: 2 });
        assert_eq!(history.len(), 2);
        assert_eq!(history[0], user("second"));
    }

    #[test]
    fn never_drops_below_one_turn() {
        let mut history = vec![user("only")];
        enforce(&mut history, &HistoryBudget { max_chars: 1, max_turns: 1 });
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn keeps_tool_use_and_result_adjacent() {
        let mut history = vec![
            user("a"),
            assistant("b"),
            Turn::AssistantToolUse(vec![]),
            Turn::UserToolResults(vec![ToolResultItem {
                tool_use_id: "t1".into(),
                content: "ok".into(),
                is_error: false,
            }]),
        ];
        enforce(&mut history, &HistoryBudget { max_chars: 1000, max_turns: 2 });
        assert_eq!(history.len(), 2);
        assert!(matches!(history[0], Turn::AssistantToolUse(_)));
        assert!(matches!(history[1], Turn::UserToolResults(_)));
    }

    #[test]
    fn halved_budget_shrinks_both_limits() {
        let budget = HistoryBudget { max_chars: 100, max_turns: 10 };
        let shrunk = budget.halved();
        assert_eq!(shrunk.max_chars, 50);
        assert_eq!(shrunk.max_turns, 5);
    }
}
