//! Conversation context handed to the reviewer

use serde_json::json;

use crate::llm::Message;

/// Inserted between the head and tail of an overlong turn
pub const TRIM_MARKER: &str = " ... [result trimmed] ...";

/// How much conversation the reviewer sees
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryWindow {
    /// Most recent turns kept
    pub turns: usize,
    /// Turns longer than this many characters are excerpted
    pub long_turn_chars: usize,
    /// Characters kept from each end of an excerpted turn
    pub excerpt_chars: usize,
}

impl Default for HistoryWindow {
    fn default() -> Self {
        Self {
            turns: 10,
            long_turn_chars: 4000,
            excerpt_chars: 2000,
        }
    }
}

impl HistoryWindow {
    /// Recent turns with long ones reduced to head and tail
    pub fn recent(&self, history: &[Message]) -> Vec<Message> {
        let start = history.len().saturating_sub(self.turns);
        history[start..]
            .iter()
            .map(|message| Message {
                role: message.role,
                content: self.excerpt(&message.content),
            })
            .collect()
    }

    fn excerpt(&self, content: &str) -> String {
        let length = content.chars().count();
        if length <= self.long_turn_chars {
            return content.to_string();
        }

        let head: String = content.chars().take(self.excerpt_chars).collect();
        let tail: String = content
            .chars()
            .skip(length.saturating_sub(self.excerpt_chars))
            .collect();
        format!("{}{}{}", head, TRIM_MARKER, tail)
    }
}

/// One JSON object per turn, one per line
pub fn render_turns(turns: &[Message]) -> String {
    turns
        .iter()
        .map(|m| json!({"role": m.role, "content": m.content}).to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MessageRole;

    #[test]
    fn test_keeps_last_turns() {
        let history: Vec<Message> = (0..15).map(|i| Message::user(format!("turn {}", i))).collect();
        let recent = HistoryWindow::default().recent(&history);
        assert_eq!(recent.len(), 10);
        assert_eq!(recent[0].content, "turn 5");
        assert_eq!(recent[9].content, "turn 14");
    }

    #[test]
    fn test_long_turn_excerpted() {
        let long = format!("{}{}{}", "a".repeat(2500), "b".repeat(1000), "c".repeat(2500));
        let recent = HistoryWindow::default().recent(&[Message::assistant(long)]);
        let content = &recent[0].content;

        assert!(content.starts_with(&"a".repeat(2000)));
        assert!(content.ends_with(&"c".repeat(2000)));
        assert!(content.contains(TRIM_MARKER));
        assert!(!content.contains('b'));
        assert_eq!(recent[0].role, MessageRole::Assistant);
    }

    #[test]
    fn test_excerpt_respects_char_boundaries() {
        let window = HistoryWindow {
            turns: 1,
            long_turn_chars: 4,
            excerpt_chars: 2,
        };
        let recent = window.recent(&[Message::user("αβγδε")]);
        assert_eq!(recent[0].content, format!("αβ{}δε", TRIM_MARKER));
    }

    #[test]
    fn test_short_history_untouched() {
        let history = vec![Message::user("Which genes cause Marfan syndrome?")];
        assert_eq!(HistoryWindow::default().recent(&history), history);
    }

    #[test]
    fn test_render_turns() {
        let rendered = render_turns(&[Message::user("hi"), Message::assistant("hello")]);
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["role"], "user");
        assert_eq!(first["content"], "hi");
    }
}
