//! Chat message assembly

use serde::{Deserialize, Serialize};

use parley_core::{TranscriptEntry, TranscriptRole};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// System prompt (with opaque KB context already appended), then the history
/// window, then the committed user turn last.
pub fn build_messages(
    system_prompt: &str,
    history: &[TranscriptEntry],
    user_turn: &str,
) -> Vec<Message> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(Message::system(system_prompt));
    for entry in history {
        messages.push(match entry.role {
            TranscriptRole::User => Message::user(&entry.text),
            TranscriptRole::Assistant => Message::assistant(&entry.text),
        });
    }
    messages.push(Message::user(user_turn));
    messages
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_messages_order() {
        let history = vec![
            TranscriptEntry::assistant("Hi, this is Jake."),
            TranscriptEntry::user("Hello"),
        ];
        let messages = build_messages("You are Jake.", &history, "I need help");

        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[1].role, Role::Assistant);
        assert_eq!(messages[2].role, Role::User);
        assert_eq!(messages[3].role, Role::User);
        assert_eq!(messages[3].content, "I need help");
    }
}
