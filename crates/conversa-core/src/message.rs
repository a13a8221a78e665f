//! Conversation data shared between the core and any front end.

use chrono::Local;
use serde::{Deserialize, Serialize};

/// A single turn in the conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: u64,
    pub text: String,
    pub is_user: bool,
    pub timestamp: String,
}

impl Message {
    pub fn role(&self) -> ChatRole {
        if self.is_user {
            ChatRole::User
        } else {
            ChatRole::Assistant
        }
    }
}

/// The role of a chat message sender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::System => "system",
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        }
    }
}

/// Hands out message ids derived from the wall clock in milliseconds.
///
/// Ids are strictly increasing even when two messages are created within the
/// same millisecond or the clock steps backwards.
#[derive(Debug, Default, Clone)]
pub struct IdGenerator {
    last: u64,
}

impl IdGenerator {
    /// Continue after the highest id already present in `messages`.
    pub fn after(messages: &[Message]) -> Self {
        Self {
            last: messages.iter().map(|m| m.id).max().unwrap_or(0),
        }
    }

    pub fn next_id(&mut self) -> u64 {
        let now = u64::try_from(Local::now().timestamp_millis()).unwrap_or(0);
        self.last = now.max(self.last + 1);
        self.last
    }

    pub fn message(&mut self, text: impl Into<String>, is_user: bool) -> Message {
        Message {
            id: self.next_id(),
            text: text.into(),
            is_user,
            timestamp: Local::now().format("%H:%M:%S").to_string(),
        }
    }
}
