//! UI-agnostic conversation state
//!
//! The transcript is shared between the TUI and the one-shot CLI commands and
//! doesn't depend on any UI framework. Messages are immutable once created and
//! the transcript only ever grows at the end, so display order is always
//! send/receive order.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// Opaque message identifier, unique and increasing within one transcript
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MessageId(u64);

/// The role of a chat message sender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

impl ChatRole {
    /// Label shown next to messages and in exported transcripts
    pub fn label(&self) -> &'static str {
        match self {
            ChatRole::User => "You",
            ChatRole::Assistant => "Assistant",
        }
    }
}

/// A chat message in the conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    id: MessageId,
    role: ChatRole,
    raw_text: String,
    attachment_name: Option<String>,
    created_at: DateTime<Local>,
    is_error: bool,
}

impl ChatMessage {
    pub fn id(&self) -> MessageId {
        self.id
    }

    pub fn role(&self) -> ChatRole {
        self.role
    }

    pub fn raw_text(&self) -> &str {
        &self.raw_text
    }

    pub fn attachment_name(&self) -> Option<&str> {
        self.attachment_name.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Local> {
        self.created_at
    }

    pub fn is_error(&self) -> bool {
        self.is_error
    }

    /// `HH:MM` as shown beside each message
    pub fn time_label(&self) -> String {
        self.created_at.format("%H:%M").to_string()
    }
}

/// Append-only ordered list of messages for one session
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    messages: Vec<ChatMessage>,
    next_id: u64,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_user(&mut self, text: impl Into<String>, attachment_name: Option<String>) -> MessageId {
        self.push_at(ChatRole::User, text.into(), attachment_name, false, Local::now())
    }

    pub fn push_assistant(&mut self, text: impl Into<String>) -> MessageId {
        self.push_at(ChatRole::Assistant, text.into(), None, false, Local::now())
    }

    /// Assistant-side message flagged as a failed request
    pub fn push_error(&mut self, text: impl Into<String>) -> MessageId {
        self.push_at(ChatRole::Assistant, text.into(), None, true, Local::now())
    }

    pub(crate) fn push_at(
        &mut self,
        role: ChatRole,
        raw_text: String,
        attachment_name: Option<String>,
        is_error: bool,
        created_at: DateTime<Local>,
    ) -> MessageId {
        let id = MessageId(self.next_id);
        self.next_id += 1;
        self.messages.push(ChatMessage {
            id,
            role,
            raw_text,
            attachment_name,
            created_at,
            is_error,
        });
        id
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ChatMessage> {
        self.messages.iter()
    }

    pub fn get(&self, id: MessageId) -> Option<&ChatMessage> {
        self.messages
            .binary_search_by_key(&id, |m| m.id)
            .ok()
            .map(|i| &self.messages[i])
    }

    pub fn last(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }

    /// Most recent non-error assistant reply
    pub fn last_reply(&self) -> Option<&ChatMessage> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == ChatRole::Assistant && !m.is_error)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_keep_send_order() {
        let mut transcript = Transcript::new();
        let first = transcript.push_user("hello", None);
        let second = transcript.push_assistant("hi there");
        let third = transcript.push_user("", Some("notes.pdf".to_string()));
        let fourth = transcript.push_error("Something went wrong. Please try again.");

        assert!(first < second && second < third && third < fourth);
        let roles: Vec<ChatRole> = transcript.iter().map(|m| m.role()).collect();
        assert_eq!(
            roles,
            vec![ChatRole::User, ChatRole::Assistant, ChatRole::User, ChatRole::Assistant]
        );
        assert_eq!(transcript.len(), 4);
        assert_eq!(transcript.last().map(|m| m.id()), Some(fourth));
    }

    #[test]
    fn test_lookup_by_id() {
        let mut transcript = Transcript::new();
        transcript.push_user("a", None);
        let reply = transcript.push_assistant("b");

        let message = transcript.get(reply).expect("reply present");
        assert_eq!(message.raw_text(), "b");
        assert!(!message.is_error());
        assert_eq!(message.attachment_name(), None);
        assert!(message.created_at() <= Local::now());
    }

    #[test]
    fn test_last_reply_skips_errors() {
        let mut transcript = Transcript::new();
        assert!(transcript.last_reply().is_none());
        transcript.push_assistant("good answer");
        transcript.push_error("failed");

        assert_eq!(transcript.last_reply().map(|m| m.raw_text()), Some("good answer"));
    }

    #[test]
    fn test_role_labels() {
        assert_eq!(ChatRole::User.label(), "You");
        assert_eq!(ChatRole::Assistant.label(), "Assistant");
        assert_eq!(
            serde_json::to_string(&ChatRole::Assistant).unwrap(),
            "\"assistant\""
        );
    }
}
