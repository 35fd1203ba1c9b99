//! Conversation history over the append-only log.
//!
//! The agent action family persists chat history under
//! `agent_conversation_<id>`. Sessions hydrate all prior messages on
//! construction, dispatch to typed variants by the `type` field, and
//! write every emitted message back to the same log.

use crate::error::Result;
use crate::executable::ChatMessage;
use crate::storage::Storage;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

/// Log key for a conversation ID.
pub fn conversation_log_key(id: &str) -> String {
    format!("agent_conversation_{id}")
}

/// One persisted conversation entry, dispatched by `type`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConversationMessage {
    /// A user turn
    UserMessage {
        /// Message text
        content: String,
    },
    /// An assistant turn
    AssistantMessage {
        /// Message text
        content: String,
    },
    /// A system prompt recorded alongside the exchange
    SystemMessage {
        /// Message text
        content: String,
    },
}

impl ConversationMessage {
    /// Role string for LLM requests.
    pub fn role(&self) -> &'static str {
        match self {
            Self::UserMessage { .. } => "user",
            Self::AssistantMessage { .. } => "assistant",
            Self::SystemMessage { .. } => "system",
        }
    }

    /// Message text.
    pub fn content(&self) -> &str {
        match self {
            Self::UserMessage { content }
            | Self::AssistantMessage { content }
            | Self::SystemMessage { content } => content,
        }
    }
}

/// A hydrated conversation bound to its log.
pub struct Conversation {
    id: String,
    storage: Arc<Storage>,
    messages: Vec<ConversationMessage>,
}

impl Conversation {
    /// Load all prior messages for a conversation ID. Entries with an
    /// unknown `type` are logged and skipped rather than failing the
    /// hydration.
    pub fn load(storage: Arc<Storage>, id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        let mut messages = Vec::new();
        for entry in storage.read_log(&conversation_log_key(&id))? {
            match serde_json::from_value::<ConversationMessage>(entry.clone()) {
                Ok(message) => messages.push(message),
                Err(e) => {
                    let kind = entry
                        .get("type")
                        .and_then(|t| t.as_str())
                        .unwrap_or("<missing>");
                    warn!(conversation = %id, kind = %kind, error = %e, "skipping unknown conversation entry");
                }
            }
        }
        Ok(Self { id, storage, messages })
    }

    /// Conversation ID.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Hydrated messages, oldest first.
    pub fn messages(&self) -> &[ConversationMessage] {
        &self.messages
    }

    /// Append a message to the log and the in-memory history.
    pub fn append(&mut self, message: ConversationMessage) -> Result<()> {
        let entry = serde_json::to_value(&message)?;
        self.storage.append(&conversation_log_key(&self.id), &entry)?;
        self.messages.push(message);
        Ok(())
    }

    /// History shaped for an LLM request.
    pub fn chat_messages(&self) -> Vec<ChatMessage> {
        self.messages
            .iter()
            .map(|m| ChatMessage {
                role: m.role().to_string(),
                content: m.content().to_string(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StorageOptions;
    use serde_json::json;

    fn memory_storage() -> Arc<Storage> {
        Arc::new(Storage::open(StorageOptions::default()).unwrap())
    }

    #[test]
    fn append_then_reload_round_trips() {
        let storage = memory_storage();
        let mut conversation = Conversation::load(Arc::clone(&storage), "c1").unwrap();
        assert!(conversation.messages().is_empty());

        conversation
            .append(ConversationMessage::UserMessage {
                content: "hi".to_string(),
            })
            .unwrap();
        conversation
            .append(ConversationMessage::AssistantMessage {
                content: "hello".to_string(),
            })
            .unwrap();

        let reloaded = Conversation::load(storage, "c1").unwrap();
        assert_eq!(reloaded.messages().len(), 2);
        assert_eq!(reloaded.messages()[0].role(), "user");
        assert_eq!(reloaded.messages()[1].content(), "hello");
    }

    #[test]
    fn unknown_entry_types_are_skipped() {
        let storage = memory_storage();
        storage
            .append(
                &conversation_log_key("c2"),
                &json!({"type": "tool_call", "name": "search"}),
            )
            .unwrap();
        storage
            .append(
                &conversation_log_key("c2"),
                &json!({"type": "user_message", "content": "still here"}),
            )
            .unwrap();

        let conversation = Conversation::load(storage, "c2").unwrap();
        assert_eq!(conversation.messages().len(), 1);
        assert_eq!(conversation.messages()[0].content(), "still here");
    }

    #[test]
    fn conversations_are_isolated_by_id() {
        let storage = memory_storage();
        let mut a = Conversation::load(Arc::clone(&storage), "a").unwrap();
        a.append(ConversationMessage::UserMessage {
            content: "for a".to_string(),
        })
        .unwrap();

        let b = Conversation::load(storage, "b").unwrap();
        assert!(b.messages().is_empty());
    }

    #[test]
    fn chat_messages_carry_roles() {
        let storage = memory_storage();
        let mut conversation = Conversation::load(storage, "c3").unwrap();
        conversation
            .append(ConversationMessage::SystemMessage {
                content: "be nice".to_string(),
            })
            .unwrap();
        let chat = conversation.chat_messages();
        assert_eq!(chat[0].role, "system");
        assert_eq!(chat[0].content, "be nice");
    }
}
