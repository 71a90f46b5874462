// ============================
// crates/backend-lib/src/chat.rs
// ============================
//! Per-room chat history.
//!
//! Append-only while the room lives; cleared when the room is destroyed.

use codemeet_common::ChatMessage;
use dashmap::DashMap;
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct ChatLog {
    history: Arc<DashMap<String, Vec<ChatMessage>>>,
}

impl ChatLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message, creating the room's log if absent
    pub fn append(&self, room_id: &str, message: ChatMessage) {
        self.history
            .entry(room_id.to_string())
            .or_default()
            .push(message);
    }

    /// The room's backlog, if any messages exist
    pub fn history(&self, room_id: &str) -> Option<Vec<ChatMessage>> {
        self.history.get(room_id).map(|h| h.value().clone())
    }

    /// Drop a room's log (room destruction)
    pub fn remove(&self, room_id: &str) {
        self.history.remove(room_id);
    }
}
