//! Bounded per-server message buffer.
//!
//! Holds the most recent Discord messages relayed into a server's channel
//! until the game server polls for them. Oldest messages are evicted first.

use std::collections::VecDeque;

use serde::Serialize;

/// Number of messages retained per server.
pub const MAX_MESSAGES: usize = 50;

/// A Discord message waiting to be polled by a game server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelayedMessage {
    /// Discord message ID (snowflake, as a string).
    pub id: String,
    /// Sender display name.
    pub username: String,
    pub content: String,
    /// Arrival time in milliseconds since the Unix epoch.
    pub timestamp: i64,
}

/// Fixed-capacity FIFO of relayed messages.
#[derive(Debug, Clone)]
pub struct MessageBuffer {
    messages: VecDeque<RelayedMessage>,
    capacity: usize,
}

impl MessageBuffer {
    pub fn new() -> Self {
        Self::with_capacity(MAX_MESSAGES)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            messages: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a message, evicting from the head once over capacity.
    pub fn append(&mut self, message: RelayedMessage) {
        self.messages.push_back(message);
        while self.messages.len() > self.capacity {
            self.messages.pop_front();
        }
    }

    /// Messages strictly after `cursor`.
    ///
    /// An absent cursor, or one that is no longer in the buffer, replays the
    /// whole buffer. Pollers must tolerate duplicates in that case.
    pub fn read_after(&self, cursor: Option<&str>) -> Vec<RelayedMessage> {
        let start = cursor
            .and_then(|id| self.messages.iter().position(|m| m.id == id))
            .map(|index| index + 1)
            .unwrap_or(0);

        self.messages.iter().skip(start).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }
}

impl Default for MessageBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(id: &str) -> RelayedMessage {
        RelayedMessage {
            id: id.to_string(),
            username: "Tester".to_string(),
            content: format!("content of {}", id),
            timestamp: 0,
        }
    }

    fn filled(count: usize) -> MessageBuffer {
        let mut buffer = MessageBuffer::new();
        for i in 1..=count {
            buffer.append(message(&format!("m{}", i)));
        }
        buffer
    }

    fn ids(messages: &[RelayedMessage]) -> Vec<&str> {
        messages.iter().map(|m| m.id.as_str()).collect()
    }

    #[test]
    fn test_evicts_oldest_over_capacity() {
        let buffer = filled(51);
        assert_eq!(buffer.len(), MAX_MESSAGES);

        let all = buffer.read_after(None);
        assert_eq!(all.first().map(|m| m.id.as_str()), Some("m2"));
        assert_eq!(all.last().map(|m| m.id.as_str()), Some("m51"));
        assert!(!all.iter().any(|m| m.id == "m1"));
    }

    #[test]
    fn test_order_preserved_after_eviction() {
        let mut buffer = MessageBuffer::with_capacity(3);
        for id in ["a", "b", "c", "d", "e"] {
            buffer.append(message(id));
            assert!(buffer.len() <= 3);
        }
        assert_eq!(ids(&buffer.read_after(None)), vec!["c", "d", "e"]);
    }

    #[test]
    fn test_read_after_cursor() {
        let buffer = filled(51);
        let newer = buffer.read_after(Some("m2"));

        assert_eq!(newer.len(), 49);
        assert_eq!(newer.first().map(|m| m.id.as_str()), Some("m3"));
        assert_eq!(newer.last().map(|m| m.id.as_str()), Some("m51"));
    }

    #[test]
    fn test_read_after_last_is_empty() {
        let buffer = filled(5);
        assert!(buffer.read_after(Some("m5")).is_empty());
    }

    #[test]
    fn test_unknown_cursor_replays_everything() {
        let buffer = filled(51);
        // m1 has been evicted
        assert_eq!(buffer.read_after(Some("m1")).len(), MAX_MESSAGES);
        assert_eq!(buffer.read_after(Some("nope")).len(), MAX_MESSAGES);
    }

    #[test]
    fn test_empty_buffer() {
        let buffer = MessageBuffer::new();
        assert_eq!(buffer.len(), 0);
        assert!(buffer.read_after(Some("m1")).is_empty());
        assert!(buffer.read_after(None).is_empty());
    }

    #[test]
    fn test_serializes_wire_shape() {
        let json = serde_json::to_value(message("m1")).unwrap();
        assert_eq!(json["id"], "m1");
        assert_eq!(json["username"], "Tester");
        assert_eq!(json["content"], "content of m1");
        assert_eq!(json["timestamp"], 0);
    }
}
