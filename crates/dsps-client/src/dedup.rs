// Copyright (C) 2025 DSPS Contributors
// SPDX-License-Identifier: MIT
//! Sliding-window duplicate suppression for redelivered messages.

use crate::types::Message;

/// Remembers the IDs of recently seen messages so at-least-once redelivery
/// does not reach the user callback twice. The window is bounded; a message
/// redelivered after more than `window_size` newer messages will pass again.
pub(crate) struct Dedup {
    ids: Vec<String>,
    window_size: usize,
}

impl Dedup {
    pub(crate) fn new(window_size: usize) -> Self {
        Self {
            // Grown on demand; an oversized configured window must not
            // allocate up front.
            ids: Vec::new(),
            window_size,
        }
    }

    /// Drops messages whose IDs are already in the window and records the
    /// rest. Duplicates within the same batch are dropped too.
    pub(crate) fn filter(&mut self, messages: Vec<Message>) -> Vec<Message> {
        let mut fresh = Vec::with_capacity(messages.len());
        for message in messages {
            if self.ids.iter().any(|id| *id == message.message_id) {
                continue;
            }
            self.ids.push(message.message_id.clone());
            fresh.push(message);
        }
        if self.ids.len() > self.window_size {
            let excess = self.ids.len() - self.window_size;
            self.ids.drain(..excess);
        }
        fresh
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn msg(id: &str) -> Message {
        Message {
            channel_id: "ch".to_string(),
            message_id: id.to_string(),
            content: json!({"id": id}),
        }
    }

    fn ids(messages: &[Message]) -> Vec<&str> {
        messages.iter().map(|m| m.message_id.as_str()).collect()
    }

    #[test]
    fn test_first_delivery_passes() {
        let mut dedup = Dedup::new(4);
        let out = dedup.filter(vec![msg("a"), msg("b")]);
        assert_eq!(ids(&out), vec!["a", "b"]);
    }

    #[test]
    fn test_redelivery_is_dropped() {
        let mut dedup = Dedup::new(4);
        dedup.filter(vec![msg("a"), msg("b")]);
        let out = dedup.filter(vec![msg("b"), msg("c")]);
        assert_eq!(ids(&out), vec!["c"]);
    }

    #[test]
    fn test_duplicates_within_one_batch_are_dropped() {
        let mut dedup = Dedup::new(4);
        let out = dedup.filter(vec![msg("a"), msg("a"), msg("b")]);
        assert_eq!(ids(&out), vec!["a", "b"]);
    }

    #[test]
    fn test_window_evicts_oldest() {
        let mut dedup = Dedup::new(2);
        dedup.filter(vec![msg("a"), msg("b"), msg("c")]);
        // "a" fell out of the window, so it passes again.
        let out = dedup.filter(vec![msg("a"), msg("c")]);
        assert_eq!(ids(&out), vec!["a"]);
    }

    #[test]
    fn test_empty_batch() {
        let mut dedup = Dedup::new(2);
        assert!(dedup.filter(Vec::new()).is_empty());
    }
}
