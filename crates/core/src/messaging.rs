//! Per-agent inboxes and broadcast channels (C8).
//!
//! Point-to-point messages land in the recipient's inbox (a bounded
//! `VecDeque`, oldest dropped first), grounded on the teacher's
//! `BidirectionalEventChannel`/`StatusStream` pairing of a direct channel
//! with a fan-out one. Broadcasts don't get their own storage: they're
//! just an event appended to the project's event log, which every
//! subscriber already receives.

use std::collections::{HashMap, VecDeque};

use chrono::Utc;
use swarm_common::InboxMessage;

const INBOX_CAPACITY: usize = 256;

#[derive(Default)]
pub struct Inboxes {
    boxes: HashMap<String, VecDeque<InboxMessage>>,
    next_seq: u64,
}

impl Inboxes {
    pub fn send(
        &mut self,
        from: String,
        to: String,
        thread: Option<String>,
        body: serde_json::Value,
    ) -> InboxMessage {
        self.next_seq += 1;
        let message = InboxMessage {
            seq: self.next_seq,
            from,
            to: to.clone(),
            thread,
            body,
            ts: Utc::now(),
        };
        let inbox = self.boxes.entry(to).or_default();
        if inbox.len() >= INBOX_CAPACITY {
            inbox.pop_front();
        }
        inbox.push_back(message.clone());
        message
    }

    pub fn fetch(&self, agent: &str, since: u64) -> Vec<InboxMessage> {
        self.boxes
            .get(agent)
            .map(|inbox| inbox.iter().filter(|m| m.seq > since).cloned().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_returns_only_messages_after_since() {
        let mut inboxes = Inboxes::default();
        inboxes.send("ada".to_string(), "grace".to_string(), None, serde_json::json!("one"));
        let second = inboxes.send("ada".to_string(), "grace".to_string(), None, serde_json::json!("two"));

        let all = inboxes.fetch("grace", 0);
        assert_eq!(all.len(), 2);

        let after_first = inboxes.fetch("grace", all[0].seq);
        assert_eq!(after_first.len(), 1);
        assert_eq!(after_first[0].seq, second.seq);
    }

    #[test]
    fn unknown_recipient_returns_empty_inbox() {
        let inboxes = Inboxes::default();
        assert!(inboxes.fetch("ghost", 0).is_empty());
    }

    #[test]
    fn inbox_evicts_oldest_past_capacity() {
        let mut inboxes = Inboxes::default();
        for i in 0..(INBOX_CAPACITY + 10) {
            inboxes.send("ada".to_string(), "grace".to_string(), None, serde_json::json!(i));
        }
        let all = inboxes.fetch("grace", 0);
        assert_eq!(all.len(), INBOX_CAPACITY);
        assert_eq!(all[0].body, serde_json::json!(10));
    }
}
