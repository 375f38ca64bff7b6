//! Conversation aggregation over the message log.
//!
//! [`ConversationSet`] is fed pages of messages in any order and groups them
//! by counterpart number. Merging is idempotent: a message id seen before
//! replaces its earlier copy instead of being added twice.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::delivery::{counterpart, Direction, MessageStatus};
use crate::types::{DbId, Timestamp};

/// One message as shown in the inbox.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboxMessage {
    pub id: DbId,
    pub external_id: Option<String>,
    pub campaign_id: Option<DbId>,
    pub from_phone: String,
    pub to_phone: String,
    pub content: String,
    pub direction: Direction,
    pub status: MessageStatus,
    pub timestamp: Timestamp,
}

impl InboxMessage {
    pub fn contact(&self) -> &str {
        counterpart(self.direction, &self.from_phone, &self.to_phone)
    }
}

/// All messages exchanged with one counterpart.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Conversation {
    pub contact: String,
    pub last_message: InboxMessage,
    pub last_message_timestamp: Timestamp,
    pub message_count: usize,
    /// Oldest first.
    pub messages: Vec<InboxMessage>,
}

#[derive(Debug, Default, Clone)]
pub struct ConversationSet {
    by_contact: HashMap<String, HashMap<DbId, InboxMessage>>,
    contact_of: HashMap<DbId, String>,
}

impl ConversationSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a page of messages. Returns how many ids were new.
    pub fn merge<I>(&mut self, page: I) -> usize
    where
        I: IntoIterator<Item = InboxMessage>,
    {
        let mut added = 0;
        for msg in page {
            let contact = msg.contact().to_string();
            match self.contact_of.get(&msg.id) {
                Some(prev) if *prev != contact => {
                    // Same id re-keyed (direction or numbers changed); move it.
                    if let Some(bucket) = self.by_contact.get_mut(prev) {
                        bucket.remove(&msg.id);
                        if bucket.is_empty() {
                            self.by_contact.remove(prev);
                        }
                    }
                }
                Some(_) => {}
                None => added += 1,
            }
            self.contact_of.insert(msg.id, contact.clone());
            self.by_contact.entry(contact).or_default().insert(msg.id, msg);
        }
        added
    }

    pub fn message_count(&self) -> usize {
        self.contact_of.len()
    }

    pub fn conversation_count(&self) -> usize {
        self.by_contact.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contact_of.is_empty()
    }

    /// Conversations, most recently active first; messages within each oldest first.
    pub fn conversations(&self) -> Vec<Conversation> {
        let mut out: Vec<Conversation> = self
            .by_contact
            .iter()
            .filter_map(|(contact, bucket)| {
                let mut messages: Vec<InboxMessage> = bucket.values().cloned().collect();
                messages.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.id.cmp(&b.id)));
                let last = messages.last()?.clone();
                Some(Conversation {
                    contact: contact.clone(),
                    last_message_timestamp: last.timestamp,
                    last_message: last,
                    message_count: messages.len(),
                    messages,
                })
            })
            .collect();

        out.sort_by(|a, b| {
            b.last_message_timestamp
                .cmp(&a.last_message_timestamp)
                .then_with(|| a.contact.cmp(&b.contact))
        });
        out
    }
}

/// Aggregate a single page in one go.
pub fn aggregate(messages: impl IntoIterator<Item = InboxMessage>) -> Vec<Conversation> {
    let mut set = ConversationSet::new();
    set.merge(messages);
    set.conversations()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    const PLATFORM: &str = "+15550009999";

    fn msg(id: DbId, contact: &str, direction: Direction, minutes: i64) -> InboxMessage {
        let (from, to) = match direction {
            Direction::Incoming => (contact, PLATFORM),
            Direction::Outgoing => (PLATFORM, contact),
        };
        InboxMessage {
            id,
            external_id: Some(format!("wamid.{id}")),
            campaign_id: None,
            from_phone: from.to_string(),
            to_phone: to.to_string(),
            content: format!("m{id}"),
            direction,
            status: if direction == Direction::Incoming {
                MessageStatus::Received
            } else {
                MessageStatus::Sent
            },
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
                + Duration::minutes(minutes),
        }
    }

    #[test]
    fn groups_by_counterpart() {
        let convs = aggregate(vec![
            msg(1, "+1555000001", Direction::Outgoing, 1),
            msg(2, "+1555000001", Direction::Incoming, 2),
            msg(3, "+1555000002", Direction::Outgoing, 3),
        ]);
        assert_eq!(convs.len(), 2);
        assert_eq!(convs[0].contact, "+1555000002");
        assert_eq!(convs[1].contact, "+1555000001");
        assert_eq!(convs[1].message_count, 2);
        assert_eq!(convs[1].last_message.id, 2);
    }

    #[test]
    fn messages_ascending_within_conversation() {
        let convs = aggregate(vec![
            msg(3, "+1555000001", Direction::Incoming, 30),
            msg(1, "+1555000001", Direction::Outgoing, 10),
            msg(2, "+1555000001", Direction::Outgoing, 20),
        ]);
        let ids: Vec<DbId> = convs[0].messages.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(convs[0].last_message_timestamp, convs[0].messages[2].timestamp);
    }

    #[test]
    fn refetching_a_page_does_not_duplicate() {
        let page1 = vec![
            msg(4, "+1555000001", Direction::Incoming, 40),
            msg(3, "+1555000002", Direction::Outgoing, 30),
        ];
        let page2 = vec![
            msg(2, "+1555000001", Direction::Outgoing, 20),
            msg(1, "+1555000003", Direction::Outgoing, 10),
        ];

        let mut set = ConversationSet::new();
        assert_eq!(set.merge(page1.clone()), 2);
        assert_eq!(set.merge(page2), 2);
        assert_eq!(set.merge(page1), 0);

        assert_eq!(set.message_count(), 4);
        assert_eq!(set.conversation_count(), 3);

        let mut ids: Vec<DbId> = set
            .conversations()
            .iter()
            .flat_map(|c| c.messages.iter().map(|m| m.id))
            .collect();
        ids.sort();
        assert_eq!(ids, vec![1, 2, 3, 4]);
    }

    #[test]
    fn refetch_replaces_with_latest_copy() {
        let mut set = ConversationSet::new();
        set.merge(vec![msg(1, "+1555000001", Direction::Outgoing, 1)]);
        let mut updated = msg(1, "+1555000001", Direction::Outgoing, 1);
        updated.status = MessageStatus::Read;
        set.merge(vec![updated]);
        let convs = set.conversations();
        assert_eq!(convs[0].messages.len(), 1);
        assert_eq!(convs[0].messages[0].status, MessageStatus::Read);
    }

    #[test]
    fn order_independent() {
        let a = vec![
            msg(1, "+1555000001", Direction::Outgoing, 1),
            msg(2, "+1555000002", Direction::Incoming, 2),
        ];
        let mut b = a.clone();
        b.reverse();
        assert_eq!(aggregate(a), aggregate(b));
    }

    #[test]
    fn empty_set() {
        let set = ConversationSet::new();
        assert!(set.is_empty());
        assert!(set.conversations().is_empty());
    }
}
