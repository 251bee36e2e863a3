//! Live-subscription message store.
//!
//! Subscribers receive the full, current record set of a conversation on
//! every change (not a diff), in delivery order. Dropping the receiver is
//! the unsubscribe.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::watch;

use crate::{error::ProtoError, record::MessageRecord};

#[async_trait]
pub trait MessageFeed: Send + Sync {
    /// Subscribe to a conversation's records.
    fn subscribe(&self, conversation_id: &str) -> watch::Receiver<Vec<MessageRecord>>;

    /// Accept a new fanned-out record.
    async fn publish(&self, record: MessageRecord) -> Result<(), ProtoError>;
}

/// In-process feed. Records are kept in timestamp order.
#[derive(Default)]
pub struct MemoryFeed {
    conversations: Mutex<HashMap<String, watch::Sender<Vec<MessageRecord>>>>,
}

impl MemoryFeed {
    pub fn new() -> Self {
        Self::default()
    }

    fn sender(&self, conversation_id: &str) -> watch::Sender<Vec<MessageRecord>> {
        self.conversations
            .lock()
            .entry(conversation_id.to_string())
            .or_insert_with(|| watch::channel(Vec::new()).0)
            .clone()
    }

    /// Current snapshot of a conversation.
    pub fn records(&self, conversation_id: &str) -> Vec<MessageRecord> {
        self.sender(conversation_id).borrow().clone()
    }
}

#[async_trait]
impl MessageFeed for MemoryFeed {
    fn subscribe(&self, conversation_id: &str) -> watch::Receiver<Vec<MessageRecord>> {
        self.sender(conversation_id).subscribe()
    }

    async fn publish(&self, record: MessageRecord) -> Result<(), ProtoError> {
        let sender = self.sender(&record.conversation_id);
        sender.send_modify(|records| {
            // Stable insert keeps same-timestamp records in arrival order.
            let at = records.partition_point(|r| r.timestamp <= record.timestamp);
            records.insert(at, record);
        });
        Ok(())
    }
}
