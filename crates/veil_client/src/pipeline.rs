//! Inbound decryption pipeline.
//!
//! Each pass starts from the full current record set of a conversation,
//! never from a diff, so a restarted pipeline converges on the same output.
//! Records that cannot be read on this device are dropped without a trace
//! in the output:
//!   - no envelope addressed to this user
//!   - sender's public key unknown
//!   - decryption failure (wrong key, tampering, truncation)
//!
//! Output order is input order.

use std::collections::HashMap;
use std::fmt;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use veil_crypto::{message::decrypt_from_sender, PrivateKey, PublicKeyBytes};
use veil_proto::{DecryptedMessage, MessageRecord};

use crate::error::SessionError;

/// Everything a pass needs to decide what this device can read.
#[derive(Debug, Clone)]
pub struct PipelineContext {
    pub self_user_id: String,
    pub private_key: PrivateKey,
    /// Conversation participants with a resolved public key.
    pub participants: HashMap<String, PublicKeyBytes>,
}

fn decrypt_record(record: &MessageRecord, ctx: &PipelineContext) -> Option<DecryptedMessage> {
    let Some(envelope) = record.envelope_for(&ctx.self_user_id) else {
        trace!(record_id = %record.id, "no envelope for this user; dropped");
        return None;
    };
    let Some(sender_public) = ctx.participants.get(&record.sender_id) else {
        trace!(record_id = %record.id, sender_id = %record.sender_id, "sender key unknown; dropped");
        return None;
    };
    let text = decrypt_from_sender(envelope, sender_public, &ctx.private_key)?;
    Some(DecryptedMessage::from_record(record, text))
}

/// Lazily decrypt `records` in order, skipping anything unreadable.
pub fn decrypt_records<'a>(
    records: &'a [MessageRecord],
    ctx: &'a PipelineContext,
) -> impl Iterator<Item = DecryptedMessage> + 'a {
    records.iter().filter_map(move |record| decrypt_record(record, ctx))
}

/// A live decryption pass over a feed subscription.
///
/// A background task re-runs the pipeline on every feed update and
/// publishes the result. Dropping the subscription (or calling
/// `unsubscribe`) stops the task; a new key after recovery needs a new
/// subscription.
pub struct Subscription {
    output: watch::Receiver<Vec<DecryptedMessage>>,
    task: JoinHandle<()>,
}

impl Subscription {
    /// Must be called inside a tokio runtime.
    pub fn spawn(mut input: watch::Receiver<Vec<MessageRecord>>, ctx: PipelineContext) -> Self {
        let snapshot = input.borrow_and_update().clone();
        let initial: Vec<DecryptedMessage> = decrypt_records(&snapshot, &ctx).collect();
        let (tx, output) = watch::channel(initial);

        let task = tokio::spawn(async move {
            while input.changed().await.is_ok() {
                let records = input.borrow_and_update().clone();
                let messages: Vec<DecryptedMessage> = decrypt_records(&records, &ctx).collect();
                trace!(
                    records = records.len(),
                    readable = messages.len(),
                    "pipeline pass"
                );
                if tx.send(messages).is_err() {
                    break;
                }
            }
            debug!(user_id = %ctx.self_user_id, "decryption pipeline stopped");
        });

        Self { output, task }
    }

    /// The latest decrypted message list.
    pub fn messages(&self) -> Vec<DecryptedMessage> {
        self.output.borrow().clone()
    }

    /// Wait for the next pass and return its output.
    pub async fn changed(&mut self) -> Result<Vec<DecryptedMessage>, SessionError> {
        self.output
            .changed()
            .await
            .map_err(|_| SessionError::SubscriptionClosed)?;
        Ok(self.output.borrow_and_update().clone())
    }

    pub fn unsubscribe(self) {}
}

// Decrypted text stays out of debug output.
impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("messages", &self.output.borrow().len())
            .field("finished", &self.task.is_finished())
            .finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::time::Duration;

    use veil_crypto::{message::encrypt_for_recipient, KeyPair};

    struct Fixture {
        alice: KeyPair,
        bob: KeyPair,
        ctx: PipelineContext,
    }

    fn fixture() -> Fixture {
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();
        let ctx = PipelineContext {
            self_user_id: "bob".into(),
            private_key: bob.private.clone(),
            participants: [("alice".to_string(), alice.public), ("bob".to_string(), bob.public)]
                .into_iter()
                .collect(),
        };
        Fixture { alice, bob, ctx }
    }

    fn record_to(
        text: &str,
        sender_id: &str,
        sender: &KeyPair,
        recipients: &[(&str, &PublicKeyBytes)],
    ) -> MessageRecord {
        let envelopes: BTreeMap<_, _> = recipients
            .iter()
            .map(|(id, key)| {
                (id.to_string(), encrypt_for_recipient(text, key, &sender.private).unwrap())
            })
            .collect();
        MessageRecord::new("conv", sender_id, envelopes)
    }

    #[test]
    fn unreadable_records_are_dropped_and_order_kept() {
        let f = fixture();
        let stranger = KeyPair::generate();

        let first = record_to("one", "alice", &f.alice, &[("bob", &f.bob.public)]);
        let not_for_bob = record_to("secret", "alice", &f.alice, &[("carol", &stranger.public)]);
        let unknown_sender = record_to("hi", "mallory", &stranger, &[("bob", &f.bob.public)]);
        let mut tampered = record_to("evil", "alice", &f.alice, &[("bob", &f.bob.public)]);
        tampered
            .per_recipient_envelopes
            .insert("bob".into(), "AAAA".into());
        let last = record_to("two", "alice", &f.alice, &[("bob", &f.bob.public)]);

        let records = vec![first, not_for_bob, unknown_sender, tampered, last];
        let texts: Vec<String> = decrypt_records(&records, &f.ctx).map(|m| m.text).collect();
        assert_eq!(texts, vec!["one", "two"]);
    }

    #[test]
    fn own_sent_copy_is_readable() {
        let f = fixture();
        let sent = record_to(
            "mine",
            "bob",
            &f.bob,
            &[("alice", &f.alice.public), ("bob", &f.bob.public)],
        );
        let out: Vec<_> = decrypt_records(std::slice::from_ref(&sent), &f.ctx).collect();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].sender_id, "bob");
        assert_eq!(out[0].id, sent.id);
    }

    #[tokio::test]
    async fn subscription_reevaluates_full_set_on_each_update() {
        let f = fixture();
        let first = record_to("one", "alice", &f.alice, &[("bob", &f.bob.public)]);
        let (tx, rx) = watch::channel(vec![first.clone()]);

        let mut sub = Subscription::spawn(rx, f.ctx.clone());
        assert_eq!(sub.messages().len(), 1);

        let second = record_to("two", "alice", &f.alice, &[("bob", &f.bob.public)]);
        tx.send(vec![first, second]).unwrap();
        let texts: Vec<String> = tokio::time::timeout(Duration::from_secs(5), sub.changed())
            .await
            .unwrap()
            .unwrap()
            .into_iter()
            .map(|m| m.text)
            .collect();
        assert_eq!(texts, vec!["one", "two"]);

        // Records can also disappear; the output follows the input set.
        tx.send(Vec::new()).unwrap();
        let out = tokio::time::timeout(Duration::from_secs(5), sub.changed())
            .await
            .unwrap()
            .unwrap();
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn closed_feed_ends_subscription() {
        let f = fixture();
        let (tx, rx) = watch::channel(Vec::new());
        let mut sub = Subscription::spawn(rx, f.ctx.clone());
        drop(tx);
        let result = tokio::time::timeout(Duration::from_secs(5), sub.changed())
            .await
            .unwrap();
        assert!(matches!(result, Err(SessionError::SubscriptionClosed)));
    }

    #[tokio::test]
    async fn debug_output_omits_plaintext() {
        let f = fixture();
        let record = record_to("attack at dawn", "alice", &f.alice, &[("bob", &f.bob.public)]);
        let (_tx, rx) = watch::channel(vec![record]);
        let sub = Subscription::spawn(rx, f.ctx.clone());

        let shown = format!("{sub:?}");
        assert!(shown.starts_with("Subscription"));
        assert!(shown.contains("messages: 1"));
        assert!(!shown.contains("attack at dawn"));
    }
}
