use std::sync::Arc;
use std::time::Duration;

use veil_client::{Session, SessionError, Subscription};
use veil_proto::{DecryptedMessage, MemoryDirectory, MemoryFeed};
use veil_store::{
    DecryptedKeyCache, FileKeyStorage, LocalKeyStore, MemoryKeyStorage, RegenerationConfirmation,
    StoreSettings,
};

struct World {
    directory: Arc<MemoryDirectory>,
    feed: Arc<MemoryFeed>,
}

impl World {
    fn new() -> Self {
        Self {
            directory: Arc::new(MemoryDirectory::new()),
            feed: Arc::new(MemoryFeed::new()),
        }
    }

    /// A session on a fresh device (empty key storage).
    fn device(&self, user_id: &str) -> Session {
        let keystore = LocalKeyStore::new(
            Arc::new(MemoryKeyStorage::new()),
            Arc::new(DecryptedKeyCache::new()),
        );
        Session::new(user_id, keystore, self.directory.clone(), self.feed.clone())
    }
}

fn ids(users: &[&str]) -> Vec<String> {
    users.iter().map(|u| u.to_string()).collect()
}

fn texts(messages: &[DecryptedMessage]) -> Vec<&str> {
    messages.iter().map(|m| m.text.as_str()).collect()
}

async fn wait_for_count(sub: &mut Subscription, count: usize) -> Vec<DecryptedMessage> {
    let current = sub.messages();
    if current.len() == count {
        return current;
    }
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let messages = sub.changed().await.unwrap();
            if messages.len() == count {
                return messages;
            }
        }
    })
    .await
    .expect("subscription did not reach the expected size")
}

#[tokio::test]
async fn group_send_is_readable_by_every_participant_and_the_sender() {
    let world = World::new();
    let alice = world.device("alice");
    let bob = world.device("bob");
    let carol = world.device("carol");
    for s in [&alice, &bob, &carol] {
        s.enroll("pw").await.unwrap();
    }
    let group = ids(&["alice", "bob", "carol"]);

    let record = alice.send("team", &group, "hello team").await.unwrap();
    let mut recipients: Vec<&str> = record.recipients().collect();
    recipients.sort_unstable();
    assert_eq!(recipients, vec!["alice", "bob", "carol"]);

    for s in [&alice, &bob, &carol] {
        let sub = s.subscribe("team", &group).await.unwrap();
        assert_eq!(texts(&sub.messages()), vec!["hello team"], "{}", s.user_id());
    }

    // An outsider with a published key sees nothing.
    let eve = world.device("eve");
    eve.enroll("pw").await.unwrap();
    let sub = eve.subscribe("team", &group).await.unwrap();
    assert!(sub.messages().is_empty());
}

#[tokio::test]
async fn send_aborts_when_any_participant_has_no_published_key() {
    let world = World::new();
    let alice = world.device("alice");
    let bob = world.device("bob");
    alice.enroll("pw").await.unwrap();
    bob.enroll("pw").await.unwrap();

    let err = alice
        .send("team", &ids(&["alice", "bob", "dave"]), "hi")
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::MissingParticipantKey(ref id) if id == "dave"));
    assert!(world.feed.records("team").is_empty());
}

#[tokio::test]
async fn live_subscription_follows_new_messages_in_order() {
    let world = World::new();
    let alice = world.device("alice");
    let bob = world.device("bob");
    alice.enroll("pw").await.unwrap();
    bob.enroll("pw").await.unwrap();
    let pair = ids(&["alice", "bob"]);

    let mut sub = bob.subscribe("dm", &pair).await.unwrap();
    assert!(sub.messages().is_empty());

    alice.send("dm", &pair, "first").await.unwrap();
    bob.send("dm", &pair, "second").await.unwrap();
    alice.send("dm", &pair, "third").await.unwrap();

    let messages = wait_for_count(&mut sub, 3).await;
    assert_eq!(texts(&messages), vec!["first", "second", "third"]);
    assert!(messages.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
}

#[tokio::test]
async fn regeneration_loses_history_but_new_messages_round_trip() {
    let world = World::new();
    let alice = world.device("alice");
    let bob = world.device("bob");
    alice.enroll("pw").await.unwrap();
    bob.enroll("pw").await.unwrap();
    let pair = ids(&["alice", "bob"]);

    bob.send("dm", &pair, "before").await.unwrap();

    let mut handshake = alice
        .regenerate("pw", RegenerationConfirmation::user_confirmed())
        .await
        .unwrap();
    assert!(!handshake.present().unwrap().is_empty());
    handshake.confirm().unwrap();

    bob.send("dm", &pair, "after").await.unwrap();

    let sub = alice.subscribe("dm", &pair).await.unwrap();
    assert_eq!(texts(&sub.messages()), vec!["after"]);

    // Bob still reads his own copies of both.
    let sub = bob.subscribe("dm", &pair).await.unwrap();
    assert_eq!(texts(&sub.messages()), vec!["before", "after"]);
}

#[tokio::test]
async fn lost_device_restores_from_material_and_resubscribes() {
    let world = World::new();
    let alice = world.device("alice");
    let bob = world.device("bob");
    let mut handshake = alice.enroll("pw").await.unwrap();
    let material = handshake.present().unwrap().to_string();
    handshake.confirm().unwrap();
    bob.enroll("pw").await.unwrap();
    let pair = ids(&["alice", "bob"]);

    bob.send("dm", &pair, "while you were away").await.unwrap();

    // New device: no sealed record.
    let replacement = world.device("alice");
    let err = replacement.unlock("pw").await.unwrap_err();
    assert!(err.requires_recovery());
    let err = replacement.subscribe("dm", &pair).await.unwrap_err();
    assert!(matches!(err, SessionError::Locked));

    // Someone else's material is refused.
    let stranger = veil_crypto::KeyPair::generate();
    assert!(replacement
        .restore(stranger.private.to_b64().as_str(), "pw")
        .await
        .is_err());
    assert!(!replacement.is_unlocked());

    replacement.restore(&material, "new-pw").await.unwrap();
    let sub = replacement.subscribe("dm", &pair).await.unwrap();
    assert_eq!(texts(&sub.messages()), vec!["while you were away"]);
    sub.unsubscribe();

    replacement.sign_out();
    assert!(!replacement.is_unlocked());
    replacement.unlock("new-pw").await.unwrap();
    assert!(replacement.unlock("pw").await.is_err());
}

async fn open_file_backed(world: &World, settings: &StoreSettings) -> Session {
    let storage = FileKeyStorage::open(settings.resolved_data_dir().unwrap())
        .await
        .unwrap();
    let keystore = LocalKeyStore::with_settings(
        Arc::new(storage),
        Arc::new(DecryptedKeyCache::new()),
        settings,
    );
    Session::new("alice", keystore, world.directory.clone(), world.feed.clone())
}

#[tokio::test]
async fn file_backed_keys_survive_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let world = World::new();
    let settings = StoreSettings {
        data_dir: Some(dir.path().to_path_buf()),
        ..StoreSettings::default()
    };

    let first = open_file_backed(&world, &settings).await;
    first.enroll("pw").await.unwrap();
    first.send("notes", &ids(&["alice"]), "to self").await.unwrap();
    drop(first);

    let second = open_file_backed(&world, &settings).await;
    second.unlock("pw").await.unwrap();
    let sub = second.subscribe("notes", &ids(&["alice"])).await.unwrap();
    assert_eq!(texts(&sub.messages()), vec!["to self"]);
}
