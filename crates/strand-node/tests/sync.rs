//! Multi-node synchronisation over the in-memory bus and a shared object
//! store.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use strand_net::{MemoryHub, PubSub};
use strand_shared::{Announcement, ThreadIdentity};
use strand_store::objects::DirLinks;
use strand_store::{MemoryObjectStore, ObjectError, ObjectStore, ThreadRegistry};
use strand_node::{NewPhoto, Node, NodeError, NodeOptions, UpdateNotification};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const THREAD: &str = "family";
const WAIT: Duration = Duration::from_secs(5);

fn node_with(hub: &MemoryHub, peer: &str, objects: Arc<dyn ObjectStore>, fetch_timeout: Duration) -> Arc<Node> {
    Arc::new(
        Node::new(
            Arc::new(ThreadRegistry::open_in_memory().unwrap()),
            objects,
            Arc::new(hub.connect(peer)),
            NodeOptions {
                username: Some(peer.to_string()),
                fetch_timeout,
            },
        )
        .unwrap(),
    )
}

fn node(hub: &MemoryHub, peer: &str, store: &MemoryObjectStore) -> Arc<Node> {
    node_with(hub, peer, Arc::new(store.clone()), Duration::from_secs(5))
}

fn photo(name: &str) -> NewPhoto {
    NewPhoto {
        photo: format!("{name}-full").into_bytes(),
        thumb: format!("{name}-thumb").into_bytes(),
        name: name.to_string(),
        ext: ".jpg".into(),
        created: Utc::now(),
        caption: Some(format!("{name} caption")),
    }
}

async fn next_update(rx: &mut mpsc::Receiver<UpdateNotification>) -> UpdateNotification {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for an update")
        .expect("notification channel closed")
}

/// Two nodes in one thread: `a` created it, `b` joined with its phrase.
async fn pair(hub: &MemoryHub, store: &MemoryObjectStore) -> (Arc<Node>, Arc<Node>, ThreadIdentity) {
    let a = node(hub, "peer-a", store);
    let b = node(hub, "peer-b", store);
    let thread = a.add_thread(THREAD, None).await.unwrap();
    b.add_thread(THREAD, Some(thread.phrase())).await.unwrap();
    (a, b, thread)
}

#[tokio::test]
async fn test_announcement_backfills_whole_chain() {
    let hub = MemoryHub::new();
    let store = MemoryObjectStore::new();
    let a = node(&hub, "peer-a", &store);
    let thread = a.add_thread(THREAD, None).await.unwrap();

    // Published before anyone else is listening.
    let mut published = Vec::new();
    for i in 0..3 {
        published.push(a.add_photo_data(photo(&format!("early{i}")), THREAD).await.unwrap());
    }

    let b = node(&hub, "peer-b", &store);
    let mut updates = b.subscribe_updates();
    b.add_thread(THREAD, Some(thread.phrase())).await.unwrap();

    published.push(a.add_photo_data(photo("late"), THREAD).await.unwrap());

    // Newest first, walking back to genesis.
    for expected in published.iter().rev() {
        let n = next_update(&mut updates).await;
        assert_eq!(&n.update.content_id, expected);
        assert_eq!(n.thread_name, THREAD);
        assert_eq!(&n.thread_id, thread.id());
        assert!(!n.update.is_local);
    }

    // Pages follow arrival order, not chain position: the walk indexed the
    // head first and genesis last.
    let list = b.get_photos("", 10, THREAD).unwrap();
    assert_eq!(list.hashes, published);

    let head = &published[3];
    assert_eq!(b.get_last_hash(head).unwrap(), published[2]);
    assert_eq!(b.get_metadata(head).unwrap().username.as_deref(), Some("peer-a"));
    assert_eq!(b.get_file(&format!("{head}/photo"), None).await.unwrap(), b"late-full");
    assert_eq!(b.load_photo_and_thread(head).unwrap().0.caption.as_deref(), Some("late caption"));
}

#[tokio::test]
async fn test_repeated_walks_index_once() {
    let hub = MemoryHub::new();
    let store = MemoryObjectStore::new();
    let (a, b, thread) = pair(&hub, &store).await;
    b.sync().leave(thread.id()).await.unwrap();

    let mut head = String::new();
    for i in 0..4 {
        head = a.add_photo_data(photo(&format!("p{i}")), THREAD).await.unwrap();
    }

    let cancel = CancellationToken::new();
    assert_eq!(b.sync().handle_hash(&thread, &head, &cancel).await.unwrap(), 4);
    assert_eq!(b.sync().handle_hash(&thread, &head, &cancel).await.unwrap(), 0);
    assert_eq!(b.registry().count(thread.id()).unwrap(), 4);
}

#[tokio::test]
async fn test_concurrent_walks_index_each_update_once() {
    let hub = MemoryHub::new();
    let store = MemoryObjectStore::new();
    let (a, b, thread) = pair(&hub, &store).await;
    b.sync().leave(thread.id()).await.unwrap();

    let mut head = String::new();
    for i in 0..6 {
        head = a.add_photo_data(photo(&format!("p{i}")), THREAD).await.unwrap();
    }

    let mut updates = b.subscribe_updates();
    let mut walks = Vec::new();
    for _ in 0..8 {
        let b = b.clone();
        let thread = thread.clone();
        let head = head.clone();
        walks.push(tokio::spawn(async move {
            let cancel = CancellationToken::new();
            b.sync().handle_hash(&thread, &head, &cancel).await.unwrap()
        }));
    }

    let mut total = 0;
    for w in walks {
        total += w.await.unwrap();
    }
    assert_eq!(total, 6);
    assert_eq!(b.registry().count(thread.id()).unwrap(), 6);

    let mut seen = Vec::new();
    while let Ok(n) = updates.try_recv() {
        seen.push(n.update.content_id);
    }
    seen.sort();
    seen.dedup();
    assert_eq!(seen.len(), 6);
}

#[tokio::test]
async fn test_walk_does_not_block_on_listeners() {
    let hub = MemoryHub::new();
    let store = MemoryObjectStore::new();
    let (a, b, thread) = pair(&hub, &store).await;
    b.sync().leave(thread.id()).await.unwrap();

    // One listener never reads, another is gone.
    let _stalled = b.subscribe_updates();
    drop(b.subscribe_updates());

    let mut head = String::new();
    for i in 0..100 {
        head = a.add_photo_data(photo(&format!("p{i}")), THREAD).await.unwrap();
    }

    let cancel = CancellationToken::new();
    let walk = b.sync().handle_hash(&thread, &head, &cancel);
    let indexed = tokio::time::timeout(WAIT, walk).await.unwrap().unwrap();
    assert_eq!(indexed, 100);
}

#[tokio::test]
async fn test_cancelled_walk_indexes_nothing() {
    let hub = MemoryHub::new();
    let store = MemoryObjectStore::new();
    let (a, b, thread) = pair(&hub, &store).await;
    b.sync().leave(thread.id()).await.unwrap();

    let head = a.add_photo_data(photo("only"), THREAD).await.unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();
    assert_eq!(b.sync().handle_hash(&thread, &head, &cancel).await.unwrap(), 0);
    assert!(!b.registry().is_indexed(&head).unwrap());
}

#[tokio::test]
async fn test_left_thread_is_not_followed() {
    let hub = MemoryHub::new();
    let store = MemoryObjectStore::new();
    let (a, b, thread) = pair(&hub, &store).await;

    b.sync().leave(thread.id()).await.unwrap();
    assert!(!b.sync().is_joined(thread.id()).await);

    let head = a.add_photo_data(photo("unseen"), THREAD).await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!b.registry().is_indexed(&head).unwrap());

    // Rejoining picks the chain up on the next announcement.
    let mut updates = b.subscribe_updates();
    b.sync().join(&thread).await.unwrap();
    a.republish_latest_updates().await.unwrap();
    assert_eq!(next_update(&mut updates).await.update.content_id, head);
}

#[tokio::test]
async fn test_leave_racing_join_stays_consistent() {
    let hub = MemoryHub::new();
    let store = MemoryObjectStore::new();
    let (a, b, thread) = pair(&hub, &store).await;

    let (left, joined) = tokio::join!(b.sync().leave(thread.id()), b.sync().join(&thread));
    left.unwrap();
    joined.unwrap();

    // Whichever won, a further join must leave the thread actually followed.
    b.sync().join(&thread).await.unwrap();
    assert!(b.sync().is_joined(thread.id()).await);

    let mut updates = b.subscribe_updates();
    let head = a.add_photo_data(photo("after race"), THREAD).await.unwrap();
    assert_eq!(next_update(&mut updates).await.update.content_id, head);
    assert!(b.registry().is_indexed(&head).unwrap());
}

#[tokio::test]
async fn test_join_after_shutdown_is_refused() {
    let hub = MemoryHub::new();
    let store = MemoryObjectStore::new();
    let (_a, b, thread) = pair(&hub, &store).await;

    b.shutdown().await;
    assert!(!b.sync().is_joined(thread.id()).await);

    let err = b.sync().join(&thread).await.unwrap_err();
    assert!(matches!(err, NodeError::ShuttingDown));
    assert!(!b.sync().is_joined(thread.id()).await);
}

#[tokio::test]
async fn test_own_announcements_are_ignored() {
    let hub = MemoryHub::new();
    let store = MemoryObjectStore::new();
    let (a, b, thread) = pair(&hub, &store).await;
    a.sync().leave(thread.id()).await.unwrap();
    b.sync().leave(thread.id()).await.unwrap();

    // Stored and indexed by `a`, but never announced to `b`.
    let head = a.add_photo_data(photo("quiet"), THREAD).await.unwrap();

    let mut updates = b.subscribe_updates();
    b.sync().join(&thread).await.unwrap();

    // Same peer id as `b`: treated as an echo of its own publish.
    let echo = hub.connect("peer-b");
    echo.publish(&thread.id().to_topic(), Announcement::new(&head).to_bytes())
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!b.registry().is_indexed(&head).unwrap());

    let other = hub.connect("peer-c");
    other
        .publish(&thread.id().to_topic(), Announcement::new(&head).to_bytes())
        .await
        .unwrap();
    assert_eq!(next_update(&mut updates).await.update.content_id, head);
}

#[tokio::test]
async fn test_relayed_announcement_is_followed() {
    let hub = MemoryHub::new();
    let store = MemoryObjectStore::new();
    let (a, b, thread) = pair(&hub, &store).await;
    b.sync().leave(thread.id()).await.unwrap();

    let head = a.add_photo_data(photo("relayed"), THREAD).await.unwrap();

    let mut updates = b.subscribe_updates();
    b.sync().join(&thread).await.unwrap();
    let relay = hub.connect("relay-node");
    relay
        .publish(&thread.id().to_topic(), Announcement::relayed(&head).to_bytes())
        .await
        .unwrap();
    assert_eq!(next_update(&mut updates).await.update.content_id, head);
}

#[tokio::test]
async fn test_wrong_thread_key_aborts_walk() {
    let hub = MemoryHub::new();
    let store = MemoryObjectStore::new();
    let (a, b, _) = pair(&hub, &store).await;

    let head = a.add_photo_data(photo("secret"), THREAD).await.unwrap();
    let stranger = b.add_thread("stranger", None).await.unwrap();

    let cancel = CancellationToken::new();
    let err = b.sync().handle_hash(&stranger, &head, &cancel).await.unwrap_err();
    assert!(matches!(err, NodeError::DecryptionFailed));
    assert_eq!(b.registry().count(stranger.id()).unwrap(), 0);
}

/// Holds nothing of its own; every read of an unknown object waits forever,
/// like a lookup on a network where nobody has the block.
struct UnreachableStore {
    inner: MemoryObjectStore,
}

#[async_trait]
impl ObjectStore for UnreachableStore {
    async fn put(&self, data: &[u8]) -> Result<String, ObjectError> {
        self.inner.put(data).await
    }

    async fn get(&self, cid: &str) -> Result<Vec<u8>, ObjectError> {
        if !self.inner.has(cid).await? {
            std::future::pending::<()>().await;
        }
        self.inner.get(cid).await
    }

    async fn has(&self, cid: &str) -> Result<bool, ObjectError> {
        self.inner.has(cid).await
    }

    async fn pin(&self, cid: &str, recursive: bool) -> Result<(), ObjectError> {
        if !self.inner.has(cid).await? {
            std::future::pending::<()>().await;
        }
        self.inner.pin(cid, recursive).await
    }

    async fn is_pinned(&self, cid: &str) -> Result<bool, ObjectError> {
        self.inner.is_pinned(cid).await
    }

    async fn put_dir(&self, children: &DirLinks) -> Result<String, ObjectError> {
        self.inner.put_dir(children).await
    }
}

#[tokio::test]
async fn test_unreachable_block_times_out() {
    let hub = MemoryHub::new();
    let store = MemoryObjectStore::new();
    let a = node(&hub, "peer-a", &store);
    let thread = a.add_thread(THREAD, None).await.unwrap();
    let head = a.add_photo_data(photo("far away"), THREAD).await.unwrap();

    let isolated = node_with(
        &hub,
        "peer-b",
        Arc::new(UnreachableStore {
            inner: MemoryObjectStore::new(),
        }),
        Duration::from_millis(100),
    );
    let joined = isolated.add_thread(THREAD, Some(thread.phrase())).await.unwrap();
    isolated.sync().leave(joined.id()).await.unwrap();

    let cancel = CancellationToken::new();
    let err = isolated
        .sync()
        .handle_hash(&joined, &head, &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, NodeError::FetchTimeout(cid) if cid == head));
    assert!(!isolated.registry().is_indexed(&head).unwrap());
}

#[tokio::test]
async fn test_shared_photo_reaches_members_of_destination() {
    let hub = MemoryHub::new();
    let store = MemoryObjectStore::new();
    let (a, b, _) = pair(&hub, &store).await;

    let trip = a.add_thread("trip", None).await.unwrap();
    let c = node(&hub, "peer-c", &store);
    let mut updates = c.subscribe_updates();
    c.add_thread("trip", Some(trip.phrase())).await.unwrap();

    let mut a_updates = a.subscribe_updates();
    let original = b.add_photo_data(photo("shared"), THREAD).await.unwrap();
    // Wait for `a` to learn about it before sharing onwards.
    while next_update(&mut a_updates).await.update.content_id != original {}

    let shared = a.share_photo(&original, "trip", None).await.unwrap();
    let n = next_update(&mut updates).await;
    assert_eq!(n.update.content_id, shared);
    assert_eq!(n.thread_name, "trip");
    assert_eq!(c.get_file(&format!("{shared}/thumb"), None).await.unwrap(), b"shared-thumb");
}
