use chrono::Utc;
use classhubd::model::{EntityKind, Snapshot};
use classhubd::remote::{Document, Fields, MemoryBackend, RemoteBackend};
use classhubd::store::MemoryStore;
use classhubd::sync::{SubscribeOutcome, SyncCoordinator, SyncUpdate};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn fields(v: Value) -> Fields {
    v.as_object().cloned().expect("object")
}

fn submitted_doc(register: &str) -> Fields {
    fields(json!({
        "registerNumber": register,
        "submitted": true,
        "timestamp": "2026-01-21T08:45:00Z"
    }))
}

fn coordinator(remote: &MemoryBackend) -> SyncCoordinator {
    SyncCoordinator::new(
        Box::new(MemoryStore::new()),
        Some(Arc::new(remote.clone()) as Arc<dyn RemoteBackend>),
    )
}

async fn next(coord: &mut SyncCoordinator) -> SyncUpdate {
    tokio::time::timeout(Duration::from_secs(2), coord.next_update())
        .await
        .expect("update within timeout")
        .expect("channel open")
}

async fn settle_tasks() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn subscribe_is_idempotent_and_delivers_once_per_push() {
    let remote = MemoryBackend::new();
    let mut coord = coordinator(&remote);
    let seen: Arc<Mutex<Vec<usize>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();

    let first = coord
        .subscribe(
            EntityKind::Submissions,
            Some(Box::new(move |snap: &Snapshot| {
                sink.lock().expect("lock").push(snap.len());
            })),
        )
        .await;
    assert_eq!(first, SubscribeOutcome::Active);
    let again = coord.subscribe(EntityKind::Submissions, None).await;
    assert_eq!(again, SubscribeOutcome::AlreadyActive);
    assert_eq!(remote.subscriber_count("submissions"), 1);

    let initial = next(&mut coord).await;
    assert_eq!(initial.kind, EntityKind::Submissions);
    assert!(initial.snapshot.is_empty());

    remote.seed("submissions", "R1", submitted_doc("R1"));
    let update = next(&mut coord).await;
    assert_eq!(update.snapshot.len(), 1);
    assert!(coord.submissions()["R1"].submitted());

    settle_tasks().await;
    assert!(coord.try_next_update().is_none(), "exactly one delivery per push");
    assert_eq!(*seen.lock().expect("lock"), vec![0, 1]);
}

#[tokio::test]
async fn queued_snapshots_are_dropped_after_unsubscribe() {
    let remote = MemoryBackend::new();
    let mut coord = coordinator(&remote);
    assert_eq!(
        coord.subscribe(EntityKind::Submissions, None).await,
        SubscribeOutcome::Active
    );
    next(&mut coord).await;

    remote.seed("submissions", "R1", submitted_doc("R1"));
    settle_tasks().await;
    assert!(coord.unsubscribe(EntityKind::Submissions));
    assert!(!coord.unsubscribe(EntityKind::Submissions), "second call is a no-op");

    assert!(coord.try_next_update().is_none());
    assert!(coord.submissions().is_empty(), "torn-down channel must not apply");

    settle_tasks().await;
    assert_eq!(remote.subscriber_count("submissions"), 0);

    // A fresh subscription starts from the current remote state.
    assert_eq!(
        coord.subscribe(EntityKind::Submissions, None).await,
        SubscribeOutcome::Active
    );
    let initial = next(&mut coord).await;
    assert_eq!(initial.snapshot.len(), 1);
}

#[tokio::test]
async fn last_received_snapshot_wins() {
    let remote = MemoryBackend::new();
    let mut coord = coordinator(&remote);
    coord.subscribe(EntityKind::Submissions, None).await;
    next(&mut coord).await;

    coord
        .set_submitted("R1", true, Utc::now())
        .expect("mutate")
        .settle()
        .await;
    let echo = next(&mut coord).await;
    assert_eq!(echo.snapshot.len(), 1);

    // A stale echo from before the write arrives late and reverts the view.
    remote.push_raw("submissions", Vec::<Document>::new());
    let stale = next(&mut coord).await;
    assert!(stale.snapshot.is_empty());
    assert!(coord.submissions().is_empty());
}

#[tokio::test]
async fn unavailable_remote_reports_realtime_unavailable() {
    let remote = MemoryBackend::new();
    remote.set_available(false);
    let mut coord = coordinator(&remote);
    assert_eq!(
        coord.subscribe(EntityKind::Polls, None).await,
        SubscribeOutcome::Unavailable
    );
    assert!(!coord.has_subscriptions());

    let mut offline = SyncCoordinator::new(Box::new(MemoryStore::new()), None);
    assert_eq!(
        offline.subscribe(EntityKind::Polls, None).await,
        SubscribeOutcome::Unavailable
    );
    offline.set_submitted("R1", true, Utc::now()).expect("mutate still works");
    assert_eq!(offline.load(EntityKind::Submissions).await.len(), 1);
}

#[tokio::test]
async fn pushed_polls_are_persisted_locally() {
    let remote = MemoryBackend::new();
    let store = MemoryStore::new();
    let mut coord = SyncCoordinator::new(
        Box::new(store.clone()),
        Some(Arc::new(remote.clone()) as Arc<dyn RemoteBackend>),
    );
    coord.subscribe(EntityKind::Polls, None).await;
    next(&mut coord).await;

    remote.seed(
        "polls",
        "poll_9",
        fields(json!({ "question": "Bring laptops?", "createdAt": "2026-01-21T08:00:00Z" })),
    );
    let update = next(&mut coord).await;
    assert_eq!(update.kind, EntityKind::Polls);

    let reopened = SyncCoordinator::new(Box::new(store), None);
    assert_eq!(reopened.polls().len(), 1);
    assert_eq!(reopened.polls()[0].id, "poll_9");
}
