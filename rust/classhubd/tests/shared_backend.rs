use chrono::Utc;
use classhubd::model::EntityKind;
use classhubd::remote::{RemoteBackend, SharedFileBackend};
use classhubd::store::MemoryStore;
use classhubd::sync::{Durability, SubscribeOutcome, SyncCoordinator};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

#[tokio::test]
async fn merge_upsert_query_and_delete() {
    let dir = temp_dir("classhub-shared-ops");
    let backend = SharedFileBackend::open(&dir.join("share.sqlite3"), 50).expect("open");

    backend
        .upsert(
            "pollResponses",
            "poll_1_R1",
            json!({ "pollId": "poll_1", "registerNumber": "R1", "response": "Yes" })
                .as_object()
                .cloned()
                .expect("object"),
            false,
        )
        .await
        .expect("insert");
    backend
        .upsert(
            "pollResponses",
            "poll_1_R1",
            json!({ "response": "No" }).as_object().cloned().expect("object"),
            true,
        )
        .await
        .expect("merge");

    let doc = backend
        .get_one("pollResponses", "poll_1_R1")
        .await
        .expect("read")
        .expect("exists");
    assert_eq!(doc.fields.get("response"), Some(&json!("No")));
    assert_eq!(doc.fields.get("registerNumber"), Some(&json!("R1")), "merge keeps other fields");

    let hits = backend
        .query("pollResponses", "pollId", &json!("poll_1"))
        .await
        .expect("query");
    assert_eq!(hits.len(), 1);

    backend
        .delete_many("pollResponses", &["poll_1_R1".to_string()])
        .await
        .expect("delete");
    assert!(backend.get_all("pollResponses").await.expect("read").is_empty());

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn two_daemons_share_submissions_through_the_file() {
    let dir = temp_dir("classhub-shared-sync");
    let path = dir.join("share.sqlite3");
    let desk_a: Arc<dyn RemoteBackend> = Arc::new(SharedFileBackend::open(&path, 20).expect("open a"));
    let desk_b: Arc<dyn RemoteBackend> = Arc::new(SharedFileBackend::open(&path, 20).expect("open b"));

    let mut a = SyncCoordinator::new(Box::new(MemoryStore::new()), Some(desk_a));
    let mut b = SyncCoordinator::new(Box::new(MemoryStore::new()), Some(desk_b));

    assert_eq!(
        b.subscribe(EntityKind::Submissions, None).await,
        SubscribeOutcome::Active
    );
    let initial = tokio::time::timeout(Duration::from_secs(2), b.next_update())
        .await
        .expect("initial snapshot")
        .expect("open");
    assert!(initial.snapshot.is_empty());

    let push = a
        .set_submitted("R7", true, Utc::now())
        .expect("mutate")
        .settle()
        .await;
    assert_eq!(push.durability(), Durability::PersistedLocallyAndRemotely);

    let update = tokio::time::timeout(Duration::from_secs(5), b.next_update())
        .await
        .expect("change picked up by polling")
        .expect("open");
    assert_eq!(update.kind, EntityKind::Submissions);
    assert!(b.submissions()["R7"].submitted());

    b.unsubscribe(EntityKind::Submissions);
    drop(a);
    drop(b);
    let _ = std::fs::remove_dir_all(&dir);
}
