use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;

use sync_core::coordinator::TopicSync;
use sync_core::gateway::{GatewayCall, MemoryGateway};
use sync_core::store::{MemoryStore, Snapshot};
use sync_core::{
    route, schema, ErrorReporter, ForumEvent, IndexGateway, SkipReason, SyncConfig, SyncCoordinator, SyncError,
    SyncOutcome,
};

const POSTS: &str = "discourse-posts";
const USERS: &str = "discourse-users";
const TAGS: &str = "discourse-tags";

fn snapshot() -> Snapshot {
    serde_json::from_value(json!({
        "users": [
            { "id": -1, "username": "system", "admin": true,
              "created_at": "2023-06-01T00:00:00Z", "updated_at": "2023-06-01T00:00:00Z" },
            { "id": 7, "username": "carol", "name": "Carol", "post_count": 3,
              "created_at": "2024-01-01T00:00:00Z", "updated_at": "2024-01-05T00:00:00Z",
              "profile": { "bio_raw": "Printer whisperer" },
              "stat": { "likes_given": 2, "posts_read_count": 40 } }
        ],
        "categories": [ { "id": 9, "name": "Support", "slug": "support", "color": "0088CC" } ],
        "topics": [
            { "id": 5, "title": "Printer on fire", "slug": "printer-on-fire", "views": 10,
              "category_id": 9, "tags": ["hardware"] }
        ],
        "posts": [
            { "id": 1, "topic_id": 5, "user_id": 7, "post_number": 1,
              "cooked": "<p>My printer caught fire this morning</p>\n<p>It smells like toast now</p>\n<p>What should I do next</p>",
              "created_at": "2024-02-01T00:00:00Z", "updated_at": "2024-02-01T00:00:00Z" },
            { "id": 2, "topic_id": 5, "user_id": 7, "post_number": 2,
              "cooked": "<p>Unplug it before anything else please</p>",
              "created_at": "2024-02-01T01:00:00Z", "updated_at": "2024-02-01T01:00:00Z" },
            { "id": 3, "topic_id": 5, "user_id": 7, "post_number": 3, "post_type": "whisper",
              "cooked": "<p>Staff only note about this printer</p>",
              "created_at": "2024-02-01T02:00:00Z", "updated_at": "2024-02-01T02:00:00Z" }
        ],
        "tags": [
            { "id": 30, "name": "hardware", "public_topic_count": 4 },
            { "id": 31, "name": "help", "public_topic_count": 0 }
        ]
    }))
    .unwrap()
}

#[derive(Default)]
struct RecordingReporter {
    reports: Mutex<Vec<(String, i64, String)>>,
}

impl ErrorReporter for RecordingReporter {
    fn report(&self, job: &'static str, entity_id: i64, error: &SyncError) {
        self.reports.lock().push((job.to_string(), entity_id, error.to_string()));
    }
}

struct Harness {
    store: Arc<MemoryStore>,
    gateway: Arc<MemoryGateway>,
    reporter: Arc<RecordingReporter>,
    coordinator: SyncCoordinator,
}

fn harness() -> Harness {
    let store = Arc::new(MemoryStore::from_snapshot(snapshot()));
    let gateway = Arc::new(MemoryGateway::new());
    let reporter = Arc::new(RecordingReporter::default());
    let coordinator = SyncCoordinator::new(&SyncConfig::default(), store.clone(), gateway.clone())
        .with_reporter(reporter.clone());
    Harness { store, gateway, reporter, coordinator }
}

fn fragments_of(gateway: &MemoryGateway, post_id: i64) -> Vec<(String, Value)> {
    gateway
        .documents(POSTS)
        .into_iter()
        .filter(|(_, doc)| doc["post_id"] == json!(post_id))
        .collect()
}

#[tokio::test]
async fn index_post_writes_one_document_per_fragment() {
    let h = harness();
    let sync = h.coordinator.index_post(1).await.unwrap();
    assert_eq!(sync.indexed, 3);
    assert_eq!(sync.skipped, None);

    let doc = h.gateway.document(POSTS, "1-1").unwrap();
    assert_eq!(doc["content"], "It smells like toast now");
    assert_eq!(doc["url"], "/t/printer-on-fire/5/1");
    assert_eq!(doc["topic"]["tags"], json!(["hardware"]));
    assert_eq!(doc["category"]["name"], "Support");
    assert_eq!(doc["user"]["username"], "carol");
}

#[tokio::test]
async fn index_post_twice_matches_index_post_once() {
    let h = harness();
    h.coordinator.index_post(1).await.unwrap();
    let once = h.gateway.documents(POSTS);

    let again = h.coordinator.index_post(1).await.unwrap();
    assert_eq!(again.removed, 3);
    assert_eq!(h.gateway.documents(POSTS), once);
}

#[tokio::test]
async fn shrinking_edit_leaves_no_orphaned_fragments() {
    let h = harness();
    h.coordinator.index_post(1).await.unwrap();
    assert_eq!(fragments_of(&h.gateway, 1).len(), 3);

    let mut edited = h.store.remove_post(1).unwrap();
    edited.cooked = "<p>Never mind, the fire is out now</p>".into();
    h.store.upsert_post(edited);
    h.coordinator.index_post(1).await.unwrap();

    let left = fragments_of(&h.gateway, 1);
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].0, "1-0");
}

#[tokio::test]
async fn post_whose_topic_vanished_is_purged() {
    let h = harness();
    h.coordinator.index_post(2).await.unwrap();
    assert_eq!(fragments_of(&h.gateway, 2).len(), 1);

    h.store.remove_topic(5);
    let sync = h.coordinator.index_post(2).await.unwrap();
    assert_eq!(sync.removed, 1);
    assert_eq!(sync.skipped, Some(SkipReason::NoTopic));
    assert!(fragments_of(&h.gateway, 2).is_empty());
}

#[tokio::test]
async fn hard_deleted_post_is_purged() {
    let h = harness();
    h.coordinator.index_post(2).await.unwrap();
    h.store.remove_post(2);

    let sync = h.coordinator.index_post(2).await.unwrap();
    assert_eq!(sync.skipped, Some(SkipReason::NotFound));
    assert!(fragments_of(&h.gateway, 2).is_empty());
}

#[tokio::test]
async fn whisper_is_never_indexed() {
    let h = harness();
    let sync = h.coordinator.index_post(3).await.unwrap();
    assert_eq!(sync.skipped, Some(SkipReason::NotRegularPost));
    assert!(!h.gateway.calls().iter().any(|c| matches!(c, GatewayCall::BulkUpsert { .. })));
}

#[tokio::test]
async fn soft_deleted_post_is_indexed_with_its_deletion_time() {
    let h = harness();
    let mut deleted = h.store.remove_post(2).unwrap();
    deleted.deleted_at = Some(time::macros::datetime!(2024-03-01 0:00 UTC));
    h.store.upsert_post(deleted);

    h.coordinator.index_post(2).await.unwrap();
    let doc = h.gateway.document(POSTS, "2-0").unwrap();
    assert_eq!(doc["deleted_at"], "2024-03-01T00:00:00Z");
}

#[tokio::test]
async fn index_post_surfaces_service_errors() {
    let h = harness();
    h.gateway.fail_next(1);
    let err = h.coordinator.index_post(1).await.unwrap_err();
    assert!(err.is_retryable());
}

#[tokio::test]
async fn topic_sync_survives_a_failing_post() {
    let h = harness();
    h.gateway.fail_filter_value(json!(2));

    let sync = h.coordinator.index_topic(5).await.unwrap();
    assert_eq!(sync, TopicSync { posts: 3, failed: 1, documents: 3 });
    assert_eq!(fragments_of(&h.gateway, 1).len(), 3);

    let reports = h.reporter.reports.lock();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].0, "index_topic");
    assert_eq!(reports[0].1, 2);
}

#[tokio::test]
async fn topic_change_is_copied_into_every_post() {
    let h = harness();
    h.coordinator.index_topic(5).await.unwrap();

    let mut store_topic = h.store.remove_topic(5).unwrap();
    store_topic.title = "Printer no longer on fire".into();
    h.store.upsert_topic(store_topic);
    h.coordinator.index_topic(5).await.unwrap();

    for (_, doc) in h.gateway.documents(POSTS) {
        assert_eq!(doc["topic"]["title"], "Printer no longer on fire");
    }
    assert_eq!(h.gateway.documents(POSTS).len(), 4);
}

#[tokio::test]
async fn index_user_upserts_by_user_id() {
    let h = harness();
    let outcome = h.coordinator.index_user(7).await.unwrap();
    assert_eq!(outcome, SyncOutcome::Indexed { documents: 1 });

    let doc = h.gateway.document(USERS, "7").unwrap();
    assert_eq!(doc["bio_raw"], "Printer whisperer");
    assert_eq!(doc["posts_read"], 40);
    assert!(doc.get("admin").is_none());
}

#[tokio::test]
async fn user_hidden_later_keeps_its_old_document() {
    let h = harness();
    h.coordinator.index_user(7).await.unwrap();

    let viewer_less = SyncConfig { indexing_viewer: "nobody".into(), ..Default::default() };
    let coordinator = SyncCoordinator::new(&viewer_less, h.store.clone(), h.gateway.clone());
    let mut carol = snapshot().users.remove(1);
    carol.suspended = true;
    h.store.upsert_user(carol);

    let outcome = coordinator.index_user(7).await.unwrap();
    assert_eq!(outcome, SyncOutcome::Skipped(SkipReason::NotVisible));
    assert!(h.gateway.document(USERS, "7").is_some());
}

#[tokio::test]
async fn missing_user_is_a_no_op() {
    let h = harness();
    assert_eq!(h.coordinator.index_user(404).await.unwrap(), SyncOutcome::Skipped(SkipReason::NotFound));
    assert!(h.gateway.calls().is_empty());
}

#[tokio::test]
async fn tags_without_public_topics_are_not_upserted() {
    let h = harness();
    let sync = h.coordinator.index_tags(&["help".to_string()]).await.unwrap();
    assert_eq!(sync.skipped, vec![("help".to_string(), SkipReason::NoPublicTopics)]);
    assert!(h.gateway.calls().is_empty());

    let sync = h
        .coordinator
        .index_tags(&["hardware".to_string(), "unknown".to_string()])
        .await
        .unwrap();
    assert_eq!(sync.indexed, vec!["hardware"]);
    assert_eq!(h.gateway.document(TAGS, "30").unwrap()["topic_count"], 4);
}

#[tokio::test]
async fn routed_events_run_through_the_coordinator() {
    let h = harness();
    let event: ForumEvent = serde_json::from_value(json!({
        "event": "post_destroyed",
        "post": { "id": 1, "topic_id": 5, "post_number": 1 }
    }))
    .unwrap();
    h.coordinator.run(&route(&event)).await.unwrap();
    // whole topic: posts 1 and 2, the whisper contributes nothing
    assert_eq!(h.gateway.documents(POSTS).len(), 4);
}

#[tokio::test]
async fn schema_reset_recreates_all_indices() {
    let gateway = MemoryGateway::new();
    let names = sync_core::IndexNames::new("discourse");
    gateway.upsert_one(USERS, "7", json!({ "stale": true })).await.unwrap();

    schema::reset_all(&gateway, &names).await.unwrap();
    assert!(gateway.documents(USERS).is_empty());
    for index in [USERS, POSTS, TAGS] {
        assert!(gateway.schema(index).is_some(), "{index} has a mapping");
    }
}
