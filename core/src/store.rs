//! Access to the forum's own records.
//!
//! The forum application owns its data; the pipeline only reads it through
//! [`ForumStore`]. [`MemoryStore`] holds a snapshot exported from the forum and
//! is what the command line tools, the server and the tests run against.

use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::SyncResult;
use crate::model::{Category, CategoryId, Post, PostId, Tag, Topic, TopicId, User, UserId};

/// Lookups the pipeline needs from the forum. Soft-deleted posts and topics
/// are returned like live ones.
#[async_trait]
pub trait ForumStore: Send + Sync {
    async fn find_user(&self, id: UserId) -> SyncResult<Option<User>>;

    async fn find_user_by_username(&self, username: &str) -> SyncResult<Option<User>>;

    async fn find_post_with_deleted(&self, id: PostId) -> SyncResult<Option<Post>>;

    async fn find_topic_with_deleted(&self, id: TopicId) -> SyncResult<Option<Topic>>;

    async fn find_category(&self, id: CategoryId) -> SyncResult<Option<Category>>;

    /// Ids of every post in the topic, soft-deleted ones included, by post number.
    async fn post_ids_for_topic_with_deleted(&self, topic_id: TopicId) -> SyncResult<Vec<PostId>>;

    async fn find_tag_by_name(&self, name: &str) -> SyncResult<Option<Tag>>;
}

/// The forum's permission check for seeing a user.
pub trait AccessControl: Send + Sync {
    /// `viewer` is `None` for an anonymous visitor.
    fn can_see_user(&self, viewer: Option<&User>, user: &User) -> bool;
}

/// Staff see everybody; everyone else cannot see suspended or staged accounts.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaffAwareAccess;

impl AccessControl for StaffAwareAccess {
    fn can_see_user(&self, viewer: Option<&User>, user: &User) -> bool {
        if viewer.is_some_and(User::is_staff) {
            return true;
        }
        !user.suspended && !user.staged
    }
}

/// Serialized form of a forum export.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Snapshot {
    pub users: Vec<User>,
    pub posts: Vec<Post>,
    pub topics: Vec<Topic>,
    pub categories: Vec<Category>,
    pub tags: Vec<Tag>,
}

#[derive(Default)]
struct Tables {
    users: HashMap<UserId, User>,
    posts: HashMap<PostId, Post>,
    topics: HashMap<TopicId, Topic>,
    categories: HashMap<CategoryId, Category>,
    tags: HashMap<String, Tag>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        let store = Self::new();
        store.merge(snapshot);
        store
    }

    /// Load a snapshot file, or every `.json` file under a directory.
    pub fn load_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut files: Vec<PathBuf> = Vec::new();
        if path.is_dir() {
            for entry in WalkDir::new(path).into_iter().filter_map(|e| e.ok()) {
                let p = entry.path();
                if p.is_file() && p.extension().and_then(|s| s.to_str()) == Some("json") {
                    files.push(p.to_path_buf());
                }
            }
            files.sort();
        } else {
            files.push(path.to_path_buf());
        }

        let store = Self::new();
        for file in files {
            let f = File::open(&file).with_context(|| format!("opening snapshot {}", file.display()))?;
            let snapshot: Snapshot = serde_json::from_reader(BufReader::new(f))
                .with_context(|| format!("parsing snapshot {}", file.display()))?;
            store.merge(snapshot);
        }
        let t = store.tables.read();
        tracing::info!(
            users = t.users.len(),
            posts = t.posts.len(),
            topics = t.topics.len(),
            categories = t.categories.len(),
            tags = t.tags.len(),
            "loaded forum snapshot"
        );
        drop(t);
        Ok(store)
    }

    /// Later records replace earlier ones with the same key.
    pub fn merge(&self, snapshot: Snapshot) {
        let mut t = self.tables.write();
        t.users.extend(snapshot.users.into_iter().map(|u| (u.id, u)));
        t.posts.extend(snapshot.posts.into_iter().map(|p| (p.id, p)));
        t.topics.extend(snapshot.topics.into_iter().map(|x| (x.id, x)));
        t.categories.extend(snapshot.categories.into_iter().map(|c| (c.id, c)));
        t.tags.extend(snapshot.tags.into_iter().map(|tag| (tag.name.clone(), tag)));
    }

    pub fn upsert_user(&self, user: User) {
        self.tables.write().users.insert(user.id, user);
    }

    pub fn upsert_post(&self, post: Post) {
        self.tables.write().posts.insert(post.id, post);
    }

    pub fn upsert_topic(&self, topic: Topic) {
        self.tables.write().topics.insert(topic.id, topic);
    }

    pub fn upsert_category(&self, category: Category) {
        self.tables.write().categories.insert(category.id, category);
    }

    pub fn upsert_tag(&self, tag: Tag) {
        self.tables.write().tags.insert(tag.name.clone(), tag);
    }

    /// Hard delete, as opposed to setting `deleted_at`.
    pub fn remove_post(&self, id: PostId) -> Option<Post> {
        self.tables.write().posts.remove(&id)
    }

    pub fn remove_topic(&self, id: TopicId) -> Option<Topic> {
        self.tables.write().topics.remove(&id)
    }
}

#[async_trait]
impl ForumStore for MemoryStore {
    async fn find_user(&self, id: UserId) -> SyncResult<Option<User>> {
        Ok(self.tables.read().users.get(&id).cloned())
    }

    async fn find_user_by_username(&self, username: &str) -> SyncResult<Option<User>> {
        let t = self.tables.read();
        Ok(t.users.values().find(|u| u.username.eq_ignore_ascii_case(username)).cloned())
    }

    async fn find_post_with_deleted(&self, id: PostId) -> SyncResult<Option<Post>> {
        Ok(self.tables.read().posts.get(&id).cloned())
    }

    async fn find_topic_with_deleted(&self, id: TopicId) -> SyncResult<Option<Topic>> {
        Ok(self.tables.read().topics.get(&id).cloned())
    }

    async fn find_category(&self, id: CategoryId) -> SyncResult<Option<Category>> {
        Ok(self.tables.read().categories.get(&id).cloned())
    }

    async fn post_ids_for_topic_with_deleted(&self, topic_id: TopicId) -> SyncResult<Vec<PostId>> {
        let t = self.tables.read();
        let mut posts: Vec<&Post> = t.posts.values().filter(|p| p.topic_id == Some(topic_id)).collect();
        posts.sort_by_key(|p| (p.post_number, p.id));
        Ok(posts.into_iter().map(|p| p.id).collect())
    }

    async fn find_tag_by_name(&self, name: &str) -> SyncResult<Option<Tag>> {
        Ok(self.tables.read().tags.get(name).cloned())
    }
}
