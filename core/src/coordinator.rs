//! Entry points the job queue calls.
//!
//! Every entry point reads the entity's current state when it runs, not when
//! the job was queued, so running a job twice, or two jobs for the same entity
//! out of order, converges on the same index contents.

use serde::Serialize;
use serde_json::json;
use std::sync::Arc;

use crate::config::SyncConfig;
use crate::document::{build_post_fragment_documents, build_tag_document, build_user_document, SearchDocument};
use crate::error::{SyncError, SyncResult};
use crate::events::SyncJob;
use crate::gateway::{BulkDocument, IndexGateway};
use crate::model::{PostContext, PostId, TopicContext, TopicId, UserId};
use crate::policy::{self, SkipReason};
use crate::schema::IndexNames;
use crate::segmenter::ContentSegmenter;
use crate::store::{AccessControl, ForumStore, StaffAwareAccess};

/// Receives failures that are recorded but not propagated.
pub trait ErrorReporter: Send + Sync {
    fn report(&self, job: &'static str, entity_id: i64, error: &SyncError);
}

/// Logs reported failures at error level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl ErrorReporter for TracingReporter {
    fn report(&self, job: &'static str, entity_id: i64, error: &SyncError) {
        tracing::error!(job, entity_id, error = %error, "sync step failed, continuing");
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOutcome {
    Indexed { documents: usize },
    Skipped(SkipReason),
}

/// What `index_post` did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PostSync {
    /// Fragment documents deleted before rebuilding.
    pub removed: u64,
    pub indexed: usize,
    pub skipped: Option<SkipReason>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct TopicSync {
    pub posts: usize,
    pub failed: usize,
    pub documents: usize,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct TagSync {
    pub indexed: Vec<String>,
    pub skipped: Vec<(String, SkipReason)>,
}

pub struct SyncCoordinator {
    store: Arc<dyn ForumStore>,
    gateway: Arc<dyn IndexGateway>,
    access: Arc<dyn AccessControl>,
    reporter: Arc<dyn ErrorReporter>,
    segmenter: ContentSegmenter,
    indices: IndexNames,
    indexing_viewer: String,
}

impl SyncCoordinator {
    pub fn new(config: &SyncConfig, store: Arc<dyn ForumStore>, gateway: Arc<dyn IndexGateway>) -> Self {
        Self {
            store,
            gateway,
            access: Arc::new(StaffAwareAccess),
            reporter: Arc::new(TracingReporter),
            segmenter: ContentSegmenter::from_config(config),
            indices: IndexNames::new(config.index_prefix.clone()),
            indexing_viewer: config.indexing_viewer.clone(),
        }
    }

    pub fn with_access(mut self, access: Arc<dyn AccessControl>) -> Self {
        self.access = access;
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn indices(&self) -> &IndexNames {
        &self.indices
    }

    pub fn gateway(&self) -> &Arc<dyn IndexGateway> {
        &self.gateway
    }

    /// Run one queued job. Errors are returned for the queue to retry.
    pub async fn run(&self, job: &SyncJob) -> SyncResult<()> {
        match job {
            SyncJob::IndexUser { user_id } => {
                let outcome = self.index_user(*user_id).await?;
                tracing::info!(user_id, ?outcome, "user synced");
            }
            SyncJob::IndexTopic { topic_id } => {
                let sync = self.index_topic(*topic_id).await?;
                tracing::info!(topic_id, posts = sync.posts, failed = sync.failed, documents = sync.documents, "topic synced");
            }
            SyncJob::IndexPost { post_id } => {
                let sync = self.index_post(*post_id).await?;
                tracing::info!(post_id, removed = sync.removed, indexed = sync.indexed, skipped = ?sync.skipped, "post synced");
            }
            SyncJob::IndexTags { tags } => {
                let sync = self.index_tags(tags).await?;
                tracing::info!(indexed = sync.indexed.len(), skipped = sync.skipped.len(), "tags synced");
            }
        }
        Ok(())
    }

    /// Upsert the user's document if the indexing viewer may see the user.
    ///
    /// A user who can no longer be seen keeps whatever document was indexed
    /// earlier; nothing is deleted here.
    pub async fn index_user(&self, user_id: UserId) -> SyncResult<SyncOutcome> {
        let Some(user) = self.store.find_user(user_id).await? else {
            tracing::debug!(user_id, "user not found");
            return Ok(SyncOutcome::Skipped(SkipReason::NotFound));
        };
        let viewer = self.store.find_user_by_username(&self.indexing_viewer).await?;
        if viewer.is_none() {
            tracing::warn!(viewer = %self.indexing_viewer, "indexing viewer not found, checking as anonymous");
        }
        if !policy::is_user_visible_for_indexing(Some(&user), self.access.as_ref(), viewer.as_ref()) {
            tracing::debug!(user_id, "user not visible to indexing viewer");
            return Ok(SyncOutcome::Skipped(SkipReason::NotVisible));
        }

        let doc = build_user_document(&user);
        let id = doc.document_id();
        let body = serde_json::to_value(&doc)
            .map_err(|source| SyncError::Transformation { document_id: id.clone(), source })?;
        self.gateway.upsert_one(&self.indices.users(), &id, body).await?;
        Ok(SyncOutcome::Indexed { documents: 1 })
    }

    /// Reindex every post of the topic, soft-deleted ones included. A post that
    /// fails is reported and the rest carry on.
    pub async fn index_topic(&self, topic_id: TopicId) -> SyncResult<TopicSync> {
        let post_ids = self.store.post_ids_for_topic_with_deleted(topic_id).await?;
        let mut sync = TopicSync { posts: post_ids.len(), ..Default::default() };
        for post_id in post_ids {
            match self.index_post(post_id).await {
                Ok(post) => sync.documents += post.indexed,
                Err(err) => {
                    sync.failed += 1;
                    self.reporter.report("index_topic", post_id, &err);
                }
            }
        }
        Ok(sync)
    }

    /// Replace the post's fragment documents with ones built from its current
    /// state. Old fragments are always deleted first, so a post that stopped
    /// being indexable, or now has fewer fragments, leaves nothing behind.
    pub async fn index_post(&self, post_id: PostId) -> SyncResult<PostSync> {
        let ctx = self.load_post_context(post_id).await?;
        let posts_index = self.indices.posts();
        let removed = self
            .gateway
            .delete_by_filter(&posts_index, "post_id", json!(post_id))
            .await?;

        let ctx = match (policy::post_ineligibility(ctx.as_ref()), ctx) {
            (None, Some(ctx)) => ctx,
            (reason, _) => {
                let reason = reason.unwrap_or(SkipReason::NotFound);
                tracing::debug!(post_id, ?reason, removed, "post not indexable");
                return Ok(PostSync { removed, indexed: 0, skipped: Some(reason) });
            }
        };

        let mut documents = Vec::new();
        for doc in build_post_fragment_documents(&ctx, &self.segmenter) {
            let id = doc.document_id();
            match serde_json::to_value(&doc) {
                Ok(body) => documents.push(BulkDocument { id, body }),
                // one bad fragment must not cost the post its other fragments
                Err(source) => {
                    let err = SyncError::Transformation { document_id: id, source };
                    self.reporter.report("index_post", post_id, &err);
                }
            }
        }

        let indexed = documents.len();
        if indexed > 0 {
            self.gateway.bulk_upsert(&posts_index, documents).await?;
        }
        Ok(PostSync { removed, indexed, skipped: None })
    }

    /// Upsert a document for each named tag that exists and has public topics.
    /// Ineligible tags are skipped, not deleted.
    pub async fn index_tags(&self, names: &[String]) -> SyncResult<TagSync> {
        let tags_index = self.indices.tags();
        let mut sync = TagSync::default();
        for name in names {
            let tag = match self.store.find_tag_by_name(name).await? {
                Some(tag) if policy::is_tag_indexable(&tag) => tag,
                Some(_) => {
                    sync.skipped.push((name.clone(), SkipReason::NoPublicTopics));
                    continue;
                }
                None => {
                    sync.skipped.push((name.clone(), SkipReason::NotFound));
                    continue;
                }
            };
            let doc = build_tag_document(&tag);
            let id = doc.document_id();
            let body = serde_json::to_value(&doc)
                .map_err(|source| SyncError::Transformation { document_id: id.clone(), source })?;
            self.gateway.upsert_one(&tags_index, &id, body).await?;
            sync.indexed.push(name.clone());
        }
        Ok(sync)
    }

    async fn load_post_context(&self, post_id: PostId) -> SyncResult<Option<PostContext>> {
        let Some(post) = self.store.find_post_with_deleted(post_id).await? else {
            return Ok(None);
        };

        let topic = match post.topic_id {
            Some(topic_id) => self.store.find_topic_with_deleted(topic_id).await?,
            None => None,
        };
        let topic = match topic {
            Some(topic) => {
                let category = match topic.category_id {
                    Some(category_id) => self.store.find_category(category_id).await?,
                    None => None,
                };
                Some(TopicContext { topic, category })
            }
            None => None,
        };
        let author = match post.user_id {
            Some(user_id) => self.store.find_user(user_id).await?,
            None => None,
        };

        Ok(Some(PostContext { post, author, topic }))
    }
}
