//! Search documents and the functions that build them from forum entities.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::model::{Category, PostContext, PostId, Tag, TagId, Topic, User, UserId};
use crate::segmenter::{ContentSegmenter, Fragment};

/// Anything written to the index under its own id.
pub trait SearchDocument: Serialize {
    fn document_id(&self) -> String;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserDocument {
    pub id: UserId,
    pub url: String,
    pub name: Option<String>,
    pub username: String,
    pub avatar_template: String,
    pub bio_raw: Option<String>,
    pub post_count: i64,
    pub badge_count: i64,
    pub likes_given: i64,
    pub likes_received: i64,
    pub days_visited: i64,
    pub topic_count: i64,
    pub posts_read: i64,
    pub time_read: i64,
    /// Unix seconds.
    pub created_at: i64,
    pub updated_at: i64,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_seen_at: Option<OffsetDateTime>,
}

impl SearchDocument for UserDocument {
    fn document_id(&self) -> String {
        self.id.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorSnapshot {
    pub id: UserId,
    pub url: String,
    pub name: Option<String>,
    pub username: String,
    pub avatar_template: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicSnapshot {
    pub id: i64,
    pub url: String,
    pub title: String,
    pub views: i64,
    pub slug: String,
    pub like_count: i64,
    pub visible: bool,
    pub archetype: String,
    pub tags: Vec<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub deleted_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategorySnapshot {
    pub id: i64,
    pub url: String,
    pub name: String,
    pub color: String,
    pub slug: String,
}

/// One indexed line of a post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostFragmentDocument {
    /// `{post_id}-{part_number}`
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub url: Option<String>,
    pub post_id: PostId,
    pub part_number: usize,
    pub post_number: i32,
    pub created_at: i64,
    pub updated_at: i64,
    pub reads: i64,
    pub like_count: i64,
    pub image_url: Option<String>,
    pub word_count: usize,
    pub is_wordy: bool,
    pub content: String,
    #[serde(with = "time::serde::rfc3339::option")]
    pub deleted_at: Option<OffsetDateTime>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub user: Option<AuthorSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub topic: Option<TopicSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub category: Option<CategorySnapshot>,
}

impl SearchDocument for PostFragmentDocument {
    fn document_id(&self) -> String {
        self.id.clone()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagDocument {
    pub id: TagId,
    pub url: String,
    pub name: String,
    pub topic_count: i64,
}

impl SearchDocument for TagDocument {
    fn document_id(&self) -> String {
        self.id.to_string()
    }
}

pub fn fragment_document_id(post_id: PostId, part_number: usize) -> String {
    format!("{post_id}-{part_number}")
}

pub fn build_user_document(user: &User) -> UserDocument {
    UserDocument {
        id: user.id,
        url: user.url(),
        name: user.name.clone(),
        username: user.username.clone(),
        avatar_template: user.avatar_template.clone(),
        bio_raw: user.profile.bio_raw.clone(),
        post_count: user.post_count,
        badge_count: user.badge_count,
        likes_given: user.stat.likes_given,
        likes_received: user.stat.likes_received,
        days_visited: user.stat.days_visited,
        topic_count: user.stat.topic_count,
        posts_read: user.stat.posts_read_count,
        time_read: user.stat.time_read,
        created_at: user.created_at.unix_timestamp(),
        updated_at: user.updated_at.unix_timestamp(),
        last_seen_at: user.last_seen_at,
    }
}

/// One document per fragment that survives segmentation, each carrying copies
/// of the author, topic and category.
pub fn build_post_fragment_documents(
    ctx: &PostContext,
    segmenter: &ContentSegmenter,
) -> Vec<PostFragmentDocument> {
    let post = &ctx.post;
    let user = ctx.author.as_ref().map(author_snapshot);
    let topic = ctx.topic.as_ref().map(|t| topic_snapshot(&t.topic));
    let category = ctx
        .topic
        .as_ref()
        .and_then(|t| t.category.as_ref())
        .map(category_snapshot);
    let url = ctx
        .topic
        .as_ref()
        .map(|t| format!("{}/{}", t.topic.url(), post.post_number));

    segmenter
        .segment(&post.cooked)
        .into_iter()
        .map(|Fragment { index, content, word_count, is_wordy }| PostFragmentDocument {
            id: fragment_document_id(post.id, index),
            url: url.clone(),
            post_id: post.id,
            part_number: index,
            post_number: post.post_number,
            created_at: post.created_at.unix_timestamp(),
            updated_at: post.updated_at.unix_timestamp(),
            reads: post.reads,
            like_count: post.like_count,
            image_url: post.image_url.clone(),
            word_count,
            is_wordy,
            content,
            deleted_at: post.deleted_at,
            user: user.clone(),
            topic: topic.clone(),
            category: category.clone(),
        })
        .collect()
}

pub fn build_tag_document(tag: &Tag) -> TagDocument {
    TagDocument {
        id: tag.id,
        url: format!("/tags/{}", tag.name),
        name: tag.name.clone(),
        topic_count: tag.public_topic_count,
    }
}

fn author_snapshot(user: &User) -> AuthorSnapshot {
    AuthorSnapshot {
        id: user.id,
        url: user.url(),
        name: user.name.clone(),
        username: user.username.clone(),
        avatar_template: user.avatar_template.clone(),
    }
}

fn topic_snapshot(topic: &Topic) -> TopicSnapshot {
    TopicSnapshot {
        id: topic.id,
        url: topic.url(),
        title: topic.title.clone(),
        views: topic.views,
        slug: topic.slug.clone(),
        like_count: topic.like_count,
        visible: topic.visible,
        archetype: topic.archetype.clone(),
        tags: topic.tags.clone(),
        deleted_at: topic.deleted_at,
    }
}

fn category_snapshot(category: &Category) -> CategorySnapshot {
    CategorySnapshot {
        id: category.id,
        url: format!("/c/{}", category.slug),
        name: category.name.clone(),
        color: category.color.clone(),
        slug: category.slug.clone(),
    }
}
