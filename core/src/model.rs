//! Read-only snapshots of forum entities as the forum store hands them out.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

pub type UserId = i64;
pub type PostId = i64;
pub type TopicId = i64;
pub type CategoryId = i64;
pub type TagId = i64;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default)]
    pub bio_raw: Option<String>,
}

/// Aggregate counters kept by the forum for each user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserStat {
    pub likes_given: i64,
    pub likes_received: i64,
    pub days_visited: i64,
    pub topic_count: i64,
    pub posts_read_count: i64,
    pub time_read: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub avatar_template: String,
    #[serde(default)]
    pub admin: bool,
    #[serde(default)]
    pub moderator: bool,
    #[serde(default)]
    pub suspended: bool,
    #[serde(default)]
    pub staged: bool,
    #[serde(default)]
    pub post_count: i64,
    #[serde(default)]
    pub badge_count: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub last_seen_at: Option<OffsetDateTime>,
    #[serde(default)]
    pub profile: UserProfile,
    #[serde(default)]
    pub stat: UserStat,
}

impl User {
    pub fn is_staff(&self) -> bool {
        self.admin || self.moderator
    }

    pub fn url(&self) -> String {
        format!("/users/{}", self.username)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostType {
    #[default]
    Regular,
    ModeratorAction,
    SmallAction,
    Whisper,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: PostId,
    #[serde(default)]
    pub topic_id: Option<TopicId>,
    #[serde(default)]
    pub user_id: Option<UserId>,
    pub post_number: i32,
    #[serde(default)]
    pub post_type: PostType,
    /// Rendered HTML body.
    #[serde(default)]
    pub cooked: String,
    #[serde(default)]
    pub action_code: Option<String>,
    #[serde(default)]
    pub reads: i64,
    #[serde(default)]
    pub like_count: i64,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub deleted_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Topic {
    pub id: TopicId,
    pub title: String,
    pub slug: String,
    #[serde(default)]
    pub views: i64,
    #[serde(default)]
    pub like_count: i64,
    #[serde(default = "default_visible")]
    pub visible: bool,
    #[serde(default = "default_archetype")]
    pub archetype: String,
    #[serde(default)]
    pub category_id: Option<CategoryId>,
    /// Tag names, in the order the forum lists them.
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub deleted_at: Option<OffsetDateTime>,
}

fn default_visible() -> bool {
    true
}

fn default_archetype() -> String {
    "regular".to_string()
}

impl Topic {
    pub fn url(&self) -> String {
        format!("/t/{}/{}", self.slug, self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub id: TagId,
    pub name: String,
    #[serde(default)]
    pub public_topic_count: i64,
}

/// A topic together with the category it is filed under.
#[derive(Debug, Clone, PartialEq)]
pub struct TopicContext {
    pub topic: Topic,
    pub category: Option<Category>,
}

/// A post with every related entity its documents denormalize.
#[derive(Debug, Clone, PartialEq)]
pub struct PostContext {
    pub post: Post,
    pub author: Option<User>,
    pub topic: Option<TopicContext>,
}
