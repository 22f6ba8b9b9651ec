//! Which sync job a forum change notification turns into.
//!
//! Any change to the first post of a topic that can alter topic-level fields
//! reindexes the whole topic, because those fields are copied into every
//! fragment document of every post in it.

use serde::{Deserialize, Serialize};

use crate::model::{PostId, TopicId, UserId};

/// Action codes of the small-action posts written when a topic is listed or unlisted.
const VISIBILITY_ACTION_CODES: [&str; 2] = ["visible.enabled", "visible.disabled"];

/// The parts of a post the router looks at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostChange {
    pub id: PostId,
    #[serde(default)]
    pub topic_id: Option<TopicId>,
    pub post_number: i32,
    #[serde(default)]
    pub action_code: Option<String>,
}

impl PostChange {
    fn is_first_post(&self) -> bool {
        self.post_number == 1
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ForumEvent {
    UserCreated { user_id: UserId },
    UserUpdated { user_id: UserId },
    PostCreated { post: PostChange },
    PostEdited {
        post: PostChange,
        #[serde(default)]
        topic_changed: bool,
    },
    PostDestroyed { post: PostChange },
    PostRecovered { post: PostChange },
    TagsChanged { tags: Vec<String> },
}

impl ForumEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ForumEvent::UserCreated { .. } => "user_created",
            ForumEvent::UserUpdated { .. } => "user_updated",
            ForumEvent::PostCreated { .. } => "post_created",
            ForumEvent::PostEdited { .. } => "post_edited",
            ForumEvent::PostDestroyed { .. } => "post_destroyed",
            ForumEvent::PostRecovered { .. } => "post_recovered",
            ForumEvent::TagsChanged { .. } => "tags_changed",
        }
    }
}

/// A unit of work for the job queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "job", rename_all = "snake_case")]
pub enum SyncJob {
    IndexUser { user_id: UserId },
    IndexTopic { topic_id: TopicId },
    IndexPost { post_id: PostId },
    IndexTags { tags: Vec<String> },
}

pub fn route(event: &ForumEvent) -> SyncJob {
    match event {
        ForumEvent::UserCreated { user_id } | ForumEvent::UserUpdated { user_id } => {
            SyncJob::IndexUser { user_id: *user_id }
        }
        ForumEvent::PostCreated { post } => {
            let toggles_visibility = post
                .action_code
                .as_deref()
                .is_some_and(|code| VISIBILITY_ACTION_CODES.contains(&code));
            topic_or_post(post, toggles_visibility)
        }
        ForumEvent::PostEdited { post, topic_changed } => {
            topic_or_post(post, post.is_first_post() && *topic_changed)
        }
        ForumEvent::PostDestroyed { post } | ForumEvent::PostRecovered { post } => {
            topic_or_post(post, post.is_first_post())
        }
        ForumEvent::TagsChanged { tags } => SyncJob::IndexTags { tags: tags.clone() },
    }
}

/// A post with no topic id can only be reindexed on its own.
fn topic_or_post(post: &PostChange, whole_topic: bool) -> SyncJob {
    match post.topic_id {
        Some(topic_id) if whole_topic => SyncJob::IndexTopic { topic_id },
        _ => SyncJob::IndexPost { post_id: post.id },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn change(post_number: i32, action_code: Option<&str>) -> PostChange {
        PostChange {
            id: 77,
            topic_id: Some(5),
            post_number,
            action_code: action_code.map(str::to_string),
        }
    }

    #[test]
    fn user_events_index_the_user() {
        assert_eq!(route(&ForumEvent::UserUpdated { user_id: 3 }), SyncJob::IndexUser { user_id: 3 });
        assert_eq!(route(&ForumEvent::UserCreated { user_id: 4 }), SyncJob::IndexUser { user_id: 4 });
    }

    #[test]
    fn listing_and_unlisting_reindex_the_topic() {
        for code in ["visible.enabled", "visible.disabled"] {
            let event = ForumEvent::PostCreated { post: change(9, Some(code)) };
            assert_eq!(route(&event), SyncJob::IndexTopic { topic_id: 5 });
        }
        let event = ForumEvent::PostCreated { post: change(9, Some("closed.enabled")) };
        assert_eq!(route(&event), SyncJob::IndexPost { post_id: 77 });
    }

    #[test]
    fn editing_the_first_post_reindexes_topic_only_when_topic_changed() {
        let edited = |post_number, topic_changed| ForumEvent::PostEdited { post: change(post_number, None), topic_changed };
        assert_eq!(route(&edited(1, true)), SyncJob::IndexTopic { topic_id: 5 });
        assert_eq!(route(&edited(1, false)), SyncJob::IndexPost { post_id: 77 });
        assert_eq!(route(&edited(2, true)), SyncJob::IndexPost { post_id: 77 });
    }

    #[test]
    fn destroying_or_recovering_first_post_reindexes_topic() {
        assert_eq!(
            route(&ForumEvent::PostDestroyed { post: change(1, None) }),
            SyncJob::IndexTopic { topic_id: 5 }
        );
        assert_eq!(
            route(&ForumEvent::PostRecovered { post: change(4, None) }),
            SyncJob::IndexPost { post_id: 77 }
        );
    }

    #[test]
    fn orphaned_first_post_falls_back_to_post_job() {
        let mut post = change(1, None);
        post.topic_id = None;
        assert_eq!(route(&ForumEvent::PostDestroyed { post }), SyncJob::IndexPost { post_id: 77 });
    }

    #[test]
    fn events_deserialize_from_tagged_json() {
        let event: ForumEvent = serde_json::from_str(
            r#"{ "event": "post_edited", "post": { "id": 1, "topic_id": 2, "post_number": 1 }, "topic_changed": true }"#,
        )
        .unwrap();
        assert_eq!(route(&event), SyncJob::IndexTopic { topic_id: 2 });

        let job = serde_json::to_value(SyncJob::IndexTags { tags: vec!["help".into()] }).unwrap();
        assert_eq!(job["job"], "index_tags");
    }
}
