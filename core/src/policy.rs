//! Eligibility rules applied before anything is written to the index.

use serde::Serialize;

use crate::model::{PostContext, PostType, Tag, User};
use crate::store::AccessControl;

/// Why an entity produced no documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    NotFound,
    NotVisible,
    NotRegularPost,
    NoTopic,
    NoPublicTopics,
}

/// The reason a post must stay out of the index, if any.
pub fn post_ineligibility(post: Option<&PostContext>) -> Option<SkipReason> {
    let Some(ctx) = post else {
        return Some(SkipReason::NotFound);
    };
    if ctx.post.post_type != PostType::Regular {
        return Some(SkipReason::NotRegularPost);
    }
    if ctx.topic.is_none() {
        return Some(SkipReason::NoTopic);
    }
    None
}

pub fn is_post_indexable(post: Option<&PostContext>) -> bool {
    post_ineligibility(post).is_none()
}

pub fn is_tag_indexable(tag: &Tag) -> bool {
    tag.public_topic_count > 0
}

/// Whether `viewer` may see `user`. An unresolved viewer is anonymous.
pub fn is_user_visible_for_indexing(
    user: Option<&User>,
    access: &dyn AccessControl,
    viewer: Option<&User>,
) -> bool {
    match user {
        Some(user) => access.can_see_user(viewer, user),
        None => false,
    }
}
