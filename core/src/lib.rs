//! Keeps a forum's search index in step with its users, posts, topics and tags.
//!
//! Change notifications are routed to [`SyncCoordinator`] entry points, which
//! load the current entity from a [`ForumStore`], check it against the
//! [`policy`] predicates, flatten it into search documents and write them
//! through an [`IndexGateway`].

pub mod config;
pub mod coordinator;
pub mod document;
pub mod error;
pub mod events;
pub mod gateway;
pub mod model;
pub mod policy;
pub mod schema;
pub mod segmenter;
pub mod store;

pub use config::SyncConfig;
pub use coordinator::{ErrorReporter, PostSync, SyncCoordinator, SyncOutcome, TracingReporter};
pub use error::{SyncError, SyncResult};
pub use events::{route, ForumEvent, SyncJob};
pub use gateway::IndexGateway;
pub use policy::SkipReason;
pub use schema::{IndexKind, IndexNames};
pub use store::{AccessControl, ForumStore};
