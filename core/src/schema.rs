//! Index names and mappings.
//!
//! Natural-language fields get the `standard` analyzer for both indexing and
//! search; every other field is left to dynamic mapping.

use serde_json::{json, Value};

use crate::error::SyncResult;
use crate::gateway::IndexGateway;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexKind {
    Users,
    Posts,
    Tags,
}

impl IndexKind {
    pub const ALL: [IndexKind; 3] = [IndexKind::Users, IndexKind::Posts, IndexKind::Tags];

    pub fn suffix(self) -> &'static str {
        match self {
            IndexKind::Users => "users",
            IndexKind::Posts => "posts",
            IndexKind::Tags => "tags",
        }
    }

    pub fn mapping(self) -> Value {
        let properties = match self {
            IndexKind::Users => json!({
                "name": text_field(),
                "url": text_field(),
                "username": text_field(),
            }),
            IndexKind::Posts => json!({
                "topic": {
                    "properties": {
                        "title": text_field(),
                    }
                },
                "content": text_field(),
            }),
            IndexKind::Tags => json!({
                "name": text_field(),
                "url": text_field(),
            }),
        };
        json!({ "mappings": { "properties": properties } })
    }
}

fn text_field() -> Value {
    json!({
        "type": "text",
        "analyzer": "standard",
        "search_analyzer": "standard",
    })
}

/// Concrete index names under a shared prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexNames {
    prefix: String,
}

impl IndexNames {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into() }
    }

    pub fn name(&self, kind: IndexKind) -> String {
        format!("{}-{}", self.prefix, kind.suffix())
    }

    pub fn users(&self) -> String {
        self.name(IndexKind::Users)
    }

    pub fn posts(&self) -> String {
        self.name(IndexKind::Posts)
    }

    pub fn tags(&self) -> String {
        self.name(IndexKind::Tags)
    }
}

/// Create any of the three indices that do not exist yet.
pub async fn create_all(gateway: &dyn IndexGateway, names: &IndexNames) -> SyncResult<()> {
    for kind in IndexKind::ALL {
        let index = names.name(kind);
        gateway.ensure_index_schema(&index, kind.mapping()).await?;
        tracing::info!(index = %index, "index schema ready");
    }
    Ok(())
}

/// Drop all three indices and create them again with fresh mappings.
pub async fn reset_all(gateway: &dyn IndexGateway, names: &IndexNames) -> SyncResult<()> {
    for kind in IndexKind::ALL {
        let index = names.name(kind);
        if !gateway.drop_index(&index).await? {
            tracing::info!(index = %index, "index did not exist");
        }
    }
    create_all(gateway, names).await
}
