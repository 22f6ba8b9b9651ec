use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use super::{BulkDocument, IndexGateway};
use crate::error::{SyncError, SyncResult};

/// A request the gateway received, kept for assertions.
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayCall {
    UpsertOne { index: String, id: String },
    BulkUpsert { index: String, ids: Vec<String> },
    DeleteByFilter { index: String, field: String, value: Value },
    EnsureIndexSchema { index: String },
    DropIndex { index: String },
}

#[derive(Default)]
struct State {
    indices: HashMap<String, Index>,
    calls: Vec<GatewayCall>,
    fail_next: usize,
    failing_filter_values: Vec<Value>,
    failures: Vec<String>,
}

#[derive(Default)]
struct Index {
    schema: Option<Value>,
    documents: BTreeMap<String, Value>,
}

/// Index kept in process memory, with switches for simulating service failures.
///
/// Writes to an index that was never created create it implicitly, as an
/// index with dynamic mapping would.
#[derive(Default)]
pub struct MemoryGateway {
    state: Mutex<State>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` requests fail.
    pub fn fail_next(&self, n: usize) {
        self.state.lock().fail_next = n;
    }

    /// Make every delete-by-filter for `value` fail.
    pub fn fail_filter_value(&self, value: Value) {
        self.state.lock().failing_filter_values.push(value);
    }

    pub fn documents(&self, index: &str) -> BTreeMap<String, Value> {
        self.state
            .lock()
            .indices
            .get(index)
            .map(|i| i.documents.clone())
            .unwrap_or_default()
    }

    pub fn document(&self, index: &str, id: &str) -> Option<Value> {
        self.state.lock().indices.get(index)?.documents.get(id).cloned()
    }

    pub fn schema(&self, index: &str) -> Option<Value> {
        self.state.lock().indices.get(index)?.schema.clone()
    }

    pub fn has_index(&self, index: &str) -> bool {
        self.state.lock().indices.contains_key(index)
    }

    pub fn calls(&self) -> Vec<GatewayCall> {
        self.state.lock().calls.clone()
    }

    /// Messages of the failures injected so far, oldest first.
    pub fn injected_failures(&self) -> Vec<String> {
        self.state.lock().failures.clone()
    }
}

impl State {
    fn check(&mut self, operation: &'static str, index: &str) -> SyncResult<()> {
        if self.fail_next > 0 {
            self.fail_next -= 1;
            self.failures.push(format!("{operation} {index}"));
            return Err(SyncError::index_service(operation, index, "simulated outage"));
        }
        Ok(())
    }
}

/// Look up a dotted path such as `topic.id`.
fn field_value<'a>(doc: &'a Value, field: &str) -> Option<&'a Value> {
    field.split('.').try_fold(doc, |v, key| v.get(key))
}

#[async_trait]
impl IndexGateway for MemoryGateway {
    async fn upsert_one(&self, index: &str, id: &str, document: Value) -> SyncResult<()> {
        let mut state = self.state.lock();
        state.calls.push(GatewayCall::UpsertOne { index: index.into(), id: id.into() });
        state.check("index document", index)?;
        state
            .indices
            .entry(index.to_string())
            .or_default()
            .documents
            .insert(id.to_string(), document);
        Ok(())
    }

    async fn bulk_upsert(&self, index: &str, documents: Vec<BulkDocument>) -> SyncResult<()> {
        let mut state = self.state.lock();
        state.calls.push(GatewayCall::BulkUpsert {
            index: index.into(),
            ids: documents.iter().map(|d| d.id.clone()).collect(),
        });
        state.check("bulk index", index)?;
        let target = state.indices.entry(index.to_string()).or_default();
        for doc in documents {
            target.documents.insert(doc.id, doc.body);
        }
        Ok(())
    }

    async fn delete_by_filter(&self, index: &str, field: &str, value: Value) -> SyncResult<u64> {
        let mut state = self.state.lock();
        state.calls.push(GatewayCall::DeleteByFilter {
            index: index.into(),
            field: field.into(),
            value: value.clone(),
        });
        state.check("delete by query", index)?;
        if state.failing_filter_values.contains(&value) {
            state.failures.push(format!("delete by query {index} {value}"));
            return Err(SyncError::index_service("delete by query", index, "simulated rejection"));
        }
        let Some(target) = state.indices.get_mut(index) else {
            return Ok(0);
        };
        let before = target.documents.len();
        target
            .documents
            .retain(|_, doc| field_value(doc, field) != Some(&value));
        Ok((before - target.documents.len()) as u64)
    }

    async fn ensure_index_schema(&self, index: &str, schema: Value) -> SyncResult<()> {
        let mut state = self.state.lock();
        state.calls.push(GatewayCall::EnsureIndexSchema { index: index.into() });
        state.check("create index", index)?;
        let target = state.indices.entry(index.to_string()).or_default();
        if target.schema.is_none() {
            target.schema = Some(schema);
        }
        Ok(())
    }

    async fn drop_index(&self, index: &str) -> SyncResult<bool> {
        let mut state = self.state.lock();
        state.calls.push(GatewayCall::DropIndex { index: index.into() });
        state.check("delete index", index)?;
        Ok(state.indices.remove(index).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(id: &str, post_id: i64) -> BulkDocument {
        BulkDocument { id: id.into(), body: json!({ "post_id": post_id, "topic": { "id": 5 } }) }
    }

    #[tokio::test]
    async fn delete_by_filter_matches_nested_fields() {
        let gateway = MemoryGateway::new();
        gateway
            .bulk_upsert("posts", vec![doc("1-0", 1), doc("1-1", 1), doc("2-0", 2)])
            .await
            .unwrap();

        assert_eq!(gateway.delete_by_filter("posts", "post_id", json!(1)).await.unwrap(), 2);
        assert_eq!(gateway.documents("posts").len(), 1);
        assert_eq!(gateway.delete_by_filter("posts", "topic.id", json!(5)).await.unwrap(), 1);
        assert_eq!(gateway.delete_by_filter("missing", "post_id", json!(1)).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn injected_failures_surface_as_service_errors() {
        let gateway = MemoryGateway::new();
        gateway.fail_next(1);
        let err = gateway.upsert_one("users", "1", json!({})).await.unwrap_err();
        assert!(err.is_retryable());
        assert!(gateway.upsert_one("users", "1", json!({})).await.is_ok());
        assert_eq!(gateway.injected_failures(), vec!["index document users"]);
    }

    #[tokio::test]
    async fn drop_index_reports_absence() {
        let gateway = MemoryGateway::new();
        gateway.ensure_index_schema("tags", json!({ "mappings": {} })).await.unwrap();
        assert!(gateway.drop_index("tags").await.unwrap());
        assert!(!gateway.drop_index("tags").await.unwrap());
    }
}
