use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;
use elasticsearch::auth::Credentials;
use elasticsearch::http::request::JsonBody;
use elasticsearch::http::response::Response;
use elasticsearch::http::transport::{SingleNodeConnectionPool, TransportBuilder};
use elasticsearch::indices::{IndicesCreateParts, IndicesDeleteParts, IndicesExistsParts};
use elasticsearch::params::{Conflicts, Refresh};
use elasticsearch::{BulkParts, DeleteByQueryParts, Elasticsearch, IndexParts};
use serde_json::{json, Value};

use super::{BulkDocument, IndexGateway};
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};

/// Gateway backed by an Elasticsearch cluster.
///
/// Holds one client for the life of the process; the transport keeps its own
/// connection pool, so the gateway is shared behind an `Arc` instead of being
/// rebuilt per request.
pub struct ElasticsearchGateway {
    client: Elasticsearch,
    url: String,
}

impl Debug for ElasticsearchGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElasticsearchGateway")
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

impl ElasticsearchGateway {
    pub fn new(config: &SyncConfig) -> SyncResult<Self> {
        config.validate()?;
        let url = config.server_url();
        let parsed_url: elasticsearch::http::Url = url
            .parse()
            .map_err(|e| SyncError::Config(format!("invalid server url {url}: {e}")))?;

        let mut builder = TransportBuilder::new(SingleNodeConnectionPool::new(parsed_url))
            .timeout(Duration::from_millis(config.request_timeout_ms));
        if let Some(api_key) = config.api_key.as_ref().filter(|k| !k.is_empty()) {
            builder = builder.auth(Credentials::EncodedApiKey(api_key.clone()));
        }

        let transport = builder
            .build()
            .map_err(|e| SyncError::Config(format!("failed to build transport: {e}")))?;

        tracing::debug!(%url, "elasticsearch client ready");
        Ok(Self { client: Elasticsearch::new(transport), url })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Bulk writes wait until their documents are searchable. A delete-by-query
/// issued right after only sees refreshed documents, so without this a quick
/// rebuild could miss fragments written moments earlier.
const BULK_REFRESH: Refresh = Refresh::WaitFor;

/// Action and source lines of a bulk index request, in order.
fn bulk_lines(documents: Vec<BulkDocument>) -> Vec<Value> {
    let mut lines = Vec::with_capacity(documents.len() * 2);
    for doc in documents {
        lines.push(json!({ "index": { "_id": doc.id } }));
        lines.push(doc.body);
    }
    lines
}

fn term_query(field: &str, value: Value) -> Value {
    json!({ "query": { "term": { field: value } } })
}

/// Fail with the response body when the status is not 2xx.
async fn expect_success(response: Response, operation: &'static str, index: &str) -> SyncResult<Response> {
    let status = response.status_code();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(SyncError::index_service(operation, index, format!("status {status}: {body}")))
}

/// First item-level failure reported by a bulk response.
fn first_bulk_error(body: &Value) -> Option<String> {
    if !body.get("errors").and_then(Value::as_bool).unwrap_or(false) {
        return None;
    }
    let items = body.get("items")?.as_array()?;
    let failed = items
        .iter()
        .filter_map(|item| item.get("index"))
        .find(|op| op.get("error").is_some());
    Some(match failed {
        Some(op) => format!(
            "document {} rejected: {}",
            op.get("_id").and_then(Value::as_str).unwrap_or("?"),
            op["error"]
        ),
        None => "bulk request reported errors".to_string(),
    })
}

#[async_trait]
impl IndexGateway for ElasticsearchGateway {
    async fn upsert_one(&self, index: &str, id: &str, document: Value) -> SyncResult<()> {
        let response = self
            .client
            .index(IndexParts::IndexId(index, id))
            .body(document)
            .send()
            .await
            .map_err(|e| SyncError::index_service("index document", index, e.to_string()))?;
        expect_success(response, "index document", index).await?;
        tracing::debug!(index, id, "indexed document");
        Ok(())
    }

    async fn bulk_upsert(&self, index: &str, documents: Vec<BulkDocument>) -> SyncResult<()> {
        if documents.is_empty() {
            return Ok(());
        }
        let count = documents.len();
        let body: Vec<JsonBody<Value>> = bulk_lines(documents).into_iter().map(JsonBody::from).collect();

        let response = self
            .client
            .bulk(BulkParts::Index(index))
            .refresh(BULK_REFRESH)
            .body(body)
            .send()
            .await
            .map_err(|e| SyncError::index_service("bulk index", index, e.to_string()))?;
        let response = expect_success(response, "bulk index", index).await?;
        let result = response
            .json::<Value>()
            .await
            .map_err(|e| SyncError::index_service("bulk index", index, format!("unreadable response: {e}")))?;
        if let Some(message) = first_bulk_error(&result) {
            return Err(SyncError::index_service("bulk index", index, message));
        }
        tracing::debug!(index, count, "bulk indexed documents");
        Ok(())
    }

    async fn delete_by_filter(&self, index: &str, field: &str, value: Value) -> SyncResult<u64> {
        let response = self
            .client
            .delete_by_query(DeleteByQueryParts::Index(&[index]))
            .refresh(true)
            .conflicts(Conflicts::Proceed)
            .body(term_query(field, value))
            .send()
            .await
            .map_err(|e| SyncError::index_service("delete by query", index, e.to_string()))?;

        let status = response.status_code();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            // nothing indexed yet
            if body.contains("index_not_found_exception") {
                return Ok(0);
            }
            return Err(SyncError::index_service(
                "delete by query",
                index,
                format!("status {status}: {body}"),
            ));
        }

        let result = response
            .json::<Value>()
            .await
            .map_err(|e| SyncError::index_service("delete by query", index, format!("unreadable response: {e}")))?;
        let deleted = result.get("deleted").and_then(Value::as_u64).unwrap_or(0);
        tracing::debug!(index, field, deleted, "deleted documents by filter");
        Ok(deleted)
    }

    async fn ensure_index_schema(&self, index: &str, schema: Value) -> SyncResult<()> {
        let exists = self
            .client
            .indices()
            .exists(IndicesExistsParts::Index(&[index]))
            .send()
            .await
            .map_err(|e| SyncError::index_service("check index", index, e.to_string()))?;
        if exists.status_code().is_success() {
            return Ok(());
        }

        let response = self
            .client
            .indices()
            .create(IndicesCreateParts::Index(index))
            .body(schema)
            .send()
            .await
            .map_err(|e| SyncError::index_service("create index", index, e.to_string()))?;

        let status = response.status_code();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            // lost a race with another creator
            if body.contains("resource_already_exists_exception") {
                return Ok(());
            }
            return Err(SyncError::index_service("create index", index, format!("status {status}: {body}")));
        }
        tracing::info!(index, "created index");
        Ok(())
    }

    async fn drop_index(&self, index: &str) -> SyncResult<bool> {
        let response = self
            .client
            .indices()
            .delete(IndicesDeleteParts::Index(&[index]))
            .send()
            .await
            .map_err(|e| SyncError::index_service("delete index", index, e.to_string()))?;

        let status = response.status_code();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if body.contains("index_not_found_exception") {
                return Ok(false);
            }
            return Err(SyncError::index_service("delete index", index, format!("status {status}: {body}")));
        }
        tracing::info!(index, "deleted index");
        Ok(true)
    }
}
