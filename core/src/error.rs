use thiserror::Error;

pub type SyncResult<T> = Result<T, SyncError>;

/// Failures that abort a sync job.
///
/// Missing or ineligible entities are not errors; they come back as a
/// [`SkipReason`](crate::policy::SkipReason) so an at-least-once queue does not
/// retry them.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The indexing service rejected a request or could not be reached.
    #[error("index service failed to {operation} on '{index}': {message}")]
    IndexService {
        operation: &'static str,
        index: String,
        message: String,
    },

    /// The forum store could not answer a lookup.
    #[error("forum store lookup failed: {0}")]
    Store(String),

    /// A document could not be turned into a request body.
    #[error("could not serialize document {document_id}: {source}")]
    Transformation {
        document_id: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl SyncError {
    pub(crate) fn index_service(
        operation: &'static str,
        index: &str,
        message: impl Into<String>,
    ) -> Self {
        SyncError::IndexService {
            operation,
            index: index.to_string(),
            message: message.into(),
        }
    }

    /// Whether a job queue should run the job again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::IndexService { .. } | SyncError::Store(_))
    }
}
