//! Vector index: wraps the vector search service behind the `VectorIndex` trait.
//!
//! Backends:
//! - `AzureSearchIndex`: Azure AI Search over REST (production)
//! - `MemoryVectorIndex`: exact cosine search in-process (local runs, tests)
//!
//! Every record carries a `partition` (the ranking request id). Ranking queries
//! and cleanup are scoped to one partition, so concurrent requests sharing the
//! index never see or delete each other's documents.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::embedding::check_dimension;
use crate::retry::is_retryable_transport;

pub mod azure;
pub mod memory;

pub use azure::AzureSearchIndex;
pub use memory::MemoryVectorIndex;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Search API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Index '{0}' does not exist")]
    IndexMissing(String),

    #[error("Vector dimension mismatch: expected {expected}, got {actual}")]
    Dimension { expected: usize, actual: usize },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Gave up after {attempts} attempts: {message}")]
    RetriesExhausted { attempts: u32, message: String },
}

impl SearchError {
    pub fn is_transient(&self) -> bool {
        match self {
            SearchError::Http(e) => is_retryable_transport(e),
            SearchError::Api { status, .. } => *status == 429 || *status >= 500,
            SearchError::RetriesExhausted { .. } => true,
            SearchError::IndexMissing(_) | SearchError::Dimension { .. } | SearchError::Parse(_) => {
                false
            }
        }
    }
}

/// A CV embedding as stored in the index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedRecord {
    /// Idempotency key: UUIDv5 of (partition, cv_name).
    pub id: Uuid,
    pub partition: Uuid,
    pub cv_name: String,
    pub vector: Vec<f32>,
    pub contact_info: String,
}

impl IndexedRecord {
    pub fn new(partition: Uuid, cv_name: String, vector: Vec<f32>, contact_info: String) -> Self {
        Self {
            id: record_id(partition, &cv_name),
            partition,
            cv_name,
            vector,
            contact_info,
        }
    }
}

/// Deterministic record id, so re-indexing a name within a partition overwrites.
pub fn record_id(partition: Uuid, cv_name: &str) -> Uuid {
    Uuid::new_v5(&partition, cv_name.as_bytes())
}

/// A single nearest-neighbour hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub cv_name: String,
    pub contact_info: String,
    pub score: f64,
}

/// Filterable fields of the index schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexField {
    CvName,
    Partition,
}

impl IndexField {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexField::CvName => "cv_name",
            IndexField::Partition => "partition",
        }
    }
}

/// `field eq 'value'`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldEq {
    pub field: IndexField,
    pub value: String,
}

impl FieldEq {
    pub fn cv_name(value: impl Into<String>) -> Self {
        Self {
            field: IndexField::CvName,
            value: value.into(),
        }
    }

    pub fn partition(partition: Uuid) -> Self {
        Self {
            field: IndexField::Partition,
            value: partition.to_string(),
        }
    }

    fn matches(&self, record: &IndexedRecord) -> bool {
        match self.field {
            IndexField::CvName => record.cv_name == self.value,
            IndexField::Partition => record.partition.to_string() == self.value,
        }
    }
}

#[derive(Debug, Clone)]
pub struct VectorQuery {
    pub vector: Vec<f32>,
    pub k: usize,
    /// Exact (non-approximate) nearest-neighbour search.
    pub exhaustive: bool,
    pub partition: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RejectedRecord {
    pub cv_name: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UpsertReport {
    pub indexed: Vec<String>,
    pub rejected: Vec<RejectedRecord>,
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// absent → present. No-op when the index already exists.
    async fn ensure_exists(&self) -> Result<(), SearchError>;

    /// Writes records with merge-or-upload semantics. Records whose vector
    /// dimension is wrong are rejected individually and never stored.
    async fn upsert(&self, records: Vec<IndexedRecord>) -> Result<UpsertReport, SearchError>;

    /// True when at least one record matches every filter.
    async fn contains(&self, filters: &[FieldEq]) -> Result<bool, SearchError>;

    /// Up to `k` nearest records, highest score first.
    async fn query(&self, query: &VectorQuery) -> Result<Vec<SearchResult>, SearchError>;

    /// Deletes every record in `partition`, returning how many were removed.
    /// `cv_names` are the names written to the partition; their keys are
    /// derived with `record_id` and deleted even if the backend cannot list them yet.
    async fn delete_partition(
        &self,
        partition: Uuid,
        cv_names: &[String],
    ) -> Result<usize, SearchError>;

    /// present → absent → present. Destroys every record in the index.
    async fn delete_all(&self) -> Result<(), SearchError>;

    fn backend(&self) -> &'static str;
}

/// Splits records into those matching `dimension` and rejections.
pub(crate) fn split_by_dimension(
    records: Vec<IndexedRecord>,
    dimension: usize,
) -> (Vec<IndexedRecord>, Vec<RejectedRecord>) {
    let mut valid = Vec::with_capacity(records.len());
    let mut rejected = Vec::new();
    for record in records {
        match check_dimension(&record.vector, dimension) {
            Ok(()) => valid.push(record),
            Err(reason) => {
                tracing::warn!("Rejecting {}: {reason}", record.cv_name);
                rejected.push(RejectedRecord {
                    cv_name: record.cv_name,
                    reason,
                });
            }
        }
    }
    (valid, rejected)
}
