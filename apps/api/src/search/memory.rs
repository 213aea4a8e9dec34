//! In-process vector index with exact cosine similarity.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::search::{
    split_by_dimension, FieldEq, IndexedRecord, SearchError, SearchResult, UpsertReport,
    VectorIndex, VectorQuery,
};

const INDEX_NAME: &str = "memory";

/// `None` models the absent state of the index.
pub struct MemoryVectorIndex {
    dimension: usize,
    records: RwLock<Option<HashMap<Uuid, IndexedRecord>>>,
}

impl MemoryVectorIndex {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            records: RwLock::new(None),
        }
    }

    /// Number of stored records; `None` when the index is absent.
    #[cfg(test)]
    pub async fn len(&self) -> Option<usize> {
        self.records.read().await.as_ref().map(HashMap::len)
    }
}

#[async_trait]
impl VectorIndex for MemoryVectorIndex {
    async fn ensure_exists(&self) -> Result<(), SearchError> {
        let mut records = self.records.write().await;
        if records.is_none() {
            *records = Some(HashMap::new());
        }
        Ok(())
    }

    async fn upsert(&self, records: Vec<IndexedRecord>) -> Result<UpsertReport, SearchError> {
        let mut guard = self.records.write().await;
        let stored = guard
            .as_mut()
            .ok_or_else(|| SearchError::IndexMissing(INDEX_NAME.to_string()))?;

        let (valid, rejected) = split_by_dimension(records, self.dimension);
        let mut indexed = Vec::with_capacity(valid.len());
        for record in valid {
            indexed.push(record.cv_name.clone());
            stored.insert(record.id, record);
        }
        Ok(UpsertReport { indexed, rejected })
    }

    async fn contains(&self, filters: &[FieldEq]) -> Result<bool, SearchError> {
        let guard = self.records.read().await;
        let stored = guard
            .as_ref()
            .ok_or_else(|| SearchError::IndexMissing(INDEX_NAME.to_string()))?;
        Ok(stored
            .values()
            .any(|record| filters.iter().all(|f| f.matches(record))))
    }

    async fn query(&self, query: &VectorQuery) -> Result<Vec<SearchResult>, SearchError> {
        if query.vector.len() != self.dimension {
            return Err(SearchError::Dimension {
                expected: self.dimension,
                actual: query.vector.len(),
            });
        }
        let guard = self.records.read().await;
        let stored = guard
            .as_ref()
            .ok_or_else(|| SearchError::IndexMissing(INDEX_NAME.to_string()))?;

        // Always exact; `exhaustive` is implied.
        let mut hits: Vec<SearchResult> = stored
            .values()
            .filter(|r| query.partition.map_or(true, |p| r.partition == p))
            .map(|r| SearchResult {
                cv_name: r.cv_name.clone(),
                contact_info: r.contact_info.clone(),
                score: cosine_similarity(&query.vector, &r.vector) as f64,
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.cv_name.cmp(&b.cv_name))
        });
        hits.truncate(query.k);
        Ok(hits)
    }

    async fn delete_partition(
        &self,
        partition: Uuid,
        _cv_names: &[String],
    ) -> Result<usize, SearchError> {
        let mut guard = self.records.write().await;
        let Some(stored) = guard.as_mut() else {
            return Ok(0);
        };
        let before = stored.len();
        stored.retain(|_, r| r.partition != partition);
        Ok(before - stored.len())
    }

    async fn delete_all(&self) -> Result<(), SearchError> {
        // drop and recreate under one lock
        *self.records.write().await = Some(HashMap::new());
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(partition: Uuid, name: &str, vector: Vec<f32>) -> IndexedRecord {
        IndexedRecord::new(partition, name.to_string(), vector, format!("{name} contact"))
    }

    fn query(vector: Vec<f32>, k: usize, partition: Option<Uuid>) -> VectorQuery {
        VectorQuery {
            vector,
            k,
            exhaustive: true,
            partition,
        }
    }

    #[test]
    fn test_cosine_similarity_basics() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
    }

    #[tokio::test]
    async fn test_operations_require_present_index() {
        let index = MemoryVectorIndex::new(2);
        assert_eq!(index.len().await, None);
        let err = index
            .upsert(vec![record(Uuid::new_v4(), "a.pdf", vec![1.0, 0.0])])
            .await
            .unwrap_err();
        assert!(matches!(err, SearchError::IndexMissing(_)));
        assert!(index.query(&query(vec![1.0, 0.0], 3, None)).await.is_err());
    }

    #[tokio::test]
    async fn test_ensure_exists_is_idempotent() {
        let index = MemoryVectorIndex::new(2);
        index.ensure_exists().await.unwrap();
        index
            .upsert(vec![record(Uuid::new_v4(), "a.pdf", vec![1.0, 0.0])])
            .await
            .unwrap();
        index.ensure_exists().await.unwrap();
        assert_eq!(index.len().await, Some(1));
    }

    #[tokio::test]
    async fn test_query_orders_by_descending_score_and_truncates() {
        let index = MemoryVectorIndex::new(2);
        index.ensure_exists().await.unwrap();
        let p = Uuid::new_v4();
        index
            .upsert(vec![
                record(p, "far.pdf", vec![0.0, 1.0]),
                record(p, "near.pdf", vec![1.0, 0.1]),
                record(p, "mid.pdf", vec![1.0, 1.0]),
            ])
            .await
            .unwrap();

        let hits = index.query(&query(vec![1.0, 0.0], 2, Some(p))).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].cv_name, "near.pdf");
        assert_eq!(hits[1].cv_name, "mid.pdf");
        assert!(hits[0].score >= hits[1].score);
    }

    #[tokio::test]
    async fn test_wrong_dimension_rejected_and_never_returned() {
        let index = MemoryVectorIndex::new(3);
        index.ensure_exists().await.unwrap();
        let p = Uuid::new_v4();
        let report = index
            .upsert(vec![
                record(p, "good.pdf", vec![1.0, 0.0, 0.0]),
                record(p, "bad.pdf", vec![1.0, 0.0]),
            ])
            .await
            .unwrap();
        assert_eq!(report.indexed, vec!["good.pdf".to_string()]);
        assert_eq!(report.rejected.len(), 1);
        assert_eq!(report.rejected[0].cv_name, "bad.pdf");

        let hits = index
            .query(&query(vec![1.0, 0.0, 0.0], 10, None))
            .await
            .unwrap();
        assert!(hits.iter().all(|h| h.cv_name != "bad.pdf"));
    }

    #[tokio::test]
    async fn test_upsert_same_name_same_partition_overwrites() {
        let index = MemoryVectorIndex::new(2);
        index.ensure_exists().await.unwrap();
        let p = Uuid::new_v4();
        index.upsert(vec![record(p, "a.pdf", vec![1.0, 0.0])]).await.unwrap();
        index.upsert(vec![record(p, "a.pdf", vec![0.0, 1.0])]).await.unwrap();
        assert_eq!(index.len().await, Some(1));
    }

    #[tokio::test]
    async fn test_contains_uses_all_filters() {
        let index = MemoryVectorIndex::new(2);
        index.ensure_exists().await.unwrap();
        let p = Uuid::new_v4();
        index.upsert(vec![record(p, "a.pdf", vec![1.0, 0.0])]).await.unwrap();

        assert!(index.contains(&[FieldEq::cv_name("a.pdf")]).await.unwrap());
        assert!(index
            .contains(&[FieldEq::cv_name("a.pdf"), FieldEq::partition(p)])
            .await
            .unwrap());
        assert!(!index
            .contains(&[FieldEq::cv_name("a.pdf"), FieldEq::partition(Uuid::new_v4())])
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_partitions_are_isolated() {
        let index = MemoryVectorIndex::new(2);
        index.ensure_exists().await.unwrap();
        let (p1, p2) = (Uuid::new_v4(), Uuid::new_v4());
        index
            .upsert(vec![
                record(p1, "one.pdf", vec![1.0, 0.0]),
                record(p2, "two.pdf", vec![1.0, 0.0]),
            ])
            .await
            .unwrap();

        let hits = index.query(&query(vec![1.0, 0.0], 10, Some(p1))).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].cv_name, "one.pdf");

        assert_eq!(index.delete_partition(p1, &[]).await.unwrap(), 1);
        assert_eq!(index.len().await, Some(1));
        assert!(index.contains(&[FieldEq::partition(p2)]).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_all_leaves_empty_present_index() {
        let index = MemoryVectorIndex::new(2);
        index.ensure_exists().await.unwrap();
        index
            .upsert(vec![record(Uuid::new_v4(), "a.pdf", vec![1.0, 0.0])])
            .await
            .unwrap();
        index.delete_all().await.unwrap();
        assert_eq!(index.len().await, Some(0));
    }

    #[tokio::test]
    async fn test_query_with_wrong_dimension_fails() {
        let index = MemoryVectorIndex::new(3);
        index.ensure_exists().await.unwrap();
        let err = index.query(&query(vec![1.0], 1, None)).await.unwrap_err();
        assert!(matches!(
            err,
            SearchError::Dimension {
                expected: 3,
                actual: 1
            }
        ));
    }
}
