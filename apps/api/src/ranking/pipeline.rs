//! CV ranking pipeline.
//!
//! Flow: embed JD → extract PDFs → (clean → contact → strip → embed) per CV,
//!       bounded fan-out → ensure index → upsert into request partition →
//!       exhaustive k-NN query → delete partition → response.
//!
//! Partition cleanup runs whenever indexing was attempted, on success and on failure.

use std::path::Path;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::embedding::{check_dimension, Embedder};
use crate::errors::AppError;
use crate::extraction::{list_pdf_files, TextExtractor};
use crate::normalizer::{strip_contact_info, TextNormalizer};
use crate::search::{FieldEq, IndexedRecord, SearchResult, VectorIndex, VectorQuery};

pub const NO_RESULTS_MESSAGE: &str = "No suitable CVs found.";
pub const MISSING_CONTACT_INFO: &str = "No contact info available";

// ────────────────────────────────────────────────────────────────────────────
// Data models
// ────────────────────────────────────────────────────────────────────────────

/// A CV as it moves through normalization. Lives for one request only.
#[derive(Debug, Clone)]
pub struct Document {
    pub name: String,
    pub raw_text: String,
    pub cleaned_text: String,
    pub contact_info: String,
}

/// A normalized document and its embedding, ready for indexing.
#[derive(Debug, Clone)]
struct PreparedCv {
    document: Document,
    vector: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedCv {
    pub cv_name: String,
    pub similarity_score: f64,
    pub contact_info: String,
}

impl From<SearchResult> for RankedCv {
    fn from(hit: SearchResult) -> Self {
        let contact_info = if hit.contact_info.trim().is_empty() {
            MISSING_CONTACT_INFO.to_string()
        } else {
            hit.contact_info
        };
        Self {
            cv_name: hit.cv_name,
            similarity_score: hit.score,
            contact_info,
        }
    }
}

/// A CV left out of the ranking, and why.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedCv {
    pub cv_name: String,
    pub reason: String,
}

impl SkippedCv {
    pub fn new(cv_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            cv_name: cv_name.into(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RankingOutcome {
    pub request_id: Uuid,
    /// Highest similarity first, at most `top_k` entries.
    pub results: Vec<RankedCv>,
    pub skipped: Vec<SkippedCv>,
}

#[derive(Debug, Clone, Copy)]
pub struct RankingSettings {
    pub embedding_dimension: usize,
    pub default_top_k: usize,
    pub max_concurrent_documents: usize,
}

impl RankingSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            embedding_dimension: config.embedding_dimension,
            default_top_k: config.ranking_top_k,
            max_concurrent_documents: config.max_concurrent_documents,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Pipeline
// ────────────────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct RankingPipeline {
    extractor: Arc<dyn TextExtractor>,
    normalizer: TextNormalizer,
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    settings: RankingSettings,
}

impl RankingPipeline {
    pub fn new(
        extractor: Arc<dyn TextExtractor>,
        normalizer: TextNormalizer,
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        settings: RankingSettings,
    ) -> Self {
        Self {
            extractor,
            normalizer,
            embedder,
            index,
            settings,
        }
    }

    /// Ranks every PDF in `cv_dir` against `job_description`.
    ///
    /// An empty `results` means no CV could be ranked. Per-CV failures are
    /// reported in `skipped` and never abort the request; failures of the job
    /// description embedding or of the index do.
    pub async fn rank(
        &self,
        job_description: &str,
        cv_dir: &Path,
        top_k: Option<usize>,
    ) -> Result<RankingOutcome, AppError> {
        if job_description.trim().is_empty() {
            return Err(AppError::Validation(
                "job_description cannot be empty".to_string(),
            ));
        }
        let top_k = top_k.unwrap_or(self.settings.default_top_k);
        if top_k == 0 {
            return Err(AppError::Validation("top_k must be at least 1".to_string()));
        }

        let request_id = Uuid::new_v4();
        info!("Ranking request {request_id}: top_k={top_k}");

        // Step 1: embed the job description
        let job_vector = self
            .embedder
            .embed(job_description)
            .await
            .map_err(|e| AppError::from_embedding("Job description embedding failed", e))?;
        check_dimension(&job_vector, self.settings.embedding_dimension)
            .map_err(|e| AppError::Embedding(format!("Job description: {e}")))?;

        // Step 2: extract, normalize and embed each CV independently
        let uploaded = list_pdf_files(cv_dir)
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to list uploads: {e}")))?;
        let texts = self
            .extractor
            .extract_dir(cv_dir)
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to read uploads: {e}")))?;

        let mut skipped: Vec<SkippedCv> = uploaded
            .iter()
            .filter(|name| !texts.contains_key(*name))
            .map(|name| SkippedCv::new(name.as_str(), "could not extract text from PDF"))
            .collect();

        let mut prepared: Vec<PreparedCv> = Vec::with_capacity(texts.len());
        let mut outcomes = stream::iter(texts)
            .map(|(name, raw_text)| self.prepare_document(name, raw_text))
            .buffer_unordered(self.settings.max_concurrent_documents);
        while let Some(outcome) = outcomes.next().await {
            match outcome {
                Ok(doc) => prepared.push(doc),
                Err(skip) => {
                    warn!("Request {request_id}: skipping {}: {}", skip.cv_name, skip.reason);
                    skipped.push(skip);
                }
            }
        }
        prepared.sort_by(|a, b| a.document.name.cmp(&b.document.name));
        info!(
            "Request {request_id}: embedded {} CVs, skipped {}",
            prepared.len(),
            skipped.len()
        );

        if prepared.is_empty() {
            skipped.sort_by(|a, b| a.cv_name.cmp(&b.cv_name));
            return Ok(RankingOutcome {
                request_id,
                results: Vec::new(),
                skipped,
            });
        }

        // Armed before the first index write; runs on success, failure or cancellation
        let cleanup = PartitionCleanup::new(
            self.index.clone(),
            request_id,
            prepared.iter().map(|p| p.document.name.clone()).collect(),
        );

        // Steps 3–4: index into the request partition and query it
        let searched = self
            .index_and_query(request_id, prepared, job_vector, top_k, &mut skipped)
            .await;

        // Step 5
        cleanup.finish().await;

        let hits = searched?;
        skipped.sort_by(|a, b| a.cv_name.cmp(&b.cv_name));
        info!("Request {request_id}: returning {} CVs", hits.len());

        Ok(RankingOutcome {
            request_id,
            results: hits.into_iter().map(RankedCv::from).collect(),
            skipped,
        })
    }

    /// clean → contact → strip → embed → dimension check, for one CV.
    async fn prepare_document(
        &self,
        name: String,
        raw_text: String,
    ) -> Result<PreparedCv, SkippedCv> {
        let cleaned_text = self
            .normalizer
            .clean_text(&raw_text)
            .await
            .map_err(|e| SkippedCv::new(&name, format!("text cleanup failed: {e}")))?;
        let contact_info = self
            .normalizer
            .extract_contact_info(&cleaned_text)
            .await
            .map_err(|e| SkippedCv::new(&name, format!("contact extraction failed: {e}")))?;

        let body = strip_contact_info(&cleaned_text, &contact_info);
        let vector = self
            .embedder
            .embed(&body)
            .await
            .map_err(|e| SkippedCv::new(&name, format!("embedding failed: {e}")))?;
        check_dimension(&vector, self.settings.embedding_dimension)
            .map_err(|reason| SkippedCv::new(&name, reason))?;

        let document = Document {
            name,
            raw_text,
            cleaned_text,
            contact_info,
        };
        debug!(
            "Normalized {}: {} raw chars → {} cleaned chars",
            document.name,
            document.raw_text.len(),
            document.cleaned_text.len()
        );
        Ok(PreparedCv { document, vector })
    }

    async fn index_and_query(
        &self,
        request_id: Uuid,
        prepared: Vec<PreparedCv>,
        job_vector: Vec<f32>,
        top_k: usize,
        skipped: &mut Vec<SkippedCv>,
    ) -> Result<Vec<SearchResult>, AppError> {
        self.index
            .ensure_exists()
            .await
            .map_err(|e| AppError::from_search("Failed to ensure index exists", e))?;

        // One lookup for the whole partition; per-name checks only when it is non-empty.
        let partition_in_use = self
            .index
            .contains(&[FieldEq::partition(request_id)])
            .await
            .map_err(|e| AppError::from_search("Index lookup failed", e))?;

        let mut records = Vec::with_capacity(prepared.len());
        for PreparedCv { document: doc, vector } in prepared {
            if partition_in_use {
                let filters = [FieldEq::cv_name(&doc.name), FieldEq::partition(request_id)];
                let already_indexed = self
                    .index
                    .contains(&filters)
                    .await
                    .map_err(|e| AppError::from_search("Index lookup failed", e))?;
                if already_indexed {
                    info!("Request {request_id}: {} already indexed, skipping", doc.name);
                    continue;
                }
            }
            records.push(IndexedRecord::new(
                request_id,
                doc.name,
                vector,
                doc.contact_info,
            ));
        }

        let report = self
            .index
            .upsert(records)
            .await
            .map_err(|e| AppError::from_search("Failed to index CVs", e))?;
        skipped.extend(
            report
                .rejected
                .into_iter()
                .map(|r| SkippedCv::new(r.cv_name, r.reason)),
        );

        if report.indexed.is_empty() {
            return Ok(Vec::new());
        }

        self.index
            .query(&VectorQuery {
                vector: job_vector,
                k: top_k,
                exhaustive: true,
                partition: Some(request_id),
            })
            .await
            .map_err(|e| AppError::from_search("Similarity search failed", e))
    }
}

/// Deletes a request's partition. If dropped before `finish` completes (the
/// request future was cancelled), the delete is spawned onto the runtime instead.
struct PartitionCleanup {
    index: Arc<dyn VectorIndex>,
    partition: Uuid,
    cv_names: Vec<String>,
    armed: bool,
}

impl PartitionCleanup {
    fn new(index: Arc<dyn VectorIndex>, partition: Uuid, cv_names: Vec<String>) -> Self {
        Self {
            index,
            partition,
            cv_names,
            armed: true,
        }
    }

    async fn finish(mut self) {
        delete_partition_logged(self.index.as_ref(), self.partition, &self.cv_names).await;
        self.armed = false;
    }
}

impl Drop for PartitionCleanup {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let index = self.index.clone();
        let partition = self.partition;
        let cv_names = std::mem::take(&mut self.cv_names);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                warn!("Request {partition} dropped before cleanup, deleting partition in background");
                handle.spawn(async move {
                    delete_partition_logged(index.as_ref(), partition, &cv_names).await;
                });
            }
            Err(_) => error!("Request {partition}: no runtime left to delete its partition"),
        }
    }
}

async fn delete_partition_logged(index: &dyn VectorIndex, partition: Uuid, cv_names: &[String]) {
    match index.delete_partition(partition, cv_names).await {
        Ok(removed) => info!("Request {partition}: removed {removed} indexed CVs"),
        Err(e) => error!("Request {partition}: partition cleanup failed: {e}"),
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
