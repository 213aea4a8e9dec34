//! Deterministic stand-ins for the external services, shared by unit tests.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use uuid::Uuid;

use crate::config::Config;
use crate::embedding::Embedder;
use crate::extraction::{list_pdf_files, ExtractError, TextExtractor};
use crate::llm_client::prompts::{CLEAN_TEXT_SYSTEM, CONTACT_INFO_SYSTEM};
use crate::llm_client::{ChatModel, LlmError};
use crate::normalizer::TextNormalizer;
use crate::ranking::pipeline::{RankingPipeline, RankingSettings};
use crate::search::{
    FieldEq, IndexedRecord, MemoryVectorIndex, SearchError, SearchResult, UpsertReport,
    VectorIndex, VectorQuery,
};
use crate::state::AppState;

/// Any prompt containing this makes `StubChat` fail with a terminal error.
pub const LLM_FAILURE_MARKER: &str = "<<llm-failure>>";
/// A file starting with this is treated as unparseable by `PlainTextExtractor`.
pub const CORRUPT_MARKER: &str = "%CORRUPT";

/// Chat model that cleans by trimming and treats the first line as contact info.
#[derive(Default)]
pub struct StubChat {
    fail_status: Option<u16>,
    pub calls: Mutex<Vec<(String, String)>>,
}

impl StubChat {
    pub fn failing(status: u16) -> Self {
        Self {
            fail_status: Some(status),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn last_call(&self) -> Option<(String, String)> {
        self.calls.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl ChatModel for StubChat {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String, LlmError> {
        self.calls
            .lock()
            .unwrap()
            .push((system.to_string(), prompt.to_string()));

        if let Some(status) = self.fail_status {
            return Err(LlmError::Api {
                status,
                message: "stubbed failure".to_string(),
            });
        }
        if prompt.contains(LLM_FAILURE_MARKER) {
            return Err(LlmError::Api {
                status: 400,
                message: "content filtered".to_string(),
            });
        }

        let text = if system == CLEAN_TEXT_SYSTEM {
            prompt.trim().to_string()
        } else if system == CONTACT_INFO_SYSTEM {
            prompt.lines().next().unwrap_or_default().trim().to_string()
        } else {
            format!("Generated job description\n{prompt}")
        };
        if text.is_empty() {
            Err(LlmError::EmptyContent)
        } else {
            Ok(text)
        }
    }
}

/// Embedder returning the vector of the first needle contained in the text.
pub struct StubEmbedder {
    table: Vec<(&'static str, Vec<f32>)>,
    pub calls: AtomicUsize,
}

impl StubEmbedder {
    pub fn new(table: Vec<(&'static str, Vec<f32>)>) -> Self {
        Self {
            table,
            calls: AtomicUsize::new(0),
        }
    }

    /// Three-dimensional table used by the ranking scenarios.
    pub fn hiring() -> Self {
        Self::new(vec![
            ("Senior Python Developer", vec![1.0, 0.0, 0.0]),
            ("Python backend", vec![0.9, 0.1, 0.0]),
            ("Java enterprise", vec![0.3, 0.9, 0.1]),
            ("Graphic designer", vec![0.0, 0.2, 1.0]),
            ("Short vector", vec![1.0, 0.0]),
        ])
    }
}

#[async_trait]
impl Embedder for StubEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if text.contains("@example.com") {
            return Err(LlmError::InvalidInput(
                "contact info leaked into embedding input".to_string(),
            ));
        }
        self.table
            .iter()
            .find(|(needle, _)| text.contains(needle))
            .map(|(_, v)| v.clone())
            .ok_or_else(|| LlmError::Api {
                status: 400,
                message: format!("no stub vector for {text:?}"),
            })
    }
}

/// Reads `*.pdf` files as UTF-8 text so tests can use readable fixtures.
pub struct PlainTextExtractor;

#[async_trait]
impl TextExtractor for PlainTextExtractor {
    async fn extract_dir(&self, dir: &Path) -> Result<BTreeMap<String, String>, ExtractError> {
        let mut texts = BTreeMap::new();
        for name in list_pdf_files(dir).await? {
            let text = tokio::fs::read_to_string(dir.join(&name)).await?;
            if text.starts_with(CORRUPT_MARKER) || text.trim().is_empty() {
                continue;
            }
            texts.insert(name, text);
        }
        Ok(texts)
    }
}

/// How `InstrumentedIndex::query` misbehaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryFault {
    None,
    Error,
    /// Never completes, like a stalled upstream.
    Hang,
}

/// Memory index that counts lookups, records cleanup calls and can break `query`.
pub struct InstrumentedIndex {
    pub inner: Arc<MemoryVectorIndex>,
    fault: QueryFault,
    pub contains_calls: AtomicUsize,
    pub cleaned_names: Mutex<Vec<String>>,
}

impl InstrumentedIndex {
    pub fn new(inner: Arc<MemoryVectorIndex>, fault: QueryFault) -> Self {
        Self {
            inner,
            fault,
            contains_calls: AtomicUsize::new(0),
            cleaned_names: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl VectorIndex for InstrumentedIndex {
    async fn ensure_exists(&self) -> Result<(), SearchError> {
        self.inner.ensure_exists().await
    }

    async fn upsert(&self, records: Vec<IndexedRecord>) -> Result<UpsertReport, SearchError> {
        self.inner.upsert(records).await
    }

    async fn contains(&self, filters: &[FieldEq]) -> Result<bool, SearchError> {
        self.contains_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.contains(filters).await
    }

    async fn query(&self, query: &VectorQuery) -> Result<Vec<SearchResult>, SearchError> {
        match self.fault {
            QueryFault::None => self.inner.query(query).await,
            QueryFault::Error => Err(SearchError::Api {
                status: 400,
                message: "invalid vector query".to_string(),
            }),
            QueryFault::Hang => futures::future::pending().await,
        }
    }

    async fn delete_partition(
        &self,
        partition: Uuid,
        cv_names: &[String],
    ) -> Result<usize, SearchError> {
        self.cleaned_names
            .lock()
            .unwrap()
            .extend(cv_names.iter().cloned());
        self.inner.delete_partition(partition, cv_names).await
    }

    async fn delete_all(&self) -> Result<(), SearchError> {
        self.inner.delete_all().await
    }

    fn backend(&self) -> &'static str {
        "instrumented"
    }
}

pub fn test_config() -> Config {
    Config::from_lookup(|key| {
        let value = match key {
            "AZURE_OPENAI_API_KEY" => "test-key",
            "AZURE_OPENAI_API_BASE" => "http://127.0.0.1:9",
            "AZURE_OPENAI_DEPLOYMENT_NAME" => "gpt-4o",
            "SEARCH_BACKEND" => "memory",
            "EMBEDDING_DIMENSION" => "3",
            "RANKING_TOP_K" => "10",
            "MAX_CONCURRENT_DOCUMENTS" => "2",
            _ => return None,
        };
        Some(value.to_string())
    })
    .expect("test config is valid")
}

pub fn test_settings() -> RankingSettings {
    RankingSettings::from_config(&test_config())
}

pub fn test_pipeline(chat: Arc<StubChat>, index: Arc<dyn VectorIndex>) -> RankingPipeline {
    RankingPipeline::new(
        Arc::new(PlainTextExtractor),
        TextNormalizer::new(chat),
        Arc::new(StubEmbedder::hiring()),
        index,
        test_settings(),
    )
}

pub fn test_state(chat: Arc<StubChat>, index: Arc<MemoryVectorIndex>) -> AppState {
    let pipeline = test_pipeline(chat.clone(), index.clone());
    AppState {
        chat,
        ranking: pipeline,
        index,
        config: test_config(),
    }
}

/// Writes `(filename, contents)` fixtures into a fresh temp dir.
pub fn cv_dir(files: &[(&str, &str)]) -> tempfile::TempDir {
    let dir = tempfile::tempdir().expect("temp dir");
    for (name, contents) in files {
        std::fs::write(dir.path().join(name), contents).expect("write fixture");
    }
    dir
}

pub const ALICE_CV: &str = "Alice Smith alice@example.com\nPython backend engineer, 6 years of Django and FastAPI";
pub const BOB_CV: &str = "Bob Jones bob@example.com\nJava enterprise developer with Spring experience";
pub const CAROL_CV: &str = "Carol White carol@example.com\nGraphic designer and illustrator";
