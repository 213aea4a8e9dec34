//! Azure AI Search backend over the REST API.
//!
//! Index schema: `id` (key), `cv_name`, `cv_vector` (HNSW profile),
//! `contact_info`, `partition` (filterable request tag).

use std::collections::BTreeSet;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, Method, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::retry::{is_retryable_status, is_retryable_transport, RetryPolicy};
use crate::search::{
    record_id, split_by_dimension, FieldEq, IndexedRecord, RejectedRecord, SearchError,
    SearchResult, UpsertReport, VectorIndex, VectorQuery,
};

const API_VERSION: &str = "2023-11-01";
const VECTOR_FIELD: &str = "cv_vector";
const VECTOR_PROFILE: &str = "default_vector_search_profile";
const HNSW_CONFIG: &str = "default_hnsw_algorithm_config";
/// Page size when listing a partition's document keys for deletion.
const PAGE_SIZE: usize = 1000;

#[derive(Clone)]
pub struct AzureSearchIndex {
    client: Client,
    endpoint: String,
    index_name: String,
    dimension: usize,
    retry: RetryPolicy,
}

impl AzureSearchIndex {
    pub fn new(
        endpoint: &str,
        api_key: &str,
        index_name: &str,
        dimension: usize,
        retry: RetryPolicy,
    ) -> anyhow::Result<Self> {
        anyhow::ensure!(
            endpoint.starts_with("http://") || endpoint.starts_with("https://"),
            "search endpoint must be an http(s) URL"
        );
        anyhow::ensure!(!index_name.trim().is_empty(), "missing search index name");
        let mut headers = HeaderMap::new();
        headers.insert(
            "api-key",
            HeaderValue::from_str(api_key.trim()).context("invalid search API key")?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .default_headers(headers)
            .build()
            .context("failed to build search HTTP client")?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            index_name: index_name.to_string(),
            dimension,
            retry,
        })
    }

    fn index_url(&self) -> String {
        format!(
            "{}/indexes/{}?api-version={API_VERSION}",
            self.endpoint, self.index_name
        )
    }

    fn docs_url(&self, operation: &str) -> String {
        format!(
            "{}/indexes/{}/docs/{operation}?api-version={API_VERSION}",
            self.endpoint, self.index_name
        )
    }

    /// Sends a request, retrying transient failures. Returns the final status and
    /// body for every non-retryable outcome so callers can interpret 404 etc.
    async fn send(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
    ) -> Result<(StatusCode, String), SearchError> {
        let mut last_error: Option<SearchError> = None;

        for attempt in 0..self.retry.max_attempts {
            if attempt > 0 {
                warn!(
                    "Search call attempt {} failed, retrying after {}ms...",
                    attempt,
                    self.retry.delay_for(attempt).as_millis()
                );
            }
            self.retry.backoff(attempt).await;

            let mut request = self.client.request(method.clone(), url);
            if let Some(body) = body {
                request = request.json(body);
            }

            let response = match request.send().await {
                Ok(r) => r,
                Err(e) if is_retryable_transport(&e) => {
                    last_error = Some(SearchError::Http(e));
                    continue;
                }
                Err(e) => return Err(SearchError::Http(e)),
            };

            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            if is_retryable_status(status) {
                warn!("Search API returned {}: {}", status, text);
                last_error = Some(SearchError::Api {
                    status: status.as_u16(),
                    message: text,
                });
                continue;
            }
            return Ok((status, text));
        }

        Err(SearchError::RetriesExhausted {
            attempts: self.retry.max_attempts,
            message: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no response".to_string()),
        })
    }

    /// Like `send`, but maps 404 to `IndexMissing` and other failures to `Api`.
    async fn send_ok(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
    ) -> Result<(StatusCode, String), SearchError> {
        let (status, text) = self.send(method, url, body).await?;
        if status == StatusCode::NOT_FOUND {
            return Err(SearchError::IndexMissing(self.index_name.clone()));
        }
        if !status.is_success() {
            return Err(api_error(status, text));
        }
        Ok((status, text))
    }

    async fn exists(&self) -> Result<bool, SearchError> {
        let (status, text) = self.send(Method::GET, &self.index_url(), None).await?;
        match status {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            other => Err(api_error(other, text)),
        }
    }

    async fn create(&self) -> Result<(), SearchError> {
        let definition = index_definition(&self.index_name, self.dimension);
        let (status, text) = self
            .send(Method::PUT, &self.index_url(), Some(&definition))
            .await?;
        if !status.is_success() {
            return Err(api_error(status, text));
        }
        info!("Search index '{}' created", self.index_name);
        Ok(())
    }

    async fn search(&self, body: &Value) -> Result<SearchResponse, SearchError> {
        let (_, text) = self
            .send_ok(Method::POST, &self.docs_url("search"), Some(body))
            .await?;
        Ok(serde_json::from_str(&text)?)
    }

    async fn index_batch(&self, actions: Vec<Value>) -> Result<IndexBatchResponse, SearchError> {
        let body = json!({ "value": actions });
        let (_, text) = self
            .send_ok(Method::POST, &self.docs_url("index"), Some(&body))
            .await?;
        Ok(serde_json::from_str(&text)?)
    }

    async fn partition_keys(&self, partition: Uuid) -> Result<Vec<String>, SearchError> {
        let filter = odata_filter(&[FieldEq::partition(partition)]);
        let mut keys = Vec::new();
        let mut skip = 0;
        loop {
            let page = self
                .search(&json!({
                    "search": "*",
                    "filter": filter,
                    "select": "id",
                    "top": PAGE_SIZE,
                    "skip": skip,
                }))
                .await?;
            let fetched = page.value.len();
            skip += fetched;
            keys.extend(page.value.into_iter().filter_map(|hit| hit.id));
            if fetched < PAGE_SIZE {
                return Ok(keys);
            }
        }
    }
}

#[async_trait]
impl VectorIndex for AzureSearchIndex {
    async fn ensure_exists(&self) -> Result<(), SearchError> {
        if self.exists().await? {
            debug!("Index '{}' already exists", self.index_name);
            return Ok(());
        }
        self.create().await
    }

    async fn upsert(&self, records: Vec<IndexedRecord>) -> Result<UpsertReport, SearchError> {
        let (valid, mut rejected) = split_by_dimension(records, self.dimension);
        if valid.is_empty() {
            return Ok(UpsertReport {
                indexed: Vec::new(),
                rejected,
            });
        }

        let names: Vec<(String, String)> = valid
            .iter()
            .map(|r| (r.id.to_string(), r.cv_name.clone()))
            .collect();
        let actions = valid.iter().map(upload_action).collect();
        let response = self.index_batch(actions).await?;

        let mut indexed = Vec::new();
        for (key, cv_name) in names {
            match response.value.iter().find(|r| r.key == key) {
                Some(result) if !result.status => rejected.push(RejectedRecord {
                    cv_name,
                    reason: result
                        .error_message
                        .clone()
                        .unwrap_or_else(|| "rejected by search service".to_string()),
                }),
                _ => indexed.push(cv_name),
            }
        }
        info!(
            "{} documents indexed, {} rejected",
            indexed.len(),
            rejected.len()
        );
        Ok(UpsertReport { indexed, rejected })
    }

    async fn contains(&self, filters: &[FieldEq]) -> Result<bool, SearchError> {
        let response = self
            .search(&json!({
                "search": "*",
                "filter": odata_filter(filters),
                "count": true,
                "top": 0,
            }))
            .await?;
        Ok(response.count.unwrap_or(0) > 0)
    }

    async fn query(&self, query: &VectorQuery) -> Result<Vec<SearchResult>, SearchError> {
        if query.vector.len() != self.dimension {
            return Err(SearchError::Dimension {
                expected: self.dimension,
                actual: query.vector.len(),
            });
        }
        let response = self.search(&vector_query_body(query)).await?;
        let mut hits: Vec<SearchResult> = response
            .value
            .into_iter()
            .map(|hit| SearchResult {
                cv_name: hit.cv_name.unwrap_or_default(),
                contact_info: hit.contact_info.unwrap_or_default(),
                score: hit.score,
            })
            .collect();
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(query.k);
        Ok(hits)
    }

    async fn delete_partition(
        &self,
        partition: Uuid,
        cv_names: &[String],
    ) -> Result<usize, SearchError> {
        // Fresh uploads may not be searchable yet, so known keys are deleted
        // directly and the filtered listing only catches stragglers.
        let mut keys: BTreeSet<String> = cv_names
            .iter()
            .map(|name| record_id(partition, name).to_string())
            .collect();
        match self.partition_keys(partition).await {
            Ok(listed) => keys.extend(listed),
            Err(SearchError::IndexMissing(_)) => return Ok(0),
            Err(e) if keys.is_empty() => return Err(e),
            Err(e) => warn!("Listing partition {partition} failed, deleting known keys only: {e}"),
        }
        if keys.is_empty() {
            return Ok(0);
        }
        let keys: Vec<String> = keys.into_iter().collect();
        let mut deleted = 0;
        for chunk in keys.chunks(PAGE_SIZE) {
            let actions = chunk
                .iter()
                .map(|key| json!({ "@search.action": "delete", "id": key }))
                .collect();
            let response = match self.index_batch(actions).await {
                Ok(response) => response,
                Err(SearchError::IndexMissing(_)) => return Ok(deleted),
                Err(e) => return Err(e),
            };
            deleted += response.value.iter().filter(|r| r.status).count();
        }
        info!("Deleted {deleted} documents from partition {partition}");
        Ok(deleted)
    }

    async fn delete_all(&self) -> Result<(), SearchError> {
        let (status, text) = self.send(Method::DELETE, &self.index_url(), None).await?;
        if !status.is_success() && status != StatusCode::NOT_FOUND {
            return Err(api_error(status, text));
        }
        info!("Search index '{}' deleted", self.index_name);
        self.create().await
    }

    fn backend(&self) -> &'static str {
        "azure"
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(rename = "@odata.count")]
    count: Option<u64>,
    #[serde(default)]
    value: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    #[serde(rename = "@search.score", default)]
    score: f64,
    id: Option<String>,
    cv_name: Option<String>,
    contact_info: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IndexBatchResponse {
    #[serde(default)]
    value: Vec<IndexingResult>,
}

#[derive(Debug, Deserialize)]
struct IndexingResult {
    key: String,
    status: bool,
    #[serde(rename = "errorMessage")]
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AzureError {
    error: AzureErrorBody,
}

#[derive(Debug, Deserialize)]
struct AzureErrorBody {
    message: String,
}

fn api_error(status: StatusCode, body: String) -> SearchError {
    let message = serde_json::from_str::<AzureError>(&body)
        .map(|e| e.error.message)
        .unwrap_or(body);
    SearchError::Api {
        status: status.as_u16(),
        message,
    }
}

/// Index definition for `PUT /indexes/{name}`.
fn index_definition(name: &str, dimension: usize) -> Value {
    json!({
        "name": name,
        "fields": [
            { "name": "id", "type": "Edm.String", "key": true, "filterable": true, "sortable": true },
            { "name": "cv_name", "type": "Edm.String", "searchable": true, "filterable": true, "sortable": true },
            {
                "name": VECTOR_FIELD,
                "type": "Collection(Edm.Single)",
                "searchable": true,
                "dimensions": dimension,
                "vectorSearchProfile": VECTOR_PROFILE
            },
            { "name": "contact_info", "type": "Edm.String", "searchable": true },
            { "name": "partition", "type": "Edm.String", "filterable": true }
        ],
        "vectorSearch": {
            "algorithms": [ { "name": HNSW_CONFIG, "kind": "hnsw" } ],
            "profiles": [ { "name": VECTOR_PROFILE, "algorithm": HNSW_CONFIG } ]
        }
    })
}

fn upload_action(record: &IndexedRecord) -> Value {
    json!({
        "@search.action": "mergeOrUpload",
        "id": record.id.to_string(),
        "cv_name": record.cv_name,
        "cv_vector": record.vector,
        "contact_info": record.contact_info,
        "partition": record.partition.to_string(),
    })
}

fn vector_query_body(query: &VectorQuery) -> Value {
    let mut body = json!({
        "vectorQueries": [{
            "kind": "vector",
            "vector": query.vector,
            "k": query.k,
            "fields": VECTOR_FIELD,
            "exhaustive": query.exhaustive,
        }],
        "select": "cv_name,contact_info",
        "top": query.k,
    });
    if let Some(partition) = query.partition {
        body["filter"] = Value::String(odata_filter(&[FieldEq::partition(partition)]));
    }
    body
}

/// Conjunction of `field eq 'value'` terms.
fn odata_filter(filters: &[FieldEq]) -> String {
    filters
        .iter()
        .map(|f| format!("{} eq '{}'", f.field.as_str(), escape_odata_literal(&f.value)))
        .collect::<Vec<_>>()
        .join(" and ")
}

/// OData string literals escape a single quote by doubling it.
fn escape_odata_literal(value: &str) -> String {
    value.replace('\'', "''")
}
