//! PDF text extraction for uploaded CVs.
//!
//! Parsing is CPU-bound and runs inside `tokio::task::spawn_blocking`.
//! A file that fails to parse is logged and skipped, never fatal to the batch.

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("PDF parse error: {0}")]
    Parse(String),

    #[error("PDF contains no extractable text")]
    Empty,

    #[error("PDF parser task failed: {0}")]
    Join(String),
}

#[async_trait]
pub trait TextExtractor: Send + Sync {
    /// Extracts text from every PDF in `dir`, keyed by filename.
    /// Unparseable files are skipped; only an unreadable directory is an error.
    async fn extract_dir(&self, dir: &Path) -> Result<BTreeMap<String, String>, ExtractError>;
}

/// `pdf-extract` backed extractor.
#[derive(Debug, Clone, Default)]
pub struct PdfTextExtractor;

impl PdfTextExtractor {
    pub async fn extract_bytes(&self, bytes: Vec<u8>) -> Result<String, ExtractError> {
        let text = tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes))
            .await
            .map_err(|e| ExtractError::Join(e.to_string()))?
            .map_err(|e| ExtractError::Parse(e.to_string()))?;

        if text.trim().is_empty() {
            return Err(ExtractError::Empty);
        }
        Ok(text)
    }
}

#[async_trait]
impl TextExtractor for PdfTextExtractor {
    async fn extract_dir(&self, dir: &Path) -> Result<BTreeMap<String, String>, ExtractError> {
        let mut texts = BTreeMap::new();

        for name in list_pdf_files(dir).await? {
            let bytes = match tokio::fs::read(dir.join(&name)).await {
                Ok(b) => b,
                Err(e) => {
                    warn!("Skipping {name}: could not read file: {e}");
                    continue;
                }
            };
            match self.extract_bytes(bytes).await {
                Ok(text) => {
                    debug!("Extracted {} chars from {name}", text.len());
                    texts.insert(name, text);
                }
                Err(e) => warn!("Skipping {name}: {e}"),
            }
        }

        Ok(texts)
    }
}

/// Lists `*.pdf` filenames (case-insensitive extension) in `dir`, sorted.
pub async fn list_pdf_files(dir: &Path) -> Result<Vec<String>, ExtractError> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut names = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        if is_pdf_name(&name) {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}

pub fn is_pdf_name(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false)
}
