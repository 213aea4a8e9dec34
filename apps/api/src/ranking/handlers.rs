//! Axum route handler for CV ranking.

use std::collections::HashSet;

use axum::extract::{Multipart, State};
use axum::Json;
use bytes::Bytes;
use serde::Serialize;
use tracing::{info, warn};

use crate::errors::AppError;
use crate::extraction::is_pdf_name;
use crate::ranking::pipeline::{RankedCv, SkippedCv, NO_RESULTS_MESSAGE};
use crate::state::AppState;

const UPLOAD_DIR_PREFIX: &str = "cv_uploads_";

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum FindBestCvResponse {
    Ranked {
        cv_list: Vec<RankedCv>,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        skipped: Vec<SkippedCv>,
    },
    Empty {
        message: String,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        skipped: Vec<SkippedCv>,
    },
}

/// Form fields gathered from the multipart body. Files are already on disk.
struct UploadForm {
    job_description: Option<String>,
    top_k: Option<usize>,
    stored: usize,
    skipped: Vec<SkippedCv>,
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /find-best-cv
///
/// Multipart form: `job_description` (text), optional `top_k`, and one or more
/// PDF file parts. Uploads live in a temp dir removed when the request ends.
pub async fn handle_find_best_cv(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<FindBestCvResponse>, AppError> {
    let upload_dir = tempfile::Builder::new()
        .prefix(UPLOAD_DIR_PREFIX)
        .tempdir()
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to create upload dir: {e}")))?;

    let form = read_upload_form(multipart, upload_dir.path()).await?;
    let job_description = form
        .job_description
        .filter(|jd| !jd.trim().is_empty())
        .ok_or_else(|| AppError::Validation("job_description is required".to_string()))?;
    info!("Received {} CV uploads", form.stored);

    let outcome = state
        .ranking
        .rank(&job_description, upload_dir.path(), form.top_k)
        .await?;

    let mut skipped = form.skipped;
    skipped.extend(outcome.skipped);
    info!(
        "Request {}: {} ranked, {} skipped",
        outcome.request_id,
        outcome.results.len(),
        skipped.len()
    );

    let response = if outcome.results.is_empty() {
        FindBestCvResponse::Empty {
            message: NO_RESULTS_MESSAGE.to_string(),
            skipped,
        }
    } else {
        FindBestCvResponse::Ranked {
            cv_list: outcome.results,
            skipped,
        }
    };
    Ok(Json(response))
}

async fn read_upload_form(
    mut multipart: Multipart,
    dir: &std::path::Path,
) -> Result<UploadForm, AppError> {
    let mut form = UploadForm {
        job_description: None,
        top_k: None,
        stored: 0,
        skipped: Vec::new(),
    };
    let mut seen = HashSet::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Upload(format!("Malformed multipart body: {e}")))?
    {
        let field_name = field.name().unwrap_or_default().to_string();

        if let Some(file_name) = field.file_name().map(str::to_string) {
            let Some(name) = sanitize_file_name(&file_name) else {
                warn!("Rejecting upload with unusable file name {file_name:?}");
                form.skipped.push(SkippedCv::new(file_name, "invalid file name"));
                continue;
            };
            if !is_pdf_name(&name) {
                form.skipped.push(SkippedCv::new(name, "not a PDF file"));
                continue;
            }
            if !seen.insert(name.clone()) {
                form.skipped.push(SkippedCv::new(name, "duplicate file name"));
                continue;
            }

            let bytes: Bytes = field
                .bytes()
                .await
                .map_err(|e| AppError::Upload(format!("Failed to read {name}: {e}")))?;
            tokio::fs::write(dir.join(&name), &bytes)
                .await
                .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to store {name}: {e}")))?;
            form.stored += 1;
            continue;
        }

        let value = field
            .text()
            .await
            .map_err(|e| AppError::Upload(format!("Failed to read field {field_name}: {e}")))?;
        match field_name.as_str() {
            "job_description" => form.job_description = Some(value),
            "top_k" => {
                let top_k = value.trim().parse::<usize>().map_err(|_| {
                    AppError::Validation(format!("top_k must be a positive integer, got {value:?}"))
                })?;
                form.top_k = Some(top_k);
            }
            other => warn!("Ignoring unexpected form field {other:?}"),
        }
    }

    Ok(form)
}

/// Keeps only the final path component of a client-supplied file name.
fn sanitize_file_name(raw: &str) -> Option<String> {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or_default().trim();
    if base.is_empty() || base == "." || base == ".." {
        None
    } else {
        Some(base.to_string())
    }
}
