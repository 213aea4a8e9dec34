//! Axum route handler for job description generation.

use axum::{extract::State, Json};

use crate::description::generator::{
    generate_job_description, GenerateDescriptionRequest, GenerateDescriptionResponse,
};
use crate::errors::AppError;
use crate::state::AppState;

/// POST /generate_job_description
pub async fn handle_generate_job_description(
    State(state): State<AppState>,
    Json(request): Json<GenerateDescriptionRequest>,
) -> Result<Json<GenerateDescriptionResponse>, AppError> {
    let job_description = generate_job_description(state.chat.as_ref(), &request).await?;
    Ok(Json(GenerateDescriptionResponse { job_description }))
}
