//! Job description generation.
//!
//! Flow: split comma lists → build prompt → pick system prompt by style →
//!       one chat completion → return text.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::errors::AppError;
use crate::llm_client::prompts::{JOB_DESCRIPTION_BULLETS_SYSTEM, JOB_DESCRIPTION_NARRATIVE_SYSTEM};
use crate::llm_client::ChatModel;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DescriptionStyle {
    #[default]
    Bullets,
    Narrative,
}

impl DescriptionStyle {
    pub fn system_prompt(self) -> &'static str {
        match self {
            DescriptionStyle::Bullets => JOB_DESCRIPTION_BULLETS_SYSTEM,
            DescriptionStyle::Narrative => JOB_DESCRIPTION_NARRATIVE_SYSTEM,
        }
    }
}

/// Both fields are comma-separated lists.
#[derive(Debug, Clone, Deserialize)]
pub struct GenerateDescriptionRequest {
    pub qualifications: String,
    pub role_definition: String,
    #[serde(default)]
    pub style: DescriptionStyle,
}

#[derive(Debug, Serialize)]
pub struct GenerateDescriptionResponse {
    pub job_description: String,
}

/// Splits on commas, trims, drops empty items.
pub fn split_list(raw: &str) -> Vec<&str> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .collect()
}

pub fn build_prompt(qualifications: &[&str], role_definition: &[&str]) -> String {
    format!(
        "Qualifications: {}\nRole Definition: {}",
        qualifications.join(", "),
        role_definition.join(", ")
    )
}

pub async fn generate_job_description(
    chat: &dyn ChatModel,
    request: &GenerateDescriptionRequest,
) -> Result<String, AppError> {
    let qualifications = split_list(&request.qualifications);
    let role_definition = split_list(&request.role_definition);
    if qualifications.is_empty() && role_definition.is_empty() {
        return Err(AppError::Validation(
            "qualifications and role_definition cannot both be empty".to_string(),
        ));
    }

    info!(
        "Generating {:?} job description ({} qualifications, {} duties)",
        request.style,
        qualifications.len(),
        role_definition.len()
    );

    let prompt = build_prompt(&qualifications, &role_definition);
    chat.complete(request.style.system_prompt(), &prompt)
        .await
        .map_err(|e| AppError::from_llm("Job description generation failed", e))
}
