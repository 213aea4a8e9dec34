//! Text normalization via the chat model: artifact cleanup and contact-info isolation.

use std::sync::Arc;

use crate::llm_client::prompts::{CLEAN_TEXT_SYSTEM, CONTACT_INFO_SYSTEM};
use crate::llm_client::{ChatModel, LlmError};

#[derive(Clone)]
pub struct TextNormalizer {
    chat: Arc<dyn ChatModel>,
}

impl TextNormalizer {
    pub fn new(chat: Arc<dyn ChatModel>) -> Self {
        Self { chat }
    }

    /// Strips PDF extraction artifacts from raw text.
    pub async fn clean_text(&self, raw_text: &str) -> Result<String, LlmError> {
        self.chat.complete(CLEAN_TEXT_SYSTEM, raw_text).await
    }

    /// Returns the contact block (name, phone, email, address) as free text.
    /// An empty string means the model found none.
    pub async fn extract_contact_info(&self, text: &str) -> Result<String, LlmError> {
        match self.chat.complete(CONTACT_INFO_SYSTEM, text).await {
            Ok(contact) => Ok(contact),
            Err(LlmError::EmptyContent) => Ok(String::new()),
            Err(e) => Err(e),
        }
    }
}

/// Removes the contact block from `text` so it does not skew the embedding.
pub fn strip_contact_info(text: &str, contact_info: &str) -> String {
    let contact = contact_info.trim();
    if contact.is_empty() {
        return text.to_string();
    }
    text.replace(contact, "").trim().to_string()
}
