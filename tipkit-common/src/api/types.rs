//! Shared worker API request/response types
//!
//! JSON over HTTP/1.1. The coordinator only calls `/process-batch` in steady
//! state; the single-item endpoints exist for operators and smoke tests.

use crate::EMBEDDING_DIM;
use serde::{Deserialize, Serialize};

// ========================================
// Health
// ========================================

/// Response body for `GET|POST /health`.
///
/// Cheap by contract: answering must not touch the models.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Service status, `"ok"` when serving
    pub status: String,
    /// Module name (`"tipkit-pw"`)
    pub module: String,
    /// Crate version from Cargo.toml
    pub version: String,
}

// ========================================
// Single-item endpoints
// ========================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectLanguageRequest {
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectLanguageResponse {
    /// Two-letter ISO 639-1 code, e.g. `"en"`, `"fr"`
    pub language: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslateRequest {
    pub text: String,
    /// Two-letter source language; detected when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_language: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslateResponse {
    pub translated_text: String,
    pub source_language: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedRequest {
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedResponse {
    /// Unit-normalized embedding, length [`EMBEDDING_DIM`]
    pub vector: Vec<f32>,
}

// ========================================
// Batch endpoint
// ========================================

/// One tip in a `POST /process-batch` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchItem {
    /// Caller-assigned identifier, echoed back in the matching result slot
    pub id: i64,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_language: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessBatchRequest {
    pub items: Vec<BatchItem>,
}

/// Successfully processed batch item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedItem {
    pub id: i64,
    pub detected_language: String,
    pub translated_text: String,
    pub vector: Vec<f32>,
}

/// Per-item failure. The batch as a whole still returns 200; this slot
/// carries the reason instead of a result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemError {
    pub id: i64,
    pub error: String,
}

/// One slot of a batch response, in the same position as its input item.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BatchItemResult {
    Ok(ProcessedItem),
    Err(ItemError),
}

impl BatchItemResult {
    pub fn id(&self) -> i64 {
        match self {
            BatchItemResult::Ok(item) => item.id,
            BatchItemResult::Err(err) => err.id,
        }
    }

    pub fn as_ok(&self) -> Option<&ProcessedItem> {
        match self {
            BatchItemResult::Ok(item) => Some(item),
            BatchItemResult::Err(_) => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessBatchResponse {
    /// One result per input item, input order preserved
    pub results: Vec<BatchItemResult>,
}

/// Body of every non-200 worker response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Check a worker-produced vector against the process-wide dimensionality.
pub fn vector_dim_ok(vector: &[f32]) -> bool {
    vector.len() == EMBEDDING_DIM
}
