//! Processing endpoints
//!
//! `/process-batch` is the steady-state endpoint: one request per
//! coordinator batch, results in input order, per-item failures carried in
//! their slot without failing the batch. The single-item endpoints wrap the
//! same pipeline for operators and smoke tests.
//!
//! Inference is CPU-bound and runs on the blocking pool; within a process
//! the model gate serializes it.

use axum::{extract::State, routing::post, Json, Router};
use tipkit_common::api::{
    BatchItemResult, DetectLanguageRequest, DetectLanguageResponse, EmbedRequest, EmbedResponse,
    ItemError, ProcessBatchRequest, ProcessBatchResponse, TranslateRequest, TranslateResponse,
};

use crate::error::{ApiError, ApiResult};
use crate::lang;
use crate::models::ModelError;
use crate::AppState;

/// POST /detect-language
pub async fn detect_language(
    State(state): State<AppState>,
    Json(request): Json<DetectLanguageRequest>,
) -> ApiResult<Json<DetectLanguageResponse>> {
    let runtime = state.runtime.clone();
    let language = run_blocking(move || {
        if request.text.trim().is_empty() {
            return Err(ModelError::EmptyInput);
        }
        runtime.detect_language(&request.text)
    })
    .await?;

    Ok(Json(DetectLanguageResponse {
        language: language.iso2.to_string(),
    }))
}

/// POST /translate
pub async fn translate(
    State(state): State<AppState>,
    Json(request): Json<TranslateRequest>,
) -> ApiResult<Json<TranslateResponse>> {
    let runtime = state.runtime.clone();
    let (translated_text, source) = run_blocking(move || {
        let text = request.text.trim();
        if text.is_empty() {
            return Err(ModelError::EmptyInput);
        }

        let source = match request.source_language.as_deref() {
            Some(code) => lang::by_iso2(code)
                .ok_or_else(|| ModelError::UnsupportedLanguage(code.to_string()))?,
            None => runtime.detect_language(text)?,
        };

        let translated = runtime.translate(text, source)?;
        Ok((translated, source))
    })
    .await?;

    Ok(Json(TranslateResponse {
        translated_text,
        source_language: source.iso2.to_string(),
    }))
}

/// POST /embed
pub async fn embed(
    State(state): State<AppState>,
    Json(request): Json<EmbedRequest>,
) -> ApiResult<Json<EmbedResponse>> {
    let runtime = state.runtime.clone();
    let vector = run_blocking(move || {
        if request.text.trim().is_empty() {
            return Err(ModelError::EmptyInput);
        }
        runtime.embed(&request.text)
    })
    .await?;

    Ok(Json(EmbedResponse { vector }))
}

/// POST /process-batch
///
/// Always 200 once the request parses; each slot is either a result or a
/// per-item error, in input order.
pub async fn process_batch(
    State(state): State<AppState>,
    Json(request): Json<ProcessBatchRequest>,
) -> ApiResult<Json<ProcessBatchResponse>> {
    let runtime = state.runtime.clone();

    let results = tokio::task::spawn_blocking(move || {
        request
            .items
            .iter()
            .map(|item| match runtime.process_item(item) {
                Ok(processed) => BatchItemResult::Ok(processed),
                Err(err) => {
                    tracing::warn!(item_id = item.id, error = %err, "Item processing failed");
                    BatchItemResult::Err(ItemError {
                        id: item.id,
                        error: err.to_string(),
                    })
                }
            })
            .collect::<Vec<_>>()
    })
    .await
    .map_err(|e| ApiError::Internal(format!("processing task failed: {e}")))?;

    Ok(Json(ProcessBatchResponse { results }))
}

async fn run_blocking<T, F>(operation: F) -> ApiResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, ModelError> + Send + 'static,
{
    tokio::task::spawn_blocking(operation)
        .await
        .map_err(|e| ApiError::Internal(format!("processing task failed: {e}")))?
        .map_err(ApiError::from)
}

/// Build processing routes
pub fn process_routes() -> Router<AppState> {
    Router::new()
        .route("/detect-language", post(detect_language))
        .route("/translate", post(translate))
        .route("/embed", post(embed))
        .route("/process-batch", post(process_batch))
}
