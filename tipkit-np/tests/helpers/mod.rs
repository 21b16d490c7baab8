//! Test fixtures for coordinator runs
//!
//! A scripted in-process worker served over a real socket (the coordinator
//! talks HTTP, so the tests do too), plus a deterministic embedding derived
//! from the translated text: identical translations always land on the same
//! unit vector, so clustering behaves like the real pipeline.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tipkit_common::api::{
    BatchItemResult, ErrorResponse, ItemError, ProcessBatchRequest, ProcessBatchResponse,
    ProcessedItem,
};
use tipkit_common::EMBEDDING_DIM;
use tipkit_np::wol::WakeProtocol;
use tipkit_np::worker_client::WorkerClient;

/// Marker that makes the mock worker emit a per-item error.
pub const ITEM_POISON: &str = "ITEM_POISON";

/// Deterministic unit vector derived from a text (FNV-1a seed, xorshift
/// fill). Identical text, identical vector.
pub fn hash_vector(text: &str) -> Vec<f32> {
    let mut seed: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in text.bytes() {
        seed ^= u64::from(byte);
        seed = seed.wrapping_mul(0x0000_0100_0000_01b3);
    }

    let mut state = seed.max(1);
    let mut vector = Vec::with_capacity(EMBEDDING_DIM);
    for _ in 0..EMBEDDING_DIM {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        vector.push((state % 2000) as f32 / 1000.0 - 1.0);
    }

    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    for value in &mut vector {
        *value /= norm;
    }
    vector
}

/// Scripted worker behavior.
#[derive(Default)]
pub struct MockWorker {
    /// Exact-text translation table; unmapped text echoes through
    pub translations: HashMap<String, String>,
    /// HTTP statuses to answer with before starting to succeed
    pub failures: Mutex<VecDeque<u16>>,
    /// `/process-batch` calls observed
    pub calls: AtomicU32,
}

impl MockWorker {
    pub fn echo() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn translating(entries: &[(&str, &str)]) -> Arc<Self> {
        Arc::new(Self {
            translations: entries
                .iter()
                .map(|(from, to)| (from.to_string(), to.to_string()))
                .collect(),
            ..Self::default()
        })
    }

    /// Answer with the given statuses first, then behave like `echo`.
    pub fn failing_then_ok(statuses: &[u16]) -> Arc<Self> {
        Arc::new(Self {
            failures: Mutex::new(statuses.iter().copied().collect()),
            ..Self::default()
        })
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

async fn mock_process_batch(
    State(worker): State<Arc<MockWorker>>,
    Json(request): Json<ProcessBatchRequest>,
) -> Response {
    worker.calls.fetch_add(1, Ordering::SeqCst);

    if let Some(status) = worker.failures.lock().unwrap().pop_front() {
        let status = StatusCode::from_u16(status).unwrap();
        return (
            status,
            Json(ErrorResponse {
                error: format!("scripted {status}"),
            }),
        )
            .into_response();
    }

    let results: Vec<BatchItemResult> = request
        .items
        .iter()
        .map(|item| {
            if item.text.contains(ITEM_POISON) {
                return BatchItemResult::Err(ItemError {
                    id: item.id,
                    error: "scripted item failure".to_string(),
                });
            }

            let translated = worker
                .translations
                .get(&item.text)
                .cloned()
                .unwrap_or_else(|| item.text.clone());
            BatchItemResult::Ok(ProcessedItem {
                id: item.id,
                detected_language: item
                    .source_language
                    .clone()
                    .unwrap_or_else(|| "en".to_string()),
                vector: hash_vector(&translated),
                translated_text: translated,
            })
        })
        .collect();

    Json(ProcessBatchResponse { results }).into_response()
}

async fn mock_health() -> StatusCode {
    StatusCode::OK
}

/// Serve the mock worker on an ephemeral loopback port; returns its base URL.
pub async fn spawn_worker(worker: Arc<MockWorker>) -> String {
    let app = Router::new()
        .route("/process-batch", post(mock_process_batch))
        .route("/health", post(mock_health))
        .with_state(worker);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{addr}")
}

/// A loopback address with nothing listening on it.
pub async fn dead_worker_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

/// Worker client tuned for tests: short timeout, caller-chosen attempts.
pub fn test_client(base_url: &str, max_attempts: u32) -> WorkerClient {
    WorkerClient::new(base_url, Duration::from_secs(5), max_attempts).unwrap()
}

/// Wake protocol with waking disabled and a tight poll budget.
pub fn no_wake() -> WakeProtocol {
    WakeProtocol::new(None, Duration::from_millis(50), Duration::from_millis(200))
}
