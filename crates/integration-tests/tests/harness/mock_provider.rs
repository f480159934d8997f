//! Mock image provider backend for integration tests
//!
//! Serves the REST image API, the upscaler and the managed queue from one
//! listener, returning canned responses.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::IntoResponse;
use axum::{Json, Router, routing};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

/// Queue model route served by the mock
pub const QUEUE_MODEL_PATH: &str = "/fal-ai/flux/dev";

/// Mock provider that records what it receives
pub struct MockProvider {
    addr: SocketAddr,
    shutdown: CancellationToken,
    state: Arc<MockState>,
}

struct MockState {
    base_url: String,
    generation_count: AtomicU32,
    edit_count: AtomicU32,
    upscale_count: AtomicU32,
    submit_count: AtomicU32,
    status_count: AtomicU32,
    /// Body returned by the upscaler
    upscale_response: Value,
    /// Queue credential answered with a balance error
    exhausted_key: Option<String>,
    authorizations: Mutex<Vec<String>>,
}

impl MockProvider {
    /// Start the mock server, returning immediately
    pub async fn start() -> anyhow::Result<Self> {
        Self::start_inner(default_upscale_response(), None).await
    }

    /// Start a mock whose upscaler answers with `response`
    pub async fn start_with_upscale(response: Value) -> anyhow::Result<Self> {
        Self::start_inner(response, None).await
    }

    /// Start a mock that rejects queue submissions made with `key`
    pub async fn start_with_exhausted_key(key: &str) -> anyhow::Result<Self> {
        Self::start_inner(default_upscale_response(), Some(key.to_owned())).await
    }

    async fn start_inner(upscale_response: Value, exhausted_key: Option<String>) -> anyhow::Result<Self> {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let state = Arc::new(MockState {
            base_url: format!("http://{addr}"),
            generation_count: AtomicU32::new(0),
            edit_count: AtomicU32::new(0),
            upscale_count: AtomicU32::new(0),
            submit_count: AtomicU32::new(0),
            status_count: AtomicU32::new(0),
            upscale_response,
            exhausted_key,
            authorizations: Mutex::new(Vec::new()),
        });

        let app = Router::new()
            .route("/v1/images/generations", routing::post(handle_generations))
            .route("/v1/images/edits", routing::post(handle_edits))
            .route("/task/pic/scale", routing::post(handle_upscale))
            .route(QUEUE_MODEL_PATH, routing::post(handle_submit))
            .route("/requests/{id}/status", routing::get(handle_status))
            .route("/requests/{id}", routing::get(handle_result))
            .with_state(Arc::clone(&state));

        let shutdown = CancellationToken::new();
        let shutdown_clone = shutdown.clone();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    shutdown_clone.cancelled().await;
                })
                .await
                .ok();
        });

        Ok(Self { addr, shutdown, state })
    }

    /// Base URL for configuring the mock as any provider
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn generation_count(&self) -> u32 {
        self.state.generation_count.load(Ordering::Relaxed)
    }

    pub fn edit_count(&self) -> u32 {
        self.state.edit_count.load(Ordering::Relaxed)
    }

    pub fn upscale_count(&self) -> u32 {
        self.state.upscale_count.load(Ordering::Relaxed)
    }

    pub fn submit_count(&self) -> u32 {
        self.state.submit_count.load(Ordering::Relaxed)
    }

    /// Total requests across every endpoint
    pub fn total_count(&self) -> u32 {
        self.generation_count() + self.edit_count() + self.upscale_count() + self.submit_count()
    }

    /// `Authorization` headers seen by the queue submit endpoint, in order
    pub fn queue_authorizations(&self) -> Vec<String> {
        self.state
            .authorizations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl Drop for MockProvider {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

fn default_upscale_response() -> Value {
    json!({
        "data": {
            "image": "https://cdn.mock/upscaled.png",
            "image_width": 2048,
            "image_height": 2048
        }
    })
}

#[derive(Debug, Deserialize)]
struct GenerationBody {
    model: String,
    #[serde(default)]
    prompt: Option<String>,
}

async fn handle_generations(State(state): State<Arc<MockState>>, Json(body): Json<GenerationBody>) -> impl IntoResponse {
    state.generation_count.fetch_add(1, Ordering::Relaxed);

    if body.prompt.as_deref().is_none_or(str::is_empty) {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": {"message": "prompt is required"}})),
        );
    }

    (
        StatusCode::OK,
        Json(json!({
            "created": 1_700_000_000,
            "model": body.model,
            "data": [{"b64_json": "AAAA"}],
            "usage": {
                "input_tokens": 10,
                "output_tokens": 5,
                "total_tokens": 15,
                "input_tokens_details": {"image_tokens": 0, "text_tokens": 10}
            }
        })),
    )
}

async fn handle_edits(State(state): State<Arc<MockState>>, headers: HeaderMap, body: Bytes) -> impl IntoResponse {
    state.edit_count.fetch_add(1, Ordering::Relaxed);

    let is_multipart = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("multipart/form-data"));

    if !is_multipart || body.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": {"message": "expected multipart form"}})),
        );
    }

    (
        StatusCode::OK,
        Json(json!({"data": [{"url": "https://cdn.mock/edited.png"}]})),
    )
}

async fn handle_upscale(State(state): State<Arc<MockState>>, _body: Bytes) -> impl IntoResponse {
    state.upscale_count.fetch_add(1, Ordering::Relaxed);
    Json(state.upscale_response.clone())
}

async fn handle_submit(State(state): State<Arc<MockState>>, headers: HeaderMap) -> impl IntoResponse {
    state.submit_count.fetch_add(1, Ordering::Relaxed);

    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_owned();

    state
        .authorizations
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .push(authorization.clone());

    if let Some(key) = &state.exhausted_key
        && authorization == format!("Key {key}")
    {
        return (
            StatusCode::FORBIDDEN,
            Json(json!({"detail": "User is locked. Reason: Exhausted balance. Top up your balance."})),
        );
    }

    let base = &state.base_url;
    (
        StatusCode::OK,
        Json(json!({
            "request_id": "req-1",
            "status_url": format!("{base}/requests/req-1/status"),
            "response_url": format!("{base}/requests/req-1"),
        })),
    )
}

async fn handle_status(State(state): State<Arc<MockState>>, Path(_id): Path<String>) -> impl IntoResponse {
    let body = match state.status_count.fetch_add(1, Ordering::Relaxed) {
        0 => json!({"status": "IN_QUEUE", "queue_position": 1}),
        1 => json!({"status": "IN_PROGRESS", "logs": [{"message": "denoising"}]}),
        _ => json!({"status": "COMPLETED"}),
    };

    Json(body)
}

async fn handle_result(Path(_id): Path<String>) -> impl IntoResponse {
    Json(json!({
        "images": [{"url": "https://cdn.mock/queued.jpg", "width": 1024, "height": 768, "content_type": "image/jpeg"}],
        "seed": 42,
        "timings": {"inference": 0.8},
        "has_nsfw_concepts": [false],
        "prompt": "a lighthouse"
    }))
}
