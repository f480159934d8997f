//! Queue-based managed subscription provider
//!
//! A call submits the job, polls its status until the queue reports
//! completion, then fetches the result envelope. Progress is pushed through
//! an optional channel: zero or more updates, always before the terminal
//! result.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::{sync::mpsc, time::Instant};
use url::Url;

use super::{Pipeline, connection_error, endpoint, read_json};
use crate::{
    credentials::{Credential, CredentialPool, Rotation},
    error::{ImageGenError, Result, is_balance_exhausted},
    http_client::http_client,
    model::Model,
    resolver::resolve,
    types::{GenerationRequest, GenerationSuccess, Image, Operation},
};

const NAME: &str = "subscription";

/// Channel half that receives queue progress updates
pub type ProgressSender = mpsc::UnboundedSender<QueueUpdate>;

/// One queue progress notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueUpdate {
    pub request_id: String,
    pub status: QueueStatus,
    /// Provider log lines reported with this status, if any
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub logs: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueueStatus {
    InQueue { position: Option<u64> },
    InProgress,
    Completed,
}

pub(crate) struct SubscriptionProvider {
    client: Client,
    base_url: Url,
    credentials: Arc<CredentialPool>,
    poll_interval: Duration,
    timeout: Duration,
}

#[derive(Debug)]
pub(crate) struct SubscriptionPayload {
    model_id: String,
    body: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    request_id: String,
    status_url: String,
    response_url: String,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    status: String,
    queue_position: Option<u64>,
    #[serde(default)]
    logs: Option<Vec<LogLine>>,
}

#[derive(Debug, Deserialize)]
struct LogLine {
    message: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct QueueResult {
    #[serde(default)]
    images: Vec<QueueImage>,
    seed: Option<i64>,
    timings: Option<Map<String, Value>>,
    has_nsfw_concepts: Option<Vec<bool>>,
}

#[derive(Debug, Deserialize)]
struct QueueImage {
    url: String,
    width: Option<u32>,
    height: Option<u32>,
    content_type: Option<String>,
}

/// Terminal value of a submit-and-wait call
#[derive(Debug)]
pub(crate) struct QueueOutcome {
    request_id: String,
    result: QueueResult,
}

impl SubscriptionProvider {
    pub fn new(base_url: Url, credentials: Arc<CredentialPool>, poll_interval: Duration, timeout: Duration) -> Self {
        Self {
            client: http_client(),
            base_url,
            credentials,
            poll_interval,
            timeout,
        }
    }

    fn credential(&self) -> Result<Credential> {
        if self.credentials.is_empty() {
            return Err(ImageGenError::Config(
                "no subscription credentials are configured".to_owned(),
            ));
        }

        self.credentials
            .active()
            .ok_or(ImageGenError::BalanceExhausted { rotated: false })
    }

    async fn submit_and_wait(
        &self,
        payload: SubscriptionPayload,
        authorization: &str,
        progress: Option<&ProgressSender>,
    ) -> Result<QueueOutcome> {
        let url = endpoint(&self.base_url, &payload.model_id);

        tracing::debug!(provider = NAME, model = %payload.model_id, "submitting queue request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", authorization)
            .json(&payload.body)
            .send()
            .await
            .map_err(|e| connection_error(NAME, &e))?;

        let submitted: SubmitResponse = read_json(NAME, response).await?;
        let request_id = submitted.request_id;

        tracing::info!(provider = NAME, request_id = %request_id, "queue request accepted");

        let started = Instant::now();

        loop {
            let response = self
                .client
                .get(&submitted.status_url)
                .header("Authorization", authorization)
                .send()
                .await
                .map_err(|e| connection_error(NAME, &e))?;

            let status: StatusResponse = read_json(NAME, response).await?;
            let logs = status
                .logs
                .unwrap_or_default()
                .into_iter()
                .map(|line| line.message)
                .collect();

            let state = match status.status.as_str() {
                "IN_QUEUE" => QueueStatus::InQueue {
                    position: status.queue_position,
                },
                "IN_PROGRESS" => QueueStatus::InProgress,
                "COMPLETED" => QueueStatus::Completed,
                other => {
                    tracing::error!(provider = NAME, request_id = %request_id, status = other, "unexpected queue status");
                    return Err(ImageGenError::ProviderDomain(format!("Queue request {request_id} ended with status {other}")));
                }
            };

            report(
                progress,
                QueueUpdate {
                    request_id: request_id.clone(),
                    status: state,
                    logs,
                },
            );

            if state == QueueStatus::Completed {
                break;
            }

            if started.elapsed() >= self.timeout {
                tracing::error!(provider = NAME, request_id = %request_id, "queue polling timed out");
                return Err(ImageGenError::Connection(format!(
                    "Queue request {request_id} did not complete within {:?}",
                    self.timeout
                )));
            }

            tokio::time::sleep(self.poll_interval).await;
        }

        let response = self
            .client
            .get(&submitted.response_url)
            .header("Authorization", authorization)
            .send()
            .await
            .map_err(|e| connection_error(NAME, &e))?;

        let result = read_json(NAME, response).await?;

        Ok(QueueOutcome { request_id, result })
    }
}

fn report(progress: Option<&ProgressSender>, update: QueueUpdate) {
    if let Some(sender) = progress
        && sender.send(update).is_err()
    {
        tracing::debug!(provider = NAME, "progress receiver dropped");
    }
}

#[async_trait]
impl Pipeline for SubscriptionProvider {
    type Payload = SubscriptionPayload;
    type Native = QueueOutcome;

    fn name(&self) -> &'static str {
        NAME
    }

    fn resolve(&self, model: &Model, request: &GenerationRequest) -> Result<SubscriptionPayload> {
        let resolved = resolve(model, request)?;
        let mut body = resolved.fields;

        if let Some(prompt) = resolved.prompt {
            body.insert("prompt".to_owned(), Value::String(prompt));
        }

        if resolved.operation == Operation::Edit {
            let source = request
                .images
                .iter()
                .find_map(|image| match &image.file {
                    Some(file) => Some(file.to_data_uri()),
                    None => image.remote_url().map(str::to_owned),
                })
                .ok_or_else(|| ImageGenError::Precondition("Upload an image to edit first".to_owned()))?;

            body.insert("image_url".to_owned(), Value::String(source));
        }

        Ok(SubscriptionPayload {
            model_id: resolved.model_id,
            body,
        })
    }

    async fn send(&self, payload: SubscriptionPayload, progress: Option<&ProgressSender>) -> Result<QueueOutcome> {
        let credential = self.credential()?;
        let authorization = format!("Key {}", credential.key.expose_secret());

        match self.submit_and_wait(payload, &authorization, progress).await {
            Err(e) if is_balance_exhausted(&e.to_string()) => {
                let rotation = self.credentials.mark_exhausted(&credential);
                Err(ImageGenError::BalanceExhausted {
                    rotated: rotation == Rotation::Rotated,
                })
            }
            other => other,
        }
    }

    fn normalize(&self, model: &Model, native: QueueOutcome) -> Result<GenerationSuccess> {
        let QueueOutcome { request_id, result } = native;

        if result.images.is_empty() {
            tracing::warn!(provider = NAME, request_id = %request_id, "queue completed without images");
            return Err(ImageGenError::ContentFiltered {
                message: "No images were returned, the content was flagged as unsafe".to_owned(),
                flags: result.has_nsfw_concepts.unwrap_or_default(),
            });
        }

        let images = result
            .images
            .into_iter()
            .map(|image| Image {
                url: image.url,
                width: image.width,
                height: image.height,
                content_type: image.content_type,
            })
            .collect();

        Ok(GenerationSuccess {
            images,
            model: model.id.to_owned(),
            seed: result.seed,
            request_id: Some(request_id),
            timings: result.timings,
            has_nsfw_concepts: result.has_nsfw_concepts,
            ..GenerationSuccess::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use secrecy::SecretString;
    use serde_json::json;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{body_partial_json, header, method, path},
    };

    use super::*;
    use crate::{
        registry::{FLUX_DEV, FLUX_PRO_KONTEXT},
        types::UploadedImage,
    };

    fn pool(keys: &[&str]) -> Arc<CredentialPool> {
        Arc::new(CredentialPool::new(
            keys.iter().map(|k| SecretString::from((*k).to_owned())).collect(),
        ))
    }

    fn provider(server: &MockServer, credentials: Arc<CredentialPool>) -> SubscriptionProvider {
        SubscriptionProvider::new(
            Url::parse(&server.uri()).unwrap(),
            credentials,
            Duration::from_millis(10),
            Duration::from_secs(5),
        )
    }

    async fn mount_queue(server: &MockServer, model_path: &str, result: Value) {
        let base = server.uri();

        Mock::given(method("POST"))
            .and(path(model_path))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "request_id": "req-1",
                "status_url": format!("{base}/requests/req-1/status"),
                "response_url": format!("{base}/requests/req-1"),
            })))
            .expect(1)
            .mount(server)
            .await;

        Mock::given(method("GET"))
            .and(path("/requests/req-1/status"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "IN_QUEUE", "queue_position": 2
            })))
            .up_to_n_times(1)
            .mount(server)
            .await;

        Mock::given(method("GET"))
            .and(path("/requests/req-1/status"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "IN_PROGRESS", "logs": [{"message": "step 1"}]
            })))
            .up_to_n_times(1)
            .mount(server)
            .await;

        Mock::given(method("GET"))
            .and(path("/requests/req-1/status"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "COMPLETED"})))
            .mount(server)
            .await;

        Mock::given(method("GET"))
            .and(path("/requests/req-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(result))
            .mount(server)
            .await;
    }

    async fn run(
        provider: &SubscriptionProvider,
        model: &Model,
        request: &GenerationRequest,
        progress: Option<&ProgressSender>,
    ) -> Result<GenerationSuccess> {
        let payload = provider.resolve(model, request)?;
        let native = provider.send(payload, progress).await?;
        provider.normalize(model, native)
    }

    #[tokio::test]
    async fn reports_progress_then_returns_result() {
        let server = MockServer::start().await;
        mount_queue(
            &server,
            "/fal-ai/flux/dev",
            json!({
                "images": [{"url": "https://fal.media/a.jpg", "width": 1024, "height": 768, "content_type": "image/jpeg"}],
                "seed": 1234,
                "timings": {"inference": 1.5},
                "has_nsfw_concepts": [false],
                "prompt": "a cat"
            }),
        )
        .await;

        let provider = provider(&server, pool(&["fal-key"]));
        let (tx, mut rx) = mpsc::unbounded_channel();

        let success = run(&provider, &FLUX_DEV, &GenerationRequest::new("a cat"), Some(&tx))
            .await
            .unwrap();
        drop(tx);

        assert_eq!(success.images[0].url, "https://fal.media/a.jpg");
        assert_eq!(success.images[0].width, Some(1024));
        assert_eq!(success.seed, Some(1234));
        assert_eq!(success.request_id.as_deref(), Some("req-1"));
        assert_eq!(success.timings.unwrap()["inference"], json!(1.5));
        assert_eq!(success.has_nsfw_concepts, Some(vec![false]));

        let mut updates = Vec::new();
        while let Some(update) = rx.recv().await {
            updates.push(update);
        }

        let states: Vec<QueueStatus> = updates.iter().map(|u| u.status).collect();
        assert_eq!(
            states,
            vec![
                QueueStatus::InQueue { position: Some(2) },
                QueueStatus::InProgress,
                QueueStatus::Completed
            ]
        );
        assert_eq!(updates[1].logs, vec!["step 1".to_owned()]);

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests[0].headers.get("authorization").unwrap(), "Key fal-key");
    }

    #[tokio::test]
    async fn empty_images_are_content_filtered() {
        let server = MockServer::start().await;
        mount_queue(&server, "/fal-ai/flux/dev", json!({"images": [], "has_nsfw_concepts": [true]})).await;

        let provider = provider(&server, pool(&["fal-key"]));
        let err = run(&provider, &FLUX_DEV, &GenerationRequest::new("a cat"), None)
            .await
            .unwrap_err();

        match err {
            ImageGenError::ContentFiltered { flags, .. } => assert_eq!(flags, vec![true]),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn edit_sends_upload_as_image_url() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/fal-ai/flux-pro/kontext"))
            .and(header("authorization", "Key fal-key"))
            .and(body_partial_json(json!({
                "prompt": "add a hat",
                "image_url": "https://x/cat.png"
            })))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .expect(1)
            .mount(&server)
            .await;

        let provider = provider(&server, pool(&["fal-key"]));
        let request = GenerationRequest::new("add a hat").with_image(UploadedImage::from_url("https://x/cat.png"));

        let err = run(&provider, &FLUX_PRO_KONTEXT, &request, None).await.unwrap_err();
        assert!(matches!(err, ImageGenError::ProviderApi { status: 500, .. }));
    }

    #[test]
    fn requires_image_model_without_upload_fails_early() {
        let provider = SubscriptionProvider::new(
            Url::parse("http://127.0.0.1:9").unwrap(),
            pool(&["k"]),
            Duration::from_millis(10),
            Duration::from_secs(1),
        );

        let err = provider.resolve(&FLUX_PRO_KONTEXT, &GenerationRequest::new("add a hat")).unwrap_err();
        assert!(matches!(err, ImageGenError::Precondition(_)));
    }

    #[tokio::test]
    async fn balance_exhaustion_rotates_credential() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/fal-ai/flux/dev"))
            .respond_with(
                ResponseTemplate::new(403).set_body_json(json!({"detail": "User is locked. Reason: Exhausted balance."})),
            )
            .mount(&server)
            .await;

        let credentials = pool(&["first", "second"]);
        let provider = provider(&server, credentials.clone());

        let err = run(&provider, &FLUX_DEV, &GenerationRequest::new("a cat"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ImageGenError::BalanceExhausted { rotated: true }));
        assert_eq!(credentials.active().unwrap().key.expose_secret(), "second");

        let err = run(&provider, &FLUX_DEV, &GenerationRequest::new("a cat"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ImageGenError::BalanceExhausted { rotated: false }));

        // Pool is drained, so no further request is sent
        let err = run(&provider, &FLUX_DEV, &GenerationRequest::new("a cat"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ImageGenError::BalanceExhausted { rotated: false }));
        assert_eq!(server.received_requests().await.unwrap().len(), 2);

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests[1].headers.get("authorization").unwrap(), "Key second");
    }

    #[tokio::test]
    async fn empty_pool_is_a_config_error() {
        let server = MockServer::start().await;
        let provider = provider(&server, pool(&[]));

        let err = run(&provider, &FLUX_DEV, &GenerationRequest::new("a cat"), None)
            .await
            .unwrap_err();

        assert!(matches!(err, ImageGenError::Config(_)));
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn polling_times_out() {
        let server = MockServer::start().await;
        let base = server.uri();

        Mock::given(method("POST"))
            .and(path("/fal-ai/flux/dev"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "request_id": "slow",
                "status_url": format!("{base}/requests/slow/status"),
                "response_url": format!("{base}/requests/slow"),
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/requests/slow/status"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "IN_PROGRESS"})))
            .mount(&server)
            .await;

        let provider = SubscriptionProvider::new(
            Url::parse(&server.uri()).unwrap(),
            pool(&["k"]),
            Duration::from_millis(10),
            Duration::from_millis(50),
        );

        let err = run(&provider, &FLUX_DEV, &GenerationRequest::new("a cat"), None)
            .await
            .unwrap_err();

        assert!(matches!(err, ImageGenError::Connection(ref m) if m.contains("slow")));
    }
}
