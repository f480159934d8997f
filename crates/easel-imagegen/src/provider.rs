pub(crate) mod chat;
pub(crate) mod image_api;
pub(crate) mod subscription;
pub(crate) mod upscale;

use async_trait::async_trait;
use reqwest::Response;
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::Value;

use crate::{
    error::{ImageGenError, Result},
    model::Model,
    types::{GenerationRequest, GenerationSuccess},
};

pub use subscription::{ProgressSender, QueueStatus, QueueUpdate};

/// One provider family's resolve → send → normalize pipeline
///
/// `resolve` and `normalize` are pure; `send` performs the provider's single
/// logical network operation and never retries.
#[async_trait]
pub(crate) trait Pipeline: Send + Sync {
    /// Wire-ready request produced by `resolve`
    type Payload: Send;
    /// Provider-native response returned by `send`
    type Native: Send;

    /// Provider name used in logs
    fn name(&self) -> &'static str;

    /// Shape the request, failing before any network call on bad input
    fn resolve(&self, model: &Model, request: &GenerationRequest) -> Result<Self::Payload>;

    async fn send(&self, payload: Self::Payload, progress: Option<&ProgressSender>) -> Result<Self::Native>;

    fn normalize(&self, model: &Model, native: Self::Native) -> Result<GenerationSuccess>;
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ErrorBody {
    Detailed { message: String },
    Plain(String),
}

impl ErrorBody {
    fn into_message(self) -> String {
        match self {
            Self::Detailed { message } | Self::Plain(message) => message,
        }
    }
}

/// Read a provider response body into `T`
///
/// Non-success statuses become `ProviderApi`, a 2xx body carrying an
/// `{"error": ...}` envelope becomes `ProviderDomain`, and a body that
/// matches neither becomes `UnrecognizedResponse`.
pub(crate) async fn read_json<T: DeserializeOwned>(provider: &str, response: Response) -> Result<T> {
    let status = response.status();

    if !status.is_success() {
        let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_owned());

        tracing::error!(provider, status = %status, "provider API error");

        return Err(ImageGenError::ProviderApi {
            status: status.as_u16(),
            message: error_text,
        });
    }

    let body = response.bytes().await.map_err(|e| {
        tracing::error!(provider, error = %e, "failed to read provider response");
        ImageGenError::Connection(format!("Failed to read response from {provider}: {e}"))
    })?;

    if let Ok(envelope) = serde_json::from_slice::<ErrorEnvelope>(&body) {
        let message = envelope.error.into_message();
        tracing::error!(provider, error = %message, "provider returned an error envelope");
        return Err(ImageGenError::ProviderDomain(message));
    }

    serde_json::from_slice(&body).map_err(|e| {
        tracing::error!(provider, error = %e, "failed to parse provider response");
        ImageGenError::UnrecognizedResponse(format!("{provider}: {e}"))
    })
}

/// Map a transport failure to a connection error
pub(crate) fn connection_error(provider: &str, error: &reqwest::Error) -> ImageGenError {
    tracing::error!(provider, error = %error, "provider request failed");
    ImageGenError::Connection(format!("Failed to send request to {provider}: {error}"))
}

/// Join a path onto a base URL, tolerating a trailing slash on the base
pub(crate) fn endpoint(base: &url::Url, path: &str) -> String {
    format!("{}/{}", base.as_str().trim_end_matches('/'), path.trim_start_matches('/'))
}

/// Render a scalar JSON value as a form field
///
/// Strings pass through unquoted; numbers and booleans use their JSON text;
/// arrays and objects are sent as JSON.
pub(crate) fn form_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
