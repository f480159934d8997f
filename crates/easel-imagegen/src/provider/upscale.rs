use async_trait::async_trait;
use reqwest::{Client, multipart::Form};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::Value;
use url::Url;

use super::{Pipeline, ProgressSender, connection_error, endpoint, image_api::file_part, read_json};
use crate::{
    error::{ImageGenError, Result},
    http_client::http_client,
    model::Model,
    resolver::resolve,
    types::{GenerationRequest, GenerationSuccess, Image, ImageFile},
};

const NAME: &str = "upscale";

/// Single-image upscaler (synchronous mode)
pub(crate) struct UpscaleProvider {
    client: Client,
    base_url: Url,
    api_key: Option<SecretString>,
}

/// Image the upscaler works on
#[derive(Debug)]
pub(crate) enum UpscaleSource {
    File(ImageFile),
    Url(String),
}

#[derive(Debug)]
pub(crate) struct UpscalePayload {
    source: UpscaleSource,
    kind: Option<String>,
    scale_factor: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct UpscaleResponse {
    #[serde(default)]
    data: UpscaleData,
}

#[derive(Debug, Default, Deserialize)]
struct UpscaleData {
    image: Option<String>,
    image_width: Option<u32>,
    image_height: Option<u32>,
    task_id: Option<String>,
}

impl UpscaleProvider {
    pub fn new(base_url: Url, api_key: Option<SecretString>) -> Self {
        Self {
            client: http_client(),
            base_url,
            api_key,
        }
    }
}

/// Upscale type, omitted when blank or `auto`
fn upscale_kind(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|kind| !kind.is_empty() && *kind != "auto")
        .map(str::to_owned)
}

/// Scale factor as form text, omitted when `auto`, non-numeric or non-finite
fn scale_factor(value: Option<&Value>) -> Option<String> {
    let number = match value? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("auto") {
                return None;
            }
            trimmed.parse::<f64>().ok()?
        }
        _ => return None,
    };

    if !number.is_finite() {
        return None;
    }

    Some(if number.fract().abs() < f64::EPSILON {
        format!("{number:.0}")
    } else {
        number.to_string()
    })
}

#[async_trait]
impl Pipeline for UpscaleProvider {
    type Payload = UpscalePayload;
    type Native = UpscaleResponse;

    fn name(&self) -> &'static str {
        NAME
    }

    fn resolve(&self, model: &Model, request: &GenerationRequest) -> Result<UpscalePayload> {
        if request.images.is_empty() {
            return Err(ImageGenError::Precondition("Upload an image to upscale first".to_owned()));
        }

        let resolved = resolve(model, request)?;

        let source = request
            .files()
            .next()
            .cloned()
            .map(UpscaleSource::File)
            .or_else(|| {
                request
                    .images
                    .iter()
                    .find_map(|image| image.remote_url())
                    .map(|url| UpscaleSource::Url(url.to_owned()))
            })
            .ok_or_else(|| ImageGenError::Precondition("No usable image file or URL found".to_owned()))?;

        Ok(UpscalePayload {
            source,
            kind: upscale_kind(resolved.fields.get("type")),
            scale_factor: scale_factor(resolved.fields.get("scale_factor")),
        })
    }

    async fn send(&self, payload: UpscalePayload, _progress: Option<&ProgressSender>) -> Result<UpscaleResponse> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| ImageGenError::Config("upscale API key is not configured".to_owned()))?;

        let url = endpoint(&self.base_url, "task/pic/scale");

        let mut form = match payload.source {
            UpscaleSource::File(file) => Form::new().part("image_file", file_part(file)?),
            UpscaleSource::Url(image_url) => Form::new().text("image_url", image_url),
        };
        form = form.text("sync", "1");

        if let Some(kind) = payload.kind {
            form = form.text("type", kind);
        }

        if let Some(scale_factor) = payload.scale_factor {
            form = form.text("scale_factor", scale_factor);
        }

        tracing::debug!(provider = NAME, "sending upscale request");

        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key.expose_secret())
            .multipart(form)
            .send()
            .await
            .map_err(|e| connection_error(NAME, &e))?;

        read_json(NAME, response).await
    }

    fn normalize(&self, model: &Model, native: UpscaleResponse) -> Result<GenerationSuccess> {
        let data = native.data;

        if let Some(url) = data.image.filter(|image| !image.is_empty()) {
            return Ok(GenerationSuccess {
                images: vec![Image {
                    url,
                    width: data.image_width,
                    height: data.image_height,
                    content_type: None,
                }],
                model: model.id.to_owned(),
                ..GenerationSuccess::default()
            });
        }

        if let Some(task_id) = data.task_id.filter(|id| !id.is_empty()) {
            tracing::info!(provider = NAME, task_id = %task_id, "upscale queued asynchronously");
            return Err(ImageGenError::TaskAccepted { task_id });
        }

        Err(ImageGenError::UnrecognizedResponse(
            "upscale response carried neither an image nor a task id".to_owned(),
        ))
    }
}
