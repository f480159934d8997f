use async_trait::async_trait;
use reqwest::{
    Client,
    multipart::{Form, Part},
};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{Map, Value};
use url::Url;

use super::{Pipeline, ProgressSender, connection_error, endpoint, form_text, read_json};
use crate::{
    error::{ImageGenError, Result},
    http_client::http_client,
    model::Model,
    normalize::{ImageApiUsage, ImageDatum, images_from_data, remap_usage},
    resolver::{ResolvedPayload, resolve},
    types::{GenerationRequest, GenerationSuccess, ImageFile, Operation},
};

const NAME: &str = "image-api";

/// REST image API: JSON generations and multipart edits
pub(crate) struct ImageApiProvider {
    client: Client,
    base_url: Url,
    api_key: Option<SecretString>,
}

impl ImageApiProvider {
    pub fn new(base_url: Url, api_key: Option<SecretString>) -> Self {
        Self {
            client: http_client(),
            base_url,
            api_key,
        }
    }

    fn api_key(&self) -> Result<&SecretString> {
        self.api_key
            .as_ref()
            .ok_or_else(|| ImageGenError::Config("image API key is not configured".to_owned()))
    }

    async fn generate(&self, resolved: ResolvedPayload) -> Result<ImageApiResponse> {
        let api_key = self.api_key()?;
        let url = endpoint(&self.base_url, "v1/images/generations");

        let mut body = Map::new();
        body.insert("model".to_owned(), Value::String(resolved.model_id.clone()));
        body.extend(resolved.fields.into_iter().filter(|(_, value)| !value.is_null()));
        if let Some(prompt) = resolved.prompt {
            body.insert("prompt".to_owned(), Value::String(prompt));
        }

        tracing::debug!(provider = NAME, model = %resolved.model_id, "sending image generation request");

        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| connection_error(NAME, &e))?;

        read_json(NAME, response).await
    }

    async fn edit(&self, resolved: ResolvedPayload, files: Vec<ImageFile>, mask: Option<ImageFile>) -> Result<ImageApiResponse> {
        let api_key = self.api_key()?;
        let url = endpoint(&self.base_url, "v1/images/edits");

        tracing::debug!(
            provider = NAME,
            model = %resolved.model_id,
            images = files.len(),
            mask = mask.is_some(),
            "sending image edit request"
        );

        let mut form = Form::new();
        if let Some(prompt) = resolved.prompt {
            form = form.text("prompt", prompt);
        }
        form = form.text("model", resolved.model_id);

        for file in files {
            form = form.part("image", file_part(file)?);
        }

        if let Some(mask) = mask {
            form = form.part("mask", file_part(mask)?);
        }

        for (key, value) in resolved.fields {
            if let Some(text) = form_text(&value) {
                form = form.text(key, text);
            }
        }

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
}

pub(crate) fn file_part(file: ImageFile) -> Result<Part> {
    Part::bytes(file.bytes.to_vec())
        .file_name(file.filename)
        .mime_str(&file.content_type)
        .map_err(|e| ImageGenError::Validation(format!("Invalid content type: {e}")))
}

pub(crate) struct ImageApiPayload {
    resolved: ResolvedPayload,
    files: Vec<ImageFile>,
    mask: Option<ImageFile>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ImageApiResponse {
    #[serde(default)]
    data: Vec<ImageDatum>,
    usage: Option<ImageApiUsage>,
}

#[async_trait]
impl Pipeline for ImageApiProvider {
    type Payload = ImageApiPayload;
    type Native = ImageApiResponse;

    fn name(&self) -> &'static str {
        NAME
    }

    fn resolve(&self, model: &Model, request: &GenerationRequest) -> Result<ImageApiPayload> {
        let resolved = resolve(model, request)?;
        let files: Vec<ImageFile> = request.files().cloned().collect();

        if resolved.operation == Operation::Edit && files.is_empty() {
            return Err(ImageGenError::Precondition(
                "Upload at least one image file to edit".to_owned(),
            ));
        }

        Ok(ImageApiPayload {
            resolved,
            files,
            mask: request.mask.clone(),
        })
    }

    async fn send(&self, payload: ImageApiPayload, _progress: Option<&ProgressSender>) -> Result<ImageApiResponse> {
        match payload.resolved.operation {
            Operation::Generate => self.generate(payload.resolved).await,
            Operation::Edit => self.edit(payload.resolved, payload.files, payload.mask).await,
        }
    }

    fn normalize(&self, model: &Model, native: ImageApiResponse) -> Result<GenerationSuccess> {
        Ok(GenerationSuccess {
            images: images_from_data(model.id, native.data),
            model: model.id.to_owned(),
            usage: native.usage.map(remap_usage),
            ..GenerationSuccess::default()
        })
    }
}
