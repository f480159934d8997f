use async_trait::async_trait;
use easel_config::ChatConfig;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use super::{Pipeline, ProgressSender, connection_error, endpoint, read_json};
use crate::{
    error::{ImageGenError, Result},
    http_client::http_client,
    model::Model,
    resolver::resolve,
    types::{GenerationRequest, GenerationSuccess, Image, Usage},
};

const NAME: &str = "chat";

/// Chat-completions endpoint that returns generated images inline
pub(crate) struct ChatProvider {
    client: Client,
    base_url: Url,
    api_key: Option<SecretString>,
    site_url: String,
    site_name: String,
    max_tokens: u32,
    temperature: f64,
}

impl ChatProvider {
    pub fn new(config: &ChatConfig) -> Self {
        Self {
            client: http_client(),
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
            site_url: config.site_url.clone(),
            site_name: config.site_name.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: Value,
    temperature: Value,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: Vec<ContentPart>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize, Deserialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ReplyMessage,
}

#[derive(Debug, Deserialize)]
struct ReplyMessage {
    content: Option<String>,
    #[serde(default)]
    images: Vec<ReplyImage>,
}

#[derive(Debug, Deserialize)]
struct ReplyImage {
    image_url: ImageUrl,
}

#[async_trait]
impl Pipeline for ChatProvider {
    type Payload = ChatRequest;
    type Native = ChatResponse;

    fn name(&self) -> &'static str {
        NAME
    }

    fn resolve(&self, model: &Model, request: &GenerationRequest) -> Result<ChatRequest> {
        let resolved = resolve(model, request)?;

        let mut content = Vec::new();
        if let Some(prompt) = resolved.prompt {
            content.push(ContentPart::Text { text: prompt });
        }

        let uploads = request.images.iter().filter_map(|image| match &image.file {
            Some(file) => Some(file.to_data_uri()),
            None => image.remote_url().map(str::to_owned),
        });
        let linked = resolved
            .fields
            .get("image_url")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .map(str::to_owned);

        for url in uploads.chain(linked) {
            content.push(ContentPart::ImageUrl {
                image_url: ImageUrl { url },
            });
        }

        let max_tokens = resolved
            .fields
            .get("max_tokens")
            .filter(|value| value.is_number())
            .cloned()
            .unwrap_or_else(|| Value::from(self.max_tokens));
        let temperature = resolved
            .fields
            .get("temperature")
            .filter(|value| value.is_number())
            .cloned()
            .unwrap_or_else(|| Value::from(self.temperature));

        Ok(ChatRequest {
            model: resolved.model_id,
            messages: vec![ChatMessage { role: "user", content }],
            max_tokens,
            temperature,
        })
    }

    async fn send(&self, payload: ChatRequest, _progress: Option<&ProgressSender>) -> Result<ChatResponse> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| ImageGenError::Config("chat API key is not configured".to_owned()))?;

        let url = endpoint(&self.base_url, "chat/completions");

        tracing::debug!(
            provider = NAME,
            model = %payload.model,
            parts = payload.messages.iter().map(|m| m.content.len()).sum::<usize>(),
            "sending chat completion request"
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key.expose_secret())
            .header("HTTP-Referer", &self.site_url)
            .header("X-Title", &self.site_name)
            .json(&payload)
            .send()
            .await
            .map_err(|e| connection_error(NAME, &e))?;

        read_json(NAME, response).await
    }

    fn normalize(&self, model: &Model, native: ChatResponse) -> Result<GenerationSuccess> {
        let Some(choice) = native.choices.into_iter().next() else {
            return Err(ImageGenError::UnrecognizedResponse("chat response has no choices".to_owned()));
        };

        let images = choice
            .message
            .images
            .into_iter()
            .map(|image| Image {
                url: image.image_url.url,
                width: None,
                height: None,
                content_type: None,
            })
            .collect();

        Ok(GenerationSuccess {
            images,
            model: model.id.to_owned(),
            usage: native.usage,
            content: choice.message.content,
            ..GenerationSuccess::default()
        })
    }
}
