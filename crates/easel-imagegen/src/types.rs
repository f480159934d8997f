use std::{fmt, path::Path};

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use bytes::Bytes;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::ErrorCode;

/// An uploaded binary image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageFile {
    pub bytes: Bytes,
    pub filename: String,
    pub content_type: String,
}

impl ImageFile {
    /// Wrap raw bytes, inferring the content type from the file extension
    pub fn new(bytes: impl Into<Bytes>, filename: impl Into<String>) -> Self {
        let filename = filename.into();
        let content_type = content_type_for(&filename).to_owned();

        Self {
            bytes: bytes.into(),
            filename,
            content_type,
        }
    }

    /// Encode as a `data:` URI
    pub fn to_data_uri(&self) -> String {
        format!("data:{};base64,{}", self.content_type, BASE64.encode(&self.bytes))
    }
}

fn content_type_for(filename: &str) -> &'static str {
    let extension = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);

    match extension.as_deref() {
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        _ => "application/octet-stream",
    }
}

/// One uploaded image entry: a binary file, a remote URL, or both
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadedImage {
    pub file: Option<ImageFile>,
    pub url: Option<String>,
}

impl UploadedImage {
    pub fn from_file(file: ImageFile) -> Self {
        Self {
            file: Some(file),
            url: None,
        }
    }

    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            file: None,
            url: Some(url.into()),
        }
    }

    /// Remote URL if it is non-blank
    pub fn remote_url(&self) -> Option<&str> {
        self.url.as_deref().map(str::trim).filter(|u| !u.is_empty())
    }
}

/// Raw user input for one generation call
#[derive(Debug, Clone, Default)]
pub struct GenerationRequest {
    pub prompt: Option<String>,
    /// Parameter values keyed by parameter definition key
    pub params: Map<String, Value>,
    pub images: Vec<UploadedImage>,
    /// Optional edit mask
    pub mask: Option<ImageFile>,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: Some(prompt.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_image(mut self, image: UploadedImage) -> Self {
        self.images.push(image);
        self
    }

    #[must_use]
    pub fn with_mask(mut self, mask: ImageFile) -> Self {
        self.mask = Some(mask);
        self
    }

    /// Prompt text when present and not blank
    pub fn prompt_text(&self) -> Option<&str> {
        self.prompt.as_deref().filter(|p| !p.trim().is_empty())
    }

    /// Uploaded binary files, in upload order
    pub fn files(&self) -> impl Iterator<Item = &ImageFile> {
        self.images.iter().filter_map(|image| image.file.as_ref())
    }
}

/// Generate vs. edit intent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Generate,
    Edit,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Generate => f.write_str("generate"),
            Self::Edit => f.write_str("edit"),
        }
    }
}

/// A produced image
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    /// Remote URL or `data:` URI
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

/// Normalized token usage
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_tokens_details: Option<PromptTokensDetails>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completion_tokens_details: Option<CompletionTokensDetails>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptTokensDetails {
    #[serde(default)]
    pub cached_tokens: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionTokensDetails {
    #[serde(default)]
    pub reasoning_tokens: u64,
    #[serde(default)]
    pub image_tokens: u64,
}

/// Successful generation, whichever provider served it
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GenerationSuccess {
    pub images: Vec<Image>,
    /// Echoed model id
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    /// Text reply from chat-style providers
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timings: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_nsfw_concepts: Option<Vec<bool>>,
}

/// Failed generation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenerationFailure {
    /// Human-readable message
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_nsfw_concepts: Option<Vec<bool>>,
}

/// Unified result of a generation call
///
/// Serializes with a boolean `success` discriminant alongside the
/// variant's fields.
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationResult {
    Success(GenerationSuccess),
    Failure(GenerationFailure),
}

impl GenerationResult {
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub const fn success(&self) -> Option<&GenerationSuccess> {
        match self {
            Self::Success(success) => Some(success),
            Self::Failure(_) => None,
        }
    }

    pub const fn failure(&self) -> Option<&GenerationFailure> {
        match self {
            Self::Success(_) => None,
            Self::Failure(failure) => Some(failure),
        }
    }
}

impl Serialize for GenerationResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct Tagged<'a, T> {
            success: bool,
            #[serde(flatten)]
            body: &'a T,
        }

        match self {
            Self::Success(body) => Tagged { success: true, body }.serialize(serializer),
            Self::Failure(body) => Tagged { success: false, body }.serialize(serializer),
        }
    }
}
