use easel_imagegen::GenerationSuccess;
use serde::{Deserialize, Serialize};

/// A stored generation record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub id: String,
    pub user_id: String,
    pub model_id: String,
    #[serde(default)]
    pub prompt: Option<String>,
    /// Input image for edits and upscales
    #[serde(default)]
    pub original_image_url: Option<String>,
    pub result_image_url: String,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(default)]
    pub seed: Option<i64>,
    pub created_at: String,
}

/// A record to insert; id, owner and timestamp are assigned by the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewHistoryRecord {
    pub model_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_image_url: Option<String>,
    pub result_image_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
}

impl NewHistoryRecord {
    /// One record per produced image
    ///
    /// Inline `data:` images are skipped; only addressable results are
    /// persisted.
    pub fn from_images(
        success: &GenerationSuccess,
        prompt: Option<&str>,
        original_image_url: Option<&str>,
    ) -> Vec<Self> {
        success
            .images
            .iter()
            .filter(|image| !image.url.starts_with("data:"))
            .map(|image| Self {
                model_id: success.model.clone(),
                prompt: prompt.map(str::to_owned),
                original_image_url: original_image_url.map(str::to_owned),
                result_image_url: image.url.clone(),
                width: image.width,
                height: image.height,
                request_id: success.request_id.clone(),
                seed: success.seed,
            })
            .collect()
    }
}
