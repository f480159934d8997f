use secrecy::SecretString;
use serde::Deserialize;
use url::Url;

/// Default REST image API host
pub const DEFAULT_IMAGE_API_URL: &str = "https://api.gpt.ge";

/// REST image API configuration (generations and edits)
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImageApiConfig {
    /// Base URL, without the `/v1` suffix
    #[serde(default = "default_image_api_url")]
    pub base_url: Url,
    /// Bearer credential
    #[serde(default)]
    pub api_key: Option<SecretString>,
}

impl Default for ImageApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_image_api_url(),
            api_key: None,
        }
    }
}

/// Upscaler configuration
///
/// Both fields fall back to the image API settings, since the upscaler is
/// usually served by the same host.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpscaleConfig {
    /// Base URL override
    #[serde(default)]
    pub base_url: Option<Url>,
    /// Bearer credential override
    #[serde(default)]
    pub api_key: Option<SecretString>,
}

impl UpscaleConfig {
    /// Effective base URL
    pub fn base_url_or(&self, image_api: &ImageApiConfig) -> Url {
        self.base_url.clone().unwrap_or_else(|| image_api.base_url.clone())
    }

    /// Effective credential
    pub fn api_key_or(&self, image_api: &ImageApiConfig) -> Option<SecretString> {
        self.api_key.clone().or_else(|| image_api.api_key.clone())
    }
}

fn default_image_api_url() -> Url {
    Url::parse(DEFAULT_IMAGE_API_URL).expect("valid default URL")
}
