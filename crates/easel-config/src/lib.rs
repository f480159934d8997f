#![allow(clippy::must_use_candidate)]

pub mod chat;
mod env;
pub mod history;
pub mod image_api;
mod loader;
pub mod secrets;
pub mod subscription;
pub mod telemetry;

use serde::Deserialize;

pub use chat::*;
pub use env::{expand_env, expand_with};
pub use history::*;
pub use image_api::*;
pub use secrets::*;
pub use subscription::*;
pub use telemetry::*;

/// Top-level easel configuration
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// REST image API (generation and edit)
    #[serde(default)]
    pub image_api: ImageApiConfig,
    /// Upscaler endpoint, falls back to `image_api` settings
    #[serde(default)]
    pub upscale: UpscaleConfig,
    /// Chat-style multimodal provider
    #[serde(default)]
    pub chat: ChatConfig,
    /// Managed queue subscription provider
    #[serde(default)]
    pub subscription: SubscriptionConfig,
    /// Generation history store
    #[serde(default)]
    pub history: Option<HistoryConfig>,
    /// Logging configuration
    #[serde(default)]
    pub telemetry: Option<TelemetryConfig>,
}
