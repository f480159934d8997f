#![allow(
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_const_for_fn,
    clippy::module_name_repetitions
)]

mod credentials;
mod dispatcher;
mod error;
mod http_client;
mod model;
mod normalize;
mod provider;
mod registry;
mod resolver;
mod types;

pub use credentials::{Credential, CredentialPool, Rotation};
pub use dispatcher::{ImageGenerator, ImageGeneratorBuilder};
pub use error::{ErrorCode, ImageGenError, Result, classify_message, is_balance_exhausted};
pub use model::{Bounds, Literal, Model, ModelMeta, ParamType, ParameterDefinition, ProviderKind};
pub use provider::{ProgressSender, QueueStatus, QueueUpdate};
pub use registry::{
    Category, FLUX_DEV, FLUX_KONTEXT_PRO, FLUX_PRO_KONTEXT, GEMINI_FLASH_IMAGE, GEMINI_FLASH_IMAGE_CHAT, GPT_IMAGE_1,
    IMAGE_UPSCALE, MODELS, ModelRegistry, SEEDREAM_4,
};
pub use resolver::{ResolvedPayload, normalize_seed, operation_for, resolve};
pub use types::{
    CompletionTokensDetails, GenerationFailure, GenerationRequest, GenerationResult, GenerationSuccess, Image,
    ImageFile, Operation, PromptTokensDetails, UploadedImage, Usage,
};

/// Build the image generator from configuration
///
/// # Errors
///
/// Returns an error if the subscription durations in the config are invalid
pub fn build_generator(config: &easel_config::Config) -> anyhow::Result<ImageGenerator> {
    ImageGeneratorBuilder::new(config)
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to initialize image generator: {e}"))
}
