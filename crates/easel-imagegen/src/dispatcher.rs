use std::{panic::AssertUnwindSafe, sync::Arc};

use easel_config::Config;
use futures::FutureExt;

use crate::{
    credentials::CredentialPool,
    error::{ImageGenError, Result},
    model::{Model, ProviderKind},
    provider::{
        Pipeline, ProgressSender, chat::ChatProvider, image_api::ImageApiProvider,
        subscription::SubscriptionProvider, upscale::UpscaleProvider,
    },
    registry::ModelRegistry,
    types::{GenerationRequest, GenerationResult, GenerationSuccess},
};

/// Entry point that routes a request to the model's provider pipeline
///
/// Every call resolves to a [`GenerationResult`]; no error raised inside a
/// pipeline escapes to the caller. Panics are folded into an internal failure
/// only where they unwind; the release profile aborts on panic instead.
pub struct ImageGenerator {
    registry: ModelRegistry,
    image_api: ImageApiProvider,
    upscale: UpscaleProvider,
    chat: ChatProvider,
    subscription: SubscriptionProvider,
}

impl ImageGenerator {
    pub const fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    /// Generate (or edit) images with the given model
    pub async fn generate_image(&self, model: &Model, request: &GenerationRequest) -> GenerationResult {
        self.generate_image_with_progress(model, request, None).await
    }

    /// Like [`generate_image`](Self::generate_image), reporting queue
    /// progress for subscription models through `progress`
    pub async fn generate_image_with_progress(
        &self,
        model: &Model,
        request: &GenerationRequest,
        progress: Option<ProgressSender>,
    ) -> GenerationResult {
        tracing::info!(model = %model.id, provider = %model.provider, "starting image generation");

        let outcome = AssertUnwindSafe(self.dispatch(model, request, progress.as_ref()))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_owned())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "image generation panicked".to_owned());

                Err(ImageGenError::Internal(message))
            });

        match outcome {
            Ok(success) => {
                tracing::info!(model = %model.id, images = success.images.len(), "image generation complete");
                GenerationResult::Success(success)
            }
            Err(error) => {
                tracing::error!(model = %model.id, error = %error, "image generation failed");
                GenerationResult::Failure(error.into_failure())
            }
        }
    }

    /// Look a model up by id or route id, then generate
    pub async fn generate_by_id(
        &self,
        id: &str,
        request: &GenerationRequest,
        progress: Option<ProgressSender>,
    ) -> GenerationResult {
        let model = match self.registry.lookup(id) {
            Ok(model) => model,
            Err(error) => {
                tracing::warn!(model = id, "unknown model requested");
                return GenerationResult::Failure(error.into_failure());
            }
        };

        self.generate_image_with_progress(model, request, progress).await
    }

    async fn dispatch(
        &self,
        model: &Model,
        request: &GenerationRequest,
        progress: Option<&ProgressSender>,
    ) -> Result<GenerationSuccess> {
        match model.provider {
            ProviderKind::RestImageApi => run(&self.image_api, model, request, progress).await,
            ProviderKind::UpscaleApi => run(&self.upscale, model, request, progress).await,
            ProviderKind::ChatMultimodal => run(&self.chat, model, request, progress).await,
            ProviderKind::ManagedSubscription => run(&self.subscription, model, request, progress).await,
            ProviderKind::CustomEndpoint => Err(ImageGenError::UnsupportedProvider(model.provider.to_string())),
        }
    }
}

async fn run<P: Pipeline>(
    provider: &P,
    model: &Model,
    request: &GenerationRequest,
    progress: Option<&ProgressSender>,
) -> Result<GenerationSuccess> {
    let payload = provider.resolve(model, request)?;

    tracing::debug!(provider = provider.name(), model = %model.id, "dispatching to provider");

    let native = provider.send(payload, progress).await?;
    provider.normalize(model, native)
}

/// Builder for constructing the generator from configuration
pub struct ImageGeneratorBuilder<'a> {
    config: &'a Config,
    registry: ModelRegistry,
    credentials: Option<Arc<CredentialPool>>,
}

impl<'a> ImageGeneratorBuilder<'a> {
    pub const fn new(config: &'a Config) -> Self {
        Self {
            config,
            registry: ModelRegistry::builtin(),
            credentials: None,
        }
    }

    /// Share a credential pool instead of building one from the config
    #[must_use]
    pub fn with_credentials(mut self, credentials: Arc<CredentialPool>) -> Self {
        self.credentials = Some(credentials);
        self
    }

    #[must_use]
    pub const fn with_registry(mut self, registry: ModelRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn build(self) -> Result<ImageGenerator> {
        let config = self.config;

        let subscription = &config.subscription;
        let poll_interval = subscription
            .poll_interval_duration()
            .map_err(|e| ImageGenError::Config(e.to_string()))?;
        let timeout = subscription
            .timeout_duration()
            .map_err(|e| ImageGenError::Config(e.to_string()))?;

        let credentials = self
            .credentials
            .unwrap_or_else(|| Arc::new(CredentialPool::new(subscription.api_keys.clone())));

        if config.image_api.api_key.is_none() {
            tracing::debug!("image API key not configured, image API models will fail");
        }
        if credentials.is_empty() {
            tracing::debug!("no subscription credentials configured, subscription models will fail");
        }

        let generator = ImageGenerator {
            registry: self.registry,
            image_api: ImageApiProvider::new(config.image_api.base_url.clone(), config.image_api.api_key.clone()),
            upscale: UpscaleProvider::new(
                config.upscale.base_url_or(&config.image_api),
                config.upscale.api_key_or(&config.image_api),
            ),
            chat: ChatProvider::new(&config.chat),
            subscription: SubscriptionProvider::new(subscription.base_url.clone(), credentials, poll_interval, timeout),
        };

        tracing::debug!(models = generator.registry.list().len(), "image generator initialized");

        Ok(generator)
    }
}
